//! Identity: the signed-in user and their token.

mod model;
mod reconciler;
mod store;

pub use model::{
    AuthLogin, AuthLogout, AuthUpdated, Credentials, IdentityField, IdentityMutation,
    IdentityPatch, IdentityState, LoginGrant, ProfileUpdate, TokenRefreshed, User,
};
pub use reconciler::IdentityReconciler;
pub use store::{IdentityStore, InMemoryIdentityStore};
