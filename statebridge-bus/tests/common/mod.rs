#![allow(dead_code)]

use serde::Serialize;
use statebridge_bus::{BusConfig, EventBus};
use statebridge_types::bus_event;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Created(pub u32);
bus_event!(Created => "session:created");

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tick(pub u32);
bus_event!(Tick => "sync:tick");

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Login(pub u32);
bus_event!(Login => "auth:login");

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Theme(pub String);
bus_event!(Theme => "ui:themeChanged");

/// Shared delivery log.
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

pub fn bus_with(max_batch_size: usize, batch_timeout_ms: u64) -> EventBus {
    EventBus::new(BusConfig {
        max_batch_size,
        batch_timeout_ms,
        history_size: 100,
    })
    .unwrap()
}

/// Logs every `Created`, `Tick`, `Login` and `Theme` delivery as `"<kind><n>"`.
pub fn record_all(bus: &EventBus, log: &Log) {
    let l = log.clone();
    bus.on(move |e: &statebridge_types::Event<Created>| l.push(format!("c{}", e.payload().0)));
    let l = log.clone();
    bus.on(move |e: &statebridge_types::Event<Tick>| l.push(format!("t{}", e.payload().0)));
    let l = log.clone();
    bus.on(move |e: &statebridge_types::Event<Login>| l.push(format!("login{}", e.payload().0)));
    let l = log.clone();
    bus.on(move |e: &statebridge_types::Event<Theme>| l.push(format!("theme:{}", e.payload().0)));
}
