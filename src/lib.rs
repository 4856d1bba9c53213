//! Sensor-node firmware library.
//!
//! Exposes the FSM engine, the node's machines and the host-side adapters
//! for integration testing and simulation.  All ESP-IDF-specific code is
//! guarded by `#[cfg(target_os = "espidf")]`.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod fsm;
