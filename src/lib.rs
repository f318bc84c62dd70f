//! BLE Sensor System Test
//!
//! Hardware-in-the-loop harness for the BLE environmental sensor firmware:
//! - programs and resets the board over a debug probe
//! - watches the serial console
//! - validates advertising, GATT layout, notifications and values as a BLE central

pub mod backend;
pub mod board;
pub mod config;
pub mod core;
pub mod transport;

pub use crate::core::{
    error::{BleError, ConsoleError, HarnessError, ProbeError},
    scenario::{ScenarioConfig, ScenarioReport, SensorScenario},
    types::{BdAddr, ConnectionParameters, SensorKind},
};
