//! Transports between the harness and the device under test

pub mod ble;
