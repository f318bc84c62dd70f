//! Hardware backend abstraction layer

pub mod bluer_backend;
pub mod central;
pub mod mock_backend;
pub mod nrfjprog_backend;
pub mod probe;

pub use {
    bluer_backend::{BluerCentral, BluerTransport},
    central::{BleCentral, BleTransport, NotificationReceiver},
    nrfjprog_backend::NrfjprogProbe,
    probe::DebugProbe,
};

#[cfg(test)]
pub use mock_backend::{
    MockCentral, MockConsolePort, MockProbe, MockTransport, NotificationScript,
    environmental_sensing_service,
};
