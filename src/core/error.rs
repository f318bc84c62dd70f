//! Error types for the system test harness

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Result type for serial console operations
pub type ConsoleResult<T> = Result<T, ConsoleError>;

/// Result type for debug probe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Result type for BLE central operations
pub type BleResult<T> = Result<T, BleError>;

/// Result type for harness level operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors raised while reading the board's serial console
#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("Timeout: no line matching '{pattern}' within {timeout:?}")]
    Timeout { pattern: String, timeout: Duration },

    #[error("Serial console is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// Errors raised by the debug probe collaborator
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("No debug probe found")]
    NoProbeFound,

    #[error("Probe session is not open")]
    NotConnected,

    #[error("Board is closed")]
    BoardClosed,

    #[error("Probe operation '{operation}' failed ({status}): {stderr}")]
    CommandFailed {
        operation: String,
        status: String,
        stderr: String,
    },

    #[error("Failed to launch probe tool: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors raised by the BLE central collaborator and session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BleError {
    #[error("BLE transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("BLE session not initialized")]
    NotInitialized,

    #[error("Device not connected")]
    NotConnected,

    #[error("Already connected to {0}")]
    AlreadyConnected(String),

    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(Uuid),

    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("BLE error: {0}")]
    Backend(String),
}

impl From<bluer::Error> for BleError {
    fn from(err: bluer::Error) -> Self {
        BleError::Backend(err.to_string())
    }
}

/// Errors that abort a system test run
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Console error: {0}")]
    Console(#[from] ConsoleError),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("BLE error: {0}")]
    Ble(#[from] BleError),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Invalid {characteristic} payload: expected {expected} bytes, got {actual}")]
    Decode {
        characteristic: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Report error: {0}")]
    Report(String),
}

impl HarnessError {
    /// Whether this error is a violated expectation rather than an
    /// infrastructure failure
    pub fn is_assertion(&self) -> bool {
        matches!(self, HarnessError::Assertion(_))
    }
}
