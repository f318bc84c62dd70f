//! Board under test: debug probe and serial console

pub mod console;
pub mod controller;
pub mod monitor;

pub use {
    console::{ConsolePort, SerialPortConsole},
    controller::{BoardController, BoardState},
    monitor::{LineMatch, SerialMonitor},
};
