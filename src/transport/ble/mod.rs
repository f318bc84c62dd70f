//! Bluetooth Low Energy central session

pub mod session;
pub mod tree;
pub mod uuids;

pub use {
    session::{BleSession, Connection},
    tree::GattTree,
    uuids::*,
};
