//! Pure expectation checks used by the sensor scenario

use std::{ops::RangeInclusive, time::Duration};

use tracing::warn;

use crate::core::{
    error::{HarnessError, HarnessResult},
    types::{AdvertisementRecord, ConnectionParameters, SensorKind},
};

/// Whether a check ran or had nothing to check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Passed,
    Skipped,
}

/// Tolerances on notification arrival times
#[derive(Debug, Clone, PartialEq)]
pub struct TimingPolicy {
    /// Latency of the first notification after the observation start
    pub first_notification: RangeInclusive<Duration>,
    /// Spacing between consecutive notifications
    pub notification_interval: RangeInclusive<Duration>,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            first_notification: Duration::from_secs(9)..=Duration::from_secs(11),
            notification_interval: Duration::from_secs(29)..=Duration::from_secs(31),
        }
    }
}

impl TimingPolicy {
    /// Check the arrival of notification number `index` (zero based)
    ///
    /// `elapsed` is measured from the observation start for the first
    /// notification and from the previous notification otherwise.
    pub fn check_arrival(&self, kind: SensorKind, index: usize, elapsed: Duration) -> HarnessResult<()> {
        let seconds = elapsed.as_secs_f64();

        if index == 0 {
            if !self.first_notification.contains(&elapsed) {
                return Err(HarnessError::Assertion(format!(
                    "First {} notification did not arrive in expected time: {:.2} seconds",
                    kind, seconds
                )));
            }
        } else if !self.notification_interval.contains(&elapsed) {
            return Err(HarnessError::Assertion(format!(
                "Unexpected {} notification interval: {:.2} seconds",
                kind, seconds
            )));
        }
        Ok(())
    }
}

/// Check a decoded value read directly from the sensor
pub fn check_value(kind: SensorKind, value: f64, range: &RangeInclusive<f64>) -> HarnessResult<()> {
    if range.contains(&value) {
        return Ok(());
    }

    let unit = match kind {
        SensorKind::Temperature => "°C",
        SensorKind::Humidity => "%",
    };
    Err(HarnessError::Assertion(format!("Invalid {}: {}{}", kind, value, unit)))
}

/// Check the negotiated connection interval in milliseconds
///
/// An unreported interval passes with a warning unless `strict` is set.
pub fn check_connection_interval(
    parameters: &ConnectionParameters,
    range: &RangeInclusive<f64>,
    strict: bool,
) -> HarnessResult<CheckOutcome> {
    match parameters.connection_interval {
        Some(interval) if range.contains(&interval) => Ok(CheckOutcome::Passed),
        Some(interval) => Err(HarnessError::Assertion(format!(
            "Invalid connection interval: {} ms",
            interval
        ))),
        None if strict => Err(HarnessError::Assertion(
            "Connection interval not reported by BLE controller".into(),
        )),
        None => {
            warn!("Connection interval not reported by BLE controller, skipping check");
            Ok(CheckOutcome::Skipped)
        }
    }
}

/// Check the manufacturer data advertised under `company_id`
///
/// With `payload` set, the bytes after the company identifier must match it.
pub fn check_manufacturer_data(
    record: &AdvertisementRecord,
    company_id: u16,
    payload: Option<&[u8]>,
) -> HarnessResult<()> {
    let data = record.manufacturer_data.get(&company_id).ok_or_else(|| {
        HarnessError::Assertion(format!(
            "Manufacturer data for company 0x{:04X} missing",
            company_id
        ))
    })?;

    match payload {
        Some(expected) if expected != data.as_slice() => Err(HarnessError::Assertion(format!(
            "Unexpected manufacturer data for company 0x{:04X}: {}",
            company_id,
            hex::encode(data)
        ))),
        _ => Ok(()),
    }
}

/// Check the URI the target advertised
pub fn check_uri(record: &AdvertisementRecord, expected: &str) -> HarnessResult<()> {
    match record.uri.as_deref() {
        Some(uri) if uri == expected => Ok(()),
        Some(uri) => Err(HarnessError::Assertion(format!("Unexpected URI: {}", uri))),
        None => Err(HarnessError::Assertion("URI not advertised".into())),
    }
}
