//! State shared between the scenario and BLE callbacks

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::{sync::Notify, time::Instant};
use tracing::{debug, error, info};

use crate::core::{
    checks::TimingPolicy,
    error::HarnessError,
    types::{AdvertisementRecord, SensorKind},
};

/// One decoded notification and when it arrived
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotificationSample {
    pub value: f64,
    pub received_at: Instant,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-run scenario state
///
/// Callbacks append samples and record violations; the scenario reads them
/// after the observation window. The target advertisement is latched once.
#[derive(Debug)]
pub struct ScenarioContext {
    device_name: String,
    timing: TimingPolicy,
    target: OnceLock<AdvertisementRecord>,
    observation_start: OnceLock<Instant>,
    temperature: Mutex<Vec<NotificationSample>>,
    humidity: Mutex<Vec<NotificationSample>>,
    violations: Mutex<Vec<String>>,
    violation_signal: Notify,
}

impl ScenarioContext {
    pub fn new(device_name: impl Into<String>, timing: TimingPolicy) -> Self {
        Self {
            device_name: device_name.into(),
            timing,
            target: OnceLock::new(),
            observation_start: OnceLock::new(),
            temperature: Mutex::new(Vec::new()),
            humidity: Mutex::new(Vec::new()),
            violations: Mutex::new(Vec::new()),
            violation_signal: Notify::new(),
        }
    }

    /// Evaluate an advertisement against the name filter
    ///
    /// Returns true only for the advertisement that latched the target.
    pub fn offer_advertisement(&self, record: &AdvertisementRecord) -> bool {
        if self.target.get().is_some() {
            return false;
        }
        if record.local_name.as_deref() != Some(self.device_name.as_str()) {
            return false;
        }

        let latched = self.target.set(record.clone()).is_ok();
        if latched {
            info!("Found device name: {}", self.device_name);
            info!("Found target device: {}", record.address);
        }
        latched
    }

    pub fn target(&self) -> Option<&AdvertisementRecord> {
        self.target.get()
    }

    /// Mark the reference point for first-notification latency
    pub fn start_observation(&self) -> Instant {
        *self.observation_start.get_or_init(Instant::now)
    }

    pub fn observation_start(&self) -> Option<Instant> {
        self.observation_start.get().copied()
    }

    fn samples_for(&self, kind: SensorKind) -> &Mutex<Vec<NotificationSample>> {
        match kind {
            SensorKind::Temperature => &self.temperature,
            SensorKind::Humidity => &self.humidity,
        }
    }

    /// Decode a notification payload, store it and check its timing
    ///
    /// Failures are recorded as violations rather than returned, since this
    /// runs inside the notification callback.
    pub fn record_payload(&self, kind: SensorKind, payload: &[u8]) {
        let received_at = Instant::now();
        debug!("{} notification payload: {}", kind, hex::encode(payload));

        let value = match kind.decode(payload) {
            Ok(value) => value,
            Err(e) => return self.record_violation(e.to_string()),
        };
        info!("Received {} notification: {}", kind, value);

        let (index, reference) = {
            let mut samples = lock(self.samples_for(kind));
            let previous = samples.last().map(|sample| sample.received_at);
            samples.push(NotificationSample { value, received_at });
            (samples.len() - 1, previous.or_else(|| self.observation_start()))
        };

        let Some(reference) = reference else {
            return self.record_violation(format!(
                "{} notification received before observation start",
                kind
            ));
        };

        let elapsed = received_at.saturating_duration_since(reference);
        if index == 0 {
            info!("{} notification first interval: {:.2} seconds", kind, elapsed.as_secs_f64());
        } else {
            info!("{} notification interval: {:.2} seconds", kind, elapsed.as_secs_f64());
        }

        if let Err(e) = self.timing.check_arrival(kind, index, elapsed) {
            self.record_violation(assertion_message(e));
        }
    }

    fn record_violation(&self, message: String) {
        error!("{}", message);
        lock(&self.violations).push(message);
        self.violation_signal.notify_one();
    }

    pub fn samples(&self, kind: SensorKind) -> Vec<NotificationSample> {
        lock(self.samples_for(kind)).clone()
    }

    pub fn first_violation(&self) -> Option<HarnessError> {
        lock(&self.violations)
            .first()
            .map(|message| HarnessError::Assertion(message.clone()))
    }

    /// Resolve once any violation has been recorded
    pub async fn violated(&self) {
        loop {
            if !lock(&self.violations).is_empty() {
                return;
            }
            self.violation_signal.notified().await;
        }
    }
}

fn assertion_message(err: HarnessError) -> String {
    match err {
        HarnessError::Assertion(message) => message,
        other => other.to_string(),
    }
}
