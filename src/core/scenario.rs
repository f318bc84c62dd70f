//! End-to-end validation of the environmental sensor firmware

use std::{ops::RangeInclusive, path::Path, sync::Arc, time::Duration};

use regex::Regex;
use serde::Serialize;
use tokio::time::{Instant, sleep};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    backend::{BleTransport, DebugProbe},
    board::{BoardController, ConsolePort},
    core::{
        checks::{
            CheckOutcome, TimingPolicy, check_connection_interval, check_manufacturer_data,
            check_uri, check_value,
        },
        context::ScenarioContext,
        error::{HarnessError, HarnessResult},
        types::{BdAddr, BleEvent, BleEventKind, ConnectionParameters, SensorKind},
    },
    transport::ble::{
        BleSession, ENVIRONMENTAL_SENSING_SERVICE_UUID, HUMIDITY_CHAR_UUID, TEMPERATURE_CHAR_UUID,
    },
};

/// Device name the sensor firmware advertises
pub const DEFAULT_DEVICE_NAME: &str = "TBZ_SHAM_SENSOR";

/// Console line the firmware prints once advertising is up
pub const ADVERTISING_MARKER: &str = "Advertising successfully started";

/// Tunables of the sensor scenario
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    pub device_name: String,
    /// Regular expression matched against console lines after reset
    pub console_marker: String,
    pub console_timeout: Duration,
    pub echo_console: bool,
    /// Pause between hard reset and console wait
    pub reset_settle: Duration,
    pub scan_timeout: Duration,
    pub scan_poll: Duration,
    /// Accepted connection interval in milliseconds
    pub connection_interval_ms: RangeInclusive<f64>,
    pub strict_connection_interval: bool,
    pub expected_company_id: Option<u16>,
    /// Manufacturer data after the company identifier, checked with `expected_company_id`
    pub expected_manufacturer_data: Option<Vec<u8>>,
    pub expected_uri: Option<String>,
    pub timing: TimingPolicy,
    pub observation_window: Duration,
    pub min_notifications: usize,
    /// Pause between the observation window and the direct reads
    pub read_settle: Duration,
    pub temperature_range: RangeInclusive<f64>,
    pub humidity_range: RangeInclusive<f64>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            console_marker: ADVERTISING_MARKER.to_string(),
            console_timeout: Duration::from_secs(500),
            echo_console: true,
            reset_settle: Duration::from_secs(1),
            scan_timeout: Duration::from_secs(12),
            scan_poll: Duration::from_millis(100),
            connection_interval_ms: 15.0..=30.0,
            strict_connection_interval: false,
            expected_company_id: None,
            expected_manufacturer_data: None,
            expected_uri: None,
            timing: TimingPolicy::default(),
            observation_window: Duration::from_secs(40),
            min_notifications: 2,
            read_settle: Duration::from_secs(5),
            temperature_range: 18.0..=25.0,
            humidity_range: 45.0..=65.0,
        }
    }
}

impl ScenarioConfig {
    fn value_range(&self, kind: SensorKind) -> &RangeInclusive<f64> {
        match kind {
            SensorKind::Temperature => &self.temperature_range,
            SensorKind::Humidity => &self.humidity_range,
        }
    }
}

fn characteristic_uuid(kind: SensorKind) -> Uuid {
    match kind {
        SensorKind::Temperature => TEMPERATURE_CHAR_UUID,
        SensorKind::Humidity => HUMIDITY_CHAR_UUID,
    }
}

const SENSORS: [SensorKind; 2] = [SensorKind::Temperature, SensorKind::Humidity];

/// A notification as it appears in the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleReport {
    pub characteristic: SensorKind,
    pub value: f64,
    /// Arrival relative to the observation start
    pub offset_ms: u64,
}

/// A direct characteristic read as it appears in the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingReport {
    pub characteristic: SensorKind,
    pub value: f64,
}

/// Summary of one scenario run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub passed: bool,
    pub failure: Option<String>,
    pub device_name: String,
    pub peer: Option<BdAddr>,
    pub rssi: Option<i16>,
    pub connection_parameters: Option<ConnectionParameters>,
    /// Checks that had nothing to check, such as an unreported connection interval
    pub skipped_checks: Vec<String>,
    pub notifications: Vec<SampleReport>,
    pub direct_reads: Vec<ReadingReport>,
}

impl ScenarioReport {
    pub fn to_json(&self) -> HarnessResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| HarnessError::Report(e.to_string()))
    }

    /// Write the report as pretty JSON to `path`
    pub async fn write(&self, path: &Path) -> HarnessResult<()> {
        tokio::fs::write(path, self.to_json()?)
            .await
            .map_err(|e| HarnessError::Report(format!("{}: {}", path.display(), e)))
    }
}

/// The single sensor scenario
///
/// Owns the shared context for one run. The board and BLE session are
/// borrowed and always torn down when `run` returns.
pub struct SensorScenario {
    config: ScenarioConfig,
    context: Arc<ScenarioContext>,
    connection: Option<ConnectionParameters>,
    skipped_checks: Vec<String>,
    direct_reads: Vec<ReadingReport>,
}

impl SensorScenario {
    pub fn new(config: ScenarioConfig) -> Self {
        let context = Arc::new(ScenarioContext::new(
            config.device_name.clone(),
            config.timing.clone(),
        ));
        Self {
            config,
            context,
            connection: None,
            skipped_checks: Vec::new(),
            direct_reads: Vec::new(),
        }
    }

    pub fn context(&self) -> &ScenarioContext {
        &self.context
    }

    /// Run the scenario, then tear down the session and the board
    ///
    /// Teardown failures are logged and never replace the scenario result.
    pub async fn run<P, C, T>(
        &mut self,
        board: &mut BoardController<P, C>,
        session: &mut BleSession<T>,
    ) -> HarnessResult<()>
    where
        P: DebugProbe,
        C: ConsolePort,
        T: BleTransport,
    {
        let result = self.execute(board, session).await;

        session.disconnect().await;
        session.close().await;
        board.close();

        match &result {
            Ok(()) => info!("=== Validation Successful ==="),
            Err(e) => error!("=== Validation Failed: {} ===", e),
        }
        result
    }

    async fn execute<P, C, T>(
        &mut self,
        board: &mut BoardController<P, C>,
        session: &mut BleSession<T>,
    ) -> HarnessResult<()>
    where
        P: DebugProbe,
        C: ConsolePort,
        T: BleTransport,
    {
        let marker = Regex::new(&self.config.console_marker)
            .map_err(|e| HarnessError::Config(format!("invalid console marker: {e}")))?;

        info!("=== Resetting board");
        board.hard_reset().await?;
        sleep(self.config.reset_settle).await;

        board
            .wait_for_line(&marker, self.config.console_timeout, self.config.echo_console)
            .await?;
        info!("Console reported advertising");

        session.initialize().await?;
        let address = self.scan_for_target(session).await?;

        let parameters = session.connect(address).await?;
        info!("Connection parameters: {}", parameters);
        self.connection = Some(parameters);
        let interval = check_connection_interval(
            &parameters,
            &self.config.connection_interval_ms,
            self.config.strict_connection_interval,
        )?;
        if interval == CheckOutcome::Skipped {
            self.skipped_checks.push("connection_interval".into());
        }

        self.context.start_observation();

        let tree = session.discover_services().await?;
        let service = tree
            .service(&ENVIRONMENTAL_SENSING_SERVICE_UUID)
            .ok_or_else(|| HarnessError::Assertion("Environmental Sensing service missing".into()))?;
        let has = |uuid: Uuid| service.characteristics.iter().any(|c| c.uuid == uuid);
        if !SENSORS.into_iter().all(|kind| has(characteristic_uuid(kind))) {
            return Err(HarnessError::Assertion("Characteristics missing".into()));
        }

        for kind in SENSORS {
            let context = self.context.clone();
            session
                .subscribe_to_characteristic(&characteristic_uuid(kind), move |payload| {
                    context.record_payload(kind, &payload)
                })
                .await?;
        }

        self.observe().await?;

        for kind in SENSORS {
            for sample in self.context.samples(kind) {
                info!("{}: {}", kind, sample.value);
            }
        }

        sleep(self.config.read_settle).await;
        self.read_values(session).await?;

        // Notifications keep arriving during the settle period
        match self.context.first_violation() {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }

    async fn scan_for_target<T: BleTransport>(&self, session: &mut BleSession<T>) -> HarnessResult<BdAddr> {
        let context = self.context.clone();
        session.register_listener(BleEventKind::Advertisement, move |event| {
            if let BleEvent::Advertisement(record) = event {
                context.offer_advertisement(record);
            }
        })?;

        session.start_scanning().await?;
        let deadline = Instant::now() + self.config.scan_timeout;
        while self.context.target().is_none() && Instant::now() < deadline {
            sleep(self.config.scan_poll).await;
        }
        session.stop_scanning().await?;

        let target = self
            .context
            .target()
            .ok_or_else(|| HarnessError::Assertion("Target device not found during scanning".into()))?;

        if let Some(company_id) = self.config.expected_company_id {
            check_manufacturer_data(
                target,
                company_id,
                self.config.expected_manufacturer_data.as_deref(),
            )?;
            info!("Manufacturer data for 0x{:04X} as expected", company_id);
        }
        if let Some(uri) = &self.config.expected_uri {
            check_uri(target, uri)?;
            info!("Advertised URI: {}", uri);
        }

        Ok(target.address)
    }

    /// Collect notifications for the observation window
    ///
    /// A violation recorded by a notification handler ends the window early.
    async fn observe(&self) -> HarnessResult<()> {
        info!(
            "Observing notifications for {} seconds",
            self.config.observation_window.as_secs()
        );
        tokio::select! {
            _ = sleep(self.config.observation_window) => {}
            _ = self.context.violated() => warn!("Observation aborted"),
        }

        if let Some(violation) = self.context.first_violation() {
            return Err(violation);
        }

        for kind in SENSORS {
            if self.context.samples(kind).len() < self.config.min_notifications {
                return Err(HarnessError::Assertion(format!(
                    "Not enough {} notifications received",
                    kind
                )));
            }
        }
        Ok(())
    }

    async fn read_values<T: BleTransport>(&mut self, session: &BleSession<T>) -> HarnessResult<()> {
        for kind in SENSORS {
            let payload = session.read_characteristic(&characteristic_uuid(kind)).await?;
            let value = kind.decode(&payload)?;
            info!("{} value (read operation): {}", kind, value);
            self.direct_reads.push(ReadingReport {
                characteristic: kind,
                value,
            });
        }

        for reading in &self.direct_reads {
            check_value(
                reading.characteristic,
                reading.value,
                self.config.value_range(reading.characteristic),
            )?;
        }
        Ok(())
    }

    /// Summarise the run for the JSON report
    pub fn report(&self, result: &HarnessResult<()>) -> ScenarioReport {
        let target = self.context.target();
        let start = self.context.observation_start();

        let notifications = SENSORS
            .into_iter()
            .flat_map(|kind| {
                self.context
                    .samples(kind)
                    .into_iter()
                    .map(move |sample| SampleReport {
                        characteristic: kind,
                        value: sample.value,
                        offset_ms: start.map_or(0, |start| {
                            sample.received_at.saturating_duration_since(start).as_millis() as u64
                        }),
                    })
            })
            .collect();

        ScenarioReport {
            passed: result.is_ok(),
            failure: result.as_ref().err().map(ToString::to_string),
            device_name: self.config.device_name.clone(),
            peer: target.map(|record| record.address),
            rssi: target.and_then(|record| record.rssi),
            connection_parameters: self.connection,
            skipped_checks: self.skipped_checks.clone(),
            notifications,
            direct_reads: self.direct_reads.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{MockCentral, MockConsolePort, MockProbe, MockTransport, NotificationScript},
        board::BoardState,
        core::{
            error::ConsoleError,
            types::{AdvertisementRecord, LocalIdentity},
        },
        transport::ble::uuids::NORDIC_COMPANY_ID,
    };
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    const SENSOR: BdAddr = BdAddr::new([0xC0, 0x11, 0x22, 0x33, 0x44, 0x55]);

    struct Rig {
        board: BoardController<MockProbe, MockConsolePort>,
        session: BleSession<MockTransport>,
        probe: MockProbe,
        central: MockCentral,
    }

    async fn rig_with(central: MockCentral) -> Rig {
        let probe = MockProbe::new();
        let port = MockConsolePort::new("MOCK0");
        port.push(b"*** Booting Zephyr OS ***\r\n");
        port.push(b"[00:00:00.020,000] <inf> ble_svc: Advertising successfully started\r\n");

        let board = BoardController::bring_up(probe.clone(), Some(PathBuf::from("zephyr.hex")), move || {
            Ok(port)
        })
        .await
        .unwrap();
        probe.clear_calls().await;

        let identity = LocalIdentity {
            name: "systemtest".into(),
            address: BdAddr::new([0xF0, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5]),
        };
        let session = BleSession::new(MockTransport::new(central.clone()), identity);

        Rig {
            board,
            session,
            probe,
            central,
        }
    }

    async fn sensor_rig() -> Rig {
        let central = MockCentral::with_environmental_sensor(SENSOR, DEFAULT_DEVICE_NAME).await;
        central
            .set_connection_parameters(ConnectionParameters {
                connection_interval: Some(22.5),
                peripheral_latency: Some(0),
                supervision_timeout: Some(4000),
            })
            .await;
        rig_with(central).await
    }

    /// A sensor heard `delay` after an unrelated advertiser that shows up at one second
    async fn late_sensor_rig(delay: Duration) -> Rig {
        let central = MockCentral::with_environmental_sensor(SENSOR, DEFAULT_DEVICE_NAME).await;
        let (_, sensor) = central.take_advertisements().await.remove(0);
        central
            .add_advertisement(
                Duration::from_secs(1),
                AdvertisementRecord {
                    address: BdAddr::new([0xC0, 0, 0, 0, 0, 0x01]),
                    local_name: Some("LIVING_ROOM_TV".into()),
                    rssi: Some(-71),
                    ..Default::default()
                },
            )
            .await;
        central.add_advertisement(delay, sensor).await;
        rig_with(central).await
    }

    fn config() -> ScenarioConfig {
        ScenarioConfig {
            echo_console: false,
            console_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    async fn run(rig: &mut Rig, config: ScenarioConfig) -> (HarnessResult<()>, ScenarioReport) {
        let mut scenario = SensorScenario::new(config);
        let result = scenario.run(&mut rig.board, &mut rig.session).await;
        let report = scenario.report(&result);
        (result, report)
    }

    async fn assert_torn_down(rig: &Rig) {
        assert_eq!(rig.board.state(), BoardState::Closed);
        assert!(!rig.session.is_initialized());
        assert!(!rig.central.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_passes_against_healthy_sensor() {
        let mut rig = sensor_rig().await;

        let (result, report) = run(&mut rig, config()).await;
        result.unwrap();

        assert!(report.passed);
        assert_eq!(report.peer, Some(SENSOR));
        assert_eq!(report.rssi, Some(-48));
        assert!(report.skipped_checks.is_empty());
        assert_eq!(report.notifications.len(), 4);
        assert_eq!(report.notifications[0].offset_ms, 9_500);
        assert_eq!(report.notifications[1].offset_ms, 39_500);
        assert_eq!(
            report.direct_reads,
            vec![
                ReadingReport {
                    characteristic: SensorKind::Temperature,
                    value: 21.37
                },
                ReadingReport {
                    characteristic: SensorKind::Humidity,
                    value: 50.0
                },
            ]
        );

        assert_eq!(rig.probe.calls().await, vec!["connect", "hard_reset", "run", "close"]);
        assert_torn_down(&rig).await;

        let calls = rig.central.calls().await;
        assert_eq!(calls.last().map(String::as_str), Some("close"));
        assert!(calls.contains(&format!("disconnect {SENSOR}")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_serializes_outcome() {
        let mut rig = sensor_rig().await;
        let (_, report) = run(&mut rig, config()).await;

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["passed"], true);
        assert_eq!(json["peer"], "C0:11:22:33:44:55");
        assert_eq!(json["connection_parameters"]["connection_interval"], 22.5);
        assert_eq!(json["notifications"][0]["characteristic"], "temperature");
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_written_to_file() {
        let mut rig = rig_with(MockCentral::with_environmental_sensor(SENSOR, "SOME_OTHER_SENSOR").await).await;
        let (_, report) = run(&mut rig, config()).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write(&path).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["passed"], false);
        assert_eq!(
            written["failure"],
            "Assertion failed: Target device not found during scanning"
        );

        let missing = dir.path().join("missing").join("report.json");
        assert!(matches!(report.write(&missing).await, Err(HarnessError::Report(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_console_timeout_aborts_before_ble() {
        let central = MockCentral::with_environmental_sensor(SENSOR, DEFAULT_DEVICE_NAME).await;
        let probe = MockProbe::new();
        let board = BoardController::bring_up(probe, None, || Ok(MockConsolePort::new("MOCK0")))
            .await
            .unwrap();
        let identity = LocalIdentity {
            name: "systemtest".into(),
            address: BdAddr::default(),
        };
        let mut rig = Rig {
            board,
            session: BleSession::new(MockTransport::new(central.clone()), identity),
            probe: MockProbe::new(),
            central,
        };

        let config = ScenarioConfig {
            console_timeout: Duration::from_millis(50),
            ..config()
        };
        let (result, report) = run(&mut rig, config).await;

        assert!(matches!(
            result,
            Err(HarnessError::Console(ConsoleError::Timeout { .. }))
        ));
        assert!(!report.passed);
        assert!(rig.central.calls().await.is_empty());
        assert_eq!(rig.board.state(), BoardState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_not_found() {
        let mut rig = rig_with(MockCentral::with_environmental_sensor(SENSOR, "SOME_OTHER_SENSOR").await).await;

        let (result, report) = run(&mut rig, config()).await;

        assert_eq!(
            result.unwrap_err().to_string(),
            "Assertion failed: Target device not found during scanning"
        );
        assert_eq!(report.peer, None);
        assert!(!rig.central.calls().await.iter().any(|c| c.starts_with("connect")));
        assert_torn_down(&rig).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_timeout_counts_from_scan_start() {
        // Target at 13 s, after the 12 s scan window
        let mut rig = late_sensor_rig(Duration::from_secs(12)).await;
        let (result, report) = run(&mut rig, config()).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "Assertion failed: Target device not found during scanning"
        );
        assert_eq!(report.peer, None);
        assert_torn_down(&rig).await;

        // Target at 11 s, inside the window
        let mut rig = late_sensor_rig(Duration::from_secs(10)).await;
        let (result, report) = run(&mut rig, config()).await;
        result.unwrap();
        assert_eq!(report.peer, Some(SENSOR));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_interval_out_of_bounds() {
        let mut rig = sensor_rig().await;
        rig.central
            .set_connection_parameters(ConnectionParameters {
                connection_interval: Some(7.5),
                ..Default::default()
            })
            .await;

        let (result, _) = run(&mut rig, config()).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "Assertion failed: Invalid connection interval: 7.5 ms"
        );
        assert_torn_down(&rig).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreported_interval_respects_strict_flag() {
        let central = MockCentral::with_environmental_sensor(SENSOR, DEFAULT_DEVICE_NAME).await;
        let mut rig = rig_with(central).await;

        let strict = ScenarioConfig {
            strict_connection_interval: true,
            ..config()
        };
        let (result, _) = run(&mut rig, strict).await;
        assert!(result.unwrap_err().is_assertion());

        let central = MockCentral::with_environmental_sensor(SENSOR, DEFAULT_DEVICE_NAME).await;
        let mut rig = rig_with(central).await;
        let (result, report) = run(&mut rig, config()).await;
        assert!(result.is_ok());
        assert_eq!(report.skipped_checks, vec!["connection_interval".to_string()]);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["skipped_checks"][0], "connection_interval");
    }

    #[tokio::test(start_paused = true)]
    async fn test_company_id_check() {
        let mut rig = sensor_rig().await;
        let expect_nordic = ScenarioConfig {
            expected_company_id: Some(NORDIC_COMPANY_ID),
            ..config()
        };
        assert!(run(&mut rig, expect_nordic).await.0.is_ok());

        let mut rig = sensor_rig().await;
        let expect_other = ScenarioConfig {
            expected_company_id: Some(0x004C),
            ..config()
        };
        assert_eq!(
            run(&mut rig, expect_other).await.0.unwrap_err().to_string(),
            "Assertion failed: Manufacturer data for company 0x004C missing"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_manufacturer_data_and_uri_checks() {
        let expect_firmware = || ScenarioConfig {
            expected_company_id: Some(NORDIC_COMPANY_ID),
            expected_manufacturer_data: Some(vec![0x00, 0x00]),
            expected_uri: Some("https://github.com/TAREQ-TBZ".into()),
            ..config()
        };

        let mut rig = sensor_rig().await;
        run(&mut rig, expect_firmware()).await.0.unwrap();

        let mut rig = sensor_rig().await;
        let pressed = ScenarioConfig {
            expected_manufacturer_data: Some(vec![0x01, 0x00]),
            ..expect_firmware()
        };
        assert_eq!(
            run(&mut rig, pressed).await.0.unwrap_err().to_string(),
            "Assertion failed: Unexpected manufacturer data for company 0x0059: 0000"
        );

        let mut rig = sensor_rig().await;
        let elsewhere = ScenarioConfig {
            expected_uri: Some("https://example.com".into()),
            ..expect_firmware()
        };
        assert_eq!(
            run(&mut rig, elsewhere).await.0.unwrap_err().to_string(),
            "Assertion failed: Unexpected URI: https://github.com/TAREQ-TBZ"
        );
        assert!(!rig.central.calls().await.iter().any(|c| c.starts_with("connect")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_characteristic() {
        let mut rig = sensor_rig().await;
        let mut service = crate::backend::environmental_sensing_service();
        service.characteristics.retain(|c| c.uuid != HUMIDITY_CHAR_UUID);
        rig.central.set_services(vec![service]).await;

        let (result, _) = run(&mut rig, config()).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "Assertion failed: Characteristics missing"
        );
        assert!(!rig.central.calls().await.iter().any(|c| c.starts_with("subscribe")));
        assert_torn_down(&rig).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_service() {
        let mut rig = sensor_rig().await;
        rig.central.set_services(Vec::new()).await;

        let (result, _) = run(&mut rig, config()).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "Assertion failed: Environmental Sensing service missing"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_first_notification_aborts_observation() {
        let mut rig = sensor_rig().await;
        rig.central
            .set_notifications(
                TEMPERATURE_CHAR_UUID,
                NotificationScript {
                    first_after: Duration::from_secs(14),
                    period: Duration::from_secs(30),
                    payloads: vec![2140i16.to_le_bytes().to_vec(); 2],
                },
            )
            .await;

        let started = Instant::now();
        let (result, report) = run(&mut rig, config()).await;

        assert_eq!(
            result.unwrap_err().to_string(),
            "Assertion failed: First temperature notification did not arrive in expected time: 14.00 seconds"
        );
        // The violation ends the 40 second window early
        assert!(started.elapsed() < Duration::from_secs(20));
        assert!(report.direct_reads.is_empty());
        assert_torn_down(&rig).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_notification_interval() {
        let mut rig = sensor_rig().await;
        rig.central
            .set_notifications(
                HUMIDITY_CHAR_UUID,
                NotificationScript {
                    first_after: Duration::from_secs(10),
                    period: Duration::from_secs(20),
                    payloads: vec![5012u16.to_le_bytes().to_vec(); 3],
                },
            )
            .await;

        let (result, _) = run(&mut rig, config()).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "Assertion failed: Unexpected humidity notification interval: 20.00 seconds"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_enough_notifications() {
        let mut rig = sensor_rig().await;
        rig.central
            .set_notifications(
                TEMPERATURE_CHAR_UUID,
                NotificationScript {
                    first_after: Duration::from_secs(10),
                    period: Duration::from_secs(30),
                    payloads: vec![2140i16.to_le_bytes().to_vec()],
                },
            )
            .await;

        let (result, _) = run(&mut rig, config()).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "Assertion failed: Not enough temperature notifications received"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_read_out_of_range() {
        let mut rig = sensor_rig().await;
        rig.central
            .set_value(HUMIDITY_CHAR_UUID, 9000u16.to_le_bytes().to_vec())
            .await;

        let (result, report) = run(&mut rig, config()).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "Assertion failed: Invalid humidity: 90%"
        );
        assert_eq!(report.direct_reads.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_failures_are_swallowed() {
        let mut rig = sensor_rig().await;
        rig.central.set_teardown_failure(true).await;

        let (result, _) = run(&mut rig, config()).await;
        result.unwrap();

        let calls = rig.central.calls().await;
        assert!(calls.contains(&"power_off".to_string()));
        assert!(calls.contains(&"close".to_string()));
        assert_eq!(rig.board.state(), BoardState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_close_is_harmless() {
        let mut rig = sensor_rig().await;
        run(&mut rig, config()).await.0.unwrap();

        rig.session.close().await;
        rig.board.close();
        assert_torn_down(&rig).await;
    }

    #[test]
    fn test_default_config_matches_firmware_contract() {
        let config = ScenarioConfig::default();
        assert_eq!(config.device_name, "TBZ_SHAM_SENSOR");
        assert_eq!(config.console_timeout, Duration::from_secs(500));
        assert_eq!(config.scan_timeout, Duration::from_secs(12));
        assert_eq!(config.observation_window, Duration::from_secs(40));
        assert_eq!(config.min_notifications, 2);
        assert_eq!(config.connection_interval_ms, 15.0..=30.0);
    }
}
