//! Mock collaborators for testing

use std::{
    collections::{HashMap, VecDeque},
    path::Path,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use tokio::{
    sync::{Mutex, broadcast, mpsc},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    backend::{BleCentral, BleTransport, DebugProbe, NotificationReceiver},
    board::ConsolePort,
    core::{
        error::{BleError, BleResult, ConsoleResult, ProbeError, ProbeResult},
        types::{
            AdvertisementRecord, BdAddr, BleEvent, CharacteristicInfo, CharacteristicProperties,
            ConnectionParameters, DescriptorInfo, LocalIdentity, ServiceInfo,
        },
    },
    transport::ble::uuids::{
        CLIENT_CHARACTERISTIC_CONFIGURATION_UUID, ENVIRONMENTAL_SENSING_SERVICE_UUID,
        HUMIDITY_CHAR_UUID, NORDIC_COMPANY_ID, TEMPERATURE_CHAR_UUID,
    },
};

#[derive(Debug, Default)]
struct MockProbeState {
    calls: Vec<String>,
    fail_on: Option<String>,
    connected: bool,
}

/// Mock debug probe recording every operation
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    inner: Arc<Mutex<MockProbeState>>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `operation` fail from now on
    pub async fn fail_on(&self, operation: &str) {
        self.inner.lock().await.fail_on = Some(operation.to_string());
    }

    pub async fn calls(&self) -> Vec<String> {
        self.inner.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.inner.lock().await.calls.clear();
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.connected
    }

    async fn record(&self, operation: &str, detail: Option<String>) -> ProbeResult<()> {
        let mut state = self.inner.lock().await;
        state.calls.push(match detail {
            Some(detail) => format!("{operation} {detail}"),
            None => operation.to_string(),
        });

        if operation != "connect" && operation != "close" && !state.connected {
            return Err(ProbeError::NotConnected);
        }
        if state.fail_on.as_deref() == Some(operation) {
            return Err(ProbeError::CommandFailed {
                operation: operation.to_string(),
                status: "exit status: 1".into(),
                stderr: "Mock probe failure".into(),
            });
        }
        Ok(())
    }
}

impl DebugProbe for MockProbe {
    async fn connect(&self) -> ProbeResult<()> {
        self.record("connect", None).await?;
        self.inner.lock().await.connected = true;
        Ok(())
    }

    async fn recover(&self) -> ProbeResult<()> {
        self.record("recover", None).await
    }

    async fn erase_all(&self) -> ProbeResult<()> {
        self.record("erase_all", None).await
    }

    async fn program_file(&self, image: &Path) -> ProbeResult<()> {
        self.record("program_file", Some(image.display().to_string()))
            .await
    }

    async fn system_reset(&self) -> ProbeResult<()> {
        self.record("system_reset", None).await
    }

    async fn hard_reset(&self) -> ProbeResult<()> {
        self.record("hard_reset", None).await
    }

    async fn run(&self) -> ProbeResult<()> {
        self.record("run", None).await
    }

    async fn close(&self) -> ProbeResult<()> {
        self.inner.lock().await.connected = false;
        self.record("close", None).await
    }
}

#[derive(Debug, Default)]
struct MockConsoleState {
    chunks: VecDeque<Vec<u8>>,
    read_delay: Duration,
}

/// Mock serial console fed from queued byte chunks
#[derive(Debug, Clone)]
pub struct MockConsolePort {
    name: String,
    state: Arc<StdMutex<MockConsoleState>>,
}

impl MockConsolePort {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(StdMutex::new(MockConsoleState::default())),
        }
    }

    /// Queue bytes to be returned by one read
    pub fn push(&self, bytes: &[u8]) {
        if let Ok(mut state) = self.state.lock() {
            state.chunks.push_back(bytes.to_vec());
        }
    }

    /// Delay applied to every read that returns data
    pub fn set_read_delay(&self, delay: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.read_delay = delay;
        }
    }
}

impl ConsolePort for MockConsolePort {
    fn read_bytes(&mut self, buffer: &mut [u8], timeout: Duration) -> ConsoleResult<usize> {
        let (chunk, delay) = match self.state.lock() {
            Ok(mut state) => (state.chunks.pop_front(), state.read_delay),
            Err(_) => (None, Duration::ZERO),
        };

        let Some(mut chunk) = chunk else {
            // Nothing queued: behave like an idle line
            std::thread::sleep(timeout.min(Duration::from_millis(5)));
            return Ok(0);
        };

        std::thread::sleep(delay);
        let n = chunk.len().min(buffer.len());
        buffer[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            let rest = chunk.split_off(n);
            if let Ok(mut state) = self.state.lock() {
                state.chunks.push_front(rest);
            }
        }
        Ok(n)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Scripted notification stream for one characteristic
#[derive(Debug, Clone)]
pub struct NotificationScript {
    pub first_after: Duration,
    pub period: Duration,
    pub payloads: Vec<Vec<u8>>,
}

#[derive(Debug, Default)]
struct MockCentralState {
    calls: Vec<String>,
    advertisements: Vec<(Duration, AdvertisementRecord)>,
    connection_parameters: ConnectionParameters,
    services: Vec<ServiceInfo>,
    values: HashMap<Uuid, Vec<u8>>,
    scripts: HashMap<Uuid, NotificationScript>,
    connected: Option<BdAddr>,
    fail_connect: bool,
    fail_disconnect: bool,
    fail_power_off: bool,
    fail_close: bool,
    scan_task: Option<JoinHandle<()>>,
    notification_tasks: Vec<JoinHandle<()>>,
}

/// Mock BLE central driven by scripted advertisements and notifications
#[derive(Debug, Clone)]
pub struct MockCentral {
    inner: Arc<Mutex<MockCentralState>>,
    events: broadcast::Sender<BleEvent>,
}

impl Default for MockCentral {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCentral {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Mutex::new(MockCentralState::default())),
            events,
        }
    }

    /// A central that sees one environmental sensor peripheral
    ///
    /// The sensor advertises one second after scanning starts, reads
    /// 21.37 degrees and 50 % humidity, and notifies both 9.5 s after
    /// subscription and every 30 s after that.
    pub async fn with_environmental_sensor(address: BdAddr, name: &str) -> Self {
        let central = Self::new();
        central
            .add_advertisement(
                Duration::from_secs(1),
                AdvertisementRecord {
                    address,
                    local_name: Some(name.to_string()),
                    rssi: Some(-48),
                    manufacturer_data: HashMap::from([(NORDIC_COMPANY_ID, vec![0x00, 0x00])]),
                    service_uuids: vec![ENVIRONMENTAL_SENSING_SERVICE_UUID],
                    uri: Some("https://github.com/TAREQ-TBZ".to_string()),
                },
            )
            .await;
        central.set_services(vec![environmental_sensing_service()]).await;
        central
            .set_value(TEMPERATURE_CHAR_UUID, 2137i16.to_le_bytes().to_vec())
            .await;
        central
            .set_value(HUMIDITY_CHAR_UUID, 5000u16.to_le_bytes().to_vec())
            .await;

        for (uuid, payload) in [
            (TEMPERATURE_CHAR_UUID, 2140i16.to_le_bytes().to_vec()),
            (HUMIDITY_CHAR_UUID, 5012u16.to_le_bytes().to_vec()),
        ] {
            central
                .set_notifications(
                    uuid,
                    NotificationScript {
                        first_after: Duration::from_millis(9_500),
                        period: Duration::from_secs(30),
                        payloads: vec![payload; 4],
                    },
                )
                .await;
        }
        central
    }

    pub async fn add_advertisement(&self, delay: Duration, record: AdvertisementRecord) {
        self.inner.lock().await.advertisements.push((delay, record));
    }

    /// Remove the scripted advertisements, returning them in order
    pub async fn take_advertisements(&self) -> Vec<(Duration, AdvertisementRecord)> {
        std::mem::take(&mut self.inner.lock().await.advertisements)
    }

    pub async fn set_connection_parameters(&self, parameters: ConnectionParameters) {
        self.inner.lock().await.connection_parameters = parameters;
    }

    pub async fn set_services(&self, services: Vec<ServiceInfo>) {
        self.inner.lock().await.services = services;
    }

    pub async fn set_value(&self, uuid: Uuid, value: Vec<u8>) {
        self.inner.lock().await.values.insert(uuid, value);
    }

    pub async fn set_notifications(&self, uuid: Uuid, script: NotificationScript) {
        self.inner.lock().await.scripts.insert(uuid, script);
    }

    pub async fn set_connect_failure(&self, should_fail: bool) {
        self.inner.lock().await.fail_connect = should_fail;
    }

    /// Make every teardown step fail
    pub async fn set_teardown_failure(&self, should_fail: bool) {
        let mut state = self.inner.lock().await;
        state.fail_disconnect = should_fail;
        state.fail_power_off = should_fail;
        state.fail_close = should_fail;
    }

    pub async fn calls(&self) -> Vec<String> {
        self.inner.lock().await.calls.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.connected.is_some()
    }

    async fn require_connection(&self, address: BdAddr) -> BleResult<()> {
        match self.inner.lock().await.connected {
            Some(peer) if peer == address => Ok(()),
            _ => Err(BleError::NotConnected),
        }
    }

    async fn record(&self, call: String) {
        self.inner.lock().await.calls.push(call);
    }
}

impl BleCentral for MockCentral {
    fn events(&self) -> broadcast::Receiver<BleEvent> {
        self.events.subscribe()
    }

    async fn power_on(&self) -> BleResult<()> {
        self.record("power_on".into()).await;
        Ok(())
    }

    async fn power_off(&self) -> BleResult<()> {
        self.record("power_off".into()).await;
        if self.inner.lock().await.fail_power_off {
            return Err(BleError::Backend("Mock power off failure".into()));
        }
        Ok(())
    }

    async fn start_scanning(&self) -> BleResult<()> {
        self.record("start_scanning".into()).await;
        let mut state = self.inner.lock().await;

        let advertisements = state.advertisements.clone();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            for (delay, record) in advertisements {
                tokio::time::sleep(delay).await;
                let _ = events.send(BleEvent::Advertisement(record));
            }
        });
        if let Some(previous) = state.scan_task.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    async fn stop_scanning(&self) -> BleResult<()> {
        self.record("stop_scanning".into()).await;
        if let Some(task) = self.inner.lock().await.scan_task.take() {
            task.abort();
        }
        Ok(())
    }

    async fn connect(&self, address: BdAddr) -> BleResult<ConnectionParameters> {
        self.record(format!("connect {address}")).await;
        let mut state = self.inner.lock().await;
        if state.fail_connect {
            return Err(BleError::ConnectFailed("Mock connect failure".into()));
        }
        state.connected = Some(address);
        let _ = self.events.send(BleEvent::Connection(address));
        Ok(state.connection_parameters)
    }

    async fn disconnect(&self, address: BdAddr) -> BleResult<()> {
        self.record(format!("disconnect {address}")).await;
        let mut state = self.inner.lock().await;
        for task in state.notification_tasks.drain(..) {
            task.abort();
        }
        if state.fail_disconnect {
            return Err(BleError::Backend("Mock disconnect failure".into()));
        }
        state.connected = None;
        let _ = self.events.send(BleEvent::Disconnection(address));
        Ok(())
    }

    async fn discover_services(&self, address: BdAddr) -> BleResult<Vec<ServiceInfo>> {
        self.require_connection(address).await?;
        self.record("discover_services".into()).await;
        let services = self.inner.lock().await.services.clone();
        Ok(services
            .into_iter()
            .map(|service| ServiceInfo {
                characteristics: Vec::new(),
                ..service
            })
            .collect())
    }

    async fn discover_characteristics(
        &self,
        address: BdAddr,
        service: &ServiceInfo,
    ) -> BleResult<Vec<CharacteristicInfo>> {
        self.require_connection(address).await?;
        self.record(format!("discover_characteristics {}", service.uuid))
            .await;
        let state = self.inner.lock().await;
        Ok(state
            .services
            .iter()
            .filter(|s| s.id == service.id)
            .flat_map(|s| s.characteristics.iter().cloned())
            .map(|characteristic| CharacteristicInfo {
                descriptors: Vec::new(),
                ..characteristic
            })
            .collect())
    }

    async fn discover_descriptors(
        &self,
        address: BdAddr,
        characteristic: &CharacteristicInfo,
    ) -> BleResult<Vec<DescriptorInfo>> {
        self.require_connection(address).await?;
        self.record(format!("discover_descriptors {}", characteristic.uuid))
            .await;
        let state = self.inner.lock().await;
        Ok(state
            .services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .filter(|c| c.service_id == characteristic.service_id && c.id == characteristic.id)
            .flat_map(|c| c.descriptors.iter().cloned())
            .collect())
    }

    async fn read_characteristic(
        &self,
        address: BdAddr,
        characteristic: &CharacteristicInfo,
    ) -> BleResult<Vec<u8>> {
        self.require_connection(address).await?;
        self.record(format!("read {}", characteristic.uuid)).await;
        self.inner
            .lock()
            .await
            .values
            .get(&characteristic.uuid)
            .cloned()
            .ok_or_else(|| BleError::Backend("Read not permitted".into()))
    }

    async fn subscribe(
        &self,
        address: BdAddr,
        characteristic: &CharacteristicInfo,
    ) -> BleResult<NotificationReceiver> {
        self.require_connection(address).await?;
        self.record(format!("subscribe {}", characteristic.uuid))
            .await;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.lock().await;
        if let Some(script) = state.scripts.get(&characteristic.uuid).cloned() {
            let task = tokio::spawn(async move {
                tokio::time::sleep(script.first_after).await;
                for (i, payload) in script.payloads.into_iter().enumerate() {
                    if i > 0 {
                        tokio::time::sleep(script.period).await;
                    }
                    if tx.send(payload).is_err() {
                        break;
                    }
                }
            });
            state.notification_tasks.push(task);
        }
        Ok(rx)
    }

    async fn close(&self) -> BleResult<()> {
        self.record("close".into()).await;
        let mut state = self.inner.lock().await;
        if let Some(task) = state.scan_task.take() {
            task.abort();
        }
        for task in state.notification_tasks.drain(..) {
            task.abort();
        }
        if state.fail_close {
            return Err(BleError::Backend("Mock close failure".into()));
        }
        Ok(())
    }
}

/// Mock transport handing out clones of one mock central
#[derive(Debug, Clone)]
pub struct MockTransport {
    central: MockCentral,
    available: bool,
}

impl MockTransport {
    pub fn new(central: MockCentral) -> Self {
        Self {
            central,
            available: true,
        }
    }

    /// A transport whose controller cannot be opened
    pub fn unavailable() -> Self {
        Self {
            central: MockCentral::new(),
            available: false,
        }
    }
}

impl BleTransport for MockTransport {
    type Central = MockCentral;

    fn descriptor(&self) -> &str {
        "mock"
    }

    async fn open(&self, identity: &LocalIdentity) -> BleResult<MockCentral> {
        if !self.available {
            return Err(BleError::TransportUnavailable("mock controller absent".into()));
        }
        self.central.record(format!("open {}", identity.address)).await;
        Ok(self.central.clone())
    }
}

/// Environmental Sensing service with temperature and humidity
pub fn environmental_sensing_service() -> ServiceInfo {
    let sensor_characteristic = |id: u16, uuid: Uuid| CharacteristicInfo {
        service_id: 0x0010,
        id,
        uuid,
        properties: CharacteristicProperties {
            read: true,
            notify: true,
            ..Default::default()
        },
        descriptors: vec![DescriptorInfo {
            id: id + 2,
            uuid: CLIENT_CHARACTERISTIC_CONFIGURATION_UUID,
        }],
    };

    ServiceInfo {
        id: 0x0010,
        uuid: ENVIRONMENTAL_SENSING_SERVICE_UUID,
        primary: true,
        characteristics: vec![
            sensor_characteristic(0x0011, TEMPERATURE_CHAR_UUID),
            sensor_characteristic(0x0014, HUMIDITY_CHAR_UUID),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_probe_requires_session() {
        let probe = MockProbe::new();
        assert!(matches!(probe.run().await, Err(ProbeError::NotConnected)));

        probe.connect().await.unwrap();
        probe.run().await.unwrap();
        probe.close().await.unwrap();
        assert!(!probe.is_connected().await);
    }

    #[tokio::test]
    async fn test_mock_console_splits_large_chunks() {
        let mut port = MockConsolePort::new("MOCK0");
        port.push(b"abcdef");

        let mut buffer = [0u8; 4];
        assert_eq!(port.read_bytes(&mut buffer, Duration::from_millis(1)).unwrap(), 4);
        assert_eq!(&buffer, b"abcd");
        assert_eq!(port.read_bytes(&mut buffer, Duration::from_millis(1)).unwrap(), 2);
        assert_eq!(&buffer[..2], b"ef");
        assert_eq!(port.read_bytes(&mut buffer, Duration::from_millis(1)).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mock_central_requires_connection() {
        let central = MockCentral::new();
        let peer = BdAddr::new([1, 2, 3, 4, 5, 6]);
        assert_eq!(
            central.discover_services(peer).await,
            Err(BleError::NotConnected)
        );

        central.connect(peer).await.unwrap();
        assert!(central.is_connected().await);
        assert!(central.discover_services(peer).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_central_scripted_notifications() {
        let peer = BdAddr::new([1, 2, 3, 4, 5, 6]);
        let central = MockCentral::with_environmental_sensor(peer, "SENSOR").await;
        central.connect(peer).await.unwrap();

        let characteristic = environmental_sensing_service().characteristics[0].clone();
        let mut rx = central.subscribe(peer, &characteristic).await.unwrap();

        let start = tokio::time::Instant::now();
        assert_eq!(rx.recv().await, Some(2140i16.to_le_bytes().to_vec()));
        assert_eq!(start.elapsed(), Duration::from_millis(9_500));
        rx.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(39_500));
    }
}
