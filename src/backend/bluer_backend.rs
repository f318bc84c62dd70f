//! BlueZ backend implementation (via bluer)

use std::{sync::Mutex, time::Duration};

use bluer::{
    Adapter, AdapterEvent, Address, Device, DiscoveryFilter, DiscoveryTransport,
    gatt::remote::Characteristic,
};
use futures::StreamExt;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    backend::{BleCentral, BleTransport, NotificationReceiver},
    core::{
        error::{BleError, BleResult},
        types::{
            AD_TYPE_URI, AdvertisementRecord, BdAddr, BleEvent, CharacteristicInfo, CharacteristicProperties,
            ConnectionParameters, DescriptorInfo, LocalIdentity, ServiceInfo,
        },
    },
};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const SERVICES_RESOLVED_TIMEOUT: Duration = Duration::from_secs(10);
const SERVICES_RESOLVED_POLL: Duration = Duration::from_millis(100);

/// Whether a record comes from an advertisement seen in this discovery
///
/// BlueZ replays every cached device when discovery starts. Only devices
/// heard on the air carry an RSSI.
fn is_live_advertisement(record: &AdvertisementRecord) -> bool {
    record.rssi.is_some()
}

/// Host transport backed by a BlueZ controller
///
/// The descriptor is either `default` or a controller name such as `hci0`.
#[derive(Debug, Clone)]
pub struct BluerTransport {
    descriptor: String,
}

impl BluerTransport {
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
        }
    }
}

impl BleTransport for BluerTransport {
    type Central = BluerCentral;

    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    async fn open(&self, identity: &LocalIdentity) -> BleResult<BluerCentral> {
        let unavailable = |e: bluer::Error| BleError::TransportUnavailable(e.to_string());

        let session = bluer::Session::new().await.map_err(unavailable)?;
        let adapter = if self.descriptor == "default" {
            session.default_adapter().await.map_err(unavailable)?
        } else {
            session.adapter(&self.descriptor).map_err(unavailable)?
        };

        info!("Using BLE adapter: {}", adapter.name());

        adapter.set_alias(identity.name.clone()).await?;

        // BlueZ owns the controller address; it can only be checked here
        let address = adapter.address().await?;
        if address.0 != identity.address.0 {
            warn!(
                "Controller address {} differs from requested local address {}",
                address, identity.address
            );
        }

        Ok(BluerCentral::new(session, adapter))
    }
}

/// BLE central on a BlueZ adapter
pub struct BluerCentral {
    _session: bluer::Session,
    adapter: Adapter,
    events: broadcast::Sender<BleEvent>,
    scan_task: Mutex<Option<JoinHandle<()>>>,
    notification_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BluerCentral {
    fn new(session: bluer::Session, adapter: Adapter) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            _session: session,
            adapter,
            events,
            scan_task: Mutex::new(None),
            notification_tasks: Mutex::new(Vec::new()),
        }
    }

    fn device(&self, address: BdAddr) -> BleResult<Device> {
        Ok(self.adapter.device(Address::new(address.0))?)
    }

    async fn remote_characteristic(
        &self,
        address: BdAddr,
        characteristic: &CharacteristicInfo,
    ) -> BleResult<Characteristic> {
        let service = self
            .device(address)?
            .service(characteristic.service_id)
            .await?;
        Ok(service.characteristic(characteristic.id).await?)
    }

    /// Snapshot the advertising data BlueZ holds for a device
    async fn advertisement_record(adapter: &Adapter, address: Address) -> Option<AdvertisementRecord> {
        let device = adapter.device(address).ok()?;

        Some(AdvertisementRecord {
            address: BdAddr(address.0),
            local_name: device.name().await.ok().flatten(),
            rssi: device.rssi().await.ok().flatten(),
            manufacturer_data: device
                .manufacturer_data()
                .await
                .ok()
                .flatten()
                .unwrap_or_default(),
            service_uuids: device
                .uuids()
                .await
                .ok()
                .flatten()
                .map(|uuids| uuids.into_iter().collect())
                .unwrap_or_default(),
            uri: device
                .advertising_data()
                .await
                .ok()
                .flatten()
                .and_then(|mut data| data.remove(&AD_TYPE_URI))
                .and_then(|raw| AdvertisementRecord::decode_uri(&raw)),
        })
    }

    fn abort_notification_tasks(&self) {
        if let Ok(mut tasks) = self.notification_tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }

    fn abort_scan_task(&self) {
        if let Some(task) = self.scan_task.lock().ok().and_then(|mut t| t.take()) {
            task.abort();
        }
    }
}

impl BleCentral for BluerCentral {
    fn events(&self) -> broadcast::Receiver<BleEvent> {
        self.events.subscribe()
    }

    async fn power_on(&self) -> BleResult<()> {
        self.adapter.set_powered(true).await?;
        Ok(())
    }

    async fn power_off(&self) -> BleResult<()> {
        self.adapter.set_powered(false).await?;
        Ok(())
    }

    async fn start_scanning(&self) -> BleResult<()> {
        let filter = DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: true,
            ..Default::default()
        };
        self.adapter.set_discovery_filter(filter).await?;

        // Property changes are re-emitted as `DeviceAdded`
        let discovery = self.adapter.discover_devices_with_changes().await?;
        let adapter = self.adapter.clone();
        let events = self.events.clone();

        // Discovery stays active for as long as the stream is alive
        let task = tokio::spawn(async move {
            let mut discovery = Box::pin(discovery);
            while let Some(event) = discovery.next().await {
                let AdapterEvent::DeviceAdded(address) = event else {
                    continue;
                };
                match Self::advertisement_record(&adapter, address).await {
                    Some(record) if is_live_advertisement(&record) => {
                        debug!("Advertisement from {} ({:?})", record.address, record.local_name);
                        let _ = events.send(BleEvent::Advertisement(record));
                    }
                    Some(record) => debug!("Ignoring cached device {}", record.address),
                    None => {}
                }
            }
        });

        if let Ok(mut slot) = self.scan_task.lock() {
            if let Some(previous) = slot.replace(task) {
                previous.abort();
            }
        }
        Ok(())
    }

    async fn stop_scanning(&self) -> BleResult<()> {
        self.abort_scan_task();
        Ok(())
    }

    async fn connect(&self, address: BdAddr) -> BleResult<ConnectionParameters> {
        let device = self.device(address)?;
        device
            .connect()
            .await
            .map_err(|e| BleError::ConnectFailed(e.to_string()))?;

        let _ = self.events.send(BleEvent::Connection(address));

        // BlueZ does not expose the negotiated link parameters over D-Bus
        Ok(ConnectionParameters::default())
    }

    async fn disconnect(&self, address: BdAddr) -> BleResult<()> {
        self.abort_notification_tasks();
        self.device(address)?.disconnect().await?;
        let _ = self.events.send(BleEvent::Disconnection(address));
        Ok(())
    }

    async fn discover_services(&self, address: BdAddr) -> BleResult<Vec<ServiceInfo>> {
        let device = self.device(address)?;

        tokio::time::timeout(SERVICES_RESOLVED_TIMEOUT, async {
            while !device.is_services_resolved().await? {
                tokio::time::sleep(SERVICES_RESOLVED_POLL).await;
            }
            Ok::<_, bluer::Error>(())
        })
        .await
        .map_err(|_| BleError::Backend("Timed out waiting for service resolution".into()))??;

        let mut services = Vec::new();
        for service in device.services().await? {
            services.push(ServiceInfo {
                id: service.id(),
                uuid: service.uuid().await?,
                primary: service.primary().await?,
                characteristics: Vec::new(),
            });
        }
        Ok(services)
    }

    async fn discover_characteristics(
        &self,
        address: BdAddr,
        service: &ServiceInfo,
    ) -> BleResult<Vec<CharacteristicInfo>> {
        let remote = self.device(address)?.service(service.id).await?;

        let mut characteristics = Vec::new();
        for characteristic in remote.characteristics().await? {
            let flags = characteristic.flags().await?;
            characteristics.push(CharacteristicInfo {
                service_id: service.id,
                id: characteristic.id(),
                uuid: characteristic.uuid().await?,
                properties: CharacteristicProperties {
                    read: flags.read,
                    write: flags.write,
                    write_without_response: flags.write_without_response,
                    notify: flags.notify,
                    indicate: flags.indicate,
                },
                descriptors: Vec::new(),
            });
        }
        Ok(characteristics)
    }

    async fn discover_descriptors(
        &self,
        address: BdAddr,
        characteristic: &CharacteristicInfo,
    ) -> BleResult<Vec<DescriptorInfo>> {
        let remote = self.remote_characteristic(address, characteristic).await?;

        let mut descriptors = Vec::new();
        for descriptor in remote.descriptors().await? {
            descriptors.push(DescriptorInfo {
                id: descriptor.id(),
                uuid: descriptor.uuid().await?,
            });
        }
        Ok(descriptors)
    }

    async fn read_characteristic(
        &self,
        address: BdAddr,
        characteristic: &CharacteristicInfo,
    ) -> BleResult<Vec<u8>> {
        let remote = self.remote_characteristic(address, characteristic).await?;
        Ok(remote.read().await?)
    }

    async fn subscribe(
        &self,
        address: BdAddr,
        characteristic: &CharacteristicInfo,
    ) -> BleResult<NotificationReceiver> {
        let remote = self.remote_characteristic(address, characteristic).await?;
        let notifications = remote.notify().await?;
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let uuid = characteristic.uuid;
        let task = tokio::spawn(async move {
            let mut notifications = Box::pin(notifications);
            while let Some(value) = notifications.next().await {
                if tx.send(value).is_err() {
                    break;
                }
            }
            debug!("Notification stream for {} ended", uuid);
        });

        if let Ok(mut tasks) = self.notification_tasks.lock() {
            tasks.push(task);
        }
        Ok(rx)
    }

    async fn close(&self) -> BleResult<()> {
        self.abort_scan_task();
        self.abort_notification_tasks();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_devices_are_not_advertisements() {
        let cached = AdvertisementRecord {
            address: BdAddr::new([0xC0, 0, 0, 0, 0, 1]),
            local_name: Some("TBZ_SHAM_SENSOR".into()),
            ..Default::default()
        };
        assert!(!is_live_advertisement(&cached));

        let heard = AdvertisementRecord {
            rssi: Some(-60),
            ..cached
        };
        assert!(is_live_advertisement(&heard));
    }
}
