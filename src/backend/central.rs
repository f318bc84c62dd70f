//! BLE central collaborator trait definitions

use tokio::sync::{broadcast, mpsc};
use trait_variant::make;

use crate::core::{
    error::BleResult,
    types::{
        BdAddr, BleEvent, CharacteristicInfo, ConnectionParameters, DescriptorInfo, LocalIdentity,
        ServiceInfo,
    },
};

/// Stream of raw notification payloads for one subscribed characteristic
pub type NotificationReceiver = mpsc::UnboundedReceiver<Vec<u8>>;

/// Opens a BLE central on a host transport
#[make(Send)]
pub trait BleTransport: Sync + 'static {
    type Central: BleCentral;

    /// Human readable transport descriptor, for logs
    fn descriptor(&self) -> &str;

    /// Open the transport and bind a local device identity to it
    async fn open(&self, identity: &LocalIdentity) -> BleResult<Self::Central>;
}

/// Abstraction over a host BLE stack acting in the central role
///
/// The GATT protocol itself lives behind this trait; the session only
/// sequences these operations.
#[make(Send)]
pub trait BleCentral: Send + Sync + 'static {
    /// Subscribe to advertisement and link events
    fn events(&self) -> broadcast::Receiver<BleEvent>;

    async fn power_on(&self) -> BleResult<()>;

    async fn power_off(&self) -> BleResult<()>;

    async fn start_scanning(&self) -> BleResult<()>;

    async fn stop_scanning(&self) -> BleResult<()>;

    /// Establish a link-layer connection
    async fn connect(&self, address: BdAddr) -> BleResult<ConnectionParameters>;

    async fn disconnect(&self, address: BdAddr) -> BleResult<()>;

    /// Discover primary services, without their characteristics
    async fn discover_services(&self, address: BdAddr) -> BleResult<Vec<ServiceInfo>>;

    /// Discover the characteristics of one service, without descriptors
    async fn discover_characteristics(
        &self,
        address: BdAddr,
        service: &ServiceInfo,
    ) -> BleResult<Vec<CharacteristicInfo>>;

    async fn discover_descriptors(
        &self,
        address: BdAddr,
        characteristic: &CharacteristicInfo,
    ) -> BleResult<Vec<DescriptorInfo>>;

    async fn read_characteristic(
        &self,
        address: BdAddr,
        characteristic: &CharacteristicInfo,
    ) -> BleResult<Vec<u8>>;

    /// Enable notifications and return the payload stream
    async fn subscribe(
        &self,
        address: BdAddr,
        characteristic: &CharacteristicInfo,
    ) -> BleResult<NotificationReceiver>;

    /// Close the host transport
    async fn close(&self) -> BleResult<()>;
}
