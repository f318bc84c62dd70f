//! BLE central session management

use std::sync::Arc;

use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    backend::{BleCentral, BleTransport},
    core::{
        error::{BleError, BleResult},
        types::{BdAddr, BleEvent, BleEventKind, CharacteristicInfo, ConnectionParameters, LocalIdentity},
    },
};

use super::tree::GattTree;

/// Callback invoked for collaborator events of one kind
pub type EventListener = Arc<dyn Fn(&BleEvent) + Send + Sync>;

/// The single link a session may hold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Connection {
    pub peer: BdAddr,
    pub parameters: ConnectionParameters,
}

/// Procedural wrapper around a BLE central
///
/// Holds at most one connection. The discovered GATT tree is only valid
/// while that connection is, and is dropped on disconnect.
pub struct BleSession<T: BleTransport> {
    transport: T,
    identity: LocalIdentity,
    central: Option<T::Central>,
    connection: Option<Connection>,
    tree: Option<GattTree>,
    scanning: bool,
    listener_tasks: Vec<JoinHandle<()>>,
    subscription_tasks: Vec<JoinHandle<()>>,
}

impl<T: BleTransport> BleSession<T> {
    pub fn new(transport: T, identity: LocalIdentity) -> Self {
        Self {
            transport,
            identity,
            central: None,
            connection: None,
            tree: None,
            scanning: false,
            listener_tasks: Vec::new(),
            subscription_tasks: Vec::new(),
        }
    }

    fn central(&self) -> BleResult<&T::Central> {
        self.central.as_ref().ok_or(BleError::NotInitialized)
    }

    /// Open the transport and power on the local device
    pub async fn initialize(&mut self) -> BleResult<()> {
        if self.central.is_some() {
            debug!("BLE session already initialized");
            return Ok(());
        }

        info!(
            "Opening BLE transport '{}' as {} ({})",
            self.transport.descriptor(),
            self.identity.name,
            self.identity.address
        );
        let central = self.transport.open(&self.identity).await?;
        central.power_on().await?;
        self.central = Some(central);

        info!("BLE device powered on");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.central.is_some()
    }

    /// Invoke `callback` for every collaborator event of `kind`
    ///
    /// Events are delivered from a session-owned task in the order the
    /// collaborator emits them.
    pub fn register_listener<F>(&mut self, kind: BleEventKind, callback: F) -> BleResult<()>
    where
        F: Fn(&BleEvent) + Send + Sync + 'static,
    {
        let mut events = self.central()?.events();
        let callback: EventListener = Arc::new(callback);

        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.kind() == kind => callback(&event),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("{:?} listener lagged, {} events dropped", kind, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        self.listener_tasks.push(task);
        Ok(())
    }

    /// Start scanning; a no-op when already scanning
    pub async fn start_scanning(&mut self) -> BleResult<()> {
        if self.scanning {
            debug!("Scanning already active");
            return Ok(());
        }
        self.central()?.start_scanning().await?;
        self.scanning = true;
        info!("Scanning has been started");
        Ok(())
    }

    /// Stop scanning; a no-op when not scanning
    pub async fn stop_scanning(&mut self) -> BleResult<()> {
        if !self.scanning {
            debug!("Scanning not active");
            return Ok(());
        }
        self.central()?.stop_scanning().await?;
        self.scanning = false;
        info!("Scanning has been stopped");
        Ok(())
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Establish the session's connection to `address`
    pub async fn connect(&mut self, address: BdAddr) -> BleResult<ConnectionParameters> {
        if let Some(connection) = &self.connection {
            return Err(BleError::AlreadyConnected(connection.peer.to_string()));
        }

        let parameters = self.central()?.connect(address).await?;
        self.connection = Some(Connection {
            peer: address,
            parameters,
        });

        info!("=== Connected to {}", address);
        Ok(parameters)
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Parameters of the current connection, if any
    pub fn connection_parameters(&self) -> Option<ConnectionParameters> {
        self.connection.map(|connection| connection.parameters)
    }

    /// Discover services, characteristics and descriptors, in that order
    ///
    /// Every step completes before the next starts. The resulting tree is
    /// cached for reads and subscriptions.
    pub async fn discover_services(&mut self) -> BleResult<&GattTree> {
        let peer = self.connection.ok_or(BleError::NotConnected)?.peer;
        let central = self.central()?;

        info!("=== Discovering services");
        let mut services = central.discover_services(peer).await?;
        for service in &mut services {
            service.characteristics = central.discover_characteristics(peer, service).await?;
            for characteristic in &mut service.characteristics {
                characteristic.descriptors =
                    central.discover_descriptors(peer, characteristic).await?;
            }
        }

        let tree = GattTree::new(services);
        info!("=== Services discovered\n{}", tree.render());
        Ok(self.tree.insert(tree))
    }

    /// The cached GATT tree of the current connection
    pub fn services(&self) -> Option<&GattTree> {
        self.tree.as_ref()
    }

    fn lookup(&self, uuid: &Uuid) -> BleResult<(BdAddr, CharacteristicInfo)> {
        let peer = self.connection.ok_or(BleError::NotConnected)?.peer;
        let characteristic = self
            .tree
            .as_ref()
            .and_then(|tree| tree.characteristic(uuid))
            .ok_or(BleError::CharacteristicNotFound(*uuid))?;
        Ok((peer, characteristic.clone()))
    }

    /// Read the current value of a discovered characteristic
    pub async fn read_characteristic(&self, uuid: &Uuid) -> BleResult<Vec<u8>> {
        let (peer, characteristic) = self.lookup(uuid)?;
        self.central()?.read_characteristic(peer, &characteristic).await
    }

    /// Enable notifications and feed every payload to `handler`
    ///
    /// Unknown UUIDs fail with `CharacteristicNotFound`, like reads.
    pub async fn subscribe_to_characteristic<F>(&mut self, uuid: &Uuid, mut handler: F) -> BleResult<()>
    where
        F: FnMut(Vec<u8>) + Send + 'static,
    {
        let (peer, characteristic) = self.lookup(uuid)?;
        let mut notifications = self.central()?.subscribe(peer, &characteristic).await?;

        let task = tokio::spawn(async move {
            while let Some(payload) = notifications.recv().await {
                handler(payload);
            }
        });
        self.subscription_tasks.push(task);

        info!("Subscribed to {}", uuid);
        Ok(())
    }

    fn abort_subscriptions(&mut self) {
        for task in self.subscription_tasks.drain(..) {
            task.abort();
        }
    }

    /// Tear down the current connection, logging rather than returning errors
    pub async fn disconnect(&mut self) {
        self.abort_subscriptions();
        self.tree = None;

        let Some(connection) = self.connection.take() else {
            return;
        };
        let Some(central) = &self.central else {
            return;
        };

        match central.disconnect(connection.peer).await {
            Ok(()) => info!("Disconnected from BLE device."),
            Err(e) => warn!("Error during BLE disconnection: {}", e),
        }
    }

    /// Power off the device and close the transport
    ///
    /// Both steps are attempted independently; errors are logged. Calling
    /// this more than once is harmless.
    pub async fn close(&mut self) {
        self.abort_subscriptions();
        for task in self.listener_tasks.drain(..) {
            task.abort();
        }
        self.connection = None;
        self.tree = None;
        self.scanning = false;

        let Some(central) = self.central.take() else {
            return;
        };

        match central.power_off().await {
            Ok(()) => info!("BLE device powered off."),
            Err(e) => warn!("Error during BLE device shutdown: {}", e),
        }
        match central.close().await {
            Ok(()) => info!("BLE transport closed."),
            Err(e) => warn!("Error while closing BLE transport: {}", e),
        }
    }
}
