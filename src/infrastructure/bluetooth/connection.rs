//! BLE Connection Module
//!
//! [`GattTransport`] over a btleplug peripheral. Requests are queued to a
//! worker task which talks to the adapter and reports results back as
//! [`TransportEvent`]s.

use crate::domain::models::{
    CharProperties, DiscoveredCharacteristic, DiscoveredService, TransportRequest,
};
use crate::error::TransportError;
use crate::infrastructure::bluetooth::transport::{GattTransport, TransportEvent};
use anyhow::{Context, Result};
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Peripheral as _, WriteType,
};
use btleplug::platform::{Adapter, Peripheral, PeripheralId};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Handle to a running connection worker
#[derive(Debug, Clone)]
pub struct BleConnection {
    requests: mpsc::UnboundedSender<TransportRequest>,
}

impl BleConnection {
    /// Spawn the worker for `peripheral`. Must be called inside a tokio runtime.
    pub fn spawn(
        adapter: Adapter,
        peripheral: Peripheral,
        event_sender: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        let (requests, request_rx) = mpsc::unbounded_channel();
        let worker = ConnectionWorker {
            peripheral,
            event_sender,
            linked: Arc::new(AtomicBool::new(false)),
            notifications: None,
        };
        tokio::spawn(worker.run(adapter, request_rx));
        Self { requests }
    }

    fn enqueue(&self, request: TransportRequest) -> Result<(), TransportError> {
        self.requests
            .send(request)
            .map_err(|_| TransportError::Closed)
    }
}

impl GattTransport for BleConnection {
    fn connect(&mut self, address: &str) -> Result<(), TransportError> {
        self.enqueue(TransportRequest::Connect(address.to_string()))
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.enqueue(TransportRequest::Disconnect)
    }

    fn read(&mut self, characteristic: Uuid) -> Result<(), TransportError> {
        self.enqueue(TransportRequest::Read(characteristic))
    }

    fn write(&mut self, characteristic: Uuid, value: &[u8]) -> Result<(), TransportError> {
        self.enqueue(TransportRequest::Write {
            characteristic,
            value: value.to_vec(),
        })
    }

    fn set_notification(
        &mut self,
        characteristic: Uuid,
        enabled: bool,
    ) -> Result<(), TransportError> {
        self.enqueue(TransportRequest::SetNotification {
            characteristic,
            enabled,
        })
    }
}

struct ConnectionWorker {
    peripheral: Peripheral,
    event_sender: mpsc::UnboundedSender<TransportEvent>,
    // Set while a link is up; cleared by whoever reports Disconnected first
    linked: Arc<AtomicBool>,
    notifications: Option<JoinHandle<()>>,
}

impl ConnectionWorker {
    async fn run(
        mut self,
        adapter: Adapter,
        mut requests: mpsc::UnboundedReceiver<TransportRequest>,
    ) {
        let watcher = tokio::spawn(watch_disconnects(
            adapter,
            self.peripheral.id(),
            self.linked.clone(),
            self.event_sender.clone(),
        ));

        while let Some(request) = requests.recv().await {
            if let Err(e) = self.execute(&request).await {
                warn!("{:?} failed: {:#}", request, e);
                if matches!(request, TransportRequest::Connect(_)) {
                    self.abandon_link().await;
                }
            }
        }

        info!("Request channel closed, shutting down connection worker");
        self.stop_notifications();
        watcher.abort();
        if self.linked.load(Ordering::SeqCst) {
            if let Err(e) = self.peripheral.disconnect().await {
                error!("Disconnect on shutdown failed: {}", e);
            }
        }
    }

    async fn execute(&mut self, request: &TransportRequest) -> Result<()> {
        match request {
            TransportRequest::Connect(address) => self.connect(address).await,
            TransportRequest::Disconnect => {
                info!("Disconnecting...");
                self.stop_notifications();
                self.peripheral.disconnect().await?;
                self.report_disconnected();
                Ok(())
            }
            TransportRequest::Read(id) => {
                let characteristic = self.characteristic(*id)?;
                let value = self.peripheral.read(&characteristic).await?;
                debug!("Read {} bytes from {}", value.len(), id);
                self.send(TransportEvent::DataAvailable {
                    characteristic: *id,
                    value,
                });
                Ok(())
            }
            TransportRequest::Write {
                characteristic,
                value,
            } => {
                let target = self.characteristic(*characteristic)?;
                let write_type = if target
                    .properties
                    .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE)
                {
                    WriteType::WithoutResponse
                } else {
                    WriteType::WithResponse
                };
                self.peripheral.write(&target, value, write_type).await?;
                debug!("Wrote {:02X?} to {}", value, characteristic);
                Ok(())
            }
            TransportRequest::SetNotification {
                characteristic,
                enabled,
            } => {
                let target = self.characteristic(*characteristic)?;
                if *enabled {
                    self.peripheral.subscribe(&target).await?;
                } else {
                    self.peripheral.unsubscribe(&target).await?;
                }
                info!(
                    "Notifications {} for {}",
                    if *enabled { "enabled" } else { "disabled" },
                    characteristic
                );
                Ok(())
            }
        }
    }

    async fn connect(&mut self, address: &str) -> Result<()> {
        info!("Connecting to {}...", address);
        self.peripheral
            .connect()
            .await
            .with_context(|| format!("connect to {}", address))?;
        self.linked.store(true, Ordering::SeqCst);
        self.send(TransportEvent::Connected);

        self.peripheral
            .discover_services()
            .await
            .context("service discovery")?;
        let services = self.discovered_services();
        info!("Discovered {} services", services.len());

        self.start_notifications().await?;
        self.send(TransportEvent::ServicesDiscovered(services));
        Ok(())
    }

    fn discovered_services(&self) -> Vec<DiscoveredService> {
        self.peripheral
            .services()
            .into_iter()
            .map(|service| DiscoveredService {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .into_iter()
                    .map(|c| DiscoveredCharacteristic {
                        uuid: c.uuid,
                        properties: CharProperties::from_bits_truncate(c.properties.bits()),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Pump the peripheral's notification stream into DataAvailable events
    async fn start_notifications(&mut self) -> Result<()> {
        self.stop_notifications();
        let mut stream = self
            .peripheral
            .notifications()
            .await
            .context("notification stream")?;
        let sender = self.event_sender.clone();
        self.notifications = Some(tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                let event = TransportEvent::DataAvailable {
                    characteristic: notification.uuid,
                    value: notification.value,
                };
                if sender.send(event).is_err() {
                    break;
                }
            }
            debug!("Notification stream ended");
        }));
        Ok(())
    }

    fn stop_notifications(&mut self) {
        if let Some(handle) = self.notifications.take() {
            handle.abort();
        }
    }

    fn characteristic(&self, id: Uuid) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == id)
            .ok_or_else(|| TransportError::CharacteristicNotFound(id).into())
    }

    /// Tear down a half-built link so a retried connect starts clean, then
    /// let the session fall back out of Connecting
    async fn abandon_link(&mut self) {
        self.stop_notifications();
        if self.linked.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.peripheral.disconnect().await {
                error!("Disconnect after failed connect: {}", e);
            }
        }
        self.send(TransportEvent::Disconnected);
    }

    fn report_disconnected(&self) {
        if self.linked.swap(false, Ordering::SeqCst) {
            self.send(TransportEvent::Disconnected);
        }
    }

    fn send(&self, event: TransportEvent) {
        if self.event_sender.send(event).is_err() {
            debug!("Transport event receiver dropped");
        }
    }
}

/// Report link loss seen on the adapter's event stream
async fn watch_disconnects(
    adapter: Adapter,
    id: PeripheralId,
    linked: Arc<AtomicBool>,
    event_sender: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut events = match adapter.events().await {
        Ok(events) => events,
        Err(e) => {
            warn!("Could not subscribe to adapter events: {}", e);
            return;
        }
    };

    while let Some(event) = events.next().await {
        if let CentralEvent::DeviceDisconnected(peripheral) = event {
            if peripheral == id && linked.swap(false, Ordering::SeqCst) {
                info!("Device {:?} disconnected", peripheral);
                if event_sender.send(TransportEvent::Disconnected).is_err() {
                    break;
                }
            }
        }
    }
}
