//! BLE transport built on `btleplug`.
//!
//! ```no_run
//! use std::sync::Arc;
//! use hublink::transport::btle::BtleAdapter;
//! use hublink::{Session, SessionConfig};
//!
//! # async fn run() -> hublink::Result<()> {
//! let adapter = BtleAdapter::first().await?;
//! let session = Session::new(SessionConfig::default(), Arc::new(adapter))?;
//! session.connect().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{BoxFuture, HubAdapter, HubDevice, LinkEvent};
use crate::config::SessionConfig;
use crate::error::{HubError, Result};

/// How often the scan results are polled.
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Capacity of the notification channel handed to the session.
const NOTIFICATION_CAPACITY: usize = 256;

fn connection_error(what: &str, e: btleplug::Error) -> HubError {
    HubError::Connection(format!("{}: {}", what, e))
}

/// Scans a host Bluetooth adapter for hubs.
#[derive(Clone)]
pub struct BtleAdapter {
    adapter: Adapter,
}

impl BtleAdapter {
    /// Wrap an existing adapter.
    pub fn new(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Use the first Bluetooth adapter of the host.
    pub async fn first() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|e| connection_error("bluetooth manager unavailable", e))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| connection_error("failed to list adapters", e))?
            .into_iter()
            .next()
            .ok_or_else(|| HubError::Connection("no bluetooth adapter found".to_string()))?;
        Ok(Self::new(adapter))
    }

    async fn find_hub(&self, config: &SessionConfig) -> Result<Peripheral> {
        // Scan unfiltered and match on advertised services; some platforms
        // do not match 128-bit UUIDs in scan filters.
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| connection_error("failed to start scan", e))?;

        let deadline = tokio::time::Instant::now() + config.scan_timeout;
        let found = loop {
            let peripherals = self
                .adapter
                .peripherals()
                .await
                .map_err(|e| connection_error("failed to list peripherals", e))?;

            let mut hub = None;
            for peripheral in peripherals {
                let props = match peripheral.properties().await.ok().flatten() {
                    Some(props) => props,
                    None => continue,
                };
                if props.services.contains(&config.service_uuid)
                    || props.service_data.contains_key(&config.service_uuid)
                {
                    tracing::debug!(
                        id = %peripheral.id(),
                        name = ?props.local_name,
                        rssi = ?props.rssi,
                        "Hub found"
                    );
                    hub = Some(peripheral);
                    break;
                }
            }

            if let Some(peripheral) = hub {
                break Some(peripheral);
            }
            if tokio::time::Instant::now() >= deadline {
                break None;
            }
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
        };

        if let Err(e) = self.adapter.stop_scan().await {
            tracing::warn!("Failed to stop scan: {}", e);
        }

        found.ok_or_else(|| {
            HubError::Connection(format!(
                "no hub advertising {} within {:?}",
                config.service_uuid, config.scan_timeout
            ))
        })
    }
}

impl HubAdapter for BtleAdapter {
    fn select_device<'a>(
        &'a self,
        config: &'a SessionConfig,
    ) -> BoxFuture<'a, Result<Arc<dyn HubDevice>>> {
        Box::pin(async move {
            let peripheral = self.find_hub(config).await?;
            let device: Arc<dyn HubDevice> =
                Arc::new(BtleDevice::new(self.adapter.clone(), peripheral));
            Ok(device)
        })
    }
}

#[derive(Clone)]
struct Characteristics {
    write: Characteristic,
    notify: Characteristic,
}

/// A hub reached over BLE.
pub struct BtleDevice {
    adapter: Adapter,
    peripheral: Peripheral,
    characteristics: Mutex<Option<Characteristics>>,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
}

impl BtleDevice {
    fn new(adapter: Adapter, peripheral: Peripheral) -> Self {
        Self {
            adapter,
            peripheral,
            characteristics: Mutex::new(None),
            forwarders: Mutex::new(Vec::new()),
        }
    }

    fn characteristics(&self) -> Result<Characteristics> {
        self.characteristics
            .lock()
            .map_err(|_| HubError::Connection("characteristic table poisoned".to_string()))?
            .clone()
            .ok_or_else(|| HubError::Connection("characteristics not discovered".to_string()))
    }

    fn abort_forwarders(&self) {
        if let Ok(mut forwarders) = self.forwarders.lock() {
            for task in forwarders.drain(..) {
                task.abort();
            }
        }
    }
}

impl HubDevice for BtleDevice {
    fn name(&self) -> String {
        self.peripheral.id().to_string()
    }

    fn connect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.peripheral
                .connect()
                .await
                .map_err(|e| connection_error("GATT connect failed", e))
        })
    }

    fn discover<'a>(&'a self, config: &'a SessionConfig) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.peripheral
                .discover_services()
                .await
                .map_err(|e| connection_error("service discovery failed", e))?;

            let all = self.peripheral.characteristics();
            let find = |uuid| {
                all.iter()
                    .find(|c| c.uuid == uuid && c.service_uuid == config.service_uuid)
                    .cloned()
                    .ok_or_else(|| HubError::Connection(format!("characteristic {} missing", uuid)))
            };
            let found = Characteristics {
                write: find(config.write_characteristic)?,
                notify: find(config.notify_characteristic)?,
            };

            *self
                .characteristics
                .lock()
                .map_err(|_| HubError::Connection("characteristic table poisoned".to_string()))? =
                Some(found);
            Ok(())
        })
    }

    fn subscribe(&self) -> BoxFuture<'_, Result<mpsc::Receiver<LinkEvent>>> {
        Box::pin(async move {
            let chars = self.characteristics()?;
            self.peripheral
                .subscribe(&chars.notify)
                .await
                .map_err(|e| connection_error("subscribe failed", e))?;

            let mut notifications = self
                .peripheral
                .notifications()
                .await
                .map_err(|e| connection_error("notification stream unavailable", e))?;
            let mut central_events = self
                .adapter
                .events()
                .await
                .map_err(|e| connection_error("adapter event stream unavailable", e))?;

            let (tx, rx) = mpsc::channel(NOTIFICATION_CAPACITY);

            let notify_uuid = chars.notify.uuid;
            let values = tx.clone();
            let value_task = tokio::spawn(async move {
                while let Some(notification) = notifications.next().await {
                    if notification.uuid != notify_uuid {
                        continue;
                    }
                    let event = LinkEvent::Notification(Bytes::from(notification.value));
                    if values.send(event).await.is_err() {
                        return;
                    }
                }
            });

            let id = self.peripheral.id();
            let disconnect_task = tokio::spawn(async move {
                while let Some(event) = central_events.next().await {
                    if let CentralEvent::DeviceDisconnected(gone) = event {
                        if gone == id {
                            let _ = tx.send(LinkEvent::Disconnected).await;
                            return;
                        }
                    }
                }
            });

            if let Ok(mut forwarders) = self.forwarders.lock() {
                forwarders.push(value_task);
                forwarders.push(disconnect_task);
            }
            Ok(rx)
        })
    }

    fn write<'a>(&'a self, packet: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let chars = self.characteristics()?;
            self.peripheral
                .write(&chars.write, packet, WriteType::WithoutResponse)
                .await
                .map_err(|e| HubError::Write(e.to_string()))
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.abort_forwarders();
            self.peripheral
                .disconnect()
                .await
                .map_err(|e| connection_error("GATT disconnect failed", e))
        })
    }
}

impl Drop for BtleDevice {
    fn drop(&mut self) {
        self.abort_forwarders();
    }
}
