//! BLE Scanner Module
//!
//! One-shot discovery of the peripheral a session should be opened for.

use crate::domain::profile::DeviceProfile;
use anyhow::{anyhow, Result};
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use std::time::Duration;
use tracing::{debug, info};

/// A peripheral picked by [`find_peripheral`]
#[derive(Debug, Clone)]
pub struct FoundDevice {
    pub name: Option<String>,
    pub address: String,
    pub peripheral: Peripheral,
}

/// Get the first Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No Bluetooth adapter found"))
}

/// Whether a device matches the user's target. Addresses compare case-insensitively.
fn matches_target(target: &str, name: Option<&str>, address: &str) -> bool {
    address.eq_ignore_ascii_case(target) || name.is_some_and(|n| n.contains(target))
}

/// Scan for `timeout` and return the device matching `target` (an address or
/// a name fragment), or the first OpenBCI board when no target is given.
pub async fn find_peripheral(
    adapter: &Adapter,
    target: Option<&str>,
    timeout: Duration,
) -> Result<FoundDevice> {
    info!("Scanning for {:?} ({}s)...", target, timeout.as_secs());
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(timeout).await;

    let peripherals = adapter.peripherals().await?;
    adapter.stop_scan().await?;

    for peripheral in peripherals {
        let name = peripheral
            .properties()
            .await?
            .and_then(|props| props.local_name);
        let address = peripheral.address().to_string();
        debug!("Seen {} {:?}", address, name);

        let matches = match target {
            Some(t) => matches_target(t, name.as_deref(), &address),
            None => !DeviceProfile::classify(name.as_deref()).is_generic(),
        };

        if matches {
            info!("Found {} ({:?})", address, name);
            return Ok(FoundDevice {
                name,
                address,
                peripheral,
            });
        }
    }

    Err(anyhow!(
        "No matching device found{}",
        target.map(|t| format!(" for '{}'", t)).unwrap_or_default()
    ))
}
