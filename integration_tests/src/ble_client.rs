//! BLE client for the bridge's UART service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::time::timeout;
use uuid::Uuid;

/// UART bridge service UUIDs
const UPLINK_UUID: Uuid = Uuid::from_u128(0x0000ff01_0000_1000_8000_00805f9b34fb); // Notify from device
const DOWNLINK_UUID: Uuid = Uuid::from_u128(0x0000ff02_0000_1000_8000_00805f9b34fb); // Write to device

/// BLE client connected to the bridge.
pub struct BleClient {
    peripheral: Peripheral,
    uplink_char: Characteristic,
    downlink_char: Characteristic,
    /// Notifications received so far, one entry per notification
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl BleClient {
    /// Scan for a device by name and connect.
    pub async fn connect_by_name(name: &str, scan_timeout: Duration) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapters found"))?;

        adapter.start_scan(ScanFilter::default()).await?;
        let peripheral = Self::find_device_by_name(&adapter, name, scan_timeout).await?;
        adapter.stop_scan().await?;

        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let characteristics = peripheral.characteristics();

        let uplink_char = characteristics
            .iter()
            .find(|c| c.uuid == UPLINK_UUID)
            .cloned()
            .ok_or_else(|| anyhow!("Uplink characteristic not found"))?;

        let downlink_char = characteristics
            .iter()
            .find(|c| c.uuid == DOWNLINK_UUID)
            .cloned()
            .ok_or_else(|| anyhow!("Downlink characteristic not found"))?;

        peripheral.subscribe(&uplink_char).await?;

        let frames = Arc::new(Mutex::new(Vec::new()));

        // Spawn notification handler
        let frames_clone = frames.clone();
        let peripheral_clone = peripheral.clone();
        tokio::spawn(async move {
            let mut stream = match peripheral_clone.notifications().await {
                Ok(s) => s,
                Err(_) => return,
            };

            while let Some(data) = stream.next().await {
                if data.uuid == UPLINK_UUID {
                    frames_clone.lock().await.push(data.value);
                }
            }
        });

        Ok(Self {
            peripheral,
            uplink_char,
            downlink_char,
            frames,
        })
    }

    /// Find a device by name within the scan timeout.
    async fn find_device_by_name(
        adapter: &Adapter,
        name: &str,
        scan_timeout: Duration,
    ) -> Result<Peripheral> {
        let start = std::time::Instant::now();

        while start.elapsed() < scan_timeout {
            let peripherals = adapter.peripherals().await?;

            for peripheral in peripherals {
                if let Some(props) = peripheral.properties().await? {
                    if props.local_name.as_deref() == Some(name) {
                        return Ok(peripheral);
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Err(anyhow!("Device '{}' not found within timeout", name))
    }

    /// Write one frame to the downlink characteristic.
    pub async fn write_frame(&self, data: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.downlink_char, data, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    /// Wait until at least `len` bytes have been notified, returning the frames.
    pub async fn wait_for_bytes(&self, len: usize, wait: Duration) -> Result<Vec<Vec<u8>>> {
        let result = timeout(wait, async {
            loop {
                {
                    let frames = self.frames.lock().await;
                    if frames.iter().map(Vec::len).sum::<usize>() >= len {
                        return frames.clone();
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        match result {
            Ok(frames) => Ok(frames),
            Err(_) => {
                let got: usize = self.frames.lock().await.iter().map(Vec::len).sum();
                Err(anyhow!(
                    "Timeout waiting for {} notified bytes, got {}",
                    len,
                    got
                ))
            }
        }
    }

    /// Frames notified so far.
    pub async fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().await.clone()
    }

    /// Clear any pending notifications from the buffer.
    pub async fn clear_buffer(&self) {
        self.frames.lock().await.clear();
    }

    /// Disconnect from the device.
    pub async fn disconnect(&self) -> Result<()> {
        self.peripheral.unsubscribe(&self.uplink_char).await?;
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
