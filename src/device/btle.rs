use async_trait::async_trait;
use btleplug::api::{Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::time::{sleep, Duration};

use crate::device::constants::DEFAULT_SCAN_DURATION;
use crate::device::platform::{
    BluetoothPlatform, CharacteristicProperties, GattCharacteristic, GattService, GattSession,
    NotificationStream, PlatformDevice, RequestDeviceOptions, ValueNotification,
};
use crate::error::{BluetoothErrorKind, PlatformError};

/// One radio that can be put into and out of scanning.
#[async_trait]
trait Scanner: Send + Sync {
    async fn start(&self) -> Result<(), PlatformError>;
    async fn stop(&self) -> Result<(), PlatformError>;
}

#[async_trait]
impl Scanner for Adapter {
    async fn start(&self) -> Result<(), PlatformError> {
        // names are matched after the scan; a service filter would hide devices matched only by name
        Ok(self.start_scan(ScanFilter::default()).await?)
    }

    async fn stop(&self) -> Result<(), PlatformError> {
        Ok(self.stop_scan().await?)
    }
}

async fn stop_scanning<S: Scanner>(scanners: &[S]) {
    for scanner in scanners {
        if let Err(err) = scanner.stop().await {
            warn!("Failed to stop scanning: {}", err);
        }
    }
}

/// Starts every scanner, or none: on a failure the ones already started are stopped again.
async fn start_scanning<S: Scanner>(scanners: &[S]) -> Result<(), PlatformError> {
    for (started, scanner) in scanners.iter().enumerate() {
        if let Err(err) = scanner.start().await {
            stop_scanning(&scanners[..started]).await;
            return Err(err);
        }
    }

    Ok(())
}

/// btleplug backed platform. There is no chooser UI, so a request scans for
/// `scan_duration` and picks the first peripheral whose name matches a prefix.
pub struct BtleplugPlatform {
    adapters: Vec<Adapter>,
    scan_duration: Duration,
}

impl BtleplugPlatform {
    pub async fn new(scan_duration: Duration) -> Self {
        let adapters = match Manager::new().await {
            Ok(manager) => match manager.adapters().await {
                Ok(adapters) => adapters,
                Err(err) => {
                    warn!("Failed to list BLE adapters: {}", err);
                    vec![]
                },
            },
            Err(err) => {
                warn!("Failed to create BLE manager: {}", err);
                vec![]
            },
        };

        for adapter in &adapters {
            info!("Using adapter {}", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        }

        BtleplugPlatform { adapters, scan_duration }
    }

    pub async fn with_default_scan() -> Self {
        Self::new(Duration::from_millis(DEFAULT_SCAN_DURATION)).await
    }

    async fn pick_peripheral(&self, options: &RequestDeviceOptions) -> Result<Option<BtleDevice>, PlatformError> {
        for adapter in &self.adapters {
            let peripherals = match adapter.peripherals().await {
                Ok(v) => v,
                Err(err) => {
                    warn!("Failed to query BLE adapter for peripherals: {}", err);
                    continue;
                },
            };

            for peripheral in peripherals {
                let properties = match peripheral.properties().await {
                    Ok(Some(properties)) => properties,
                    Ok(None) => continue,
                    Err(err) => {
                        warn!("Could not query peripheral for properties: {:?}", err);
                        continue;
                    },
                };

                let name = match properties.local_name {
                    Some(name) => name,
                    None => continue,
                };

                if options.matches_name(&name) {
                    info!("Picked peripheral {} {}", properties.address, name);
                    return Ok(Some(BtleDevice { peripheral, name: Some(name) }));
                }
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl BluetoothPlatform for BtleplugPlatform {
    type Device = BtleDevice;

    fn is_supported(&self) -> bool {
        !self.adapters.is_empty()
    }

    async fn request_device(&self, options: &RequestDeviceOptions) -> Result<BtleDevice, PlatformError> {
        if !self.is_supported() {
            return Err(PlatformError::not_supported());
        }

        start_scanning(self.adapters.as_slice()).await?;

        debug!("Scanning for {:?}", self.scan_duration);
        sleep(self.scan_duration).await;

        let picked = self.pick_peripheral(options).await;
        stop_scanning(self.adapters.as_slice()).await;

        match picked? {
            Some(device) => Ok(device),
            None => Err(PlatformError::new(BluetoothErrorKind::NotFound, "No device matched the chooser filters")),
        }
    }
}

#[derive(Clone)]
pub struct BtleDevice {
    peripheral: Peripheral,
    name: Option<String>,
}

#[async_trait]
impl PlatformDevice for BtleDevice {
    type Session = BtleSession;

    fn id(&self) -> String {
        format!("{:?}", self.peripheral.id())
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn connect(&self) -> Result<BtleSession, PlatformError> {
        info!("Connecting to peripheral...");
        self.peripheral.connect().await?;

        info!("Connected; Discovering services...");
        self.peripheral.discover_services().await?;

        Ok(BtleSession { peripheral: self.peripheral.clone() })
    }
}

#[derive(Clone)]
pub struct BtleSession {
    peripheral: Peripheral,
}

impl BtleSession {
    fn find_characteristic(&self, characteristic: &GattCharacteristic) -> Result<Characteristic, PlatformError> {
        self.peripheral.characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic.uuid && c.service_uuid == characteristic.service_uuid)
            .ok_or_else(|| PlatformError::new(
                BluetoothErrorKind::InvalidState,
                format!("Characteristic {} is not available", characteristic.uuid),
            ))
    }
}

fn convert_characteristic(characteristic: &Characteristic) -> GattCharacteristic {
    GattCharacteristic {
        uuid: characteristic.uuid,
        service_uuid: characteristic.service_uuid,
        properties: CharacteristicProperties {
            read: characteristic.properties.contains(CharPropFlags::READ),
            notify: characteristic.properties.intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE),
        },
    }
}

#[async_trait]
impl GattSession for BtleSession {
    async fn primary_services(&self) -> Result<Vec<GattService>, PlatformError> {
        Ok(self.peripheral.services()
            .iter()
            .filter(|service| service.primary)
            .map(|service| GattService {
                uuid: service.uuid,
                characteristics: service.characteristics.iter().map(convert_characteristic).collect(),
            })
            .collect())
    }

    async fn read(&self, characteristic: &GattCharacteristic) -> Result<Vec<u8>, PlatformError> {
        let characteristic = self.find_characteristic(characteristic)?;
        Ok(self.peripheral.read(&characteristic).await?)
    }

    async fn subscribe(&self, characteristic: &GattCharacteristic) -> Result<(), PlatformError> {
        let characteristic = self.find_characteristic(characteristic)?;
        Ok(self.peripheral.subscribe(&characteristic).await?)
    }

    async fn notifications(&self) -> Result<NotificationStream, PlatformError> {
        let stream = self.peripheral.notifications().await?;
        Ok(Box::pin(stream.map(|data| ValueNotification { uuid: data.uuid, value: data.value })))
    }

    async fn is_connected(&self) -> Result<bool, PlatformError> {
        Ok(self.peripheral.is_connected().await?)
    }

    async fn disconnect(&self) -> Result<(), PlatformError> {
        Ok(self.peripheral.disconnect().await?)
    }
}
