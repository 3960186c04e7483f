//! The seam between `DeviceLink` and a low-energy Bluetooth stack.

use std::pin::Pin;
use async_trait::async_trait;
use futures::Stream;
use uuid::Uuid;

use crate::device::constants::{uuid_from_u16, NAME_PREFIXES, OPTIONAL_SERVICES};
use crate::error::PlatformError;

/// What the device chooser is asked to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDeviceOptions {
    pub accept_all_devices: bool,
    pub optional_services: Vec<Uuid>,
    pub name_prefixes: Vec<String>,
}

impl RequestDeviceOptions {
    /// The fixed health-device allow-list used on every discovery.
    pub fn health_devices() -> Self {
        RequestDeviceOptions {
            accept_all_devices: false,
            optional_services: OPTIONAL_SERVICES.iter().map(|short| uuid_from_u16(*short)).collect(),
            name_prefixes: NAME_PREFIXES.iter().map(|prefix| prefix.to_string()).collect(),
        }
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.accept_all_devices || self.name_prefixes.iter().any(|prefix| name.starts_with(prefix.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub notify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub properties: CharacteristicProperties,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

/// A value pushed by the peripheral for a subscribed characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueNotification {
    pub uuid: Uuid,
    pub value: Vec<u8>,
}

pub type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

#[async_trait]
pub trait BluetoothPlatform: Send + Sync + 'static {
    type Device: PlatformDevice;

    /// Whether a Bluetooth stack is available at all.
    fn is_supported(&self) -> bool;

    /// Lets the user pick one device that matches `options`.
    async fn request_device(&self, options: &RequestDeviceOptions) -> Result<Self::Device, PlatformError>;
}

#[async_trait]
pub trait PlatformDevice: Clone + Send + Sync + 'static {
    type Session: GattSession;

    fn id(&self) -> String;

    fn name(&self) -> Option<String>;

    async fn connect(&self) -> Result<Self::Session, PlatformError>;
}

/// An open GATT connection to a peripheral.
#[async_trait]
pub trait GattSession: Clone + Send + Sync + 'static {
    async fn primary_services(&self) -> Result<Vec<GattService>, PlatformError>;

    async fn read(&self, characteristic: &GattCharacteristic) -> Result<Vec<u8>, PlatformError>;

    async fn subscribe(&self, characteristic: &GattCharacteristic) -> Result<(), PlatformError>;

    /// Values of every subscribed characteristic of this session.
    async fn notifications(&self) -> Result<NotificationStream, PlatformError>;

    async fn is_connected(&self) -> Result<bool, PlatformError>;

    async fn disconnect(&self) -> Result<(), PlatformError>;
}
