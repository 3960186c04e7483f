//! Scripted in-memory platform used by the tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::device::constants::uuid_from_u16;
use crate::device::platform::{
    BluetoothPlatform, CharacteristicProperties, GattCharacteristic, GattService, GattSession,
    NotificationStream, PlatformDevice, RequestDeviceOptions, ValueNotification,
};
use crate::error::{BluetoothErrorKind, PlatformError};

struct MockPlatformInner {
    supported: bool,
    outcomes: Mutex<VecDeque<Result<MockDevice, PlatformError>>>,
    requests: AtomicUsize,
}

#[derive(Clone)]
pub struct MockPlatform {
    inner: Arc<MockPlatformInner>,
}

impl MockPlatform {
    fn with_support(supported: bool) -> Self {
        MockPlatform {
            inner: Arc::new(MockPlatformInner {
                supported,
                outcomes: Mutex::new(VecDeque::new()),
                requests: AtomicUsize::new(0),
            }),
        }
    }

    pub fn new() -> Self {
        Self::with_support(true)
    }

    pub fn unsupported() -> Self {
        Self::with_support(false)
    }

    /// The next chooser prompt picks `device`.
    pub fn push_device(&self, device: MockDevice) {
        self.inner.outcomes.lock().unwrap().push_back(Ok(device));
    }

    /// The next chooser prompt fails with `err`.
    pub fn push_error(&self, err: PlatformError) {
        self.inner.outcomes.lock().unwrap().push_back(Err(err));
    }

    pub fn request_count(&self) -> usize {
        self.inner.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BluetoothPlatform for MockPlatform {
    type Device = MockDevice;

    fn is_supported(&self) -> bool {
        self.inner.supported
    }

    async fn request_device(&self, options: &RequestDeviceOptions) -> Result<MockDevice, PlatformError> {
        self.inner.requests.fetch_add(1, Ordering::SeqCst);
        assert!(!options.accept_all_devices);

        let outcome = self.inner.outcomes.lock().unwrap().pop_front();
        match outcome {
            Some(outcome) => outcome,
            None => Err(PlatformError::new(BluetoothErrorKind::NotFound, "User cancelled the requestDevice() chooser.")),
        }
    }
}

/// Platform calls a test can make fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Connect,
    PrimaryServices,
    Notifications,
    Subscribe,
    Disconnect,
}

/// Lets a test observe a connect attempt while it is in flight.
#[derive(Clone, Default)]
pub struct ConnectGate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

struct MockDeviceInner {
    id: String,
    name: Option<String>,
    services: Mutex<Vec<GattService>>,
    values: Mutex<HashMap<Uuid, Vec<u8>>>,
    failures: Mutex<HashMap<MockOperation, PlatformError>>,
    gate: Mutex<Option<ConnectGate>>,
    connected: AtomicBool,
    connects: AtomicUsize,
    subscribed: Mutex<Vec<Uuid>>,
    senders: Mutex<Vec<UnboundedSender<ValueNotification>>>,
}

#[derive(Clone)]
pub struct MockDevice {
    inner: Arc<MockDeviceInner>,
}

impl MockDevice {
    pub fn new(id: &str, name: &str) -> Self {
        MockDevice {
            inner: Arc::new(MockDeviceInner {
                id: id.to_string(),
                name: Some(name.to_string()),
                services: Mutex::new(vec![]),
                values: Mutex::new(HashMap::new()),
                failures: Mutex::new(HashMap::new()),
                gate: Mutex::new(None),
                connected: AtomicBool::new(false),
                connects: AtomicUsize::new(0),
                subscribed: Mutex::new(vec![]),
                senders: Mutex::new(vec![]),
            }),
        }
    }

    /// Adds a characteristic under the given service. A readable
    /// characteristic without `value` fails its reads.
    pub fn with_characteristic(self, service: u16, characteristic: u16, read: bool, notify: bool, value: Option<Vec<u8>>) -> Self {
        let service_uuid = uuid_from_u16(service);
        let uuid = uuid_from_u16(characteristic);

        {
            let mut services = self.inner.services.lock().unwrap();
            let characteristic = GattCharacteristic {
                uuid,
                service_uuid,
                properties: CharacteristicProperties { read, notify },
            };

            match services.iter_mut().find(|s| s.uuid == service_uuid) {
                Some(existing) => existing.characteristics.push(characteristic),
                None => services.push(GattService { uuid: service_uuid, characteristics: vec![characteristic] }),
            }
        }

        if let Some(value) = value {
            self.inner.values.lock().unwrap().insert(uuid, value);
        }

        self
    }

    /// Every later `operation` call fails with `err`.
    pub fn fail(&self, operation: MockOperation, err: PlatformError) {
        self.inner.failures.lock().unwrap().insert(operation, err);
    }

    fn check(&self, operation: MockOperation) -> Result<(), PlatformError> {
        match self.inner.failures.lock().unwrap().get(&operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    pub fn gate_connect(&self) -> ConnectGate {
        let gate = ConnectGate::default();
        *self.inner.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn subscribed(&self) -> Vec<Uuid> {
        self.inner.subscribed.lock().unwrap().clone()
    }

    /// Pushes a value as if the peripheral notified it.
    pub fn push(&self, characteristic: u16, value: &[u8]) {
        let notification = ValueNotification { uuid: uuid_from_u16(characteristic), value: value.to_vec() };
        for sender in self.inner.senders.lock().unwrap().iter() {
            let _ = sender.unbounded_send(notification.clone());
        }
    }
}

#[async_trait]
impl PlatformDevice for MockDevice {
    type Session = MockDevice;

    fn id(&self) -> String {
        self.inner.id.clone()
    }

    fn name(&self) -> Option<String> {
        self.inner.name.clone()
    }

    async fn connect(&self) -> Result<MockDevice, PlatformError> {
        let gate = self.inner.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        self.check(MockOperation::Connect)?;

        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        self.inner.connected.store(true, Ordering::SeqCst);
        Ok(self.clone())
    }
}

#[async_trait]
impl GattSession for MockDevice {
    async fn primary_services(&self) -> Result<Vec<GattService>, PlatformError> {
        self.check(MockOperation::PrimaryServices)?;
        Ok(self.inner.services.lock().unwrap().clone())
    }

    async fn read(&self, characteristic: &GattCharacteristic) -> Result<Vec<u8>, PlatformError> {
        let value = self.inner.values.lock().unwrap().get(&characteristic.uuid).cloned();
        value.ok_or_else(|| PlatformError::new(BluetoothErrorKind::Network, "GATT operation failed"))
    }

    async fn subscribe(&self, characteristic: &GattCharacteristic) -> Result<(), PlatformError> {
        self.check(MockOperation::Subscribe)?;
        self.inner.subscribed.lock().unwrap().push(characteristic.uuid);
        Ok(())
    }

    async fn notifications(&self) -> Result<NotificationStream, PlatformError> {
        self.check(MockOperation::Notifications)?;
        let (tx, rx) = unbounded();
        self.inner.senders.lock().unwrap().push(tx);
        Ok(Box::pin(rx))
    }

    async fn is_connected(&self) -> Result<bool, PlatformError> {
        Ok(self.inner.connected.load(Ordering::SeqCst))
    }

    async fn disconnect(&self) -> Result<(), PlatformError> {
        self.check(MockOperation::Disconnect)?;
        self.inner.connected.store(false, Ordering::SeqCst);
        self.inner.senders.lock().unwrap().clear();
        Ok(())
    }
}
