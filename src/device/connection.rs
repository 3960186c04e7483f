use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;
use futures::StreamExt;
use indexmap::IndexMap;
use log::{debug, error, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device::classify::{detect_device_brand, detect_device_type};
use crate::device::listeners::ListenerRegistry;
use crate::device::parse::parse_characteristic_data;
use crate::device::platform::{
    BluetoothPlatform, GattCharacteristic, GattSession, NotificationStream, PlatformDevice, RequestDeviceOptions,
};
use crate::device::types::{ConnectionStatus, DataType, DeviceRecord, HealthSample};
use crate::error::{BluetoothErrorKind, LinkError, PlatformError};

type SessionOf<P> = <<P as BluetoothPlatform>::Device as PlatformDevice>::Session;

struct NotificationPump {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl NotificationPump {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(err) = self.handle.await {
            error!("Notification task failed: {:?}", err);
        }
    }
}

struct DeviceEntry<P: BluetoothPlatform> {
    record: DeviceRecord,
    device: P::Device,
    // present iff record.is_connected
    session: Option<SessionOf<P>>,
    notifications: Option<NotificationPump>,
    connecting: bool,
}

/// Runs the closure when dropped, so in-progress flags are cleared on every
/// exit path, including a dropped future.
struct ClearOnDrop<F: FnMut()> {
    clear: F,
}

impl<F: FnMut()> Drop for ClearOnDrop<F> {
    fn drop(&mut self) {
        (self.clear)();
    }
}

/// Owns discovery, connections and data dispatch for health peripherals.
///
/// Construct one per application session. The device map, the listener
/// registry and the connection status are only reachable through its methods.
pub struct DeviceLink<P: BluetoothPlatform> {
    platform: P,
    devices: Mutex<IndexMap<String, DeviceEntry<P>>>,
    status: Mutex<ConnectionStatus>,
    listeners: ListenerRegistry,
}

fn read_notifications_task(cancel: CancellationToken, device_id: String, mut stream: NotificationStream, listeners: ListenerRegistry) -> JoinHandle<()> {
    spawn(async move {
        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                data = stream.next() => {
                    match data {
                        Some(data) => {
                            if let Some(sample) = parse_characteristic_data(&data.uuid, &data.value) {
                                listeners.notify(&device_id, sample);
                            }
                        },
                        None => {
                            debug!("Notification stream of {} ended", device_id);
                            break 'mainloop;
                        },
                    }
                },
            }
        }
    })
}

impl<P: BluetoothPlatform> DeviceLink<P> {
    pub fn new(platform: P) -> Self {
        DeviceLink {
            platform,
            devices: Mutex::new(IndexMap::new()),
            status: Mutex::new(ConnectionStatus::default()),
            listeners: ListenerRegistry::new(),
        }
    }

    fn lock_devices(&self) -> MutexGuard<'_, IndexMap<String, DeviceEntry<P>>> {
        self.devices.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_status(&self) -> MutexGuard<'_, ConnectionStatus> {
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores the failure in the shared status and converts it for the caller.
    /// The in-progress flags are cleared since the failed call was the one in progress.
    fn record_error(&self, err: PlatformError) -> LinkError {
        let err = self.record_rejection(err);

        let mut status = self.lock_status();
        status.is_connecting = false;
        status.is_discovering = false;

        err
    }

    /// Like `record_error`, for calls refused because another call is in
    /// progress; that call's flags stay set.
    fn record_rejection(&self, err: PlatformError) -> LinkError {
        warn!("Bluetooth operation failed: {}", err);
        let err = LinkError::from(err);
        self.lock_status().error = Some(err.to_string());
        err
    }

    /// Detaches the session and notification pump of `device_id` and marks it
    /// disconnected. `None` for unknown ids.
    fn take_session(&self, device_id: &str) -> Option<(Option<SessionOf<P>>, Option<NotificationPump>)> {
        let mut devices = self.lock_devices();
        let entry = devices.get_mut(device_id)?;
        entry.record.is_connected = false;
        Some((entry.session.take(), entry.notifications.take()))
    }

    pub fn is_supported(&self) -> bool {
        self.platform.is_supported()
    }

    pub fn get_connection_status(&self) -> ConnectionStatus {
        self.lock_status().clone()
    }

    /// Records of every device that currently holds an open session.
    pub fn get_connected_devices(&self) -> Vec<DeviceRecord> {
        self.lock_devices().values()
            .filter(|entry| entry.record.is_connected)
            .map(|entry| entry.record.clone())
            .collect()
    }

    /// Records of every discovered device, connected or not, in discovery order.
    pub fn get_devices(&self) -> Vec<DeviceRecord> {
        self.lock_devices().values().map(|entry| entry.record.clone()).collect()
    }

    pub fn get_device(&self, device_id: &str) -> Option<DeviceRecord> {
        self.lock_devices().get(device_id).map(|entry| entry.record.clone())
    }

    /// The last non-empty sample dispatched for `device_id`.
    pub fn latest_sample(&self, device_id: &str) -> Option<HealthSample> {
        self.listeners.latest(device_id)
    }

    /// Prompts for one health device. The result holds at most one record.
    pub async fn discover_devices(&self) -> Result<Vec<DeviceRecord>, LinkError> {
        if !self.is_supported() {
            return Err(self.record_error(PlatformError::not_supported()));
        }

        self.lock_status().is_discovering = true;
        let _discovering = ClearOnDrop { clear: || self.lock_status().is_discovering = false };

        let options = RequestDeviceOptions::health_devices();
        let device = match self.platform.request_device(&options).await {
            Ok(device) => device,
            Err(err) => return Err(self.record_error(err)),
        };

        let id = device.id();
        let name = device.name().unwrap_or_else(|| "Unknown Device".to_string());
        info!("Discovered {} ({})", name, id);

        let mut devices = self.lock_devices();
        let entry = devices.entry(id.clone()).or_insert_with(|| DeviceEntry {
            record: DeviceRecord {
                id,
                device_type: detect_device_type(&name),
                brand: detect_device_brand(&name),
                model: name.clone(),
                name,
                is_connected: false,
                last_sync: SystemTime::now(),
                data_types: vec![],
            },
            device,
            session: None,
            notifications: None,
            connecting: false,
        });

        Ok(vec![entry.record.clone()])
    }

    /// Opens a GATT session to a discovered device and starts reading its data.
    pub async fn connect_to_device(&self, device_id: &str) -> Result<DeviceRecord, LinkError> {
        if !self.is_supported() {
            return Err(self.record_error(PlatformError::not_supported()));
        }

        let existing = {
            let devices = self.lock_devices();
            match devices.get(device_id) {
                Some(entry) => entry.session.clone().map(|session| (session, entry.record.clone())),
                None => return Err(LinkError::UnknownDevice { id: device_id.to_string() }),
            }
        };

        if let Some((session, record)) = existing {
            match session.is_connected().await {
                Ok(true) => {
                    debug!("Device {} is already connected", device_id);
                    return Ok(record);
                },
                Ok(false) => info!("Device {} dropped the connection; reconnecting", device_id),
                Err(err) => warn!("Error checking connection of {}; reconnecting: {}", device_id, err),
            }

            if let Some((_, Some(pump))) = self.take_session(device_id) {
                pump.stop().await;
            }
        }

        let device = {
            let mut devices = self.lock_devices();
            let entry = match devices.get_mut(device_id) {
                Some(entry) => entry,
                None => return Err(LinkError::UnknownDevice { id: device_id.to_string() }),
            };

            if entry.connecting || entry.session.is_some() {
                None
            } else {
                entry.connecting = true;
                Some(entry.device.clone())
            }
        };

        let device = match device {
            Some(device) => device,
            None => return Err(self.record_rejection(PlatformError::new(
                BluetoothErrorKind::InvalidState,
                "A connection to this device is already in progress",
            ))),
        };

        self.lock_status().is_connecting = true;
        let _connecting = ClearOnDrop {
            clear: || {
                self.lock_status().is_connecting = false;
                if let Some(entry) = self.lock_devices().get_mut(device_id) {
                    entry.connecting = false;
                }
            },
        };

        let session = match device.connect().await {
            Ok(session) => session,
            Err(err) => return Err(self.record_error(err)),
        };

        let record = {
            let mut devices = self.lock_devices();
            devices.get_mut(device_id).map(|entry| {
                entry.session = Some(session.clone());
                entry.record.is_connected = true;
                entry.record.last_sync = SystemTime::now();
                entry.record.clone()
            })
        };

        let record = match record {
            Some(record) => record,
            None => {
                // the device map was cleared while connecting
                if let Err(err) = session.disconnect().await {
                    warn!("Failed to close orphaned session: {}", err);
                }
                return Err(self.record_error(PlatformError::new(
                    BluetoothErrorKind::InvalidState,
                    "Device was removed while connecting",
                )));
            },
        };

        info!("Connected to {}", record.name);
        *self.lock_status() = ConnectionStatus {
            is_connected: true,
            device_name: Some(record.name.clone()),
            error: None,
            is_connecting: false,
            is_discovering: false,
        };

        self.start_data_reading(device_id, &session).await;

        Ok(self.get_device(device_id).unwrap_or(record))
    }

    /// Reads every readable characteristic once and subscribes to every
    /// notifying one. Failures are logged and skipped.
    async fn start_data_reading(&self, device_id: &str, session: &SessionOf<P>) {
        let services = match session.primary_services().await {
            Ok(services) => services,
            Err(err) => {
                warn!("Error reading device data: {}", err);
                return;
            },
        };

        let mut data_types: Vec<DataType> = vec![];
        let mut stream: Option<NotificationStream> = None;
        let mut stream_failed = false;
        let mut subscribed = false;

        for service in &services {
            debug!("Service {} has {} characteristics", service.uuid, service.characteristics.len());

            for characteristic in &service.characteristics {
                if let Some(data_type) = DataType::from_uuid(&characteristic.uuid) {
                    if !data_types.contains(&data_type) {
                        data_types.push(data_type);
                    }
                }

                if characteristic.properties.read {
                    self.read_characteristic(device_id, session, characteristic).await;
                }

                if characteristic.properties.notify {
                    // open the stream before the first subscription so no push is missed
                    if stream.is_none() && !stream_failed {
                        match session.notifications().await {
                            Ok(s) => stream = Some(s),
                            Err(err) => {
                                warn!("Error opening notification stream: {}", err);
                                stream_failed = true;
                            },
                        }
                    }

                    if stream.is_some() {
                        match session.subscribe(characteristic).await {
                            Ok(()) => {
                                debug!("Subscribed to {} {}", characteristic.service_uuid, characteristic.uuid);
                                subscribed = true;
                            },
                            Err(err) => warn!("Error starting notifications for {}: {}", characteristic.uuid, err),
                        }
                    }
                }
            }
        }

        let mut devices = self.lock_devices();
        let entry = match devices.get_mut(device_id) {
            Some(entry) if entry.record.is_connected => entry,
            _ => return,
        };

        entry.record.data_types = data_types;

        if let (Some(stream), true) = (stream, subscribed) {
            let cancel = CancellationToken::new();
            let handle = read_notifications_task(cancel.clone(), device_id.to_string(), stream, self.listeners.clone());
            if let Some(previous) = entry.notifications.replace(NotificationPump { cancel, handle }) {
                previous.cancel.cancel();
            }
        }
    }

    async fn read_characteristic(&self, device_id: &str, session: &SessionOf<P>, characteristic: &GattCharacteristic) {
        match session.read(characteristic).await {
            Ok(value) => {
                if let Some(sample) = parse_characteristic_data(&characteristic.uuid, &value) {
                    self.listeners.notify(device_id, sample);
                }
            },
            Err(err) => warn!("Error reading characteristic {}: {}", characteristic.uuid, err),
        }
    }

    /// Closes the session of `device_id`. The record stays known. Unknown ids are ignored.
    pub async fn disconnect_device(&self, device_id: &str) {
        let (session, pump) = match self.take_session(device_id) {
            Some(taken) => taken,
            None => return,
        };

        if let Some(pump) = pump {
            pump.stop().await;
        }

        if let Some(session) = session {
            match session.is_connected().await {
                Ok(true) => {
                    if let Err(err) = session.disconnect().await {
                        error!("Error disconnecting device: {}", err);
                    }
                },
                Ok(false) => debug!("Device {} already dropped the connection", device_id),
                Err(err) => error!("Error checking connection of {}: {}", device_id, err),
            }
            info!("Disconnected from {}", device_id);
        }

        let focal = {
            let devices = self.lock_devices();
            devices.values()
                .find(|entry| entry.record.is_connected)
                .map(|entry| entry.record.name.clone())
        };

        let mut status = self.lock_status();
        status.is_connected = focal.is_some();
        status.device_name = focal;
        status.error = None;
    }

    /// Disconnects everything and forgets all devices and listeners.
    pub async fn disconnect_all(&self) {
        let ids: Vec<String> = self.lock_devices().keys().cloned().collect();

        for id in ids {
            self.disconnect_device(&id).await;
        }

        self.lock_devices().clear();
        self.listeners.clear();
        *self.lock_status() = ConnectionStatus::default();
    }

    /// Registers the data callback of `device_id`, replacing any previous one.
    pub fn add_data_listener<F>(&self, device_id: &str, callback: F)
    where
        F: Fn(&HealthSample) + Send + Sync + 'static,
    {
        self.listeners.insert(device_id, Arc::new(callback));
    }

    pub fn remove_data_listener(&self, device_id: &str) {
        self.listeners.remove(device_id);
    }

    #[cfg(test)]
    fn has_session(&self, device_id: &str) -> bool {
        self.lock_devices().get(device_id).map(|entry| entry.session.is_some()).unwrap_or(false)
    }

    #[cfg(test)]
    fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }
}
