use std::time::SystemTime;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::device::constants::{
    short_uuid, CHARACTERISTIC_BATTERY_LEVEL, CHARACTERISTIC_BLOOD_PRESSURE_MEASUREMENT,
    CHARACTERISTIC_HEART_RATE_MEASUREMENT, CHARACTERISTIC_TEMPERATURE_MEASUREMENT, SERVICE_BATTERY,
    SERVICE_BLOOD_PRESSURE, SERVICE_HEALTH_THERMOMETER, SERVICE_HEART_RATE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Wearable,
    Smartphone,
    MedicalDevice,
    FitnessTracker,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            DeviceType::Wearable => "Wearable",
            DeviceType::Smartphone => "Smartphone",
            DeviceType::MedicalDevice => "Medical device",
            DeviceType::FitnessTracker => "Fitness tracker",
        };

        write!(f, "{}", result)
    }
}

/// Kinds of health data a peripheral is known to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    HeartRate,
    BloodPressure,
    Temperature,
    BatteryLevel,
}

impl DataType {
    /// Matches a characteristic or service UUID against the encodings the parser understands.
    pub fn from_uuid(uuid: &Uuid) -> Option<DataType> {
        match short_uuid(uuid)? {
            CHARACTERISTIC_HEART_RATE_MEASUREMENT | SERVICE_HEART_RATE => Some(DataType::HeartRate),
            CHARACTERISTIC_BLOOD_PRESSURE_MEASUREMENT | SERVICE_BLOOD_PRESSURE => Some(DataType::BloodPressure),
            CHARACTERISTIC_TEMPERATURE_MEASUREMENT | SERVICE_HEALTH_THERMOMETER => Some(DataType::Temperature),
            CHARACTERISTIC_BATTERY_LEVEL | SERVICE_BATTERY => Some(DataType::BatteryLevel),
            _ => None,
        }
    }
}

fn serialize_rfc3339<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&humantime::format_rfc3339_millis(*time))
}

/// Snapshot of a discovered peripheral. The platform connection handle is kept
/// by `DeviceLink` and never part of this record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: String,
    pub name: String,
    pub device_type: DeviceType,
    pub brand: String,
    pub model: String,
    pub is_connected: bool,
    #[serde(serialize_with = "serialize_rfc3339")]
    pub last_sync: SystemTime,
    pub data_types: Vec<DataType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BloodPressure {
    pub systolic: u16,
    pub diastolic: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSample {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<BloodPressure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oxygen_saturation: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
    #[serde(serialize_with = "serialize_rfc3339")]
    pub timestamp: SystemTime,
}

impl HealthSample {
    pub fn new(timestamp: SystemTime) -> Self {
        HealthSample {
            heart_rate: None,
            steps: None,
            blood_pressure: None,
            temperature: None,
            oxygen_saturation: None,
            battery_level: None,
            timestamp,
        }
    }

    /// True when nothing besides the timestamp is populated.
    pub fn is_empty(&self) -> bool {
        self.heart_rate.is_none()
            && self.steps.is_none()
            && self.blood_pressure.is_none()
            && self.temperature.is_none()
            && self.oxygen_saturation.is_none()
            && self.battery_level.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub device_name: Option<String>,
    pub error: Option<String>,
    pub is_connecting: bool,
    pub is_discovering: bool,
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};
    use super::*;
    use crate::device::constants::uuid_from_u16;

    #[test]
    fn sample_emptiness() {
        let mut sample = HealthSample::new(SystemTime::now());
        assert!(sample.is_empty());

        sample.battery_level = Some(0);
        assert!(!sample.is_empty());
    }

    #[test]
    fn data_type_from_service_or_characteristic() {
        assert_eq!(DataType::from_uuid(&uuid_from_u16(0x2A37)), Some(DataType::HeartRate));
        assert_eq!(DataType::from_uuid(&uuid_from_u16(0x1809)), Some(DataType::Temperature));
        assert_eq!(DataType::from_uuid(&uuid_from_u16(0x2A29)), None);

        let vendor = Uuid::parse_str("0000180d-1212-efde-1523-785feabcd123").unwrap();
        assert_eq!(DataType::from_uuid(&vendor), None);
    }

    #[test]
    fn timestamps_serialize_as_rfc3339() {
        let mut sample = HealthSample::new(UNIX_EPOCH + Duration::from_millis(1_500));
        sample.heart_rate = Some(72);

        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json, serde_json::json!({ "heartRate": 72, "timestamp": "1970-01-01T00:00:01.500Z" }));

        let record = DeviceRecord {
            id: "hr-1".to_string(),
            name: "Polar H10".to_string(),
            device_type: DeviceType::Wearable,
            brand: "Polar".to_string(),
            model: "Polar H10".to_string(),
            is_connected: false,
            last_sync: UNIX_EPOCH,
            data_types: vec![DataType::HeartRate],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["lastSync"], "1970-01-01T00:00:00.000Z");
        assert_eq!(json["deviceType"], "wearable");
        assert_eq!(json["dataTypes"], serde_json::json!(["heart_rate"]));
    }

    #[test]
    fn initial_status_is_disconnected() {
        let status = ConnectionStatus::default();
        assert!(!status.is_connected);
        assert!(status.device_name.is_none());
        assert!(!status.is_connecting && !status.is_discovering);
    }
}
