use std::time::SystemTime;
use log::warn;
use uuid::Uuid;

use crate::device::constants::{
    short_uuid, CHARACTERISTIC_BATTERY_LEVEL, CHARACTERISTIC_BLOOD_PRESSURE_MEASUREMENT,
    CHARACTERISTIC_HEART_RATE_MEASUREMENT, CHARACTERISTIC_TEMPERATURE_MEASUREMENT, SERVICE_BATTERY,
    SERVICE_BLOOD_PRESSURE, SERVICE_HEALTH_THERMOMETER, SERVICE_HEART_RATE,
};
use crate::device::types::{BloodPressure, HealthSample};
use crate::error::ParseError;

const HEART_RATE_FLAG_U16: u8 = 0x01;

fn read_u8(value: &[u8], offset: usize) -> Result<u8, ParseError> {
    value.get(offset).copied().ok_or(ParseError::TooShort { needed: offset + 1, actual: value.len() })
}

fn read_u16_le(value: &[u8], offset: usize) -> Result<u16, ParseError> {
    match value.get(offset..offset + 2) {
        Some(bytes) => Ok(u16::from_le_bytes([bytes[0], bytes[1]])),
        None => Err(ParseError::TooShort { needed: offset + 2, actual: value.len() }),
    }
}

/// Decodes one characteristic value. `Ok(None)` means the UUID is not an
/// encoding we understand.
pub fn try_parse_characteristic_data(uuid: &Uuid, value: &[u8], timestamp: SystemTime) -> Result<Option<HealthSample>, ParseError> {
    let short = match short_uuid(uuid) {
        Some(short) => short,
        None => return Ok(None),
    };

    let mut sample = HealthSample::new(timestamp);

    match short {
        CHARACTERISTIC_HEART_RATE_MEASUREMENT | SERVICE_HEART_RATE => {
            let flags = read_u8(value, 0)?;
            let heart_rate = if flags & HEART_RATE_FLAG_U16 != 0 {
                read_u16_le(value, 1)?
            } else {
                read_u8(value, 1)? as u16
            };
            sample.heart_rate = Some(heart_rate);
        },
        CHARACTERISTIC_BLOOD_PRESSURE_MEASUREMENT | SERVICE_BLOOD_PRESSURE => {
            // the flags byte is not interpreted; the layout is always systolic, diastolic
            let _flags = read_u8(value, 0)?;
            let systolic = read_u16_le(value, 1)?;
            let diastolic = read_u16_le(value, 3)?;
            sample.blood_pressure = Some(BloodPressure { systolic, diastolic });
        },
        CHARACTERISTIC_TEMPERATURE_MEASUREMENT | SERVICE_HEALTH_THERMOMETER => {
            let _flags = read_u8(value, 0)?;
            let raw = read_u16_le(value, 1)?;
            sample.temperature = Some(raw as f64 / 100.0);
        },
        CHARACTERISTIC_BATTERY_LEVEL | SERVICE_BATTERY => {
            sample.battery_level = Some(read_u8(value, 0)?);
        },
        _ => {},
    }

    if sample.is_empty() {
        return Ok(None);
    }

    Ok(Some(sample))
}

/// Parses a characteristic value into a health sample, timestamped now.
/// Malformed values are logged and yield `None`.
pub fn parse_characteristic_data(uuid: &Uuid, value: &[u8]) -> Option<HealthSample> {
    match try_parse_characteristic_data(uuid, value, SystemTime::now()) {
        Ok(sample) => sample,
        Err(err) => {
            warn!("Error parsing characteristic {} data: {}", uuid, err);
            None
        },
    }
}
