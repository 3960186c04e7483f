use uuid::Uuid;

/**
 * How long (milliseconds) the device chooser scans before picking a peripheral.
 */
pub const DEFAULT_SCAN_DURATION: u64 = 5000;

/**
 * 16-bit assigned numbers of the GATT services health peripherals expose.
 */
pub const SERVICE_HEART_RATE: u16 = 0x180D;
pub const SERVICE_HEALTH_THERMOMETER: u16 = 0x1809;
pub const SERVICE_BLOOD_PRESSURE: u16 = 0x1810;
pub const SERVICE_WEIGHT_SCALE: u16 = 0x181D;
pub const SERVICE_FITNESS_MACHINE: u16 = 0x1826;
pub const SERVICE_BATTERY: u16 = 0x180F;
pub const SERVICE_DEVICE_INFORMATION: u16 = 0x180A;

/**
 * 16-bit assigned numbers of the GATT characteristics that are parsed.
 */
pub const CHARACTERISTIC_HEART_RATE_MEASUREMENT: u16 = 0x2A37;
pub const CHARACTERISTIC_BLOOD_PRESSURE_MEASUREMENT: u16 = 0x2A35;
pub const CHARACTERISTIC_TEMPERATURE_MEASUREMENT: u16 = 0x2A1C;
pub const CHARACTERISTIC_BATTERY_LEVEL: u16 = 0x2A19;

/**
 * Services the chooser asks access to, in addition to whatever the filters match.
 */
pub const OPTIONAL_SERVICES: [u16; 7] = [
    SERVICE_HEART_RATE,
    SERVICE_HEALTH_THERMOMETER,
    SERVICE_BLOOD_PRESSURE,
    SERVICE_WEIGHT_SCALE,
    SERVICE_FITNESS_MACHINE,
    SERVICE_BATTERY,
    SERVICE_DEVICE_INFORMATION,
];

/**
 * Advertised name prefixes of consumer health brands and generic health peripherals.
 */
pub const NAME_PREFIXES: [&str; 15] = [
    "Fitbit",
    "Apple Watch",
    "Galaxy Watch",
    "Garmin",
    "Polar",
    "Withings",
    "Omron",
    "iHealth",
    "Qardio",
    "Beurer",
    "HR",
    "BP",
    "Temp",
    "Scale",
    "Tracker",
];

const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Expands a 16-bit assigned number into the full Bluetooth base UUID.
pub fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// The 16-bit assigned number carried by a Bluetooth base UUID. `None` for
/// UUIDs outside the base, such as vendor services.
pub fn short_uuid(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    if value & !(0xFFFF_u128 << 96) != BLUETOOTH_BASE_UUID {
        return None;
    }

    Some(((value >> 96) & 0xFFFF) as u16)
}
