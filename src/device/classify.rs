//! Best-effort labelling of peripherals from their advertised name.

use crate::device::types::DeviceType;

const DEVICE_TYPE_RULES: &[(&[&str], DeviceType)] = &[
    (&["watch", "fitbit", "garmin"], DeviceType::Wearable),
    (&["phone", "iphone", "android"], DeviceType::Smartphone),
    (&["bp", "blood", "omron"], DeviceType::MedicalDevice),
    (&["tracker", "fitness", "activity"], DeviceType::FitnessTracker),
];

const DEVICE_BRAND_RULES: &[(&[&str], &str)] = &[
    (&["fitbit"], "Fitbit"),
    (&["apple"], "Apple"),
    (&["samsung", "galaxy"], "Samsung"),
    (&["garmin"], "Garmin"),
    (&["polar"], "Polar"),
    (&["withings"], "Withings"),
    (&["omron"], "Omron"),
    (&["ihealth"], "iHealth"),
    (&["qardio"], "Qardio"),
    (&["beurer"], "Beurer"),
];

const DEFAULT_DEVICE_TYPE: DeviceType = DeviceType::Wearable;
const DEFAULT_BRAND: &str = "Unknown";

fn first_match<T: Copy>(name: &str, rules: &[(&[&str], T)]) -> Option<T> {
    let lower_name = name.to_lowercase();

    rules.iter()
        .find(|(keywords, _)| keywords.iter().any(|keyword| lower_name.contains(keyword)))
        .map(|(_, label)| *label)
}

pub fn detect_device_type(name: &str) -> DeviceType {
    first_match(name, DEVICE_TYPE_RULES).unwrap_or(DEFAULT_DEVICE_TYPE)
}

pub fn detect_device_brand(name: &str) -> String {
    first_match(name, DEVICE_BRAND_RULES).unwrap_or(DEFAULT_BRAND).to_string()
}
