//! Common types used in the protocol.

use std::fmt;

use serde::Serialize;

use crate::constants::*;

/// Key of all per-device state: device number, device type and
/// transmission type. All three must match for two identities to be equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeviceIdentity {
    /// Device number (16 bits).
    pub number: u16,
    /// Device type.
    pub device_type: u8,
    /// Transmission type.
    pub transmission_type: u8,
}

impl DeviceIdentity {
    /// Create a new identity.
    pub fn new(number: u16, device_type: u8, transmission_type: u8) -> Self {
        DeviceIdentity {
            number,
            device_type,
            transmission_type,
        }
    }

    /// Profile implied by the device type.
    pub fn profile(&self) -> Profile {
        Profile::from_device_type(self.device_type)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.number, self.device_type, self.transmission_type
        )
    }
}

/// Sensor profile inferred from the device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Heart rate monitor (0x78).
    HeartRate,
    /// Asset tracker (0x29).
    AssetTracker,
    /// Anything else.
    Unknown,
}

impl Profile {
    /// Map a device type to a profile.
    pub fn from_device_type(device_type: u8) -> Self {
        match device_type {
            DEVICE_TYPE_HRM => Profile::HeartRate,
            DEVICE_TYPE_ASSET_TRACKER => Profile::AssetTracker,
            _ => Profile::Unknown,
        }
    }

    /// Short name used in topics and logs.
    pub fn short_name(&self) -> &'static str {
        match self {
            Profile::HeartRate => "hrm",
            Profile::AssetTracker => "asset",
            Profile::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// What a tracked asset is doing, from bits 5-7 of the status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AssetSituation {
    Unknown,
    OnPoint,
    Treeing,
    Running,
    Caught,
    Barking,
    Training,
    Hunting,
    /// Status byte was 0xFF.
    Undefined,
}

impl AssetSituation {
    /// Decode the situation from a full status byte.
    pub fn from_status(status: u8) -> Self {
        if status == STATUS_UNDEFINED {
            return AssetSituation::Undefined;
        }
        match (status >> 5) & 0x07 {
            0 => AssetSituation::Unknown,
            1 => AssetSituation::OnPoint,
            2 => AssetSituation::Treeing,
            3 => AssetSituation::Running,
            4 => AssetSituation::Caught,
            5 => AssetSituation::Barking,
            6 => AssetSituation::Training,
            _ => AssetSituation::Hunting,
        }
    }
}

/// Decoded asset status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssetStatus {
    pub gps_lost: bool,
    pub comms_lost: bool,
    pub remove_requested: bool,
    pub low_battery: bool,
    pub situation: AssetSituation,
}

impl From<u8> for AssetStatus {
    fn from(status: u8) -> Self {
        AssetStatus {
            gps_lost: status & 0x01 != 0,
            comms_lost: status & 0x02 != 0,
            remove_requested: status & 0x04 != 0,
            low_battery: status & 0x08 != 0,
            situation: AssetSituation::from_status(status),
        }
    }
}

/// Asset type byte from identification page 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssetType {
    Tracker,
    DogCollar,
    Reserved(u8),
}

impl From<u8> for AssetType {
    fn from(value: u8) -> Self {
        match value {
            0 => AssetType::Tracker,
            1 => AssetType::DogCollar,
            other => AssetType::Reserved(other),
        }
    }
}

/// Battery status field of common page 82.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatteryStatus {
    New,
    Good,
    Ok,
    Low,
    Critical,
    Reserved,
}

impl BatteryStatus {
    /// Decode from the 3-bit status value (bits 4-6 of the descriptive byte).
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            1 => BatteryStatus::New,
            2 => BatteryStatus::Good,
            3 => BatteryStatus::Ok,
            4 => BatteryStatus::Low,
            5 => BatteryStatus::Critical,
            _ => BatteryStatus::Reserved,
        }
    }
}

impl fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatteryStatus::New => "New",
            BatteryStatus::Good => "Good",
            BatteryStatus::Ok => "Ok",
            BatteryStatus::Low => "Low",
            BatteryStatus::Critical => "Critical",
            BatteryStatus::Reserved => "Reserved",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// Convert a bradian byte (256 per turn) to degrees.
pub fn heading_degrees(bradians: u8) -> f64 {
    bradians as f64 / BRADIANS_PER_TURN * 360.0
}

/// Convert semicircles (±2^31 = ±180°) to degrees.
pub fn semicircles_to_degrees(semicircles: i32) -> f64 {
    semicircles as f64 * 180.0 / SEMICIRCLES_PER_HALF_TURN
}

/// Software version from the main and supplemental revision bytes.
pub fn software_version(main: u8, supplemental: u8) -> f64 {
    if supplemental != 0xFF {
        (main as f64 * 100.0 + supplemental as f64) / 1000.0
    } else {
        main as f64 / 10.0
    }
}

/// Human readable name of a device type.
pub fn describe_device_type(device_type: u8) -> &'static str {
    match device_type {
        DEVICE_TYPE_HRM => "Heart Rate Monitor",
        DEVICE_TYPE_BIKE_SPEED => "Bike Speed Sensor",
        DEVICE_TYPE_BIKE_SPEED_CADENCE => "Bike Speed/Cadence Sensor",
        DEVICE_TYPE_GENERIC_GPS => "Generic GPS",
        DEVICE_TYPE_TEMPERATURE => "Temperature Sensor",
        DEVICE_TYPE_STRIDE => "Stride-Based Speed/Distance",
        DEVICE_TYPE_DOG_COLLAR => "Garmin Dog Collar",
        DEVICE_TYPE_ASSET_TRACKER => "Asset Tracker",
        _ => "Unknown",
    }
}

/// Manufacturer name for an ANT+ manufacturer id.
pub fn manufacturer_name(id: u16) -> &'static str {
    match id {
        1 => "Garmin",
        _ => "?",
    }
}

/// Model name for a manufacturer's model number.
pub fn model_name(manufacturer_id: u16, model: u16) -> &'static str {
    match (manufacturer_id, model) {
        (1, 3528) => "Alpha 10",
        (1, 1339) => "Astro 320",
        _ => "?",
    }
}
