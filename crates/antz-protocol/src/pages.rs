//! Data page layouts.
//!
//! Decoders here are stateless: they map an 8-byte payload to a typed page.
//! Combining pages (latitude halves, name fragments) is left to the caller.

use serde::Serialize;

use crate::constants::*;
use crate::error::{ProtocolError, ProtocolResult};
use crate::types::*;

fn check_payload(payload: &[u8]) -> ProtocolResult<()> {
    if payload.len() < PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooShort {
            page: payload.first().copied().unwrap_or_default(),
            expected: PAYLOAD_SIZE,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn name_fragment(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

// ============================================================================
// Asset Tracker Pages
// ============================================================================

/// Location page 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationPage1 {
    /// Asset sub-index (0-31).
    pub index: u8,
    /// Distance in metres, `None` when unknown.
    pub distance: Option<u16>,
    /// Heading in degrees.
    pub heading: f64,
    /// Decoded status byte.
    pub status: AssetStatus,
    /// Lower 16 bits of the latitude.
    pub latitude_low: u16,
}

/// Location page 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LocationPage2 {
    pub index: u8,
    /// Upper 16 bits of the latitude.
    pub latitude_high: u16,
    /// Longitude in semicircles.
    pub longitude: i32,
}

impl LocationPage2 {
    /// Combine with the lower half cached from page 1.
    pub fn latitude(&self, latitude_low: u16) -> i32 {
        (((self.latitude_high as u32) << 16) | latitude_low as u32) as i32
    }
}

/// Identification page 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentificationPage1 {
    pub index: u8,
    /// Colour / icon byte.
    pub colour: u8,
    /// First five characters of the asset name.
    pub name_upper: String,
}

/// Identification page 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentificationPage2 {
    pub index: u8,
    pub asset_type: AssetType,
    /// Last five characters of the asset name.
    pub name_lower: String,
}

/// Common page 80.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManufacturerInfo {
    pub hardware_revision: u8,
    pub manufacturer_id: u16,
    pub model_number: u16,
}

impl ManufacturerInfo {
    pub fn decode(payload: &[u8]) -> ProtocolResult<Self> {
        check_payload(payload)?;
        Ok(ManufacturerInfo {
            hardware_revision: payload[3],
            manufacturer_id: u16::from_le_bytes([payload[4], payload[5]]),
            model_number: u16::from_le_bytes([payload[6], payload[7]]),
        })
    }

    pub fn manufacturer_name(&self) -> &'static str {
        manufacturer_name(self.manufacturer_id)
    }

    pub fn model_name(&self) -> &'static str {
        model_name(self.manufacturer_id, self.model_number)
    }
}

/// Common page 81.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProductInfo {
    pub sw_revision_supplemental: u8,
    pub sw_revision_main: u8,
    pub serial_number: u32,
}

impl ProductInfo {
    pub fn decode(payload: &[u8]) -> ProtocolResult<Self> {
        check_payload(payload)?;
        Ok(ProductInfo {
            sw_revision_supplemental: payload[2],
            sw_revision_main: payload[3],
            serial_number: u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]),
        })
    }

    /// Combined software version.
    pub fn software_version(&self) -> f64 {
        software_version(self.sw_revision_main, self.sw_revision_supplemental)
    }
}

/// Common page 82.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatteryInfo {
    pub battery_id: u8,
    /// Operating time counter.
    pub ticks: u32,
    /// Fractional voltage in 1/256 V.
    pub fractional_voltage: u8,
    /// Coarse voltage, 0x0F when invalid.
    pub coarse_voltage: u8,
    pub status: BatteryStatus,
    /// Each tick is 2 seconds rather than 16.
    pub two_second_resolution: bool,
}

impl BatteryInfo {
    pub fn decode(payload: &[u8]) -> ProtocolResult<Self> {
        check_payload(payload)?;
        let descriptive = payload[7];
        Ok(BatteryInfo {
            battery_id: payload[2],
            ticks: u32::from_le_bytes([payload[3], payload[4], payload[5], 0]),
            fractional_voltage: payload[6],
            coarse_voltage: descriptive & 0x0F,
            status: BatteryStatus::from_bits(descriptive >> 4),
            two_second_resolution: descriptive & 0x80 != 0,
        })
    }

    /// Battery voltage, `None` when the coarse value is invalid.
    pub fn voltage(&self) -> Option<f64> {
        if self.coarse_voltage == BATTERY_VOLTAGE_INVALID {
            return None;
        }
        Some(self.coarse_voltage as f64 + self.fractional_voltage as f64 / 256.0)
    }

    /// Operating time in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        let resolution = if self.two_second_resolution { 2 } else { 16 };
        self.ticks as u64 * resolution
    }
}

/// A decoded asset tracker page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AssetPage {
    Location1(LocationPage1),
    Location2(LocationPage2),
    NoAssets,
    Identification1(IdentificationPage1),
    Identification2(IdentificationPage2),
    Disconnect,
    Manufacturer(ManufacturerInfo),
    Product(ProductInfo),
    Battery(BatteryInfo),
    /// Page number this crate does not interpret.
    Unknown(u8),
}

impl AssetPage {
    /// Decode an 8-byte asset tracker payload.
    pub fn decode(payload: &[u8]) -> ProtocolResult<Self> {
        check_payload(payload)?;
        let index = payload[1] & ASSET_INDEX_MASK;

        let page = match payload[0] {
            PAGE_LOCATION_1 => {
                let distance = u16::from_le_bytes([payload[2], payload[3]]);
                AssetPage::Location1(LocationPage1 {
                    index,
                    distance: (distance != DISTANCE_UNKNOWN).then_some(distance),
                    heading: heading_degrees(payload[4]),
                    status: AssetStatus::from(payload[5]),
                    latitude_low: u16::from_le_bytes([payload[6], payload[7]]),
                })
            }
            PAGE_LOCATION_2 => AssetPage::Location2(LocationPage2 {
                index,
                latitude_high: u16::from_le_bytes([payload[2], payload[3]]),
                longitude: i32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]),
            }),
            PAGE_NO_ASSETS => AssetPage::NoAssets,
            PAGE_IDENTIFICATION_1 => AssetPage::Identification1(IdentificationPage1 {
                index,
                colour: payload[2],
                name_upper: name_fragment(&payload[3..8]),
            }),
            PAGE_IDENTIFICATION_2 => AssetPage::Identification2(IdentificationPage2 {
                index,
                asset_type: AssetType::from(payload[2]),
                name_lower: name_fragment(&payload[3..8]),
            }),
            PAGE_DISCONNECT => AssetPage::Disconnect,
            PAGE_MANUFACTURER_IDENT => AssetPage::Manufacturer(ManufacturerInfo::decode(payload)?),
            PAGE_PRODUCT_INFO => AssetPage::Product(ProductInfo::decode(payload)?),
            PAGE_BATTERY_STATUS => AssetPage::Battery(BatteryInfo::decode(payload)?),
            other => AssetPage::Unknown(other),
        };
        Ok(page)
    }

    /// Page number this variant was decoded from.
    pub fn page_number(&self) -> u8 {
        match self {
            AssetPage::Location1(_) => PAGE_LOCATION_1,
            AssetPage::Location2(_) => PAGE_LOCATION_2,
            AssetPage::NoAssets => PAGE_NO_ASSETS,
            AssetPage::Identification1(_) => PAGE_IDENTIFICATION_1,
            AssetPage::Identification2(_) => PAGE_IDENTIFICATION_2,
            AssetPage::Disconnect => PAGE_DISCONNECT,
            AssetPage::Manufacturer(_) => PAGE_MANUFACTURER_IDENT,
            AssetPage::Product(_) => PAGE_PRODUCT_INFO,
            AssetPage::Battery(_) => PAGE_BATTERY_STATUS,
            AssetPage::Unknown(page) => *page,
        }
    }
}

// ============================================================================
// Heart Rate Pages
// ============================================================================

/// Heart rate broadcast. Every HRM page carries the same last four bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeartRatePage {
    /// Page number with the toggle bit cleared.
    pub page: u8,
    /// Page change toggle.
    pub toggle: bool,
    /// Time of the last heart beat event in 1/1024 s.
    pub beat_time: u16,
    /// Heart beat event counter.
    pub beat_count: u8,
    /// Computed heart rate in beats per minute.
    pub heart_rate: u8,
}

impl HeartRatePage {
    pub fn decode(payload: &[u8]) -> ProtocolResult<Self> {
        check_payload(payload)?;
        Ok(HeartRatePage {
            page: payload[0] & HRM_PAGE_MASK,
            toggle: payload[0] & HRM_TOGGLE_BIT != 0,
            beat_time: u16::from_le_bytes([payload[4], payload[5]]),
            beat_count: payload[6],
            heart_rate: payload[7],
        })
    }

    /// Whether the heart rate is within the plausible range.
    pub fn is_plausible(&self) -> bool {
        (HEART_RATE_MIN..=HEART_RATE_MAX).contains(&self.heart_rate)
    }
}
