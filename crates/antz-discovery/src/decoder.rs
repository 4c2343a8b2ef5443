//! Stateful page decoders.
//!
//! Each profile has a [`PageDecoder`]. A decoder reads one payload, updates
//! the [`DeviceRegistry`], and returns the event to publish together with a
//! follow-up for the dispatcher (usually "ask this tracker for its pages").

use antz_protocol::{
    semicircles_to_degrees, AssetPage, AssetStatus, AssetType, BatteryStatus, DeviceIdentity, ExtendedInfo,
    HeartRatePage, Profile,
};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::error::DecodeError;
use crate::registry::DeviceRegistry;

/// A decoded broadcast, ready to publish.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DecodedEvent {
    HeartRate {
        heart_rate: u8,
        beat_count: u8,
        beat_time: u16,
        page: u8,
    },
    AssetPosition {
        index: u8,
        distance: Option<u16>,
        heading: f64,
        status: AssetStatus,
    },
    AssetLocation {
        index: u8,
        /// `None` when location page 1 has not been seen for this index.
        latitude: Option<f64>,
        longitude: f64,
    },
    AssetIdentification {
        index: u8,
        colour: u8,
        name_upper: String,
    },
    AssetName {
        index: u8,
        asset_type: AssetType,
        name: String,
    },
    NoAssets,
    Disconnect,
    Manufacturer {
        hardware_revision: u8,
        manufacturer_id: u16,
        manufacturer: &'static str,
        model_number: u16,
        model: &'static str,
    },
    Product {
        software_version: f64,
        serial_number: u32,
    },
    Battery {
        battery_id: u8,
        voltage: Option<f64>,
        status: BatteryStatus,
        uptime_seconds: u64,
    },
    UnknownPage {
        page: u8,
        payload: String,
    },
}

/// Action the dispatcher should take after a decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Request identification, manufacturer, product and battery pages.
    RequestAssetPages,
    /// Request manufacturer and product pages.
    RequestCommonPages,
    /// Forget which pages were requested from this device.
    ClearRequestCache,
}

/// Result of decoding one payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Decoded {
    pub event: Option<DecodedEvent>,
    pub follow_up: Option<FollowUp>,
}

impl Decoded {
    fn event(event: DecodedEvent) -> Self {
        Decoded {
            event: Some(event),
            follow_up: None,
        }
    }

    fn with_follow_up(mut self, follow_up: FollowUp) -> Self {
        self.follow_up = Some(follow_up);
        self
    }
}

/// Decoder for one sensor profile.
pub trait PageDecoder {
    fn decode(
        &self,
        payload: &[u8],
        identity: Option<DeviceIdentity>,
        registry: &mut DeviceRegistry,
    ) -> Result<Decoded, DecodeError>;
}

/// Decode `payload` with the decoder for `profile`.
pub fn decode(
    profile: Profile,
    payload: &[u8],
    ext: Option<&ExtendedInfo>,
    registry: &mut DeviceRegistry,
) -> Result<Decoded, DecodeError> {
    let identity = ext.and_then(ExtendedInfo::identity);
    match profile {
        Profile::HeartRate => HeartRateDecoder.decode(payload, identity, registry),
        Profile::AssetTracker => AssetTrackerDecoder.decode(payload, identity, registry),
        Profile::Unknown => GenericDecoder.decode(payload, identity, registry),
    }
}

// ============================================================================
// Heart Rate
// ============================================================================

/// Heart rate monitor (device type 0x78).
#[derive(Debug, Clone, Copy, Default)]
pub struct HeartRateDecoder;

impl PageDecoder for HeartRateDecoder {
    fn decode(
        &self,
        payload: &[u8],
        identity: Option<DeviceIdentity>,
        registry: &mut DeviceRegistry,
    ) -> Result<Decoded, DecodeError> {
        let page = HeartRatePage::decode(payload)?;
        if !page.is_plausible() {
            debug!("Hrm[{}]: ignoring implausible heart rate {}", describe(identity), page.heart_rate);
            return Ok(Decoded::default());
        }

        if let Some(identity) = identity {
            if registry.mark_paired(identity) {
                info!("Hrm[{}]: paired", identity);
            }
        }
        debug!("Hrm[{}]: {} bpm", describe(identity), page.heart_rate);

        Ok(Decoded::event(DecodedEvent::HeartRate {
            heart_rate: page.heart_rate,
            beat_count: page.beat_count,
            beat_time: page.beat_time,
            page: page.page,
        }))
    }
}

// ============================================================================
// Asset Tracker
// ============================================================================

/// Asset tracker (device type 0x29).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssetTrackerDecoder;

impl PageDecoder for AssetTrackerDecoder {
    fn decode(
        &self,
        payload: &[u8],
        identity: Option<DeviceIdentity>,
        registry: &mut DeviceRegistry,
    ) -> Result<Decoded, DecodeError> {
        let page = AssetPage::decode(payload)?;
        let page_number = page.page_number();
        let require_identity = || identity.ok_or(DecodeError::MissingIdentity { page: page_number });

        let decoded = match page {
            AssetPage::Location1(loc) => {
                let identity = require_identity()?;
                registry.mark_paired(identity);
                registry.set_pending_latitude(identity, loc.index, loc.latitude_low);

                let asset = registry.asset_mut(identity, loc.index);
                asset.distance = loc.distance;
                asset.heading = Some(loc.heading);
                asset.status = Some(loc.status);

                debug!(
                    "Asset[{}] #{}: distance {:?} m, heading {:.1}, {:?}",
                    identity, loc.index, loc.distance, loc.heading, loc.status.situation
                );

                let decoded = Decoded::event(DecodedEvent::AssetPosition {
                    index: loc.index,
                    distance: loc.distance,
                    heading: loc.heading,
                    status: loc.status,
                });
                if registry.register_index(identity, loc.index) {
                    info!("Asset[{}]: new asset #{}", identity, loc.index);
                    decoded.with_follow_up(FollowUp::RequestAssetPages)
                } else {
                    decoded
                }
            }

            AssetPage::Location2(loc) => {
                let identity = require_identity()?;
                let longitude = semicircles_to_degrees(loc.longitude);
                let latitude = match registry.pending_latitude(&identity, loc.index) {
                    Some(lower) => Some(semicircles_to_degrees(loc.latitude(lower))),
                    None => {
                        warn!(
                            "Asset[{}] #{}: location page 2 before page 1, latitude unknown",
                            identity, loc.index
                        );
                        None
                    }
                };

                let asset = registry.asset_mut(identity, loc.index);
                asset.longitude = Some(longitude);
                if latitude.is_some() {
                    asset.latitude = latitude;
                }
                if asset.has_position() {
                    trace!(
                        "Asset[{}] #{}: position {:.6}, {:.6}",
                        identity,
                        loc.index,
                        asset.latitude.unwrap_or_default(),
                        longitude
                    );
                }

                Decoded::event(DecodedEvent::AssetLocation {
                    index: loc.index,
                    latitude,
                    longitude,
                })
            }

            AssetPage::NoAssets => {
                let identity = require_identity()?;
                let cleared = registry.clear_indexes(&identity);
                debug!("Asset[{}]: no assets, forgot {} indexes", identity, cleared);
                Decoded::event(DecodedEvent::NoAssets).with_follow_up(FollowUp::RequestAssetPages)
            }

            AssetPage::Identification1(ident) => {
                let identity = require_identity()?;
                registry.set_upper_name(identity, ident.index, ident.colour, ident.name_upper.clone());
                Decoded::event(DecodedEvent::AssetIdentification {
                    index: ident.index,
                    colour: ident.colour,
                    name_upper: ident.name_upper,
                })
            }

            AssetPage::Identification2(ident) => {
                let identity = require_identity()?;
                let name = registry.complete_name(identity, ident.index, ident.asset_type, ident.name_lower);
                info!("Asset[{}] #{}: name {:?}", identity, ident.index, name);
                Decoded::event(DecodedEvent::AssetName {
                    index: ident.index,
                    asset_type: ident.asset_type,
                    name,
                })
            }

            AssetPage::Disconnect => {
                let identity = require_identity()?;
                info!("Asset[{}]: disconnecting", identity);
                registry.forget(&identity);
                Decoded::event(DecodedEvent::Disconnect).with_follow_up(FollowUp::ClearRequestCache)
            }

            AssetPage::Manufacturer(info) => {
                if let Some(identity) = identity {
                    registry.device_mut(identity).manufacturer = Some(info);
                }
                Decoded::event(DecodedEvent::Manufacturer {
                    hardware_revision: info.hardware_revision,
                    manufacturer_id: info.manufacturer_id,
                    manufacturer: info.manufacturer_name(),
                    model_number: info.model_number,
                    model: info.model_name(),
                })
            }

            AssetPage::Product(info) => {
                if let Some(identity) = identity {
                    registry.device_mut(identity).product = Some(info);
                }
                Decoded::event(DecodedEvent::Product {
                    software_version: info.software_version(),
                    serial_number: info.serial_number,
                })
            }

            AssetPage::Battery(info) => {
                if let Some(identity) = identity {
                    registry.device_mut(identity).battery = Some(info);
                }
                Decoded::event(DecodedEvent::Battery {
                    battery_id: info.battery_id,
                    voltage: info.voltage(),
                    status: info.status,
                    uptime_seconds: info.uptime_seconds(),
                })
            }

            AssetPage::Unknown(page) => {
                info!("Asset[{}]: unknown page 0x{:02X}", describe(identity), page);
                Decoded::event(DecodedEvent::UnknownPage {
                    page,
                    payload: hex::encode_upper(payload),
                })
                .with_follow_up(FollowUp::RequestAssetPages)
            }
        };
        Ok(decoded)
    }
}

// ============================================================================
// Generic
// ============================================================================

/// Fallback for devices of unknown type.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDecoder;

impl PageDecoder for GenericDecoder {
    fn decode(
        &self,
        payload: &[u8],
        identity: Option<DeviceIdentity>,
        _registry: &mut DeviceRegistry,
    ) -> Result<Decoded, DecodeError> {
        let page = payload.first().copied().unwrap_or_default();
        debug!("Generic[{}]: page 0x{:02X}: {}", describe(identity), page, hex::encode_upper(payload));
        Ok(Decoded::event(DecodedEvent::UnknownPage {
            page,
            payload: hex::encode_upper(payload),
        })
        .with_follow_up(FollowUp::RequestCommonPages))
    }
}

fn describe(identity: Option<DeviceIdentity>) -> String {
    identity.map_or_else(|| "?".to_string(), |identity| identity.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tracker() -> DeviceIdentity {
        DeviceIdentity::new(586, 0x29, 0xD5)
    }

    fn asset(payload: [u8; 8], registry: &mut DeviceRegistry) -> Decoded {
        AssetTrackerDecoder.decode(&payload, Some(tracker()), registry).unwrap()
    }

    #[test]
    fn test_location_1_requests_pages_for_new_index() {
        let mut registry = DeviceRegistry::new();
        let page = [0x01, 0x02, 0xFF, 0xFF, 64, 0x20, 0x00, 0x00];

        let first = asset(page, &mut registry);
        assert_eq!(first.follow_up, Some(FollowUp::RequestAssetPages));
        assert_eq!(
            first.event,
            Some(DecodedEvent::AssetPosition {
                index: 2,
                distance: None,
                heading: 90.0,
                status: AssetStatus::from(0x20),
            })
        );
        assert!(registry.is_paired(&tracker()));

        let second = asset(page, &mut registry);
        assert_eq!(second.follow_up, None);
    }

    #[test]
    fn test_location_pages_combine() {
        let mut registry = DeviceRegistry::new();
        // latitude 0x1C71_C71C (about 40 degrees), longitude -1/4 turn
        asset([0x01, 0x00, 0x10, 0x00, 0, 0, 0x1C, 0xC7], &mut registry);
        let decoded = asset([0x02, 0x00, 0x71, 0x1C, 0x00, 0x00, 0x00, 0xC0], &mut registry);

        match decoded.event {
            Some(DecodedEvent::AssetLocation { index, latitude, longitude }) => {
                assert_eq!(index, 0);
                assert_relative_eq!(latitude.unwrap(), semicircles_to_degrees(0x1C71_C71C), epsilon = 1e-12);
                assert_relative_eq!(latitude.unwrap(), 40.0, epsilon = 1e-6);
                assert_relative_eq!(longitude, -90.0);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(registry.asset(&tracker(), 0).unwrap().has_position());
    }

    #[test]
    fn test_location_2_without_page_1_leaves_latitude_unknown() {
        let mut registry = DeviceRegistry::new();
        let decoded = asset([0x02, 0x03, 0x71, 0x1C, 0x00, 0x00, 0x00, 0x40], &mut registry);

        match decoded.event {
            Some(DecodedEvent::AssetLocation { latitude, longitude, .. }) => {
                assert_eq!(latitude, None);
                assert_relative_eq!(longitude, 90.0);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(!registry.asset(&tracker(), 3).unwrap().has_position());
    }

    #[test]
    fn test_names_reassemble() {
        let mut registry = DeviceRegistry::new();
        asset([0x10, 0x01, 0x05, b'A', b'B', b'C', b'D', b'E'], &mut registry);
        let decoded = asset([0x11, 0x01, 0x01, b'F', b'G', b'H', b'I', b'J'], &mut registry);

        assert_eq!(
            decoded.event,
            Some(DecodedEvent::AssetName {
                index: 1,
                asset_type: AssetType::DogCollar,
                name: "ABCDEFGHIJ".into(),
            })
        );

        let lower_only = asset([0x11, 0x04, 0x00, b'F', b'G', b'H', b'I', b'J'], &mut registry);
        match lower_only.event {
            Some(DecodedEvent::AssetName { name, .. }) => assert_eq!(name, "FGHIJ"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_no_assets_clears_indexes() {
        let mut registry = DeviceRegistry::new();
        asset([0x01, 0x00, 0, 0, 0, 0, 0, 0], &mut registry);
        asset([0x01, 0x01, 0, 0, 0, 0, 0, 0], &mut registry);
        assert_eq!(registry.known_indexes(&tracker()), vec![0, 1]);

        let decoded = asset([0x03, 0, 0, 0, 0, 0, 0, 0], &mut registry);
        assert_eq!(decoded.event, Some(DecodedEvent::NoAssets));
        assert_eq!(decoded.follow_up, Some(FollowUp::RequestAssetPages));
        assert!(registry.known_indexes(&tracker()).is_empty());
    }

    #[test]
    fn test_disconnect_forgets_device() {
        let mut registry = DeviceRegistry::new();
        asset([0x01, 0x00, 0, 0, 0, 0, 0, 0], &mut registry);

        let decoded = asset([0x20, 0, 0, 0, 0, 0, 0, 0], &mut registry);
        assert_eq!(decoded.follow_up, Some(FollowUp::ClearRequestCache));
        assert!(!registry.is_paired(&tracker()));
        assert!(registry.known_indexes(&tracker()).is_empty());
    }

    #[test]
    fn test_battery_event() {
        let mut registry = DeviceRegistry::new();
        let decoded = asset([0x52, 0xFF, 0x00, 100, 0, 0, 128, 0x23], &mut registry);

        assert_eq!(
            decoded.event,
            Some(DecodedEvent::Battery {
                battery_id: 0,
                voltage: Some(3.5),
                status: BatteryStatus::Good,
                uptime_seconds: 1600,
            })
        );
        assert!(registry.device(&tracker()).unwrap().battery.is_some());
    }

    #[test]
    fn test_unknown_asset_page_requests_pages() {
        let mut registry = DeviceRegistry::new();
        let decoded = asset([0x33, 0, 0, 0, 0, 0, 0, 0], &mut registry);
        assert_eq!(decoded.follow_up, Some(FollowUp::RequestAssetPages));
        assert!(matches!(decoded.event, Some(DecodedEvent::UnknownPage { page: 0x33, .. })));
    }

    #[test]
    fn test_location_needs_identity() {
        let mut registry = DeviceRegistry::new();
        let err = AssetTrackerDecoder
            .decode(&[0x01, 0, 0, 0, 0, 0, 0, 0], None, &mut registry)
            .unwrap_err();
        assert_eq!(err, DecodeError::MissingIdentity { page: 0x01 });

        // common pages decode without one
        assert!(AssetTrackerDecoder
            .decode(&[0x51, 0xFF, 0xFF, 0x1E, 0, 0, 0, 0], None, &mut registry)
            .is_ok());
    }

    #[test]
    fn test_short_payload_is_an_error() {
        let mut registry = DeviceRegistry::new();
        assert!(matches!(
            AssetTrackerDecoder.decode(&[0x01, 0x00], Some(tracker()), &mut registry),
            Err(DecodeError::Protocol(_))
        ));
    }

    #[test]
    fn test_heart_rate() {
        let mut registry = DeviceRegistry::new();
        let hrm = DeviceIdentity::new(0x2BB3, 0x78, 0x51);

        let decoded = HeartRateDecoder
            .decode(&[0x04, 0xFF, 0xFF, 0xFF, 0x00, 0x04, 0x10, 65], Some(hrm), &mut registry)
            .unwrap();
        assert_eq!(
            decoded.event,
            Some(DecodedEvent::HeartRate {
                heart_rate: 65,
                beat_count: 0x10,
                beat_time: 1024,
                page: 4,
            })
        );
        assert!(registry.is_paired(&hrm));

        let implausible = HeartRateDecoder
            .decode(&[0x04, 0, 0, 0, 0, 0, 0, 250], Some(hrm), &mut registry)
            .unwrap();
        assert_eq!(implausible, Decoded::default());
    }

    #[test]
    fn test_generic_fallback() {
        let mut registry = DeviceRegistry::new();
        let decoded = decode(Profile::Unknown, &[0x80, 1, 2, 3, 4, 5, 6, 7], None, &mut registry).unwrap();
        assert_eq!(decoded.follow_up, Some(FollowUp::RequestCommonPages));
        assert_eq!(
            decoded.event,
            Some(DecodedEvent::UnknownPage {
                page: 0x80,
                payload: "8001020304050607".into(),
            })
        );
    }
}
