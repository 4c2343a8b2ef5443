//! Extended-info trailer.
//!
//! A broadcast message may carry a trailer after its payload. A flags byte
//! says which one-byte fields are present; they follow in bit order 4 → 0:
//!
//! | bit | field |
//! |-----|-------|
//! | 4 | proximity / threshold |
//! | 3 | RSSI (signed dBm) |
//! | 2 | channel type (kept for re-encoding, not reported) |
//! | 1 | transmission type |
//! | 0 | device type |
//!
//! The two-byte device number of the channel-id extension (flag `0x80`) is
//! framed by the message layer, see [`crate::BroadcastMessage`].

use serde::Serialize;

use crate::constants::*;
use crate::error::{ProtocolError, ProtocolResult};
use crate::types::DeviceIdentity;

/// Number of one-byte trailer fields announced by `flags`.
///
/// Counts bits 0..=4, including the discarded channel-type byte.
pub fn trailer_length(flags: u8) -> u8 {
    (flags & EXT_FIELD_MASK).count_ones() as u8
}

/// Optional fields decoded from an extended trailer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtendedInfo {
    /// Raw flags byte.
    pub flags: u8,
    /// Device number from the channel-id extension.
    pub device_number: Option<u16>,
    /// Proximity bin, 0xFF when proximity search is off.
    pub proximity: Option<u8>,
    /// Received signal strength in dBm.
    pub rssi: Option<i8>,
    /// Channel type byte. Carried so a parsed trailer encodes back unchanged.
    #[serde(skip)]
    pub channel_type: Option<u8>,
    /// Transmission type.
    pub transmission_type: Option<u8>,
    /// Device type.
    pub device_type: Option<u8>,
    /// Number of field bytes consumed.
    pub length: u8,
}

impl ExtendedInfo {
    /// Parse the one-byte field block announced by `flags`.
    ///
    /// `trailer` starts at the first field byte; extra bytes after the block
    /// are ignored.
    pub fn parse(trailer: &[u8], flags: u8) -> ProtocolResult<Self> {
        let needed = trailer_length(flags) as usize;
        if trailer.len() < needed {
            return Err(ProtocolError::TrailerTruncated {
                needed,
                available: trailer.len(),
            });
        }

        let mut info = ExtendedInfo {
            flags,
            ..Default::default()
        };
        let mut i = 0;

        if flags & EXT_FIELD_PROXIMITY != 0 {
            info.proximity = Some(trailer[i]);
            i += 1;
        }
        if flags & EXT_FIELD_RSSI != 0 {
            info.rssi = Some(trailer[i] as i8);
            i += 1;
        }
        if flags & EXT_FIELD_CHANNEL_TYPE != 0 {
            info.channel_type = Some(trailer[i]);
            i += 1;
        }
        if flags & EXT_FIELD_TRANSMISSION_TYPE != 0 {
            info.transmission_type = Some(trailer[i]);
            i += 1;
        }
        if flags & EXT_FIELD_DEVICE_TYPE != 0 {
            info.device_type = Some(trailer[i]);
            i += 1;
        }

        info.length = i as u8;
        Ok(info)
    }

    /// Encode the fields as a flags byte and field block.
    ///
    /// The device number is not part of the field block; the channel-id flag
    /// is set when one is present so the message layer can frame it.
    pub fn encode(&self) -> (u8, Vec<u8>) {
        let mut flags = 0u8;
        let mut bytes = Vec::with_capacity(4);

        if self.device_number.is_some() {
            flags |= CHANNEL_ID_EXT_FLAG;
        }
        if let Some(proximity) = self.proximity {
            flags |= EXT_FIELD_PROXIMITY;
            bytes.push(proximity);
        }
        if let Some(rssi) = self.rssi {
            flags |= EXT_FIELD_RSSI;
            bytes.push(rssi as u8);
        }
        if let Some(channel_type) = self.channel_type {
            flags |= EXT_FIELD_CHANNEL_TYPE;
            bytes.push(channel_type);
        }
        if let Some(transmission_type) = self.transmission_type {
            flags |= EXT_FIELD_TRANSMISSION_TYPE;
            bytes.push(transmission_type);
        }
        if let Some(device_type) = self.device_type {
            flags |= EXT_FIELD_DEVICE_TYPE;
            bytes.push(device_type);
        }

        (flags, bytes)
    }

    /// Full device identity, if the trailer carried all three parts.
    pub fn identity(&self) -> Option<DeviceIdentity> {
        Some(DeviceIdentity::new(
            self.device_number?,
            self.device_type?,
            self.transmission_type?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailer_length_counts_low_five_bits() {
        for flags in 0..=u8::MAX {
            assert_eq!(
                trailer_length(flags) as u32,
                (flags & 0x1F).count_ones(),
                "flags 0x{:02X}",
                flags
            );
        }
    }

    #[test]
    fn test_named_fields_skip_channel_type() {
        for flags in 0..=u8::MAX {
            let trailer = [0x11u8; 5];
            let info = ExtendedInfo::parse(&trailer, flags).unwrap();
            let named = [
                info.proximity.is_some(),
                info.rssi.is_some(),
                info.transmission_type.is_some(),
                info.device_type.is_some(),
            ]
            .iter()
            .filter(|present| **present)
            .count() as u32;
            assert_eq!(named, (flags & EXT_FIELD_MASK & !EXT_FIELD_CHANNEL_TYPE).count_ones());
            assert_eq!(info.length, trailer_length(flags));
        }
    }

    #[test]
    fn test_parse_all_fields_in_bit_order() {
        let trailer = [0x05, 0xC4, 0x01, 0xD5, 0x29];
        let info = ExtendedInfo::parse(&trailer, 0x1F).unwrap();

        assert_eq!(info.proximity, Some(0x05));
        assert_eq!(info.rssi, Some(-60));
        assert_eq!(info.transmission_type, Some(0xD5));
        assert_eq!(info.device_type, Some(0x29));
        assert_eq!(info.length, 5);
    }

    #[test]
    fn test_channel_type_byte_keeps_alignment() {
        // rssi, channel type, device type
        let trailer = [0xB0, 0x00, 0x78];
        let info = ExtendedInfo::parse(&trailer, 0x0D).unwrap();

        assert_eq!(info.rssi, Some(-80));
        assert_eq!(info.transmission_type, None);
        assert_eq!(info.device_type, Some(0x78));
    }

    #[test]
    fn test_parse_truncated_trailer() {
        let err = ExtendedInfo::parse(&[0x01, 0x02], 0x0B).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::TrailerTruncated {
                needed: 3,
                available: 2
            }
        );
    }

    #[test]
    fn test_encode_then_parse_keeps_fields() {
        const NAMED: [u8; 5] = [
            CHANNEL_ID_EXT_FLAG,
            EXT_FIELD_PROXIMITY,
            EXT_FIELD_RSSI,
            EXT_FIELD_TRANSMISSION_TYPE,
            EXT_FIELD_DEVICE_TYPE,
        ];

        for combo in 0..32u8 {
            let flags = NAMED
                .iter()
                .enumerate()
                .filter(|(bit, _)| combo & (1 << bit) != 0)
                .fold(0u8, |acc, (_, flag)| acc | flag);
            let info = ExtendedInfo {
                flags,
                device_number: (flags & CHANNEL_ID_EXT_FLAG != 0).then_some(586),
                proximity: (flags & EXT_FIELD_PROXIMITY != 0).then_some(0x05),
                rssi: (flags & EXT_FIELD_RSSI != 0).then_some(-42),
                channel_type: None,
                transmission_type: (flags & EXT_FIELD_TRANSMISSION_TYPE != 0).then_some(0xD5),
                device_type: (flags & EXT_FIELD_DEVICE_TYPE != 0).then_some(0x29),
                length: trailer_length(flags),
            };

            let (encoded_flags, bytes) = info.encode();
            assert_eq!(encoded_flags, flags, "flags 0x{:02X}", flags);
            assert_eq!(bytes.len(), trailer_length(flags) as usize);

            let mut parsed = ExtendedInfo::parse(&bytes, encoded_flags).unwrap();
            parsed.device_number = info.device_number;
            assert_eq!(parsed, info, "flags 0x{:02X}", flags);
        }
    }

    #[test]
    fn test_channel_type_survives_encode() {
        let trailer = [0xC4, 0x00, 0x01, 0x78];
        let info = ExtendedInfo::parse(&trailer, 0x0F).unwrap();
        assert_eq!(info.channel_type, Some(0x00));

        let (flags, bytes) = info.encode();
        assert_eq!(flags, 0x0F);
        assert_eq!(bytes, trailer);
    }

    #[test]
    fn test_identity_requires_all_parts() {
        let mut info = ExtendedInfo {
            device_number: Some(586),
            device_type: Some(0x29),
            ..Default::default()
        };
        assert_eq!(info.identity(), None);

        info.transmission_type = Some(0xD5);
        assert_eq!(info.identity(), Some(DeviceIdentity::new(586, 0x29, 0xD5)));
    }
}
