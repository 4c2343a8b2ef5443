//! Broadcast message framing.

use std::fmt;
use std::str::FromStr;

use crate::constants::*;
use crate::error::{ProtocolError, ProtocolResult};
use crate::extended::{trailer_length, ExtendedInfo};
use crate::types::DeviceIdentity;

/// Where the flags byte of the extended trailer sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageLayout {
    /// `[channel, payload x8, flags, device number?, fields...]`
    #[default]
    FlagsAfterPayload,
    /// `[channel, payload x8, device number?, fields..., flags]`
    FlagsAtEnd,
}

impl fmt::Display for MessageLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageLayout::FlagsAfterPayload => f.write_str("after-payload"),
            MessageLayout::FlagsAtEnd => f.write_str("at-end"),
        }
    }
}

impl FromStr for MessageLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "after-payload" => Ok(MessageLayout::FlagsAfterPayload),
            "at-end" => Ok(MessageLayout::FlagsAtEnd),
            other => Err(format!("unknown message layout: {}", other)),
        }
    }
}

/// A broadcast message split into channel, payload and trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastMessage {
    pub channel: u8,
    pub payload: [u8; PAYLOAD_SIZE],
    /// `None` when the message has no flags byte.
    pub extended: Option<ExtendedInfo>,
}

impl BroadcastMessage {
    /// Parse a raw message body (without the message id).
    pub fn parse(data: &[u8], layout: MessageLayout) -> ProtocolResult<Self> {
        if data.len() < MIN_BROADCAST_LEN {
            return Err(ProtocolError::MessageTooShort {
                expected: MIN_BROADCAST_LEN,
                actual: data.len(),
            });
        }

        let channel = data[CHANNEL_OFFSET];
        let mut payload = [0u8; PAYLOAD_SIZE];
        payload.copy_from_slice(&data[PAYLOAD_OFFSET..PAYLOAD_OFFSET + PAYLOAD_SIZE]);

        if data.len() == MIN_BROADCAST_LEN {
            return Ok(BroadcastMessage {
                channel,
                payload,
                extended: None,
            });
        }

        let extended = match layout {
            MessageLayout::FlagsAfterPayload => Self::parse_flags_after_payload(data)?,
            MessageLayout::FlagsAtEnd => Self::parse_flags_at_end(data)?,
        };

        Ok(BroadcastMessage {
            channel,
            payload,
            extended: Some(extended),
        })
    }

    fn parse_flags_after_payload(data: &[u8]) -> ProtocolResult<ExtendedInfo> {
        let flags = data[FLAGS_OFFSET];
        let mut rest = &data[FLAGS_OFFSET + 1..];

        let device_number = if flags & CHANNEL_ID_EXT_FLAG != 0 {
            if rest.len() < DEVICE_NUMBER_SIZE {
                return Err(ProtocolError::TrailerTruncated {
                    needed: DEVICE_NUMBER_SIZE + trailer_length(flags) as usize,
                    available: rest.len(),
                });
            }
            let number = u16::from_le_bytes([rest[0], rest[1]]);
            rest = &rest[DEVICE_NUMBER_SIZE..];
            Some(number)
        } else {
            None
        };

        let mut info = ExtendedInfo::parse(rest, flags)?;
        info.device_number = device_number;
        Ok(info)
    }

    fn parse_flags_at_end(data: &[u8]) -> ProtocolResult<ExtendedInfo> {
        let flags_offset = data.len() - 1;
        let flags = data[flags_offset];
        let fields = trailer_length(flags) as usize;
        let number_size = if flags & CHANNEL_ID_EXT_FLAG != 0 {
            DEVICE_NUMBER_SIZE
        } else {
            0
        };

        // flags_offset >= MIN_BROADCAST_LEN because data is longer than a bare message
        if flags_offset - MIN_BROADCAST_LEN < fields + number_size {
            return Err(ProtocolError::TrailerOverlapsPayload {
                trailer: fields + number_size,
                length: data.len(),
            });
        }

        let start = flags_offset - fields;
        let mut info = ExtendedInfo::parse(&data[start..flags_offset], flags)?;
        if number_size > 0 {
            let at = FLAGS_OFFSET;
            info.device_number = Some(u16::from_le_bytes([data[at], data[at + 1]]));
        }
        Ok(info)
    }

    /// Page number (first payload byte).
    pub fn page(&self) -> u8 {
        self.payload[0]
    }

    /// Device identity, if the trailer carried all of it.
    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.extended.as_ref().and_then(ExtendedInfo::identity)
    }

    /// Device type from the trailer.
    pub fn device_type(&self) -> Option<u8> {
        self.extended.as_ref().and_then(|ext| ext.device_type)
    }

    /// Encode back into a raw message body.
    pub fn encode(&self, layout: MessageLayout) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        out.push(self.channel);
        out.extend_from_slice(&self.payload);

        let Some(ext) = &self.extended else {
            return out;
        };
        let (flags, fields) = ext.encode();
        let number = ext.device_number.map(u16::to_le_bytes);

        match layout {
            MessageLayout::FlagsAfterPayload => {
                out.push(flags);
                if let Some(number) = number {
                    out.extend_from_slice(&number);
                }
                out.extend_from_slice(&fields);
            }
            MessageLayout::FlagsAtEnd => {
                if let Some(number) = number {
                    out.extend_from_slice(&number);
                }
                out.extend_from_slice(&fields);
                out.push(flags);
            }
        }
        out
    }
}
