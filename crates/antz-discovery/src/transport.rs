//! Radio driver boundary.
//!
//! The session talks to the dongle through [`Transport`]. A USB driver is not
//! part of this crate; [`ScriptedTransport`] replays captured messages and
//! records every outbound command, which is enough to run the session
//! offline and to test it.

use std::collections::VecDeque;
use std::io::BufRead;
use std::time::Duration;

use antz_protocol::{MESG_BROADCAST_DATA_ID, PAYLOAD_SIZE};

use crate::error::{DiscoveryError, DiscoveryResult, TransportError};

/// A message read from the radio: id plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AntMessage {
    pub id: u8,
    pub data: Vec<u8>,
}

impl AntMessage {
    pub fn new(id: u8, data: impl Into<Vec<u8>>) -> Self {
        AntMessage {
            id,
            data: data.into(),
        }
    }
}

/// Operations the session needs from a radio driver.
///
/// Every call is fallible and reports the driver's last error code.
pub trait Transport {
    /// Wait up to `timeout` for the next message. `Ok(None)` on timeout.
    fn wait_for_message(&mut self, timeout: Duration) -> Result<Option<AntMessage>, TransportError>;

    /// Send an acknowledged data page and wait for the acknowledgement.
    fn send_acknowledged_data(
        &mut self,
        channel: u8,
        data: &[u8; PAYLOAD_SIZE],
        timeout: Duration,
    ) -> Result<(), TransportError>;

    /// Send a broadcast data page.
    fn send_broadcast_data(&mut self, channel: u8, data: &[u8; PAYLOAD_SIZE]) -> Result<(), TransportError>;

    fn set_network_key(&mut self, network: u8, key: &[u8; 8]) -> Result<(), TransportError>;

    fn assign_channel(&mut self, channel: u8, channel_type: u8, network: u8) -> Result<(), TransportError>;

    fn set_channel_id(
        &mut self,
        channel: u8,
        device_number: u16,
        device_type: u8,
        transmission_type: u8,
    ) -> Result<(), TransportError>;

    fn set_channel_period(&mut self, channel: u8, period: u16) -> Result<(), TransportError>;

    fn set_rf_frequency(&mut self, channel: u8, frequency: u8) -> Result<(), TransportError>;

    fn set_search_timeout(&mut self, channel: u8, timeout: u8) -> Result<(), TransportError>;

    fn open_channel(&mut self, channel: u8) -> Result<(), TransportError>;

    fn close_channel(&mut self, channel: u8) -> Result<(), TransportError>;

    fn unassign_channel(&mut self, channel: u8) -> Result<(), TransportError>;

    /// Ask the radio to append extended info to broadcast messages.
    fn enable_extended_messages(&mut self, enable: bool) -> Result<(), TransportError>;

    fn reset_system(&mut self) -> Result<(), TransportError>;

    /// Whether no more messages will ever arrive.
    fn is_finished(&self) -> bool {
        false
    }
}

/// An outbound command recorded by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentCommand {
    Acknowledged { channel: u8, data: [u8; PAYLOAD_SIZE] },
    Broadcast { channel: u8, data: [u8; PAYLOAD_SIZE] },
    NetworkKey { network: u8 },
    Assign { channel: u8, channel_type: u8, network: u8 },
    ChannelId { channel: u8, device_number: u16, device_type: u8, transmission_type: u8 },
    Period { channel: u8, period: u16 },
    RfFrequency { channel: u8, frequency: u8 },
    SearchTimeout { channel: u8, timeout: u8 },
    Open { channel: u8 },
    Close { channel: u8 },
    Unassign { channel: u8 },
    ExtendedMessages { enable: bool },
    Reset,
}

/// Error code reported for a missing acknowledgement.
pub const TRANSFER_FAILED_CODE: i32 = 0x06;
/// Error code reported when a channel cannot be opened.
pub const CHANNEL_IN_WRONG_STATE_CODE: i32 = 0x15;

/// Transport that replays a fixed list of inbound messages.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    inbound: VecDeque<AntMessage>,
    sent: Vec<SentCommand>,
    failing_acks_remaining: u32,
    always_fail_acks: bool,
    failing_opens: Vec<u8>,
}

impl ScriptedTransport {
    /// Create a transport that will deliver `messages` in order.
    pub fn new(messages: impl IntoIterator<Item = AntMessage>) -> Self {
        ScriptedTransport {
            inbound: messages.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Read a capture: one message per line as hex bytes, optionally prefixed
    /// with the message id (`4E:`). Blank lines and `#` comments are skipped.
    pub fn from_capture<R: BufRead>(reader: R) -> DiscoveryResult<Self> {
        let mut messages = Vec::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if let Some(message) = parse_capture_line(&line).map_err(|reason| DiscoveryError::Capture {
                line: number + 1,
                reason,
            })? {
                messages.push(message);
            }
        }
        Ok(Self::new(messages))
    }

    /// Fail the next `count` acknowledged sends.
    pub fn fail_next_acks(&mut self, count: u32) {
        self.failing_acks_remaining = count;
    }

    /// Fail every acknowledged send.
    pub fn fail_all_acks(&mut self) {
        self.always_fail_acks = true;
    }

    /// Refuse to open `channel`.
    pub fn fail_open(&mut self, channel: u8) {
        self.failing_opens.push(channel);
    }

    /// Commands sent so far.
    pub fn sent(&self) -> &[SentCommand] {
        &self.sent
    }

    /// Acknowledged payloads sent so far, with their channel.
    pub fn acknowledged(&self) -> Vec<(u8, [u8; PAYLOAD_SIZE])> {
        self.sent
            .iter()
            .filter_map(|cmd| match cmd {
                SentCommand::Acknowledged { channel, data } => Some((*channel, *data)),
                _ => None,
            })
            .collect()
    }

    fn record(&mut self, command: SentCommand) -> Result<(), TransportError> {
        self.sent.push(command);
        Ok(())
    }
}

fn parse_capture_line(line: &str) -> Result<Option<AntMessage>, String> {
    let line = match line.split_once('#') {
        Some((before, _)) => before,
        None => line,
    }
    .trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (id, body) = match line.split_once(':') {
        Some((id, body)) => {
            let id = u8::from_str_radix(id.trim(), 16).map_err(|e| format!("bad message id {:?}: {}", id, e))?;
            (id, body)
        }
        None => (MESG_BROADCAST_DATA_ID, line),
    };

    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    let data = hex::decode(&compact).map_err(|e| format!("bad hex: {}", e))?;
    Ok(Some(AntMessage::new(id, data)))
}

impl Transport for ScriptedTransport {
    fn wait_for_message(&mut self, _timeout: Duration) -> Result<Option<AntMessage>, TransportError> {
        Ok(self.inbound.pop_front())
    }

    fn send_acknowledged_data(
        &mut self,
        channel: u8,
        data: &[u8; PAYLOAD_SIZE],
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        self.sent.push(SentCommand::Acknowledged { channel, data: *data });
        let fail = if self.always_fail_acks {
            true
        } else if self.failing_acks_remaining > 0 {
            self.failing_acks_remaining -= 1;
            true
        } else {
            false
        };
        if fail {
            Err(TransportError::new("send_acknowledged_data", TRANSFER_FAILED_CODE))
        } else {
            Ok(())
        }
    }

    fn send_broadcast_data(&mut self, channel: u8, data: &[u8; PAYLOAD_SIZE]) -> Result<(), TransportError> {
        self.record(SentCommand::Broadcast { channel, data: *data })
    }

    fn set_network_key(&mut self, network: u8, _key: &[u8; 8]) -> Result<(), TransportError> {
        self.record(SentCommand::NetworkKey { network })
    }

    fn assign_channel(&mut self, channel: u8, channel_type: u8, network: u8) -> Result<(), TransportError> {
        self.record(SentCommand::Assign {
            channel,
            channel_type,
            network,
        })
    }

    fn set_channel_id(
        &mut self,
        channel: u8,
        device_number: u16,
        device_type: u8,
        transmission_type: u8,
    ) -> Result<(), TransportError> {
        self.record(SentCommand::ChannelId {
            channel,
            device_number,
            device_type,
            transmission_type,
        })
    }

    fn set_channel_period(&mut self, channel: u8, period: u16) -> Result<(), TransportError> {
        self.record(SentCommand::Period { channel, period })
    }

    fn set_rf_frequency(&mut self, channel: u8, frequency: u8) -> Result<(), TransportError> {
        self.record(SentCommand::RfFrequency { channel, frequency })
    }

    fn set_search_timeout(&mut self, channel: u8, timeout: u8) -> Result<(), TransportError> {
        self.record(SentCommand::SearchTimeout { channel, timeout })
    }

    fn open_channel(&mut self, channel: u8) -> Result<(), TransportError> {
        self.record(SentCommand::Open { channel })?;
        if self.failing_opens.contains(&channel) {
            return Err(TransportError::new("open_channel", CHANNEL_IN_WRONG_STATE_CODE));
        }
        Ok(())
    }

    fn close_channel(&mut self, channel: u8) -> Result<(), TransportError> {
        self.record(SentCommand::Close { channel })
    }

    fn unassign_channel(&mut self, channel: u8) -> Result<(), TransportError> {
        self.record(SentCommand::Unassign { channel })
    }

    fn enable_extended_messages(&mut self, enable: bool) -> Result<(), TransportError> {
        self.record(SentCommand::ExtendedMessages { enable })
    }

    fn reset_system(&mut self) -> Result<(), TransportError> {
        self.record(SentCommand::Reset)
    }

    fn is_finished(&self) -> bool {
        self.inbound.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_parsing() {
        let capture = "\
# asset tracker, location page 1
4E: 01 01 02 2C 01 40 20 34 12 83 4A 02 D5 29

5d:0101022c01402034128300
010101 # no id, defaults to broadcast
";
        let mut transport = ScriptedTransport::from_capture(capture.as_bytes()).unwrap();

        let first = transport.wait_for_message(Duration::ZERO).unwrap().unwrap();
        assert_eq!(first.id, 0x4E);
        assert_eq!(first.data.len(), 14);
        assert_eq!(first.data[13], 0x29);

        let second = transport.wait_for_message(Duration::ZERO).unwrap().unwrap();
        assert_eq!(second.id, 0x5D);
        assert_eq!(second.data.len(), 11);

        let third = transport.wait_for_message(Duration::ZERO).unwrap().unwrap();
        assert_eq!(third, AntMessage::new(0x4E, vec![1, 1, 1]));

        assert!(transport.is_finished());
        assert_eq!(transport.wait_for_message(Duration::ZERO).unwrap(), None);
    }

    #[test]
    fn test_capture_reports_bad_line() {
        let err = ScriptedTransport::from_capture("4E: 01 02\nzz: 00\n".as_bytes()).unwrap_err();
        match err {
            DiscoveryError::Capture { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {:?}", other),
        }

        assert!(ScriptedTransport::from_capture("4E: 0".as_bytes()).is_err());
    }

    #[test]
    fn test_ack_failures() {
        let mut transport = ScriptedTransport::default();
        transport.fail_next_acks(2);

        let data = [0u8; 8];
        assert!(transport.send_acknowledged_data(0, &data, Duration::ZERO).is_err());
        assert!(transport.send_acknowledged_data(0, &data, Duration::ZERO).is_err());
        assert!(transport.send_acknowledged_data(0, &data, Duration::ZERO).is_ok());
        assert_eq!(transport.acknowledged().len(), 3);
    }
}
