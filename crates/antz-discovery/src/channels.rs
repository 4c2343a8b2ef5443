//! Channel configuration.
//!
//! A *search* channel listens with a wildcard device number to discover
//! devices of one type; a *paired* channel is pinned to one device for fast
//! reconnects. The table starts with one search channel per profile and
//! grows as trackers are promoted to paired channels.
//!
//! Paired channels persist as `;`-separated records:
//!
//! ```text
//! cNum;use;cType;dNum;dType;tType;period;rfFreq;searchTimeout
//! 2;1;0;586;41;213;2048;57;6
//! ```

use std::env;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use antz_protocol::{
    DeviceIdentity, ANT_PLUS_RF_FREQUENCY, DEVICE_TYPE_ASSET_TRACKER, DEVICE_TYPE_HRM, TRANSMISSION_TYPE_WILDCARD,
};
use tracing::{debug, warn};

use crate::error::{ChannelRecordError, DiscoveryError, DiscoveryResult};

/// Channels below this number are reserved for search.
pub const MAX_SEARCH_CHANNELS: u8 = 2;
/// Channels supported by the radio.
pub const MAX_CHANNELS: u8 = 8;
/// Bidirectional slave channel.
pub const CHANNEL_TYPE_SLAVE: u8 = 0x00;
/// Heart rate message period (4.06 Hz).
pub const HRM_PERIOD: u16 = 8070;
/// Asset tracker message period (16 Hz).
pub const ASSET_TRACKER_PERIOD: u16 = 2048;

const RECORD_FIELDS: usize = 9;

/// Search or paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Search,
    Paired,
}

/// One radio channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub enabled: bool,
    pub channel_number: u8,
    pub channel_type: u8,
    /// 0 is the search wildcard.
    pub device_number: u16,
    pub device_type: u8,
    pub transmission_type: u8,
    /// Message period in 1/32768 s.
    pub period: u16,
    /// RF channel offset from 2400 MHz.
    pub rf_frequency: u8,
    /// Search timeout in 2.5 s ticks.
    pub search_timeout: u8,
}

impl ChannelConfig {
    /// Heart rate search channel.
    pub fn hrm_search(channel_number: u8) -> Self {
        ChannelConfig {
            enabled: true,
            channel_number,
            channel_type: CHANNEL_TYPE_SLAVE,
            device_number: 0,
            device_type: DEVICE_TYPE_HRM,
            transmission_type: TRANSMISSION_TYPE_WILDCARD,
            period: HRM_PERIOD,
            rf_frequency: ANT_PLUS_RF_FREQUENCY,
            search_timeout: 0x12,
        }
    }

    /// Asset tracker search channel.
    pub fn asset_search(channel_number: u8) -> Self {
        ChannelConfig {
            enabled: true,
            channel_number,
            channel_type: CHANNEL_TYPE_SLAVE,
            device_number: 0,
            device_type: DEVICE_TYPE_ASSET_TRACKER,
            transmission_type: TRANSMISSION_TYPE_WILDCARD,
            period: ASSET_TRACKER_PERIOD,
            rf_frequency: ANT_PLUS_RF_FREQUENCY,
            search_timeout: 0x03,
        }
    }

    /// Channel pinned to one device. Heart rate monitors keep their 8070
    /// period, everything else uses 2048.
    pub fn paired(channel_number: u8, identity: DeviceIdentity) -> Self {
        let period = match identity.device_type {
            DEVICE_TYPE_HRM => HRM_PERIOD,
            _ => ASSET_TRACKER_PERIOD,
        };
        ChannelConfig {
            enabled: true,
            channel_number,
            channel_type: CHANNEL_TYPE_SLAVE,
            device_number: identity.number,
            device_type: identity.device_type,
            transmission_type: identity.transmission_type,
            period,
            rf_frequency: ANT_PLUS_RF_FREQUENCY,
            search_timeout: 0x06,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        if self.device_number == 0 {
            ChannelKind::Search
        } else {
            ChannelKind::Paired
        }
    }

    /// The pinned device, for paired channels.
    pub fn identity(&self) -> Option<DeviceIdentity> {
        match self.kind() {
            ChannelKind::Search => None,
            ChannelKind::Paired => Some(DeviceIdentity::new(
                self.device_number,
                self.device_type,
                self.transmission_type,
            )),
        }
    }
}

impl fmt::Display for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{};{};{};{};{};{};{}",
            self.channel_number,
            u8::from(self.enabled),
            self.channel_type,
            self.device_number,
            self.device_type,
            self.transmission_type,
            self.period,
            self.rf_frequency,
            self.search_timeout
        )
    }
}

fn field<T: FromStr>(name: &'static str, value: &str) -> Result<T, ChannelRecordError> {
    value.trim().parse().map_err(|_| ChannelRecordError::InvalidField {
        field: name,
        value: value.to_string(),
    })
}

impl FromStr for ChannelConfig {
    type Err = ChannelRecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(';').collect();
        if parts.len() != RECORD_FIELDS {
            return Err(ChannelRecordError::FieldCount {
                expected: RECORD_FIELDS,
                actual: parts.len(),
            });
        }

        let enabled = match parts[1].trim() {
            "1" => true,
            "0" => false,
            other => {
                return Err(ChannelRecordError::InvalidField {
                    field: "use",
                    value: other.to_string(),
                })
            }
        };

        Ok(ChannelConfig {
            enabled,
            channel_number: field("cNum", parts[0])?,
            channel_type: field("cType", parts[2])?,
            device_number: field("dNum", parts[3])?,
            device_type: field("dType", parts[4])?,
            transmission_type: field("tType", parts[5])?,
            period: field("period", parts[6])?,
            rf_frequency: field("rfFreq", parts[7])?,
            search_timeout: field("searchTimeout", parts[8])?,
        })
    }
}

/// Ordered list of channel configurations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelTable {
    channels: Vec<ChannelConfig>,
}

impl ChannelTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Heart rate search on channel 0, asset search on channel 1.
    pub fn with_defaults() -> Self {
        ChannelTable {
            channels: vec![ChannelConfig::hrm_search(0), ChannelConfig::asset_search(1)],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelConfig> {
        self.channels.iter()
    }

    /// Enabled channels in table order.
    pub fn enabled(&self) -> impl Iterator<Item = &ChannelConfig> {
        self.channels.iter().filter(|c| c.enabled)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn lookup(&self, channel_number: u8) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.channel_number == channel_number)
    }

    /// Paired channel pinned to `identity`.
    pub fn find_by_identity(&self, identity: &DeviceIdentity) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.identity().as_ref() == Some(identity))
    }

    pub fn has_channel(&self, identity: &DeviceIdentity) -> bool {
        self.find_by_identity(identity).is_some()
    }

    /// First channel number in the paired range that is not in use.
    pub fn next_free_channel_number(&self) -> Option<u8> {
        (MAX_SEARCH_CHANNELS..MAX_CHANNELS).find(|n| self.lookup(*n).is_none())
    }

    /// Add a channel. Rejected when its number or pinned device is already
    /// in the table.
    pub fn push(&mut self, config: ChannelConfig) -> bool {
        if self.lookup(config.channel_number).is_some() {
            return false;
        }
        if let Some(identity) = config.identity() {
            if self.has_channel(&identity) {
                return false;
            }
        }
        self.channels.push(config);
        true
    }

    /// Give a discovered device its own paired channel. Returns the new
    /// channel, or `None` if the device already has one or no number is free.
    pub fn promote(&mut self, identity: DeviceIdentity) -> Option<ChannelConfig> {
        if self.has_channel(&identity) {
            return None;
        }
        let Some(number) = self.next_free_channel_number() else {
            warn!("Channels: no free channel to pair {}", identity);
            return None;
        };
        let config = ChannelConfig::paired(number, identity);
        self.channels.push(config);
        debug!("Channels: paired {} on channel {}", identity, number);
        Some(config)
    }

    /// Load paired channels from `;` records, skipping blank, malformed and
    /// duplicate lines. Returns how many were added.
    pub fn load<R: BufRead>(&mut self, reader: R) -> DiscoveryResult<usize> {
        let mut added = 0;
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.parse::<ChannelConfig>() {
                Ok(config) => {
                    if self.push(config) {
                        added += 1;
                    } else {
                        debug!("Channels: skipping duplicate record on line {}", number + 1);
                    }
                }
                Err(e) => warn!("Channels: skipping line {}: {}", number + 1, e),
            }
        }
        Ok(added)
    }

    /// Write every paired channel as a `;` record.
    pub fn save<W: Write>(&self, mut writer: W) -> DiscoveryResult<usize> {
        let mut written = 0;
        for config in self.channels.iter().filter(|c| c.kind() == ChannelKind::Paired) {
            writeln!(writer, "{}", config)?;
            written += 1;
        }
        writer.flush()?;
        Ok(written)
    }

    /// Load from a file. A missing file is an empty store.
    pub fn load_file(&mut self, path: &Path) -> DiscoveryResult<usize> {
        match File::open(path) {
            Ok(file) => self.load(BufReader::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Save to a file, creating its directory.
    pub fn save_file(&self, path: &Path) -> DiscoveryResult<usize> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.save(BufWriter::new(File::create(path)?))
    }
}

/// `$XDG_CONFIG_HOME/antz/paired_channels.csv`, or under `~/.config`.
pub fn default_store_path() -> DiscoveryResult<PathBuf> {
    let base = match env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => env::var_os("HOME")
            .filter(|v| !v.is_empty())
            .map(|home| PathBuf::from(home).join(".config"))
            .ok_or(DiscoveryError::NoStorePath)?,
    };
    Ok(base.join("antz").join("paired_channels.csv"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn tracker() -> DeviceIdentity {
        DeviceIdentity::new(0x024A, 0x29, 0xD5)
    }

    #[test]
    fn test_defaults() {
        let table = ChannelTable::with_defaults();
        let hrm = table.lookup(0).unwrap();
        assert_eq!(hrm.kind(), ChannelKind::Search);
        assert_eq!(hrm.device_type, 0x78);
        assert_eq!(hrm.period, 8070);
        assert_eq!(hrm.search_timeout, 0x12);

        let asset = table.lookup(1).unwrap();
        assert_eq!(asset.device_type, 0x29);
        assert_eq!(asset.period, 2048);
        assert_eq!(asset.search_timeout, 0x03);
        assert_eq!(asset.identity(), None);
    }

    #[test]
    fn test_paired_period_follows_device_type() {
        let hrm = ChannelConfig::paired(2, DeviceIdentity::new(0x2BB3, 0x78, 0x51));
        assert_eq!(hrm.period, 8070);
        assert_eq!(hrm.search_timeout, 0x06);

        let asset = ChannelConfig::paired(3, tracker());
        assert_eq!(asset.period, 2048);
        assert_eq!(asset.search_timeout, 0x06);
    }

    #[test]
    fn test_record_format() {
        let config = ChannelConfig::paired(2, tracker());
        assert_eq!(config.to_string(), "2;1;0;586;41;213;2048;57;6");
        assert_eq!("2;1;0;586;41;213;2048;57;6".parse::<ChannelConfig>().unwrap(), config);
    }

    #[test]
    fn test_record_errors() {
        assert_eq!(
            "1;2;3".parse::<ChannelConfig>(),
            Err(ChannelRecordError::FieldCount {
                expected: 9,
                actual: 3
            })
        );
        assert!(matches!(
            "2;yes;0;586;41;213;2048;57;6".parse::<ChannelConfig>(),
            Err(ChannelRecordError::InvalidField { field: "use", .. })
        ));
        assert!(matches!(
            "2;1;0;70000;41;213;2048;57;6".parse::<ChannelConfig>(),
            Err(ChannelRecordError::InvalidField { field: "dNum", .. })
        ));
    }

    #[test]
    fn test_next_free_channel_number() {
        let mut table = ChannelTable::with_defaults();
        assert_eq!(table.next_free_channel_number(), Some(2));

        table.push(ChannelConfig::paired(2, tracker()));
        table.push(ChannelConfig::paired(4, DeviceIdentity::new(0x7986, 0x29, 0x65)));
        assert_eq!(table.next_free_channel_number(), Some(3));

        for n in [3, 5, 6, 7] {
            table.push(ChannelConfig::paired(n, DeviceIdentity::new(100 + n as u16, 0x29, 1)));
        }
        assert_eq!(table.next_free_channel_number(), None);
    }

    #[test]
    fn test_promote() {
        let mut table = ChannelTable::with_defaults();
        let config = table.promote(tracker()).unwrap();
        assert_eq!(config.channel_number, 2);
        assert_eq!(config.kind(), ChannelKind::Paired);
        assert!(table.has_channel(&tracker()));
        assert_eq!(table.promote(tracker()), None);
    }

    #[test]
    fn test_load_and_save() {
        let store = "\
2;1;0;11187;120;81;8070;57;18

2;1;0;586;41;213;2048;57;6
not a record
3;1;0;31110;41;101;2048;57;3
3;1;0;31110;41;101;2048;57;3
";
        let mut table = ChannelTable::with_defaults();
        assert_eq!(table.load(store.as_bytes()).unwrap(), 2);
        assert_eq!(table.lookup(2).unwrap().device_number, 0x2BB3);
        assert!(table.has_channel(&DeviceIdentity::new(0x7986, 0x29, 0x65)));

        let mut out = Vec::new();
        assert_eq!(table.save(&mut out).unwrap(), 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "2;1;0;11187;120;81;8070;57;18\n3;1;0;31110;41;101;2048;57;3\n"
        );
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("antz").join("paired_channels.csv");

        let mut table = ChannelTable::with_defaults();
        assert_eq!(table.load_file(&path).unwrap(), 0);
        table.promote(tracker());
        assert_eq!(table.save_file(&path).unwrap(), 1);

        let mut reloaded = ChannelTable::with_defaults();
        assert_eq!(reloaded.load_file(&path).unwrap(), 1);
        assert_eq!(reloaded, table);
    }

    #[test]
    #[serial]
    fn test_default_store_path() {
        let saved = env::var_os("XDG_CONFIG_HOME");

        env::set_var("XDG_CONFIG_HOME", "/tmp/xdg");
        assert_eq!(
            default_store_path().unwrap(),
            PathBuf::from("/tmp/xdg/antz/paired_channels.csv")
        );

        match saved {
            Some(value) => env::set_var("XDG_CONFIG_HOME", value),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }
    }
}
