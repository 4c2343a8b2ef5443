//! Per-device reassembly state.
//!
//! Asset trackers split a record over several pages: the latitude over two
//! location pages and the name over two identification pages. The
//! [`DeviceRegistry`] keeps the halves until their partner arrives, keyed by
//! device identity and asset sub-index, together with the pairing set, the
//! sub-indices known per tracker and the common-page info of each device.
//!
//! One registry is owned by the dispatcher; nothing here is global.

use std::collections::{BTreeSet, HashMap, HashSet};

use antz_protocol::{AssetStatus, AssetType, BatteryInfo, DeviceIdentity, ManufacturerInfo, ProductInfo};
use serde::Serialize;

/// What is known about one asset of a tracker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssetState {
    /// Distance in metres, `None` when unknown.
    pub distance: Option<u16>,
    pub heading: Option<f64>,
    pub status: Option<AssetStatus>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub colour: Option<u8>,
    pub asset_type: Option<AssetType>,
    pub name_upper: Option<String>,
    pub name_lower: Option<String>,
    /// Lower latitude bits from the last location page 1.
    #[serde(skip)]
    pending_latitude_low: Option<u16>,
}

impl AssetState {
    /// Upper and lower name fragments joined, or the lower alone.
    pub fn name(&self) -> Option<String> {
        match (&self.name_upper, &self.name_lower) {
            (Some(upper), Some(lower)) => Some(format!("{}{}", upper, lower)),
            (None, Some(lower)) => Some(lower.clone()),
            _ => None,
        }
    }

    /// Both location pages have been seen.
    pub fn has_position(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Common-page info of a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub manufacturer: Option<ManufacturerInfo>,
    pub product: Option<ProductInfo>,
    pub battery: Option<BatteryInfo>,
    /// Last channel the device was heard on.
    pub channel: Option<u8>,
    pub rssi: Option<i8>,
    /// Broadcasts received from the device.
    pub messages: u64,
}

/// Keyed store of per-device reassembly state.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    paired: HashSet<DeviceIdentity>,
    known_indexes: HashMap<DeviceIdentity, BTreeSet<u8>>,
    assets: HashMap<(DeviceIdentity, u8), AssetState>,
    devices: HashMap<DeviceIdentity, DeviceInfo>,
    channels: HashMap<u8, DeviceIdentity>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Pairing
    // ========================================================================

    /// Record a device as paired. Returns true if it was not paired before.
    pub fn mark_paired(&mut self, identity: DeviceIdentity) -> bool {
        self.paired.insert(identity)
    }

    pub fn is_paired(&self, identity: &DeviceIdentity) -> bool {
        self.paired.contains(identity)
    }

    /// Paired devices in identity order.
    pub fn paired(&self) -> Vec<DeviceIdentity> {
        let mut paired: Vec<_> = self.paired.iter().copied().collect();
        paired.sort();
        paired
    }

    // ========================================================================
    // Sub-indices
    // ========================================================================

    /// Remember an asset sub-index. Returns true the first time it is seen.
    pub fn register_index(&mut self, identity: DeviceIdentity, index: u8) -> bool {
        self.known_indexes.entry(identity).or_default().insert(index)
    }

    /// Known sub-indices of a tracker, ascending.
    pub fn known_indexes(&self, identity: &DeviceIdentity) -> Vec<u8> {
        self.known_indexes
            .get(identity)
            .map(|indexes| indexes.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Forget every sub-index of a tracker. Returns how many were known.
    pub fn clear_indexes(&mut self, identity: &DeviceIdentity) -> usize {
        self.known_indexes
            .remove(identity)
            .map(|indexes| indexes.len())
            .unwrap_or(0)
    }

    // ========================================================================
    // Asset state
    // ========================================================================

    pub fn asset(&self, identity: &DeviceIdentity, index: u8) -> Option<&AssetState> {
        self.assets.get(&(*identity, index))
    }

    pub fn asset_mut(&mut self, identity: DeviceIdentity, index: u8) -> &mut AssetState {
        self.assets.entry((identity, index)).or_default()
    }

    /// Cache the lower latitude bits from location page 1, replacing any
    /// earlier value.
    pub fn set_pending_latitude(&mut self, identity: DeviceIdentity, index: u8, lower: u16) {
        self.asset_mut(identity, index).pending_latitude_low = Some(lower);
    }

    /// Lower latitude bits waiting for location page 2.
    pub fn pending_latitude(&self, identity: &DeviceIdentity, index: u8) -> Option<u16> {
        self.asset(identity, index).and_then(|asset| asset.pending_latitude_low)
    }

    /// Store identification page 1.
    pub fn set_upper_name(&mut self, identity: DeviceIdentity, index: u8, colour: u8, upper: String) {
        let asset = self.asset_mut(identity, index);
        asset.colour = Some(colour);
        asset.name_upper = Some(upper);
    }

    /// Store identification page 2 and return the full name.
    pub fn complete_name(&mut self, identity: DeviceIdentity, index: u8, asset_type: AssetType, lower: String) -> String {
        let asset = self.asset_mut(identity, index);
        asset.asset_type = Some(asset_type);
        asset.name_lower = Some(lower);
        asset.name().unwrap_or_default()
    }

    // ========================================================================
    // Devices and channels
    // ========================================================================

    pub fn device(&self, identity: &DeviceIdentity) -> Option<&DeviceInfo> {
        self.devices.get(identity)
    }

    pub fn device_mut(&mut self, identity: DeviceIdentity) -> &mut DeviceInfo {
        self.devices.entry(identity).or_default()
    }

    /// Count a broadcast from a device and learn which channel it is on.
    pub fn note_seen(&mut self, identity: DeviceIdentity, channel: u8, rssi: Option<i8>) {
        let device = self.device_mut(identity);
        device.channel = Some(channel);
        if rssi.is_some() {
            device.rssi = rssi;
        }
        device.messages += 1;
        self.learn_channel(channel, identity);
    }

    /// Remember the identity last heard on a channel. Returns true when it
    /// changed.
    pub fn learn_channel(&mut self, channel: u8, identity: DeviceIdentity) -> bool {
        self.channels.insert(channel, identity) != Some(identity)
    }

    /// Number of devices heard so far.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Drop the pairing, sub-indices and reassembly state of a device. Its
    /// common-page info is kept.
    pub fn forget(&mut self, identity: &DeviceIdentity) {
        self.paired.remove(identity);
        self.known_indexes.remove(identity);
        self.assets.retain(|(id, _), _| id != identity);
    }
}
