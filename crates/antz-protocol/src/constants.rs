//! Protocol constants
//!
//! Message ids, extended-info flag bits, data page numbers, device types and
//! the sentinel values used by ANT+ broadcast channels.

// ============================================================================
// Message Ids (radio → host)
// ============================================================================

/// Placeholder id reported when the driver returns an empty message.
pub const MESG_INVALID_ID: u8 = 0x00;
/// Channel response or channel event.
pub const MESG_RESPONSE_EVENT_ID: u8 = 0x40;
/// Broadcast data message.
pub const MESG_BROADCAST_DATA_ID: u8 = 0x4E;
/// Extended broadcast data message (legacy extended format).
pub const MESG_EXT_BROADCAST_DATA_ID: u8 = 0x5D;

// ============================================================================
// Message Layout
// ============================================================================

/// Offset of the channel number.
pub const CHANNEL_OFFSET: usize = 0;
/// Offset of the 8-byte data page payload.
pub const PAYLOAD_OFFSET: usize = 1;
/// Size of a data page payload.
pub const PAYLOAD_SIZE: usize = 8;
/// Offset of the flags byte when it directly follows the payload.
pub const FLAGS_OFFSET: usize = PAYLOAD_OFFSET + PAYLOAD_SIZE;
/// Smallest message carrying a full payload.
pub const MIN_BROADCAST_LEN: usize = FLAGS_OFFSET;
/// Size of the device number carried by the channel-id extension.
pub const DEVICE_NUMBER_SIZE: usize = 2;

// ============================================================================
// Extended Message Flags
// ============================================================================

/// Channel id extension present (device number, two bytes).
pub const CHANNEL_ID_EXT_FLAG: u8 = 0x80;

/// Proximity / threshold byte.
pub const EXT_FIELD_PROXIMITY: u8 = 0x10;
/// Signed RSSI byte in dBm.
pub const EXT_FIELD_RSSI: u8 = 0x08;
/// Channel type byte. Not reported.
pub const EXT_FIELD_CHANNEL_TYPE: u8 = 0x04;
/// Transmission type byte.
pub const EXT_FIELD_TRANSMISSION_TYPE: u8 = 0x02;
/// Device type byte.
pub const EXT_FIELD_DEVICE_TYPE: u8 = 0x01;
/// All one-byte trailer fields.
pub const EXT_FIELD_MASK: u8 = 0x1F;

// ============================================================================
// Asset Tracker Pages
// ============================================================================

/// Location page 1: index, distance, heading, status, latitude low bits.
pub const PAGE_LOCATION_1: u8 = 0x01;
/// Location page 2: latitude high bits and longitude.
pub const PAGE_LOCATION_2: u8 = 0x02;
/// The tracker has no assets to report.
pub const PAGE_NO_ASSETS: u8 = 0x03;
/// Identification page 1: colour and upper name.
pub const PAGE_IDENTIFICATION_1: u8 = 0x10;
/// Identification page 2: asset type and lower name.
pub const PAGE_IDENTIFICATION_2: u8 = 0x11;
/// Disconnect command sent by a tracker shutting down.
pub const PAGE_DISCONNECT: u8 = 0x20;

// ============================================================================
// Common Pages
// ============================================================================

/// Common page 70: request data page. Always sent acknowledged.
pub const PAGE_REQUEST: u8 = 0x46;
/// Common page 80: manufacturer's identification.
pub const PAGE_MANUFACTURER_IDENT: u8 = 0x50;
/// Common page 81: product information.
pub const PAGE_PRODUCT_INFO: u8 = 0x51;
/// Common page 82: battery status.
pub const PAGE_BATTERY_STATUS: u8 = 0x52;

/// Pages requested from a tracker to complete its record.
pub const SUPPLEMENTARY_PAGES: [u8; 5] = [
    PAGE_IDENTIFICATION_1,
    PAGE_IDENTIFICATION_2,
    PAGE_MANUFACTURER_IDENT,
    PAGE_PRODUCT_INFO,
    PAGE_BATTERY_STATUS,
];

// ============================================================================
// Request Data Page Fields
// ============================================================================

/// Reserved byte value.
pub const REQUEST_RESERVED: u8 = 0xFF;
/// Descriptor byte value meaning "no descriptor".
pub const REQUEST_DESCRIPTOR_NONE: u8 = 0xFF;
/// Ask the device to transmit the page once.
pub const REQUEST_TRANSMIT_ONCE: u8 = 0x01;
/// Command type: request a single data page.
pub const REQUEST_COMMAND_DATA_PAGE: u8 = 0x01;
/// Command type: request a data page set.
pub const REQUEST_COMMAND_PAGE_SET: u8 = 0x04;

// ============================================================================
// Heart Rate Pages
// ============================================================================

/// Page number bits of a heart rate page byte.
pub const HRM_PAGE_MASK: u8 = 0x7F;
/// Page change toggle bit.
pub const HRM_TOGGLE_BIT: u8 = 0x80;
/// Lowest plausible heart rate.
pub const HEART_RATE_MIN: u8 = 30;
/// Highest plausible heart rate.
pub const HEART_RATE_MAX: u8 = 220;

// ============================================================================
// Device Types
// ============================================================================

/// Garmin dog collar (proprietary).
pub const DEVICE_TYPE_DOG_COLLAR: u8 = 0x79;
/// Heart rate monitor.
pub const DEVICE_TYPE_HRM: u8 = 0x78;
/// Bike speed sensor.
pub const DEVICE_TYPE_BIKE_SPEED: u8 = 0x7B;
/// Bike speed and cadence sensor.
pub const DEVICE_TYPE_BIKE_SPEED_CADENCE: u8 = 0x7C;
/// Asset tracker.
pub const DEVICE_TYPE_ASSET_TRACKER: u8 = 0x29;
/// Generic GPS.
pub const DEVICE_TYPE_GENERIC_GPS: u8 = 0x0F;
/// Temperature sensor.
pub const DEVICE_TYPE_TEMPERATURE: u8 = 0x30;
/// Stride based speed and distance monitor.
pub const DEVICE_TYPE_STRIDE: u8 = 0x0D;

/// Transmission type wildcard used by search channels.
pub const TRANSMISSION_TYPE_WILDCARD: u8 = 0x00;

// ============================================================================
// Sentinels and Scales
// ============================================================================

/// Distance value meaning "unknown".
pub const DISTANCE_UNKNOWN: u16 = 0xFFFF;
/// Status byte value meaning "undefined".
pub const STATUS_UNDEFINED: u8 = 0xFF;
/// Coarse battery voltage meaning "invalid".
pub const BATTERY_VOLTAGE_INVALID: u8 = 0x0F;
/// Mask for the asset sub-index.
pub const ASSET_INDEX_MASK: u8 = 0x1F;
/// Bradians per full turn.
pub const BRADIANS_PER_TURN: f64 = 256.0;
/// Semicircles per 180 degrees.
pub const SEMICIRCLES_PER_HALF_TURN: f64 = 2_147_483_648.0;

// ============================================================================
// Network
// ============================================================================

/// Public ANT+ network key.
pub const ANT_PLUS_NETWORK_KEY: [u8; 8] = [0xB9, 0xA5, 0x21, 0xFB, 0xBD, 0x72, 0xC3, 0x45];
/// Network number the public key is loaded into.
pub const ANT_PLUS_NETWORK_NUMBER: u8 = 0;
/// ANT+ RF channel (2457 MHz).
pub const ANT_PLUS_RF_FREQUENCY: u8 = 57;
/// Per-message timeout in milliseconds.
pub const MESSAGE_TIMEOUT_MS: u64 = 1000;
