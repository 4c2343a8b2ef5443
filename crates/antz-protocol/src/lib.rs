//! ANT+ Broadcast Protocol
//!
//! This crate provides types and decoders for the messages an ANT+ receiver
//! sees on its channels. It does no I/O: callers hand it message bodies and
//! get typed values back.
//!
//! # Protocol Overview
//!
//! A broadcast message body is laid out as:
//!
//! - **Channel** (1 byte): the receiver channel the message arrived on
//! - **Payload** (8 bytes): one data page; the first byte is the page number
//! - **Extended trailer** (optional): a flags byte, the device number when
//!   the channel-id flag (`0x80`) is set, then one byte per flag bit 4..0
//!
//! The device type in the trailer selects the profile (heart rate monitor,
//! asset tracker). Asset trackers spread a record over several pages which
//! the caller reassembles.
//!
//! # Example
//!
//! ```rust,ignore
//! use antz_protocol::{AssetPage, BroadcastMessage, MessageLayout, RequestDataPage};
//!
//! let msg = BroadcastMessage::parse(&received, MessageLayout::FlagsAfterPayload)?;
//! if let AssetPage::Location1(loc) = AssetPage::decode(&msg.payload)? {
//!     println!("asset #{} heading {}", loc.index, loc.heading);
//! }
//!
//! let request = RequestDataPage::single(PAGE_BATTERY_STATUS).encode();
//! ```

mod commands;
mod constants;
mod error;
mod extended;
mod message;
mod pages;
mod types;

pub use commands::*;
pub use constants::*;
pub use error::*;
pub use extended::*;
pub use message::*;
pub use pages::*;
pub use types::*;
