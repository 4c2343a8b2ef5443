//! ANT+ Discovery
//!
//! Receiver-side session tracking for ANT+ heart rate monitors and asset
//! trackers, built on [`antz_protocol`].
//!
//! A [`DiscoverySession`] polls a [`Transport`] for broadcasts and hands each
//! one to the [`ProfileDispatcher`], which:
//!
//! - detects the profile from the extended trailer's device type
//! - runs the matching [`PageDecoder`] against the [`DeviceRegistry`], where
//!   split latitudes and names are reassembled
//! - asks trackers for their identification, manufacturer, product and
//!   battery pages through the [`RequestScheduler`], once per page
//!
//! Decoded events are published as JSON through a [`PublishSink`].
//!
//! # Example
//!
//! ```rust,ignore
//! use antz_discovery::{ChannelTable, DiscoverySession, MemorySink, ProfileDispatcher,
//!     RequestScheduler, ScriptedTransport, SessionConfig};
//! use antz_protocol::MessageLayout;
//!
//! let transport = ScriptedTransport::from_capture(reader)?;
//! let mut session = DiscoverySession::new(
//!     transport,
//!     MemorySink::new(),
//!     ProfileDispatcher::new(MessageLayout::FlagsAfterPayload, RequestScheduler::default()),
//!     ChannelTable::with_defaults(),
//!     SessionConfig::default(),
//! );
//! session.start()?;
//! let stats = session.run();
//! session.shutdown();
//! ```

pub mod channels;
pub mod config;
pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod publish;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod transport;

pub use channels::{ChannelConfig, ChannelKind, ChannelTable};
pub use decoder::{decode, DecodedEvent, Decoded, FollowUp, PageDecoder};
pub use dispatcher::{detect, Dispatch, ProfileDispatcher};
pub use error::{ChannelRecordError, DecodeError, DiscoveryError, DiscoveryResult, PublishError, TransportError};
pub use publish::{EventRecord, MemorySink, OutputFormat, PublishSink, WriterSink};
pub use registry::{AssetState, DeviceInfo, DeviceRegistry};
pub use scheduler::{RequestScheduler, RequestTarget, RetryPolicy, Sleeper, ThreadSleeper};
pub use session::{Clock, DiscoverySession, PollOutcome, SessionConfig, SessionStats, SystemClock};
pub use transport::{AntMessage, ScriptedTransport, SentCommand, Transport};
