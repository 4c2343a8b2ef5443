//! Profile detection and dispatch.
//!
//! The [`ProfileDispatcher`] takes a raw broadcast body, splits off the
//! extended trailer, picks a decoder from the trailer's device type, and runs
//! the decoder's follow-up through the [`RequestScheduler`].

use antz_protocol::{
    describe_device_type, BroadcastMessage, DeviceIdentity, ExtendedInfo, MessageLayout, Profile,
    MIN_BROADCAST_LEN, SUPPLEMENTARY_PAGES,
};
use tracing::{debug, info, warn};

use crate::decoder::{self, DecodedEvent, FollowUp};
use crate::registry::DeviceRegistry;
use crate::scheduler::{RequestScheduler, RequestTarget, Sleeper, ThreadSleeper};
use crate::transport::Transport;

/// Profile of a message, from its trailer's device type.
pub fn detect(ext: Option<&ExtendedInfo>) -> Profile {
    ext.and_then(|ext| ext.device_type)
        .map(Profile::from_device_type)
        .unwrap_or(Profile::Unknown)
}

/// Outcome of dispatching one broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub channel: u8,
    pub profile: Profile,
    pub identity: Option<DeviceIdentity>,
    pub rssi: Option<i8>,
    /// `None` when the decoder suppressed the message.
    pub event: Option<DecodedEvent>,
}

/// Routes broadcasts to decoders and owns the state they share.
#[derive(Debug)]
pub struct ProfileDispatcher<S: Sleeper = ThreadSleeper> {
    layout: MessageLayout,
    registry: DeviceRegistry,
    scheduler: RequestScheduler<S>,
}

impl<S: Sleeper> ProfileDispatcher<S> {
    pub fn new(layout: MessageLayout, scheduler: RequestScheduler<S>) -> Self {
        Self {
            layout,
            registry: DeviceRegistry::new(),
            scheduler,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &RequestScheduler<S> {
        &self.scheduler
    }

    /// Decode one broadcast body and run its follow-up.
    ///
    /// Never fails: short or malformed messages are logged and yield `None`.
    pub fn handle_broadcast(&mut self, transport: &mut dyn Transport, data: &[u8]) -> Option<Dispatch> {
        if data.len() < MIN_BROADCAST_LEN {
            debug!("Dispatch: short message ({} bytes): {}", data.len(), hex::encode_upper(data));
            return None;
        }

        let msg = match BroadcastMessage::parse(data, self.layout) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Dispatch[ch {}]: dropping malformed message: {} ({})", data[0], e, hex::encode_upper(data));
                return None;
            }
        };

        let ext = msg.extended.as_ref();
        let profile = detect(ext);
        let identity = msg.identity();
        let rssi = ext.and_then(|ext| ext.rssi);

        if profile == Profile::Unknown {
            self.log_unknown(&msg, data);
        }
        if let Some(identity) = identity {
            self.registry.note_seen(identity, msg.channel, rssi);
        }

        let decoded = match decoder::decode(profile, &msg.payload, ext, &mut self.registry) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Dispatch[ch {}]: {} page 0x{:02X}: {}", msg.channel, profile, msg.page(), e);
                return None;
            }
        };

        if let Some(follow_up) = decoded.follow_up {
            let target = identity
                .map(RequestTarget::Device)
                .unwrap_or(RequestTarget::Channel(msg.channel));
            self.run_follow_up(transport, msg.channel, target, follow_up);
        }

        Some(Dispatch {
            channel: msg.channel,
            profile,
            identity,
            rssi,
            event: decoded.event,
        })
    }

    fn run_follow_up(&mut self, transport: &mut dyn Transport, channel: u8, target: RequestTarget, follow_up: FollowUp) {
        match follow_up {
            FollowUp::RequestAssetPages => {
                self.scheduler.request_asset_pages(transport, channel, target);
            }
            FollowUp::RequestCommonPages => {
                self.scheduler.request_common_pages(transport, channel, target);
            }
            FollowUp::ClearRequestCache => {
                self.scheduler.clear_request_cache_for(target, &SUPPLEMENTARY_PAGES);
            }
        }
    }

    fn log_unknown(&mut self, msg: &BroadcastMessage, data: &[u8]) {
        debug!("Generic[ch {}]: {}", msg.channel, hex::encode_upper(data));
        match (msg.identity(), msg.device_type()) {
            (Some(identity), _) => {
                if self.registry.learn_channel(msg.channel, identity) {
                    info!(
                        "Generic[ch {}]: {} ({})",
                        msg.channel,
                        identity,
                        describe_device_type(identity.device_type)
                    );
                }
            }
            (None, Some(device_type)) => {
                debug!("Generic[ch {}]: device type 0x{:02X} ({})", msg.channel, device_type, describe_device_type(device_type));
            }
            (None, None) => {}
        }
    }
}
