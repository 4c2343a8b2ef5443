//! The discovery event loop.
//!
//! [`DiscoverySession`] owns the transport, the dispatcher, the channel table
//! and the publish sink. It runs single-threaded: poll the transport with a
//! timeout, decode and dispatch whatever arrived, publish the event, repeat.
//! A shared stop flag is checked once per iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use antz_protocol::{
    Profile, ANT_PLUS_NETWORK_KEY, ANT_PLUS_NETWORK_NUMBER, MESG_BROADCAST_DATA_ID, MESG_EXT_BROADCAST_DATA_ID,
    MESG_INVALID_ID, MESG_RESPONSE_EVENT_ID, MESSAGE_TIMEOUT_MS,
};
use chrono::Utc;
use tracing::{debug, error, info, trace, warn};

use crate::channels::{ChannelConfig, ChannelTable};
use crate::dispatcher::{Dispatch, ProfileDispatcher};
use crate::error::{DiscoveryResult, TransportError};
use crate::publish::{EventRecord, PublishSink, DEFAULT_TOPIC_PREFIX};
use crate::scheduler::{Sleeper, ThreadSleeper};
use crate::transport::Transport;

/// Session tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long to wait for each message.
    pub poll_timeout: Duration,
    /// Pause after a poll timeout.
    pub idle_sleep: Duration,
    /// Report silence once this much time passed without a broadcast.
    pub idle_report: Duration,
    pub topic_prefix: String,
    /// Give newly paired devices their own channel.
    pub promote_paired: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            poll_timeout: Duration::from_millis(MESSAGE_TIMEOUT_MS),
            idle_sleep: Duration::from_millis(100),
            idle_report: Duration::from_secs(5),
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            promote_paired: false,
        }
    }
}

/// Time source for idle reporting.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Reads the monotonic system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Counters reported when the session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub messages: u64,
    pub broadcasts: u64,
    pub events: u64,
    pub dropped: u64,
    pub publish_failures: u64,
    pub promoted: u64,
    pub idle_reports: u64,
}

/// What one poll produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Nothing arrived before the timeout.
    Idle,
    /// A non-broadcast message was skipped.
    Ignored(u8),
    /// A broadcast was dispatched.
    Dispatched(Dispatch),
    /// A broadcast could not be decoded.
    Dropped,
}

/// Single-threaded discovery loop.
pub struct DiscoverySession<T: Transport, P: PublishSink, S: Sleeper = ThreadSleeper, C: Clock = SystemClock> {
    transport: T,
    sink: P,
    dispatcher: ProfileDispatcher<S>,
    channels: ChannelTable,
    config: SessionConfig,
    stop: Arc<AtomicBool>,
    stats: SessionStats,
    clock: C,
    last_message: Instant,
}

impl<T: Transport, P: PublishSink, S: Sleeper> DiscoverySession<T, P, S, SystemClock> {
    pub fn new(
        transport: T,
        sink: P,
        dispatcher: ProfileDispatcher<S>,
        channels: ChannelTable,
        config: SessionConfig,
    ) -> Self {
        Self::with_clock(transport, sink, dispatcher, channels, config, SystemClock)
    }
}

impl<T: Transport, P: PublishSink, S: Sleeper, C: Clock> DiscoverySession<T, P, S, C> {
    /// Like [`new`](DiscoverySession::new), with the clock used for idle
    /// reporting.
    pub fn with_clock(
        transport: T,
        sink: P,
        dispatcher: ProfileDispatcher<S>,
        channels: ChannelTable,
        config: SessionConfig,
        clock: C,
    ) -> Self {
        let last_message = clock.now();
        Self {
            transport,
            sink,
            dispatcher,
            channels,
            config,
            stop: Arc::new(AtomicBool::new(false)),
            stats: SessionStats::default(),
            clock,
            last_message,
        }
    }

    /// Flag that ends [`run`](Self::run) when set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn sink(&self) -> &P {
        &self.sink
    }

    pub fn dispatcher(&self) -> &ProfileDispatcher<S> {
        &self.dispatcher
    }

    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Load the network key, open every enabled channel and turn on extended
    /// messages. A channel that fails to open is logged and skipped.
    pub fn start(&mut self) -> DiscoveryResult<()> {
        self.transport
            .set_network_key(ANT_PLUS_NETWORK_NUMBER, &ANT_PLUS_NETWORK_KEY)?;

        let configs: Vec<ChannelConfig> = self.channels.enabled().copied().collect();
        let mut opened = 0;
        for config in &configs {
            match open_channel(&mut self.transport, config) {
                Ok(()) => opened += 1,
                Err(e) => error!("Session: channel {} not opened: {}", config.channel_number, e),
            }
        }

        self.transport.enable_extended_messages(true)?;
        info!("Session: {} of {} channels open", opened, configs.len());
        self.last_message = self.clock.now();
        Ok(())
    }

    /// Poll until the stop flag is set or the transport runs dry.
    pub fn run(&mut self) -> SessionStats {
        while !self.stop.load(Ordering::SeqCst) && !self.transport.is_finished() {
            self.poll_once();
        }
        info!(
            "Session: stopped after {} messages, {} events, {} dropped",
            self.stats.messages, self.stats.events, self.stats.dropped
        );
        self.stats
    }

    /// One iteration of the event loop.
    pub fn poll_once(&mut self) -> PollOutcome {
        let message = match self.transport.wait_for_message(self.config.poll_timeout) {
            Ok(Some(message)) => message,
            Ok(None) => {
                self.idle();
                return PollOutcome::Idle;
            }
            Err(e) => {
                warn!("Session: {}", e);
                self.idle();
                return PollOutcome::Idle;
            }
        };
        self.stats.messages += 1;

        match message.id {
            MESG_BROADCAST_DATA_ID | MESG_EXT_BROADCAST_DATA_ID => {}
            MESG_INVALID_ID | MESG_RESPONSE_EVENT_ID => {
                trace!("Session: ignoring message 0x{:02X}", message.id);
                return PollOutcome::Ignored(message.id);
            }
            other => {
                debug!("Session: ignoring message 0x{:02X}: {}", other, hex::encode_upper(&message.data));
                return PollOutcome::Ignored(other);
            }
        }

        self.stats.broadcasts += 1;
        self.last_message = self.clock.now();

        let Some(dispatch) = self.dispatcher.handle_broadcast(&mut self.transport, &message.data) else {
            self.stats.dropped += 1;
            return PollOutcome::Dropped;
        };

        self.publish(&dispatch);
        if self.config.promote_paired {
            self.promote(&dispatch);
        }
        PollOutcome::Dispatched(dispatch)
    }

    fn idle(&mut self) {
        let now = self.clock.now();
        let silent = now.saturating_duration_since(self.last_message);
        if silent > self.config.idle_report {
            info!("Session: no ANT messages received in the last {} seconds", silent.as_secs());
            self.stats.idle_reports += 1;
            self.last_message = now;
        }
        if !self.config.idle_sleep.is_zero() {
            thread::sleep(self.config.idle_sleep);
        }
    }

    fn publish(&mut self, dispatch: &Dispatch) {
        let Some(event) = &dispatch.event else {
            return;
        };
        self.stats.events += 1;

        let record = EventRecord {
            timestamp: Utc::now(),
            channel: dispatch.channel,
            profile: dispatch.profile,
            device: dispatch.identity,
            rssi: dispatch.rssi,
            event,
        };
        let topic = record.topic(&self.config.topic_prefix);
        let result = record.to_json().and_then(|payload| self.sink.publish(&topic, &payload));
        if let Err(e) = result {
            self.stats.publish_failures += 1;
            warn!("Session: publish to {} failed: {}", topic, e);
        }
    }

    fn promote(&mut self, dispatch: &Dispatch) {
        let Some(identity) = dispatch.identity else {
            return;
        };
        if dispatch.profile == Profile::Unknown
            || !self.dispatcher.registry().is_paired(&identity)
            || self.channels.has_channel(&identity)
        {
            return;
        }

        if let Some(config) = self.channels.promote(identity) {
            match open_channel(&mut self.transport, &config) {
                Ok(()) => {
                    self.stats.promoted += 1;
                    info!("Session: {} moved to channel {}", identity, config.channel_number);
                }
                Err(e) => error!("Session: paired channel {} not opened: {}", config.channel_number, e),
            }
        }
    }

    /// Close and unassign every enabled channel, then reset the radio.
    pub fn shutdown(&mut self) {
        for config in self.channels.enabled() {
            let channel = config.channel_number;
            if let Err(e) = self.transport.close_channel(channel) {
                warn!("Session: closing channel {}: {}", channel, e);
            }
            if let Err(e) = self.transport.unassign_channel(channel) {
                warn!("Session: unassigning channel {}: {}", channel, e);
            }
        }
        if let Err(e) = self.transport.reset_system() {
            warn!("Session: reset: {}", e);
        }
    }

}

/// Configure and open one channel.
///
/// A channel that fails after it was assigned is unassigned again before the
/// error is returned.
pub fn open_channel<T: Transport + ?Sized>(transport: &mut T, config: &ChannelConfig) -> Result<(), TransportError> {
    let channel = config.channel_number;
    transport.assign_channel(channel, config.channel_type, ANT_PLUS_NETWORK_NUMBER)?;
    if let Err(e) = configure_assigned(transport, config) {
        if let Err(unassign) = transport.unassign_channel(channel) {
            warn!("Session: unassigning channel {} after failed setup: {}", channel, unassign);
        }
        return Err(e);
    }
    debug!(
        "Session: channel {} open (device {} type 0x{:02X} tx 0x{:02X})",
        channel, config.device_number, config.device_type, config.transmission_type
    );
    Ok(())
}

fn configure_assigned<T: Transport + ?Sized>(transport: &mut T, config: &ChannelConfig) -> Result<(), TransportError> {
    let channel = config.channel_number;
    transport.set_channel_id(channel, config.device_number, config.device_type, config.transmission_type)?;
    transport.set_channel_period(channel, config.period)?;
    transport.set_rf_frequency(channel, config.rf_frequency)?;
    transport.set_search_timeout(channel, config.search_timeout)?;
    transport.open_channel(channel)
}
