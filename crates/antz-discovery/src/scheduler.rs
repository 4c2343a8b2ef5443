//! Outbound page requests.
//!
//! Trackers only send identification, manufacturer, product and battery pages
//! now and then. The [`RequestScheduler`] asks for them explicitly with
//! common page 70, retrying a failed acknowledged send a bounded number of
//! times, and remembers which `(target, page)` pairs were already requested
//! so repeated broadcasts do not turn into request storms.

use std::collections::HashSet;
use std::fmt;
use std::thread;
use std::time::Duration;

use antz_protocol::{
    DeviceIdentity, RequestCommandType, RequestDataPage, MESSAGE_TIMEOUT_MS, PAGE_BATTERY_STATUS,
    PAGE_IDENTIFICATION_1, PAGE_MANUFACTURER_IDENT, PAGE_PRODUCT_INFO,
};
use tracing::{debug, info, warn};

use crate::transport::Transport;

/// How often and how patiently a request is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total send attempts, including the first.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
    /// Acknowledgement timeout for each attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            backoff: Duration::from_millis(100),
            attempt_timeout: Duration::from_millis(MESSAGE_TIMEOUT_MS),
        }
    }
}

/// Blocking pause between retries.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Who a request is addressed to in the dedupe cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestTarget {
    /// A device with a full identity.
    Device(DeviceIdentity),
    /// Whatever is on a channel, when no identity is known.
    Channel(u8),
}

impl fmt::Display for RequestTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestTarget::Device(identity) => write!(f, "{}", identity),
            RequestTarget::Channel(channel) => write!(f, "ch{}", channel),
        }
    }
}

impl From<DeviceIdentity> for RequestTarget {
    fn from(identity: DeviceIdentity) -> Self {
        RequestTarget::Device(identity)
    }
}

/// Sends page requests and de-duplicates them.
#[derive(Debug)]
pub struct RequestScheduler<S: Sleeper = ThreadSleeper> {
    policy: RetryPolicy,
    sleeper: S,
    requested: HashSet<(RequestTarget, u8)>,
}

impl Default for RequestScheduler<ThreadSleeper> {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), ThreadSleeper)
    }
}

impl<S: Sleeper> RequestScheduler<S> {
    /// Create a scheduler.
    ///
    /// # Arguments
    ///
    /// * `policy` - Attempt limit, backoff and per-attempt timeout
    /// * `sleeper` - Used for the backoff between attempts
    pub fn new(policy: RetryPolicy, sleeper: S) -> Self {
        Self {
            policy,
            sleeper,
            requested: HashSet::new(),
        }
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Request a single page. Returns false once every attempt failed.
    pub fn request_page(
        &mut self,
        transport: &mut dyn Transport,
        channel: u8,
        page: u8,
        target: RequestTarget,
    ) -> bool {
        self.send_request(transport, channel, &RequestDataPage::single(page), target)
    }

    /// Send a request data page with the retry policy.
    pub fn send_request(
        &mut self,
        transport: &mut dyn Transport,
        channel: u8,
        request: &RequestDataPage,
        target: RequestTarget,
    ) -> bool {
        let payload = request.encode();
        let kind = match request.command_type {
            RequestCommandType::DataPage => "page",
            RequestCommandType::PageSet => "page set",
        };
        debug!(
            "Scheduler[ch {}]: requesting {} 0x{:02X} from {} ({})",
            channel,
            kind,
            request.requested_page,
            target,
            hex::encode_upper(payload)
        );

        let max_attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match transport.send_acknowledged_data(channel, &payload, self.policy.attempt_timeout) {
                Ok(()) => {
                    info!(
                        "Scheduler[ch {}]: requested {} 0x{:02X} from {} (attempt {} of {})",
                        channel, kind, request.requested_page, target, attempt, max_attempts
                    );
                    return true;
                }
                Err(e) => {
                    warn!(
                        "Scheduler[ch {}]: request for 0x{:02X} from {} failed, attempt {} of {}: {}",
                        channel, request.requested_page, target, attempt, max_attempts, e
                    );
                    if attempt < max_attempts {
                        self.sleeper.sleep(self.policy.backoff);
                    }
                }
            }
        }

        warn!(
            "Scheduler[ch {}]: giving up on 0x{:02X} from {} after {} attempts",
            channel, request.requested_page, target, max_attempts
        );
        false
    }

    /// True the first time a `(target, page)` pair is seen, false afterwards
    /// until the pair is cleared.
    pub fn should_request_page_again(&mut self, target: RequestTarget, page: u8) -> bool {
        self.requested.insert((target, page))
    }

    /// Forget requests so the pages are asked for again. Returns how many
    /// entries were removed.
    pub fn clear_request_cache_for(&mut self, target: RequestTarget, pages: &[u8]) -> usize {
        let mut removed = 0;
        for page in pages {
            if self.requested.remove(&(target, *page)) {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Scheduler: cleared {} cached requests for {}", removed, target);
        }
        removed
    }

    /// Ask a tracker for its identification page set and common pages,
    /// skipping whatever was already requested. Returns the number of
    /// requests that were acknowledged.
    pub fn request_asset_pages(
        &mut self,
        transport: &mut dyn Transport,
        channel: u8,
        target: RequestTarget,
    ) -> usize {
        let mut sent = 0;

        if self.should_request_page_again(target, PAGE_IDENTIFICATION_1)
            && self.send_request(transport, channel, &RequestDataPage::page_set(PAGE_IDENTIFICATION_1), target)
        {
            sent += 1;
        }

        for page in [PAGE_MANUFACTURER_IDENT, PAGE_PRODUCT_INFO, PAGE_BATTERY_STATUS] {
            if self.should_request_page_again(target, page) && self.request_page(transport, channel, page, target) {
                sent += 1;
            }
        }
        sent
    }

    /// Ask an unrecognized device for its manufacturer and product pages.
    pub fn request_common_pages(
        &mut self,
        transport: &mut dyn Transport,
        channel: u8,
        target: RequestTarget,
    ) -> usize {
        let mut sent = 0;
        for page in [PAGE_MANUFACTURER_IDENT, PAGE_PRODUCT_INFO] {
            if self.should_request_page_again(target, page) && self.request_page(transport, channel, page, target) {
                sent += 1;
            }
        }
        sent
    }
}
