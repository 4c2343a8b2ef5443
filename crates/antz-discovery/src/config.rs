//! Command line configuration and logging setup.

use std::path::PathBuf;
use std::time::Duration;

use antz_protocol::MessageLayout;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::publish::{OutputFormat, DEFAULT_TOPIC_PREFIX};
use crate::session::SessionConfig;

/// Output style for published events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Json,
    Text,
}

impl From<FormatArg> for OutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Text => OutputFormat::Text,
        }
    }
}

/// ANT+ discovery: decode heart rate monitors and asset trackers.
#[derive(Debug, Parser)]
#[command(name = "antz-discovery")]
#[command(version)]
pub struct Cli {
    /// Capture file to replay (one hex message per line)
    pub capture: PathBuf,

    /// Position of the extended flags byte (after-payload, at-end)
    #[arg(long, default_value_t = MessageLayout::FlagsAfterPayload)]
    pub layout: MessageLayout,

    /// Paired channel store (default: $XDG_CONFIG_HOME/antz/paired_channels.csv)
    #[arg(long)]
    pub channels: Option<PathBuf>,

    /// Move newly paired devices to their own channel and save them on exit
    #[arg(long)]
    pub promote: bool,

    /// Topic prefix for published events
    #[arg(long, default_value = DEFAULT_TOPIC_PREFIX)]
    pub topic_prefix: String,

    /// Event output format
    #[arg(long, value_enum, default_value_t = FormatArg::Json)]
    pub format: FormatArg,

    /// Seconds of silence before it is reported
    #[arg(long, default_value_t = 5)]
    pub idle_report_secs: u64,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            idle_report: Duration::from_secs(self.idle_report_secs),
            topic_prefix: self.topic_prefix.clone(),
            promote_paired: self.promote,
            ..SessionConfig::default()
        }
    }

    /// Default log filter for the verbosity level.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Install the tracing subscriber. `RUST_LOG` overrides the verbosity flag.
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
