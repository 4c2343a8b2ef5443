//! Binary entrypoint: replay a capture through the discovery session.

use std::fs::File;
use std::io::{self, BufReader};
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use antz_discovery::channels::default_store_path;
use antz_discovery::config::{init_logging, Cli};
use antz_discovery::{
    ChannelTable, DiscoveryResult, DiscoverySession, ProfileDispatcher, RequestScheduler, ScriptedTransport, WriterSink,
};
use clap::Parser;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_filter());

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> DiscoveryResult<()> {
    let store = match &cli.channels {
        Some(path) => Some(path.clone()),
        None => default_store_path()
            .map_err(|e| warn!("Paired channels will not be stored: {}", e))
            .ok(),
    };

    let mut channels = ChannelTable::with_defaults();
    if let Some(path) = &store {
        let loaded = channels.load_file(path)?;
        info!("Loaded {} paired channels from {}", loaded, path.display());
    }

    let transport = ScriptedTransport::from_capture(BufReader::new(File::open(&cli.capture)?))?;
    let dispatcher = ProfileDispatcher::new(cli.layout, RequestScheduler::default());
    let sink = WriterSink::new(io::stdout(), cli.format.into());

    let mut session = DiscoverySession::new(transport, sink, dispatcher, channels, cli.session_config());

    let stop = session.stop_handle();
    if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst)) {
        warn!("Ctrl-C handler not installed: {}", e);
    }

    session.start()?;
    let stats = session.run();
    session.shutdown();
    info!(
        "{} broadcasts, {} events, {} devices",
        stats.broadcasts,
        stats.events,
        session.dispatcher().registry().device_count()
    );

    if cli.promote {
        if let Some(path) = &store {
            let saved = session.channels().save_file(path)?;
            info!("Saved {} paired channels to {}", saved, path.display());
        }
    }
    Ok(())
}
