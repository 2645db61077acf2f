//! Listen to a soundbar and print what it reports.
//!
//! ```text
//! cargo run -p soundbar-sdk --example listen -- 192.168.1.50
//! ```

use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use soundbar_sdk::logging::{init_logging, LoggingMode};
use soundbar_sdk::{Callbacks, LogVerbosity, Soundbar, SoundbarConfig};
use tracing::info;

/// Print state, volume and track changes of a soundbar until Ctrl-C
#[derive(Parser, Debug)]
#[command(name = "listen")]
struct Args {
    /// IP address of the soundbar
    ip: String,

    /// Local port for the notification receiver (0 picks a free port)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Seconds between subscription renewals
    #[arg(short, long, default_value = "120")]
    resubscribe: u64,

    /// Log repeated failures as warnings instead of errors
    #[arg(short, long)]
    quiet: bool,

    /// Print every decoded event
    #[arg(long)]
    show_events: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(LoggingMode::Development).context("failed to initialize logging")?;

    let verbosity = if args.quiet {
        LogVerbosity::Quiet
    } else {
        LogVerbosity::Verbose
    };

    let config = SoundbarConfig::for_ip(&args.ip)
        .with_source_port(args.port)
        .with_resubscribe_interval(Duration::from_secs(args.resubscribe))
        .with_verbosity(verbosity);

    let show_events = args.show_events;
    let callbacks = Callbacks::new()
        .on_state_update(|state| println!("state:  {state}"))
        .on_volume_update(|level| println!("volume: {:.0}%", level * 100.0))
        .on_track_update(|track| println!("track:  {track}"))
        .on_event(move |event| {
            if show_events {
                println!("event:  {} at {}", event.service, event.timestamp);
            }
        });

    let soundbar = Soundbar::new(config, callbacks).context("invalid configuration")?;

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("failed to install Ctrl-C handler")?;

    soundbar
        .start_listening()
        .context("failed to start listening")?;
    info!(ip = %args.ip, "Listening, press Ctrl-C to stop");

    match soundbar.current_track() {
        Ok(track) => println!("track:  {track}"),
        Err(e) => println!("could not read current track: {e}"),
    }

    let _ = stop_rx.recv();

    soundbar.stop_listening();
    while soundbar.is_listening() {
        std::thread::sleep(Duration::from_millis(100));
    }
    info!("Stopped");

    Ok(())
}
