//! `ndi-viewer [fullscreen] [SOURCE NAME]`
//!
//! Connects to the named NDI source, or to the first one discovered when no
//! name is given, and shows its video until Enter or Ctrl+C.

use std::{
    io::{self, BufRead},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{error, info, warn};
use ndi_viewer::{
    watch, CaptureConfig, DiscoveryListener, Finder, FinderOptions, LaunchOptions, NdiTransport,
    Session, Source, SurfaceOptions, WindowSurfaceFactory, NDI,
};

/// Upper bound on how long discovery takes to notice it was cancelled.
const DISCOVERY_POLL_INTERVAL: Duration = Duration::from_millis(500);

enum Event {
    SourceFound(Source),
    Quit,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let options = LaunchOptions::from_env();

    if !NDI::is_supported_cpu() {
        return Err("this CPU is not supported by the NDI SDK".into());
    }
    let ndi = NDI::new()?;
    match NDI::version() {
        Ok(version) => info!("{}", version),
        Err(e) => warn!("Could not read the NDI version: {}", e),
    }

    let surface = SurfaceOptions {
        fullscreen: options.fullscreen,
        ..SurfaceOptions::default()
    };
    let mut session = Session::new(
        NdiTransport::new(&ndi)?,
        WindowSurfaceFactory::new(surface),
        CaptureConfig::default(),
    );

    let (tx, rx) = mpsc::channel();
    listen_for_quit(tx.clone())?;

    let cancel_discovery = Arc::new(AtomicBool::new(false));
    let discovery = match options.source() {
        Some(source) => {
            if let Err(e) = session.connect(source) {
                error!("{}", e);
            }
            None
        }
        None => Some(spawn_discovery(tx, Arc::clone(&cancel_discovery))?),
    };

    info!("Press Enter to quit");

    for event in rx {
        match event {
            Event::SourceFound(source) => {
                if let Err(e) = session.connect(source) {
                    error!("{}", e);
                }
            }
            Event::Quit => break,
        }
    }

    cancel_discovery.store(true, Ordering::Release);
    session.disconnect();

    if let Some(handle) = discovery {
        if handle.join().is_err() {
            error!("Discovery thread panicked");
        }
    }

    Ok(())
}

/// Sends [`Event::Quit`] on the first line read from stdin, or on Ctrl+C.
fn listen_for_quit(tx: Sender<Event>) -> Result<(), Box<dyn std::error::Error>> {
    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(Event::Quit);
    })?;

    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let mut line = String::new();
            if let Err(e) = io::stdin().lock().read_line(&mut line) {
                warn!("Failed to read stdin: {}", e);
            }
            let _ = tx.send(Event::Quit);
        })?;

    Ok(())
}

fn spawn_discovery(tx: Sender<Event>, cancel: Arc<AtomicBool>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("ndi-discovery".to_string())
        .spawn(move || {
            let listener = DiscoveryListener::new();
            let result = NDI::new().and_then(|ndi| {
                let finder = Finder::new(&ndi, &FinderOptions::builder().build())?;
                watch(&finder, &listener, &cancel, DISCOVERY_POLL_INTERVAL)
            });

            match result {
                Ok(Some(source)) => {
                    let _ = tx.send(Event::SourceFound(source));
                }
                Ok(None) => {}
                Err(e) => error!("Source discovery failed: {}", e),
            }
        })
}
