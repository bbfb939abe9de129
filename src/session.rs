//! Connection lifecycle: one receive instance and the worker that polls it.
//!
//! The session is owned by the controlling thread. While connected, the
//! receive instance is moved into the worker thread and handed back when the
//! worker is joined, so it can only be destroyed after the worker has stopped
//! polling it.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use log::{debug, error, info};

use crate::{
    capture::{run_capture_loop, CaptureConfig, CaptureStats, LoopExit},
    surface::SurfaceFactory,
    panic_message,
    transport::{Source, Transport},
    Error, Result,
};

/// Name given to the receive worker thread.
pub const WORKER_THREAD_NAME: &str = "ndi-receive";

type WorkerOutput<R> = (R, LoopExit, CaptureStats);

struct Connection<R> {
    source: Source,
    worker: JoinHandle<WorkerOutput<R>>,
}

/// Owns the transport and at most one active connection.
///
/// # Examples
///
/// ```ignore
/// let mut session = Session::new(transport, factory, CaptureConfig::default());
/// session.connect(Source::new("STUDIO (Camera 1)"))?;
/// // ... later, from the same thread
/// session.disconnect();
/// ```
pub struct Session<T: Transport, F: SurfaceFactory> {
    transport: T,
    factory: Arc<F>,
    config: CaptureConfig,
    exit: Arc<AtomicBool>,
    connection: Option<Connection<T::Receiver>>,
}

impl<T: Transport, F: SurfaceFactory> Session<T, F> {
    pub fn new(transport: T, factory: F, config: CaptureConfig) -> Self {
        Self {
            transport,
            factory: Arc::new(factory),
            config,
            exit: Arc::new(AtomicBool::new(false)),
            connection: None,
        }
    }

    /// Creates a receive instance for `source` and starts the worker.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyConnected`] if a connection is active; call
    ///   [`Session::disconnect`] first.
    /// - [`Error::InvalidConfiguration`] if the capture settings are unusable.
    /// - Whatever the transport reports when it cannot create the instance. No
    ///   worker is started in that case.
    pub fn connect(&mut self, source: Source) -> Result<()> {
        if let Some(active) = &self.connection {
            return Err(Error::AlreadyConnected {
                name: active.source.name.clone(),
            });
        }

        self.config.validate()?;
        info!("Connecting to '{}'...", source.name);

        let description = self.config.description(source.clone());
        let receiver = self.transport.connect(&description).map_err(|e| {
            error!("Failed to create receive instance: {}", e);
            e
        })?;

        let exit = Arc::clone(&self.exit);
        let factory = Arc::clone(&self.factory);
        let timeout = self.config.timeout;

        // A failed spawn drops the closure, which destroys the receiver.
        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let (reason, stats) = run_capture_loop(&receiver, &exit, timeout, &*factory);
                (receiver, reason, stats)
            })?;

        self.connection = Some(Connection { source, worker });
        Ok(())
    }

    /// Stops the worker, then destroys the receive instance.
    ///
    /// Does nothing when there is no connection. Returns the worker's counters
    /// if it exited normally.
    pub fn disconnect(&mut self) -> Option<CaptureStats> {
        let connection = self.connection.take()?;

        self.exit.store(true, Ordering::Release);
        let outcome = connection.worker.join();
        self.exit.store(false, Ordering::Release);

        match outcome {
            Ok((receiver, reason, stats)) => {
                debug!("Receive worker exited ({:?})", reason);
                drop(receiver);
                info!("Disconnected from '{}'", connection.source.name);
                Some(stats)
            }
            Err(panic) => {
                error!(
                    "Receive worker for '{}' panicked: {}",
                    connection.source.name,
                    panic_message(panic.as_ref())
                );
                None
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Whether the worker is still polling. False once it has stopped on its
    /// own, for example after the window was closed.
    pub fn is_capturing(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| !c.worker.is_finished())
    }

    /// The source of the active connection.
    pub fn source(&self) -> Option<&Source> {
        self.connection.as_ref().map(|c| &c.source)
    }
}

impl<T: Transport, F: SurfaceFactory> Drop for Session<T, F> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
