//! Window-backed render surface built on `winit` and `pixels`.
//!
//! winit allows a single event loop per process and panics while building it
//! when no display can be reached. The loop therefore lives on a render thread
//! that [`WindowSurfaceFactory`] starts on first use and keeps for as long as
//! the factory lives; a failed start is reported as [`Error::Surface`]. Each
//! [`WindowSurface`] opens its own window on that thread and hands it frames
//! over a channel. The render thread pumps window events between frames too,
//! so the window keeps responding while the source sends nothing.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, SyncSender},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, error, info, warn};
use pixels::{wgpu::TextureFormat, Pixels, PixelsBuilder, SurfaceTexture};
use winit::{
    dpi::PhysicalSize,
    event::{Event, WindowEvent},
    event_loop::{EventLoop, EventLoopBuilder},
    platform::run_return::EventLoopExtRunReturn,
    window::{Window, WindowBuilder},
};

use crate::{
    panic_message,
    stretch::LinearStretch,
    surface::{copy_packed, packed_len, Presented, Surface, SurfaceFactory, SurfaceOptions},
    transport::FrameView,
    Error, Result,
};

/// Name given to the thread that owns the event loop and the windows.
pub const RENDER_THREAD_NAME: &str = "ndi-render";

/// How long the render thread waits for a command before pumping events.
const PUMP_INTERVAL: Duration = Duration::from_millis(10);

const COMMAND_QUEUE: usize = 4;

/// Upper bound on waiting for the render thread to open a window or show a frame.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

type Reply = Result<Presented>;

enum Command {
    Open {
        id: u64,
        options: SurfaceOptions,
        closed: Arc<AtomicBool>,
        replies: SyncSender<Reply>,
    },
    Frame {
        id: u64,
        frame: PackedFrame,
    },
    Close {
        id: u64,
    },
    Shutdown,
}

/// A frame without stride padding, owned so it can cross to the render thread.
struct PackedFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

/// Opens [`WindowSurface`]s with fixed options.
///
/// Build one factory per process: a second one cannot start its own event
/// loop and only ever returns errors.
#[derive(Debug)]
pub struct WindowSurfaceFactory {
    options: SurfaceOptions,
    render: Mutex<Option<RenderThread>>,
    next_id: AtomicU64,
}

impl Default for WindowSurfaceFactory {
    fn default() -> Self {
        Self::new(SurfaceOptions::default())
    }
}

impl WindowSurfaceFactory {
    pub fn new(options: SurfaceOptions) -> Self {
        Self {
            options,
            render: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    /// Command channel of the render thread, starting the thread if needed.
    fn commands(&self) -> Result<SyncSender<Command>> {
        let mut render = self.render.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(running) = render.as_ref() {
            if !running.handle.is_finished() {
                return Ok(running.commands.clone());
            }
        }

        let running = RenderThread::spawn()?;
        let commands = running.commands.clone();
        *render = Some(running);
        Ok(commands)
    }
}

impl SurfaceFactory for WindowSurfaceFactory {
    type Surface = WindowSurface;

    fn create(&self) -> Result<WindowSurface> {
        let commands = self.commands()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let closed = Arc::new(AtomicBool::new(false));
        let (replies_tx, replies) = mpsc::sync_channel(1);

        commands
            .send(Command::Open {
                id,
                options: self.options.clone(),
                closed: Arc::clone(&closed),
                replies: replies_tx,
            })
            .map_err(|_| render_thread_stopped())?;

        let surface = WindowSurface {
            id,
            commands,
            replies,
            closed,
            flip_vertical: self.options.flip_vertical,
        };
        surface.await_reply()?;
        Ok(surface)
    }
}

impl Drop for WindowSurfaceFactory {
    fn drop(&mut self) {
        let render = self
            .render
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(RenderThread { commands, handle }) = render {
            let _ = commands.send(Command::Shutdown);
            drop(commands);
            if handle.join().is_err() {
                error!("Render thread panicked");
            }
        }
    }
}

#[derive(Debug)]
struct RenderThread {
    commands: SyncSender<Command>,
    handle: JoinHandle<()>,
}

impl RenderThread {
    fn spawn() -> Result<Self> {
        let (commands, inbox) = mpsc::sync_channel(COMMAND_QUEUE);
        let (ready_tx, ready) = mpsc::sync_channel(1);

        let handle = thread::Builder::new()
            .name(RENDER_THREAD_NAME.to_string())
            .spawn(move || {
                let event_loop = match build_event_loop() {
                    Ok(event_loop) => event_loop,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                Renderer::new(event_loop).run(&inbox);
            })?;

        match ready.recv() {
            Ok(Ok(())) => Ok(Self { commands, handle }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(render_thread_stopped())
            }
        }
    }
}

/// A window whose whole client area shows the latest frame.
///
/// Frames are uploaded at their own size and stretched to the window on the
/// GPU with linear filtering. The window is closed when the surface is dropped.
pub struct WindowSurface {
    id: u64,
    commands: SyncSender<Command>,
    replies: Receiver<Reply>,
    closed: Arc<AtomicBool>,
    flip_vertical: bool,
}

impl WindowSurface {
    fn await_reply(&self) -> Reply {
        match self.replies.recv_timeout(REPLY_TIMEOUT) {
            Ok(reply) => reply,
            Err(RecvTimeoutError::Timeout) => {
                Err(Error::Surface("render thread did not respond".into()))
            }
            // The render thread drops a window's reply channel once the
            // window has been closed.
            Err(RecvTimeoutError::Disconnected) if self.closed.load(Ordering::Acquire) => {
                Ok(Presented::Closed)
            }
            Err(RecvTimeoutError::Disconnected) => Err(render_thread_stopped()),
        }
    }
}

impl Surface for WindowSurface {
    fn present(&mut self, frame: &FrameView<'_>) -> Result<Presented> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(Presented::Closed);
        }

        let (width, height) = match (u32::try_from(frame.width), u32::try_from(frame.height)) {
            (Ok(width), Ok(height)) => (width, height),
            _ => {
                return Err(Error::InvalidFrame(format!(
                    "{}x{} frame is too large to display",
                    frame.width, frame.height
                )))
            }
        };
        let mut data = vec![0; packed_len(frame)];
        copy_packed(frame, &mut data, self.flip_vertical);

        self.commands
            .send(Command::Frame {
                id: self.id,
                frame: PackedFrame {
                    width,
                    height,
                    data,
                },
            })
            .map_err(|_| render_thread_stopped())?;
        self.await_reply()
    }
}

impl Drop for WindowSurface {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Close { id: self.id });
    }
}

/// State owned by the render thread.
struct Renderer {
    event_loop: EventLoop<()>,
    window: Option<OpenWindow>,
}

struct OpenWindow {
    id: u64,
    closed: Arc<AtomicBool>,
    replies: SyncSender<Reply>,
    display: Display,
}

impl Renderer {
    fn new(event_loop: EventLoop<()>) -> Self {
        Self {
            event_loop,
            window: None,
        }
    }

    fn run(mut self, inbox: &Receiver<Command>) {
        debug!("Render thread started");

        loop {
            match inbox.recv_timeout(PUMP_INTERVAL) {
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {}
            }
            self.pump_events();
        }

        debug!("Render thread stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Open {
                id,
                options,
                closed,
                replies,
            } => {
                // One window at a time.
                self.window = None;
                match Display::new(&self.event_loop, &options) {
                    Ok(display) => {
                        let _ = replies.send(Ok(Presented::Shown));
                        self.window = Some(OpenWindow {
                            id,
                            closed,
                            replies,
                            display,
                        });
                    }
                    Err(e) => {
                        let _ = replies.send(Err(e));
                    }
                }
            }
            Command::Frame { id, frame } => {
                if let Some(open) = self.window.as_mut().filter(|w| w.id == id) {
                    let reply = open.display.show(&frame).map(|()| Presented::Shown);
                    let _ = open.replies.send(reply);
                }
            }
            Command::Close { id } => {
                if self.window.as_ref().is_some_and(|w| w.id == id) {
                    self.window = None;
                    debug!("Window closed");
                }
            }
            Command::Shutdown => {}
        }
    }

    /// Drains pending window events without blocking.
    fn pump_events(&mut self) {
        let Self { event_loop, window } = self;
        let mut close_requested = false;

        event_loop.run_return(|event, _, control_flow| {
            control_flow.set_poll();
            match event {
                Event::WindowEvent { window_id, event } => {
                    let Some(open) = window
                        .as_mut()
                        .filter(|w| w.display.window.id() == window_id)
                    else {
                        return;
                    };
                    match event {
                        WindowEvent::Resized(size) => open.display.resize(size),
                        WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                            open.display.resize(*new_inner_size)
                        }
                        WindowEvent::CloseRequested => close_requested = true,
                        _ => {}
                    }
                }
                Event::RedrawRequested(window_id) => {
                    if let Some(open) = window
                        .as_ref()
                        .filter(|w| w.display.window.id() == window_id)
                    {
                        if let Err(e) = open.display.render() {
                            warn!("Failed to redraw window: {}", e);
                        }
                    }
                }
                Event::MainEventsCleared => control_flow.set_exit(),
                _ => {}
            }
        });

        if close_requested {
            if let Some(open) = self.window.take() {
                open.closed.store(true, Ordering::Release);
                info!("Window closed by the user");
            }
        }
    }
}

/// A window and the pixel surface drawing into it.
struct Display {
    // Dropped in this order: GPU objects, then the surface, then the window.
    stretch: LinearStretch,
    pixels: Pixels,
    window: Window,
    buffer: (u32, u32),
}

impl Display {
    fn new(event_loop: &EventLoop<()>, options: &SurfaceOptions) -> Result<Self> {
        let window = WindowBuilder::new()
            .with_title(options.title.as_str())
            .with_decorations(!options.fullscreen)
            .with_maximized(options.fullscreen)
            .build(event_loop)
            .map_err(|e| Error::Surface(format!("failed to create window: {}", e)))?;

        let size = non_zero(window.inner_size());
        let surface_texture = SurfaceTexture::new(size.width, size.height, &window);
        let pixels = PixelsBuilder::new(size.width, size.height, surface_texture)
            .texture_format(TextureFormat::Bgra8UnormSrgb)
            .build()
            .map_err(|e| Error::Surface(format!("failed to create pixel surface: {}", e)))?;
        let stretch = LinearStretch::new(&pixels);

        info!(
            "Opened {}x{} window{}",
            size.width,
            size.height,
            if options.fullscreen { " (fullscreen)" } else { "" }
        );

        Ok(Self {
            stretch,
            pixels,
            window,
            buffer: (size.width, size.height),
        })
    }

    fn show(&mut self, frame: &PackedFrame) -> Result<()> {
        if (frame.width, frame.height) != self.buffer {
            self.pixels
                .resize_buffer(frame.width, frame.height)
                .map_err(|e| Error::Surface(format!("failed to resize buffer: {}", e)))?;
            self.stretch.rebind(&self.pixels);
            self.buffer = (frame.width, frame.height);
            debug!("Texture resized to {}x{}", frame.width, frame.height);
        }

        self.pixels.frame_mut().copy_from_slice(&frame.data);
        self.render()
    }

    fn render(&self) -> Result<()> {
        let stretch = &self.stretch;
        self.pixels
            .render_with(|encoder, target, _context| {
                stretch.draw(encoder, target);
                Ok(())
            })
            .map_err(|e| Error::Surface(format!("failed to present frame: {}", e)))
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        let size = non_zero(size);
        debug!("Window resized to {}x{}", size.width, size.height);
        if let Err(e) = self.pixels.resize_surface(size.width, size.height) {
            warn!("Failed to resize surface: {}", e);
        }
    }
}

fn render_thread_stopped() -> Error {
    Error::Surface("render thread is not running".into())
}

fn non_zero(size: PhysicalSize<u32>) -> PhysicalSize<u32> {
    PhysicalSize::new(size.width.max(1), size.height.max(1))
}

/// Builds the process's event loop.
///
/// winit panics rather than returning an error both when no display backend is
/// available and when a loop was already built in this process.
fn build_event_loop() -> Result<EventLoop<()>> {
    let mut builder = EventLoopBuilder::new();

    #[cfg(target_os = "windows")]
    winit::platform::windows::EventLoopBuilderExtWindows::with_any_thread(&mut builder, true);

    #[cfg(any(
        target_os = "linux",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd"
    ))]
    {
        winit::platform::x11::EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
        winit::platform::wayland::EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
    }

    panic::catch_unwind(AssertUnwindSafe(move || builder.build())).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        error!("Could not create the window event loop: {}", message);
        Error::Surface(format!("failed to create event loop: {}", message))
    })
}
