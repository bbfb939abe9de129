//! In-memory transport and surface used to drive the session and capture loop.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    marker::PhantomData,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use ndi_viewer::{
    Capture, ConnectionDescription, Error, FrameView, Presented, Receive, Result, Surface,
    SurfaceFactory, Transport, VideoPayload,
};

/// One scripted poll result.
#[derive(Debug, Clone)]
pub enum Step {
    None,
    StatusChange,
    /// Video frame; `None` models a null payload pointer.
    Video(Option<Payload>),
    Audio,
    Metadata,
    Fail,
    Panic,
}

#[derive(Debug, Clone)]
pub struct Payload {
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    pub data: Vec<u8>,
}

impl Payload {
    pub fn bgra(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            stride: width * 4,
            data: vec![0x80; width * height * 4],
        }
    }
}

pub fn video(width: usize, height: usize) -> Step {
    Step::Video(Some(Payload::bgra(width, height)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Video,
    Audio,
    Metadata,
}

/// Shared record of what the doubles observed.
#[derive(Debug, Default)]
pub struct Probe {
    pub polls: AtomicUsize,
    pub delivered: [AtomicUsize; 3],
    pub released: [AtomicUsize; 3],
    pub polling: AtomicBool,
    pub destroyed: AtomicUsize,
    pub destroyed_while_polling: AtomicBool,
    pub events: Mutex<Vec<&'static str>>,
}

impl Probe {
    fn index(kind: Kind) -> usize {
        match kind {
            Kind::Video => 0,
            Kind::Audio => 1,
            Kind::Metadata => 2,
        }
    }

    pub fn delivered(&self, kind: Kind) -> usize {
        self.delivered[Self::index(kind)].load(Ordering::SeqCst)
    }

    pub fn released(&self, kind: Kind) -> usize {
        self.released[Self::index(kind)].load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: &'static str) {
        self.events.lock().unwrap().push(event);
    }
}

/// A frame that reports its own release.
pub struct MockFrame<'rx> {
    kind: Kind,
    payload: Option<Payload>,
    probe: Arc<Probe>,
    _rx: PhantomData<&'rx MockReceiver>,
}

impl MockFrame<'_> {
    fn new(kind: Kind, payload: Option<Payload>, probe: &Arc<Probe>) -> Self {
        probe.delivered[Probe::index(kind)].fetch_add(1, Ordering::SeqCst);
        Self {
            kind,
            payload,
            probe: Arc::clone(probe),
            _rx: PhantomData,
        }
    }
}

impl VideoPayload for MockFrame<'_> {
    fn frame_view(&self) -> Result<Option<FrameView<'_>>> {
        match &self.payload {
            None => Ok(None),
            Some(p) => FrameView::new(p.width, p.height, p.stride, &p.data).map(Some),
        }
    }
}

impl Drop for MockFrame<'_> {
    fn drop(&mut self) {
        self.probe.released[Probe::index(self.kind)].fetch_add(1, Ordering::SeqCst);
    }
}

/// Replays a script, then idles (or raises `stop` if one was given).
pub struct MockReceiver {
    script: Mutex<VecDeque<Step>>,
    stop: Option<Arc<AtomicBool>>,
    probe: Arc<Probe>,
}

impl MockReceiver {
    pub fn new(script: Vec<Step>, probe: Arc<Probe>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            stop: None,
            probe,
        }
    }

    /// Raises `stop` once the script has been played back.
    pub fn stopping(script: Vec<Step>, probe: Arc<Probe>, stop: Arc<AtomicBool>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            stop: Some(stop),
            probe,
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

impl Receive for MockReceiver {
    type Video<'rx> = MockFrame<'rx> where Self: 'rx;
    type Audio<'rx> = MockFrame<'rx> where Self: 'rx;
    type Metadata<'rx> = MockFrame<'rx> where Self: 'rx;

    fn capture(
        &self,
        timeout: Duration,
    ) -> Result<Capture<MockFrame<'_>, MockFrame<'_>, MockFrame<'_>>> {
        self.probe.polling.store(true, Ordering::SeqCst);
        self.probe.polls.fetch_add(1, Ordering::SeqCst);
        self.probe.record("poll");

        let step = self.script.lock().unwrap().pop_front();
        let result = match step {
            Some(Step::None) => Ok(Capture::None),
            Some(Step::StatusChange) => Ok(Capture::StatusChange),
            Some(Step::Video(payload)) => {
                Ok(Capture::Video(MockFrame::new(Kind::Video, payload, &self.probe)))
            }
            Some(Step::Audio) => Ok(Capture::Audio(MockFrame::new(Kind::Audio, None, &self.probe))),
            Some(Step::Metadata) => Ok(Capture::Metadata(MockFrame::new(
                Kind::Metadata,
                None,
                &self.probe,
            ))),
            Some(Step::Fail) => Err(Error::CaptureFailed("scripted failure".into())),
            Some(Step::Panic) => {
                self.probe.polling.store(false, Ordering::SeqCst);
                panic!("scripted panic");
            }
            None => {
                match &self.stop {
                    Some(stop) => stop.store(true, Ordering::SeqCst),
                    None => thread::sleep(timeout.min(Duration::from_millis(2))),
                }
                Ok(Capture::None)
            }
        };

        self.probe.polling.store(false, Ordering::SeqCst);
        result
    }
}

impl Drop for MockReceiver {
    fn drop(&mut self) {
        if self.probe.polling.load(Ordering::SeqCst) {
            self.probe.destroyed_while_polling.store(true, Ordering::SeqCst);
        }
        self.probe.destroyed.fetch_add(1, Ordering::SeqCst);
        self.probe.record("destroy");
    }
}

/// Hands out [`MockReceiver`]s playing `script`, or refuses while `fail` is set.
///
/// Clones share their state, so a test can keep one while the session owns another.
#[derive(Clone)]
pub struct MockTransport {
    pub script: Vec<Step>,
    pub fail: Arc<AtomicBool>,
    pub probe: Arc<Probe>,
    pub connects: Arc<Mutex<Vec<ConnectionDescription>>>,
}

impl MockTransport {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script,
            fail: Arc::new(AtomicBool::new(false)),
            probe: Arc::new(Probe::default()),
            connects: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        let transport = Self::new(Vec::new());
        transport.fail.store(true, Ordering::SeqCst);
        transport
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().unwrap().len()
    }
}

impl Transport for MockTransport {
    type Receiver = MockReceiver;

    fn connect(&self, description: &ConnectionDescription) -> Result<MockReceiver> {
        self.connects.lock().unwrap().push(description.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::ConnectFailed {
                name: description.source.name.clone(),
            });
        }
        Ok(MockReceiver::new(self.script.clone(), Arc::clone(&self.probe)))
    }
}

/// Surface bookkeeping shared between the test and the worker thread.
#[derive(Debug, Default)]
pub struct SurfaceProbe {
    pub create_attempts: AtomicUsize,
    pub created: AtomicUsize,
    pub presented: Mutex<Vec<(usize, usize)>>,
    pub created_on: Mutex<Option<String>>,
}

impl SurfaceProbe {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn presented(&self) -> Vec<(usize, usize)> {
        self.presented.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockSurfaceFactory {
    pub probe: Arc<SurfaceProbe>,
    /// Number of initial `create` calls that fail.
    pub failing_creates: usize,
    /// Report the window closed after this many presents.
    pub close_after: Option<usize>,
}

impl SurfaceFactory for MockSurfaceFactory {
    type Surface = MockSurface;

    fn create(&self) -> Result<MockSurface> {
        let attempt = self.probe.create_attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failing_creates {
            return Err(Error::Surface("no display".into()));
        }
        self.probe.created.fetch_add(1, Ordering::SeqCst);
        *self.probe.created_on.lock().unwrap() = thread::current().name().map(str::to_owned);
        Ok(MockSurface {
            probe: Arc::clone(&self.probe),
            close_after: self.close_after,
        })
    }
}

pub struct MockSurface {
    probe: Arc<SurfaceProbe>,
    close_after: Option<usize>,
}

impl Surface for MockSurface {
    fn present(&mut self, frame: &FrameView<'_>) -> Result<Presented> {
        let mut presented = self.probe.presented.lock().unwrap();
        if self.close_after.is_some_and(|n| presented.len() >= n) {
            return Ok(Presented::Closed);
        }
        presented.push((frame.width, frame.height));
        Ok(Presented::Shown)
    }
}

/// Polls `condition` until it holds or two seconds pass.
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}
