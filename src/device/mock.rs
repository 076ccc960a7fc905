//! Scriptable in-memory camera subsystem.
//!
//! Callbacks are either delivered immediately (posted to the session worker
//! from inside the call that triggered them) or held until
//! [`MockHal::deliver_pending`] runs them on the caller's thread, which lets
//! tests interleave hardware callbacks with foreground commands. Every
//! open, close and frame release is counted.
//!
//! Faults after a successful open are injected with
//! [`MockHal::inject_device_error`] and [`MockHal::inject_disconnect`].

use super::{
    CameraDevice, CameraHal, CaptureSession, CapturedFrame, DeviceInfo, HalError, ImageReader,
    LensFacing, StreamCatalog, StreamFormat, SurfaceId,
};
use crate::session::{CaptureRequestDescriptor, EventSink, HardwareEvent, RequestPurpose};
use crate::sizing::Size;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// How the mock answers `open_device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Device opens normally.
    Opened,
    /// Device reports a disconnect instead of opening.
    Disconnected,
    /// Device reports an error with the given code.
    Error(i32),
    /// `open_device` fails synchronously.
    Refused,
}

/// Scripted behaviour of the mock subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockBehavior {
    /// Answer to the next `open_device`.
    pub open: OpenOutcome,
    /// Hold callbacks until `deliver_pending` is called.
    pub manual_delivery: bool,
    /// Reject preview session configuration.
    pub fail_preview_configure: bool,
    /// Reject still session configuration.
    pub fail_still_configure: bool,
    /// Report `CaptureFailed` for one-shot captures instead of producing frames.
    pub fail_capture: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            open: OpenOutcome::Opened,
            manual_delivery: false,
            fail_preview_configure: false,
            fail_still_configure: false,
            fail_capture: false,
        }
    }
}

/// Snapshot of the mock's resource counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCounts {
    /// Successful `open_device` calls.
    pub device_opens: usize,
    /// Device handles closed.
    pub device_closes: usize,
    /// Sessions requested, including rejected configurations.
    pub sessions_created: usize,
    /// Session handles closed.
    pub session_closes: usize,
    /// Image readers created.
    pub readers_created: usize,
    /// Image readers closed.
    pub reader_closes: usize,
    /// Repeating requests accepted.
    pub repeating_requests: usize,
    /// One-shot captures submitted.
    pub captures: usize,
    /// Frames handed to a reader sink.
    pub frames_delivered: usize,
    /// Frames released, by the session or on drop.
    pub frames_released: usize,
}

#[derive(Debug, Default)]
struct Counters {
    device_opens: AtomicUsize,
    device_closes: AtomicUsize,
    sessions_created: AtomicUsize,
    session_closes: AtomicUsize,
    readers_created: AtomicUsize,
    reader_closes: AtomicUsize,
    repeating_requests: AtomicUsize,
    captures: AtomicUsize,
    frames_delivered: AtomicUsize,
    frames_released: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

struct ReaderEntry {
    size: Size,
    format: StreamFormat,
    sink: Option<EventSink>,
}

type Callback = Box<dyn FnOnce() + Send>;

struct Shared {
    behavior: Mutex<MockBehavior>,
    counters: Counters,
    readers: Mutex<HashMap<SurfaceId, ReaderEntry>>,
    pending: Mutex<VecDeque<Callback>>,
    /// Sink of the most recent `open_device`.
    device_sink: Mutex<Option<EventSink>>,
    next_surface: AtomicU64,
    last_repeating: Mutex<Option<CaptureRequestDescriptor>>,
    last_still: Mutex<Option<CaptureRequestDescriptor>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn behavior(&self) -> MockBehavior {
        locked(&self.behavior).clone()
    }

    fn dispatch(&self, callback: impl FnOnce() + Send + 'static) {
        if self.behavior().manual_delivery {
            locked(&self.pending).push_back(Box::new(callback));
        } else {
            callback();
        }
    }
}

/// In-memory camera subsystem for tests and demos.
pub struct MockHal {
    devices: Vec<DeviceInfo>,
    shared: Arc<Shared>,
}

impl MockHal {
    /// A back-facing 4:3 sensor (`"0"`) and a front-facing one (`"1"`).
    pub fn new() -> Self {
        Self::with_devices(Self::default_devices())
    }

    /// A subsystem exposing exactly `devices`.
    pub fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        Self {
            devices,
            shared: Arc::new(Shared {
                behavior: Mutex::new(MockBehavior::default()),
                counters: Counters::default(),
                readers: Mutex::new(HashMap::new()),
                pending: Mutex::new(VecDeque::new()),
                device_sink: Mutex::new(None),
                next_surface: AtomicU64::new(1000),
                last_repeating: Mutex::new(None),
                last_still: Mutex::new(None),
            }),
        }
    }

    /// Device catalog used by [`MockHal::new`].
    pub fn default_devices() -> Vec<DeviceInfo> {
        let back = StreamCatalog::new()
            .with_sizes(
                StreamFormat::Texture,
                vec![
                    Size::new(1920, 1080),
                    Size::new(1440, 1080),
                    Size::new(1280, 960),
                    Size::new(960, 720),
                    Size::new(640, 480),
                    Size::new(480, 360),
                    Size::new(320, 240),
                    Size::new(176, 144),
                ],
            )
            .with_sizes(
                StreamFormat::Jpeg,
                vec![
                    Size::new(4032, 3024),
                    Size::new(3264, 2448),
                    Size::new(2592, 1944),
                    Size::new(2048, 1536),
                    Size::new(1920, 1080),
                    Size::new(1600, 1200),
                    Size::new(1280, 960),
                    Size::new(640, 480),
                ],
            );
        let front = StreamCatalog::new()
            .with_sizes(
                StreamFormat::Texture,
                vec![Size::new(1280, 720), Size::new(640, 480)],
            )
            .with_sizes(
                StreamFormat::Jpeg,
                vec![Size::new(2560, 1920), Size::new(640, 480)],
            );

        vec![
            DeviceInfo {
                id: "0".to_owned(),
                facing: Some(LensFacing::Back),
                streams: Some(back),
            },
            DeviceInfo {
                id: "1".to_owned(),
                facing: Some(LensFacing::Front),
                streams: Some(front),
            },
        ]
    }

    /// Replaces the scripted behaviour; applies to calls made afterwards.
    pub fn set_behavior(&self, behavior: MockBehavior) {
        *locked(&self.shared.behavior) = behavior;
    }

    /// Current scripted behaviour.
    pub fn behavior(&self) -> MockBehavior {
        self.shared.behavior()
    }

    /// Number of held callbacks.
    pub fn pending(&self) -> usize {
        locked(&self.shared.pending).len()
    }

    /// Runs held callbacks on the calling thread until none remain.
    /// Returns how many ran.
    pub fn deliver_pending(&self) -> usize {
        let mut delivered = 0;
        loop {
            // Pop outside the callback so it can queue further callbacks.
            let next = locked(&self.shared.pending).pop_front();
            let Some(callback) = next else {
                return delivered;
            };
            callback();
            delivered += 1;
        }
    }

    /// Runs the oldest held callback only. Returns false if none was held.
    pub fn deliver_next(&self) -> bool {
        let next = locked(&self.shared.pending).pop_front();
        match next {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Reports a fatal device error for the most recently opened device.
    ///
    /// Follows the delivery mode like any other callback. Returns false if
    /// no device was ever opened.
    pub fn inject_device_error(&self, code: i32) -> bool {
        self.inject(HardwareEvent::DeviceError { device: None, code })
    }

    /// Reports that the most recently opened device went away.
    pub fn inject_disconnect(&self) -> bool {
        self.inject(HardwareEvent::DeviceDisconnected(None))
    }

    fn inject(&self, event: HardwareEvent) -> bool {
        let Some(sink) = locked(&self.shared.device_sink).clone() else {
            return false;
        };
        self.shared.dispatch(move || {
            sink.post(event);
        });
        true
    }

    /// Current counter values.
    pub fn counts(&self) -> MockCounts {
        let c = &self.shared.counters;
        let get = |counter: &AtomicUsize| counter.load(Ordering::SeqCst);
        MockCounts {
            device_opens: get(&c.device_opens),
            device_closes: get(&c.device_closes),
            sessions_created: get(&c.sessions_created),
            session_closes: get(&c.session_closes),
            readers_created: get(&c.readers_created),
            reader_closes: get(&c.reader_closes),
            repeating_requests: get(&c.repeating_requests),
            captures: get(&c.captures),
            frames_delivered: get(&c.frames_delivered),
            frames_released: get(&c.frames_released),
        }
    }

    /// The request most recently submitted for repetition.
    pub fn last_repeating_request(&self) -> Option<CaptureRequestDescriptor> {
        locked(&self.shared.last_repeating).clone()
    }

    /// The request most recently submitted as a one-shot capture.
    pub fn last_still_request(&self) -> Option<CaptureRequestDescriptor> {
        locked(&self.shared.last_still).clone()
    }

    /// Number of image readers currently open.
    pub fn open_readers(&self) -> usize {
        locked(&self.shared.readers).len()
    }
}

impl Default for MockHal {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraHal for MockHal {
    fn device_ids(&self) -> Result<Vec<String>, HalError> {
        Ok(self.devices.iter().map(|d| d.id.clone()).collect())
    }

    fn device_info(&self, id: &str) -> Result<DeviceInfo, HalError> {
        self.devices
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| HalError::DeviceNotFound(id.to_owned()))
    }

    fn create_image_reader(
        &self,
        size: Size,
        format: StreamFormat,
        max_images: u32,
        sink: Option<EventSink>,
    ) -> Result<Box<dyn ImageReader>, HalError> {
        if max_images == 0 || size.area() == 0 {
            return Err(HalError::Unsupported(format!(
                "{size} {format:?} reader with {max_images} buffers"
            )));
        }
        let surface = SurfaceId(self.shared.next_surface.fetch_add(1, Ordering::SeqCst));
        locked(&self.shared.readers).insert(surface, ReaderEntry { size, format, sink });
        bump(&self.shared.counters.readers_created);
        Ok(Box::new(MockReader {
            surface,
            size,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn open_device(&self, id: &str, sink: EventSink) -> Result<(), HalError> {
        if !self.devices.iter().any(|d| d.id == id) {
            return Err(HalError::DeviceNotFound(id.to_owned()));
        }
        let outcome = self.shared.behavior().open;
        if outcome == OpenOutcome::Refused {
            return Err(HalError::AccessRefused(id.to_owned()));
        }
        let device: Box<dyn CameraDevice> = Box::new(MockDevice {
            id: id.to_owned(),
            shared: Arc::clone(&self.shared),
        });
        let event = match outcome {
            OpenOutcome::Disconnected => HardwareEvent::DeviceDisconnected(Some(device)),
            OpenOutcome::Error(code) => HardwareEvent::DeviceError {
                device: Some(device),
                code,
            },
            OpenOutcome::Opened | OpenOutcome::Refused => HardwareEvent::DeviceOpened(device),
        };
        bump(&self.shared.counters.device_opens);
        *locked(&self.shared.device_sink) = Some(sink.clone());
        self.shared.dispatch(move || {
            sink.post(event);
        });
        Ok(())
    }
}

struct MockDevice {
    id: String,
    shared: Arc<Shared>,
}

impl CameraDevice for MockDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_session(
        &mut self,
        outputs: &[SurfaceId],
        purpose: RequestPurpose,
        sink: EventSink,
    ) -> Result<(), HalError> {
        if outputs.is_empty() {
            return Err(HalError::Unsupported("session without outputs".to_owned()));
        }
        bump(&self.shared.counters.sessions_created);

        let behavior = self.shared.behavior();
        let rejected = match purpose {
            RequestPurpose::Preview => behavior.fail_preview_configure,
            RequestPurpose::Still => behavior.fail_still_configure,
        };
        let event = if rejected {
            HardwareEvent::ConfigureFailed { purpose }
        } else {
            HardwareEvent::SessionConfigured {
                purpose,
                session: Box::new(MockSession {
                    purpose,
                    outputs: outputs.to_vec(),
                    shared: Arc::clone(&self.shared),
                }),
            }
        };
        self.shared.dispatch(move || {
            sink.post(event);
        });
        Ok(())
    }

    fn close(self: Box<Self>) {
        bump(&self.shared.counters.device_closes);
    }
}

struct MockSession {
    purpose: RequestPurpose,
    outputs: Vec<SurfaceId>,
    shared: Arc<Shared>,
}

impl MockSession {
    fn check_targets(&self, request: &CaptureRequestDescriptor) -> Result<(), HalError> {
        match request
            .targets()
            .iter()
            .find(|target| !self.outputs.contains(target))
        {
            Some(target) => Err(HalError::Unsupported(format!(
                "{target} is not an output of this session"
            ))),
            None => Ok(()),
        }
    }
}

impl CaptureSession for MockSession {
    fn purpose(&self) -> RequestPurpose {
        self.purpose
    }

    fn set_repeating_request(
        &mut self,
        request: &CaptureRequestDescriptor,
    ) -> Result<(), HalError> {
        self.check_targets(request)?;
        bump(&self.shared.counters.repeating_requests);
        *locked(&self.shared.last_repeating) = Some(request.clone());
        Ok(())
    }

    fn capture(
        &mut self,
        request: &CaptureRequestDescriptor,
        sink: EventSink,
    ) -> Result<(), HalError> {
        self.check_targets(request)?;
        bump(&self.shared.counters.captures);
        *locked(&self.shared.last_still) = Some(request.clone());

        if self.shared.behavior().fail_capture {
            self.shared.dispatch(move || {
                sink.post(HardwareEvent::CaptureFailed {
                    reason: "injected capture failure".to_owned(),
                });
            });
            return Ok(());
        }

        let orientation = request.jpeg_orientation().unwrap_or(0);
        let deliveries: Vec<(EventSink, CapturedFrame)> = {
            let readers = locked(&self.shared.readers);
            request
                .targets()
                .iter()
                .filter_map(|target| readers.get(target))
                .filter_map(|entry| {
                    let reader_sink = entry.sink.clone()?;
                    let shared = Arc::clone(&self.shared);
                    let frame = CapturedFrame::new(
                        synthetic_jpeg(entry.size),
                        entry.format,
                        entry.size,
                        orientation,
                    )
                    .with_release(move || bump(&shared.counters.frames_released));
                    Some((reader_sink, frame))
                })
                .collect()
        };

        for (reader_sink, frame) in deliveries {
            bump(&self.shared.counters.frames_delivered);
            self.shared.dispatch(move || {
                reader_sink.post(HardwareEvent::ImageAvailable(frame));
            });
        }
        self.shared.dispatch(move || {
            sink.post(HardwareEvent::CaptureCompleted);
        });
        Ok(())
    }

    fn close(self: Box<Self>) {
        bump(&self.shared.counters.session_closes);
    }
}

struct MockReader {
    surface: SurfaceId,
    size: Size,
    shared: Arc<Shared>,
}

impl ImageReader for MockReader {
    fn surface(&self) -> SurfaceId {
        self.surface
    }

    fn size(&self) -> Size {
        self.size
    }

    fn close(self: Box<Self>) {
        locked(&self.shared.readers).remove(&self.surface);
        bump(&self.shared.counters.reader_closes);
    }
}

/// A minimal JPEG-framed buffer: SOI, the dimensions, EOI.
fn synthetic_jpeg(size: Size) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8];
    bytes.extend_from_slice(&size.width.to_be_bytes());
    bytes.extend_from_slice(&size.height.to_be_bytes());
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}
