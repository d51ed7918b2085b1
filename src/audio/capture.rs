//! Microphone capture via `cpal`.
//!
//! [`CaptureSource::acquire`] starts an acquisition and hands back a
//! [`PendingCapture`]; once the host has opened the device it resolves to a
//! [`CaptureSession`].  The session owns the stream control handle and the
//! shared [`SampleTap`] the audio callback writes into.  Releasing the
//! session (explicitly or by dropping it) stops the stream.
//!
//! `cpal::Stream` is not `Send`, so [`CpalSource`] opens and holds the stream
//! on a dedicated `mic-capture` thread.  The thread parks on a stop channel
//! for the lifetime of the session and drops the stream when told to.

use std::sync::mpsc::{self, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Sample;
use thiserror::Error;

use super::buffer::RingBuffer;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Classified capture failure.
///
/// Every variant carries the host's own description for the log; the UI
/// shows [`user_message`](Self::user_message) instead, which is specific to
/// the kind of failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    /// The OS refused microphone access for this process.
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// No usable input device exists (or it vanished).
    #[error("microphone not found: {0}")]
    DeviceNotFound(String),

    /// The device exists but could not be opened.
    #[error("microphone busy: {0}")]
    DeviceBusy(String),

    /// The audio host cannot capture in a way this app supports.
    #[error("audio capture unsupported: {0}")]
    UnsupportedEnvironment(String),

    /// Anything the host reported that does not fit the kinds above.
    #[error("audio capture failed: {0}")]
    Unknown(String),
}

/// Discriminant of [`CaptureError`] without the host detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureErrorKind {
    PermissionDenied,
    DeviceNotFound,
    DeviceBusy,
    UnsupportedEnvironment,
    Unknown,
}

impl CaptureError {
    pub fn kind(&self) -> CaptureErrorKind {
        match self {
            CaptureError::PermissionDenied(_) => CaptureErrorKind::PermissionDenied,
            CaptureError::DeviceNotFound(_) => CaptureErrorKind::DeviceNotFound,
            CaptureError::DeviceBusy(_) => CaptureErrorKind::DeviceBusy,
            CaptureError::UnsupportedEnvironment(_) => CaptureErrorKind::UnsupportedEnvironment,
            CaptureError::Unknown(_) => CaptureErrorKind::Unknown,
        }
    }

    /// Actionable message for the user, one per error kind.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            CaptureErrorKind::PermissionDenied => {
                "Microphone access was denied. Allow this app to use the microphone \
                 in your system privacy settings, then press Start again."
            }
            CaptureErrorKind::DeviceNotFound => {
                "No microphone was found. Connect a microphone (or check the \
                 configured device name) and press Start again."
            }
            CaptureErrorKind::DeviceBusy => {
                "The microphone is in use by another application. Close it and \
                 press Start again."
            }
            CaptureErrorKind::UnsupportedEnvironment => {
                "This system's audio host cannot provide microphone capture in a \
                 supported format."
            }
            CaptureErrorKind::Unknown => {
                "Error accessing microphone. Please make sure you have granted \
                 microphone permissions."
            }
        }
    }
}

/// Sort a backend-specific description into a [`CaptureError`] kind.
///
/// Hosts report permission and exclusivity problems only as free text, so
/// this is keyword matching on the lower-cased description.
pub fn classify_backend(description: &str) -> CaptureError {
    const PERMISSION: [&str; 5] = [
        "permission",
        "denied",
        "not authorized",
        "unauthorized",
        "access",
    ];
    const BUSY: [&str; 3] = ["busy", "in use", "exclusive"];

    let lower = description.to_lowercase();
    if PERMISSION.iter().any(|k| lower.contains(k)) {
        CaptureError::PermissionDenied(description.to_string())
    } else if BUSY.iter().any(|k| lower.contains(k)) {
        CaptureError::DeviceBusy(description.to_string())
    } else {
        CaptureError::Unknown(description.to_string())
    }
}

impl From<cpal::DevicesError> for CaptureError {
    fn from(err: cpal::DevicesError) -> Self {
        match err {
            cpal::DevicesError::BackendSpecific { err } => classify_backend(&err.description),
            #[allow(unreachable_patterns)]
            other => CaptureError::Unknown(other.to_string()),
        }
    }
}

impl From<cpal::DefaultStreamConfigError> for CaptureError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        match err {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => {
                CaptureError::DeviceNotFound("the input device is no longer available".into())
            }
            cpal::DefaultStreamConfigError::BackendSpecific { err } => {
                classify_backend(&err.description)
            }
            other => CaptureError::UnsupportedEnvironment(other.to_string()),
        }
    }
}

impl From<cpal::BuildStreamError> for CaptureError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => {
                CaptureError::DeviceBusy("the input device could not be opened".into())
            }
            cpal::BuildStreamError::BackendSpecific { err } => classify_backend(&err.description),
            other => CaptureError::UnsupportedEnvironment(other.to_string()),
        }
    }
}

impl From<cpal::PlayStreamError> for CaptureError {
    fn from(err: cpal::PlayStreamError) -> Self {
        match err {
            cpal::PlayStreamError::DeviceNotAvailable => {
                CaptureError::DeviceBusy("the input stream could not be started".into())
            }
            cpal::PlayStreamError::BackendSpecific { err } => classify_backend(&err.description),
            #[allow(unreachable_patterns)]
            other => CaptureError::Unknown(other.to_string()),
        }
    }
}

impl From<cpal::StreamError> for CaptureError {
    fn from(err: cpal::StreamError) -> Self {
        match err {
            cpal::StreamError::DeviceNotAvailable => {
                CaptureError::DeviceNotFound("the input device was disconnected".into())
            }
            cpal::StreamError::BackendSpecific { err } => CaptureError::Unknown(err.description),
            #[allow(unreachable_patterns)]
            other => CaptureError::Unknown(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureConstraints
// ---------------------------------------------------------------------------

/// What the meter asks of the capture device.
///
/// Automatic gain control must stay off: a device that normalises its own
/// gain would flatten the very loudness the meter is measuring.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConstraints {
    /// Input device name; `None` selects the host default.
    pub device: Option<String>,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Capacity of the ring buffer behind the [`SampleTap`], in mono samples.
    pub buffer_samples: usize,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            device: None,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: false,
            buffer_samples: 8_192,
        }
    }
}

// ---------------------------------------------------------------------------
// SampleTap
// ---------------------------------------------------------------------------

/// Shared landing zone between the audio callback thread and the meter.
///
/// The callback pushes downmixed mono samples and, on a stream error, parks
/// the classified error here; the meter copies windows out and collects the
/// fault on its next tick.
pub struct SampleTap {
    samples: Mutex<RingBuffer<f32>>,
    fault: Mutex<Option<CaptureError>>,
}

impl SampleTap {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(RingBuffer::new(capacity.max(1))),
            fault: Mutex::new(None),
        }
    }

    /// Append mono samples.
    pub fn push(&self, samples: &[f32]) {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_slice(samples);
    }

    /// Downmix interleaved samples to mono and append them.
    pub fn push_interleaved(&self, samples: &[f32], channels: u16) {
        if channels == 1 {
            self.push(samples);
        } else {
            self.push(&downmix_to_mono(samples, channels));
        }
    }

    /// Fill `out` with the newest samples (see [`RingBuffer::copy_latest`]).
    pub fn copy_latest(&self, out: &mut [f32]) {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .copy_latest(out);
    }

    /// Record a stream failure.  The first fault wins.
    pub fn fail(&self, error: CaptureError) {
        let mut fault = self.fault.lock().unwrap_or_else(PoisonError::into_inner);
        if fault.is_none() {
            *fault = Some(error);
        }
    }

    /// Take the recorded stream failure, if any.
    pub fn take_fault(&self) -> Option<CaptureError> {
        self.fault.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub fn capacity(&self) -> usize {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .capacity()
    }
}

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`; a trailing partial frame
/// is dropped.  `channels == 0` yields an empty vector.
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureSession
// ---------------------------------------------------------------------------

/// Handle to whatever keeps the device stream running.
pub trait StreamControl: Send {
    /// Stop the stream and free the device.
    fn stop(self: Box<Self>);
}

/// An active microphone acquisition.
///
/// At most one exists at a time; it is owned by the meter controller.
pub struct CaptureSession {
    tap: Arc<SampleTap>,
    device_name: String,
    sample_rate: u32,
    stream: Option<Box<dyn StreamControl>>,
}

impl CaptureSession {
    pub fn new(
        tap: Arc<SampleTap>,
        device_name: impl Into<String>,
        sample_rate: u32,
        stream: Box<dyn StreamControl>,
    ) -> Self {
        Self {
            tap,
            device_name: device_name.into(),
            sample_rate,
            stream: Some(stream),
        }
    }

    /// The sample tap the stream feeds.
    pub fn tap(&self) -> Arc<SampleTap> {
        Arc::clone(&self.tap)
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_released(&self) -> bool {
        self.stream.is_none()
    }

    /// Stop the underlying stream.  Calling this more than once is a no-op.
    pub fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.stop();
            log::info!("capture: released '{}'", self.device_name);
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("device_name", &self.device_name)
            .field("sample_rate", &self.sample_rate)
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// PendingCapture
// ---------------------------------------------------------------------------

type CaptureOutcome = Result<CaptureSession, CaptureError>;

/// An acquisition that may still be waiting on the OS (permission prompt,
/// device enumeration).  Poll with [`try_complete`](Self::try_complete).
///
/// Dropping it abandons the acquisition; a session that arrives afterwards is
/// released by whoever tried to deliver it.
pub struct PendingCapture {
    rx: mpsc::Receiver<CaptureOutcome>,
}

/// Sending half of a [`PendingCapture`].
pub struct CaptureResolver {
    tx: mpsc::Sender<CaptureOutcome>,
}

impl PendingCapture {
    pub fn channel() -> (CaptureResolver, PendingCapture) {
        let (tx, rx) = mpsc::channel();
        (CaptureResolver { tx }, PendingCapture { rx })
    }

    /// An acquisition that has already finished.
    pub fn ready(outcome: CaptureOutcome) -> Self {
        let (resolver, pending) = Self::channel();
        resolver.resolve(outcome);
        pending
    }

    /// `None` while the acquisition is still in flight.
    pub fn try_complete(&self) -> Option<CaptureOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(CaptureError::Unknown(
                "capture worker exited without reporting a result".into(),
            ))),
        }
    }
}

impl CaptureResolver {
    /// Deliver the outcome.  Returns `false` when the acquisition was
    /// abandoned; the undelivered session is dropped (and so released) here.
    pub fn resolve(self, outcome: CaptureOutcome) -> bool {
        self.tx.send(outcome).is_ok()
    }
}

// ---------------------------------------------------------------------------
// CaptureSource
// ---------------------------------------------------------------------------

/// Entry point to the platform's microphone.
pub trait CaptureSource {
    /// Begin acquiring the microphone.  May prompt the user for permission.
    fn acquire(&mut self, constraints: &CaptureConstraints) -> PendingCapture;
}

// ---------------------------------------------------------------------------
// CpalSource
// ---------------------------------------------------------------------------

/// [`CaptureSource`] backed by the default `cpal` host.
#[derive(Debug, Default)]
pub struct CpalSource;

impl CpalSource {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureSource for CpalSource {
    fn acquire(&mut self, constraints: &CaptureConstraints) -> PendingCapture {
        if constraints.echo_cancellation || constraints.noise_suppression {
            log::info!(
                "capture: host delivers raw input; \
                 echo cancellation / noise suppression are not applied"
            );
        }
        if constraints.auto_gain_control {
            log::warn!(
                "capture: automatic gain control is not available on this host; \
                 measuring raw levels"
            );
        }

        let (resolver, pending) = PendingCapture::channel();
        let constraints = constraints.clone();

        let spawned = std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || run_capture_worker(constraints, resolver));

        match spawned {
            Ok(_) => pending,
            Err(e) => PendingCapture::ready(Err(CaptureError::Unknown(format!(
                "failed to spawn capture thread: {e}"
            )))),
        }
    }
}

/// Stop signal for the stream held by the `mic-capture` thread.
struct CpalStreamControl {
    stop_tx: mpsc::Sender<()>,
}

impl StreamControl for CpalStreamControl {
    fn stop(self: Box<Self>) {
        // The worker also exits if the sender is simply dropped.
        let _ = self.stop_tx.send(());
    }
}

fn run_capture_worker(constraints: CaptureConstraints, resolver: CaptureResolver) {
    let tap = Arc::new(SampleTap::new(constraints.buffer_samples));

    let (stream, device_name, sample_rate) = match open_stream(&constraints, &tap) {
        Ok(opened) => opened,
        Err(e) => {
            log::warn!("capture: acquisition failed: {e}");
            resolver.resolve(Err(e));
            return;
        }
    };

    log::info!("capture: streaming from '{device_name}' at {sample_rate} Hz");

    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let session = CaptureSession::new(
        tap,
        device_name.clone(),
        sample_rate,
        Box::new(CpalStreamControl { stop_tx }),
    );

    if !resolver.resolve(Ok(session)) {
        log::info!("capture: acquisition abandoned, closing '{device_name}'");
        return;
    }

    // Park until the session is released or dropped.
    let _ = stop_rx.recv();
    drop(stream);
    log::debug!("capture: stream on '{device_name}' closed");
}

fn open_stream(
    constraints: &CaptureConstraints,
    tap: &Arc<SampleTap>,
) -> Result<(cpal::Stream, String, u32), CaptureError> {
    let host = cpal::default_host();
    let device = select_device(&host, constraints.device.as_deref())?;
    let device_name = device.name().unwrap_or_else(|_| "unknown input".into());

    let supported = device.default_input_config()?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, channels, tap)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, channels, tap)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, channels, tap)?,
        other => {
            return Err(CaptureError::UnsupportedEnvironment(format!(
                "sample format {other:?} is not supported"
            )))
        }
    };

    stream.play()?;
    Ok((stream, device_name, sample_rate))
}

fn select_device(host: &cpal::Host, wanted: Option<&str>) -> Result<cpal::Device, CaptureError> {
    match wanted {
        None => host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceNotFound("no default input device".into())),
        Some(name) => host
            .input_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceNotFound(format!("no input device named '{name}'"))),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: u16,
    tap: &Arc<SampleTap>,
) -> Result<cpal::Stream, CaptureError>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let data_tap = Arc::clone(tap);
    let error_tap = Arc::clone(tap);
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            scratch.clear();
            scratch.extend(data.iter().map(|&s| f32::from_sample(s)));
            data_tap.push_interleaved(&scratch, channels);
        },
        move |err: cpal::StreamError| {
            log::error!("cpal stream error: {err}");
            error_tap.fail(CaptureError::from(err));
        },
        None,
    )?;

    Ok(stream)
}

// ---------------------------------------------------------------------------
// FakeCaptureSource (tests only)
// ---------------------------------------------------------------------------

/// How a [`FakeCaptureSource`] answers the next acquisition.
#[cfg(test)]
#[derive(Debug, Clone)]
pub enum FakeMode {
    Grant,
    Fail(CaptureError),
    /// Hold the acquisition open until [`FakeCaptureSource::resolve_deferred`].
    Defer,
}

#[cfg(test)]
struct FakeState {
    mode: FakeMode,
    acquisitions: usize,
    deferred: Option<CaptureResolver>,
}

/// In-memory capture source.  Clones share state, so a test can keep one
/// handle while the controller owns another.
#[cfg(test)]
#[derive(Clone)]
pub struct FakeCaptureSource {
    state: Arc<Mutex<FakeState>>,
    tap: Arc<SampleTap>,
    releases: Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
struct FakeStream {
    releases: Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl StreamControl for FakeStream {
    fn stop(self: Box<Self>) {
        self.releases
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl FakeCaptureSource {
    pub fn new(mode: FakeMode) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                mode,
                acquisitions: 0,
                deferred: None,
            })),
            tap: Arc::new(SampleTap::new(8_192)),
            releases: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        }
    }

    pub fn granting() -> Self {
        Self::new(FakeMode::Grant)
    }

    pub fn failing(error: CaptureError) -> Self {
        Self::new(FakeMode::Fail(error))
    }

    pub fn deferred() -> Self {
        Self::new(FakeMode::Defer)
    }

    pub fn set_mode(&self, mode: FakeMode) {
        self.state.lock().unwrap().mode = mode;
    }

    pub fn tap(&self) -> Arc<SampleTap> {
        Arc::clone(&self.tap)
    }

    pub fn acquisitions(&self) -> usize {
        self.state.lock().unwrap().acquisitions
    }

    /// Number of times a granted session's stream has been stopped.
    pub fn releases(&self) -> usize {
        self.releases.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Grant the outstanding deferred acquisition.  Returns whether anyone
    /// was still waiting for it.
    pub fn resolve_deferred(&self) -> bool {
        let resolver = self.state.lock().unwrap().deferred.take();
        match resolver {
            Some(resolver) => resolver.resolve(Ok(self.session())),
            None => false,
        }
    }

    fn session(&self) -> CaptureSession {
        CaptureSession::new(
            Arc::clone(&self.tap),
            "fake microphone",
            48_000,
            Box::new(FakeStream {
                releases: Arc::clone(&self.releases),
            }),
        )
    }
}

#[cfg(test)]
impl CaptureSource for FakeCaptureSource {
    fn acquire(&mut self, _constraints: &CaptureConstraints) -> PendingCapture {
        let mode = {
            let mut st = self.state.lock().unwrap();
            st.acquisitions += 1;
            st.mode.clone()
        };
        match mode {
            FakeMode::Grant => PendingCapture::ready(Ok(self.session())),
            FakeMode::Fail(e) => PendingCapture::ready(Err(e)),
            FakeMode::Defer => {
                let (resolver, pending) = PendingCapture::channel();
                self.state.lock().unwrap().deferred = Some(resolver);
                pending
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
