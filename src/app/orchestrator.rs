//! Orchestrator - Request Lifecycle
//!
//! Sequences one dispatch from raw settings to a restored display:
//! ```text
//! SingleFlight.try_acquire() ──busy──→ Err(Busy)
//!          ↓
//!   validate::check + resolve_payload ──invalid──→ Err(Validation | PayloadFile)
//!          ↓
//!   progress ticker + liveness ticker
//!          ↓
//!   Transport.dispatch() in its own task
//!          ↓
//!   report outcome, schedule display restoration
//! ```
//!
//! Only one request is in flight at a time; later ones are refused, never
//! queued.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::common::{
    DispatchOutcome, DispatchRequest, FailureKind, Ticker, TimerSet, TransportKind,
};
use crate::config::{Config, DispatchSettings};
use crate::error::{Error, Result};
use crate::logstore::{LogLevel, LogStore};
use crate::transport::{DatagramDispatcher, StreamDispatcher, Transport};

use super::display::{compose_title, image_data_url, DisplaySink, LogEvent};
use super::guard::{FlightPermit, SingleFlight};
use super::metrics::{DispatchMetrics, DISPATCH_REJECTED_BUSY, DISPATCH_REJECTED_INVALID};
use super::validate::{self, CheckedFields, ResolvedPayload};

// ============================================================================
// Constants
// ============================================================================

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

// ============================================================================
// Phase & Timings
// ============================================================================

/// Lifecycle phase of the current request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validating,
    InFlight,
    Completing,
}

/// Cosmetic timer periods and restoration delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub progress_interval: Duration,
    pub liveness_min: Duration,
    pub liveness_max: Duration,
    pub success_restore: Duration,
    pub failure_restore: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_millis(100),
            liveness_min: Duration::from_millis(1500),
            liveness_max: Duration::from_millis(10_000),
            success_restore: Duration::from_millis(1500),
            failure_restore: Duration::from_millis(2000),
        }
    }
}

impl Timings {
    /// Period of the "waiting response" notice for a request timeout
    pub fn liveness_period(&self, timeout: Duration) -> Duration {
        timeout.max(self.liveness_min).min(self.liveness_max)
    }
}

// ============================================================================
// Emitter
// ============================================================================

/// Fans one log event out to tracing, the log store and the display
#[derive(Clone)]
struct Emitter {
    display: Arc<dyn DisplaySink>,
    logs: Option<Arc<LogStore>>,
}

impl Emitter {
    async fn emit(&self, message: impl Into<String>, level: LogLevel) {
        let message = message.into();
        match level {
            LogLevel::Error => error!("{}", message),
            LogLevel::Warning => warn!("{}", message),
            LogLevel::Info | LogLevel::Success => info!("{}", message),
        }

        if let Some(store) = &self.logs {
            if let Err(e) = store.append(level, message.clone()).await {
                debug!("[orchestrator] log store append suppressed: {}", e);
            }
        }

        let event = LogEvent::new(message, level);
        self.display.log(&event).await.discard("log");
    }
}

/// Holds the flight for one request; phase returns to Idle before the
/// permit is released
struct Flight {
    phase: Arc<Mutex<Phase>>,
    _permit: FlightPermit,
}

impl Flight {
    fn enter(&self, phase: Phase) {
        *self.phase.lock() = phase;
    }
}

impl Drop for Flight {
    fn drop(&mut self) {
        *self.phase.lock() = Phase::Idle;
    }
}

/// A dispatcher task that died instead of returning an outcome
#[derive(Debug)]
struct InternalFailure {
    message: String,
    detail: String,
}

impl From<JoinError> for InternalFailure {
    fn from(e: JoinError) -> Self {
        let detail = format!("{:?}", e);
        let message = if e.is_panic() {
            let payload = e.into_panic();
            payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "dispatcher panicked".to_string())
        } else {
            "dispatcher task was cancelled".to_string()
        };
        Self { message, detail }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs one dispatch at a time and keeps the display in step with it
pub struct Orchestrator {
    stream: Arc<dyn Transport>,
    datagram: Arc<dyn Transport>,
    emitter: Emitter,
    guard: SingleFlight,
    timers: TimerSet,
    timings: Timings,
    phase: Arc<Mutex<Phase>>,
    restoration: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// `timers` must be the set the transports draw their deadlines from
    pub fn new(
        display: Arc<dyn DisplaySink>,
        stream: Arc<dyn Transport>,
        datagram: Arc<dyn Transport>,
        timers: TimerSet,
    ) -> Self {
        debug_assert_eq!(stream.kind(), TransportKind::Stream);
        debug_assert_eq!(datagram.kind(), TransportKind::Datagram);
        Self {
            stream,
            datagram,
            emitter: Emitter {
                display,
                logs: None,
            },
            guard: SingleFlight::new(),
            timers,
            timings: Timings::default(),
            phase: Arc::new(Mutex::new(Phase::Idle)),
            restoration: Mutex::new(None),
        }
    }

    /// Real TCP/UDP dispatchers and the configured log store; needs a tokio
    /// runtime for the log writer task
    pub fn from_config(config: &Config, display: Arc<dyn DisplaySink>) -> Self {
        let timers = TimerSet::new();
        let stream = Arc::new(StreamDispatcher::new(timers.clone(), config.stream));
        let datagram = Arc::new(DatagramDispatcher::new(timers.clone(), config.datagram));
        Self::new(display, stream, datagram, timers)
            .with_log_store(Arc::new(LogStore::from_config(&config.log)))
    }

    pub fn with_log_store(mut self, store: Arc<LogStore>) -> Self {
        self.emitter.logs = Some(store);
        self
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub fn is_busy(&self) -> bool {
        self.guard.is_held()
    }

    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    pub fn log_store(&self) -> Option<&Arc<LogStore>> {
        self.emitter.logs.as_ref()
    }

    /// Show the settings on the display ahead of any dispatch.
    ///
    /// Derives the name from a file payload, sets the background image (the
    /// default image when unset or unreadable) and the composed title, or
    /// "Payload" when no field is shown. Returns the settings with the
    /// derived name.
    pub async fn apply_settings(&self, settings: &DispatchSettings) -> DispatchSettings {
        let mut settings = settings.clone();
        if settings.derive_name() {
            debug!("[orchestrator] name derived from payload: {:?}", settings.name);
        }

        let display = &self.emitter.display;
        let image = background_image(settings.bg_image.as_deref()).await;
        display.set_image(image.as_deref()).await.discard("image");

        let title = compose_title(&settings);
        let title = if title.is_empty() { "Payload" } else { title.as_str() };
        display.set_title(title).await.discard("title");
        settings
    }

    /// Run one request to completion.
    ///
    /// Returns `Err(Busy)` while another request is in flight and
    /// `Err(Validation)` or `Err(PayloadFile)` before any network activity;
    /// every other result, including a dispatcher panic, is an `Ok` outcome.
    pub async fn dispatch(&self, settings: &DispatchSettings) -> Result<DispatchOutcome> {
        let Some(permit) = self.guard.try_acquire() else {
            DISPATCH_REJECTED_BUSY.inc();
            self.emitter
                .emit(Error::Busy.to_string(), LogLevel::Warning)
                .await;
            return Err(Error::Busy);
        };
        let flight = Flight {
            phase: Arc::clone(&self.phase),
            _permit: permit,
        };
        flight.enter(Phase::Validating);

        let (fields, payload) = match self.prepare(settings).await {
            Ok(prepared) => prepared,
            Err(e) => {
                DISPATCH_REJECTED_INVALID.inc();
                self.emitter.display.show_alert().await.discard("alert");
                self.emitter.emit(e.to_string(), LogLevel::Error).await;
                return Err(e);
            }
        };
        let request = validate::build_request(&fields, &payload);
        let title = compose_title(settings);

        flight.enter(Phase::InFlight);
        let metrics = DispatchMetrics::start(request.transport());
        let result = {
            let _progress = self.start_progress();
            let _liveness = self.start_liveness(&request);
            self.emitter
                .emit(start_notice(&request), LogLevel::Info)
                .await;
            self.run_dispatcher(&request).await
        };

        flight.enter(Phase::Completing);
        let outcome = match result {
            Ok(outcome) => {
                self.report(&request, &payload, &outcome).await;
                outcome
            }
            Err(internal) => {
                self.report_internal(&request, &internal).await;
                DispatchOutcome::failure(FailureKind::Internal, internal.message)
            }
        };
        metrics.record_outcome(&outcome);

        if !title.is_empty() {
            self.emitter.display.set_title(&title).await.discard("title");
        }
        self.schedule_restoration(title, settings.bg_image.clone(), outcome.is_success());

        drop(flight);
        Ok(outcome)
    }

    /// Reset the request log and re-render the empty document
    pub async fn clear_logs(&self) -> Result<()> {
        let result = match &self.emitter.logs {
            Some(store) => store.clear().await,
            None => Ok(()),
        };
        match &result {
            Ok(()) => {
                info!("[orchestrator] request log cleared");
                self.emitter.display.show_ok().await.discard("ok");
            }
            Err(e) => {
                self.emitter
                    .emit(format!("Failed to clear logs: {}", e), LogLevel::Error)
                    .await;
                self.emitter.display.show_alert().await.discard("alert");
            }
        }
        result
    }

    /// Wait for the most recently scheduled display restoration
    pub async fn settle(&self) {
        let handle = self.restoration.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                debug!("[orchestrator] display restoration did not finish: {}", e);
            }
        }
    }

    async fn prepare(
        &self,
        settings: &DispatchSettings,
    ) -> Result<(CheckedFields, ResolvedPayload)> {
        let fields = validate::check(settings)?;
        let payload = validate::resolve_payload(&fields.payload).await?;
        if let Some(name) = payload.file_name() {
            self.emitter
                .emit(
                    format!("Reading file content from {}...", fields.payload),
                    LogLevel::Info,
                )
                .await;
            self.emitter
                .emit(
                    format!("File ready: {} ({} bytes)", name, payload.data.len()),
                    LogLevel::Info,
                )
                .await;
        }
        Ok((fields, payload))
    }

    fn transport_for(&self, kind: TransportKind) -> Arc<dyn Transport> {
        match kind {
            TransportKind::Stream => Arc::clone(&self.stream),
            TransportKind::Datagram => Arc::clone(&self.datagram),
        }
    }

    /// Run the dispatcher in its own task so a panic surfaces as a value
    async fn run_dispatcher(
        &self,
        request: &DispatchRequest,
    ) -> std::result::Result<DispatchOutcome, InternalFailure> {
        let transport = self.transport_for(request.transport());
        let task_request = request.clone();
        tokio::spawn(async move { transport.dispatch(&task_request).await })
            .await
            .map_err(InternalFailure::from)
    }

    fn start_progress(&self) -> Ticker {
        let display = Arc::clone(&self.emitter.display);
        self.timers
            .ticker(self.timings.progress_interval, move |tick| {
                let display = Arc::clone(&display);
                async move {
                    let frame = SPINNER[(tick % SPINNER.len() as u64) as usize];
                    let title = format!("{}\nSending...", frame);
                    display.set_title(&title).await.discard("progress");
                }
            })
    }

    fn start_liveness(&self, request: &DispatchRequest) -> Ticker {
        let emitter = self.emitter.clone();
        let notice = format!("{} waiting response...", request.transport().label());
        let period = self.timings.liveness_period(request.timeout());
        self.timers.ticker(period, move |_| {
            let emitter = emitter.clone();
            let notice = notice.clone();
            async move { emitter.emit(notice, LogLevel::Info).await }
        })
    }

    async fn report(
        &self,
        request: &DispatchRequest,
        payload: &ResolvedPayload,
        outcome: &DispatchOutcome,
    ) {
        let label = request.transport().label();
        let delivery = match outcome {
            DispatchOutcome::Success(delivery) => delivery,
            DispatchOutcome::Failure { message, .. } => {
                self.emitter.display.show_alert().await.discard("alert");
                self.emitter
                    .emit(format!("{} request failed: {}", label, message), LogLevel::Error)
                    .await;
                return;
            }
        };

        self.emitter.display.show_ok().await.discard("ok");
        if request.transport() == TransportKind::Stream {
            if let Some(name) = payload.file_name() {
                self.emitter
                    .emit(
                        format!(
                            "Successfully sent file '{}' to {}",
                            name,
                            request.destination()
                        ),
                        LogLevel::Success,
                    )
                    .await;
            }
        }

        let message = match request.transport() {
            TransportKind::Datagram => format!("📡 {}", delivery.message()),
            TransportKind::Stream => delivery.message().to_string(),
        };
        self.emitter.emit(message, LogLevel::Info).await;

        if delivery.bytes_sent() > 0 {
            self.emitter
                .emit(format!("Bytes sent: {}", delivery.bytes_sent()), LogLevel::Info)
                .await;
        }
        if let Some(text) = delivery.reply_text().filter(|t| !t.is_empty()) {
            self.emitter
                .emit(format!("Response data: {}", text), LogLevel::Info)
                .await;
        }
        self.emitter
            .emit(
                format!("{} request completed successfully", label),
                LogLevel::Success,
            )
            .await;
    }

    async fn report_internal(&self, request: &DispatchRequest, internal: &InternalFailure) {
        self.emitter.display.show_alert().await.discard("alert");
        match request.transport() {
            TransportKind::Stream => {
                self.emitter
                    .emit(format!("An error occurred: {}", internal.message), LogLevel::Error)
                    .await;
                self.emitter
                    .emit(internal.detail.clone(), LogLevel::Error)
                    .await;
            }
            TransportKind::Datagram => {
                self.emitter
                    .emit(
                        format!("{} request failed: {}", request.transport(), internal.message),
                        LogLevel::Error,
                    )
                    .await;
            }
        }
    }

    /// Restore the background image and title after a delay.
    /// A newer restoration replaces a pending one.
    fn schedule_restoration(&self, title: String, bg_image: Option<String>, success: bool) {
        let delay = if success {
            self.timings.success_restore
        } else {
            self.timings.failure_restore
        };
        let display = Arc::clone(&self.emitter.display);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let image = background_image(bg_image.as_deref()).await;
            display.set_image(image.as_deref()).await.discard("image");

            let title = if title.is_empty() { "Done" } else { title.as_str() };
            display.set_title(title).await.discard("title");
        });

        if let Some(previous) = self.restoration.lock().replace(handle) {
            previous.abort();
        }
    }
}

/// Data URL of the configured background image; None selects the default
async fn background_image(path: Option<&str>) -> Option<String> {
    let path = path.filter(|p| !p.is_empty())?;
    match image_data_url(path).await {
        Ok(url) => Some(url),
        Err(e) => {
            debug!("[orchestrator] background image {} unavailable: {}", path, e);
            None
        }
    }
}

fn start_notice(request: &DispatchRequest) -> String {
    match request.transport() {
        TransportKind::Stream => format!("Connecting to {}....", request.destination()),
        TransportKind::Datagram => format!(
            "Initiating UDP connection to {} (timeout: {}ms)...",
            request.destination(),
            request.timeout_ms()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::display::SideEffect;
    use crate::common::{Delivery, TextEncoding};
    use crate::transport::DatagramOptions;
    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::net::UdpSocket;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Log(String, LogLevel),
        Title(String),
        Image(Option<String>),
        Ok,
        Alert,
    }

    #[derive(Default)]
    struct RecordingDisplay {
        calls: Mutex<Vec<Call>>,
        broken: bool,
    }

    impl RecordingDisplay {
        fn broken() -> Self {
            Self {
                broken: true,
                ..Default::default()
            }
        }

        fn record(&self, call: Call) -> SideEffect {
            self.calls.lock().push(call);
            if self.broken {
                SideEffect::failed("display detached")
            } else {
                SideEffect::done()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn messages(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Log(m, _) => Some(m),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl DisplaySink for RecordingDisplay {
        async fn log(&self, event: &LogEvent) -> SideEffect {
            self.record(Call::Log(event.message.clone(), event.level))
        }
        async fn set_title(&self, title: &str) -> SideEffect {
            self.record(Call::Title(title.to_string()))
        }
        async fn set_image(&self, image: Option<&str>) -> SideEffect {
            self.record(Call::Image(image.map(str::to_string)))
        }
        async fn show_ok(&self) -> SideEffect {
            self.record(Call::Ok)
        }
        async fn show_alert(&self) -> SideEffect {
            self.record(Call::Alert)
        }
    }

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail,
        Panic,
    }

    /// Transport that answers after a fixed delay without touching the network
    struct FakeTransport {
        kind: TransportKind,
        delay: Duration,
        behavior: Behavior,
    }

    impl FakeTransport {
        fn new(kind: TransportKind, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                kind,
                delay: Duration::from_millis(20),
                behavior,
            })
        }

        fn slow(kind: TransportKind, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                kind,
                delay,
                behavior: Behavior::Succeed,
            })
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn kind(&self) -> TransportKind {
            self.kind
        }

        async fn dispatch(&self, request: &DispatchRequest) -> DispatchOutcome {
            tokio::time::sleep(self.delay).await;
            match self.behavior {
                Behavior::Succeed => DispatchOutcome::Success(
                    Delivery::new(format!("{} fake sent", self.kind), request.payload().len())
                        .with_reply(Bytes::from_static(b"pong"), TextEncoding::Utf8),
                ),
                Behavior::Fail => {
                    DispatchOutcome::failure(FailureKind::Transport, "TCP error: refused")
                }
                Behavior::Panic => panic!("dispatcher exploded"),
            }
        }
    }

    fn fast() -> Timings {
        Timings {
            progress_interval: Duration::from_millis(10),
            liveness_min: Duration::from_millis(40),
            liveness_max: Duration::from_millis(80),
            success_restore: Duration::from_millis(20),
            failure_restore: Duration::from_millis(30),
        }
    }

    fn settings(kind: &str, port: i64, payload: &str) -> DispatchSettings {
        DispatchSettings {
            ip: Some("127.0.0.1".to_string()),
            port: Some(port),
            kind: Some(kind.to_string()),
            payload: Some(payload.to_string()),
            timeout: Some(300),
            ..Default::default()
        }
    }

    fn orchestrator(
        display: Arc<RecordingDisplay>,
        stream: Arc<dyn Transport>,
        datagram: Arc<dyn Transport>,
    ) -> Orchestrator {
        Orchestrator::new(display, stream, datagram, TimerSet::new()).with_timings(fast())
    }

    #[tokio::test]
    async fn test_udp_silence_succeeds_and_releases_timers() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LogStore::new(dir.path(), "requests.html", 500));
        let display = Arc::new(RecordingDisplay::default());
        let timers = TimerSet::new();
        let datagram = Arc::new(DatagramDispatcher::new(timers.clone(), DatagramOptions::default()));
        let orch = Orchestrator::new(
            display.clone(),
            FakeTransport::new(TransportKind::Stream, Behavior::Succeed),
            datagram,
            timers,
        )
        .with_timings(fast())
        .with_log_store(Arc::clone(&store));

        let outcome = orch.dispatch(&settings("udp", port as i64, "ping")).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.message(), "UDP no response within 300ms");
        assert_eq!(orch.timers().pending(), 0);
        // progress, liveness and the receive deadline
        assert_eq!(orch.timers().issued(), 3);
        assert_eq!(orch.phase(), Phase::Idle);
        assert!(!orch.is_busy());

        let messages = display.messages();
        assert_eq!(
            messages[0],
            format!("Initiating UDP connection to 127.0.0.1:{} (timeout: 300ms)...", port)
        );
        assert!(messages.contains(&"UDP waiting response...".to_string()));
        assert!(messages.contains(&"📡 UDP no response within 300ms".to_string()));
        assert!(messages.contains(&"Bytes sent: 4".to_string()));
        assert_eq!(messages.last().unwrap(), "UDP request completed successfully");
        assert!(display
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Title(t) if t.ends_with("\nSending..."))));

        let records = store.records().await;
        assert_eq!(records[0].message, messages[0]);
        assert_eq!(records.last().unwrap().level, LogLevel::Success);
    }

    #[tokio::test]
    async fn test_busy_rejected_without_disturbing_first() {
        let display = Arc::new(RecordingDisplay::default());
        let orch = Arc::new(orchestrator(
            display.clone(),
            FakeTransport::slow(TransportKind::Stream, Duration::from_millis(200)),
            FakeTransport::new(TransportKind::Datagram, Behavior::Succeed),
        ));

        let first = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.dispatch(&settings("TCP", 9000, "GO")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(orch.is_busy());
        assert_eq!(orch.phase(), Phase::InFlight);

        let second = orch.dispatch(&settings("UDP", 9000, "GO")).await;
        assert!(matches!(second, Err(Error::Busy)));

        let first = first.await.unwrap().unwrap();
        assert!(first.is_success());
        assert_eq!(first.message(), "TCP fake sent");
        assert_eq!(orch.timers().pending(), 0);
        assert!(display
            .calls()
            .contains(&Call::Log("Request ignored: already sending".into(), LogLevel::Warning)));

        // free again right away, restoration delay or not
        assert!(orch.dispatch(&settings("UDP", 9000, "GO")).await.is_ok());
    }

    #[tokio::test]
    async fn test_validation_lists_every_violation() {
        let display = Arc::new(RecordingDisplay::default());
        let orch = orchestrator(
            display.clone(),
            FakeTransport::new(TransportKind::Stream, Behavior::Succeed),
            FakeTransport::new(TransportKind::Datagram, Behavior::Succeed),
        );

        let err = orch
            .dispatch(&settings("XML", 70000, "hello"))
            .await
            .unwrap_err();

        assert_eq!(err.violations().len(), 2);
        assert_eq!(orch.timers().issued(), 0);
        assert_eq!(orch.phase(), Phase::Idle);
        assert!(!orch.is_busy());
        assert_eq!(
            display.calls(),
            vec![
                Call::Alert,
                Call::Log(
                    "Cannot send: Invalid port '70000' (must be 1-65535) | Invalid type 'XML' (must be TCP or UDP)"
                        .into(),
                    LogLevel::Error
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_file_fails_before_network() {
        let display = Arc::new(RecordingDisplay::default());
        let orch = orchestrator(
            display.clone(),
            FakeTransport::new(TransportKind::Stream, Behavior::Panic),
            FakeTransport::new(TransportKind::Datagram, Behavior::Panic),
        );

        let err = orch
            .dispatch(&settings("TCP", 9000, "./no/such/cue.bin"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PayloadFile(_)));
        assert_eq!(orch.timers().issued(), 0);
        assert!(!orch.is_busy());

        let calls = display.calls();
        assert_eq!(calls[0], Call::Alert);
        let messages = display.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Failed to read file: "));
        assert!(!messages.iter().any(|m| m.starts_with("Reading file content")));
    }

    #[tokio::test]
    async fn test_panicking_dispatcher_becomes_internal() {
        let display = Arc::new(RecordingDisplay::default());
        let orch = orchestrator(
            display.clone(),
            FakeTransport::new(TransportKind::Stream, Behavior::Panic),
            FakeTransport::new(TransportKind::Datagram, Behavior::Succeed),
        );

        let outcome = orch.dispatch(&settings("tcp", 9000, "GO")).await.unwrap();

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Internal));
        assert_eq!(outcome.message(), "dispatcher exploded");
        assert_eq!(orch.timers().pending(), 0);
        assert!(!orch.is_busy());

        let messages = display.messages();
        assert!(messages.contains(&"An error occurred: dispatcher exploded".to_string()));
        assert!(display.calls().contains(&Call::Alert));
    }

    #[tokio::test]
    async fn test_failure_reported_and_restored_to_done() {
        let display = Arc::new(RecordingDisplay::default());
        let orch = orchestrator(
            display.clone(),
            FakeTransport::new(TransportKind::Stream, Behavior::Fail),
            FakeTransport::new(TransportKind::Datagram, Behavior::Succeed),
        );

        let outcome = orch.dispatch(&settings("TCP", 9000, "GO")).await.unwrap();
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Transport));
        orch.settle().await;

        let calls = display.calls();
        assert!(calls.contains(&Call::Log(
            "TCP request failed: TCP error: refused".into(),
            LogLevel::Error
        )));
        let tail = &calls[calls.len() - 2..];
        assert_eq!(tail, &[Call::Image(None), Call::Title("Done".into())]);
    }

    #[tokio::test]
    async fn test_file_payload_and_restoration() {
        let dir = tempfile::tempdir().unwrap();
        let cue = dir.path().join("cue.bin");
        std::fs::write(&cue, [1u8, 2, 3]).unwrap();
        let bg = dir.path().join("bg.png");
        std::fs::write(&bg, b"PNG").unwrap();

        let display = Arc::new(RecordingDisplay::default());
        let orch = orchestrator(
            display.clone(),
            FakeTransport::new(TransportKind::Stream, Behavior::Succeed),
            FakeTransport::new(TransportKind::Datagram, Behavior::Succeed),
        );
        let mut s = settings("TCP", 9000, cue.to_str().unwrap());
        s.name = Some("Cue".to_string());
        s.show_name = Some(true);
        s.show_port = Some(true);
        s.bg_image = Some(bg.to_string_lossy().into_owned());

        let outcome = orch.dispatch(&s).await.unwrap();
        assert!(outcome.is_success());

        let messages = display.messages();
        let reading = format!("Reading file content from {}...", cue.display());
        assert_eq!(messages[0], reading);
        assert_eq!(messages[1], "File ready: cue.bin (3 bytes)");
        assert!(messages.contains(&"Successfully sent file 'cue.bin' to 127.0.0.1:9000".to_string()));
        assert!(messages.contains(&"Bytes sent: 3".to_string()));
        assert!(messages.contains(&"Response data: pong".to_string()));
        assert!(messages.contains(&"Connecting to 127.0.0.1:9000....".to_string()));

        orch.settle().await;
        let calls = display.calls();
        let tail = &calls[calls.len() - 2..];
        assert_eq!(
            tail,
            &[
                Call::Image(Some("data:image/png;base64,UE5H".into())),
                Call::Title("Cue\n9000".into())
            ]
        );
    }

    #[tokio::test]
    async fn test_restoration_waits_longer_after_failure() {
        let timings = Timings {
            success_restore: Duration::from_millis(20),
            failure_restore: Duration::from_millis(300),
            ..fast()
        };
        let ok_display = Arc::new(RecordingDisplay::default());
        let ok = Orchestrator::new(
            ok_display.clone(),
            FakeTransport::new(TransportKind::Stream, Behavior::Succeed),
            FakeTransport::new(TransportKind::Datagram, Behavior::Succeed),
            TimerSet::new(),
        )
        .with_timings(timings);
        let failed_display = Arc::new(RecordingDisplay::default());
        let failed = Orchestrator::new(
            failed_display.clone(),
            FakeTransport::new(TransportKind::Stream, Behavior::Fail),
            FakeTransport::new(TransportKind::Datagram, Behavior::Succeed),
            TimerSet::new(),
        )
        .with_timings(timings);

        assert!(ok.dispatch(&settings("TCP", 9000, "GO")).await.unwrap().is_success());
        assert!(!failed.dispatch(&settings("TCP", 9000, "GO")).await.unwrap().is_success());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let restored = |display: &RecordingDisplay| {
            display.calls().iter().any(|c| matches!(c, Call::Image(_)))
        };
        assert!(restored(ok_display.as_ref()));
        assert!(!restored(failed_display.as_ref()));

        failed.settle().await;
        assert!(restored(failed_display.as_ref()));
        assert_eq!(failed_display.calls().last(), Some(&Call::Title("Done".into())));
    }

    #[tokio::test]
    async fn test_apply_settings_shows_name_image_and_title() {
        let dir = tempfile::tempdir().unwrap();
        let bg = dir.path().join("bg.png");
        std::fs::write(&bg, b"PNG").unwrap();

        let display = Arc::new(RecordingDisplay::default());
        let orch = orchestrator(
            display.clone(),
            FakeTransport::new(TransportKind::Stream, Behavior::Panic),
            FakeTransport::new(TransportKind::Datagram, Behavior::Panic),
        );
        let mut s = settings("TCP", 9000, "./scenes/intro.bin");
        s.show_name = Some(true);
        s.show_port = Some(true);
        s.bg_image = Some(bg.to_string_lossy().into_owned());

        let applied = orch.apply_settings(&s).await;

        assert_eq!(applied.name.as_deref(), Some("intro"));
        assert_eq!(
            display.calls(),
            vec![
                Call::Image(Some("data:image/png;base64,UE5H".into())),
                Call::Title("intro\n9000".into()),
            ]
        );
        assert_eq!(orch.timers().issued(), 0);
        assert_eq!(orch.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_apply_settings_falls_back_to_defaults() {
        let display = Arc::new(RecordingDisplay::default());
        let orch = orchestrator(
            display.clone(),
            FakeTransport::new(TransportKind::Stream, Behavior::Panic),
            FakeTransport::new(TransportKind::Datagram, Behavior::Panic),
        );
        let mut s = settings("UDP", 9000, "GO");
        s.bg_image = Some("/no/such/bg.png".to_string());

        let applied = orch.apply_settings(&s).await;

        assert_eq!(applied.name, None);
        assert_eq!(
            display.calls(),
            vec![Call::Image(None), Call::Title("Payload".into())]
        );

        // A detached display changes nothing about the returned settings
        let broken = Arc::new(RecordingDisplay::broken());
        let orch = orchestrator(
            broken.clone(),
            FakeTransport::new(TransportKind::Stream, Behavior::Panic),
            FakeTransport::new(TransportKind::Datagram, Behavior::Panic),
        );
        assert_eq!(orch.apply_settings(&s).await, applied);
        assert_eq!(broken.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_broken_display_does_not_change_outcome() {
        let display = Arc::new(RecordingDisplay::broken());
        let orch = orchestrator(
            display.clone(),
            FakeTransport::new(TransportKind::Stream, Behavior::Succeed),
            FakeTransport::new(TransportKind::Datagram, Behavior::Succeed),
        );

        let outcome = orch.dispatch(&settings("UDP", 9000, "GO")).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.message(), "UDP fake sent");
        assert!(!display.calls().is_empty());
    }

    #[tokio::test]
    async fn test_clear_logs() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LogStore::new(dir.path(), "requests.html", 500));
        let display = Arc::new(RecordingDisplay::default());
        let orch = orchestrator(
            display.clone(),
            FakeTransport::new(TransportKind::Stream, Behavior::Succeed),
            FakeTransport::new(TransportKind::Datagram, Behavior::Succeed),
        )
        .with_log_store(Arc::clone(&store));

        orch.dispatch(&settings("UDP", 9000, "GO")).await.unwrap();
        assert!(!store.records().await.is_empty());

        orch.clear_logs().await.unwrap();

        assert!(store.records().await.is_empty());
        assert_eq!(display.calls().last(), Some(&Call::Ok));
    }

    #[test]
    fn test_liveness_period_clamped() {
        let t = Timings::default();
        assert_eq!(t.liveness_period(Duration::from_millis(300)), Duration::from_millis(1500));
        assert_eq!(t.liveness_period(Duration::from_millis(4000)), Duration::from_millis(4000));
        assert_eq!(t.liveness_period(Duration::from_secs(60)), Duration::from_secs(10));
    }
}
