//! # Host-Side Preview Controller
//!
//! A tokio actor that owns the preview lifecycle for one host surface.
//!
//! ```text
//! Idle ──edit, debounce elapsed──▶ Requesting ──response ok──▶ Rendering ──Ready──▶ Ready
//!                                  Requesting ──response err─▶ Errored
//!                                   Rendering ──Error / timeout──▶ Errored
//! any ──refresh──▶ Requesting
//! ```
//!
//! Every request carries a monotonic version; responses for older versions are
//! dropped. Lifecycle messages are received only for the current session's
//! channel token, and an Error moves the controller to Errored at most once
//! per session.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant, Sleep};

use crate::config::PreviewConfig;
use crate::error::{PreviewError, Result};
use crate::protocol::{ChannelToken, LifecycleMessage, MessageBus, DEFAULT_CHANNEL};
use crate::service::{PreviewOptions, PreviewRequest, PreviewResponse, PreviewService, COMPONENT_KIND};
use crate::session::{new_session_id, PreviewSession};
use crate::stubs::{StubRegistry, SymbolResolver};

const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Produces previews for the controller. Implemented by [`PreviewService`];
/// hosts that talk to a remote backend provide their own.
pub trait PreviewBackend: Send + Sync + 'static {
    fn generate_preview(
        &self,
        request: PreviewRequest,
    ) -> impl Future<Output = Result<PreviewResponse>> + Send;
}

impl PreviewBackend for PreviewService {
    fn generate_preview(
        &self,
        request: PreviewRequest,
    ) -> impl Future<Output = Result<PreviewResponse>> + Send {
        let response = self.generate(request);
        async move { Ok(response) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PreviewState {
    Idle,
    Requesting,
    Rendering,
    Ready,
    Errored,
}

/// Snapshot published to the host after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
    pub state: PreviewState,
    pub unit: String,
    pub version: u64,
    pub session: Option<PreviewSession>,
    #[serde(skip)]
    pub html: Option<Arc<str>>,
    pub error: Option<String>,
    pub fullscreen: bool,
    /// Runtime-discovered symbols pre-declared on the next request.
    pub known_symbols: Vec<String>,
    /// Number of transitions into Errored since the controller started.
    pub error_transitions: u64,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub channel: String,
    pub collaboration: bool,
    pub unit: String,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            collaboration: false,
            unit: String::from("untitled"),
        }
    }
}

#[derive(Debug)]
enum Command {
    Edit(String),
    Refresh,
    Open { unit: String, code: String },
    ToggleFullscreen,
    Shutdown,
}

enum Event {
    Command(Option<Command>),
    DebounceElapsed,
    Response(u64, Result<PreviewResponse>),
    Lifecycle(std::result::Result<LifecycleMessage, broadcast::error::RecvError>),
    RenderTimeout,
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Cloneable front door to a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ControllerStatus>,
}

impl ControllerHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| PreviewError::Transport("preview controller has stopped".to_string()))
    }

    /// Record an edit; a request follows once the debounce window passes quietly.
    pub fn edit(&self, code: impl Into<String>) -> Result<()> {
        self.send(Command::Edit(code.into()))
    }

    /// Request immediately, bypassing the debounce window.
    pub fn refresh(&self) -> Result<()> {
        self.send(Command::Refresh)
    }

    /// Switch to another source unit. In-flight requests for the old unit are discarded.
    pub fn open(&self, unit: impl Into<String>, code: impl Into<String>) -> Result<()> {
        self.send(Command::Open {
            unit: unit.into(),
            code: code.into(),
        })
    }

    pub fn toggle_fullscreen(&self) -> Result<()> {
        self.send(Command::ToggleFullscreen)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    pub fn status(&self) -> ControllerStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerStatus> {
        self.status.clone()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACTOR
// ═══════════════════════════════════════════════════════════════════════════════

struct PreviewController<B: PreviewBackend> {
    backend: Arc<B>,
    bus: Arc<MessageBus>,
    config: PreviewConfig,
    channel: String,
    collaboration: bool,
    unit: String,
    code: String,
    version: u64,
    state: PreviewState,
    session: Option<PreviewSession>,
    html: Option<Arc<str>>,
    error: Option<String>,
    fullscreen: bool,
    /// Per-unit symbols the sandbox stubbed or failed on at runtime.
    discovered: StubRegistry,
    session_errored: bool,
    error_transitions: u64,
    debounce_at: Option<Instant>,
    render_deadline: Option<Instant>,
    lifecycle: Option<(ChannelToken, broadcast::Receiver<LifecycleMessage>)>,
    status_tx: watch::Sender<ControllerStatus>,
}

/// Start a controller on the current runtime.
pub fn spawn_controller<B: PreviewBackend>(
    backend: Arc<B>,
    bus: Arc<MessageBus>,
    config: PreviewConfig,
    options: ControllerOptions,
) -> (ControllerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let controller = PreviewController::new(backend, bus, config, options);
    let status = controller.status_tx.subscribe();
    let task = tokio::spawn(controller.run(rx));
    (ControllerHandle { tx, status }, task)
}

impl<B: PreviewBackend> PreviewController<B> {
    fn new(
        backend: Arc<B>,
        bus: Arc<MessageBus>,
        config: PreviewConfig,
        options: ControllerOptions,
    ) -> Self {
        let initial = ControllerStatus {
            state: PreviewState::Idle,
            unit: options.unit.clone(),
            version: 0,
            session: None,
            html: None,
            error: None,
            fullscreen: false,
            known_symbols: vec![],
            error_transitions: 0,
        };
        let (status_tx, _) = watch::channel(initial);
        Self {
            backend,
            bus,
            config,
            channel: options.channel,
            collaboration: options.collaboration,
            unit: options.unit,
            code: String::new(),
            version: 0,
            state: PreviewState::Idle,
            session: None,
            html: None,
            error: None,
            fullscreen: false,
            discovered: StubRegistry::new(),
            session_errored: false,
            error_transitions: 0,
            debounce_at: None,
            render_deadline: None,
            lifecycle: None,
            status_tx,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let (resp_tx, mut responses) = mpsc::unbounded_channel::<(u64, Result<PreviewResponse>)>();

        loop {
            let debounce_at = self.debounce_at;
            let render_deadline = self.render_deadline;
            let listening = self.lifecycle.is_some();

            let event = tokio::select! {
                command = commands.recv() => Event::Command(command),
                _ = deadline(debounce_at), if debounce_at.is_some() => Event::DebounceElapsed,
                Some((version, result)) = responses.recv() => Event::Response(version, result),
                message = next_lifecycle(&mut self.lifecycle), if listening => Event::Lifecycle(message),
                _ = deadline(render_deadline), if render_deadline.is_some() => Event::RenderTimeout,
            };

            match event {
                Event::Command(None) | Event::Command(Some(Command::Shutdown)) => break,
                Event::Command(Some(command)) => self.handle_command(command, &resp_tx),
                Event::DebounceElapsed => {
                    self.debounce_at = None;
                    self.issue_request(&resp_tx);
                }
                Event::Response(version, result) => self.handle_response(version, result),
                Event::Lifecycle(Ok(message)) => self.handle_lifecycle(message),
                Event::Lifecycle(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "lifecycle receiver lagged");
                }
                Event::Lifecycle(Err(broadcast::error::RecvError::Closed)) => {
                    self.lifecycle = None;
                }
                Event::RenderTimeout => self.render_timed_out(),
            }
        }

        self.stop_listening();
        tracing::debug!(unit = %self.unit, "preview controller stopped");
    }

    fn handle_command(
        &mut self,
        command: Command,
        resp_tx: &mpsc::UnboundedSender<(u64, Result<PreviewResponse>)>,
    ) {
        match command {
            Command::Edit(code) => {
                self.code = code;
                self.debounce_at = Some(Instant::now() + self.config.debounce());
            }
            Command::Refresh => {
                self.debounce_at = None;
                self.issue_request(resp_tx);
            }
            Command::Open { unit, code } => {
                tracing::info!(from = %self.unit, to = %unit, "switching source unit");
                self.unit = unit;
                self.code = code;
                self.discovered = StubRegistry::new();
                self.debounce_at = None;
                self.issue_request(resp_tx);
            }
            Command::ToggleFullscreen => {
                self.fullscreen = !self.fullscreen;
                self.publish();
            }
            Command::Shutdown => {}
        }
    }

    fn issue_request(&mut self, resp_tx: &mpsc::UnboundedSender<(u64, Result<PreviewResponse>)>) {
        self.version += 1;
        let version = self.version;
        self.stop_listening();
        self.render_deadline = None;
        self.state = PreviewState::Requesting;
        self.error = None;

        let request = PreviewRequest {
            code: self.code.clone(),
            kind: COMPONENT_KIND.to_string(),
            options: PreviewOptions {
                known_symbols: self.discovered.names(),
                channel: Some(self.channel.clone()),
            },
            session_id: Some(new_session_id()),
            version,
            collaboration: self.collaboration,
        };
        tracing::info!(unit = %self.unit, version, "requesting preview");

        let backend = Arc::clone(&self.backend);
        let resp_tx = resp_tx.clone();
        tokio::spawn(async move {
            let result = backend.generate_preview(request).await;
            let _ = resp_tx.send((version, result));
        });

        self.publish();
    }

    fn handle_response(&mut self, version: u64, result: Result<PreviewResponse>) {
        if version != self.version {
            tracing::warn!(version, current = self.version, "discarding stale preview response");
            return;
        }

        match result {
            Ok(PreviewResponse::Success(success)) => {
                let session = success.metadata.session.clone();
                let token = session.token(&success.metadata.channel);
                // Subscribe before handing the document out so no message is missed.
                let receiver = self.bus.subscribe(&token);
                self.lifecycle = Some((token, receiver));
                self.session_errored = false;
                self.session = Some(session);
                self.html = Some(Arc::from(success.preview_html.as_str()));
                self.render_deadline = Some(Instant::now() + self.config.max_render_time());
                self.state = PreviewState::Rendering;
                tracing::info!(version, entry = %success.metadata.entry, "preview rendering");
                self.publish();
            }
            Ok(PreviewResponse::Failure(failure)) => {
                self.enter_errored(format!("{}: {}", failure.error_type, failure.error));
            }
            Err(err) => {
                tracing::warn!(version, error = %err, "preview request failed");
                self.enter_errored(err.to_string());
            }
        }
    }

    fn handle_lifecycle(&mut self, message: LifecycleMessage) {
        match message {
            LifecycleMessage::Ready { runtime_stubs, .. } => {
                for name in &runtime_stubs {
                    self.discovered.resolve(name);
                }
                if self.state == PreviewState::Rendering {
                    self.render_deadline = None;
                    self.state = PreviewState::Ready;
                    tracing::info!(version = self.version, "preview ready");
                }
                self.publish();
            }
            LifecycleMessage::Error { error } => {
                if let Some(name) = error.undefined_identifier() {
                    self.discovered.resolve(name);
                }
                if self.session_errored {
                    tracing::debug!(message = %error.message, "additional sandbox error ignored");
                    self.publish();
                    return;
                }
                if matches!(self.state, PreviewState::Rendering | PreviewState::Ready) {
                    self.session_errored = true;
                    self.enter_errored(error.message);
                }
            }
        }
    }

    fn render_timed_out(&mut self) {
        self.render_deadline = None;
        if self.state == PreviewState::Rendering {
            let message = format!(
                "Preview did not finish rendering within {}ms",
                self.config.max_render_time_ms
            );
            tracing::warn!(version = self.version, "{}", message);
            self.session_errored = true;
            self.enter_errored(message);
        }
    }

    fn enter_errored(&mut self, message: String) {
        self.render_deadline = None;
        self.state = PreviewState::Errored;
        self.error = Some(message);
        self.error_transitions += 1;
        self.publish();
    }

    fn stop_listening(&mut self) {
        if let Some((token, _)) = self.lifecycle.take() {
            self.bus.unsubscribe(&token);
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(ControllerStatus {
            state: self.state,
            unit: self.unit.clone(),
            version: self.version,
            session: self.session.clone(),
            html: self.html.clone(),
            error: self.error.clone(),
            fullscreen: self.fullscreen,
            known_symbols: self.discovered.names(),
            error_transitions: self.error_transitions,
        });
    }
}

/// Sleep until `at`; branches with no deadline are disabled by their guard,
/// but the future is still built.
fn deadline(at: Option<Instant>) -> Sleep {
    sleep_until(at.unwrap_or_else(|| Instant::now() + FAR_FUTURE))
}

async fn next_lifecycle(
    lifecycle: &mut Option<(ChannelToken, broadcast::Receiver<LifecycleMessage>)>,
) -> std::result::Result<LifecycleMessage, broadcast::error::RecvError> {
    match lifecycle {
        Some((_, rx)) => rx.recv().await,
        None => std::future::pending().await,
    }
}
