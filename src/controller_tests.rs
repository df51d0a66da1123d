//! Controller lifecycle tests.
//!
//! Time is paused; tokio advances the clock whenever every task is idle, so
//! debounce windows and render timeouts elapse instantly and deterministically.

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;
    use tokio::task::JoinHandle;

    use crate::config::PreviewConfig;
    use crate::controller::{
        spawn_controller, ControllerHandle, ControllerOptions, ControllerStatus, PreviewBackend,
        PreviewState,
    };
    use crate::error::{PreviewError, Result};
    use crate::protocol::{
        ChannelToken, Envelope, LifecycleMessage, MessageBus, SandboxError, DEFAULT_CHANNEL,
    };
    use crate::service::{PreviewRequest, PreviewResponse, PreviewService};

    const APP: &str = "export default function App() { return <main><Header /></main>; }";
    const OTHER: &str = "export default function Other() { return <p>other</p>; }";

    /// Wraps the real service, recording requests and optionally delaying or failing them.
    struct ScriptedBackend {
        inner: PreviewService,
        calls: AtomicUsize,
        requests: Mutex<Vec<PreviewRequest>>,
        delays: Mutex<VecDeque<Duration>>,
        fail: AtomicBool,
    }

    impl ScriptedBackend {
        fn new(config: PreviewConfig) -> Self {
            Self {
                inner: PreviewService::new(config),
                calls: AtomicUsize::new(0),
                requests: Mutex::new(vec![]),
                delays: Mutex::new(VecDeque::new()),
                fail: AtomicBool::new(false),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn request(&self, index: usize) -> PreviewRequest {
            self.requests.lock()[index].clone()
        }
    }

    impl PreviewBackend for ScriptedBackend {
        fn generate_preview(
            &self,
            request: PreviewRequest,
        ) -> impl Future<Output = Result<PreviewResponse>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push(request.clone());
            let delay = self.delays.lock().pop_front();
            let fail = self.fail.load(Ordering::SeqCst);
            let response = self.inner.generate(request);
            async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if fail {
                    return Err(PreviewError::Transport("backend unavailable".to_string()));
                }
                Ok(response)
            }
        }
    }

    struct Harness {
        backend: Arc<ScriptedBackend>,
        bus: Arc<MessageBus>,
        handle: ControllerHandle,
        status: watch::Receiver<ControllerStatus>,
        task: JoinHandle<()>,
    }

    fn harness(config: PreviewConfig) -> Harness {
        let backend = Arc::new(ScriptedBackend::new(config.clone()));
        let bus = Arc::new(MessageBus::new());
        let (handle, task) = spawn_controller(
            Arc::clone(&backend),
            Arc::clone(&bus),
            config,
            ControllerOptions::default(),
        );
        let status = handle.subscribe();
        Harness {
            backend,
            bus,
            handle,
            status,
            task,
        }
    }

    impl Harness {
        async fn wait_for(&mut self, mut pred: impl FnMut(&ControllerStatus) -> bool) -> ControllerStatus {
            tokio::time::timeout(Duration::from_secs(60), self.status.wait_for(|s| pred(s)))
                .await
                .expect("timed out waiting for controller status")
                .expect("controller stopped")
                .clone()
        }

        async fn rendering(&mut self, version: u64) -> ControllerStatus {
            self.wait_for(|s| s.state == PreviewState::Rendering && s.version == version)
                .await
        }

        fn token(status: &ControllerStatus) -> ChannelToken {
            let session = status.session.as_ref().expect("session");
            session.token(DEFAULT_CHANNEL)
        }

        fn post(&self, status: &ControllerStatus, message: LifecycleMessage) -> bool {
            self.bus
                .dispatch(Envelope::new(&Self::token(status), message))
        }

        fn ready(&self, status: &ControllerStatus, runtime_stubs: &[&str]) -> bool {
            self.post(
                status,
                LifecycleMessage::Ready {
                    component_name: "App".into(),
                    timestamp: 1,
                    runtime_stubs: runtime_stubs.iter().map(|s| s.to_string()).collect(),
                },
            )
        }

        fn error(&self, status: &ControllerStatus, message: &str) -> bool {
            self.post(
                status,
                LifecycleMessage::Error {
                    error: SandboxError::new(message),
                },
            )
        }
    }

    /// Lets the controller drain its queues.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_are_debounced() {
        let mut h = harness(PreviewConfig::default());

        h.handle.edit("const A = 1;").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.handle.edit("const A = 2;").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.handle.edit(APP).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.backend.calls(), 0);
        assert_eq!(h.handle.status().state, PreviewState::Idle);

        let status = h.rendering(1).await;
        assert_eq!(h.backend.calls(), 1);
        assert_eq!(h.backend.request(0).code, APP);
        assert_eq!(h.backend.request(0).version, 1);
        assert!(status.html.as_deref().unwrap().contains("__preview.stub('Header')"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_bypasses_debounce() {
        let mut h = harness(PreviewConfig::default());

        h.handle.edit(APP).unwrap();
        h.handle.refresh().unwrap();
        h.rendering(1).await;
        assert_eq!(h.backend.calls(), 1);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_completes_render() {
        let mut h = harness(PreviewConfig::default());
        h.handle.edit(APP).unwrap();
        h.handle.refresh().unwrap();
        let rendering = h.rendering(1).await;

        assert!(h.ready(&rendering, &["Chart"]));
        let ready = h.wait_for(|s| s.state == PreviewState::Ready).await;
        assert_eq!(ready.known_symbols, vec!["Chart"]);
        assert_eq!(ready.error_transitions, 0);

        // Render timeout no longer applies once Ready.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.handle.status().state, PreviewState::Ready);

        h.handle.refresh().unwrap();
        h.rendering(2).await;
        assert_eq!(h.backend.request(1).options.known_symbols, vec!["Chart"]);
        assert!(!h.ready(&rendering, &[]), "superseded session still routed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_transitions_once_per_session() {
        let mut h = harness(PreviewConfig::default());
        h.handle.edit(APP).unwrap();
        h.handle.refresh().unwrap();
        let rendering = h.rendering(1).await;

        assert!(h.error(&rendering, "TypeError: items.map is not a function"));
        assert!(h.error(&rendering, "TypeError: second failure"));
        let errored = h.wait_for(|s| s.state == PreviewState::Errored).await;
        settle().await;

        let status = h.handle.status();
        assert_eq!(status.error_transitions, 1);
        assert_eq!(
            errored.error.as_deref(),
            Some("TypeError: items.map is not a function")
        );
        assert_eq!(status.error, errored.error);

        h.handle.refresh().unwrap();
        let second = h.rendering(2).await;
        assert!(h.error(&second, "TypeError: again"));
        let status = h.wait_for(|s| s.state == PreviewState::Errored).await;
        assert_eq!(status.error_transitions, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reference_error_feeds_known_symbols() {
        let mut h = harness(PreviewConfig::default());
        h.handle.edit(APP).unwrap();
        h.handle.refresh().unwrap();
        let rendering = h.rendering(1).await;

        assert!(h.error(&rendering, "ReferenceError: Chart is not defined"));
        let errored = h.wait_for(|s| s.state == PreviewState::Errored).await;
        assert_eq!(errored.known_symbols, vec!["Chart"]);

        h.handle.refresh().unwrap();
        let next = h.rendering(2).await;
        assert_eq!(h.backend.request(1).options.known_symbols, vec!["Chart"]);
        let html = next.html.as_deref().unwrap();
        assert!(html.contains("__preview.stub('Chart')"));
        assert!(html.contains("__preview.stub('Header')"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_is_discarded() {
        let mut h = harness(PreviewConfig::default());
        h.backend.delays.lock().push_back(Duration::from_secs(2));

        h.handle.edit(APP).unwrap();
        h.handle.refresh().unwrap();
        h.handle.edit(OTHER).unwrap();
        h.handle.refresh().unwrap();

        let status = h.rendering(2).await;
        assert_eq!(status.session.as_ref().unwrap().version, 2);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let status = h.handle.status();
        assert_eq!(h.backend.calls(), 2);
        assert_eq!(status.version, 2);
        assert_eq!(status.state, PreviewState::Rendering);
        assert_eq!(status.session.as_ref().unwrap().version, 2);
        assert!(status.html.as_deref().unwrap().contains("Other"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_timeout() {
        let mut h = harness(PreviewConfig {
            max_render_time_ms: 1_000,
            ..PreviewConfig::default()
        });
        h.handle.edit(APP).unwrap();
        h.handle.refresh().unwrap();
        let rendering = h.rendering(1).await;

        let errored = h.wait_for(|s| s.state == PreviewState::Errored).await;
        assert!(errored
            .error
            .as_deref()
            .unwrap()
            .contains("did not finish rendering within 1000ms"));
        assert_eq!(errored.error_transitions, 1);

        // A late error from the same session does not count twice.
        assert!(h.error(&rendering, "TypeError: late"));
        settle().await;
        assert_eq!(h.handle.status().error_transitions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_failure() {
        let mut h = harness(PreviewConfig::default());
        h.backend.fail.store(true, Ordering::SeqCst);

        h.handle.edit(APP).unwrap();
        h.handle.refresh().unwrap();
        let status = h.wait_for(|s| s.state == PreviewState::Errored).await;
        assert_eq!(
            status.error.as_deref(),
            Some("Transport error: backend unavailable")
        );
        assert!(status.session.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_source() {
        let mut h = harness(PreviewConfig::default());
        h.handle.edit("   ").unwrap();
        h.handle.refresh().unwrap();
        let status = h.wait_for(|s| s.state == PreviewState::Errored).await;
        assert!(status.error.as_deref().unwrap().contains("Empty code provided"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_discards_in_flight_and_resets_symbols() {
        let mut h = harness(PreviewConfig::default());

        h.handle.open("app.tsx", APP).unwrap();
        let first = h.rendering(1).await;
        assert_eq!(first.unit, "app.tsx");
        assert!(h.ready(&first, &["Chart"]));
        h.wait_for(|s| s.state == PreviewState::Ready).await;

        h.backend.delays.lock().push_back(Duration::from_secs(2));
        h.handle.refresh().unwrap();
        h.handle.open("other.tsx", OTHER).unwrap();

        let status = h.rendering(3).await;
        assert_eq!(status.unit, "other.tsx");
        assert!(status.known_symbols.is_empty());
        assert_eq!(h.backend.request(1).options.known_symbols, vec!["Chart"]);
        assert!(h.backend.request(2).options.known_symbols.is_empty());

        tokio::time::sleep(Duration::from_secs(3)).await;
        let status = h.handle.status();
        assert_eq!(status.version, 3);
        assert_eq!(status.unit, "other.tsx");
        assert!(status.html.as_deref().unwrap().contains("Other"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fullscreen_and_shutdown() {
        let mut h = harness(PreviewConfig::default());
        h.handle.toggle_fullscreen().unwrap();
        assert!(h.wait_for(|s| s.fullscreen).await.fullscreen);
        h.handle.toggle_fullscreen().unwrap();
        h.wait_for(|s| !s.fullscreen).await;

        h.handle.open("app.tsx", APP).unwrap();
        let rendering = h.rendering(1).await;
        let token = Harness::token(&rendering);
        assert!(h.bus.is_subscribed(&token));

        h.handle.shutdown().unwrap();
        (&mut h.task).await.unwrap();
        assert!(!h.bus.is_subscribed(&token));
        assert!(h.handle.refresh().is_err());
    }
}
