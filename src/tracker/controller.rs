use anyhow::{bail, Context, Result};
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::sensing::WindowProbe;
use crate::settings::TrackerSettings;
use crate::storage::UsageStore;

use super::loop_worker::tracking_loop;
use super::state::TrackerState;

/// Owns the background tracking task. At most one loop runs at a time.
pub struct TrackerController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    probe: Arc<dyn WindowProbe>,
    store: Arc<UsageStore>,
    settings: TrackerSettings,
    state_tx: Arc<watch::Sender<TrackerState>>,
}

impl TrackerController {
    pub fn new(
        probe: Arc<dyn WindowProbe>,
        store: Arc<UsageStore>,
        settings: TrackerSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(TrackerState::new());
        Self {
            handle: None,
            cancel_token: None,
            probe,
            store,
            settings,
            state_tx: Arc::new(state_tx),
        }
    }

    /// Spawns the tracking loop on the current runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            bail!("tracking already active");
        }
        if self.handle.take().is_some() {
            warn!("Previous tracking loop ended on its own; starting a new one");
            self.cancel_token = None;
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(tracking_loop(
            Arc::clone(&self.probe),
            Arc::clone(&self.store),
            self.settings.clone(),
            cancel_token.clone(),
            Arc::clone(&self.state_tx),
        ));

        info!("Tracking started, saving to {}", self.store.describe());
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancels the loop and waits for it to save the open session.
    /// Does nothing if tracking was never started.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("tracking loop task failed to join")?;
            info!("Tracking stopped");
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn snapshot(&self) -> TrackerState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackerState> {
        self.state_tx.subscribe()
    }

    pub fn store(&self) -> &Arc<UsageStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensing::probe::tests::{HangingProbe, ScriptedProbe};
    use crate::sensing::{ProbeError, WindowSample};
    use crate::storage::MemoryBlobStore;
    use crate::tracker::TrackerStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Takes longer than a poll interval and records how many calls overlap.
    #[derive(Default)]
    struct SlowSampler {
        in_flight: AtomicUsize,
        max_in_flight: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl WindowProbe for SlowSampler {
        fn name(&self) -> &str {
            "slow"
        }

        async fn probe(&self) -> Result<Option<WindowSample>, ProbeError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(75)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Some(WindowSample::new("code", "", "")))
        }
    }

    /// Answers once, then never returns.
    #[derive(Default)]
    struct StallingSampler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl WindowProbe for StallingSampler {
        fn name(&self) -> &str {
            "stalling"
        }

        async fn probe(&self) -> Result<Option<WindowSample>, ProbeError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(Some(WindowSample::new("code", "main.rs", "/usr/bin/code")));
            }
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }
    }

    /// Panics on the first call, then behaves.
    #[derive(Default)]
    struct CrashOnceSampler {
        crashed: AtomicBool,
    }

    #[async_trait]
    impl WindowProbe for CrashOnceSampler {
        fn name(&self) -> &str {
            "crash-once"
        }

        async fn probe(&self) -> Result<Option<WindowSample>, ProbeError> {
            if !self.crashed.swap(true, Ordering::SeqCst) {
                panic!("window backend crashed");
            }
            Ok(Some(WindowSample::new("code", "", "")))
        }
    }

    fn fast_settings() -> TrackerSettings {
        TrackerSettings {
            poll_interval_ms: 20,
            min_session_ms: 0,
            ..TrackerSettings::default()
        }
    }

    fn controller(probe: Arc<dyn WindowProbe>) -> TrackerController {
        let store = Arc::new(UsageStore::open(Box::new(MemoryBlobStore::new())));
        TrackerController::new(probe, store, fast_settings())
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let mut tracker = controller(Arc::new(ScriptedProbe::new(vec![Some("code")])));

        tracker.start().unwrap();
        let err = tracker.start().unwrap_err();
        assert!(err.to_string().contains("already active"));

        tracker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let mut tracker = controller(Arc::new(ScriptedProbe::new(vec![Some("code")])));

        tracker.stop().await.unwrap();
        assert!(!tracker.is_running());
        assert!(tracker.store().is_empty());
    }

    #[tokio::test]
    async fn each_stop_flushes_the_open_session_once() {
        let mut tracker = controller(Arc::new(ScriptedProbe::new(vec![Some("code")])));

        tracker.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(tracker.snapshot().current_app.as_deref(), Some("code"));
        tracker.stop().await.unwrap();
        assert_eq!(tracker.store().len(), 1);

        // Stopping again must not emit anything new.
        tracker.stop().await.unwrap();
        assert_eq!(tracker.store().len(), 1);

        tracker.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        tracker.stop().await.unwrap();

        let sessions = tracker.store().load_all();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().all(|s| s.app_name == "code" && s.duration > 0));
        assert_eq!(tracker.snapshot().status(), TrackerStatus::Idle);
    }

    #[tokio::test]
    async fn switches_are_published_to_subscribers() {
        let mut tracker = controller(Arc::new(ScriptedProbe::new(vec![
            Some("code"),
            Some("code"),
            Some("mail"),
        ])));
        let mut updates = tracker.subscribe();

        tracker.start().unwrap();
        tokio::time::timeout(
            Duration::from_secs(2),
            updates.wait_for(|state| state.current_app.as_deref() == Some("mail")),
        )
        .await
        .expect("switch to mail was never published")
        .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        tracker.stop().await.unwrap();

        let apps: Vec<_> = tracker
            .store()
            .load_all()
            .into_iter()
            .map(|s| s.app_name)
            .collect();
        assert_eq!(apps, vec!["code", "mail"]);
    }

    #[tokio::test]
    async fn stop_interrupts_a_hanging_probe() {
        let mut tracker = controller(Arc::new(HangingProbe));

        tracker.start().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(1), tracker.stop())
            .await
            .expect("stop waited on the probe")
            .unwrap();
        assert!(tracker.store().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_sampler_never_overlaps_itself() {
        let sampler = SlowSampler::default();
        let max_in_flight = Arc::clone(&sampler.max_in_flight);
        let calls = Arc::clone(&sampler.calls);
        let mut tracker = controller(Arc::new(sampler));

        tracker.start().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        tracker.stop().await.unwrap();

        assert!(calls.load(Ordering::SeqCst) >= 5);
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_ticks_keep_the_open_session() {
        let sampler = StallingSampler::default();
        let calls = Arc::clone(&sampler.calls);
        let store = Arc::new(UsageStore::open(Box::new(MemoryBlobStore::new())));
        let settings = TrackerSettings {
            tick_timeout_ms: 100,
            ..fast_settings()
        };
        let mut tracker = TrackerController::new(Arc::new(sampler), Arc::clone(&store), settings);

        tracker.start().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Several ticks have timed out without touching the session.
        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert_eq!(tracker.snapshot().current_app.as_deref(), Some("code"));
        assert!(store.is_empty());

        // Session timestamps come from the wall clock, which paused time does not move.
        std::thread::sleep(Duration::from_millis(5));
        tracker.stop().await.unwrap();
        tracker.stop().await.unwrap();

        let sessions = store.load_all();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].app_name, "code");
        assert_eq!(sessions[0].window_title, "main.rs");
    }

    #[tokio::test]
    async fn restarts_after_the_loop_dies_on_its_own() {
        let mut tracker = controller(Arc::new(CrashOnceSampler::default()));

        tracker.start().unwrap();
        for _ in 0..100 {
            if !tracker.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!tracker.is_running());

        tracker.start().unwrap();
        assert!(tracker.is_running());
        tokio::time::sleep(Duration::from_millis(60)).await;
        tracker.stop().await.unwrap();

        assert_eq!(tracker.store().len(), 1);
    }
}
