use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{
    models::UsageSession,
    sensing::{ProbeError, WindowProbe, WindowSample},
    settings::TrackerSettings,
    storage::UsageStore,
    utils::format_duration,
};

use super::state::{TickOutcome, TrackerState};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

// Import the logging macros (exported at crate root)
use crate::{log_debug, log_error, log_info, log_warn};

/// Polls the foreground window until `cancel_token` fires.
///
/// The open session is closed and saved exactly once on the way out. Every
/// state change is published on `state_tx`.
pub async fn tracking_loop(
    probe: Arc<dyn WindowProbe>,
    store: Arc<UsageStore>,
    settings: TrackerSettings,
    cancel_token: CancellationToken,
    state_tx: Arc<watch::Sender<TrackerState>>,
) {
    let mut ticker = tokio::time::interval(settings.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut state = TrackerState::new();

    log_info!(
        "tracking started (poll every {}ms, min session {}ms)",
        settings.poll_interval_ms,
        settings.min_session_ms
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                let sample = tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => break,
                    sample = sample_window(probe.as_ref(), &settings) => sample,
                };

                let outcome = state.observe(sample.as_ref(), Utc::now(), settings.min_session_ms);
                match outcome {
                    TickOutcome::NoSample => {}
                    TickOutcome::StillUsing { app_name, elapsed_ms } => {
                        log_debug!("still using {app_name} ({elapsed_ms}ms)");
                    }
                    TickOutcome::Switched { from, to, closed } => {
                        log_debug!("focus moved from {} to {to}", from.as_deref().unwrap_or("<none>"));
                        if let Some(session) = closed {
                            save_session(&store, session).await;
                        }
                        state_tx.send_replace(state.clone());
                    }
                }
            }
        }
    }

    if let Some(session) = state.close(Utc::now(), settings.min_session_ms) {
        save_session(&store, session).await;
    }
    state_tx.send_replace(state);
    log_info!("tracking loop shutting down");
}

/// One probe, bounded by the tick budget. Failures count as "no sample".
async fn sample_window(probe: &dyn WindowProbe, settings: &TrackerSettings) -> Option<WindowSample> {
    match tokio::time::timeout(settings.tick_timeout(), probe.probe()).await {
        Ok(Ok(sample)) => sample,
        Ok(Err(ProbeError::Unavailable)) => {
            log_debug!("no window probe could answer this tick");
            None
        }
        Ok(Err(err)) => {
            log_warn!("window probe failed: {err}");
            None
        }
        Err(_) => {
            log_warn!("window probe timed out (> {}ms)", settings.tick_timeout_ms);
            None
        }
    }
}

async fn save_session(store: &Arc<UsageStore>, session: UsageSession) {
    let store = Arc::clone(store);
    let result = tokio::task::spawn_blocking(move || store.append(session)).await;

    match result {
        Ok(Ok(saved)) => log_info!(
            "Saved session: {} ({})",
            saved.app_name,
            format_duration(saved.duration, false)
        ),
        Ok(Err(err)) => log_error!("failed to save session: {err}"),
        Err(err) => log_error!("session save worker join failed: {err:?}"),
    }
}
