use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// What the OS reports as focused at one instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WindowSample {
    pub process_name: String,
    pub window_title: String,
    pub process_path: String,
}

impl WindowSample {
    pub fn new(
        process_name: impl Into<String>,
        window_title: impl Into<String>,
        process_path: impl Into<String>,
    ) -> Self {
        Self {
            process_name: process_name.into(),
            window_title: window_title.into(),
            process_path: process_path.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe '{0}' timed out after {1:?}")]
    Timeout(String, Duration),

    #[error("no foreground window could be determined")]
    Unavailable,

    #[error("probe command '{program}' failed: {message}")]
    Command { program: String, message: String },

    #[error("could not parse output of probe '{probe}': {message}")]
    Parse { probe: String, message: String },
}

/// Capability to ask the OS which window has focus.
///
/// `Ok(None)` means the probe ran but nothing focusable was found.
#[async_trait]
pub trait WindowProbe: Send + Sync {
    fn name(&self) -> &str;

    async fn probe(&self) -> Result<Option<WindowSample>, ProbeError>;
}

/// Ordered fallback list of probes, each attempt bounded by its own timeout.
pub struct ProbeChain {
    probes: Vec<Box<dyn WindowProbe>>,
    attempt_timeout: Duration,
}

impl ProbeChain {
    pub fn new(probes: Vec<Box<dyn WindowProbe>>, attempt_timeout: Duration) -> Self {
        Self {
            probes,
            attempt_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

#[async_trait]
impl WindowProbe for ProbeChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn probe(&self) -> Result<Option<WindowSample>, ProbeError> {
        let mut answered = false;

        for probe in &self.probes {
            match tokio::time::timeout(self.attempt_timeout, probe.probe()).await {
                Ok(Ok(Some(sample))) if !sample.process_name.is_empty() => {
                    log_debug!(
                        "probe '{}' found {} - \"{}\"",
                        probe.name(),
                        sample.process_name,
                        sample.window_title
                    );
                    return Ok(Some(sample));
                }
                Ok(Ok(_)) => {
                    answered = true;
                    log_debug!("probe '{}' found no focused window", probe.name());
                }
                Ok(Err(err)) => log_debug!("probe '{}' failed: {err}", probe.name()),
                Err(_) => log_warn!(
                    "{}",
                    ProbeError::Timeout(probe.name().to_string(), self.attempt_timeout)
                ),
            }
        }

        if answered {
            Ok(None)
        } else {
            Err(ProbeError::Unavailable)
        }
    }
}
