//! Backend availability probing.
//!
//! # Invariants
//! - A probe runs at most once per [`Availability`]; every caller, including
//!   callers racing the first probe, observes the same answer.
//! - Probing never fails outward. Errors, panics and timeouts all collapse
//!   to "unavailable".

use std::fmt;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("'{0}' not found on PATH")]
    NotFound(String),

    #[error("'{tool}' exited with {status}")]
    Failed { tool: String, status: std::process::ExitStatus },

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Checks whether an optional backend can be used.
///
/// Implementations may block (spawn a process, load a library); the caller
/// bounds them with a timeout.
pub trait CapabilityProbe: Send + Sync {
    fn probe(&self) -> Result<(), ProbeError>;
}

impl<F> CapabilityProbe for F
where
    F: Fn() -> Result<(), ProbeError> + Send + Sync,
{
    fn probe(&self) -> Result<(), ProbeError> {
        self()
    }
}

/// Helper executable that must be on `PATH` and answer a version query.
#[derive(Clone, Debug)]
pub struct ExternalToolProbe {
    tool: String,
    args: Vec<String>,
}

impl ExternalToolProbe {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            args: vec!["--version".to_owned()],
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }
}

impl CapabilityProbe for ExternalToolProbe {
    fn probe(&self) -> Result<(), ProbeError> {
        let path = which::which(&self.tool).map_err(|_| ProbeError::NotFound(self.tool.clone()))?;
        let status = Command::new(path)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(ProbeError::Failed {
                tool: self.tool.clone(),
                status,
            })
        }
    }
}

/// Memoized availability of one direction of a codec.
pub struct Availability {
    source: Source,
    cell: OnceCell<bool>,
}

enum Source {
    Fixed(bool),
    Probe {
        probe: Arc<dyn CapabilityProbe>,
        timeout: Duration,
        label: String,
    },
}

impl Availability {
    /// Known at compile time; no probing.
    pub fn fixed(available: bool) -> Self {
        Self {
            source: Source::Fixed(available),
            cell: OnceCell::with_value(available),
        }
    }

    pub fn probed(
        label: impl Into<String>,
        probe: Arc<dyn CapabilityProbe>,
        timeout: Duration,
    ) -> Self {
        Self {
            source: Source::Probe {
                probe,
                timeout,
                label: label.into(),
            },
            cell: OnceCell::new(),
        }
    }

    /// Runs the probe on first call; later calls read the cached outcome.
    pub fn get(&self) -> bool {
        *self.cell.get_or_init(|| match &self.source {
            Source::Fixed(available) => *available,
            Source::Probe {
                probe,
                timeout,
                label,
            } => run_bounded(label, Arc::clone(probe), *timeout),
        })
    }

    /// Cached outcome without triggering a probe.
    pub fn peek(&self) -> Option<bool> {
        self.cell.get().copied()
    }
}

impl fmt::Debug for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Source::Fixed(_) => "fixed",
            Source::Probe { .. } => "probe",
        };
        f.debug_struct("Availability")
            .field("source", &source)
            .field("cached", &self.peek())
            .finish()
    }
}

fn run_bounded(label: &str, probe: Arc<dyn CapabilityProbe>, timeout: Duration) -> bool {
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name(format!("probe-{label}"))
        .spawn(move || {
            let _ = tx.send(probe.probe());
        });
    if let Err(e) = spawned {
        warn!(backend = label, error = %e, "could not start availability probe");
        return false;
    }

    match rx.recv_timeout(timeout) {
        Ok(Ok(())) => {
            debug!(backend = label, "backend available");
            true
        }
        Ok(Err(e)) => {
            debug!(backend = label, error = %e, "backend unavailable");
            false
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!(backend = label, ?timeout, "availability probe timed out");
            false
        }
        Err(RecvTimeoutError::Disconnected) => {
            warn!(backend = label, "availability probe panicked");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn fixed_is_cached_up_front() {
        let availability = Availability::fixed(true);
        assert_eq!(availability.peek(), Some(true));
        assert!(availability.get());
    }

    #[test]
    fn failing_probe_reports_unavailable() {
        let probe: Arc<dyn CapabilityProbe> = Arc::new(|| -> Result<(), ProbeError> {
            Err(ProbeError::Other("missing".into()))
        });
        let availability = Availability::probed("failing", probe, DEFAULT_PROBE_TIMEOUT);
        assert_eq!(availability.peek(), None);
        assert!(!availability.get());
        assert_eq!(availability.peek(), Some(false));
    }

    #[test]
    fn panicking_probe_reports_unavailable() {
        let probe: Arc<dyn CapabilityProbe> = Arc::new(|| -> Result<(), ProbeError> {
            panic!("backend exploded")
        });
        let availability = Availability::probed("panicking", probe, DEFAULT_PROBE_TIMEOUT);
        assert!(!availability.get());
    }

    #[test]
    fn slow_probe_times_out_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let probe: Arc<dyn CapabilityProbe> = Arc::new(move || -> Result<(), ProbeError> {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(500));
            Ok(())
        });
        let availability = Availability::probed("slow", probe, Duration::from_millis(20));
        assert!(!availability.get());
        assert!(!availability.get());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_tool_is_unavailable() {
        let probe = ExternalToolProbe::new("arcodec-definitely-not-installed");
        assert!(matches!(probe.probe(), Err(ProbeError::NotFound(_))));
    }
}
