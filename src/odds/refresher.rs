//! Refresh guard: at most one fetch in flight, each bounded by a timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::OddsSource;
use crate::types::{DeskError, OddsSnapshot};

pub struct Refresher {
    source: Arc<dyn OddsSource>,
    timeout: Duration,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag however the fetch ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Refresher {
    pub fn new(source: Arc<dyn OddsSource>, timeout: Duration) -> Self {
        Self {
            source,
            timeout,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Fetch a fresh snapshot. A call made while another is still running
    /// fails immediately with `RefreshInFlight` instead of queueing.
    pub async fn refresh(&self) -> Result<OddsSnapshot, DeskError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(DeskError::RefreshInFlight);
        }
        let _guard = InFlight(&self.in_flight);

        debug!(source = self.source.name(), "Refreshing odds");
        match tokio::time::timeout(self.timeout, self.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(DeskError::FetchTimeout {
                secs: self.timeout.as_secs(),
            }),
        }
    }
}
