use tracing::{error, info, warn};

pub(crate) const TARGET: &str = "hydrometric_fetcher";

#[derive(Clone, Default)]
pub(crate) struct Logger {
    station: Option<String>,
    count: Option<usize>,
    duration_ms: Option<u64>,
    error_text: Option<String>,
}

impl Logger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn station(mut self, station: impl Into<String>) -> Self {
        self.station = Some(station.into());
        self
    }

    pub(crate) fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub(crate) fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub(crate) fn error_text(mut self, error_text: impl Into<String>) -> Self {
        self.error_text = Some(error_text.into());
        self
    }

    pub(crate) fn info(&self, event: &'static str, message: &str) {
        info!(
            target: TARGET,
            event,
            station = self.station.as_deref(),
            count = self.count,
            duration_ms = self.duration_ms,
            error_text = self.error_text.as_deref(),
            "{}",
            message
        );
    }

    pub(crate) fn warn(&self, event: &'static str, message: &str) {
        warn!(
            target: TARGET,
            event,
            station = self.station.as_deref(),
            count = self.count,
            duration_ms = self.duration_ms,
            error_text = self.error_text.as_deref(),
            "{}",
            message
        );
    }

    pub(crate) fn error<E: std::fmt::Debug>(&self, event: &'static str, err: &E, message: &str) {
        error!(
            target: TARGET,
            event,
            station = self.station.as_deref(),
            count = self.count,
            duration_ms = self.duration_ms,
            error_text = self.error_text.as_deref(),
            error = ?err,
            "{}",
            message
        );
    }
}
