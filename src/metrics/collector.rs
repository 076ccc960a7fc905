//! Metrics collection and registry.

use crate::session::SessionState;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Metric creation or registration failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    /// Encoder produced invalid text.
    #[error("metrics output is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Prometheus registry for one camera session.
#[derive(Clone)]
pub struct SessionMetrics {
    registry: Registry,

    // Lifecycle
    state: IntGauge,
    opens_total: IntCounter,
    open_failures_total: IntCounter,
    lock_timeouts_total: IntCounter,
    device_errors_total: IntCounter,
    degraded_sizes_total: IntCounter,

    // Capture
    captures_total: IntCounter,
    captures_rejected_total: IntCounter,
    images_saved_total: IntCounter,
    image_bytes_total: IntCounter,
    persist_failures_total: IntCounter,
}

impl SessionMetrics {
    /// Creates a registry with all session metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let state = IntGauge::new("camera_session_state", "Current session state code")?;
        let opens_total = IntCounter::new(
            "camera_session_opens_total",
            "Open attempts handed to the hardware",
        )?;
        let open_failures_total = IntCounter::new(
            "camera_session_open_failures_total",
            "Open attempts that failed",
        )?;
        let lock_timeouts_total = IntCounter::new(
            "camera_session_lock_timeouts_total",
            "Device lock waits that timed out",
        )?;
        let device_errors_total = IntCounter::new(
            "camera_session_device_errors_total",
            "Device errors and disconnects",
        )?;
        let degraded_sizes_total = IntCounter::new(
            "camera_session_degraded_sizes_total",
            "Preview sizes chosen by fallback",
        )?;

        let captures_total =
            IntCounter::new("camera_session_captures_total", "Still captures started")?;
        let captures_rejected_total = IntCounter::new(
            "camera_session_captures_rejected_total",
            "Still captures rejected by session state",
        )?;
        let images_saved_total = IntCounter::new(
            "camera_session_images_saved_total",
            "Stills written to storage",
        )?;
        let image_bytes_total = IntCounter::new(
            "camera_session_image_bytes_total",
            "Bytes of stills written to storage",
        )?;
        let persist_failures_total = IntCounter::new(
            "camera_session_persist_failures_total",
            "Stills that failed to write",
        )?;

        registry.register(Box::new(state.clone()))?;
        registry.register(Box::new(opens_total.clone()))?;
        registry.register(Box::new(open_failures_total.clone()))?;
        registry.register(Box::new(lock_timeouts_total.clone()))?;
        registry.register(Box::new(device_errors_total.clone()))?;
        registry.register(Box::new(degraded_sizes_total.clone()))?;
        registry.register(Box::new(captures_total.clone()))?;
        registry.register(Box::new(captures_rejected_total.clone()))?;
        registry.register(Box::new(images_saved_total.clone()))?;
        registry.register(Box::new(image_bytes_total.clone()))?;
        registry.register(Box::new(persist_failures_total.clone()))?;

        Ok(Self {
            registry,
            state,
            opens_total,
            open_failures_total,
            lock_timeouts_total,
            device_errors_total,
            degraded_sizes_total,
            captures_total,
            captures_rejected_total,
            images_saved_total,
            image_bytes_total,
            persist_failures_total,
        })
    }

    /// Publishes the current state as its numeric code.
    pub fn set_state(&self, state: SessionState) {
        self.state.set(state.code());
    }

    /// Counts an open accepted by the hardware.
    pub fn record_open(&self) {
        self.opens_total.inc();
    }

    /// Counts an open that failed before or at the hardware.
    pub fn record_open_failure(&self) {
        self.open_failures_total.inc();
    }

    /// Counts a device lock wait that ran out.
    pub fn record_lock_timeout(&self) {
        self.lock_timeouts_total.inc();
    }

    /// Counts a device error or disconnect callback.
    pub fn record_device_error(&self) {
        self.device_errors_total.inc();
    }

    /// Counts a size negotiation that fell back to the largest candidate.
    pub fn record_degraded_size(&self) {
        self.degraded_sizes_total.inc();
    }

    /// Counts a capture submitted to the hardware.
    pub fn record_capture(&self) {
        self.captures_total.inc();
    }

    /// Counts a capture refused by state.
    pub fn record_capture_rejected(&self) {
        self.captures_rejected_total.inc();
    }

    /// Counts a saved image and its size.
    pub fn record_image_saved(&self, bytes: usize) {
        self.images_saved_total.inc();
        self.image_bytes_total.inc_by(bytes as u64);
    }

    pub fn record_persist_failure(&self) {
        self.persist_failures_total.inc();
    }

    /// Returns the underlying registry, e.g. to serve it from an exporter.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn render(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl std::fmt::Debug for SessionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMetrics")
            .field("state", &self.state.get())
            .field("opens_total", &self.opens_total.get())
            .field("captures_total", &self.captures_total.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let metrics = SessionMetrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_render_reflects_updates() {
        let metrics = SessionMetrics::new().unwrap();
        metrics.set_state(SessionState::PreviewActive);
        metrics.record_image_saved(1024);
        metrics.record_image_saved(1024);

        let output = metrics.render().unwrap();
        assert!(output.contains("camera_session_state 4"));
        assert!(output.contains("camera_session_images_saved_total 2"));
        assert!(output.contains("camera_session_image_bytes_total 2048"));
    }
}
