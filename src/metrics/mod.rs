//! Prometheus metrics for session activity.
//!
//! # Metrics Exposed
//!
//! ## Lifecycle
//! - `camera_session_state` - Current session state code (0=closed .. 7=error)
//! - `camera_session_opens_total` - Open attempts handed to the hardware
//! - `camera_session_open_failures_total` - Open attempts that failed
//! - `camera_session_lock_timeouts_total` - Device lock waits that timed out
//! - `camera_session_device_errors_total` - Device errors and disconnects
//! - `camera_session_degraded_sizes_total` - Preview sizes chosen by fallback
//!
//! ## Capture
//! - `camera_session_captures_total` - Still captures started
//! - `camera_session_captures_rejected_total` - Captures rejected by state
//! - `camera_session_images_saved_total` - Stills written to storage
//! - `camera_session_image_bytes_total` - Bytes written to storage
//! - `camera_session_persist_failures_total` - Stills that failed to write
//!
//! # Example
//!
//! ```
//! use camera_session::metrics::SessionMetrics;
//!
//! let metrics = SessionMetrics::new().expect("Failed to create registry");
//! metrics.record_capture();
//! let text = metrics.render().expect("Failed to encode metrics");
//! assert!(text.contains("camera_session_captures_total 1"));
//! ```

mod collector;

pub use collector::{MetricsError, SessionMetrics};
