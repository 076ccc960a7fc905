//! Camera Session Library
//!
//! Exclusive, asynchronous management of a camera device: ownership
//! arbitration, stream size negotiation, a preview/capture state machine
//! and persistence of captured stills.
//!
//! # Architecture
//!
//! ```text
//! CameraController ──▶ CameraSession ──(DeviceLock)──▶ Worker ──▶ SessionStateMachine
//!                                                        ▲              │
//!                                      HardwareEvent ────┘              ├─▶ SizeNegotiation
//!                                      (EventSink)                      └─▶ ImagePersister
//! ```
//!
//! Every device call and every hardware callback runs on one worker thread,
//! in order. The foreground only posts commands and reads the published
//! [`SessionStatus`].
//!
//! # Design Principles
//!
//! - **One owner**: device, session and reader handles live in the state
//!   machine and are released exactly once
//! - **Bounded waits**: open and close give up after configured timeouts
//! - **Stale callbacks are harmless**: results for a superseded open are
//!   released on arrival, never applied
//! - **Failures are surfaced**: errors reach the caller or a [`SessionNotice`],
//!   nothing is retried silently
//!
//! # Example
//!
//! ```no_run
//! use camera_session::{
//!     config::{SessionConfig, StorageConfig},
//!     device::{MockHal, SurfaceId},
//!     host::{headless::{FixedDisplay, OffscreenSurface, RecordingNotifier}, FsStorage},
//!     CameraSession, SessionDeps, SessionNotice, SessionState, Size,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let deps = SessionDeps {
//!     hal: Arc::new(MockHal::new()),
//!     display: Arc::new(FixedDisplay::new(Size::new(1080, 1920))),
//!     surface: Arc::new(OffscreenSurface::new(SurfaceId(1), Size::new(640, 480))),
//!     storage: Arc::new(FsStorage),
//!     media: Arc::new(RecordingNotifier::new()),
//! };
//! let mut session =
//!     CameraSession::new(SessionConfig::default(), StorageConfig::default(), deps).unwrap();
//! let notices = session.subscribe();
//!
//! session.open(Size::new(640, 480)).unwrap();
//! session.wait_for_state(SessionState::PreviewActive, Duration::from_secs(2));
//! session.capture().unwrap();
//!
//! while let Ok(notice) = notices.recv_timeout(Duration::from_secs(2)) {
//!     if let SessionNotice::ImageSaved { path, .. } = notice {
//!         println!("saved {}", path.display());
//!         break;
//!     }
//! }
//! session.close().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod host;
pub mod metrics;
pub mod persist;
pub mod session;
pub mod sizing;
pub mod sync;
pub mod transform;

// Re-export commonly used types at crate root
pub use config::{FileConfig, SessionConfig, StorageConfig};
pub use controller::{CameraController, REQUEST_CAMERA_PERMISSION};
pub use error::SessionError;
pub use session::{CameraSession, SessionDeps, SessionNotice, SessionState, StreamConfig};
pub use sizing::{choose_optimal_size, Size, StillSizePolicy};
pub use sync::{DeviceLock, OwnershipToken};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
