//! Screen Session Recorder - session-aware screen activity capture for research.
//!
//! Watches keyboard, mouse and scroll activity, groups it into interaction
//! sessions, takes a screenshot of the selected windows or screens before and
//! after every session, and writes everything to one ordered observation log.
//!
//! # Privacy Guarantees
//!
//! - **No key content**: keyboard sessions record timing and counts only
//! - **No coordinates**: clicks and scrolls carry kind and magnitude, not position
//! - **Scoped screenshots**: only the windows or screens chosen before the run
//! - **Transparency**: every run's collection counts are logged and auditable
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    Screen Session Recorder                     │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────────┐     │
//! │  │  Collector  │──▶│  Segmenter  │──▶│  Screen Observer │──┐  │
//! │  │   (input)   │   │ (sessions)  │   │ (before / after) │  │  │
//! │  └─────────────┘   └─────────────┘   └──────────────────┘  │  │
//! │                                                            ▼  │
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────────┐     │
//! │  │   Upload    │◀──│ Observation │◀──│    Aggregator    │     │
//! │  │ (optional)  │   │     Log     │   │  (single writer) │     │
//! │  └─────────────┘   └─────────────┘   └──────────────────┘     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use screen_session_recorder::{
//!     capture::{PlatformCapturer, SelectionScope},
//!     collector::{Collector, CollectorConfig},
//!     observer::{ScreenObserver, ScreenObserverSettings},
//!     storage::JsonlStore,
//!     Aggregator, Config, RunContext,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let ctx = RunContext::new(config, SelectionScope::AllScreens)?;
//! let store = JsonlStore::open(ctx.config.observation_log_path()).await?;
//!
//! let observer = ScreenObserver::new(
//!     &ctx,
//!     ScreenObserverSettings::from_config(&ctx.config),
//!     Box::new(Collector::new(CollectorConfig::default())),
//!     Arc::new(PlatformCapturer::new()),
//! )?;
//!
//! let mut aggregator = Aggregator::new(ctx, Box::new(store));
//! aggregator.register(Box::new(observer))?;
//! let summary = aggregator.run().await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod capture;
pub mod collector;
pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod observer;
pub mod storage;
pub mod transparency;
pub mod upload;

pub use aggregator::{Aggregator, RunSummary, StopHandle};
pub use capture::{ScreenCapturer, SelectionScope};
pub use collector::{Collector, CollectorConfig, CollectorError, InputSource, SensorEvent};
pub use config::{Config, SourceConfig};
pub use context::RunContext;
pub use error::RecorderError;
pub use observer::{Observer, StopReason, Update, UpdateKind};
pub use storage::{Observation, ObservationStore, StorageError};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Consent declaration shown before recording starts.
pub const CONSENT_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║          SCREEN SESSION RECORDER - CONSENT DECLARATION           ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This recorder captures screen activity for research.            ║
║                                                                  ║
║  ✓ WHAT WE CAPTURE:                                              ║
║    • Screenshots of the windows or screens you selected,         ║
║      taken before and after each burst of activity               ║
║    • When typing and mouse activity starts and stops             ║
║    • That a click or scroll happened (and scroll direction)      ║
║                                                                  ║
║  ✗ WHAT WE NEVER CAPTURE:                                        ║
║    • Which keys you press (no passwords, messages, etc.)         ║
║    • Where your cursor is                                        ║
║    • Windows or screens outside your selection                   ║
║                                                                  ║
║  Recording stops on Ctrl+C, after 45 idle minutes by default,    ║
║  or when every selected window has been closed.                  ║
║                                                                  ║
║  You can view collection statistics anytime with:                ║
║    session-recorder status                                       ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
