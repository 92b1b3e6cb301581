//! # Dual Sonar Core Library
//!
//! This crate drives two HC-SR04 style ultrasonic sensors that share one trigger line.
//! A single pulse on the trigger starts a measurement on both sensors; each sensor
//! answers on its own echo line with a high pulse whose width is the round-trip time
//! of the sound burst. The engine timestamps the echo edges, converts pulse widths to
//! distances and publishes them to a consumer.
//!
//! ## Crate Structure
//!
//! - **`config`**: Figment-based configuration (TOML file plus `DUAL_SONAR_` environment
//!   overrides) for wiring, timing and the simulated backend.
//! - **`control`**: Text control surface (rate strings such as `"5\n"`) and the readout
//!   surface that renders the latest distances.
//! - **`error`**: The `SonarError` enum used across the crate.
//! - **`hardware`**: GPIO and clock traits, plus the mock and simulated backends.
//! - **`logging`**: `tracing-subscriber` initialization.
//! - **`ranging`**: The measurement pipeline: channel state machines, trigger scheduler,
//!   timeout guard, measurement store, consumer and the owning `RangingEngine`.

pub mod config;
pub mod control;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod ranging;

pub use config::SonarConfig;
pub use error::{SonarError, SonarResult};
pub use ranging::{ChannelId, Distance, RangingEngine};
