//! Application Layer
//!
//! This module contains:
//! - Orchestrator: single-flight request lifecycle around one transport call
//! - Validate: settings validation and payload file resolution
//! - Display: the display collaborator seam and title/image helpers
//! - Guard: the single-flight permit
//! - Metrics: Prometheus counters for dispatches and traffic

pub mod display;
mod guard;
pub mod metrics;
mod orchestrator;
pub mod validate;

pub use display::{compose_title, image_data_url, ConsoleDisplay, DisplaySink, LogEvent, SideEffect};
pub use guard::{FlightPermit, SingleFlight};
pub use orchestrator::{Orchestrator, Phase, Timings};
