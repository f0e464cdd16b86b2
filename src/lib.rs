//! Janus Cast - single-flight TCP/UDP payload dispatcher
//!
//! # Architecture
//!
//! ```text
//! DispatchSettings
//! → Orchestrator (single-flight guard, validation, progress/liveness timers)
//! → Transport (StreamDispatcher / DatagramDispatcher)
//! → DispatchOutcome
//! → DisplaySink + LogStore
//! ```
//!
//! ## Core Principles
//!
//! - One request in flight at a time, later ones refused
//! - Every timer is an owned handle, cancelled when its owner ends
//! - Exactly one outcome per request
//! - Display and log failures never change an outcome
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── common/          # Core types: Address, DispatchRequest, DispatchOutcome, TimerSet
//! ├── transport/       # Transport layer: TCP, UDP
//! ├── logstore/        # Bounded request log rendered to HTML
//! └── app/             # Application: Orchestrator, validation, display, metrics
//! ```

// Core types
pub mod common;
pub mod error;

// Layers
pub mod transport;
pub mod logstore;
pub mod app;

// Supporting modules
pub mod config;

// Re-exports for convenience
pub use common::{Address, DispatchOutcome, DispatchRequest, TimerSet, TransportKind};
pub use error::{Error, Result};
pub use config::{Config, DispatchSettings};

// Architecture re-exports
pub use app::{DisplaySink, Orchestrator};
pub use logstore::LogStore;
pub use transport::Transport;
