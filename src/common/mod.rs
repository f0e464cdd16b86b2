//! Common types and abstractions
//!
//! This module defines the core types used throughout the application:
//! - Address: destination host/port
//! - DispatchRequest: one immutable exchange description
//! - DispatchOutcome: the single terminal result of an exchange
//! - TimerSet: owned, countable timer handles
//! - Error: unified error types

mod address;
mod outcome;
mod request;
pub mod timer;

pub use address::Address;
pub use outcome::{Delivery, DispatchOutcome, FailureKind, TextEncoding};
pub use request::{DispatchRequest, TransportKind};
pub use timer::{Deadline, TimerSet, Ticker};

// Re-export error types from crate root
pub use crate::error::{Error, Result};
