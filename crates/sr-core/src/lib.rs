//! # sr-core
//!
//! Foundational types shared by every security realm crate.
//!
//! - [`Error`] is the taxonomy every mechanism, searcher and the
//!   configuration protocol report through.
//! - [`event`] carries structured security audit events emitted via `tracing`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event;

pub use error::{Error, Result};
pub use event::{EventOutcome, EventType, SecurityEvent};
