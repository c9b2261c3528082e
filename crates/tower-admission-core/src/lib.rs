//! Core infrastructure for tower-admission.
//!
//! This crate provides the pieces shared by every admission middleware:
//! - Event system for observability
//! - The unified [`AdmissionError`] taxonomy
//! - [`SourceKey`] derivation for keyed admission state

pub mod error;
pub mod events;
pub mod key;

pub use error::AdmissionError;
pub use events::{AdmissionEvent, EventListener, EventListeners, FnListener};
pub use key::{FnResolver, KeyResolver, SourceKey};
