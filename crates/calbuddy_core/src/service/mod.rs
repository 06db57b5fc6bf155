//! Core use-case services.
//!
//! # Responsibility
//! - Expose read-side use cases over repository contracts.
//! - Keep CLI layers decoupled from storage details.

pub mod query_service;
