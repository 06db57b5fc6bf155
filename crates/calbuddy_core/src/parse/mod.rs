//! Listing text parsing.
//!
//! # Responsibility
//! - Normalize raw listing lines.
//! - Segment lines into per-event blocks and extract time spans and links.
//!
//! # Invariants
//! - Parsing never fails as a whole; unparseable fragments leave bounds unset.

pub mod datetime;
pub mod link;
pub mod machine;
pub mod normalize;
