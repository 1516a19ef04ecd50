//! Core logic of the text review service.
//!
//! Two pure, synchronous passes:
//!
//! 1. [`normalize`] cleans a raw submission into the canonical form that is
//!    sent for analysis and that every reported offset points into.
//! 2. [`reconcile`] takes the untrusted candidates returned by the analysis
//!    service and anchors each one to a verified offset in that same text,
//!    dropping whatever cannot be verified.
//!
//! Nothing here does I/O and no state survives a call, so the HTTP layer can
//! run both passes inline per request.

pub mod normalize;
pub mod reconcile;

pub use normalize::{normalize, NormalizeError};
pub use reconcile::{reconcile, DropReason, DropTally, Reconciliation};
