//! Position reconciliation.
//!
//! The analysis service reports errors with a context snippet and a claimed
//! position, and neither can be trusted: positions drift, contexts get
//! paraphrased, the same snippet can occur in several places. This pass
//! re-derives every position from the text itself and drops candidates that
//! cannot be verified, so downstream consumers can highlight spans without
//! re-checking anything.

use shared_types::{RawCandidate, ValidatedError};
use tracing::warn;

/// Why a candidate was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The claimed context does not occur in the text.
    ContextNotFound,
    /// The flagged substring does not occur inside its own context.
    OriginalNotInContext,
    /// No verifiable span was left: every placement overlaps an already
    /// validated error, or the selected slice failed re-verification.
    PositionMismatch,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::ContextNotFound => "context_not_found",
            DropReason::OriginalNotInContext => "original_not_in_context",
            DropReason::PositionMismatch => "position_mismatch",
        }
    }
}

/// Per-reason drop counters for one reconciliation pass. Diagnostic only;
/// drops are never reported to API callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropTally {
    pub context_not_found: u32,
    pub original_not_in_context: u32,
    pub position_mismatch: u32,
}

impl DropTally {
    fn record(&mut self, reason: DropReason) {
        match reason {
            DropReason::ContextNotFound => self.context_not_found += 1,
            DropReason::OriginalNotInContext => self.original_not_in_context += 1,
            DropReason::PositionMismatch => self.position_mismatch += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.context_not_found + self.original_not_in_context + self.position_mismatch
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Candidates that survived, in ascending position order.
    pub errors: Vec<ValidatedError>,
    pub drops: DropTally,
}

/// Anchor each candidate to a verified byte offset in `text`.
///
/// Candidates are processed in the order the analysis service returned
/// them. Each validated error claims its span, and later candidates cannot
/// land on a claimed span, so two results never overlap. The output is
/// sorted by position; candidates that cannot be verified are dropped and
/// counted, never guessed at.
pub fn reconcile(text: &str, candidates: Vec<RawCandidate>) -> Reconciliation {
    let mut errors: Vec<ValidatedError> = Vec::new();
    let mut drops = DropTally::default();
    // Spans claimed by earlier candidates in this pass, as (start, end).
    let mut consumed: Vec<(usize, usize)> = Vec::new();

    for candidate in candidates {
        match resolve(text, &candidate, &consumed) {
            Ok(position) => {
                consumed.push((position, position + candidate.text_original.len()));
                errors.push(ValidatedError {
                    text_original: candidate.text_original,
                    text_corrected: candidate.text_corrected,
                    category: candidate.category,
                    position,
                    description: candidate.description,
                    context: candidate.context,
                });
            }
            Err(reason) => {
                warn!(
                    "dropped candidate {:?} ({})",
                    candidate.text_original,
                    reason.as_str()
                );
                drops.record(reason);
            }
        }
    }

    // Document order. The sort is stable, so equal positions keep the
    // order the candidates arrived in.
    errors.sort_by_key(|e| e.position);

    Reconciliation { errors, drops }
}

/// Resolve one candidate to a byte offset, or say why it cannot be placed.
fn resolve(
    text: &str,
    candidate: &RawCandidate,
    consumed: &[(usize, usize)],
) -> Result<usize, DropReason> {
    let context = candidate.context.as_str();
    let original = candidate.text_original.as_str();

    // An empty context would match everywhere and anchor nothing.
    if context.is_empty() {
        return Err(DropReason::ContextNotFound);
    }
    let context_starts = find_occurrences(text, context);
    if context_starts.is_empty() {
        return Err(DropReason::ContextNotFound);
    }

    // Byte-exact match of the flagged substring inside its own context;
    // matching is case-sensitive throughout.
    if original.is_empty() {
        return Err(DropReason::OriginalNotInContext);
    }
    let offset_in_context = match context.find(original) {
        Some(offset) => offset,
        None => return Err(DropReason::OriginalNotInContext),
    };

    let len = original.len();
    let open: Vec<usize> = context_starts
        .iter()
        .map(|start| start + offset_in_context)
        .filter(|&pos| !overlaps(consumed, pos, pos + len))
        .collect();

    let position = select(&open, candidate.reported_position).ok_or(DropReason::PositionMismatch)?;

    // Re-slice and compare before accepting. `get` also rejects slices that
    // run past the end or split a character.
    match text.get(position..position + len) {
        Some(slice) if slice == original => Ok(position),
        _ => Err(DropReason::PositionMismatch),
    }
}

/// Starting byte offsets of every occurrence of `needle` in `haystack`,
/// overlapping occurrences included. `needle` must be non-empty.
fn find_occurrences(haystack: &str, needle: &str) -> Vec<usize> {
    // Each occurrence starts with the same character, so stepping by its
    // width always lands on a boundary.
    let step = needle.chars().next().map_or(1, char::len_utf8);
    let mut starts = Vec::new();
    let mut from = 0;
    while let Some(found) = haystack[from..].find(needle) {
        let pos = from + found;
        starts.push(pos);
        from = pos + step;
    }
    starts
}

/// Whether the half-open span `[start, end)` intersects any claimed span.
fn overlaps(consumed: &[(usize, usize)], start: usize, end: usize) -> bool {
    consumed.iter().any(|&(s, e)| start < e && s < end)
}

/// Pick between open placements: nearest to the reported position when one
/// was given, earliest in the document otherwise. Distance ties also break
/// toward the earlier placement.
fn select(open: &[usize], reported: Option<usize>) -> Option<usize> {
    match reported {
        Some(hint) => open.iter().copied().min_by_key(|pos| (pos.abs_diff(hint), *pos)),
        None => open.iter().copied().min(),
    }
}
