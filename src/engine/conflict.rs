use ulid::Ulid;

use crate::model::*;

use super::BookingError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

pub(crate) fn validate_span(span: &Span) -> Result<(), BookingError> {
    use crate::limits::*;
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(BookingError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

/// Does `candidate` overlap any of the room's approved reservations?
///
/// `existing_approved` is a snapshot the caller fetched; no ordering is assumed.
/// Linear in the snapshot size, no I/O, no hidden state.
pub fn has_conflict(
    resource_id: Ulid,
    candidate: &Span,
    existing_approved: &[Span],
) -> Result<bool, BookingError> {
    if !candidate.is_valid() {
        return Err(BookingError::InvalidInterval {
            start: candidate.start,
            end: candidate.end,
        });
    }
    match existing_approved.iter().find(|e| candidate.overlaps(e)) {
        Some(hit) => {
            tracing::trace!(
                "candidate [{}, {}) on {resource_id} overlaps approved [{}, {})",
                candidate.start,
                candidate.end,
                hit.start,
                hit.end
            );
            Ok(true)
        }
        None => Ok(false),
    }
}
