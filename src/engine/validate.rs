use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{has_conflict, validate_span};
use super::BookingError;

/// A booking form as submitted. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub room_id: Option<Ulid>,
    pub start: Option<Ms>,
    pub end: Option<Ms>,
}

/// A request that passed validation and is ready to be stored as pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub room_id: Ulid,
    pub title: String,
    pub description: Option<String>,
    pub span: Span,
}

impl Candidate {
    pub fn into_reservation(self, id: Ulid, requester_id: Ulid, created_at: Ms) -> Reservation {
        Reservation {
            id,
            room_id: self.room_id,
            requester_id,
            title: self.title,
            description: self.description,
            span: self.span,
            status: ReservationStatus::Pending,
            decided_by: None,
            created_at,
        }
    }
}

/// Structural checks, in order: required fields, same local day, start before end.
/// Stops at the first failure.
pub fn check_shape(req: &BookingRequest, calendar: &LocalCalendar) -> Result<Candidate, BookingError> {
    let title = req
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(BookingError::MissingField("title"))?;
    let room_id = req.room_id.ok_or(BookingError::MissingField("room_id"))?;
    let start = req.start.ok_or(BookingError::MissingField("start"))?;
    let end = req.end.ok_or(BookingError::MissingField("end"))?;

    if !calendar.same_day(start, end) {
        return Err(BookingError::CrossDayBooking);
    }
    let span = Span::try_new(start, end).map_err(|_| BookingError::InvalidTimeRange)?;

    validate_span(&span)?;
    if title.len() > MAX_TITLE_LEN {
        return Err(BookingError::LimitExceeded("title too long"));
    }
    let description = req
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);
    if description.as_ref().is_some_and(|d| d.len() > MAX_DESCRIPTION_LEN) {
        return Err(BookingError::LimitExceeded("description too long"));
    }

    Ok(Candidate {
        room_id,
        title: title.to_string(),
        description,
        span,
    })
}

/// Final check: the candidate must not overlap an approved reservation of its room.
pub fn check_availability(candidate: &Candidate, existing_approved: &[Span]) -> Result<(), BookingError> {
    if has_conflict(candidate.room_id, &candidate.span, existing_approved)? {
        return Err(BookingError::SchedulingConflict(candidate.room_id));
    }
    Ok(())
}

/// Full accept/reject decision against a snapshot of the room's approved spans.
pub fn validate_booking(
    req: &BookingRequest,
    calendar: &LocalCalendar,
    existing_approved: &[Span],
) -> Result<Candidate, BookingError> {
    let candidate = check_shape(req, calendar)?;
    check_availability(&candidate, existing_approved)?;
    Ok(candidate)
}

/// Room create/edit form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomForm {
    pub name: String,
    pub location: Option<String>,
    pub capacity: u32,
    /// Comma-separated, e.g. `"projector, whiteboard"`.
    pub equipment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomFields {
    pub name: String,
    pub location: Option<String>,
    pub capacity: u32,
    pub equipment: Vec<String>,
}

pub fn check_room_form(form: &RoomForm) -> Result<RoomFields, BookingError> {
    let name = form.name.trim();
    if name.is_empty() {
        return Err(BookingError::MissingField("name"));
    }
    if name.len() > MAX_ROOM_NAME_LEN {
        return Err(BookingError::LimitExceeded("room name too long"));
    }
    if form.capacity == 0 || form.capacity > MAX_ROOM_CAPACITY {
        return Err(BookingError::LimitExceeded("room capacity out of range"));
    }
    let location = form
        .location
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string);
    if location.as_ref().is_some_and(|l| l.len() > MAX_LOCATION_LEN) {
        return Err(BookingError::LimitExceeded("location too long"));
    }
    let equipment = parse_equipment(&form.equipment);
    if equipment.len() > MAX_EQUIPMENT_ITEMS {
        return Err(BookingError::LimitExceeded("too many equipment items"));
    }
    Ok(RoomFields {
        name: name.to_string(),
        location,
        capacity: form.capacity,
        equipment,
    })
}

fn parse_equipment(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}
