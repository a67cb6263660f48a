use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::BookingError;
use crate::limits::MAX_UTC_OFFSET_MINUTES;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn try_new(start: Ms, end: Ms) -> Result<Self, BookingError> {
        if start >= end {
            return Err(BookingError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    /// Fields are public, so a span can be built around `try_new`.
    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Touching at a boundary is not an overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        !(self.end <= other.start || self.start >= other.end)
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// The requesting client's local calendar, as a fixed offset from UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalCalendar {
    pub utc_offset_ms: Ms,
}

impl LocalCalendar {
    pub const UTC: LocalCalendar = LocalCalendar { utc_offset_ms: 0 };

    pub fn from_offset_minutes(minutes: i32) -> Result<Self, BookingError> {
        if minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(BookingError::LimitExceeded("utc offset out of range"));
        }
        Ok(Self {
            utc_offset_ms: Ms::from(minutes) * MINUTE_MS,
        })
    }

    /// Local calendar day number (days since 1970-01-01 local).
    /// Saturates at the ends of the `Ms` range; such instants fail the range
    /// checks later anyway.
    pub fn day_of(&self, t: Ms) -> i64 {
        t.saturating_add(self.utc_offset_ms).div_euclid(DAY_MS)
    }

    pub fn same_day(&self, a: Ms, b: Ms) -> bool {
        self.day_of(a) == self.day_of(b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Approved => "approved",
            ReservationStatus::Rejected => "rejected",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Rejected | ReservationStatus::Cancelled)
    }

    /// Only approved reservations take the room away from other requesters.
    pub fn blocks_room(&self) -> bool {
        matches!(self, ReservationStatus::Approved)
    }

    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Pending, Cancelled) | (Approved, Cancelled)
        )
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bookable meeting room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub name: String,
    pub location: Option<String>,
    /// Seats, not concurrent bookings.
    pub capacity: u32,
    pub equipment: Vec<String>,
    pub is_active: bool,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub room_id: Ulid,
    pub requester_id: Ulid,
    pub title: String,
    pub description: Option<String>,
    pub span: Span,
    pub status: ReservationStatus,
    /// Approver who approved or rejected it.
    pub decided_by: Option<Ulid>,
    pub created_at: Ms,
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// All reservations in any status, sorted by `span.start`.
    pub reservations: Vec<Reservation>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            reservations: Vec::new(),
        }
    }

    /// Insert reservation maintaining sort order by span.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn reservation(&self, id: &Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == *id)
    }

    pub fn reservation_mut(&mut self, id: &Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == *id)
    }

    /// Spans of every approved reservation, in start order.
    pub fn approved_spans(&self) -> Vec<Span> {
        self.reservations
            .iter()
            .filter(|r| r.status.blocks_room())
            .map(|r| r.span)
            .collect()
    }

    /// Return only reservations whose span overlaps the query window.
    /// Uses binary search to skip reservations starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        name: String,
        location: Option<String>,
        capacity: u32,
        equipment: Vec<String>,
        created_at: Ms,
    },
    RoomUpdated {
        id: Ulid,
        name: String,
        location: Option<String>,
        capacity: u32,
        equipment: Vec<String>,
    },
    RoomDeactivated {
        id: Ulid,
    },
    ReservationRequested {
        id: Ulid,
        room_id: Ulid,
        requester_id: Ulid,
        title: String,
        description: Option<String>,
        span: Span,
        created_at: Ms,
    },
    ReservationStatusChanged {
        id: Ulid,
        room_id: Ulid,
        status: ReservationStatus,
        decided_by: Option<Ulid>,
    },
}

impl Event {
    pub fn room_id(&self) -> Ulid {
        match self {
            Event::RoomCreated { id, .. }
            | Event::RoomUpdated { id, .. }
            | Event::RoomDeactivated { id } => *id,
            Event::ReservationRequested { room_id, .. }
            | Event::ReservationStatusChanged { room_id, .. } => *room_id,
        }
    }
}
