use ulid::Ulid;

use crate::model::{Ms, ReservationStatus};

#[derive(Debug)]
pub enum BookingError {
    MissingField(&'static str),
    CrossDayBooking,
    InvalidTimeRange,
    SchedulingConflict(Ulid),
    InvalidInterval {
        start: Ms,
        end: Ms,
    },
    /// The backing store could not be read or written. Nothing was persisted.
    StoreUnavailable(String),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    RoomInactive(Ulid),
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },
    NotOwner(Ulid),
    LimitExceeded(&'static str),
    /// Startup failed outside the store, e.g. the metrics listener.
    Startup(String),
}

impl BookingError {
    /// Stable short label, used as a metrics dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::MissingField(_) => "missing_field",
            BookingError::CrossDayBooking => "cross_day_booking",
            BookingError::InvalidTimeRange => "invalid_time_range",
            BookingError::SchedulingConflict(_) => "scheduling_conflict",
            BookingError::InvalidInterval { .. } => "invalid_interval",
            BookingError::StoreUnavailable(_) => "store_unavailable",
            BookingError::NotFound(_) => "not_found",
            BookingError::AlreadyExists(_) => "already_exists",
            BookingError::RoomInactive(_) => "room_inactive",
            BookingError::InvalidTransition { .. } => "invalid_transition",
            BookingError::NotOwner(_) => "not_owner",
            BookingError::LimitExceeded(_) => "limit_exceeded",
            BookingError::Startup(_) => "startup",
        }
    }

    /// True for outcomes the user fixes by changing the request; false for store failures.
    pub fn is_validation(&self) -> bool {
        !matches!(self, BookingError::StoreUnavailable(_) | BookingError::Startup(_))
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::MissingField(field) => write!(f, "missing required field: {field}"),
            BookingError::CrossDayBooking => {
                write!(f, "booking must start and end on the same day")
            }
            BookingError::InvalidTimeRange => write!(f, "end time must be after start time"),
            BookingError::SchedulingConflict(room) => {
                write!(f, "room {room} is already booked for the selected time")
            }
            BookingError::InvalidInterval { start, end } => {
                write!(f, "invalid interval [{start}, {end}): start must be before end")
            }
            BookingError::StoreUnavailable(e) => write!(f, "store unavailable: {e}"),
            BookingError::NotFound(id) => write!(f, "not found: {id}"),
            BookingError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            BookingError::RoomInactive(id) => write!(f, "room {id} is no longer active"),
            BookingError::InvalidTransition { from, to } => {
                write!(f, "cannot move reservation from {from} to {to}")
            }
            BookingError::NotOwner(id) => {
                write!(f, "reservation {id} belongs to another requester")
            }
            BookingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            BookingError::Startup(e) => write!(f, "startup failed: {e}"),
        }
    }
}

impl std::error::Error for BookingError {}

impl From<std::io::Error> for BookingError {
    fn from(e: std::io::Error) -> Self {
        BookingError::StoreUnavailable(e.to_string())
    }
}
