use ulid::Ulid;

use crate::limits::MAX_UPCOMING_LIMIT;
use crate::model::*;

use super::{BookingError, BookingService, ReservationStore};

impl<S: ReservationStore> BookingService<S> {
    /// Every reservation the requester made, newest start first.
    pub async fn my_bookings(&self, requester_id: Ulid) -> Result<Vec<Reservation>, BookingError> {
        let mut out = self.store.reservations_for_requester(requester_id).await?;
        out.sort_by(|a, b| b.span.start.cmp(&a.span.start));
        Ok(out)
    }

    /// The requester's next live reservations starting at or after `now`,
    /// soonest first. Rejected and cancelled ones are left out.
    pub async fn upcoming_for(
        &self,
        requester_id: Ulid,
        now: Ms,
        limit: usize,
    ) -> Result<Vec<Reservation>, BookingError> {
        let mut out: Vec<Reservation> = self
            .store
            .reservations_for_requester(requester_id)
            .await?
            .into_iter()
            .filter(|r| r.span.start >= now && !r.status.is_terminal())
            .collect();
        out.sort_by_key(|r| r.span.start);
        out.truncate(limit.min(MAX_UPCOMING_LIMIT));
        Ok(out)
    }

    /// Pending reservations on a room awaiting a decision, earliest first.
    pub async fn pending_for_room(&self, room_id: Ulid) -> Result<Vec<Reservation>, BookingError> {
        let mut out: Vec<Reservation> = self
            .store
            .reservations_for_room(room_id)
            .await?
            .into_iter()
            .filter(|r| r.status == ReservationStatus::Pending)
            .collect();
        out.sort_by_key(|r| r.span.start);
        Ok(out)
    }

    /// Reservations on a room that overlap `window`, any status, in start order.
    pub async fn room_schedule(&self, room_id: Ulid, window: Span) -> Result<Vec<Reservation>, BookingError> {
        let mut out: Vec<Reservation> = self
            .store
            .reservations_for_room(room_id)
            .await?
            .into_iter()
            .filter(|r| r.span.overlaps(&window))
            .collect();
        out.sort_by_key(|r| r.span.start);
        Ok(out)
    }

    /// Rooms ordered by name.
    pub async fn rooms(&self, active_only: bool) -> Result<Vec<Room>, BookingError> {
        let mut rooms: Vec<Room> = self
            .store
            .list_rooms()
            .await?
            .into_iter()
            .filter(|r| r.is_active || !active_only)
            .collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(rooms)
    }

    pub async fn room(&self, id: Ulid) -> Result<Room, BookingError> {
        self.store
            .get_room(id)
            .await?
            .ok_or(BookingError::NotFound(id))
    }
}
