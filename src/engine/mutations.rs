use ulid::Ulid;

use crate::model::*;
use crate::observability::{
    BOOKING_SUBMISSIONS_TOTAL, CONFLICT_CHECK_DURATION_SECONDS, ROOMS_ACTIVE,
    STATUS_TRANSITIONS_TOTAL,
};

use super::conflict::{has_conflict, now_ms};
use super::validate::{check_availability, check_room_form, check_shape, BookingRequest, RoomForm};
use super::{BookingError, BookingService, ReservationStore};

impl<S: ReservationStore> BookingService<S> {
    /// Validate a booking form and store it as a pending reservation.
    ///
    /// Structural checks run before any store access. A failed fetch of the
    /// room's approved reservations blocks the submission with
    /// `StoreUnavailable`; it is never read as "no conflict".
    pub async fn submit_booking(
        &self,
        requester_id: Ulid,
        req: BookingRequest,
    ) -> Result<Reservation, BookingError> {
        let result = self.try_submit(requester_id, &req).await;
        let outcome = match &result {
            Ok(_) => "accepted",
            Err(e) => e.kind(),
        };
        metrics::counter!(BOOKING_SUBMISSIONS_TOTAL, "outcome" => outcome).increment(1);
        match &result {
            Ok(r) => tracing::info!(
                "reservation {} requested on room {} by {requester_id} for [{}, {})",
                r.id,
                r.room_id,
                r.span.start,
                r.span.end
            ),
            Err(e) if e.is_validation() => tracing::debug!("booking by {requester_id} rejected: {e}"),
            Err(e) => tracing::warn!("booking by {requester_id} failed: {e}"),
        }
        result
    }

    async fn try_submit(&self, requester_id: Ulid, req: &BookingRequest) -> Result<Reservation, BookingError> {
        let candidate = check_shape(req, &self.calendar)?;

        let room = self
            .store
            .get_room(candidate.room_id)
            .await?
            .ok_or(BookingError::NotFound(candidate.room_id))?;
        if !room.is_active {
            return Err(BookingError::RoomInactive(room.id));
        }

        let existing = self.store.list_approved_intervals(room.id).await?;
        let check_start = std::time::Instant::now();
        let verdict = check_availability(&candidate, &existing);
        metrics::histogram!(CONFLICT_CHECK_DURATION_SECONDS)
            .record(check_start.elapsed().as_secs_f64());
        verdict?;

        let reservation = candidate.into_reservation(Ulid::new(), requester_id, now_ms());
        self.store.insert_reservation(reservation.clone()).await?;
        Ok(reservation)
    }

    /// Approve a pending reservation. Fails with `SchedulingConflict` if it now
    /// overlaps another approved reservation of the room.
    pub async fn approve(&self, id: Ulid, approver_id: Ulid) -> Result<Reservation, BookingError> {
        let current = self.load(id).await?;
        ensure_transition(current.status, ReservationStatus::Approved)?;

        let existing = self.store.list_approved_intervals(current.room_id).await?;
        if has_conflict(current.room_id, &current.span, &existing)? {
            return Err(BookingError::SchedulingConflict(current.room_id));
        }
        self.transition(&current, ReservationStatus::Approved, Some(approver_id))
            .await
    }

    pub async fn reject(&self, id: Ulid, approver_id: Ulid) -> Result<Reservation, BookingError> {
        let current = self.load(id).await?;
        ensure_transition(current.status, ReservationStatus::Rejected)?;
        self.transition(&current, ReservationStatus::Rejected, Some(approver_id))
            .await
    }

    /// Withdraw a pending or approved reservation. Only its requester may.
    pub async fn cancel(&self, id: Ulid, actor_id: Ulid) -> Result<Reservation, BookingError> {
        let current = self.load(id).await?;
        if current.requester_id != actor_id {
            return Err(BookingError::NotOwner(id));
        }
        ensure_transition(current.status, ReservationStatus::Cancelled)?;
        self.transition(&current, ReservationStatus::Cancelled, None)
            .await
    }

    async fn load(&self, id: Ulid) -> Result<Reservation, BookingError> {
        self.store
            .get_reservation(id)
            .await?
            .ok_or(BookingError::NotFound(id))
    }

    async fn transition(
        &self,
        current: &Reservation,
        to: ReservationStatus,
        decided_by: Option<Ulid>,
    ) -> Result<Reservation, BookingError> {
        let updated = self
            .store
            .set_status(current.id, current.status, to, decided_by)
            .await?;
        metrics::counter!(STATUS_TRANSITIONS_TOTAL, "to" => to.as_str()).increment(1);
        tracing::info!(
            "reservation {} on room {}: {} -> {to}",
            current.id,
            current.room_id,
            current.status
        );
        Ok(updated)
    }

    // ── Rooms ────────────────────────────────────────────────

    pub async fn create_room(&self, form: &RoomForm) -> Result<Room, BookingError> {
        let fields = check_room_form(form)?;
        let room = Room {
            id: Ulid::new(),
            name: fields.name,
            location: fields.location,
            capacity: fields.capacity,
            equipment: fields.equipment,
            is_active: true,
            created_at: now_ms(),
        };
        self.store.insert_room(room.clone()).await?;
        metrics::gauge!(ROOMS_ACTIVE).increment(1.0);
        tracing::info!("room {} ({}) created", room.id, room.name);
        Ok(room)
    }

    /// Edit a room's details. Does not change whether it is active.
    pub async fn update_room(&self, id: Ulid, form: &RoomForm) -> Result<Room, BookingError> {
        let fields = check_room_form(form)?;
        let room = self.store.update_room(id, fields).await?;
        tracing::info!("room {id} updated");
        Ok(room)
    }

    /// Soft delete: the room stops accepting bookings, its reservations stay.
    pub async fn deactivate_room(&self, id: Ulid) -> Result<Room, BookingError> {
        let was_active = self.room(id).await?.is_active;
        let room = self.store.deactivate_room(id).await?;
        if was_active {
            metrics::gauge!(ROOMS_ACTIVE).decrement(1.0);
            tracing::info!("room {id} deactivated");
        }
        Ok(room)
    }
}

fn ensure_transition(from: ReservationStatus, to: ReservationStatus) -> Result<(), BookingError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(BookingError::InvalidTransition { from, to })
    }
}
