use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::validate::RoomFields;
use super::BookingError;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

/// What the booking service needs from the backing store.
///
/// Every call is one round trip. Nothing ties two calls together, so a
/// read followed by a write can race with another client.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// All reservations of the room with status `approved`.
    async fn list_approved_intervals(&self, room_id: Ulid) -> Result<Vec<Span>, BookingError>;

    async fn insert_reservation(&self, reservation: Reservation) -> Result<(), BookingError>;

    async fn get_reservation(&self, id: Ulid) -> Result<Option<Reservation>, BookingError>;

    /// Compare-and-set: fails with `InvalidTransition` unless the stored status is still `from`.
    /// Moving to `Approved` also fails with `SchedulingConflict` when another
    /// approved reservation of the room overlaps; stores that can check this
    /// atomically with the write should.
    /// `decided_by = None` keeps the recorded approver.
    async fn set_status(
        &self,
        id: Ulid,
        from: ReservationStatus,
        to: ReservationStatus,
        decided_by: Option<Ulid>,
    ) -> Result<Reservation, BookingError>;

    async fn reservations_for_requester(&self, requester_id: Ulid) -> Result<Vec<Reservation>, BookingError>;

    async fn reservations_for_room(&self, room_id: Ulid) -> Result<Vec<Reservation>, BookingError>;

    async fn insert_room(&self, room: Room) -> Result<(), BookingError>;

    async fn update_room(&self, id: Ulid, fields: RoomFields) -> Result<Room, BookingError>;

    async fn deactivate_room(&self, id: Ulid) -> Result<Room, BookingError>;

    async fn get_room(&self, id: Ulid) -> Result<Option<Room>, BookingError>;

    async fn list_rooms(&self) -> Result<Vec<Room>, BookingError>;
}

/// Room states plus the lookup indexes that go with them.
pub struct InMemoryStore {
    rooms: DashMap<Ulid, SharedRoomState>,
    reservation_to_room: DashMap<Ulid, Ulid>,
    by_requester: DashMap<Ulid, Vec<Ulid>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            reservation_to_room: DashMap::new(),
            by_requester: DashMap::new(),
        }
    }

    // ── Rooms ────────────────────────────────────────────────

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn contains_room(&self, id: &Ulid) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn insert_room(&self, state: RoomState) {
        self.rooms.insert(state.room.id, Arc::new(RwLock::new(state)));
    }

    pub fn room_states(&self) -> Vec<SharedRoomState> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    // ── Reservation indexes ──────────────────────────────────

    pub fn room_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_room.get(reservation_id).map(|e| *e.value())
    }

    pub fn reservations_of(&self, requester_id: &Ulid) -> Vec<Ulid> {
        self.by_requester
            .get(requester_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    fn map_reservation(&self, reservation_id: Ulid, room_id: Ulid, requester_id: Ulid) {
        self.reservation_to_room.insert(reservation_id, room_id);
        self.by_requester
            .entry(requester_id)
            .or_default()
            .push(reservation_id);
    }

    // ── Event application ────────────────────────────────────

    /// Apply an event to a room the caller already holds.
    /// `RoomCreated` is handled by `insert_room`, not here.
    pub fn apply_event(&self, rs: &mut RoomState, event: &Event) {
        match event {
            Event::RoomUpdated {
                name,
                location,
                capacity,
                equipment,
                ..
            } => {
                rs.room.name = name.clone();
                rs.room.location = location.clone();
                rs.room.capacity = *capacity;
                rs.room.equipment = equipment.clone();
            }
            Event::RoomDeactivated { .. } => {
                rs.room.is_active = false;
            }
            Event::ReservationRequested {
                id,
                room_id,
                requester_id,
                title,
                description,
                span,
                created_at,
            } => {
                rs.insert_reservation(Reservation {
                    id: *id,
                    room_id: *room_id,
                    requester_id: *requester_id,
                    title: title.clone(),
                    description: description.clone(),
                    span: *span,
                    status: ReservationStatus::Pending,
                    decided_by: None,
                    created_at: *created_at,
                });
                self.map_reservation(*id, *room_id, *requester_id);
            }
            Event::ReservationStatusChanged {
                id,
                status,
                decided_by,
                ..
            } => {
                if let Some(r) = rs.reservation_mut(id) {
                    r.status = *status;
                    if decided_by.is_some() {
                        r.decided_by = *decided_by;
                    }
                }
            }
            Event::RoomCreated { .. } => {}
        }
    }
}

/// Build the room state that a `RoomCreated` event describes.
pub fn room_from_event(event: &Event) -> Option<RoomState> {
    match event {
        Event::RoomCreated {
            id,
            name,
            location,
            capacity,
            equipment,
            created_at,
        } => Some(RoomState::new(Room {
            id: *id,
            name: name.clone(),
            location: location.clone(),
            capacity: *capacity,
            equipment: equipment.clone(),
            is_active: true,
            created_at: *created_at,
        })),
        _ => None,
    }
}
