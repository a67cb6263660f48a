mod conflict;
mod error;
mod mutations;
mod queries;
mod store;
mod validate;

pub use conflict::has_conflict;
pub use error::BookingError;
pub use store::{InMemoryStore, ReservationStore, SharedRoomState};
pub use validate::{
    check_availability, check_room_form, check_shape, validate_booking, BookingRequest, Candidate,
    RoomFields, RoomForm,
};

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::wal::Wal;

use store::room_from_event;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that queue up while a flush is in progress are
/// committed together with one fsync; every waiting caller learns the
/// outcome of the batch it rode in. Other commands run between batches.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    let mut next = rx.recv().await;
    while let Some(cmd) = next.take() {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                while let Ok(queued) = rx.try_recv() {
                    match queued {
                        WalCommand::Append { event, response } => batch.push((event, response)),
                        other => {
                            next = Some(other);
                            break;
                        }
                    }
                }
                commit_batch(&mut wal, batch);
            }
            WalCommand::Compact { events, response } => {
                let result = Wal::write_compact_file(wal.path(), &events)
                    .and_then(|()| wal.swap_compact_file());
                let _ = response.send(result);
            }
            WalCommand::AppendsSinceCompact { response } => {
                let _ = response.send(wal.appends_since_compact());
            }
        }
        if next.is_none() {
            next = rx.recv().await;
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();
    let result = write_batch(wal, &batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::warn!("WAL batch of {} events not committed: {e}", batch.len());
    }
    for (_, response) in batch {
        let _ = response.send(match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        });
    }
}

/// All or nothing: an encoding failure drops the batch before anything is written.
fn write_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            wal.discard_pending();
            return Err(e);
        }
    }
    wal.flush_sync()
}

/// The reservation store this crate ships: room state in memory, every change
/// written ahead to an append-only log before it is applied.
pub struct Ledger {
    state: InMemoryStore,
    /// Mutations hold this shared; compaction holds it exclusively so that no
    /// event is logged between its snapshot and the log swap.
    compaction: RwLock<()>,
    /// `None` for a purely in-memory ledger.
    wal_tx: Option<mpsc::Sender<WalCommand>>,
    path: Option<PathBuf>,
}

impl Ledger {
    /// Replay the WAL at `path` and start its group-commit writer.
    /// Must be called from within a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let (wal, events) = Wal::recover(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let state = InMemoryStore::new();
        let replayed = events.len();
        replay_into(&state, events);
        tracing::info!(
            "ledger {} replayed {replayed} events ({} rooms)",
            path.display(),
            state.room_count()
        );

        Ok(Self {
            state,
            compaction: RwLock::new(()),
            wal_tx: Some(wal_tx),
            path: Some(path.to_path_buf()),
        })
    }

    /// A ledger with no durable log.
    pub fn in_memory() -> Self {
        Self {
            state: InMemoryStore::new(),
            compaction: RwLock::new(()),
            wal_tx: None,
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn active_room_count(&self) -> usize {
        let mut active = 0;
        for rs in self.state.room_states() {
            if rs.read().await.room.is_active {
                active += 1;
            }
        }
        active
    }

    async fn wal_call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> WalCommand,
    ) -> Result<Option<T>, BookingError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(None);
        };
        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(build(tx))
            .await
            .map_err(|_| BookingError::StoreUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map(Some)
            .map_err(|_| BookingError::StoreUnavailable("WAL writer dropped response".into()))
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), BookingError> {
        let event = event.clone();
        match self
            .wal_call(|response| WalCommand::Append { event, response })
            .await?
        {
            Some(result) => result.map_err(BookingError::from),
            None => Ok(()),
        }
    }

    /// WAL-append then apply, while the caller holds the room's write lock.
    async fn persist_and_apply(&self, rs: &mut RoomState, event: &Event) -> Result<(), BookingError> {
        self.wal_append(event).await?;
        self.state.apply_event(rs, event);
        Ok(())
    }

    fn room_state(&self, id: Ulid) -> Result<SharedRoomState, BookingError> {
        self.state.get_room(&id).ok_or(BookingError::NotFound(id))
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), BookingError> {
        let _quiesced = self.compaction.write().await;
        let mut events = Vec::new();
        for shared in self.state.room_states() {
            let guard = shared.read().await;
            let room = &guard.room;
            events.push(Event::RoomCreated {
                id: room.id,
                name: room.name.clone(),
                location: room.location.clone(),
                capacity: room.capacity,
                equipment: room.equipment.clone(),
                created_at: room.created_at,
            });
            if !room.is_active {
                events.push(Event::RoomDeactivated { id: room.id });
            }
            for r in &guard.reservations {
                events.push(Event::ReservationRequested {
                    id: r.id,
                    room_id: r.room_id,
                    requester_id: r.requester_id,
                    title: r.title.clone(),
                    description: r.description.clone(),
                    span: r.span,
                    created_at: r.created_at,
                });
                if r.status != ReservationStatus::Pending || r.decided_by.is_some() {
                    events.push(Event::ReservationStatusChanged {
                        id: r.id,
                        room_id: r.room_id,
                        status: r.status,
                        decided_by: r.decided_by,
                    });
                }
            }
        }

        match self
            .wal_call(|response| WalCommand::Compact { events, response })
            .await?
        {
            Some(result) => result.map_err(BookingError::from),
            None => Ok(()),
        }
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        self.wal_call(|response| WalCommand::AppendsSinceCompact { response })
            .await
            .ok()
            .flatten()
            .unwrap_or(0)
    }
}

/// Rebuild state from replayed events. Nothing else can see these rooms yet,
/// so they are assembled unlocked and published at the end.
fn replay_into(state: &InMemoryStore, events: Vec<Event>) {
    let mut rooms: HashMap<Ulid, RoomState> = HashMap::new();
    for event in &events {
        if let Some(rs) = room_from_event(event) {
            rooms.insert(rs.room.id, rs);
        } else if let Some(rs) = rooms.get_mut(&event.room_id()) {
            state.apply_event(rs, event);
        }
    }
    for (_, rs) in rooms {
        state.insert_room(rs);
    }
}

#[async_trait]
impl ReservationStore for Ledger {
    async fn list_approved_intervals(&self, room_id: Ulid) -> Result<Vec<Span>, BookingError> {
        let rs = self.room_state(room_id)?;
        let guard = rs.read().await;
        Ok(guard.approved_spans())
    }

    async fn insert_reservation(&self, reservation: Reservation) -> Result<(), BookingError> {
        let _gate = self.compaction.read().await;
        if self.state.room_for_reservation(&reservation.id).is_some() {
            return Err(BookingError::AlreadyExists(reservation.id));
        }
        let rs = self.room_state(reservation.room_id)?;
        let mut guard = rs.write().await;
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_ROOM {
            return Err(BookingError::LimitExceeded("too many reservations on room"));
        }
        let event = Event::ReservationRequested {
            id: reservation.id,
            room_id: reservation.room_id,
            requester_id: reservation.requester_id,
            title: reservation.title,
            description: reservation.description,
            span: reservation.span,
            created_at: reservation.created_at,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    async fn get_reservation(&self, id: Ulid) -> Result<Option<Reservation>, BookingError> {
        let Some(room_id) = self.state.room_for_reservation(&id) else {
            return Ok(None);
        };
        let rs = self.room_state(room_id)?;
        let guard = rs.read().await;
        Ok(guard.reservation(&id).cloned())
    }

    async fn set_status(
        &self,
        id: Ulid,
        from: ReservationStatus,
        to: ReservationStatus,
        decided_by: Option<Ulid>,
    ) -> Result<Reservation, BookingError> {
        let _gate = self.compaction.read().await;
        let room_id = self
            .state
            .room_for_reservation(&id)
            .ok_or(BookingError::NotFound(id))?;
        let rs = self.room_state(room_id)?;
        let mut guard = rs.write().await;
        let (current, span) = guard
            .reservation(&id)
            .map(|r| (r.status, r.span))
            .ok_or(BookingError::NotFound(id))?;
        if current != from {
            return Err(BookingError::InvalidTransition { from: current, to });
        }
        if to.blocks_room() {
            let others: Vec<Span> = guard
                .reservations
                .iter()
                .filter(|r| r.id != id && r.status.blocks_room())
                .map(|r| r.span)
                .collect();
            if has_conflict(room_id, &span, &others)? {
                return Err(BookingError::SchedulingConflict(room_id));
            }
        }
        let event = Event::ReservationStatusChanged {
            id,
            room_id,
            status: to,
            decided_by,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        guard
            .reservation(&id)
            .cloned()
            .ok_or(BookingError::NotFound(id))
    }

    async fn reservations_for_requester(&self, requester_id: Ulid) -> Result<Vec<Reservation>, BookingError> {
        let mut out = Vec::new();
        for id in self.state.reservations_of(&requester_id) {
            if let Some(r) = self.get_reservation(id).await? {
                out.push(r);
            }
        }
        Ok(out)
    }

    async fn reservations_for_room(&self, room_id: Ulid) -> Result<Vec<Reservation>, BookingError> {
        let rs = self.room_state(room_id)?;
        let guard = rs.read().await;
        Ok(guard.reservations.clone())
    }

    async fn insert_room(&self, room: Room) -> Result<(), BookingError> {
        let _gate = self.compaction.read().await;
        if self.state.room_count() >= MAX_ROOMS {
            return Err(BookingError::LimitExceeded("too many rooms"));
        }
        if self.state.contains_room(&room.id) {
            return Err(BookingError::AlreadyExists(room.id));
        }
        let event = Event::RoomCreated {
            id: room.id,
            name: room.name,
            location: room.location,
            capacity: room.capacity,
            equipment: room.equipment,
            created_at: room.created_at,
        };
        self.wal_append(&event).await?;
        if let Some(rs) = room_from_event(&event) {
            self.state.insert_room(rs);
        }
        Ok(())
    }

    async fn update_room(&self, id: Ulid, fields: RoomFields) -> Result<Room, BookingError> {
        let _gate = self.compaction.read().await;
        let rs = self.room_state(id)?;
        let mut guard = rs.write().await;
        let event = Event::RoomUpdated {
            id,
            name: fields.name,
            location: fields.location,
            capacity: fields.capacity,
            equipment: fields.equipment,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(guard.room.clone())
    }

    async fn deactivate_room(&self, id: Ulid) -> Result<Room, BookingError> {
        let _gate = self.compaction.read().await;
        let rs = self.room_state(id)?;
        let mut guard = rs.write().await;
        if guard.room.is_active {
            self.persist_and_apply(&mut guard, &Event::RoomDeactivated { id })
                .await?;
        }
        Ok(guard.room.clone())
    }

    async fn get_room(&self, id: Ulid) -> Result<Option<Room>, BookingError> {
        match self.state.get_room(&id) {
            Some(rs) => Ok(Some(rs.read().await.room.clone())),
            None => Ok(None),
        }
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, BookingError> {
        let mut rooms = Vec::with_capacity(self.state.room_count());
        for rs in self.state.room_states() {
            rooms.push(rs.read().await.room.clone());
        }
        Ok(rooms)
    }
}

/// Booking screens' operations over any `ReservationStore`.
pub struct BookingService<S> {
    store: Arc<S>,
    calendar: LocalCalendar,
}

impl<S: ReservationStore> BookingService<S> {
    pub fn new(store: Arc<S>, calendar: LocalCalendar) -> Self {
        Self { store, calendar }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn calendar(&self) -> LocalCalendar {
        self.calendar
    }
}
