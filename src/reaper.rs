use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Ledger;

const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites the ledger's WAL once enough appends pile up.
pub async fn run_compactor(ledger: Arc<Ledger>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&ledger, threshold).await;
    }
}

/// One compactor pass. Returns whether a compaction ran.
pub async fn compact_if_due(ledger: &Ledger, threshold: u64) -> bool {
    let appends = ledger.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match ledger.compact_wal().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            tracing::warn!("WAL compaction failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BookingRequest, BookingService, ReservationStore, RoomForm};
    use crate::model::*;
    use crate::wal::Wal;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("roomdesk_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compactor_waits_for_threshold_then_compacts() {
        let path = test_wal_path("compactor.wal");
        let ledger = Arc::new(Ledger::open(&path).unwrap());
        let svc = BookingService::new(ledger.clone(), LocalCalendar::UTC);

        let room = svc
            .create_room(&RoomForm {
                name: "Aurora".into(),
                capacity: 4,
                ..Default::default()
            })
            .await
            .unwrap();
        let requester = Ulid::new();
        // 2024-06-03T09:00Z
        let start = 1_717_405_200_000;
        let r = svc
            .submit_booking(
                requester,
                BookingRequest {
                    title: Some("Retro".into()),
                    room_id: Some(room.id),
                    start: Some(start),
                    end: Some(start + 3_600_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        svc.cancel(r.id, requester).await.unwrap();

        assert!(!compact_if_due(&ledger, 10).await);
        assert_eq!(ledger.wal_appends_since_compact().await, 3);

        assert!(compact_if_due(&ledger, 3).await);
        assert_eq!(ledger.wal_appends_since_compact().await, 0);

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed.len(), 3);
        assert!(matches!(replayed[0], Event::RoomCreated { .. }));
        assert!(matches!(
            replayed[2],
            Event::ReservationStatusChanged { status: ReservationStatus::Cancelled, .. }
        ));
        let cancelled = ledger.get_reservation(r.id).await.unwrap().unwrap();
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    }

    #[tokio::test]
    async fn in_memory_ledger_never_compacts() {
        let ledger = Ledger::in_memory();
        assert!(ledger.path().is_none());
        assert!(!compact_if_due(&ledger, 1).await);
        assert_eq!(ledger.wal_appends_since_compact().await, 0);
    }
}
