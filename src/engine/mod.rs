mod accounts;
mod error;
mod inventory;
mod lifecycle;
pub mod pricing;
mod queries;
pub mod resolver;
pub mod validator;

pub use accounts::NewAccount;
pub use error::{DateConflict, EngineError};
pub use inventory::{BulkDays, BulkOutcome, NewAccommodation};
pub use lifecycle::{Booked, NewReservation, ReservationChanges};
pub use pricing::{PriceLine, Quote};
pub use queries::{CalendarDay, ReservationFilter};
pub use resolver::{ResolvedDay, ResolvedStatus};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use ulid::Ulid;

use crate::clock::Clock;
use crate::model::*;
use crate::observability;
use crate::wal::Wal;

pub type SharedAccommodation = Arc<RwLock<AccommodationState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
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

/// Owns the WAL file. Appends that queue up while one fsync is in flight
/// are written together and share the next fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    // Compaction must observe every append queued before it.
                    deferred = Some(other);
                    break;
                }
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
    tracing::debug!("WAL writer stopped");
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!(error = %e, batch = batch.len(), "WAL flush failed");
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so the partial batch is not carried
    // into the next one; its callers are told it failed.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => {}
    }
}

fn write_days(state: &mut AccommodationState, days: &[(chrono::NaiveDate, DayRecord)]) {
    for (date, record) in days {
        state.set_day(*date, *record);
    }
}

/// Apply a record to one accommodation. The caller holds its write lock.
/// Creation and deletion are handled at the map level instead.
fn apply_to_accommodation(
    state: &mut AccommodationState,
    event: &Event,
    reservation_index: &DashMap<Ulid, Ulid>,
) {
    match event {
        Event::AccommodationUpdated { accommodation } => state.info = accommodation.clone(),
        Event::DaysSet { days, .. } => write_days(state, days),
        Event::ReservationSaved { reservation, days } => {
            reservation_index.insert(reservation.id, reservation.accommodation_id);
            state.upsert_reservation(reservation.clone());
            write_days(state, days);
        }
        Event::ReservationDeleted { id, days, .. } => {
            state.remove_reservation(id);
            reservation_index.remove(id);
            write_days(state, days);
        }
        Event::AccommodationCreated { .. }
        | Event::AccommodationDeleted { .. }
        | Event::AccountCreated { .. }
        | Event::UserUpdated { .. }
        | Event::IdentitySynced { .. } => {}
    }
}

pub struct Engine {
    pub(super) accommodations: DashMap<Ulid, SharedAccommodation>,
    /// Reverse lookup: reservation id → accommodation id.
    pub(super) reservation_index: DashMap<Ulid, Ulid>,
    pub(super) users: DashMap<Ulid, UserAccount>,
    pub(super) usernames: DashMap<String, Ulid>,
    /// Keyed by national id.
    pub(super) identities: DashMap<String, ExternalIdentity>,
    pub(super) identity_by_user: DashMap<Ulid, String>,
    /// Serializes account creation so unique checks and insert are one step.
    pub(super) account_lock: Mutex<()>,
    /// Mutations hold it shared; compaction takes it exclusively so the
    /// snapshot and the log swap see the same state.
    pub(super) snapshot_gate: RwLock<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            accommodations: DashMap::new(),
            reservation_index: DashMap::new(),
            users: DashMap::new(),
            usernames: DashMap::new(),
            identities: DashMap::new(),
            identity_by_user: DashMap::new(),
            account_lock: Mutex::new(()),
            snapshot_gate: RwLock::new(()),
            wal_tx,
            clock,
        };

        // Nothing else holds these locks yet, so try_* never contends.
        for event in &events {
            engine.replay_event(event);
        }
        metrics::gauge!(observability::ACCOMMODATIONS).set(engine.accommodations.len() as f64);
        tracing::info!(
            path = %wal_path.display(),
            records = events.len(),
            accommodations = engine.accommodations.len(),
            users = engine.users.len(),
            "engine state restored"
        );

        Ok(engine)
    }

    fn replay_event(&self, event: &Event) {
        match event {
            Event::AccommodationCreated { accommodation } => {
                let state = AccommodationState::new(accommodation.clone());
                self.accommodations
                    .insert(accommodation.id, Arc::new(RwLock::new(state)));
            }
            Event::AccommodationDeleted { id } => {
                if let Some((_, shared)) = self.accommodations.remove(id)
                    && let Ok(guard) = shared.try_read()
                {
                    self.unindex_reservations(&guard);
                }
            }
            Event::AccountCreated { .. } | Event::UserUpdated { .. } | Event::IdentitySynced { .. } => {
                self.apply_account_event(event);
            }
            other => {
                let Some(shared) = other
                    .accommodation_id()
                    .and_then(|id| self.get_accommodation(&id))
                else {
                    return;
                };
                match shared.try_write() {
                    Ok(mut guard) => {
                        apply_to_accommodation(&mut guard, other, &self.reservation_index)
                    }
                    Err(_) => tracing::warn!("replay: accommodation lock contended, record skipped"),
                }
            }
        }
    }

    pub(super) fn unindex_reservations(&self, state: &AccommodationState) {
        for r in &state.reservations {
            self.reservation_index.remove(&r.id);
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Write a record through the group-commit writer and wait for its fsync.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| writer_gone("WAL writer shut down"))?;
        rx.await
            .map_err(|_| writer_gone("WAL writer dropped response"))?
            .map_err(EngineError::from)
    }

    pub fn get_accommodation(&self, id: &Ulid) -> Option<SharedAccommodation> {
        self.accommodations.get(id).map(|e| e.value().clone())
    }

    pub fn accommodation_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_index.get(reservation_id).map(|e| *e.value())
    }

    /// WAL append, then apply under the caller's write lock.
    pub(super) async fn persist_and_apply(
        &self,
        state: &mut AccommodationState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_accommodation(state, event, &self.reservation_index);
        Ok(())
    }

    /// True while `shared` is still the live entry for `id`. A waiter that
    /// cloned the `Arc` before a delete gets the lock on an orphan.
    fn is_live(&self, id: &Ulid, shared: &SharedAccommodation) -> bool {
        self.accommodations
            .get(id)
            .is_some_and(|e| Arc::ptr_eq(e.value(), shared))
    }

    pub(super) async fn write_accommodation(
        &self,
        id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<AccommodationState>, EngineError> {
        let shared = self
            .get_accommodation(id)
            .ok_or_else(|| EngineError::accommodation_not_found(*id))?;
        let guard = shared.clone().write_owned().await;
        if !self.is_live(id, &shared) {
            return Err(EngineError::accommodation_not_found(*id));
        }
        Ok(guard)
    }

    pub(super) async fn read_accommodation(
        &self,
        id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockReadGuard<AccommodationState>, EngineError> {
        let shared = self
            .get_accommodation(id)
            .ok_or_else(|| EngineError::accommodation_not_found(*id))?;
        let guard = shared.clone().read_owned().await;
        if !self.is_live(id, &shared) {
            return Err(EngineError::accommodation_not_found(*id));
        }
        Ok(guard)
    }

    /// Lookup reservation → accommodation, then take that write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<AccommodationState>, EngineError> {
        let accommodation_id = self
            .accommodation_for_reservation(reservation_id)
            .ok_or_else(|| EngineError::reservation_not_found(*reservation_id))?;
        let guard = self.write_accommodation(&accommodation_id).await?;
        // A concurrent delete may have won the race for the lock.
        if guard.reservation(reservation_id).is_none() {
            return Err(EngineError::reservation_not_found(*reservation_id));
        }
        Ok(guard)
    }

    /// Rewrite the WAL as the minimal record set reproducing current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _exclusive = self.snapshot_gate.write().await;

        let mut events = Vec::new();
        let shared: Vec<SharedAccommodation> = self
            .accommodations
            .iter()
            .map(|e| e.value().clone())
            .collect();
        for acc in shared {
            let guard = acc.read().await;
            events.push(Event::AccommodationCreated {
                accommodation: guard.info.clone(),
            });
            if !guard.days.is_empty() {
                events.push(Event::DaysSet {
                    accommodation_id: guard.info.id,
                    days: guard.days.iter().map(|(d, r)| (*d, *r)).collect(),
                });
            }
            for reservation in &guard.reservations {
                events.push(Event::ReservationSaved {
                    reservation: reservation.clone(),
                    days: Vec::new(),
                });
            }
        }
        for user in self.users.iter() {
            let identity = self
                .identity_by_user
                .get(user.key())
                .and_then(|nid| self.identities.get(nid.value()).map(|i| i.value().clone()));
            events.push(Event::AccountCreated {
                user: user.value().clone(),
                identity,
            });
        }

        let record_count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| writer_gone("WAL writer shut down"))?;
        rx.await
            .map_err(|_| writer_gone("WAL writer dropped response"))?
            .map_err(EngineError::from)?;
        tracing::info!(records = record_count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

fn writer_gone(message: &str) -> EngineError {
    EngineError::Persistence {
        kind: io::ErrorKind::BrokenPipe,
        message: message.to_string(),
    }
}
