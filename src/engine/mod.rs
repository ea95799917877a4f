mod admission;
mod cascade;
mod error;
mod horizon;
mod mutations;
mod queries;
mod slots;
mod store;

pub use cascade::{
    Affected, CascadeResult, DOCTOR_UNAVAILABLE_REASON, doctor_notifications, patient_notifications,
};
pub use error::EngineError;
pub use horizon::{DateClass, classify_date, classify_horizon};
pub use mutations::{ADMIN_CANCEL_REASON, PATIENT_CANCEL_REASON};
pub use slots::{candidate_slots, generate_slots};
pub use store::{AvailabilityStore, DoctorState, SharedDoctorState};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{OwnedRwLockWriteGuard, mpsc, oneshot};

use crate::clock::Clock;
use crate::journal::Journal;
use crate::limits::{DEFAULT_HORIZON_DAYS, MAX_HORIZON_DAYS};
use crate::model::*;

use store::event_doctor_id;

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
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

/// Owns the journal and batches appends: block for the first Append, drain
/// whatever else is queued, fsync once, answer every sender.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let JournalCommand::Append { event, response } = cmd else {
            handle_control(&mut journal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(JournalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    // Control commands must observe every earlier append.
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut journal, batch);
        if let Some(cmd) = deferred {
            handle_control(&mut journal, cmd);
        }
    }
    tracing::debug!("journal writer stopped");
}

fn commit_batch(journal: &mut Journal, batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mut result = Ok(());
    for (event, _) in &batch {
        if let Err(e) = journal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    // Flush even after a failed append so stale bytes never reach the next batch.
    let flushed = journal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }

    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    if let Err(e) = &result {
        tracing::error!("journal flush failed: {e}");
    }
    for (_, tx) in batch {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_control(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_snapshot(journal.path(), &events)
                .and_then(|()| journal.install_snapshot());
            if result.is_ok() {
                metrics::counter!(crate::observability::JOURNAL_COMPACTIONS_TOTAL).increment(1);
            }
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { event, response } => commit_batch(journal, vec![(event, response)]),
    }
}

/// The availability and slot allocation engine.
pub struct Engine {
    pub(super) store: AvailabilityStore,
    pub(super) journal_tx: mpsc::Sender<JournalCommand>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) horizon_days: u32,
}

impl Engine {
    pub fn new(journal_path: PathBuf, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let events = Journal::recover(&journal_path)?;
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let engine = Self {
            store: AvailabilityStore::new(),
            journal_tx,
            clock,
            horizon_days: DEFAULT_HORIZON_DAYS,
        };

        // Nothing else can see these Arcs yet, so try_write never contends.
        // blocking_write would panic inside the runtime.
        for event in &events {
            engine.store.index_event(event);
            match event {
                Event::DoctorRegistered { doctor } => engine.store.insert_doctor(doctor.clone()),
                Event::PatientRegistered { patient } => engine.store.insert_patient(patient.clone()),
                Event::UnavailabilityReported {
                    record: Unavailability::HospitalWide(closure),
                    cancelled,
                    ..
                } => {
                    engine
                        .store
                        .closures
                        .try_write()
                        .expect("replay: uncontended write")
                        .push(closure.clone());
                    let mut owners: Vec<DoctorId> = cancelled
                        .iter()
                        .filter_map(|id| engine.store.doctor_for_appointment(id))
                        .collect();
                    owners.sort();
                    owners.dedup();
                    for doctor_id in owners {
                        if let Some(ds) = engine.store.get_doctor(&doctor_id) {
                            ds.try_write().expect("replay: uncontended write").apply(event);
                        }
                    }
                }
                other => {
                    if let Some(doctor_id) = event_doctor_id(other)
                        && let Some(ds) = engine.store.get_doctor(&doctor_id)
                    {
                        ds.try_write().expect("replay: uncontended write").apply(other);
                    }
                }
            }
        }

        tracing::info!(
            events = events.len(),
            doctors = engine.store.doctor_count(),
            patients = engine.store.patient_count(),
            "engine state restored"
        );
        Ok(engine)
    }

    /// Window used by `resolve_horizon_from_today`, capped at `MAX_HORIZON_DAYS`.
    pub fn with_horizon_days(mut self, days: u32) -> Self {
        self.horizon_days = days.min(MAX_HORIZON_DAYS);
        self
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Write event to the journal via the group-commit writer.
    pub(super) async fn journal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))
    }

    /// Journal, then apply to the locked doctor, then refresh the id indexes.
    pub(super) async fn persist_and_apply(
        &self,
        ds: &mut DoctorState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.journal_append(event).await?;
        ds.apply(event);
        self.store.index_event(event);
        Ok(())
    }

    /// Lookup appointment → doctor, acquire that doctor's write lock.
    pub(super) async fn resolve_appointment_write(
        &self,
        appointment_id: &AppointmentId,
    ) -> Result<OwnedRwLockWriteGuard<DoctorState>, EngineError> {
        let doctor_id = self
            .store
            .doctor_for_appointment(appointment_id)
            .ok_or(EngineError::NotFound(*appointment_id))?;
        let ds = self
            .store
            .get_doctor(&doctor_id)
            .ok_or(EngineError::NotFound(doctor_id))?;
        Ok(ds.write_owned().await)
    }

    /// Doctor write lock by doctor id.
    pub(super) async fn doctor_write(
        &self,
        doctor_id: &DoctorId,
    ) -> Result<OwnedRwLockWriteGuard<DoctorState>, EngineError> {
        let ds = self
            .store
            .get_doctor(doctor_id)
            .ok_or(EngineError::NotFound(*doctor_id))?;
        Ok(ds.write_owned().await)
    }
}
