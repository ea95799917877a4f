use chrono::{NaiveTime, Weekday};
use tokio::sync::oneshot;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{CANCELLATIONS_TOTAL, role_label};

use super::cascade::DOCTOR_UNAVAILABLE_REASON;
use super::{Engine, EngineError, JournalCommand};

pub const PATIENT_CANCEL_REASON: &str = "Patient is not available";
pub const ADMIN_CANCEL_REASON: &str = "Cancelled by hospital administration";

fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), EngineError> {
    if email.len() > MAX_EMAIL_LEN {
        return Err(EngineError::LimitExceeded("email too long"));
    }
    Ok(())
}

fn validate_hours(start: NaiveTime, end: NaiveTime) -> Result<(), EngineError> {
    if start >= end {
        return Err(EngineError::InvalidHours { start, end });
    }
    Ok(())
}

/// Patients and doctors may only touch their own appointments.
fn check_participant(actor: Actor, appt: &Appointment) -> Result<(), EngineError> {
    let allowed = match actor {
        Actor::Patient(id) => appt.patient_id == id,
        Actor::Doctor(id) => appt.doctor_id == id,
        Actor::Admin(_) => true,
    };
    if allowed {
        Ok(())
    } else {
        Err(EngineError::NotParticipant(appt.id))
    }
}

fn check_transition(appt: &Appointment, to: AppointmentStatus) -> Result<(), EngineError> {
    if !appt.status.can_transition_to(to) {
        return Err(EngineError::InvalidTransition {
            id: appt.id,
            from: appt.status,
            to,
        });
    }
    Ok(())
}

impl Engine {
    // ── Registry ─────────────────────────────────────────────

    pub async fn register_doctor(
        &self,
        id: DoctorId,
        name: &str,
        specialization: &str,
        email: &str,
    ) -> Result<Doctor, EngineError> {
        validate_name(name)?;
        validate_name(specialization)?;
        validate_email(email)?;
        let _registry = self.store.registry.write().await;
        if self.store.doctor_count() >= MAX_DOCTORS {
            return Err(EngineError::LimitExceeded("too many doctors"));
        }
        if self.store.contains_doctor(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let doctor = Doctor {
            id,
            name: name.to_string(),
            specialization: specialization.to_string(),
            email: email.to_string(),
            active: true,
        };
        self.journal_append(&Event::DoctorRegistered { doctor: doctor.clone() })
            .await?;
        self.store.insert_doctor(doctor.clone());
        info!(doctor = %id, specialization, "doctor registered");
        Ok(doctor)
    }

    /// Inactive doctors keep their schedule and appointments but admit no new bookings.
    pub async fn set_doctor_active(&self, id: DoctorId, active: bool) -> Result<(), EngineError> {
        let mut guard = self.doctor_write(&id).await?;
        if guard.doctor.active == active {
            return Ok(());
        }
        let event = Event::DoctorActivationChanged { id, active };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(doctor = %id, active, "doctor activation changed");
        Ok(())
    }

    pub async fn register_patient(
        &self,
        id: PatientId,
        name: &str,
        email: &str,
    ) -> Result<Patient, EngineError> {
        validate_name(name)?;
        validate_email(email)?;
        let _registry = self.store.registry.write().await;
        if self.store.patient_count() >= MAX_PATIENTS {
            return Err(EngineError::LimitExceeded("too many patients"));
        }
        if self.store.get_patient(&id).is_some() {
            return Err(EngineError::AlreadyExists(id));
        }

        let patient = Patient {
            id,
            name: name.to_string(),
            email: email.to_string(),
        };
        self.journal_append(&Event::PatientRegistered { patient: patient.clone() })
            .await?;
        self.store.insert_patient(patient.clone());
        Ok(patient)
    }

    // ── Recurring availability ───────────────────────────────

    pub async fn add_availability(
        &self,
        id: Ulid,
        doctor_id: DoctorId,
        day: Weekday,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<RecurringAvailability, EngineError> {
        validate_hours(start, end)?;
        if self.store.doctor_for_availability(&id).is_some() {
            return Err(EngineError::AlreadyExists(id));
        }
        let mut guard = self.doctor_write(&doctor_id).await?;
        if let Some(existing) = guard.hours_on(day) {
            return Err(EngineError::AlreadyExists(existing.id));
        }

        let availability = RecurringAvailability {
            id,
            doctor_id,
            day,
            start,
            end,
        };
        if !self.store.reserve_availability(id, doctor_id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let event = Event::AvailabilityAdded {
            availability: availability.clone(),
        };
        if let Err(e) = self.persist_and_apply(&mut guard, &event).await {
            self.store.release_availability(&id);
            return Err(e);
        }
        Ok(availability)
    }

    pub async fn update_availability(
        &self,
        id: Ulid,
        day: Weekday,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<RecurringAvailability, EngineError> {
        validate_hours(start, end)?;
        let doctor_id = self
            .store
            .doctor_for_availability(&id)
            .ok_or(EngineError::NotFound(id))?;
        let mut guard = self.doctor_write(&doctor_id).await?;
        if !guard.weekly.iter().any(|a| a.id == id) {
            return Err(EngineError::NotFound(id));
        }
        if let Some(clash) = guard.weekly.iter().find(|a| a.day == day && a.id != id) {
            return Err(EngineError::AlreadyExists(clash.id));
        }

        let event = Event::AvailabilityUpdated {
            id,
            doctor_id,
            day,
            start,
            end,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(RecurringAvailability {
            id,
            doctor_id,
            day,
            start,
            end,
        })
    }

    pub async fn remove_availability(&self, id: Ulid) -> Result<(), EngineError> {
        let doctor_id = self
            .store
            .doctor_for_availability(&id)
            .ok_or(EngineError::NotFound(id))?;
        let mut guard = self.doctor_write(&doctor_id).await?;
        let event = Event::AvailabilityRemoved { id, doctor_id };
        self.persist_and_apply(&mut guard, &event).await
    }

    // ── Appointment lifecycle ────────────────────────────────

    /// Cancel one appointment. The stored reason depends on who cancels.
    pub async fn cancel_appointment(
        &self,
        actor: Actor,
        id: AppointmentId,
    ) -> Result<Appointment, EngineError> {
        let mut guard = self.resolve_appointment_write(&id).await?;
        let appt = guard.appointment(id).cloned().ok_or(EngineError::NotFound(id))?;
        check_participant(actor, &appt)?;
        check_transition(&appt, AppointmentStatus::Cancelled)?;

        let by = actor.role();
        let reason = match by {
            Role::Patient => PATIENT_CANCEL_REASON,
            Role::Doctor => DOCTOR_UNAVAILABLE_REASON,
            Role::Admin => ADMIN_CANCEL_REASON,
        };
        let event = Event::AppointmentCancelled {
            id,
            doctor_id: appt.doctor_id,
            reason: reason.to_string(),
            canceled_by: by,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(CANCELLATIONS_TOTAL, "by" => role_label(by)).increment(1);
        info!(appointment = %id, %by, "appointment cancelled");
        guard.appointment(id).cloned().ok_or(EngineError::NotFound(id))
    }

    pub async fn mark_missed(&self, actor: Actor, id: AppointmentId) -> Result<Appointment, EngineError> {
        self.close_appointment(actor, id, AppointmentStatus::Missed).await
    }

    /// Close a Pending visit as attended.
    pub async fn mark_completed(&self, actor: Actor, id: AppointmentId) -> Result<Appointment, EngineError> {
        self.close_appointment(actor, id, AppointmentStatus::Completed).await
    }

    async fn close_appointment(
        &self,
        actor: Actor,
        id: AppointmentId,
        to: AppointmentStatus,
    ) -> Result<Appointment, EngineError> {
        let mut guard = self.resolve_appointment_write(&id).await?;
        let appt = guard.appointment(id).cloned().ok_or(EngineError::NotFound(id))?;
        if let Actor::Patient(_) = actor {
            return Err(EngineError::NotParticipant(id));
        }
        check_participant(actor, &appt)?;
        check_transition(&appt, to)?;

        let event = match to {
            AppointmentStatus::Missed => Event::AppointmentMissed {
                id,
                doctor_id: appt.doctor_id,
            },
            _ => Event::AppointmentCompleted {
                id,
                doctor_id: appt.doctor_id,
            },
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(appointment = %id, status = %to, "appointment closed");
        guard.appointment(id).cloned().ok_or(EngineError::NotFound(id))
    }

    // ── Journal maintenance ──────────────────────────────────

    /// Rewrite the journal as the minimal event list that rebuilds current
    /// state. Holds the registry lock, every doctor's read lock, then the
    /// closure lock, while the snapshot is taken and installed.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let _registry = self.store.registry.write().await;
        let doctors = self.store.doctors_sorted();
        let mut guards = Vec::with_capacity(doctors.len());
        for (_, ds) in &doctors {
            guards.push(ds.read().await);
        }
        let closures = self.store.closures.read().await;

        let mut events = Vec::new();
        for patient in self.store.patients_sorted() {
            events.push(Event::PatientRegistered { patient });
        }
        for guard in &guards {
            events.push(Event::DoctorRegistered {
                doctor: guard.doctor.clone(),
            });
            for availability in &guard.weekly {
                events.push(Event::AvailabilityAdded {
                    availability: availability.clone(),
                });
            }
            for record in &guard.unavailability {
                events.push(Event::UnavailabilityReported {
                    record: Unavailability::Doctor(record.clone()),
                    cancelled: Vec::new(),
                    cancellation_reason: String::new(),
                    canceled_by: match record.reported_by {
                        ReportedBy::Doctor => Role::Doctor,
                        ReportedBy::Admin(_) => Role::Admin,
                    },
                });
            }
            // Bookings carry their current status, so no lifecycle events are needed.
            for appointment in &guard.appointments {
                events.push(Event::AppointmentBooked {
                    appointment: appointment.clone(),
                });
            }
        }
        for closure in closures.iter() {
            events.push(Event::UnavailabilityReported {
                record: Unavailability::HospitalWide(closure.clone()),
                cancelled: Vec::new(),
                cancellation_reason: String::new(),
                canceled_by: Role::Admin,
            });
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))?;
        info!(events = count, "journal compacted");
        Ok(())
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
