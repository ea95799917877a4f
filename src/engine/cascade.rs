use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::NaiveDate;
use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::MAX_REASON_LEN;
use crate::model::*;
use crate::notify::Notification;
use crate::observability::{CASCADE_SIZE, UNAVAILABILITY_REPORTS_TOTAL};

use super::{Engine, EngineError};

/// Persisted on every appointment a doctor's self-report cancels, in place
/// of the doctor's free-text reason.
pub const DOCTOR_UNAVAILABLE_REASON: &str = "Doctor is not available";

const DATE_FORMAT: &str = "%d %b %Y";
const SLOT_FORMAT: &str = "%H:%M";

/// Outcome of one unavailability report. Notifications are returned for the
/// caller to dispatch; the cascade never does I/O beyond the journal.
#[derive(Debug, Clone)]
pub struct CascadeResult {
    pub record: Unavailability,
    /// Appointments as they are after cancellation.
    pub cancelled: Vec<Appointment>,
    /// Patient payloads first (by patient id), then doctor payloads.
    pub notifications: Vec<Notification>,
}

/// A cancelled appointment with both participants resolved.
#[derive(Debug, Clone)]
pub struct Affected {
    pub appointment: Appointment,
    pub doctor: Doctor,
    pub patient: Patient,
}

/// One payload per distinct patient with an email address. Framing depends
/// on who caused it.
pub fn patient_notifications(
    by: Role,
    date: NaiveDate,
    reason: &str,
    affected: &[Affected],
) -> Vec<Notification> {
    let mut by_patient: BTreeMap<PatientId, Vec<&Affected>> = BTreeMap::new();
    for a in affected.iter().filter(|a| !a.patient.email.is_empty()) {
        by_patient.entry(a.patient.id).or_default().push(a);
    }

    let day = date.format(DATE_FORMAT);
    by_patient
        .into_values()
        .map(|mut group| {
            group.sort_by_key(|a| a.appointment.time_slot);
            let patient = &group[0].patient;
            let mut body = format!("Dear {},\n\n", patient.name);
            if by == Role::Doctor {
                let _ = writeln!(
                    body,
                    "The following appointment(s) with your doctor have been cancelled because the doctor is unavailable on {day}:"
                );
            } else {
                let _ = writeln!(body, "The hospital has cancelled the following appointment(s) on {day}:");
                let _ = writeln!(body, "Reason: {reason}");
            }
            for a in &group {
                let _ = writeln!(
                    body,
                    "- Doctor: {}, Time: {}",
                    a.doctor.name,
                    a.appointment.time_slot.format(SLOT_FORMAT)
                );
            }
            body.push_str("\nWe apologize for the inconvenience.\nThank you.");
            Notification {
                recipient: patient.email.clone(),
                subject: "Appointment Cancellation Notice".into(),
                body,
            }
        })
        .collect()
}

/// One payload per distinct doctor with an email address, listing the
/// patients who lost a slot.
pub fn doctor_notifications(date: NaiveDate, reason: &str, affected: &[Affected]) -> Vec<Notification> {
    let mut by_doctor: BTreeMap<DoctorId, Vec<&Affected>> = BTreeMap::new();
    for a in affected.iter().filter(|a| !a.doctor.email.is_empty()) {
        by_doctor.entry(a.doctor.id).or_default().push(a);
    }

    let day = date.format(DATE_FORMAT);
    by_doctor
        .into_values()
        .map(|mut group| {
            group.sort_by_key(|a| a.appointment.time_slot);
            let doctor = &group[0].doctor;
            let mut body = format!(
                "Dear Dr. {},\n\nYour appointments on {day} have been cancelled due to:\n{reason}\n\n",
                doctor.name
            );
            for a in &group {
                let _ = writeln!(
                    body,
                    "- Patient: {}, Time: {}",
                    a.patient.name,
                    a.appointment.time_slot.format(SLOT_FORMAT)
                );
            }
            body.push_str("\nRegards,\nHospital Admin");
            Notification {
                recipient: doctor.email.clone(),
                subject: format!("Appointment Cancellations on {day}"),
                body,
            }
        })
        .collect()
}

/// Check the actor/target pair and settle which doctor (if any) is closed.
fn resolve_target(actor: Actor, target: Option<DoctorId>) -> Result<Option<DoctorId>, EngineError> {
    match (actor, target) {
        (Actor::Patient(_), _) => Err(EngineError::InvalidUnavailabilityTarget(
            "patients cannot report unavailability".into(),
        )),
        (Actor::Doctor(me), None) => Ok(Some(me)),
        (Actor::Doctor(me), Some(other)) if other == me => Ok(Some(me)),
        (Actor::Doctor(me), Some(other)) => Err(EngineError::InvalidUnavailabilityTarget(format!(
            "doctor {me} cannot report unavailability for doctor {other}"
        ))),
        (Actor::Admin(_), target) => Ok(target),
    }
}

impl Engine {
    /// Record an unavailability and cancel every Pending appointment it hits.
    ///
    /// Doctor-scoped reports run under that doctor's write lock. Hospital-wide
    /// reports take every doctor's write lock in ascending id order and then
    /// the closure lock, so no reader sees a half-applied cascade. Either way
    /// the record and its cancellations are one journal event.
    pub async fn report_unavailability(
        &self,
        id: Ulid,
        actor: Actor,
        target: Option<DoctorId>,
        date: NaiveDate,
        reason: &str,
    ) -> Result<CascadeResult, EngineError> {
        if reason.len() > MAX_REASON_LEN {
            return Err(EngineError::LimitExceeded("reason too long"));
        }
        let target = resolve_target(actor, target)?;
        if self.store.contains_unavailability(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let by = actor.role();
        let cancellation_reason = match by {
            Role::Doctor => DOCTOR_UNAVAILABLE_REASON.to_string(),
            _ => reason.to_string(),
        };

        let (record, cancelled) = match target {
            Some(doctor_id) => {
                let mut guard = self.doctor_write(&doctor_id).await?;
                let reported_by = match actor {
                    Actor::Admin(admin) => ReportedBy::Admin(admin),
                    _ => ReportedBy::Doctor,
                };
                let record = Unavailability::Doctor(DoctorUnavailability {
                    id,
                    doctor_id,
                    date,
                    reason: reason.to_string(),
                    reported_by,
                });
                let ids: Vec<AppointmentId> = guard
                    .on_date(date)
                    .iter()
                    .filter(|a| a.is_pending())
                    .map(|a| a.id)
                    .collect();
                if !self.store.reserve_unavailability(id, Some(doctor_id)) {
                    return Err(EngineError::AlreadyExists(id));
                }
                let event = Event::UnavailabilityReported {
                    record: record.clone(),
                    cancelled: ids.clone(),
                    cancellation_reason: cancellation_reason.clone(),
                    canceled_by: by,
                };
                if let Err(e) = self.persist_and_apply(&mut guard, &event).await {
                    self.store.release_unavailability(&id);
                    return Err(e);
                }
                let cancelled: Vec<Appointment> = ids
                    .iter()
                    .filter_map(|id| guard.appointment(*id).cloned())
                    .collect();
                (record, cancelled)
            }
            None => {
                let Actor::Admin(admin_id) = actor else {
                    return Err(EngineError::InvalidUnavailabilityTarget(
                        "hospital-wide closures require an admin".into(),
                    ));
                };
                let mut guards = Vec::new();
                for (_, ds) in self.store.doctors_sorted() {
                    guards.push(ds.write_owned().await);
                }
                let mut closures = self.store.closures.write().await;

                let record = Unavailability::HospitalWide(HospitalClosure {
                    id,
                    admin_id,
                    date,
                    reason: reason.to_string(),
                });
                let ids: Vec<AppointmentId> = guards
                    .iter()
                    .flat_map(|g| g.on_date(date).iter().filter(|a| a.is_pending()).map(|a| a.id))
                    .collect();
                if !self.store.reserve_unavailability(id, None) {
                    return Err(EngineError::AlreadyExists(id));
                }
                let event = Event::UnavailabilityReported {
                    record: record.clone(),
                    cancelled: ids.clone(),
                    cancellation_reason: cancellation_reason.clone(),
                    canceled_by: by,
                };
                if let Err(e) = self.journal_append(&event).await {
                    self.store.release_unavailability(&id);
                    return Err(e);
                }
                if let Unavailability::HospitalWide(closure) = &record {
                    closures.push(closure.clone());
                }
                let mut cancelled = Vec::with_capacity(ids.len());
                for guard in guards.iter_mut() {
                    guard.apply(&event);
                    cancelled.extend(
                        guard
                            .on_date(date)
                            .iter()
                            .filter(|a| ids.contains(&a.id))
                            .cloned(),
                    );
                }
                (record, cancelled)
            }
        };

        let affected = self.resolve_participants(&cancelled).await;
        let mut notifications = patient_notifications(by, date, &cancellation_reason, &affected);
        if by == Role::Admin {
            notifications.extend(doctor_notifications(date, &cancellation_reason, &affected));
        }

        let scope = if target.is_some() { "doctor" } else { "hospital" };
        metrics::counter!(UNAVAILABILITY_REPORTS_TOTAL, "scope" => scope).increment(1);
        metrics::histogram!(CASCADE_SIZE).record(cancelled.len() as f64);
        info!(
            unavailability = %id,
            %date,
            %by,
            scope,
            cancelled = cancelled.len(),
            notifications = notifications.len(),
            "unavailability reported"
        );

        Ok(CascadeResult {
            record,
            cancelled,
            notifications,
        })
    }

    /// Look up doctor and patient for each appointment. Called after every
    /// lock from the cascade is released.
    async fn resolve_participants(&self, appointments: &[Appointment]) -> Vec<Affected> {
        let mut affected = Vec::with_capacity(appointments.len());
        for appt in appointments {
            let Some(patient) = self.store.get_patient(&appt.patient_id) else {
                warn!(appointment = %appt.id, patient = %appt.patient_id, "unknown patient, not notified");
                continue;
            };
            let Some(ds) = self.store.get_doctor(&appt.doctor_id) else {
                continue;
            };
            let doctor = ds.read().await.doctor.clone();
            affected.push(Affected {
                appointment: appt.clone(),
                doctor,
                patient,
            });
        }
        affected
    }
}
