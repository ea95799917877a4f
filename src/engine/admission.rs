use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, info};

use crate::limits::MAX_APPOINTMENTS_PER_DOCTOR;
use crate::model::*;
use crate::observability::BOOKINGS_TOTAL;

use super::slots::generate_slots;
use super::{Engine, EngineError};

fn record_outcome(outcome: &'static str) {
    metrics::counter!(BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
}

impl Engine {
    /// Admit a booking iff the slot is currently offered by the generator.
    ///
    /// The generator runs under the doctor's write lock, so two requests for
    /// the last seat in a slot cannot both see it open. Hospital closures are
    /// read under that same lock (doctor first, then closures).
    pub async fn book_appointment(
        &self,
        id: AppointmentId,
        patient_id: PatientId,
        doctor_id: DoctorId,
        date: NaiveDate,
        time_slot: NaiveTime,
    ) -> Result<Appointment, EngineError> {
        if self.store.get_patient(&patient_id).is_none() {
            record_outcome("rejected");
            return Err(EngineError::NotFound(patient_id));
        }
        if self.store.doctor_for_appointment(&id).is_some() {
            record_outcome("rejected");
            return Err(EngineError::AlreadyExists(id));
        }

        let mut guard = match self.doctor_write(&doctor_id).await {
            Ok(guard) => guard,
            Err(e) => {
                record_outcome("rejected");
                return Err(e);
            }
        };

        if !guard.doctor.active {
            record_outcome("rejected");
            return Err(EngineError::DoctorInactive(doctor_id));
        }
        if guard.appointments.len() >= MAX_APPOINTMENTS_PER_DOCTOR {
            record_outcome("rejected");
            return Err(EngineError::LimitExceeded("too many appointments for doctor"));
        }

        let offered = {
            let closures = self.store.closures.read().await;
            generate_slots(&guard, &closures, date)
        };
        if !offered.contains(&time_slot) {
            debug!(%doctor_id, %date, slot = %time_slot.format("%H:%M"), "slot not offered");
            record_outcome("slot_unavailable");
            return Err(EngineError::SlotUnavailable {
                doctor: doctor_id,
                date,
                slot: time_slot,
            });
        }

        // The early id check ran unlocked; a booking for another doctor may
        // have claimed the id since.
        if !self.store.reserve_appointment(id, doctor_id) {
            record_outcome("rejected");
            return Err(EngineError::AlreadyExists(id));
        }
        let appointment = Appointment::pending(id, patient_id, doctor_id, date, time_slot);
        let event = Event::AppointmentBooked {
            appointment: appointment.clone(),
        };
        if let Err(e) = self.persist_and_apply(&mut guard, &event).await {
            self.store.release_appointment(&id);
            return Err(e);
        }

        record_outcome("admitted");
        info!(
            appointment = %id,
            %doctor_id,
            %patient_id,
            %date,
            slot = %time_slot.format("%H:%M"),
            "appointment booked"
        );
        Ok(appointment)
    }
}
