use chrono::{Datelike, Days, NaiveDate};

use crate::limits::MAX_HORIZON_DAYS;
use crate::model::*;

use super::store::DoctorState;
use super::{Engine, EngineError};

/// How one date in the window is presented to a booking patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateClass {
    HospitalClosed,
    DoctorUnavailable,
    AlreadyBooked,
    Available,
}

/// First match wins: closures outrank everything, then the doctor's own
/// unavailability, then any booking of the patient's with this doctor
/// (whatever its status), then weekly hours.
pub fn classify_date(
    doctor: Option<&DoctorState>,
    closures: &[HospitalClosure],
    patient_id: PatientId,
    date: NaiveDate,
) -> Option<DateClass> {
    if closures.iter().any(|c| c.date == date) {
        return Some(DateClass::HospitalClosed);
    }
    let doctor = doctor?;
    if doctor.is_unavailable_on(date) {
        return Some(DateClass::DoctorUnavailable);
    }
    if doctor.on_date(date).iter().any(|a| a.patient_id == patient_id) {
        return Some(DateClass::AlreadyBooked);
    }
    doctor
        .hours_on(date.weekday())
        .map(|_| DateClass::Available)
}

/// Bucket every date in `[today, today + window_days)`. The auxiliary
/// "appointments with other doctors" list is left empty here.
pub fn classify_horizon(
    doctor: Option<&DoctorState>,
    closures: &[HospitalClosure],
    patient_id: PatientId,
    today: NaiveDate,
    window_days: u32,
) -> HorizonReport {
    let mut report = HorizonReport::default();
    for offset in 0..window_days {
        let Some(date) = today.checked_add_days(Days::new(offset as u64)) else {
            break;
        };
        match classify_date(doctor, closures, patient_id, date) {
            Some(DateClass::HospitalClosed) => report.hospital_closed.push(date),
            Some(DateClass::DoctorUnavailable) => report.doctor_unavailable.push(date),
            Some(DateClass::AlreadyBooked) => report.already_booked_with_doctor.push(date),
            Some(DateClass::Available) => report.available_dates.push(date),
            None => {}
        }
    }
    report
}

impl Engine {
    pub async fn resolve_horizon(
        &self,
        doctor_id: DoctorId,
        patient_id: PatientId,
        today: NaiveDate,
        window_days: u32,
    ) -> Result<HorizonReport, EngineError> {
        if window_days > MAX_HORIZON_DAYS {
            return Err(EngineError::LimitExceeded("horizon window too wide"));
        }

        let mut report = match self.store.get_doctor(&doctor_id) {
            Some(ds) => {
                let guard = ds.read().await;
                let closures = self.store.closures.read().await;
                classify_horizon(Some(&guard), &closures, patient_id, today, window_days)
            }
            None => {
                let closures = self.store.closures.read().await;
                classify_horizon(None, &closures, patient_id, today, window_days)
            }
        };

        report.patient_appointments_with_others =
            self.patient_slots_elsewhere(patient_id, doctor_id).await;
        Ok(report)
    }

    /// Horizon from the engine clock's today over the configured window.
    pub async fn resolve_horizon_from_today(
        &self,
        doctor_id: DoctorId,
        patient_id: PatientId,
    ) -> Result<HorizonReport, EngineError> {
        let today = self.clock.today();
        self.resolve_horizon(doctor_id, patient_id, today, self.horizon_days)
            .await
    }

    /// Appointments of any status the patient holds with anyone but
    /// `doctor_id`. Informational only; it never blocks a booking.
    async fn patient_slots_elsewhere(
        &self,
        patient_id: PatientId,
        doctor_id: DoctorId,
    ) -> Vec<BookedSlot> {
        let mut slots = Vec::new();
        for (id, ds) in self.store.doctors_sorted() {
            if id == doctor_id {
                continue;
            }
            let guard = ds.read().await;
            slots.extend(
                guard
                    .appointments
                    .iter()
                    .filter(|a| a.patient_id == patient_id)
                    .map(|a| BookedSlot {
                        date: a.date,
                        time_slot: a.time_slot,
                    }),
            );
        }
        slots.sort_by_key(|s| (s.date, s.time_slot));
        slots
    }
}
