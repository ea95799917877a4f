use std::collections::BTreeSet;

use chrono::{NaiveDate, Weekday};

use crate::model::*;
use crate::notify::Notification;

use super::{Engine, EngineError};

const ALL_DAYS: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

fn sort_appointments(appointments: &mut [Appointment]) {
    appointments.sort_by_key(|a| (a.date, a.time_slot, a.id));
}

pub fn reminder_body(patient: &Patient, doctor: &Doctor, appt: &Appointment) -> String {
    format!(
        "Dear {},\n\nThis is a friendly reminder about your upcoming appointment with Dr. {} on {} at {}.\n\
         Please arrive 10-15 minutes early and bring any necessary documents.\n\n\
         Best regards,\nHospital Admin",
        patient.name,
        doctor.name,
        appt.date.format("%d %b %Y"),
        appt.time_slot.format("%H:%M"),
    )
}

impl Engine {
    // ── Doctors ──────────────────────────────────────────────

    /// Every doctor ordered by name, then id.
    pub async fn list_doctors(&self) -> Vec<Doctor> {
        let mut doctors = Vec::with_capacity(self.store.doctor_count());
        for (_, ds) in self.store.doctors_sorted() {
            doctors.push(ds.read().await.doctor.clone());
        }
        doctors.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        doctors
    }

    pub async fn doctor(&self, id: DoctorId) -> Option<Doctor> {
        let ds = self.store.get_doctor(&id)?;
        let guard = ds.read().await;
        Some(guard.doctor.clone())
    }

    /// Case-insensitive match on specialization.
    pub async fn doctors_by_specialization(&self, specialization: &str) -> Vec<Doctor> {
        let wanted = specialization.to_lowercase();
        self.list_doctors()
            .await
            .into_iter()
            .filter(|d| d.specialization.to_lowercase() == wanted)
            .collect()
    }

    /// Distinct specializations, sorted.
    pub async fn specializations(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .list_doctors()
            .await
            .into_iter()
            .map(|d| d.specialization)
            .collect();
        set.into_iter().collect()
    }

    pub fn patient(&self, id: PatientId) -> Option<Patient> {
        self.store.get_patient(&id)
    }

    // ── Weekly schedule ──────────────────────────────────────

    /// Sunday first, then by start time.
    pub async fn weekly_schedule(&self, doctor_id: DoctorId) -> Result<Vec<RecurringAvailability>, EngineError> {
        let ds = self
            .store
            .get_doctor(&doctor_id)
            .ok_or(EngineError::NotFound(doctor_id))?;
        let mut weekly = ds.read().await.weekly.clone();
        weekly.sort_by_key(|a| (day_index(a.day), a.start));
        Ok(weekly)
    }

    /// Days of the week that have no recurring hours yet.
    pub async fn open_days(&self, doctor_id: DoctorId) -> Result<Vec<Weekday>, EngineError> {
        let ds = self
            .store
            .get_doctor(&doctor_id)
            .ok_or(EngineError::NotFound(doctor_id))?;
        let guard = ds.read().await;
        Ok(ALL_DAYS
            .into_iter()
            .filter(|day| guard.hours_on(*day).is_none())
            .collect())
    }

    // ── Appointments ─────────────────────────────────────────

    pub async fn appointment(&self, id: AppointmentId) -> Option<Appointment> {
        let doctor_id = self.store.doctor_for_appointment(&id)?;
        let ds = self.store.get_doctor(&doctor_id)?;
        let guard = ds.read().await;
        guard.appointment(id).cloned()
    }

    pub async fn appointments_for_doctor(
        &self,
        doctor_id: DoctorId,
        filter: AppointmentFilter,
    ) -> Result<Vec<Appointment>, EngineError> {
        let ds = self
            .store
            .get_doctor(&doctor_id)
            .ok_or(EngineError::NotFound(doctor_id))?;
        let guard = ds.read().await;
        let mut out: Vec<Appointment> = guard
            .appointments
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        sort_appointments(&mut out);
        Ok(out)
    }

    pub async fn appointments_for_patient(
        &self,
        patient_id: PatientId,
        filter: AppointmentFilter,
    ) -> Result<Vec<Appointment>, EngineError> {
        if self.store.get_patient(&patient_id).is_none() {
            return Err(EngineError::NotFound(patient_id));
        }
        let mut out = Vec::new();
        for (_, ds) in self.store.doctors_sorted() {
            let guard = ds.read().await;
            out.extend(
                guard
                    .appointments
                    .iter()
                    .filter(|a| a.patient_id == patient_id && filter.matches(a))
                    .cloned(),
            );
        }
        sort_appointments(&mut out);
        Ok(out)
    }

    pub async fn all_appointments(&self, filter: AppointmentFilter) -> Vec<Appointment> {
        let mut out = Vec::new();
        for (_, ds) in self.store.doctors_sorted() {
            let guard = ds.read().await;
            out.extend(guard.appointments.iter().filter(|a| filter.matches(a)).cloned());
        }
        sort_appointments(&mut out);
        out
    }

    // ── Unavailability ───────────────────────────────────────

    /// Every hospital closure and doctor record, ordered by date.
    pub async fn unavailabilities(&self) -> Vec<Unavailability> {
        let mut out = Vec::new();
        for (_, ds) in self.store.doctors_sorted() {
            let guard = ds.read().await;
            out.extend(guard.unavailability.iter().cloned().map(Unavailability::Doctor));
        }
        {
            let closures = self.store.closures.read().await;
            out.extend(closures.iter().cloned().map(Unavailability::HospitalWide));
        }
        out.sort_by_key(|u| (u.date(), u.id()));
        out
    }

    // ── Dashboard ────────────────────────────────────────────

    pub async fn stats(&self, today: NaiveDate) -> Stats {
        let mut stats = Stats {
            doctors: self.store.doctor_count(),
            patients: self.store.patient_count(),
            ..Stats::default()
        };
        for (_, ds) in self.store.doctors_sorted() {
            let guard = ds.read().await;
            if guard.doctor.active {
                stats.active_doctors += 1;
            }
            stats.appointments += guard.appointments.len();
            for appt in &guard.appointments {
                match appt.status {
                    AppointmentStatus::Pending => {
                        stats.pending += 1;
                        if appt.date == today {
                            stats.pending_today += 1;
                        }
                    }
                    AppointmentStatus::Completed => stats.completed += 1,
                    AppointmentStatus::Cancelled => stats.cancelled += 1,
                    AppointmentStatus::Missed => stats.missed += 1,
                }
            }
        }
        stats
    }

    // ── Reminders ────────────────────────────────────────────

    /// One reminder per Pending appointment on `day`, addressed to the patient.
    pub async fn upcoming_reminders(&self, day: NaiveDate) -> Vec<Notification> {
        let mut out = Vec::new();
        for (_, ds) in self.store.doctors_sorted() {
            let guard = ds.read().await;
            for appt in guard.on_date(day).iter().filter(|a| a.is_pending()) {
                let Some(patient) = self.store.get_patient(&appt.patient_id) else {
                    continue;
                };
                if patient.email.is_empty() {
                    continue;
                }
                out.push(Notification {
                    recipient: patient.email.clone(),
                    subject: "Appointment Reminder".into(),
                    body: reminder_body(&patient, &guard.doctor, appt),
                });
            }
        }
        out
    }
}
