use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Weekday};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedDoctorState = Arc<RwLock<DoctorState>>;

/// Everything the engine knows about one doctor. The per-doctor lock around
/// this is the serialization point for that doctor's slots.
#[derive(Debug, Clone)]
pub struct DoctorState {
    pub doctor: Doctor,
    /// Insertion order. Lookups take the first record for a weekday.
    pub weekly: Vec<RecurringAvailability>,
    /// Doctor-scoped unavailability, sorted by date.
    pub unavailability: Vec<DoctorUnavailability>,
    /// Sorted by `(date, time_slot)`; equal keys keep booking order.
    pub appointments: Vec<Appointment>,
}

impl DoctorState {
    pub fn new(doctor: Doctor) -> Self {
        Self {
            doctor,
            weekly: Vec::new(),
            unavailability: Vec::new(),
            appointments: Vec::new(),
        }
    }

    pub fn id(&self) -> DoctorId {
        self.doctor.id
    }

    pub fn hours_on(&self, day: Weekday) -> Option<&RecurringAvailability> {
        self.weekly.iter().find(|a| a.day == day)
    }

    pub fn is_unavailable_on(&self, date: NaiveDate) -> bool {
        self.unavailability_on(date).next().is_some()
    }

    pub fn unavailability_on(&self, date: NaiveDate) -> impl Iterator<Item = &DoctorUnavailability> {
        let lo = self.unavailability.partition_point(|u| u.date < date);
        self.unavailability[lo..].iter().take_while(move |u| u.date == date)
    }

    pub fn insert_unavailability(&mut self, record: DoctorUnavailability) {
        let pos = self.unavailability.partition_point(|u| u.date <= record.date);
        self.unavailability.insert(pos, record);
    }

    pub fn insert_appointment(&mut self, appt: Appointment) {
        let key = (appt.date, appt.time_slot);
        let pos = self
            .appointments
            .partition_point(|a| (a.date, a.time_slot) <= key);
        self.appointments.insert(pos, appt);
    }

    /// Every appointment on `date`, ordered by slot. Binary search skips the rest.
    pub fn on_date(&self, date: NaiveDate) -> &[Appointment] {
        let lo = self.appointments.partition_point(|a| a.date < date);
        let hi = self.appointments.partition_point(|a| a.date <= date);
        &self.appointments[lo..hi]
    }

    pub fn pending_at(&self, date: NaiveDate, slot: NaiveTime) -> usize {
        self.on_date(date)
            .iter()
            .filter(|a| a.time_slot == slot && a.is_pending())
            .count()
    }

    pub fn appointment(&self, id: Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    fn appointment_mut(&mut self, id: Ulid) -> Option<&mut Appointment> {
        self.appointments.iter_mut().find(|a| a.id == id)
    }

    fn set_status(&mut self, id: Ulid, status: AppointmentStatus) {
        if let Some(appt) = self.appointment_mut(id) {
            appt.status = status;
        }
    }

    /// Cancel whichever of `ids` belong to this doctor.
    fn cancel_all(&mut self, ids: &[AppointmentId], reason: &str, by: Role) {
        for appt in self.appointments.iter_mut() {
            if ids.contains(&appt.id) {
                appt.status = AppointmentStatus::Cancelled;
                appt.cancellation_reason = Some(reason.to_string());
                appt.canceled_by = Some(by);
            }
        }
    }

    /// Apply a doctor-scoped event. The caller holds this doctor's write lock.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::DoctorActivationChanged { active, .. } => {
                self.doctor.active = *active;
            }
            Event::AvailabilityAdded { availability } => {
                self.weekly.push(availability.clone());
            }
            Event::AvailabilityUpdated {
                id, day, start, end, ..
            } => {
                if let Some(a) = self.weekly.iter_mut().find(|a| a.id == *id) {
                    a.day = *day;
                    a.start = *start;
                    a.end = *end;
                }
            }
            Event::AvailabilityRemoved { id, .. } => {
                self.weekly.retain(|a| a.id != *id);
            }
            Event::AppointmentBooked { appointment } => {
                self.insert_appointment(appointment.clone());
            }
            Event::AppointmentCancelled {
                id,
                reason,
                canceled_by,
                ..
            } => {
                self.cancel_all(std::slice::from_ref(id), reason, *canceled_by);
            }
            Event::AppointmentCompleted { id, .. } => {
                self.set_status(*id, AppointmentStatus::Completed);
            }
            Event::AppointmentMissed { id, .. } => {
                self.set_status(*id, AppointmentStatus::Missed);
            }
            Event::UnavailabilityReported {
                record,
                cancelled,
                cancellation_reason,
                canceled_by,
            } => {
                if let Unavailability::Doctor(u) = record
                    && u.doctor_id == self.id()
                {
                    self.insert_unavailability(u.clone());
                }
                self.cancel_all(cancelled, cancellation_reason, *canceled_by);
            }
            // Registry events are handled by the store, not per doctor
            Event::DoctorRegistered { .. } | Event::PatientRegistered { .. } => {}
        }
    }
}

/// Doctor an event belongs to, for events scoped to a single doctor.
pub fn event_doctor_id(event: &Event) -> Option<DoctorId> {
    match event {
        Event::DoctorActivationChanged { id, .. } => Some(*id),
        Event::AvailabilityAdded { availability } => Some(availability.doctor_id),
        Event::AvailabilityUpdated { doctor_id, .. }
        | Event::AvailabilityRemoved { doctor_id, .. }
        | Event::AppointmentCancelled { doctor_id, .. }
        | Event::AppointmentCompleted { doctor_id, .. }
        | Event::AppointmentMissed { doctor_id, .. } => Some(*doctor_id),
        Event::AppointmentBooked { appointment } => Some(appointment.doctor_id),
        Event::UnavailabilityReported { record, .. } => record.doctor_id(),
        Event::DoctorRegistered { .. } | Event::PatientRegistered { .. } => None,
    }
}

fn reserve<V>(index: &DashMap<Ulid, V>, id: Ulid, value: V) -> bool {
    match index.entry(id) {
        Entry::Occupied(_) => false,
        Entry::Vacant(slot) => {
            slot.insert(value);
            true
        }
    }
}

/// The availability store: doctors, patients, closures, and id indexes.
pub struct AvailabilityStore {
    doctors: DashMap<DoctorId, SharedDoctorState>,
    patients: DashMap<PatientId, Patient>,
    /// Hospital-wide closures. Always locked after any doctor lock.
    pub(crate) closures: RwLock<Vec<HospitalClosure>>,
    /// Registrations hold this; compaction takes it before any doctor lock.
    pub(crate) registry: RwLock<()>,
    /// appointment id → doctor id
    appointment_index: DashMap<AppointmentId, DoctorId>,
    /// recurring availability id → doctor id
    availability_index: DashMap<Ulid, DoctorId>,
    /// unavailability record id → doctor id (None for hospital-wide)
    unavailability_index: DashMap<Ulid, Option<DoctorId>>,
}

impl Default for AvailabilityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AvailabilityStore {
    pub fn new() -> Self {
        Self {
            doctors: DashMap::new(),
            patients: DashMap::new(),
            closures: RwLock::new(Vec::new()),
            registry: RwLock::new(()),
            appointment_index: DashMap::new(),
            availability_index: DashMap::new(),
            unavailability_index: DashMap::new(),
        }
    }

    // ── Doctors ──────────────────────────────────────────────

    pub fn doctor_count(&self) -> usize {
        self.doctors.len()
    }

    pub fn contains_doctor(&self, id: &DoctorId) -> bool {
        self.doctors.contains_key(id)
    }

    pub fn get_doctor(&self, id: &DoctorId) -> Option<SharedDoctorState> {
        self.doctors.get(id).map(|e| e.value().clone())
    }

    pub fn insert_doctor(&self, doctor: Doctor) {
        self.doctors
            .insert(doctor.id, Arc::new(RwLock::new(DoctorState::new(doctor))));
    }

    /// All doctors in ascending id order, which is the lock acquisition order.
    pub fn doctors_sorted(&self) -> Vec<(DoctorId, SharedDoctorState)> {
        let mut all: Vec<_> = self
            .doctors
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    // ── Patients ─────────────────────────────────────────────

    pub fn patient_count(&self) -> usize {
        self.patients.len()
    }

    pub fn get_patient(&self, id: &PatientId) -> Option<Patient> {
        self.patients.get(id).map(|e| e.value().clone())
    }

    pub fn insert_patient(&self, patient: Patient) {
        self.patients.insert(patient.id, patient);
    }

    pub fn patients_sorted(&self) -> Vec<Patient> {
        let mut all: Vec<Patient> = self.patients.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|p| p.id);
        all
    }

    // ── Indexes ──────────────────────────────────────────────

    pub fn doctor_for_appointment(&self, id: &AppointmentId) -> Option<DoctorId> {
        self.appointment_index.get(id).map(|e| *e.value())
    }

    pub fn doctor_for_availability(&self, id: &Ulid) -> Option<DoctorId> {
        self.availability_index.get(id).map(|e| *e.value())
    }

    pub fn contains_unavailability(&self, id: &Ulid) -> bool {
        self.unavailability_index.contains_key(id)
    }

    /// Claim `id` for `doctor_id`. False if the id is already taken, whether
    /// committed or claimed by a write still in flight.
    pub fn reserve_appointment(&self, id: AppointmentId, doctor_id: DoctorId) -> bool {
        reserve(&self.appointment_index, id, doctor_id)
    }

    pub fn release_appointment(&self, id: &AppointmentId) {
        self.appointment_index.remove(id);
    }

    pub fn reserve_availability(&self, id: Ulid, doctor_id: DoctorId) -> bool {
        reserve(&self.availability_index, id, doctor_id)
    }

    pub fn release_availability(&self, id: &Ulid) {
        self.availability_index.remove(id);
    }

    pub fn reserve_unavailability(&self, id: Ulid, doctor_id: Option<DoctorId>) -> bool {
        reserve(&self.unavailability_index, id, doctor_id)
    }

    pub fn release_unavailability(&self, id: &Ulid) {
        self.unavailability_index.remove(id);
    }

    /// Keep id indexes in step with an applied event.
    pub fn index_event(&self, event: &Event) {
        match event {
            Event::AppointmentBooked { appointment } => {
                self.appointment_index
                    .insert(appointment.id, appointment.doctor_id);
            }
            Event::AvailabilityAdded { availability } => {
                self.availability_index
                    .insert(availability.id, availability.doctor_id);
            }
            Event::AvailabilityRemoved { id, .. } => {
                self.availability_index.remove(id);
            }
            Event::UnavailabilityReported { record, .. } => {
                self.unavailability_index
                    .insert(record.id(), record.doctor_id());
            }
            _ => {}
        }
    }
}
