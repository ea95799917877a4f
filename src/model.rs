use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type DoctorId = Ulid;
pub type PatientId = Ulid;
pub type AdminId = Ulid;
pub type AppointmentId = Ulid;

/// Sunday = 0 … Saturday = 6.
pub fn day_index(day: Weekday) -> u8 {
    day.num_days_from_sunday() as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Patient => f.write_str("Patient"),
            Role::Doctor => f.write_str("Doctor"),
            Role::Admin => f.write_str("Admin"),
        }
    }
}

/// Who is calling. Passed explicitly into every engine call that needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actor {
    Patient(PatientId),
    Doctor(DoctorId),
    Admin(AdminId),
}

impl Actor {
    pub fn role(&self) -> Role {
        match self {
            Actor::Patient(_) => Role::Patient,
            Actor::Doctor(_) => Role::Doctor,
            Actor::Admin(_) => Role::Admin,
        }
    }

    pub fn id(&self) -> Ulid {
        match self {
            Actor::Patient(id) | Actor::Doctor(id) | Actor::Admin(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Pending,
    Completed,
    Cancelled,
    Missed,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AppointmentStatus::Pending)
    }

    /// Pending is the only state with outgoing transitions.
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        !self.is_terminal() && next != AppointmentStatus::Pending
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AppointmentStatus::Pending => "Pending",
            AppointmentStatus::Completed => "Completed",
            AppointmentStatus::Cancelled => "Cancelled",
            AppointmentStatus::Missed => "Missed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub patient_id: PatientId,
    pub doctor_id: DoctorId,
    pub date: NaiveDate,
    pub time_slot: NaiveTime,
    pub status: AppointmentStatus,
    pub cancellation_reason: Option<String>,
    pub canceled_by: Option<Role>,
}

impl Appointment {
    pub fn pending(
        id: AppointmentId,
        patient_id: PatientId,
        doctor_id: DoctorId,
        date: NaiveDate,
        time_slot: NaiveTime,
    ) -> Self {
        Self {
            id,
            patient_id,
            doctor_id,
            date,
            time_slot,
            status: AppointmentStatus::Pending,
            cancellation_reason: None,
            canceled_by: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == AppointmentStatus::Pending
    }
}

/// A doctor's standing weekly hours for one day. Slots run `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringAvailability {
    pub id: Ulid,
    pub doctor_id: DoctorId,
    pub day: Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HospitalClosure {
    pub id: Ulid,
    pub admin_id: AdminId,
    pub date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportedBy {
    /// The doctor declared themself unavailable.
    Doctor,
    Admin(AdminId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorUnavailability {
    pub id: Ulid,
    pub doctor_id: DoctorId,
    pub date: NaiveDate,
    pub reason: String,
    pub reported_by: ReportedBy,
}

/// A one-off closed date. Never updated, never expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unavailability {
    HospitalWide(HospitalClosure),
    Doctor(DoctorUnavailability),
}

impl Unavailability {
    pub fn id(&self) -> Ulid {
        match self {
            Unavailability::HospitalWide(c) => c.id,
            Unavailability::Doctor(u) => u.id,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            Unavailability::HospitalWide(c) => c.date,
            Unavailability::Doctor(u) => u.date,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Unavailability::HospitalWide(c) => &c.reason,
            Unavailability::Doctor(u) => &u.reason,
        }
    }

    pub fn added_by(&self) -> Role {
        match self {
            Unavailability::HospitalWide(_) => Role::Admin,
            Unavailability::Doctor(u) => match u.reported_by {
                ReportedBy::Doctor => Role::Doctor,
                ReportedBy::Admin(_) => Role::Admin,
            },
        }
    }

    pub fn doctor_id(&self) -> Option<DoctorId> {
        match self {
            Unavailability::HospitalWide(_) => None,
            Unavailability::Doctor(u) => Some(u.doctor_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: DoctorId,
    pub name: String,
    pub specialization: String,
    pub email: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub name: String,
    pub email: String,
}

/// Journal record format. One event per committed write; a cascade is a
/// single event so replay applies it as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    DoctorRegistered {
        doctor: Doctor,
    },
    DoctorActivationChanged {
        id: DoctorId,
        active: bool,
    },
    PatientRegistered {
        patient: Patient,
    },
    AvailabilityAdded {
        availability: RecurringAvailability,
    },
    AvailabilityUpdated {
        id: Ulid,
        doctor_id: DoctorId,
        day: Weekday,
        start: NaiveTime,
        end: NaiveTime,
    },
    AvailabilityRemoved {
        id: Ulid,
        doctor_id: DoctorId,
    },
    AppointmentBooked {
        appointment: Appointment,
    },
    AppointmentCancelled {
        id: AppointmentId,
        doctor_id: DoctorId,
        reason: String,
        canceled_by: Role,
    },
    AppointmentCompleted {
        id: AppointmentId,
        doctor_id: DoctorId,
    },
    AppointmentMissed {
        id: AppointmentId,
        doctor_id: DoctorId,
    },
    UnavailabilityReported {
        record: Unavailability,
        cancelled: Vec<AppointmentId>,
        cancellation_reason: String,
        canceled_by: Role,
    },
}

// ── Query result types ───────────────────────────────────────────

/// Serializes time slots as `HH:MM`, the shape calendar widgets consume.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedSlot {
    pub date: NaiveDate,
    #[serde(rename = "timeSlot", with = "hhmm")]
    pub time_slot: NaiveTime,
}

/// Per-date classification over a rolling window. Buckets are disjoint;
/// `patient_appointments_with_others` is auxiliary and overlaps freely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorizonReport {
    pub available_dates: Vec<NaiveDate>,
    pub doctor_unavailable: Vec<NaiveDate>,
    pub hospital_closed: Vec<NaiveDate>,
    #[serde(rename = "alreadyBookedWithThisDoctor")]
    pub already_booked_with_doctor: Vec<NaiveDate>,
    pub patient_appointments_with_others: Vec<BookedSlot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppointmentFilter {
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
}

impl AppointmentFilter {
    pub fn matches(&self, appt: &Appointment) -> bool {
        self.status.is_none_or(|s| appt.status == s) && self.date.is_none_or(|d| appt.date == d)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub doctors: usize,
    pub active_doctors: usize,
    pub patients: usize,
    pub appointments: usize,
    pub pending_today: usize,
    pub pending: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub missed: usize,
}
