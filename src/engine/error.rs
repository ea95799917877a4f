use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::model::{AppointmentStatus, DoctorId};

#[derive(Debug)]
pub enum EngineError {
    /// New bookings against a deactivated doctor.
    DoctorInactive(DoctorId),
    /// The requested slot is not among the slots currently offered.
    SlotUnavailable {
        doctor: DoctorId,
        date: NaiveDate,
        slot: NaiveTime,
    },
    NotFound(Ulid),
    InvalidUnavailabilityTarget(String),
    AlreadyExists(Ulid),
    InvalidHours {
        start: NaiveTime,
        end: NaiveTime,
    },
    InvalidTransition {
        id: Ulid,
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    NotParticipant(Ulid),
    LimitExceeded(&'static str),
    JournalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::DoctorInactive(id) => write!(f, "doctor {id} is not accepting bookings"),
            EngineError::SlotUnavailable { doctor, date, slot } => write!(
                f,
                "slot {} on {date} is not available for doctor {doctor}",
                slot.format("%H:%M")
            ),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::InvalidUnavailabilityTarget(msg) => {
                write!(f, "invalid unavailability target: {msg}")
            }
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidHours { start, end } => write!(
                f,
                "start {} must be before end {}",
                start.format("%H:%M"),
                end.format("%H:%M")
            ),
            EngineError::InvalidTransition { id, from, to } => {
                write!(f, "appointment {id} cannot move from {from} to {to}")
            }
            EngineError::NotParticipant(id) => {
                write!(f, "caller is not a participant of appointment {id}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::JournalError(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
