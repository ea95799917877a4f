use chrono::{Datelike, Duration, NaiveDate, NaiveTime};

use crate::limits::{SLOT_CAPACITY, SLOT_STEP_MINUTES};
use crate::model::*;

use super::store::DoctorState;
use super::Engine;

// ── Slot generation ──────────────────────────────────────────────

/// Fixed-step slots from `start`, stopping before `end` (the boundary slot
/// at `end` is never offered). Stops at midnight instead of wrapping.
pub fn candidate_slots(start: NaiveTime, end: NaiveTime) -> Vec<NaiveTime> {
    let step = Duration::minutes(SLOT_STEP_MINUTES);
    let mut slots = Vec::new();
    let mut t = start;
    while t < end {
        slots.push(t);
        let (next, wrapped) = t.overflowing_add_signed(step);
        if wrapped != 0 {
            break;
        }
        t = next;
    }
    slots
}

/// Bookable slots for one doctor on one date, ascending.
///
/// 1. Any closure on the date (hospital-wide or this doctor's) → nothing.
/// 2. No weekly hours for the weekday → nothing.
/// 3. Otherwise every step slot whose Pending count is below capacity.
pub fn generate_slots(
    doctor: &DoctorState,
    closures: &[HospitalClosure],
    date: NaiveDate,
) -> Vec<NaiveTime> {
    if closures.iter().any(|c| c.date == date) || doctor.is_unavailable_on(date) {
        return Vec::new();
    }
    let Some(hours) = doctor.hours_on(date.weekday()) else {
        return Vec::new();
    };
    candidate_slots(hours.start, hours.end)
        .into_iter()
        .filter(|slot| doctor.pending_at(date, *slot) < SLOT_CAPACITY)
        .collect()
}

impl Engine {
    /// Unknown doctors have no slots; that is not an error.
    pub async fn generate_slots(&self, doctor_id: DoctorId, date: NaiveDate) -> Vec<NaiveTime> {
        let Some(ds) = self.store.get_doctor(&doctor_id) else {
            return Vec::new();
        };
        let guard = ds.read().await;
        let closures = self.store.closures.read().await;
        generate_slots(&guard, &closures, date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use ulid::Ulid;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    /// 2025-06-09 is a Monday.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 9).unwrap()
    }

    fn doctor_with_hours(day: Weekday, start: NaiveTime, end: NaiveTime) -> DoctorState {
        let id = Ulid::new();
        let mut ds = DoctorState::new(Doctor {
            id,
            name: "House".into(),
            specialization: "Diagnostics".into(),
            email: "house@example.com".into(),
            active: true,
        });
        ds.apply(&Event::AvailabilityAdded {
            availability: RecurringAvailability {
                id: Ulid::new(),
                doctor_id: id,
                day,
                start,
                end,
            },
        });
        ds
    }

    fn book(ds: &mut DoctorState, date: NaiveDate, slot: NaiveTime, n: usize) {
        for _ in 0..n {
            let appt = Appointment::pending(Ulid::new(), Ulid::new(), ds.id(), date, slot);
            ds.insert_appointment(appt);
        }
    }

    #[test]
    fn candidates_exclude_end_boundary() {
        assert_eq!(candidate_slots(t(9, 0), t(12, 0)), vec![t(9, 0), t(10, 0), t(11, 0)]);
    }

    #[test]
    fn candidates_keep_partial_last_step() {
        // 11:00 < 11:30, so 11:00 is offered even though the hour overruns
        assert_eq!(candidate_slots(t(9, 0), t(11, 30)), vec![t(9, 0), t(10, 0), t(11, 0)]);
    }

    #[test]
    fn candidates_follow_odd_start() {
        assert_eq!(candidate_slots(t(8, 15), t(10, 0)), vec![t(8, 15), t(9, 15)]);
    }

    #[test]
    fn candidates_empty_when_start_not_before_end() {
        assert!(candidate_slots(t(10, 0), t(10, 0)).is_empty());
        assert!(candidate_slots(t(11, 0), t(10, 0)).is_empty());
    }

    #[test]
    fn candidates_do_not_wrap_past_midnight() {
        assert_eq!(candidate_slots(t(22, 0), t(23, 59)), vec![t(22, 0), t(23, 0)]);
    }

    #[test]
    fn no_hours_for_weekday_means_no_slots() {
        let ds = doctor_with_hours(Weekday::Tue, t(9, 0), t(12, 0));
        assert!(generate_slots(&ds, &[], monday()).is_empty());
    }

    #[test]
    fn full_slot_is_dropped_neighbour_kept() {
        let mut ds = doctor_with_hours(Weekday::Mon, t(9, 0), t(11, 0));
        book(&mut ds, monday(), t(9, 0), SLOT_CAPACITY);
        assert_eq!(generate_slots(&ds, &[], monday()), vec![t(10, 0)]);
    }

    #[test]
    fn below_capacity_is_still_offered() {
        let mut ds = doctor_with_hours(Weekday::Mon, t(9, 0), t(11, 0));
        book(&mut ds, monday(), t(9, 0), SLOT_CAPACITY - 1);
        assert_eq!(generate_slots(&ds, &[], monday()), vec![t(9, 0), t(10, 0)]);
    }

    #[test]
    fn cancelled_appointments_free_capacity() {
        let mut ds = doctor_with_hours(Weekday::Mon, t(9, 0), t(10, 0));
        book(&mut ds, monday(), t(9, 0), SLOT_CAPACITY);
        let first = ds.appointments[0].id;
        ds.apply(&Event::AppointmentCancelled {
            id: first,
            doctor_id: ds.id(),
            reason: "Patient is not available".into(),
            canceled_by: Role::Patient,
        });
        assert_eq!(generate_slots(&ds, &[], monday()), vec![t(9, 0)]);
    }

    #[test]
    fn hospital_closure_blocks_every_slot() {
        let ds = doctor_with_hours(Weekday::Mon, t(9, 0), t(12, 0));
        let closure = HospitalClosure {
            id: Ulid::new(),
            admin_id: Ulid::new(),
            date: monday(),
            reason: "Flood".into(),
        };
        assert!(generate_slots(&ds, &[closure.clone()], monday()).is_empty());
        let next_monday = monday() + Duration::days(7);
        assert_eq!(generate_slots(&ds, &[closure], next_monday).len(), 3);
    }

    #[test]
    fn doctor_unavailability_blocks_day() {
        let mut ds = doctor_with_hours(Weekday::Mon, t(9, 0), t(12, 0));
        ds.insert_unavailability(DoctorUnavailability {
            id: Ulid::new(),
            doctor_id: ds.id(),
            date: monday(),
            reason: "Conference".into(),
            reported_by: ReportedBy::Doctor,
        });
        assert!(generate_slots(&ds, &[], monday()).is_empty());
    }

    #[test]
    fn generation_is_repeatable() {
        let mut ds = doctor_with_hours(Weekday::Mon, t(9, 0), t(13, 0));
        book(&mut ds, monday(), t(10, 0), SLOT_CAPACITY);
        let a = generate_slots(&ds, &[], monday());
        let b = generate_slots(&ds, &[], monday());
        assert_eq!(a, b);
        assert_eq!(a, vec![t(9, 0), t(11, 0), t(12, 0)]);
    }
}
