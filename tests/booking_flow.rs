use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Weekday};
use ulid::Ulid;

use medslot::clock::FixedClock;
use medslot::engine::{Engine, EngineError};
use medslot::model::*;
use medslot::notify::{DispatchReport, RecordingNotifier, dispatch};

// ── Test infrastructure ──────────────────────────────────────

fn fresh_journal() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("medslot_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("medslot.journal")
}

fn today() -> NaiveDate {
    // Monday
    NaiveDate::from_ymd_opt(2025, 6, 9).unwrap()
}

fn at(h: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, 0, 0).unwrap()
}

fn start(path: &Path) -> Engine {
    Engine::new(path.to_path_buf(), Arc::new(FixedClock(today()))).unwrap()
}

struct Clinic {
    cardio: DoctorId,
    neuro: DoctorId,
    ana: PatientId,
    ben: PatientId,
}

async fn seed(engine: &Engine) -> Clinic {
    let cardio = Ulid::new();
    let neuro = Ulid::new();
    engine
        .register_doctor(cardio, "Burke", "Cardiology", "burke@clinic.test")
        .await
        .unwrap();
    engine
        .register_doctor(neuro, "Shepherd", "Neurology", "shepherd@clinic.test")
        .await
        .unwrap();
    for (doctor, day) in [
        (cardio, Weekday::Mon),
        (cardio, Weekday::Wed),
        (neuro, Weekday::Mon),
        (neuro, Weekday::Thu),
    ] {
        engine
            .add_availability(Ulid::new(), doctor, day, at(9), at(12))
            .await
            .unwrap();
    }

    let ana = Ulid::new();
    let ben = Ulid::new();
    engine.register_patient(ana, "Ana", "ana@mail.test").await.unwrap();
    engine.register_patient(ben, "Ben", "ben@mail.test").await.unwrap();

    Clinic {
        cardio,
        neuro,
        ana,
        ben,
    }
}

// ── Flows ────────────────────────────────────────────────────

#[tokio::test]
async fn patient_books_through_the_calendar() {
    let path = fresh_journal();
    let engine = start(&path);
    let c = seed(&engine).await;

    let horizon = engine.resolve_horizon_from_today(c.cardio, c.ana).await.unwrap();
    let first = horizon.available_dates[0];
    assert_eq!(first, today());

    let slots = engine.generate_slots(c.cardio, first).await;
    assert_eq!(slots, vec![at(9), at(10), at(11)]);

    let appt = engine
        .book_appointment(Ulid::new(), c.ana, c.cardio, first, slots[1])
        .await
        .unwrap();
    assert_eq!(appt.status, AppointmentStatus::Pending);

    engine
        .book_appointment(Ulid::new(), c.ana, c.neuro, NaiveDate::from_ymd_opt(2025, 6, 12).unwrap(), at(9))
        .await
        .unwrap();

    let horizon = engine.resolve_horizon_from_today(c.cardio, c.ana).await.unwrap();
    let json = serde_json::to_value(&horizon).unwrap();
    assert_eq!(json["alreadyBookedWithThisDoctor"], serde_json::json!(["2025-06-09"]));
    assert_eq!(
        json["patientAppointmentsWithOthers"],
        serde_json::json!([{ "date": "2025-06-12", "timeSlot": "09:00" }])
    );
    assert!(!json["availableDates"].as_array().unwrap().contains(&serde_json::json!("2025-06-09")));
    assert!(json["availableDates"].as_array().unwrap().contains(&serde_json::json!("2025-06-11")));
}

#[tokio::test]
async fn hospital_closure_cascades_and_notifies() {
    let path = fresh_journal();
    let engine = start(&path);
    let c = seed(&engine).await;
    let day = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();

    for (patient, doctor, hour) in [
        (c.ana, c.cardio, 9),
        (c.ben, c.cardio, 9),
        (c.ana, c.neuro, 11),
    ] {
        engine
            .book_appointment(Ulid::new(), patient, doctor, day, at(hour))
            .await
            .unwrap();
    }

    let result = engine
        .report_unavailability(Ulid::new(), Actor::Admin(Ulid::new()), None, day, "Fire drill")
        .await
        .unwrap();
    assert_eq!(result.cancelled.len(), 3);
    // Two patients, two doctors.
    assert_eq!(result.notifications.len(), 4);

    let notifier = RecordingNotifier::failing_for(["burke@clinic.test"]);
    let report = dispatch(&notifier, &result.notifications).await;
    assert_eq!(report, DispatchReport { sent: 3, failed: 1 });

    let ana_mail = notifier
        .sent()
        .into_iter()
        .find(|n| n.recipient == "ana@mail.test")
        .unwrap();
    assert_eq!(
        ana_mail.body,
        "Dear Ana,\n\n\
         The hospital has cancelled the following appointment(s) on 16 Jun 2025:\n\
         Reason: Fire drill\n\
         - Doctor: Burke, Time: 09:00\n\
         - Doctor: Shepherd, Time: 11:00\n\
         \nWe apologize for the inconvenience.\nThank you."
    );

    let err = engine
        .book_appointment(Ulid::new(), c.ben, c.neuro, day, at(10))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SlotUnavailable { .. }));

    // Restart: the closure and every cancellation come back together.
    drop(engine);
    let engine = start(&path);
    let cancelled = engine
        .all_appointments(AppointmentFilter {
            status: Some(AppointmentStatus::Cancelled),
            date: Some(day),
        })
        .await;
    assert_eq!(cancelled.len(), 3);
    assert!(engine.generate_slots(c.cardio, day).await.is_empty());
    let horizon = engine.resolve_horizon(c.neuro, c.ben, today(), 30).await.unwrap();
    assert!(horizon.hospital_closed.contains(&day));
}

#[tokio::test]
async fn doctor_takes_a_day_off() {
    let path = fresh_journal();
    let engine = start(&path);
    let c = seed(&engine).await;
    let day = NaiveDate::from_ymd_opt(2025, 6, 18).unwrap();

    let appt = engine
        .book_appointment(Ulid::new(), c.ben, c.cardio, day, at(10))
        .await
        .unwrap();
    let result = engine
        .report_unavailability(Ulid::new(), Actor::Doctor(c.cardio), None, day, "Family matter")
        .await
        .unwrap();

    assert_eq!(result.notifications.len(), 1);
    assert_eq!(result.notifications[0].recipient, "ben@mail.test");
    assert!(result.notifications[0].body.contains("because the doctor is unavailable on 18 Jun 2025"));

    let stored = engine.appointment(appt.id).await.unwrap();
    assert_eq!(stored.cancellation_reason.as_deref(), Some("Doctor is not available"));

    let listed = engine.unavailabilities().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].reason(), "Family matter");

    let horizon = engine.resolve_horizon(c.cardio, c.ben, today(), 30).await.unwrap();
    assert_eq!(horizon.doctor_unavailable, vec![day]);
}
