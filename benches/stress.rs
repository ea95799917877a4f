use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate, NaiveTime, Weekday};
use ulid::Ulid;

use medslot::clock::FixedClock;
use medslot::engine::{Engine, EngineError};
use medslot::limits::SLOT_CAPACITY;
use medslot::model::{Actor, DoctorId, PatientId};

const WEEKDAYS: [Weekday; 5] = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri];

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 9).unwrap()
}

fn at(h: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, 0, 0).unwrap()
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn fresh_engine(name: &str) -> Arc<Engine> {
    let dir = std::env::temp_dir().join(format!("medslot_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    Arc::new(Engine::new(dir.join(format!("{name}.journal")), Arc::new(FixedClock(monday()))).unwrap())
}

/// Doctors open 08:00-18:00 on weekdays, plus a pool of patients.
async fn setup(engine: &Engine, doctors: usize, patients: usize) -> (Vec<DoctorId>, Vec<PatientId>) {
    let mut doctor_ids = Vec::with_capacity(doctors);
    for i in 0..doctors {
        let id = Ulid::new();
        engine
            .register_doctor(id, &format!("Doctor {i}"), "General", &format!("d{i}@clinic.test"))
            .await
            .unwrap();
        for day in WEEKDAYS {
            engine
                .add_availability(Ulid::new(), id, day, at(8), at(18))
                .await
                .unwrap();
        }
        doctor_ids.push(id);
    }
    let mut patient_ids = Vec::with_capacity(patients);
    for i in 0..patients {
        let id = Ulid::new();
        engine
            .register_patient(id, &format!("Patient {i}"), &format!("p{i}@mail.test"))
            .await
            .unwrap();
        patient_ids.push(id);
    }
    (doctor_ids, patient_ids)
}

async fn phase1_sequential() {
    let engine = fresh_engine("sequential");
    let (doctors, patients) = setup(&engine, 1, 50).await;
    let doctor = doctors[0];

    let mut latencies = Vec::new();
    let start = Instant::now();
    'outer: for week in 0..40u64 {
        for day in 0..5u64 {
            let date = monday() + Days::new(week * 7 + day);
            for hour in 8..18 {
                for seat in 0..SLOT_CAPACITY {
                    let patient = patients[(hour as usize + seat) % patients.len()];
                    let t = Instant::now();
                    if engine
                        .book_appointment(Ulid::new(), patient, doctor, date, at(hour))
                        .await
                        .is_err()
                    {
                        break 'outer;
                    }
                    latencies.push(t.elapsed());
                }
            }
        }
    }

    let elapsed = start.elapsed();
    let ops = latencies.len() as f64 / elapsed.as_secs_f64();
    println!(
        "  {} bookings in {:.2}s = {ops:.0} ops/sec",
        latencies.len(),
        elapsed.as_secs_f64()
    );
    print_latency("booking latency", &mut latencies);
}

async fn phase2_contended_slot() {
    let engine = fresh_engine("contended");
    let (doctors, patients) = setup(&engine, 1, 200).await;
    let doctor = doctors[0];

    let admitted = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let mut handles = Vec::new();
    for patient in patients {
        let engine = engine.clone();
        let admitted = admitted.clone();
        let rejected = rejected.clone();
        handles.push(tokio::spawn(async move {
            match engine
                .book_appointment(Ulid::new(), patient, doctor, monday(), at(9))
                .await
            {
                Ok(_) => admitted.fetch_add(1, Ordering::Relaxed),
                Err(EngineError::SlotUnavailable { .. }) => rejected.fetch_add(1, Ordering::Relaxed),
                Err(e) => panic!("unexpected error: {e}"),
            };
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let ok = admitted.load(Ordering::Relaxed);
    println!(
        "  200 racing requests for one slot: {ok} admitted, {} rejected in {:.2}s",
        rejected.load(Ordering::Relaxed),
        start.elapsed().as_secs_f64()
    );
    assert_eq!(ok, SLOT_CAPACITY, "capacity ceiling violated");
}

async fn phase3_horizon_under_load() {
    let engine = fresh_engine("horizon");
    let (doctors, patients) = setup(&engine, 20, 500).await;

    let stop = Arc::new(AtomicBool::new(false));
    let mut writers = Vec::new();
    for w in 0..5 {
        let engine = engine.clone();
        let stop = stop.clone();
        let doctors = doctors.clone();
        let patients = patients.clone();
        writers.push(tokio::spawn(async move {
            let mut i = 0usize;
            while !stop.load(Ordering::Relaxed) {
                let doctor = doctors[(w + i) % doctors.len()];
                let patient = patients[i % patients.len()];
                let date = monday() + Days::new((i % 60) as u64);
                let _ = engine
                    .book_appointment(Ulid::new(), patient, doctor, date, at(8 + (i % 10) as u32))
                    .await;
                i += 1;
            }
        }));
    }

    let mut readers = Vec::new();
    for r in 0..10 {
        let engine = engine.clone();
        let doctors = doctors.clone();
        let patients = patients.clone();
        readers.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(300);
            for i in 0..300 {
                let doctor = doctors[(r + i) % doctors.len()];
                let patient = patients[(r * 31 + i) % patients.len()];
                let t = Instant::now();
                engine.resolve_horizon(doctor, patient, monday(), 30).await.unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in readers {
        all.extend(h.await.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    for h in writers {
        let _ = h.await;
    }
    print_latency("horizon resolution", &mut all);
}

async fn phase4_hospital_cascade() {
    let engine = fresh_engine("cascade");
    let (doctors, patients) = setup(&engine, 50, 1000).await;
    let day = monday() + Days::new(7);

    let mut booked = 0usize;
    for (i, doctor) in doctors.iter().enumerate() {
        for hour in 8..18u32 {
            for seat in 0..SLOT_CAPACITY {
                let patient = patients[(i * 40 + hour as usize * 4 + seat) % patients.len()];
                if engine
                    .book_appointment(Ulid::new(), patient, *doctor, day, at(hour))
                    .await
                    .is_ok()
                {
                    booked += 1;
                }
            }
        }
    }

    let t = Instant::now();
    let result = engine
        .report_unavailability(Ulid::new(), Actor::Admin(Ulid::new()), None, day, "Power outage")
        .await
        .unwrap();
    println!(
        "  closure over {booked} bookings: {} cancelled, {} notifications in {:.2}ms",
        result.cancelled.len(),
        result.notifications.len(),
        t.elapsed().as_secs_f64() * 1000.0
    );
}

#[tokio::main]
async fn main() {
    println!("=== medslot stress benchmark ===\n");

    println!("[phase 1] sequential booking throughput");
    phase1_sequential().await;

    println!("\n[phase 2] racing bookings for one slot");
    phase2_contended_slot().await;

    println!("\n[phase 3] horizon latency under booking load");
    phase3_horizon_under_load().await;

    println!("\n[phase 4] hospital-wide cascade");
    phase4_hospital_cascade().await;

    println!("\n=== done ===");
}
