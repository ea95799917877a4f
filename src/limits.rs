/// Max Pending appointments per (doctor, date, slot).
pub const SLOT_CAPACITY: usize = 4;

/// Slots are generated on exact steps from each doctor's start time.
pub const SLOT_STEP_MINUTES: i64 = 60;

/// Default rolling window for the date horizon.
pub const DEFAULT_HORIZON_DAYS: u32 = 30;

pub const MAX_HORIZON_DAYS: u32 = 366;
pub const MAX_NAME_LEN: usize = 50;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_REASON_LEN: usize = 100;
pub const MAX_DOCTORS: usize = 10_000;
pub const MAX_PATIENTS: usize = 1_000_000;
pub const MAX_APPOINTMENTS_PER_DOCTOR: usize = 200_000;
