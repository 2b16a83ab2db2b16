//! Repository layer: entity-scoped database operations.
//!
//! Every function takes a borrowed `Connection`; multi-statement writes
//! leave transaction control to the caller. Functions that touch sealed
//! columns also take the session `FieldKey`.

mod adl;
mod audit;
mod emar;
mod medication;
mod order;
mod resident;
mod setting;
mod user;

pub use adl::*;
pub use audit::*;
pub use emar::*;
pub use medication::*;
pub use order::*;
pub use resident::*;
pub use setting::*;
pub use user::*;

/// Builders shared by repository and feature tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{NaiveDate, NaiveDateTime};
    use rusqlite::Connection;
    use uuid::Uuid;

    use crate::crypto::FieldKey;
    use crate::models::enums::{LevelOfCare, MedicationForm, TimeSlot};
    use crate::models::{Medication, MedicationSchedule, Resident};

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(h, min, 0).unwrap()
    }

    pub fn make_resident(name: &str) -> Resident {
        Resident {
            id: Uuid::new_v4(),
            name: name.into(),
            date_of_birth: date(1940, 5, 17),
            level_of_care: LevelOfCare::Personal,
            created_at: at(2024, 1, 2, 8, 30),
            removed_at: None,
        }
    }

    pub fn seed_resident(conn: &Connection, key: &FieldKey, name: &str) -> Resident {
        let resident = make_resident(name);
        super::insert_resident(conn, key, &resident).unwrap();
        resident
    }

    fn make_med(resident_id: &Uuid, name: &str, schedule: MedicationSchedule) -> Medication {
        Medication {
            id: Uuid::new_v4(),
            resident_id: *resident_id,
            name: name.into(),
            dosage: "81mg".into(),
            instructions: "With food".into(),
            schedule,
            discontinued_on: None,
            created_at: at(2024, 1, 2, 9, 0),
        }
    }

    pub fn scheduled_med(resident_id: &Uuid, name: &str, slots: &[TimeSlot]) -> Medication {
        make_med(
            resident_id,
            name,
            MedicationSchedule::Scheduled { time_slots: slots.iter().copied().collect() },
        )
    }

    pub fn prn_med(resident_id: &Uuid, name: &str) -> Medication {
        make_med(resident_id, name, MedicationSchedule::Prn)
    }

    pub fn controlled_med(
        resident_id: &Uuid,
        name: &str,
        form: MedicationForm,
        count: i64,
    ) -> Medication {
        make_med(resident_id, name, MedicationSchedule::Controlled { form, count })
    }
}
