use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{MedicationForm, MedicationKind, TimeSlot};

/// Type-specific payload of a medication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MedicationSchedule {
    Scheduled { time_slots: BTreeSet<TimeSlot> },
    Prn,
    /// `count` is in whole units: pills, or millilitres for liquids.
    Controlled { form: MedicationForm, count: i64 },
}

impl MedicationSchedule {
    pub fn kind(&self) -> MedicationKind {
        match self {
            Self::Scheduled { .. } => MedicationKind::Scheduled,
            Self::Prn => MedicationKind::Prn,
            Self::Controlled { .. } => MedicationKind::Controlled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medication {
    pub id: Uuid,
    pub resident_id: Uuid,
    pub name: String,
    pub dosage: String,
    pub instructions: String,
    pub schedule: MedicationSchedule,
    pub discontinued_on: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
}

impl Medication {
    pub fn kind(&self) -> MedicationKind {
        self.schedule.kind()
    }

    /// Active on `date` when never discontinued or discontinued strictly later.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.discontinued_on.map_or(true, |dc| dc > date)
    }

    pub fn time_slots(&self) -> Vec<TimeSlot> {
        match &self.schedule {
            MedicationSchedule::Scheduled { time_slots } => time_slots.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    pub fn remaining_count(&self) -> Option<i64> {
        match self.schedule {
            MedicationSchedule::Controlled { count, .. } => Some(count),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn med(discontinued_on: Option<NaiveDate>) -> Medication {
        Medication {
            id: Uuid::new_v4(),
            resident_id: Uuid::new_v4(),
            name: "Aspirin".into(),
            dosage: "81mg".into(),
            instructions: String::new(),
            schedule: MedicationSchedule::Scheduled {
                time_slots: [TimeSlot::Night, TimeSlot::Morning].into_iter().collect(),
            },
            discontinued_on,
            created_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn discontinuation_date_is_inclusive() {
        let dc = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let m = med(Some(dc));
        assert!(m.is_active_on(NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()));
        assert!(!m.is_active_on(dc));
        assert!(!m.is_active_on(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()));
    }

    #[test]
    fn never_discontinued_is_always_active() {
        assert!(med(None).is_active_on(NaiveDate::from_ymd_opt(2099, 1, 1).unwrap()));
    }

    #[test]
    fn time_slots_come_back_in_day_order() {
        assert_eq!(med(None).time_slots(), vec![TimeSlot::Morning, TimeSlot::Night]);
        assert_eq!(med(None).remaining_count(), None);
    }
}
