use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::str_enum;

// The string form doubles as the adl_chart column name.
str_enum!(AdlField {
    FirstShiftSp => "first_shift_sp",
    SecondShiftSp => "second_shift_sp",
    FirstShiftActivity1 => "first_shift_activity1",
    FirstShiftActivity2 => "first_shift_activity2",
    FirstShiftActivity3 => "first_shift_activity3",
    SecondShiftActivity4 => "second_shift_activity4",
    FirstShiftBm => "first_shift_bm",
    SecondShiftBm => "second_shift_bm",
    Shower => "shower",
    Shampoo => "shampoo",
    SpongeBath => "sponge_bath",
    PeriCareAm => "peri_care_am",
    PeriCarePm => "peri_care_pm",
    OralCareAm => "oral_care_am",
    OralCarePm => "oral_care_pm",
    NailCare => "nail_care",
    SkinCare => "skin_care",
    Shave => "shave",
    Breakfast => "breakfast",
    Lunch => "lunch",
    Dinner => "dinner",
    SnackAm => "snack_am",
    SnackPm => "snack_pm",
    WaterIntake => "water_intake",
});

/// One resident-day of ADL values. Missing fields read as blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdlValues(pub BTreeMap<AdlField, String>);

impl AdlValues {
    pub fn get(&self, field: AdlField) -> &str {
        self.0.get(&field).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, field: AdlField, value: impl Into<String>) {
        self.0.insert(field, value.into());
    }

    pub fn is_blank(&self) -> bool {
        self.0.values().all(|v| v.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdlEntry {
    pub resident_id: Uuid,
    pub date: NaiveDate,
    pub values: AdlValues,
}
