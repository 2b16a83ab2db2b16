use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::TimeSlot;

/// Current value of one scheduled slot-day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEntry {
    pub resident_id: Uuid,
    pub medication_id: Uuid,
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    pub administered: String,
    pub updated_at: NaiveDateTime,
}

/// One discrete PRN or controlled administration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdministrationEvent {
    pub id: Uuid,
    pub resident_id: Uuid,
    pub medication_id: Uuid,
    pub administered_at: NaiveDateTime,
    pub administered_by: String,
    pub notes: String,
    pub remaining_count: Option<i64>,
}

/// A change to a scheduled slot-day value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRevision {
    pub medication_id: Uuid,
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    pub previous_value: Option<String>,
    pub new_value: String,
    pub changed_by: String,
    pub changed_at: NaiveDateTime,
}
