use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::DayOfWeek;

/// Exactly one scheduling mode per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSchedule {
    EveryNDays(u32),
    SpecificDays(BTreeSet<DayOfWeek>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonMedOrder {
    pub id: Uuid,
    pub resident_id: Uuid,
    pub name: String,
    pub instructions: String,
    pub schedule: OrderSchedule,
    pub last_administered: Option<NaiveDate>,
    pub discontinued_on: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAdministration {
    pub id: Uuid,
    pub order_id: Uuid,
    pub resident_id: Uuid,
    pub administered_at: NaiveDateTime,
    pub administered_by: String,
    pub notes: String,
}
