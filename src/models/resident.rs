use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::LevelOfCare;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resident {
    pub id: Uuid,
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub level_of_care: LevelOfCare,
    pub created_at: NaiveDateTime,
    pub removed_at: Option<NaiveDateTime>,
}
