use chrono::NaiveDate;

#[derive(Debug, Default, Clone)]
pub struct AuditFilter {
    /// Only entries from the last ten days.
    pub last_10_days: bool,
    pub username: Option<String>,
    pub action: Option<String>,
    pub exact_date: Option<NaiveDate>,
}
