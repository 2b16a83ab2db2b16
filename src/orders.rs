//! Non-medication care orders: recurring tasks scheduled every N days
//! or on fixed weekdays, with their performance history.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{atomically, repository};
use crate::error::CareError;
use crate::models::enums::DayOfWeek;
use crate::models::{NonMedOrder, OrderAdministration, OrderSchedule};
use crate::residents::{require_active_resident, require_resident};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub resident_id: Uuid,
    pub name: String,
    pub instructions: String,
    pub frequency_days: Option<u32>,
    pub specific_days: Option<BTreeSet<DayOfWeek>>,
}

/// Partial update. Supplying a schedule replaces the old mode entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderEdit {
    pub name: Option<String>,
    pub instructions: Option<String>,
    pub frequency_days: Option<u32>,
    pub specific_days: Option<BTreeSet<DayOfWeek>>,
}

/// Exactly one of the two modes must be given. An empty weekday set counts as absent.
pub fn schedule_from_parts(
    frequency_days: Option<u32>,
    specific_days: Option<&BTreeSet<DayOfWeek>>,
) -> Result<Option<OrderSchedule>, CareError> {
    let days = specific_days.filter(|d| !d.is_empty());
    match (frequency_days, days) {
        (Some(_), Some(_)) => Err(CareError::Validation(
            "choose either a frequency or specific days, not both".into(),
        )),
        (Some(0), None) => Err(CareError::Validation("frequency must be at least one day".into())),
        (Some(n), None) => Ok(Some(OrderSchedule::EveryNDays(n))),
        (None, Some(days)) => Ok(Some(OrderSchedule::SpecificDays(days.clone()))),
        (None, None) => Ok(None),
    }
}

pub fn add_order(
    conn: &Connection,
    input: &NewOrder,
    now: NaiveDateTime,
) -> Result<NonMedOrder, CareError> {
    require_active_resident(conn, &input.resident_id)?;

    let name = input.name.trim();
    if name.is_empty() {
        return Err(CareError::Validation("order name is required".into()));
    }
    let schedule = schedule_from_parts(input.frequency_days, input.specific_days.as_ref())?
        .ok_or_else(|| CareError::Validation("choose a frequency or specific days".into()))?;

    let order = NonMedOrder {
        id: Uuid::new_v4(),
        resident_id: input.resident_id,
        name: name.to_string(),
        instructions: input.instructions.trim().to_string(),
        schedule,
        last_administered: None,
        discontinued_on: None,
        created_at: now,
    };
    repository::insert_order(conn, &order)?;
    tracing::info!(order_id = %order.id, resident_id = %order.resident_id, "Order added");
    Ok(order)
}

pub fn edit_order(conn: &Connection, id: &Uuid, edit: &OrderEdit) -> Result<NonMedOrder, CareError> {
    let mut order = get_order(conn, id)?;
    if let Some(name) = &edit.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(CareError::Validation("order name is required".into()));
        }
        order.name = name.to_string();
    }
    if let Some(instructions) = &edit.instructions {
        order.instructions = instructions.trim().to_string();
    }
    if let Some(schedule) = schedule_from_parts(edit.frequency_days, edit.specific_days.as_ref())? {
        order.schedule = schedule;
    }

    repository::update_order_details(conn, &order)?;
    tracing::info!(order_id = %id, "Order updated");
    Ok(order)
}

/// Record that the order was carried out and restart its clock.
pub fn record_performance(
    conn: &Connection,
    id: &Uuid,
    notes: &str,
    initials: &str,
    now: NaiveDateTime,
) -> Result<OrderAdministration, CareError> {
    let initials = initials.trim();
    if initials.is_empty() {
        return Err(CareError::Validation("initials are required".into()));
    }
    let order = get_order(conn, id)?;
    let today = now.date();
    if order.discontinued_on.is_some_and(|dc| dc <= today) {
        return Err(CareError::Validation("order has been discontinued".into()));
    }

    let entry = OrderAdministration {
        id: Uuid::new_v4(),
        order_id: order.id,
        resident_id: order.resident_id,
        administered_at: now,
        administered_by: initials.to_uppercase(),
        notes: notes.trim().to_string(),
    };

    atomically(conn, |conn| {
        repository::insert_order_administration(conn, &entry)?;
        repository::set_last_administered(conn, id, today)?;
        Ok::<_, CareError>(())
    })?;

    tracing::info!(order_id = %id, "Order performed");
    Ok(entry)
}

pub fn discontinue_order(conn: &Connection, id: &Uuid, date: NaiveDate) -> Result<bool, CareError> {
    get_order(conn, id)?;
    let changed = repository::set_order_discontinued(conn, id, date)?;
    if changed {
        tracing::info!(order_id = %id, effective = %date, "Order discontinued");
    }
    Ok(changed)
}

pub fn remove_order(conn: &Connection, id: &Uuid) -> Result<(), CareError> {
    atomically(conn, |conn| Ok::<_, CareError>(repository::delete_order_cascade(conn, id)?))?;
    tracing::warn!(order_id = %id, "Order removed with its history");
    Ok(())
}

pub fn get_order(conn: &Connection, id: &Uuid) -> Result<NonMedOrder, CareError> {
    repository::get_order(conn, id)?
        .ok_or_else(|| CareError::NotFound(format!("order {id} not found")))
}

pub fn list_orders(conn: &Connection, resident_id: &Uuid) -> Result<Vec<NonMedOrder>, CareError> {
    require_resident(conn, resident_id)?;
    Ok(repository::get_orders_for_resident(conn, resident_id)?)
}

pub fn order_history(conn: &Connection, id: &Uuid) -> Result<Vec<OrderAdministration>, CareError> {
    get_order(conn, id)?;
    Ok(repository::get_order_administrations(conn, id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_key;
    use crate::db::repository::fixtures::{at, date, seed_resident};
    use crate::db::sqlite::open_memory_database;

    fn weekdays(days: &[DayOfWeek]) -> BTreeSet<DayOfWeek> {
        days.iter().copied().collect()
    }

    fn every(resident_id: Uuid, n: u32) -> NewOrder {
        NewOrder {
            resident_id,
            name: "Blood pressure check".into(),
            instructions: "Left arm".into(),
            frequency_days: Some(n),
            specific_days: None,
        }
    }

    #[test]
    fn scheduling_mode_must_be_exclusive() {
        let both = schedule_from_parts(Some(2), Some(&weekdays(&[DayOfWeek::Monday])));
        assert!(matches!(both, Err(CareError::Validation(_))));
        assert!(matches!(schedule_from_parts(Some(0), None), Err(CareError::Validation(_))));
        assert_eq!(schedule_from_parts(None, Some(&BTreeSet::new())).unwrap(), None);
        assert_eq!(schedule_from_parts(Some(3), Some(&BTreeSet::new())).unwrap(), Some(OrderSchedule::EveryNDays(3)));
    }

    #[test]
    fn add_requires_a_mode() {
        let conn = open_memory_database().unwrap();
        let r = seed_resident(&conn, &test_key(), "Jane Doe");
        let mut input = every(r.id, 3);
        input.frequency_days = None;
        assert!(matches!(add_order(&conn, &input, at(2024, 3, 1, 9, 0)), Err(CareError::Validation(_))));

        input.specific_days = Some(weekdays(&[DayOfWeek::Tuesday]));
        let order = add_order(&conn, &input, at(2024, 3, 1, 9, 0)).unwrap();
        assert_eq!(order.schedule, OrderSchedule::SpecificDays(weekdays(&[DayOfWeek::Tuesday])));
    }

    #[test]
    fn performance_updates_last_administered() {
        let conn = open_memory_database().unwrap();
        let r = seed_resident(&conn, &test_key(), "Jane Doe");
        let order = add_order(&conn, &every(r.id, 3), at(2024, 3, 1, 9, 0)).unwrap();

        let entry = record_performance(&conn, &order.id, "120/80", "jd", at(2024, 3, 4, 14, 30)).unwrap();
        assert_eq!(entry.administered_by, "JD");
        assert_eq!(get_order(&conn, &order.id).unwrap().last_administered, Some(date(2024, 3, 4)));
        assert_eq!(order_history(&conn, &order.id).unwrap().len(), 1);

        assert!(matches!(
            record_performance(&conn, &order.id, "", " ", at(2024, 3, 5, 9, 0)),
            Err(CareError::Validation(_))
        ));
    }

    #[test]
    fn discontinued_order_cannot_be_performed() {
        let conn = open_memory_database().unwrap();
        let r = seed_resident(&conn, &test_key(), "Jane Doe");
        let order = add_order(&conn, &every(r.id, 1), at(2024, 3, 1, 9, 0)).unwrap();

        assert!(discontinue_order(&conn, &order.id, date(2024, 3, 10)).unwrap());
        assert!(!discontinue_order(&conn, &order.id, date(2024, 3, 12)).unwrap());
        record_performance(&conn, &order.id, "", "JD", at(2024, 3, 9, 9, 0)).unwrap();
        assert!(matches!(
            record_performance(&conn, &order.id, "", "JD", at(2024, 3, 10, 9, 0)),
            Err(CareError::Validation(_))
        ));
    }

    #[test]
    fn edit_switches_mode() {
        let conn = open_memory_database().unwrap();
        let r = seed_resident(&conn, &test_key(), "Jane Doe");
        let order = add_order(&conn, &every(r.id, 3), at(2024, 3, 1, 9, 0)).unwrap();

        let edit = OrderEdit {
            specific_days: Some(weekdays(&[DayOfWeek::Saturday])),
            ..Default::default()
        };
        let updated = edit_order(&conn, &order.id, &edit).unwrap();
        assert_eq!(updated.schedule, OrderSchedule::SpecificDays(weekdays(&[DayOfWeek::Saturday])));
        assert_eq!(updated.name, "Blood pressure check");
        assert_eq!(get_order(&conn, &order.id).unwrap().schedule, updated.schedule);
    }

    #[test]
    fn remove_deletes_history() {
        let conn = open_memory_database().unwrap();
        let r = seed_resident(&conn, &test_key(), "Jane Doe");
        let order = add_order(&conn, &every(r.id, 3), at(2024, 3, 1, 9, 0)).unwrap();
        record_performance(&conn, &order.id, "", "JD", at(2024, 3, 1, 10, 0)).unwrap();

        remove_order(&conn, &order.id).unwrap();
        assert!(list_orders(&conn, &r.id).unwrap().is_empty());
        assert!(matches!(remove_order(&conn, &order.id), Err(CareError::NotFound(_))));
    }

    #[test]
    fn listing_orders_of_unknown_resident_is_not_found() {
        let conn = open_memory_database().unwrap();
        assert!(matches!(list_orders(&conn, &Uuid::new_v4()), Err(CareError::NotFound(_))));
    }
}
