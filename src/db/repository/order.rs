use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{parse_date, parse_datetime, parse_uuid, DatabaseError, DATETIME_FORMAT, DATE_FORMAT};
use crate::models::enums::DayOfWeek;
use crate::models::{NonMedOrder, OrderAdministration, OrderSchedule};

const ORDER_COLUMNS: &str = "id, resident_id, order_name, instructions, frequency_days,
     specific_days, last_administered_date, discontinued_date, created_at";

fn schedule_columns(schedule: &OrderSchedule) -> (Option<u32>, Option<String>) {
    match schedule {
        OrderSchedule::EveryNDays(days) => (Some(*days), None),
        OrderSchedule::SpecificDays(days) => (
            None,
            Some(days.iter().map(DayOfWeek::as_str).collect::<Vec<_>>().join(",")),
        ),
    }
}

pub fn insert_order(conn: &Connection, order: &NonMedOrder) -> Result<(), DatabaseError> {
    let (frequency_days, specific_days) = schedule_columns(&order.schedule);
    conn.execute(
        "INSERT INTO non_med_orders (id, resident_id, order_name, instructions, frequency_days,
         specific_days, last_administered_date, discontinued_date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            order.id.to_string(),
            order.resident_id.to_string(),
            order.name,
            order.instructions,
            frequency_days,
            specific_days,
            order.last_administered.map(|d| d.format(DATE_FORMAT).to_string()),
            order.discontinued_on.map(|d| d.format(DATE_FORMAT).to_string()),
            order.created_at.format(DATETIME_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_order(conn: &Connection, id: &Uuid) -> Result<Option<NonMedOrder>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {ORDER_COLUMNS} FROM non_med_orders WHERE id = ?1"),
            params![id.to_string()],
            order_row_from_rusqlite,
        )
        .optional()?;
    row.map(order_from_row).transpose()
}

pub fn get_orders_for_resident(
    conn: &Connection,
    resident_id: &Uuid,
) -> Result<Vec<NonMedOrder>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ORDER_COLUMNS} FROM non_med_orders
         WHERE resident_id = ?1 ORDER BY order_name, created_at"
    ))?;
    let rows = stmt.query_map(params![resident_id.to_string()], order_row_from_rusqlite)?;

    let mut orders = Vec::new();
    for row in rows {
        orders.push(order_from_row(row?)?);
    }
    Ok(orders)
}

/// Rewrite name, instructions and schedule. Switching schedule mode clears the other column.
pub fn update_order_details(conn: &Connection, order: &NonMedOrder) -> Result<(), DatabaseError> {
    let (frequency_days, specific_days) = schedule_columns(&order.schedule);
    let changed = conn.execute(
        "UPDATE non_med_orders SET order_name = ?2, instructions = ?3,
         frequency_days = ?4, specific_days = ?5 WHERE id = ?1",
        params![
            order.id.to_string(),
            order.name,
            order.instructions,
            frequency_days,
            specific_days,
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "NonMedOrder".into(),
            id: order.id.to_string(),
        });
    }
    Ok(())
}

pub fn set_order_discontinued(
    conn: &Connection,
    id: &Uuid,
    date: NaiveDate,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE non_med_orders SET discontinued_date = ?2
         WHERE id = ?1 AND discontinued_date IS NULL",
        params![id.to_string(), date.format(DATE_FORMAT).to_string()],
    )?;
    Ok(changed == 1)
}

pub fn set_last_administered(
    conn: &Connection,
    id: &Uuid,
    date: NaiveDate,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE non_med_orders SET last_administered_date = ?2 WHERE id = ?1",
        params![id.to_string(), date.format(DATE_FORMAT).to_string()],
    )?;
    Ok(())
}

/// Delete an order and its performance history. Callers wrap this in a transaction.
pub fn delete_order_cascade(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let id = id.to_string();
    conn.execute(
        "DELETE FROM non_med_order_administrations WHERE order_id = ?1",
        params![id],
    )?;
    let removed = conn.execute("DELETE FROM non_med_orders WHERE id = ?1", params![id])?;
    if removed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "NonMedOrder".into(),
            id,
        });
    }
    Ok(())
}

pub fn insert_order_administration(
    conn: &Connection,
    entry: &OrderAdministration,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO non_med_order_administrations
         (id, order_id, resident_id, administered_at, administered_by, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.id.to_string(),
            entry.order_id.to_string(),
            entry.resident_id.to_string(),
            entry.administered_at.format(DATETIME_FORMAT).to_string(),
            entry.administered_by,
            entry.notes,
        ],
    )?;
    Ok(())
}

/// Performance history of an order, newest first.
pub fn get_order_administrations(
    conn: &Connection,
    order_id: &Uuid,
) -> Result<Vec<OrderAdministration>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, order_id, resident_id, administered_at, administered_by, notes
         FROM non_med_order_administrations WHERE order_id = ?1
         ORDER BY administered_at DESC",
    )?;
    let rows = stmt.query_map(params![order_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, order_id, resident_id, administered_at, administered_by, notes) = row?;
        entries.push(OrderAdministration {
            id: parse_uuid(&id)?,
            order_id: parse_uuid(&order_id)?,
            resident_id: parse_uuid(&resident_id)?,
            administered_at: parse_datetime(&administered_at)?,
            administered_by,
            notes,
        });
    }
    Ok(entries)
}

// Internal row type for mapping
struct OrderRow {
    id: String,
    resident_id: String,
    name: String,
    instructions: String,
    frequency_days: Option<u32>,
    specific_days: Option<String>,
    last_administered_date: Option<String>,
    discontinued_date: Option<String>,
    created_at: String,
}

fn order_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<OrderRow, rusqlite::Error> {
    Ok(OrderRow {
        id: row.get(0)?,
        resident_id: row.get(1)?,
        name: row.get(2)?,
        instructions: row.get(3)?,
        frequency_days: row.get(4)?,
        specific_days: row.get(5)?,
        last_administered_date: row.get(6)?,
        discontinued_date: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn order_from_row(row: OrderRow) -> Result<NonMedOrder, DatabaseError> {
    let schedule = match (row.frequency_days, row.specific_days) {
        (Some(days), None) => OrderSchedule::EveryNDays(days),
        (None, Some(list)) => {
            let mut days = BTreeSet::new();
            for day in list.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                days.insert(DayOfWeek::from_str(day)?);
            }
            OrderSchedule::SpecificDays(days)
        }
        _ => {
            return Err(DatabaseError::ConstraintViolation(format!(
                "order {} must have exactly one scheduling mode",
                row.id
            )))
        }
    };

    Ok(NonMedOrder {
        id: parse_uuid(&row.id)?,
        resident_id: parse_uuid(&row.resident_id)?,
        name: row.name,
        instructions: row.instructions,
        schedule,
        last_administered: row.last_administered_date.as_deref().map(parse_date).transpose()?,
        discontinued_on: row.discontinued_date.as_deref().map(parse_date).transpose()?,
        created_at: parse_datetime(&row.created_at)?,
    })
}
