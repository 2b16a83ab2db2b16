//! Due-today resolver.
//!
//! Pure functions over catalog snapshots and today's recorded values.
//! Nothing here touches storage; "due" is always derived, never persisted.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::DaySlotValues;
use crate::models::enums::{DayOfWeek, MedicationKind, TimeSlot};
use crate::models::{Medication, MedicationSchedule, NonMedOrder, OrderSchedule};

pub struct DueInputs<'a> {
    pub medications: &'a [Medication],
    pub orders: &'a [NonMedOrder],
    /// Scheduled values already recorded today.
    pub recorded_today: &'a DaySlotValues,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDueState {
    Due,
    NotDue,
}

/// One scheduled dose for today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledDose {
    pub medication_id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub instructions: String,
    pub time_slot: TimeSlot,
    /// Value recorded so far; empty when nothing has been given.
    pub recorded: String,
}

impl ScheduledDose {
    pub fn is_due(&self) -> bool {
        self.recorded.trim().is_empty()
    }
}

/// A PRN or controlled medication that may be given today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableMedication {
    pub medication_id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub instructions: String,
    pub kind: MedicationKind,
    pub remaining_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatus {
    pub order_id: Uuid,
    pub order_name: String,
    pub instructions: String,
    pub last_administered: Option<NaiveDate>,
    pub state: OrderDueState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueToday {
    /// Ordered by time slot, then medication name.
    pub scheduled: Vec<ScheduledDose>,
    pub as_needed: Vec<AvailableMedication>,
    pub orders: Vec<OrderStatus>,
}

/// Due state of an order on `today`, or `None` once it is discontinued.
pub fn order_due_state(order: &NonMedOrder, today: NaiveDate) -> Option<OrderDueState> {
    if order.discontinued_on.is_some_and(|dc| dc <= today) {
        return None;
    }
    let due = match &order.schedule {
        OrderSchedule::EveryNDays(frequency) => match order.last_administered {
            None => true,
            Some(last) => (today - last).num_days() >= i64::from(*frequency),
        },
        OrderSchedule::SpecificDays(days) => days.contains(&DayOfWeek::from(today.weekday())),
    };
    Some(if due { OrderDueState::Due } else { OrderDueState::NotDue })
}

pub fn resolve_due_today(inputs: &DueInputs<'_>, today: NaiveDate) -> DueToday {
    let mut due = DueToday::default();

    for med in inputs.medications.iter().filter(|m| m.is_active_on(today)) {
        match &med.schedule {
            MedicationSchedule::Scheduled { time_slots } => {
                for slot in time_slots {
                    due.scheduled.push(ScheduledDose {
                        medication_id: med.id,
                        medication_name: med.name.clone(),
                        dosage: med.dosage.clone(),
                        instructions: med.instructions.clone(),
                        time_slot: *slot,
                        recorded: inputs
                            .recorded_today
                            .get(&(med.id, *slot))
                            .cloned()
                            .unwrap_or_default(),
                    });
                }
            }
            MedicationSchedule::Prn | MedicationSchedule::Controlled { .. } => {
                due.as_needed.push(AvailableMedication {
                    medication_id: med.id,
                    medication_name: med.name.clone(),
                    dosage: med.dosage.clone(),
                    instructions: med.instructions.clone(),
                    kind: med.kind(),
                    remaining_count: med.remaining_count(),
                });
            }
        }
    }
    due.scheduled
        .sort_by(|a, b| (a.time_slot, &a.medication_name).cmp(&(b.time_slot, &b.medication_name)));
    due.as_needed.sort_by(|a, b| a.medication_name.cmp(&b.medication_name));

    for order in inputs.orders {
        if let Some(state) = order_due_state(order, today) {
            due.orders.push(OrderStatus {
                order_id: order.id,
                order_name: order.name.clone(),
                instructions: order.instructions.clone(),
                last_administered: order.last_administered,
                state,
            });
        }
    }
    due
}
