//! Transport-agnostic application state.
//!
//! `CoreState` is the single object a presentation layer (desktop UI, CLI,
//! IPC bridge) holds. It owns the database connection, the unlocked field
//! key and the logged-in user, and it attributes every mutation to that
//! user in the audit log.
//!
//! Lifecycle: `unlock` (vault passphrase) → `login` → operations →
//! `logout` (user only) or `lock` (user and key). Inactivity beyond the
//! timeout locks the state on the next call.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use uuid::Uuid;

use crate::accounts::{self, ActingUser};
use crate::adl::{self, AdlMonth};
use crate::audit::{self, actions};
use crate::backup::{self, BackupConfig};
use crate::chart::{self, ChartEdit, MonthlyChart};
use crate::config::{self, VaultConfig};
use crate::crypto::{self, FieldKey};
use crate::db;
use crate::error::CareError;
use crate::ledger::{self, AsNeededRecord, LedgerView, ScheduledRecord};
use crate::medications::{self, MedicationEdit, NewMedication};
use crate::models::enums::{MedicationKind, Role, TimeSlot};
use crate::models::filters::AuditFilter;
use crate::models::{
    AdlValues, AdministrationEvent, AuditEntry, Medication, NonMedOrder, OrderAdministration,
    Resident, SlotRevision, YearMonth,
};
use crate::orders::{self, NewOrder, OrderEdit};
use crate::residents::{self, NewResident, ResidentEdit};
use crate::resolver::{self, DueInputs, DueToday};

// ═══════════════════════════════════════════════════════════
// Clock
// ═══════════════════════════════════════════════════════════

/// Source of "now" for every timestamp the facade writes.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Manually driven clock for tests and replays.
pub struct FixedClock(Mutex<NaiveDateTime>);

impl FixedClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self(Mutex::new(at))
    }

    pub fn set(&self, at: NaiveDateTime) {
        if let Ok(mut now) = self.0.lock() {
            *now = at;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.0.lock() {
            *now += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        match self.0.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Session
// ═══════════════════════════════════════════════════════════

struct Session {
    key: FieldKey,
    user: Option<ActingUser>,
    /// Logged in with a temporary password; only a reset is allowed.
    reset_pending: bool,
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub user: ActingUser,
    pub needs_password_reset: bool,
}

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    vault_config: VaultConfig,
    /// `None` while the vault is locked.
    session: RwLock<Option<Session>>,
    last_activity: Mutex<NaiveDateTime>,
    pub inactivity_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl CoreState {
    /// Open (and migrate) the database at `db_path` with the system clock.
    pub fn new(db_path: &Path, vault_config: VaultConfig) -> Result<Self, CareError> {
        Self::with_clock(db_path, vault_config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        db_path: &Path,
        vault_config: VaultConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CareError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = db::open_database(db_path)?;
        let now = clock.now();
        tracing::info!("{} core opened v{}", config::APP_NAME, config::APP_VERSION);
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: db_path.to_path_buf(),
            vault_config,
            session: RwLock::new(None),
            last_activity: Mutex::new(now),
            inactivity_timeout: Duration::minutes(config::INACTIVITY_TIMEOUT_MINUTES),
            clock,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    fn today(&self) -> NaiveDate {
        self.now().date()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CareError> {
        self.conn.lock().map_err(|_| CareError::LockPoisoned)
    }

    // ── Inactivity management ───────────────────────────────

    /// Update the last activity timestamp.
    pub fn update_activity(&self) {
        let now = self.now();
        if let Ok(mut last) = self.last_activity.lock() {
            *last = now;
        }
    }

    /// Lock when a logged-in session has been idle past the timeout.
    /// Returns whether the state was locked by this call.
    pub fn check_timeout(&self) -> bool {
        let logged_in = self.current_user().is_some();
        let idle = self
            .last_activity
            .lock()
            .map(|last| self.now() - *last > self.inactivity_timeout)
            .unwrap_or(false);
        if logged_in && idle {
            tracing::info!("Session idle past timeout");
            self.lock();
            true
        } else {
            false
        }
    }

    // ── Vault ───────────────────────────────────────────────

    pub fn is_unlocked(&self) -> bool {
        self.session.read().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Derive the field key. The first unlock of a fresh database sets the passphrase.
    pub fn unlock(&self, passphrase: &str) -> Result<(), CareError> {
        let key = {
            let conn = self.conn()?;
            crypto::unlock_vault(&conn, passphrase, self.vault_config.kdf_iterations)?
        };
        let mut guard = self.session.write().map_err(|_| CareError::LockPoisoned)?;
        *guard = Some(Session {
            key,
            user: None,
            reset_pending: false,
        });
        drop(guard);
        self.update_activity();
        Ok(())
    }

    /// Drop the user and the key (zeroed on drop).
    pub fn lock(&self) {
        if let Ok(mut session) = self.session.write() {
            *session = None;
        }
        tracing::info!("Core locked");
    }

    /// Run `f` with the field key; no login required.
    fn with_vault<T>(
        &self,
        f: impl FnOnce(&Connection, &FieldKey, NaiveDateTime) -> Result<T, CareError>,
    ) -> Result<T, CareError> {
        let guard = self.session.read().map_err(|_| CareError::LockPoisoned)?;
        let session = guard
            .as_ref()
            .ok_or_else(|| CareError::Authentication("vault is locked".into()))?;
        let conn = self.conn()?;
        f(&conn, &session.key, self.now())
    }

    /// Run `f` as the logged-in user, after the inactivity check. Everything
    /// `f` writes, audit rows included, commits together or not at all.
    fn as_user<T>(
        &self,
        f: impl FnOnce(&Connection, &FieldKey, &ActingUser, NaiveDateTime) -> Result<T, CareError>,
    ) -> Result<T, CareError> {
        if self.check_timeout() {
            return Err(CareError::Authentication("session expired, log in again".into()));
        }
        let result = {
            let guard = self.session.read().map_err(|_| CareError::LockPoisoned)?;
            let session = guard
                .as_ref()
                .ok_or_else(|| CareError::Authentication("vault is locked".into()))?;
            let user = session
                .user
                .as_ref()
                .ok_or_else(|| CareError::Authentication("not logged in".into()))?;
            if session.reset_pending {
                return Err(CareError::Authentication("password reset required".into()));
            }
            let conn = self.conn()?;
            db::atomically(&conn, |conn| f(conn, &session.key, user, self.now()))
        };
        self.update_activity();
        result
    }

    // ── Accounts ────────────────────────────────────────────

    pub fn has_users(&self) -> Result<bool, CareError> {
        accounts::has_users(&*self.conn()?)
    }

    pub fn current_user(&self) -> Option<ActingUser> {
        self.session
            .read()
            .ok()
            .and_then(|s| s.as_ref().and_then(|s| s.user.clone()))
    }

    fn set_user(&self, user: Option<ActingUser>, reset_pending: bool) -> Result<(), CareError> {
        let mut guard = self.session.write().map_err(|_| CareError::LockPoisoned)?;
        let session = guard
            .as_mut()
            .ok_or_else(|| CareError::Authentication("vault is locked".into()))?;
        session.user = user;
        session.reset_pending = reset_pending;
        Ok(())
    }

    /// Create the first administrator on an empty database and log them in.
    pub fn setup_admin(
        &self,
        username: &str,
        password: &str,
        initials: &str,
    ) -> Result<ActingUser, CareError> {
        let rounds = self.vault_config.password_hash_rounds;
        let user = self.with_vault(|conn, key, now| {
            db::atomically(conn, |conn| {
                let user =
                    accounts::create_initial_admin(conn, username, password, initials, rounds, now)?;
                audit::log_action(
                    conn,
                    key,
                    &user.username,
                    actions::CREATE_USER,
                    &format!("Created initial administrator {}", user.username),
                    now,
                )?;
                Ok(user)
            })
        })?;
        self.set_user(Some(user.clone()), false)?;
        self.update_activity();
        Ok(user)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, CareError> {
        let outcome = self.with_vault(|conn, key, now| {
            match accounts::authenticate(conn, username, password) {
                Ok(user) => {
                    let needs_password_reset = accounts::needs_password_reset(conn, &user.username)?;
                    audit::log_action(conn, key, &user.username, actions::LOGIN, "User logged in", now)?;
                    Ok(LoginOutcome { user, needs_password_reset })
                }
                Err(e @ CareError::Authentication(_)) => {
                    audit::log_action(
                        conn,
                        key,
                        username.trim(),
                        actions::LOGIN_FAILED,
                        "Failed login attempt",
                        now,
                    )?;
                    Err(e)
                }
                Err(e) => Err(e),
            }
        })?;
        self.set_user(Some(outcome.user.clone()), outcome.needs_password_reset)?;
        self.update_activity();
        Ok(outcome)
    }

    /// Replace a temporary password and set initials for the logged-in user.
    pub fn complete_password_reset(
        &self,
        new_password: &str,
        initials: &str,
    ) -> Result<ActingUser, CareError> {
        let username = self
            .current_user()
            .map(|u| u.username)
            .ok_or_else(|| CareError::Authentication("not logged in".into()))?;
        let rounds = self.vault_config.password_hash_rounds;
        let user = self.with_vault(|conn, key, now| {
            db::atomically(conn, |conn| {
                let user = accounts::set_password_and_initials(
                    conn,
                    &username,
                    new_password,
                    initials,
                    rounds,
                )?;
                audit::log_action(
                    conn,
                    key,
                    &user.username,
                    actions::CHANGE_PASSWORD,
                    "Temporary password replaced",
                    now,
                )?;
                Ok(user)
            })
        })?;
        self.set_user(Some(user.clone()), false)?;
        self.update_activity();
        Ok(user)
    }

    pub fn change_password(&self, current: &str, new: &str) -> Result<(), CareError> {
        let rounds = self.vault_config.password_hash_rounds;
        self.as_user(|conn, key, user, now| {
            accounts::change_password(conn, &user.username, current, new, rounds)?;
            audit::log_action(conn, key, &user.username, actions::CHANGE_PASSWORD, "Password changed", now)?;
            Ok(())
        })
    }

    /// Log the user out; the vault stays unlocked for the next login.
    pub fn logout(&self) -> Result<(), CareError> {
        if let Some(user) = self.current_user() {
            self.with_vault(|conn, key, now| {
                audit::log_action(conn, key, &user.username, actions::LOGOUT, "User logged out", now)
            })?;
        }
        self.set_user(None, false)
    }

    pub fn create_user(&self, username: &str, temp_password: &str, role: Role) -> Result<(), CareError> {
        let rounds = self.vault_config.password_hash_rounds;
        self.as_user(|conn, key, user, now| {
            accounts::create_user(conn, user, username, temp_password, role, rounds, now)?;
            audit::log_action(
                conn,
                key,
                &user.username,
                actions::CREATE_USER,
                &format!("Created {} account {}", role.as_str(), username.trim()),
                now,
            )?;
            Ok(())
        })
    }

    pub fn remove_user(&self, username: &str, reason: &str) -> Result<(), CareError> {
        self.as_user(|conn, key, user, now| {
            accounts::remove_user(conn, user, username)?;
            audit::log_action(
                conn,
                key,
                &user.username,
                actions::REMOVE_USER,
                &format!("Removed account {}. Reason: {}", username.trim(), reason.trim()),
                now,
            )?;
            Ok(())
        })
    }

    pub fn list_usernames(&self) -> Result<Vec<String>, CareError> {
        self.as_user(|conn, _, user, _| {
            user.require_admin()?;
            accounts::list_usernames(conn)
        })
    }

    // ── Residents ───────────────────────────────────────────

    pub fn add_resident(&self, input: &NewResident) -> Result<Resident, CareError> {
        self.as_user(|conn, key, user, now| {
            let resident = residents::add_resident(conn, key, input, now)?;
            audit::log_action(
                conn,
                key,
                &user.username,
                actions::ADD_RESIDENT,
                &format!("Added resident {}", resident.name),
                now,
            )?;
            Ok(resident)
        })
    }

    pub fn edit_resident(&self, id: &Uuid, edit: &ResidentEdit) -> Result<Resident, CareError> {
        self.as_user(|conn, key, user, now| {
            let before = residents::get_resident(conn, key, id)?;
            let after = residents::edit_resident(conn, key, id, edit, now)?;
            audit::log_action(
                conn,
                key,
                &user.username,
                actions::EDIT_RESIDENT,
                &format!("Edited resident {} (now {})", before.name, after.name),
                now,
            )?;
            Ok(after)
        })
    }

    pub fn remove_resident(&self, id: &Uuid) -> Result<(), CareError> {
        self.as_user(|conn, key, user, now| {
            let resident = residents::get_resident(conn, key, id)?;
            residents::remove_resident(conn, id, now)?;
            audit::log_action(
                conn,
                key,
                &user.username,
                actions::REMOVE_RESIDENT,
                &format!("Removed resident {}", resident.name),
                now,
            )?;
            Ok(())
        })
    }

    pub fn list_residents(&self) -> Result<Vec<Resident>, CareError> {
        self.as_user(|conn, key, _, _| residents::list_residents(conn, key))
    }

    pub fn get_resident(&self, id: &Uuid) -> Result<Resident, CareError> {
        self.as_user(|conn, key, _, _| residents::get_resident(conn, key, id))
    }

    // ── Medication catalog ──────────────────────────────────

    pub fn add_medication(&self, input: &NewMedication) -> Result<Medication, CareError> {
        self.as_user(|conn, key, user, now| {
            let med = medications::add_medication(conn, key, input, now)?;
            let detail = match med.remaining_count() {
                Some(count) => format!(" with count {count}"),
                None => String::new(),
            };
            audit::log_action(
                conn,
                key,
                &user.username,
                actions::ADD_MEDICATION,
                &format!("Added {} medication {}{}", med.kind().as_str(), med.name, detail),
                now,
            )?;
            Ok(med)
        })
    }

    pub fn edit_medication(&self, id: &Uuid, edit: &MedicationEdit) -> Result<Medication, CareError> {
        self.as_user(|conn, key, user, now| {
            let med = medications::edit_medication(conn, key, id, edit)?;
            audit::log_action(
                conn,
                key,
                &user.username,
                actions::EDIT_MEDICATION,
                &format!("Edited medication {}", med.name),
                now,
            )?;
            Ok(med)
        })
    }

    /// Returns whether the stored discontinuation date changed.
    pub fn discontinue_medication(&self, id: &Uuid, date: NaiveDate) -> Result<bool, CareError> {
        self.as_user(|conn, key, user, now| {
            let med = medications::get_medication(conn, key, id)?;
            let changed = medications::discontinue_medication(conn, id, date)?;
            if changed {
                audit::log_action(
                    conn,
                    key,
                    &user.username,
                    actions::DISCONTINUE_MEDICATION,
                    &format!("Discontinued medication {} as of {}", med.name, date),
                    now,
                )?;
            }
            Ok(changed)
        })
    }

    pub fn remove_medication(&self, id: &Uuid) -> Result<(), CareError> {
        self.as_user(|conn, key, user, now| {
            let med = medications::get_medication(conn, key, id)?;
            medications::remove_medication(conn, id)?;
            audit::log_action(
                conn,
                key,
                &user.username,
                actions::REMOVE_MEDICATION,
                &format!("Removed medication {} and its records", med.name),
                now,
            )?;
            Ok(())
        })
    }

    pub fn list_medications(&self, resident_id: &Uuid) -> Result<Vec<Medication>, CareError> {
        self.as_user(|conn, key, _, _| medications::list_medications(conn, key, resident_id))
    }

    pub fn list_active_medications(
        &self,
        resident_id: &Uuid,
        as_of: NaiveDate,
    ) -> Result<Vec<Medication>, CareError> {
        self.as_user(|conn, key, _, _| medications::list_active(conn, key, resident_id, as_of))
    }

    // ── Non-medication orders ───────────────────────────────

    pub fn add_order(&self, input: &NewOrder) -> Result<NonMedOrder, CareError> {
        self.as_user(|conn, key, user, now| {
            let order = orders::add_order(conn, input, now)?;
            audit::log_action(
                conn,
                key,
                &user.username,
                actions::ADD_ORDER,
                &format!("Added non-medication order {}", order.name),
                now,
            )?;
            Ok(order)
        })
    }

    pub fn edit_order(&self, id: &Uuid, edit: &OrderEdit) -> Result<NonMedOrder, CareError> {
        self.as_user(|conn, key, user, now| {
            let order = orders::edit_order(conn, id, edit)?;
            audit::log_action(
                conn,
                key,
                &user.username,
                actions::EDIT_ORDER,
                &format!("Edited non-medication order {}", order.name),
                now,
            )?;
            Ok(order)
        })
    }

    /// Record the order as performed now by the logged-in user.
    pub fn perform_order(&self, id: &Uuid, notes: &str) -> Result<OrderAdministration, CareError> {
        self.as_user(|conn, key, user, now| {
            let order = orders::get_order(conn, id)?;
            let performed = orders::record_performance(conn, id, notes, &user.initials, now)?;
            audit::log_action(
                conn,
                key,
                &user.username,
                actions::PERFORM_ORDER,
                &format!("Performed {}. Notes: {}", order.name, performed.notes),
                now,
            )?;
            Ok(performed)
        })
    }

    pub fn discontinue_order(&self, id: &Uuid, date: NaiveDate) -> Result<bool, CareError> {
        self.as_user(|conn, key, user, now| {
            let order = orders::get_order(conn, id)?;
            let changed = orders::discontinue_order(conn, id, date)?;
            if changed {
                audit::log_action(
                    conn,
                    key,
                    &user.username,
                    actions::DISCONTINUE_ORDER,
                    &format!("Discontinued {} as of {}", order.name, date),
                    now,
                )?;
            }
            Ok(changed)
        })
    }

    pub fn remove_order(&self, id: &Uuid) -> Result<(), CareError> {
        self.as_user(|conn, key, user, now| {
            let order = orders::get_order(conn, id)?;
            orders::remove_order(conn, id)?;
            audit::log_action(
                conn,
                key,
                &user.username,
                actions::REMOVE_ORDER,
                &format!("Removed non-medication order {}", order.name),
                now,
            )?;
            Ok(())
        })
    }

    pub fn list_orders(&self, resident_id: &Uuid) -> Result<Vec<NonMedOrder>, CareError> {
        self.as_user(|conn, _, _, _| orders::list_orders(conn, resident_id))
    }

    pub fn order_history(&self, id: &Uuid) -> Result<Vec<OrderAdministration>, CareError> {
        self.as_user(|conn, _, _, _| orders::order_history(conn, id))
    }

    // ── Administration ledger ───────────────────────────────

    /// Set a scheduled slot value. Audited only when the value changed.
    pub fn record_scheduled(
        &self,
        resident_id: &Uuid,
        medication_id: &Uuid,
        date: NaiveDate,
        time_slot: TimeSlot,
        value: &str,
    ) -> Result<bool, CareError> {
        self.as_user(|conn, key, user, now| {
            let record = ScheduledRecord {
                resident_id: *resident_id,
                medication_id: *medication_id,
                date,
                time_slot,
                value: value.to_string(),
            };
            let changed = ledger::record_scheduled(conn, key, &record, &user.username, now)?;
            if changed {
                let med = medications::get_medication(conn, key, medication_id)?;
                audit::log_action(
                    conn,
                    key,
                    &user.username,
                    actions::EMAR_RECORD,
                    &format!(
                        "{} {} on {} set to '{}'",
                        med.name,
                        time_slot.label(),
                        date,
                        value.trim().to_uppercase()
                    ),
                    now,
                )?;
            }
            Ok(changed)
        })
    }

    /// Record a PRN dose, or dispense a controlled one, given now by the logged-in user.
    pub fn administer_as_needed(
        &self,
        resident_id: &Uuid,
        medication_id: &Uuid,
        administered_at: NaiveDateTime,
        notes: &str,
        administered_count: Option<i64>,
    ) -> Result<AdministrationEvent, CareError> {
        self.as_user(|conn, key, user, now| {
            let record = AsNeededRecord {
                resident_id: *resident_id,
                medication_id: *medication_id,
                administered_at,
                initials: user.initials.clone(),
                notes: notes.to_string(),
            };
            let event = ledger::record_prn_or_controlled(conn, key, &record, administered_count, now)?;
            let med = medications::get_medication(conn, key, medication_id)?;
            let (action, description) = match (med.kind(), event.remaining_count) {
                (MedicationKind::Controlled, Some(remaining)) => (
                    actions::CONTROLLED_DISPENSE,
                    format!(
                        "Dispensed {} of {}, {} remaining",
                        administered_count.unwrap_or_default(),
                        med.name,
                        remaining
                    ),
                ),
                _ => (actions::PRN_ADMINISTRATION, format!("Administered {}", med.name)),
            };
            audit::log_action(conn, key, &user.username, action, &description, now)?;
            Ok(event)
        })
    }

    pub fn fetch_for_day(&self, resident_id: &Uuid, date: NaiveDate) -> Result<LedgerView, CareError> {
        self.as_user(|conn, _, _, _| ledger::fetch_for_day(conn, resident_id, date))
    }

    pub fn fetch_for_month(&self, resident_id: &Uuid, month: YearMonth) -> Result<LedgerView, CareError> {
        self.as_user(|conn, _, _, _| ledger::fetch_for_month(conn, resident_id, month))
    }

    // ── Due today ───────────────────────────────────────────

    pub fn due_today(&self, resident_id: &Uuid) -> Result<DueToday, CareError> {
        let today = self.today();
        self.due_on(resident_id, today)
    }

    pub fn due_on(&self, resident_id: &Uuid, date: NaiveDate) -> Result<DueToday, CareError> {
        self.as_user(|conn, key, _, _| {
            residents::require_active_resident(conn, resident_id)?;
            let meds = medications::list_medications(conn, key, resident_id)?;
            let orders = orders::list_orders(conn, resident_id)?;
            let recorded_today = ledger::fetch_current_for_date(conn, resident_id, date)?;
            Ok(resolver::resolve_due_today(
                &DueInputs {
                    medications: &meds,
                    orders: &orders,
                    recorded_today: &recorded_today,
                },
                date,
            ))
        })
    }

    // ── Monthly chart ───────────────────────────────────────

    pub fn monthly_chart(&self, resident_id: &Uuid, month: YearMonth) -> Result<MonthlyChart, CareError> {
        self.as_user(|conn, key, _, _| chart::materialize(conn, key, resident_id, month))
    }

    /// Save edited grid cells; all or nothing.
    pub fn save_chart_edits(
        &self,
        resident_id: &Uuid,
        month: YearMonth,
        edits: &[ChartEdit],
    ) -> Result<usize, CareError> {
        self.as_user(|conn, key, user, now| {
            let changed = chart::save_chart_edits(conn, key, resident_id, month, edits, &user.username, now)?;
            if changed > 0 {
                let resident = residents::get_resident(conn, key, resident_id)?;
                audit::log_action(
                    conn,
                    key,
                    &user.username,
                    actions::EMAR_CHART_EDIT,
                    &format!("Edited {changed} chart cells for {} in {month}", resident.name),
                    now,
                )?;
            }
            Ok(changed)
        })
    }

    pub fn day_detail(&self, medication_id: &Uuid, date: NaiveDate) -> Result<Vec<AdministrationEvent>, CareError> {
        self.as_user(|conn, _, _, _| chart::day_detail(conn, medication_id, date))
    }

    pub fn month_detail(
        &self,
        medication_id: &Uuid,
        month: YearMonth,
    ) -> Result<Vec<AdministrationEvent>, CareError> {
        self.as_user(|conn, _, _, _| chart::month_detail(conn, medication_id, month))
    }

    pub fn slot_history(
        &self,
        medication_id: &Uuid,
        date: NaiveDate,
        slot: TimeSlot,
    ) -> Result<Vec<SlotRevision>, CareError> {
        self.as_user(|conn, _, _, _| chart::slot_history(conn, medication_id, date, slot))
    }

    // ── ADL chart ───────────────────────────────────────────

    pub fn save_adl_day(
        &self,
        resident_id: &Uuid,
        date: NaiveDate,
        values: &AdlValues,
    ) -> Result<AdlValues, CareError> {
        self.as_user(|conn, key, user, now| {
            let before = adl::fetch_adl_day(conn, resident_id, date)?;
            let after = adl::save_adl_day(conn, resident_id, date, values, now)?;
            audit::log_action(
                conn,
                key,
                &user.username,
                actions::ADL_UPDATE,
                &format!("{} ({})", adl::describe_adl_changes(&before, &after), date),
                now,
            )?;
            Ok(after)
        })
    }

    pub fn fetch_adl_day(&self, resident_id: &Uuid, date: NaiveDate) -> Result<AdlValues, CareError> {
        self.as_user(|conn, _, _, _| adl::fetch_adl_day(conn, resident_id, date))
    }

    pub fn fetch_adl_month(&self, resident_id: &Uuid, month: YearMonth) -> Result<AdlMonth, CareError> {
        self.as_user(|conn, _, _, _| adl::fetch_adl_month(conn, resident_id, month))
    }

    pub fn save_adl_month(&self, resident_id: &Uuid, grid: &AdlMonth) -> Result<(), CareError> {
        self.as_user(|conn, key, user, now| {
            adl::save_adl_month(conn, resident_id, grid, now)?;
            audit::log_action(
                conn,
                key,
                &user.username,
                actions::ADL_UPDATE,
                &format!("Saved ADL chart for {}", grid.month),
                now,
            )?;
            Ok(())
        })
    }

    // ── Audit log ───────────────────────────────────────────

    pub fn query_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, CareError> {
        self.as_user(|conn, key, _, now| audit::query_audit(conn, key, filter, now))
    }

    pub fn audit_actions(&self) -> Result<Vec<String>, CareError> {
        self.as_user(|conn, _, _, _| audit::list_actions(conn))
    }

    // ── Settings and backup ─────────────────────────────────

    pub fn theme(&self) -> Result<String, CareError> {
        backup::get_theme(&*self.conn()?)
    }

    pub fn font(&self) -> Result<String, CareError> {
        backup::get_font(&*self.conn()?)
    }

    pub fn set_display(&self, theme: &str, font: &str) -> Result<(), CareError> {
        self.as_user(|conn, key, user, now| {
            backup::set_theme(conn, theme)?;
            backup::set_font(conn, font)?;
            audit::log_action(
                conn,
                key,
                &user.username,
                actions::SETTINGS,
                &format!("Theme set to {}, font set to {}", theme.trim(), font.trim()),
                now,
            )?;
            Ok(())
        })
    }

    pub fn backup_config(&self) -> Result<Option<BackupConfig>, CareError> {
        backup::get_backup_config(&*self.conn()?)
    }

    pub fn save_backup_config(&self, config: &BackupConfig) -> Result<(), CareError> {
        self.as_user(|conn, key, user, now| {
            user.require_admin()?;
            backup::save_backup_config(conn, config)?;
            audit::log_action(
                conn,
                key,
                &user.username,
                actions::SETTINGS,
                &format!(
                    "Backup set to {} into {}",
                    config.frequency.as_str(),
                    config.folder.display()
                ),
                now,
            )?;
            Ok(())
        })
    }

    /// Copy the database when a configured backup is due.
    pub fn backup_if_due(&self) -> Result<Option<PathBuf>, CareError> {
        self.as_user(|conn, key, user, now| {
            let written = backup::backup_if_due(conn, &self.db_path, now)?;
            if let Some(path) = &written {
                audit::log_action(
                    conn,
                    key,
                    &user.username,
                    actions::BACKUP,
                    &format!("Database backed up to {}", path.display()),
                    now,
                )?;
            }
            Ok(written)
        })
    }
}
