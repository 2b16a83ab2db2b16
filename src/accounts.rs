//! User accounts: the first administrator, staff with temporary
//! passwords, login, and password changes.
//!
//! Operations that need attribution take an explicit `ActingUser`
//! instead of reading a global "current user".

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{hash_password, verify_password};
use crate::db::repository;
use crate::error::CareError;
use crate::models::enums::Role;
use crate::models::User;

/// The authenticated person performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActingUser {
    pub username: String,
    pub initials: String,
    pub role: Role,
}

impl ActingUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), CareError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(CareError::Authentication("administrator role required".into()))
        }
    }
}

impl From<&User> for ActingUser {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            initials: user.initials.clone(),
            role: user.role,
        }
    }
}

fn clean_username(raw: &str) -> Result<String, CareError> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(CareError::Validation("username is required".into()));
    }
    Ok(username.to_string())
}

fn require_password(password: &str) -> Result<(), CareError> {
    if password.is_empty() {
        return Err(CareError::Validation("password is required".into()));
    }
    Ok(())
}

fn clean_initials(raw: &str) -> Result<String, CareError> {
    let initials = raw.trim().to_uppercase();
    if initials.is_empty() {
        return Err(CareError::Validation("initials are required".into()));
    }
    Ok(initials)
}

pub fn has_users(conn: &Connection) -> Result<bool, CareError> {
    Ok(repository::count_users(conn)? > 0)
}

/// Create the first administrator. Only allowed while no user exists.
pub fn create_initial_admin(
    conn: &Connection,
    username: &str,
    password: &str,
    initials: &str,
    hash_rounds: u32,
    now: NaiveDateTime,
) -> Result<ActingUser, CareError> {
    if has_users(conn)? {
        return Err(CareError::Validation("an administrator already exists".into()));
    }
    let username = clean_username(username)?;
    require_password(password)?;
    let user = User {
        id: Uuid::new_v4(),
        username,
        password_hash: hash_password(password, hash_rounds)?,
        role: Role::Admin,
        initials: clean_initials(initials)?,
        is_temp_password: false,
        created_at: now,
    };
    repository::insert_user(conn, &user)?;
    tracing::info!(user_id = %user.id, "Initial administrator created");
    Ok(ActingUser::from(&user))
}

/// Create a staff account with a temporary password. Admin only.
pub fn create_user(
    conn: &Connection,
    actor: &ActingUser,
    username: &str,
    temp_password: &str,
    role: Role,
    hash_rounds: u32,
    now: NaiveDateTime,
) -> Result<(), CareError> {
    actor.require_admin()?;
    let username = clean_username(username)?;
    require_password(temp_password)?;
    if repository::get_user_by_username(conn, &username)?.is_some() {
        return Err(CareError::Validation(
            "this username already exists, please choose another".into(),
        ));
    }
    let user = User {
        id: Uuid::new_v4(),
        username,
        password_hash: hash_password(temp_password, hash_rounds)?,
        role,
        initials: String::new(),
        is_temp_password: true,
        created_at: now,
    };
    repository::insert_user(conn, &user)?;
    tracing::info!(user_id = %user.id, role = role.as_str(), "User created");
    Ok(())
}

/// Check credentials. Unknown users and wrong passwords fail the same way.
pub fn authenticate(conn: &Connection, username: &str, password: &str) -> Result<ActingUser, CareError> {
    let user = repository::get_user_by_username(conn, username.trim())?;
    match user {
        Some(user) if verify_password(password, &user.password_hash) => {
            tracing::info!(user_id = %user.id, "Login succeeded");
            Ok(ActingUser::from(&user))
        }
        _ => {
            tracing::warn!("Login failed");
            Err(CareError::Authentication("invalid username or password".into()))
        }
    }
}

pub fn needs_password_reset(conn: &Connection, username: &str) -> Result<bool, CareError> {
    let user = repository::get_user_by_username(conn, username)?
        .ok_or_else(|| CareError::NotFound(format!("user {username} not found")))?;
    Ok(user.is_temp_password)
}

/// First-login step: replace the temporary password and record initials.
pub fn set_password_and_initials(
    conn: &Connection,
    username: &str,
    new_password: &str,
    initials: &str,
    hash_rounds: u32,
) -> Result<ActingUser, CareError> {
    require_password(new_password)?;
    let initials = clean_initials(initials)?;
    let hash = hash_password(new_password, hash_rounds)?;
    repository::update_user_credentials(conn, username, &hash, Some(&initials), false)?;
    let user = repository::get_user_by_username(conn, username)?
        .ok_or_else(|| CareError::NotFound(format!("user {username} not found")))?;
    Ok(ActingUser::from(&user))
}

pub fn change_password(
    conn: &Connection,
    username: &str,
    current_password: &str,
    new_password: &str,
    hash_rounds: u32,
) -> Result<(), CareError> {
    authenticate(conn, username, current_password)?;
    require_password(new_password)?;
    let hash = hash_password(new_password, hash_rounds)?;
    repository::update_user_credentials(conn, username.trim(), &hash, None, false)?;
    tracing::info!("Password changed");
    Ok(())
}

/// Delete an account. Admin only; nobody can remove themselves.
pub fn remove_user(conn: &Connection, actor: &ActingUser, username: &str) -> Result<(), CareError> {
    actor.require_admin()?;
    if actor.username == username {
        return Err(CareError::Validation("you cannot remove your own account".into()));
    }
    if !repository::delete_user(conn, username)? {
        return Err(CareError::NotFound(format!("user {username} not found")));
    }
    tracing::info!("User removed");
    Ok(())
}

pub fn list_usernames(conn: &Connection) -> Result<Vec<String>, CareError> {
    Ok(repository::list_usernames(conn)?)
}
