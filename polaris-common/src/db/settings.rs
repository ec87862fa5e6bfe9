//! Persisted local state
//!
//! A generic key/value `settings` table with typed helpers, plus the
//! append-only set of discovered landmarks.

use crate::{Error, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashSet;

const MUTED_KEY: &str = "muted";
const HAS_SEEN_INTRO_KEY: &str = "has_seen_intro";

/// Read a setting and parse it into `T`
pub async fn get_setting<T>(db: &SqlitePool, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await?;

    match value.flatten() {
        Some(value) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting {} failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Insert or overwrite a setting
pub async fn set_setting<T>(db: &SqlitePool, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}

/// Mute flag, `false` until first set
pub async fn get_muted(db: &SqlitePool) -> Result<bool> {
    Ok(get_setting::<bool>(db, MUTED_KEY).await?.unwrap_or(false))
}

pub async fn set_muted(db: &SqlitePool, muted: bool) -> Result<()> {
    set_setting(db, MUTED_KEY, muted).await
}

/// Whether the introduction has been shown, `false` until first set
pub async fn get_has_seen_intro(db: &SqlitePool) -> Result<bool> {
    Ok(get_setting::<bool>(db, HAS_SEEN_INTRO_KEY)
        .await?
        .unwrap_or(false))
}

pub async fn set_has_seen_intro(db: &SqlitePool, seen: bool) -> Result<()> {
    set_setting(db, HAS_SEEN_INTRO_KEY, seen).await
}

/// Names of every landmark discovered so far
pub async fn load_discovered(db: &SqlitePool) -> Result<HashSet<String>> {
    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM discovered_landmarks")
        .fetch_all(db)
        .await?;
    Ok(names.into_iter().collect())
}

/// Record a discovery
///
/// Returns `true` when the landmark was not discovered before.
pub async fn insert_discovered(db: &SqlitePool, name: &str) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO discovered_landmarks (name, discovered_at) VALUES (?, ?)
         ON CONFLICT(name) DO NOTHING",
    )
    .bind(name)
    .bind(Utc::now().to_rfc3339())
    .execute(db)
    .await?;

    Ok(result.rows_affected() == 1)
}
