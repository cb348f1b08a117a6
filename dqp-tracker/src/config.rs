//! Configuration resolution for dqp-tracker
//!
//! Provides multi-tier resolution with Database → TOML (environment
//! overrides already applied) → built-in default priority.

use dqp_common::config::TomlConfig;
use dqp_common::Result;
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

use crate::services::DEFAULT_MAX_LOCK_WAIT_MS;

/// Resolve the entity lock acquisition bound
///
/// **Priority:** Database → TOML/ENV → default
pub async fn resolve_max_lock_wait_ms(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<u64> {
    let db_value = crate::db::settings::get_max_lock_wait_ms(db)
        .await?
        .filter(|value| is_valid_wait(*value));
    let toml_value = Some(toml_config.max_lock_wait_ms).filter(|value| is_valid_wait(*value));

    if let (Some(db_ms), Some(toml_ms)) = (db_value, toml_value) {
        if db_ms != toml_ms {
            warn!(
                database = db_ms,
                toml = toml_ms,
                "Lock wait configured in database and TOML. Using database (highest priority)."
            );
        }
    }

    if let Some(value) = db_value {
        info!(max_lock_wait_ms = value, "Lock wait loaded from database");
        return Ok(value);
    }

    if let Some(value) = toml_value {
        info!(max_lock_wait_ms = value, "Lock wait loaded from TOML config");
        return Ok(value);
    }

    warn!(
        max_lock_wait_ms = DEFAULT_MAX_LOCK_WAIT_MS,
        "No usable lock wait configured, using default"
    );
    Ok(DEFAULT_MAX_LOCK_WAIT_MS)
}

/// A zero wait would never retry a contended lock
pub fn is_valid_wait(max_lock_wait_ms: u64) -> bool {
    max_lock_wait_ms > 0
}
