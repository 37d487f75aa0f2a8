use crate::app_config::AppConfig;
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so tests can drive it with a
/// plain `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let source_database_url = require("FEEDCOPY_SOURCE_DATABASE_URL")?;
    // sqlx tooling reads DATABASE_URL, so the local store may already be configured there.
    let target_database_url = lookup("FEEDCOPY_TARGET_DATABASE_URL")
        .or_else(|_| lookup("DATABASE_URL"))
        .map_err(|_| ConfigError::MissingEnvVar("FEEDCOPY_TARGET_DATABASE_URL".to_string()))?;

    if source_database_url == target_database_url {
        return Err(ConfigError::Validation(
            "source and target database URLs must differ".to_string(),
        ));
    }

    let log_level = or_default("FEEDCOPY_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("FEEDCOPY_DB_MAX_CONNECTIONS", "2")?;
    let db_min_connections = parse_u32("FEEDCOPY_DB_MIN_CONNECTIONS", "0")?;
    let db_acquire_timeout_secs = parse_u64("FEEDCOPY_DB_ACQUIRE_TIMEOUT_SECS", "5")?;

    if db_max_connections == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "FEEDCOPY_DB_MAX_CONNECTIONS".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    if db_min_connections > db_max_connections {
        return Err(ConfigError::InvalidEnvVar {
            var: "FEEDCOPY_DB_MIN_CONNECTIONS".to_string(),
            reason: format!(
                "{db_min_connections} exceeds FEEDCOPY_DB_MAX_CONNECTIONS ({db_max_connections})"
            ),
        });
    }

    Ok(AppConfig {
        source_database_url,
        target_database_url,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
    })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
