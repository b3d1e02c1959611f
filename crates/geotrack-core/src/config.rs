use crate::app_config::{AppConfig, Environment, ProviderSettings};
use crate::ConfigError;

/// Upper bound on per-provider concurrency accepted from configuration.
pub const MAX_CONCURRENCY: usize = 1024;

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
/// Decoupled from the real environment so tests can drive it with a `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

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

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let database_url = require("DATABASE_URL")?;

    let env = parse_environment(&or_default("GEOTRACK_ENV", "development"));
    let log_level = or_default("GEOTRACK_LOG_LEVEL", "info");
    let brands_path = PathBuf::from(or_default("GEOTRACK_BRANDS_PATH", "./config/brands.yaml"));
    let prompts_path = PathBuf::from(or_default(
        "GEOTRACK_PROMPTS_PATH",
        "./prompts/seed_prompts.yaml",
    ));

    let db_max_connections = parse_u32("GEOTRACK_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("GEOTRACK_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("GEOTRACK_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let concurrency = parse_usize("GEOTRACK_CONCURRENCY", "5")?;
    if concurrency == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "GEOTRACK_CONCURRENCY".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    if concurrency > MAX_CONCURRENCY {
        return Err(ConfigError::InvalidEnvVar {
            var: "GEOTRACK_CONCURRENCY".to_string(),
            reason: format!("{concurrency} exceeds the maximum of {MAX_CONCURRENCY}"),
        });
    }

    let jitter_min_ms = parse_u64("GEOTRACK_JITTER_MIN_MS", "200")?;
    let jitter_max_ms = parse_u64("GEOTRACK_JITTER_MAX_MS", "1000")?;
    if jitter_max_ms < jitter_min_ms {
        return Err(ConfigError::InvalidEnvVar {
            var: "GEOTRACK_JITTER_MAX_MS".to_string(),
            reason: format!("{jitter_max_ms} is below GEOTRACK_JITTER_MIN_MS ({jitter_min_ms})"),
        });
    }

    let timeout_secs = match lookup("GEOTRACK_REQUEST_TIMEOUT_SECS") {
        Ok(raw) => Some(
            raw.parse::<u64>()
                .map_err(|e| ConfigError::InvalidEnvVar {
                    var: "GEOTRACK_REQUEST_TIMEOUT_SECS".to_string(),
                    reason: e.to_string(),
                })?,
        ),
        Err(_) => None,
    };

    let provider = |key_var: &str, model_var: &str, default_model: &str| ProviderSettings {
        api_key: lookup(key_var).ok().filter(|k| !k.trim().is_empty()),
        model: or_default(model_var, default_model),
        timeout_secs,
    };

    let openai = provider("OPENAI_API_KEY", "GEOTRACK_OPENAI_MODEL", "gpt-5.2-chat-latest");
    let gemini = provider(
        "GEMINI_API_KEY",
        "GEOTRACK_GEMINI_MODEL",
        "gemini-3-flash-preview",
    );
    let perplexity = provider("PERPLEXITY_API_KEY", "GEOTRACK_PERPLEXITY_MODEL", "sonar");

    let extraction_model = or_default("GEOTRACK_EXTRACTION_MODEL", "gpt-4o-mini");
    let extraction_max_retries = parse_u32("GEOTRACK_EXTRACTION_MAX_RETRIES", "2")?;

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        brands_path,
        prompts_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        concurrency,
        jitter_min_ms,
        jitter_max_ms,
        openai,
        gemini,
        perplexity,
        extraction_model,
        extraction_max_retries,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
