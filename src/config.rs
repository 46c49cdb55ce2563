use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Runtime configuration, read once at startup from the environment
/// (after `.env` has been loaded).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub mongodb_uri: String,
    pub jwt_secret: String,
    pub jwt_expires_days: i64,
    pub frontend_url: String,
    pub max_file_size: usize,
    pub upload_path: PathBuf,
    pub bcrypt_cost: u32,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_requests: u32,
    pub environment: String,
}

pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            mongodb_uri: "mongodb://localhost:27017/excel-analytics".to_string(),
            jwt_secret: "default-secret-change-me".to_string(),
            jwt_expires_days: 7,
            frontend_url: "http://localhost:3000".to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            upload_path: PathBuf::from("./uploads"),
            bcrypt_cost: 12,
            rate_limit_window_secs: 15 * 60,
            rate_limit_max_requests: 100,
            environment: "development".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset or unparsable values
    /// fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let jwt_secret = match lookup("JWT_SECRET") {
            Some(secret) if !secret.is_empty() => secret,
            _ => {
                log::warn!("⚠️  JWT_SECRET not set, using insecure default");
                defaults.jwt_secret
            }
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            mongodb_uri: lookup("MONGODB_URI").unwrap_or(defaults.mongodb_uri),
            jwt_secret,
            jwt_expires_days: parse_var(&lookup, "JWT_EXPIRES_DAYS").unwrap_or(defaults.jwt_expires_days),
            frontend_url: lookup("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            max_file_size: parse_var(&lookup, "MAX_FILE_SIZE").unwrap_or(defaults.max_file_size),
            upload_path: lookup("UPLOAD_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_path),
            bcrypt_cost: parse_var(&lookup, "BCRYPT_COST").unwrap_or(defaults.bcrypt_cost),
            rate_limit_window_secs: parse_var(&lookup, "RATE_LIMIT_WINDOW_SECS")
                .unwrap_or(defaults.rate_limit_window_secs),
            rate_limit_max_requests: parse_var(&lookup, "RATE_LIMIT_MAX_REQUESTS")
                .unwrap_or(defaults.rate_limit_max_requests),
            environment: lookup("APP_ENV").unwrap_or(defaults.environment),
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_env_empty() {
        let config = Config::from_lookup(lookup_from(&[]));
        assert_eq!(config.port, 5000);
        assert_eq!(config.max_file_size, 10485760);
        assert_eq!(config.upload_path, PathBuf::from("./uploads"));
        assert_eq!(config.jwt_expires_days, 7);
    }

    #[test]
    fn test_overrides_and_bad_numbers() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("MAX_FILE_SIZE", "not-a-number"),
            ("UPLOAD_PATH", "/tmp/sheets"),
            ("FRONTEND_URL", "https://app.example.com"),
            ("JWT_SECRET", "s3cret"),
        ]));
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(config.upload_path, PathBuf::from("/tmp/sheets"));
        assert_eq!(config.frontend_url, "https://app.example.com");
        assert_eq!(config.jwt_secret, "s3cret");
    }
}
