//! Environment-variable configuration loading.
//!
//! [`Config::load`] reads the real process environment; [`Config::from_env`]
//! takes any [`EnvSource`] so tests can supply a fixed map without touching
//! `std::env`.

use crate::werror::ConfigError;
use std::{collections::HashMap, time::Duration};

/// A source of environment-style key/value pairs.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads from the real process environment.
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Immutable watchdog configuration, materialized once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// The command line to invoke per request, already split into argv.
    pub fprocess: Vec<String>,

    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub healthcheck_interval: Duration,
    /// `Duration::ZERO` means "no hard execution deadline".
    pub exec_timeout: Duration,

    pub port: u16,
    /// Fixed, not overridable by environment variable (see the metrics
    /// surface design notes): the scrape listener always binds here.
    pub metrics_port: u16,

    pub write_debug: bool,
    pub cgi_headers: bool,
    pub marshal_request: bool,
    pub debug_headers: bool,
    pub suppress_lock: bool,
    pub combine_output: bool,
    pub content_type: Option<String>,
    /// `0` means unbounded.
    pub max_inflight: usize,
    /// Ceiling on a request body's size in bytes; also sizes the listener's
    /// pre-allocated per-connection buffer (see [`crate::limits::ReqLimits`]).
    pub max_request_body: usize,

    pub jwt_auth: bool,
    pub jwt_auth_debug: bool,
    pub jwt_auth_local: bool,
    pub openfaas_name: Option<String>,
    pub openfaas_namespace: Option<String>,
}

impl Config {
    /// Loads configuration from the real process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_env(&ProcessEnv)
    }

    /// Loads configuration from an arbitrary [`EnvSource`].
    pub fn from_env(env: &impl EnvSource) -> Result<Self, ConfigError> {
        let fprocess: Vec<String> = env
            .get("fprocess")
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_owned)
            .collect();
        if fprocess.is_empty() {
            return Err(ConfigError::EmptyProcess);
        }

        let write_timeout = parse_duration(env.get("write_timeout"), Duration::from_secs(30));
        let healthcheck_interval =
            parse_duration(env.get("healthcheck_interval"), write_timeout);

        let jwt_auth = parse_bool(env.get("jwt_auth"));
        let openfaas_name = env.get("OPENFAAS_NAME");
        if jwt_auth && openfaas_name.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::MissingFunctionName);
        }

        Ok(Self {
            fprocess,

            read_timeout: parse_duration(env.get("read_timeout"), Duration::from_secs(30)),
            write_timeout,
            healthcheck_interval,
            exec_timeout: parse_duration(env.get("exec_timeout"), Duration::ZERO),

            port: parse_port(env.get("port"), 8080),
            metrics_port: 8081,

            write_debug: parse_bool_default(env.get("write_debug"), false),
            cgi_headers: parse_bool_default(env.get("cgi_headers"), true),
            marshal_request: parse_bool(env.get("marshal_request")),
            debug_headers: parse_bool(env.get("debug_headers")),
            suppress_lock: parse_bool(env.get("suppress_lock")),
            combine_output: parse_bool_default(env.get("combine_output"), true),
            content_type: env.get("content_type").filter(|s| !s.is_empty()),
            max_inflight: env
                .get("max_inflight")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            max_request_body: env
                .get("max_request_body")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024),

            jwt_auth,
            jwt_auth_debug: parse_bool(env.get("jwt_auth_debug")),
            jwt_auth_local: parse_bool(env.get("jwt_auth_local")),
            openfaas_name,
            openfaas_namespace: env.get("OPENFAAS_NAMESPACE"),
        })
    }
}

/// Accepts a plain integer number of seconds or a human-readable duration
/// (`"250ms"`, `"5s"`, `"2m"`). Falls back to `default` on empty or
/// unparseable input — never fails configuration loading over a duration.
fn parse_duration(raw: Option<String>, default: Duration) -> Duration {
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return default;
    };

    if let Ok(secs) = raw.parse::<u64>() {
        return Duration::from_secs(secs);
    }

    humantime::parse_duration(&raw).unwrap_or(default)
}

fn parse_bool(raw: Option<String>) -> bool {
    parse_bool_default(raw, false)
}

fn parse_bool_default(raw: Option<String>, default: bool) -> bool {
    match raw.as_deref() {
        Some("true") => true,
        Some(_) => false,
        None => default,
    }
}

fn parse_port(raw: Option<String>, default: u16) -> u16 {
    raw.and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_process_is_rejected() {
        let err = Config::from_env(&env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyProcess));
    }

    #[test]
    fn duration_accepts_plain_seconds() {
        assert_eq!(parse_duration(Some("30".into()), Duration::ZERO), Duration::from_secs(30));
    }

    #[test]
    fn duration_accepts_human_readable() {
        assert_eq!(
            parse_duration(Some("500ms".into()), Duration::ZERO),
            Duration::from_millis(500)
        );
        assert_eq!(parse_duration(Some("2m".into()), Duration::ZERO), Duration::from_secs(120));
    }

    #[test]
    fn duration_falls_back_on_empty_or_garbage() {
        let fallback = Duration::from_secs(7);
        assert_eq!(parse_duration(Some("".into()), fallback), fallback);
        assert_eq!(parse_duration(None, fallback), fallback);
        assert_eq!(parse_duration(Some("garbage".into()), fallback), fallback);
    }

    #[test]
    fn booleans_default_and_override() {
        assert!(parse_bool_default(None, true));
        assert!(!parse_bool_default(Some("false".into()), true));
        assert!(parse_bool_default(Some("true".into()), false));
        assert!(!parse_bool_default(Some("anything-else".into()), false));
    }

    #[test]
    fn max_request_body_defaults_to_one_mebibyte_and_is_overridable() {
        let default = Config::from_env(&env(&[("fprocess", "cat")])).unwrap();
        assert_eq!(default.max_request_body, 1024 * 1024);

        let overridden =
            Config::from_env(&env(&[("fprocess", "cat"), ("max_request_body", "4096")])).unwrap();
        assert_eq!(overridden.max_request_body, 4096);
    }

    #[test]
    fn jwt_auth_without_function_name_is_rejected() {
        let err = Config::from_env(&env(&[("fprocess", "cat"), ("jwt_auth", "true")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFunctionName));
    }

    #[test]
    fn loads_a_full_config() {
        let cfg = Config::from_env(&env(&[
            ("fprocess", "cat"),
            ("read_timeout", "5"),
            ("write_timeout", "250ms"),
            ("port", "9000"),
            ("combine_output", "false"),
        ]))
        .unwrap();

        assert_eq!(cfg.fprocess, vec!["cat".to_string()]);
        assert_eq!(cfg.read_timeout, Duration::from_secs(5));
        assert_eq!(cfg.write_timeout, Duration::from_millis(250));
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.metrics_port, 8081);
        assert!(!cfg.combine_output);
    }
}
