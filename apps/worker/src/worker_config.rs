use std::collections::{BTreeSet, HashMap};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use pixelrelay_application::{DispatcherConfig, LiveControlState, RulesConfig, WatermarkMode};
use pixelrelay_core::{AppError, AppResult};
use pixelrelay_domain::{EventKind, IntegrationType};
use pixelrelay_infrastructure::PlatformEndpoints;

#[derive(Debug, Clone)]
pub(crate) struct WorkerConfig {
    pub(crate) database_url: String,
    pub(crate) poll_interval_ms: u64,
    pub(crate) batch_size: usize,
    pub(crate) registry_refresh_seconds: u64,
    pub(crate) dedup_ttl_seconds: u64,
    pub(crate) sweep_seconds: u64,
    pub(crate) rate_limit_max: u32,
    pub(crate) rate_limit_window_seconds: u64,
    pub(crate) audit_max_entries: usize,
    pub(crate) error_window_seconds: u64,
    pub(crate) error_threshold: usize,
    pub(crate) http_timeout_ms: u64,
    pub(crate) http_retry_delay_ms: u64,
    pub(crate) max_in_flight: usize,
    pub(crate) shutdown_grace_seconds: u64,
    pub(crate) watermark_mode: WatermarkMode,
    pub(crate) live_controls: LiveControlState,
    pub(crate) endpoints: PlatformEndpoints,
}

impl WorkerConfig {
    pub(crate) fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let defaults = PlatformEndpoints::default();

        let mut adapter_enabled = HashMap::new();
        for integration_type in env.list("RELAY_DISABLED_ADAPTERS", IntegrationType::from_str)? {
            adapter_enabled.insert(integration_type, false);
        }

        let live_controls = LiveControlState {
            live_enabled: env.bool("RELAY_LIVE_ENABLED", false)?,
            dry_run_default: env.bool("RELAY_DRY_RUN_DEFAULT", true)?,
            dry_run_overrides: env.dry_run_overrides("RELAY_DRY_RUN_OVERRIDES")?,
            live_event_allowlist: env
                .list("RELAY_LIVE_EVENT_ALLOWLIST", |value| {
                    EventKind::from_str(value).map(|kind| kind.as_str().to_owned())
                })?
                .into_iter()
                .collect::<BTreeSet<String>>(),
            adapter_enabled,
        };

        Ok(Self {
            database_url: env.required("DATABASE_URL")?,
            poll_interval_ms: env.positive("RELAY_POLL_INTERVAL_MS", 5_000)?,
            batch_size: env.positive("RELAY_BATCH_SIZE", 50)?,
            registry_refresh_seconds: env.positive("RELAY_REGISTRY_REFRESH_SECONDS", 300)?,
            dedup_ttl_seconds: env.positive("RELAY_DEDUP_TTL_SECONDS", 60)?,
            sweep_seconds: env.positive("RELAY_DEDUP_SWEEP_SECONDS", 30)?,
            rate_limit_max: env.positive("RELAY_RATE_LIMIT_MAX", 30)?,
            rate_limit_window_seconds: env.positive("RELAY_RATE_LIMIT_WINDOW_SECONDS", 60)?,
            audit_max_entries: env.positive("RELAY_AUDIT_MAX_ENTRIES", 1_000)?,
            error_window_seconds: env.positive("RELAY_ERROR_WINDOW_SECONDS", 300)?,
            error_threshold: env.positive("RELAY_ERROR_THRESHOLD", 10)?,
            http_timeout_ms: env.positive("RELAY_HTTP_TIMEOUT_MS", 2_000)?,
            http_retry_delay_ms: env.number("RELAY_HTTP_RETRY_DELAY_MS", 250)?,
            max_in_flight: env.positive("RELAY_MAX_IN_FLIGHT", 16)?,
            shutdown_grace_seconds: env.number("RELAY_SHUTDOWN_GRACE_SECONDS", 10)?,
            watermark_mode: env
                .optional("RELAY_WATERMARK_MODE")
                .map(|value| WatermarkMode::from_str(value.as_str()))
                .transpose()?
                .unwrap_or_default(),
            live_controls,
            endpoints: PlatformEndpoints {
                meta: env.url("RELAY_META_BASE_URL", defaults.meta),
                ga4: env.url("RELAY_GA4_BASE_URL", defaults.ga4),
                tiktok: env.url("RELAY_TIKTOK_BASE_URL", defaults.tiktok),
            },
        })
    }

    pub(crate) fn rules_config(&self) -> RulesConfig {
        RulesConfig {
            dedup_ttl: Duration::from_secs(self.dedup_ttl_seconds),
            rate_limit_max: self.rate_limit_max,
            rate_limit_window: Duration::from_secs(self.rate_limit_window_seconds),
        }
    }

    pub(crate) fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            batch_size: self.batch_size,
            watermark_mode: self.watermark_mode,
            max_in_flight: self.max_in_flight,
        }
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str) -> AppResult<String> {
        self.optional(name)
            .ok_or_else(|| AppError::Validation(format!("{name} is required")))
    }

    fn number<T>(&self, name: &str, default: T) -> AppResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            Some(value) => value.parse::<T>().map_err(|error| {
                AppError::Validation(format!("invalid {name} value '{value}': {error}"))
            }),
            None => Ok(default),
        }
    }

    fn positive<T>(&self, name: &str, default: T) -> AppResult<T>
    where
        T: FromStr + Default + PartialEq,
        T::Err: std::fmt::Display,
    {
        let value = self.number(name, default)?;
        if value == T::default() {
            return Err(AppError::Validation(format!(
                "{name} must be greater than zero"
            )));
        }
        Ok(value)
    }

    fn bool(&self, name: &str, default: bool) -> AppResult<bool> {
        match self.optional(name) {
            Some(value) => parse_bool(name, value.as_str()),
            None => Ok(default),
        }
    }

    fn list<T, P>(&self, name: &str, parse: P) -> AppResult<Vec<T>>
    where
        P: Fn(&str) -> AppResult<T>,
    {
        self.optional(name)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| {
                        parse(item).map_err(|error| {
                            AppError::Validation(format!("invalid {name} entry '{item}': {error}"))
                        })
                    })
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn dry_run_overrides(&self, name: &str) -> AppResult<HashMap<IntegrationType, bool>> {
        let pairs = self.list(name, |item| {
            let (integration_type, dry_run) = item.split_once('=').ok_or_else(|| {
                AppError::Validation("expected '<integration>=<true|false>'".to_owned())
            })?;
            Ok((
                IntegrationType::from_str(integration_type.trim())?,
                parse_bool(name, dry_run.trim())?,
            ))
        })?;

        Ok(pairs.into_iter().collect())
    }

    fn url(&self, name: &str, default: String) -> String {
        self.optional(name)
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_owned()
    }
}

fn parse_bool(name: &str, value: &str) -> AppResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(AppError::Validation(format!(
            "invalid {name} value '{value}': expected a boolean"
        ))),
    }
}
