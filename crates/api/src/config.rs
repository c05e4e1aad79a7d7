//! Process configuration from environment variables.

use std::time::Duration;

use tracing::warn;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
pub const DEFAULT_SCHEDULE_SECS: u64 = 15 * 60;
pub const DEFAULT_NARRATIVE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent";

#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeSettings {
    pub url: String,
    pub api_key: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub schedule_interval: Duration,
    pub scheduler_enabled: bool,
    pub unit_timeout: Option<Duration>,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub seed_demo_data: bool,
    /// `None` disables narrative summaries.
    pub narrative: Option<NarrativeSettings>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            schedule_interval: Duration::from_secs(DEFAULT_SCHEDULE_SECS),
            scheduler_enabled: true,
            unit_timeout: None,
            use_persistent_stores: false,
            database_url: None,
            seed_demo_data: true,
            narrative: None,
        }
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %v, "invalid value; using default");
            default
        }),
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source (tests inject a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let bind_addr = lookup("OPSPILOT_BIND_ADDR").unwrap_or(defaults.bind_addr);

        let mut schedule_secs = parse_or("OPSPILOT_SCHEDULE_SECS", lookup("OPSPILOT_SCHEDULE_SECS"), DEFAULT_SCHEDULE_SECS);
        if schedule_secs == 0 {
            warn!("OPSPILOT_SCHEDULE_SECS must be positive; using default");
            schedule_secs = DEFAULT_SCHEDULE_SECS;
        }

        let unit_timeout = lookup("OPSPILOT_UNIT_TIMEOUT_SECS")
            .and_then(|v| match v.trim().parse::<u64>() {
                Ok(0) | Err(_) => {
                    warn!(value = %v, "invalid OPSPILOT_UNIT_TIMEOUT_SECS; units run without a timeout");
                    None
                }
                Ok(secs) => Some(Duration::from_secs(secs)),
            });

        let narrative = match lookup("NARRATIVE_API_KEY").filter(|k| !k.trim().is_empty()) {
            Some(api_key) => Some(NarrativeSettings {
                url: lookup("NARRATIVE_API_URL").unwrap_or_else(|| DEFAULT_NARRATIVE_URL.to_string()),
                api_key,
                timeout: Duration::from_secs(parse_or(
                    "NARRATIVE_TIMEOUT_SECS",
                    lookup("NARRATIVE_TIMEOUT_SECS"),
                    20,
                )),
            }),
            None => None,
        };

        Self {
            bind_addr,
            schedule_interval: Duration::from_secs(schedule_secs),
            scheduler_enabled: parse_or(
                "OPSPILOT_SCHEDULER_ENABLED",
                lookup("OPSPILOT_SCHEDULER_ENABLED"),
                defaults.scheduler_enabled,
            ),
            unit_timeout,
            use_persistent_stores: parse_or(
                "USE_PERSISTENT_STORES",
                lookup("USE_PERSISTENT_STORES"),
                defaults.use_persistent_stores,
            ),
            database_url: lookup("DATABASE_URL"),
            seed_demo_data: parse_or(
                "OPSPILOT_SEED_DEMO_DATA",
                lookup("OPSPILOT_SEED_DEMO_DATA"),
                defaults.seed_demo_data,
            ),
            narrative,
        }
    }
}
