//! Operation timeouts
//!
//! Every mutating verb waits under its own deadline. Users override the
//! defaults through a `timeouts` map attribute holding duration strings
//! such as `"10m"` or `"1h30m"`.

use std::collections::HashMap;
use std::time::Duration;

use crate::resource::Value;

/// Default timeout for create, update and delete (10 minutes)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Longest accepted timeout (30 days)
pub const MAX_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Lifecycle verb a timeout applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Create,
    Update,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeoutParseError {
    #[error("Invalid duration '{value}': {source}")]
    InvalidDuration {
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("Duration for '{0}' must be a string")]
    NotAString(String),

    #[error("Unknown timeout '{0}', expected one of: create, update, delete")]
    UnknownVerb(String),

    #[error("Timeout for '{0}' must be greater than zero")]
    Zero(String),

    #[error("Timeout for '{verb}' must not exceed {}", humantime::format_duration(*max))]
    TooLong { verb: String, max: Duration },
}

/// Parse a Terraform-style duration string ("30s", "10m", "1h30m")
pub fn parse_duration(value: &str) -> Result<Duration, TimeoutParseError> {
    humantime::parse_duration(value.trim()).map_err(|source| TimeoutParseError::InvalidDuration {
        value: value.to_string(),
        source,
    })
}

/// Per-verb timeouts of a resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceTimeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for ResourceTimeouts {
    fn default() -> Self {
        Self {
            create: DEFAULT_TIMEOUT,
            update: DEFAULT_TIMEOUT,
            delete: DEFAULT_TIMEOUT,
        }
    }
}

impl ResourceTimeouts {
    pub fn get(&self, verb: Verb) -> Duration {
        match verb {
            Verb::Create => self.create,
            Verb::Update => self.update,
            Verb::Delete => self.delete,
        }
    }

    pub fn with(mut self, verb: Verb, duration: Duration) -> Self {
        match verb {
            Verb::Create => self.create = duration,
            Verb::Update => self.update = duration,
            Verb::Delete => self.delete = duration,
        }
        self
    }

    /// Apply user overrides from a `timeouts` map attribute
    pub fn with_overrides(
        mut self,
        overrides: &HashMap<String, Value>,
    ) -> Result<Self, TimeoutParseError> {
        for (key, value) in overrides {
            let verb = match key.as_str() {
                "create" => Verb::Create,
                "update" => Verb::Update,
                "delete" => Verb::Delete,
                other => return Err(TimeoutParseError::UnknownVerb(other.to_string())),
            };
            let raw = value
                .as_str()
                .ok_or_else(|| TimeoutParseError::NotAString(key.clone()))?;
            let duration = parse_duration(raw)?;
            if duration.is_zero() {
                return Err(TimeoutParseError::Zero(key.clone()));
            }
            if duration > MAX_TIMEOUT {
                return Err(TimeoutParseError::TooLong {
                    verb: key.clone(),
                    max: MAX_TIMEOUT,
                });
            }
            self = self.with(verb, duration);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_terraform_style_durations() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert!(parse_duration("ten minutes").is_err());
    }

    #[test]
    fn defaults_are_ten_minutes() {
        let timeouts = ResourceTimeouts::default();
        assert_eq!(timeouts.get(Verb::Create), Duration::from_secs(600));
        assert_eq!(timeouts.get(Verb::Update), Duration::from_secs(600));
        assert_eq!(timeouts.get(Verb::Delete), Duration::from_secs(600));
    }

    #[test]
    fn overrides_replace_only_named_verbs() {
        let mut overrides = HashMap::new();
        overrides.insert("delete".to_string(), Value::String("20m".to_string()));

        let timeouts = ResourceTimeouts::default().with_overrides(&overrides).unwrap();
        assert_eq!(timeouts.delete, Duration::from_secs(1200));
        assert_eq!(timeouts.create, DEFAULT_TIMEOUT);
    }

    #[test]
    fn overrides_reject_unknown_verbs_and_zero() {
        let mut overrides = HashMap::new();
        overrides.insert("read".to_string(), Value::String("1m".to_string()));
        assert!(matches!(
            ResourceTimeouts::default().with_overrides(&overrides),
            Err(TimeoutParseError::UnknownVerb(v)) if v == "read"
        ));

        let mut overrides = HashMap::new();
        overrides.insert("create".to_string(), Value::String("0s".to_string()));
        assert!(matches!(
            ResourceTimeouts::default().with_overrides(&overrides),
            Err(TimeoutParseError::Zero(_))
        ));
    }

    #[test]
    fn overrides_reject_durations_beyond_thirty_days() {
        let mut overrides = HashMap::new();
        overrides.insert("create".to_string(), Value::String("500000000000y".to_string()));

        let err = ResourceTimeouts::default()
            .with_overrides(&overrides)
            .unwrap_err();
        assert!(matches!(&err, TimeoutParseError::TooLong { verb, .. } if verb == "create"));
        assert_eq!(err.to_string(), "Timeout for 'create' must not exceed 30days");

        let mut overrides = HashMap::new();
        overrides.insert("delete".to_string(), Value::String("30days".to_string()));
        let timeouts = ResourceTimeouts::default().with_overrides(&overrides).unwrap();
        assert_eq!(timeouts.delete, MAX_TIMEOUT);
    }
}
