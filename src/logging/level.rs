use crate::error::{LogCtlError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Ordered severity threshold
///
/// Ordering follows the numeric value, so `Level::Fine < Level::Info < Level::Warning`.
/// `All` sorts below everything and `Off` above everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Off,
    Severe,
    Warning,
    Info,
    Config,
    Fine,
    Finer,
    Finest,
    All,
}

const NAMED: [Level; 9] = [
    Level::Off,
    Level::Severe,
    Level::Warning,
    Level::Info,
    Level::Config,
    Level::Fine,
    Level::Finer,
    Level::Finest,
    Level::All,
];

impl Level {
    /// Numeric severity value
    pub fn value(&self) -> i32 {
        match self {
            Level::Off => i32::MAX,
            Level::Severe => 1000,
            Level::Warning => 900,
            Level::Info => 800,
            Level::Config => 700,
            Level::Fine => 500,
            Level::Finer => 400,
            Level::Finest => 300,
            Level::All => i32::MIN,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Level::Off => "OFF",
            Level::Severe => "SEVERE",
            Level::Warning => "WARNING",
            Level::Info => "INFO",
            Level::Config => "CONFIG",
            Level::Fine => "FINE",
            Level::Finer => "FINER",
            Level::Finest => "FINEST",
            Level::All => "ALL",
        }
    }

    /// Parse a level from its name (case-insensitive) or its exact numeric value
    ///
    /// # Returns
    /// * `Ok(Level)` - Known level
    /// * `Err(LogCtlError::InvalidLevel)` - Anything else
    pub fn parse(s: &str) -> Result<Level> {
        let trimmed = s.trim();
        if let Some(level) = NAMED
            .iter()
            .find(|level| level.name().eq_ignore_ascii_case(trimmed))
        {
            return Ok(*level);
        }

        if let Ok(value) = trimmed.parse::<i32>() {
            if let Some(level) = NAMED.iter().find(|level| level.value() == value) {
                return Ok(*level);
            }
        }

        Err(LogCtlError::InvalidLevel(format!(
            "'{}' is not one of {}",
            s,
            NAMED.iter().map(|l| l.name()).collect::<Vec<_>>().join(", ")
        )))
    }

    /// Whether a record at `self` passes a threshold of `threshold`
    pub fn passes(&self, threshold: Level) -> bool {
        *self != Level::Off && threshold != Level::Off && self.value() >= threshold.value()
    }
}

impl PartialOrd for Level {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Level {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value().cmp(&other.value())
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Level {
    type Err = LogCtlError;

    fn from_str(s: &str) -> Result<Self> {
        Level::parse(s)
    }
}

impl From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => Level::Severe,
            tracing::Level::WARN => Level::Warning,
            tracing::Level::INFO => Level::Info,
            tracing::Level::DEBUG => Level::Fine,
            tracing::Level::TRACE => Level::Finest,
        }
    }
}

// Levels travel as their names so the wire format stays readable
impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Level::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_case_insensitive() {
        assert_eq!(Level::parse("FINE").unwrap(), Level::Fine);
        assert_eq!(Level::parse("fine").unwrap(), Level::Fine);
        assert_eq!(Level::parse(" all ").unwrap(), Level::All);
        assert_eq!(Level::parse("Warning").unwrap(), Level::Warning);
    }

    #[test]
    fn test_parse_numeric_values() {
        assert_eq!(Level::parse("800").unwrap(), Level::Info);
        assert_eq!(Level::parse("300").unwrap(), Level::Finest);
        assert!(Level::parse("801").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = Level::parse("LOUD").unwrap_err();
        assert!(matches!(err, LogCtlError::InvalidLevel(_)));
        assert!(Level::parse("").is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(Level::Fine < Level::Info);
        assert!(Level::Info < Level::Warning);
        assert!(Level::All < Level::Finest);
        assert!(Level::Off > Level::Severe);
    }

    #[test]
    fn test_passes() {
        assert!(Level::Info.passes(Level::Fine));
        assert!(Level::Info.passes(Level::All));
        assert!(!Level::Fine.passes(Level::Info));
        assert!(!Level::Severe.passes(Level::Off));
    }

    #[test]
    fn test_tracing_mapping() {
        assert_eq!(Level::from(&tracing::Level::DEBUG), Level::Fine);
        assert_eq!(Level::from(&tracing::Level::ERROR), Level::Severe);
    }

    #[test]
    fn test_serde_uses_names() {
        let json = serde_json::to_string(&Level::Finer).unwrap();
        assert_eq!(json, "\"FINER\"");
        let level: Level = serde_json::from_str("\"config\"").unwrap();
        assert_eq!(level, Level::Config);
    }
}
