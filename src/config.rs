//! Cache Configuration
//!
//! Freshness policies per listing kind, loaded from YAML:
//!
//! ```yaml
//! board:
//!   soft: 1h
//!   hard: 24h
//! portfolio_submissions:
//!   soft: 15m
//!   hard: 6h
//! read_ahead: 2
//! ```
//!
//! Kinds left out keep their default policy.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::listing::{ListingKind, ListingPolicies};
use crate::paged::{FreshnessPolicy, DEFAULT_READ_AHEAD, NEVER};

// =============================================================================
// Duration Parsing
// =============================================================================

/// Parse a Go-style duration string (e.g., "1h30m", "250ms", "45s", "1d").
///
/// A bare number is seconds. "0" is zero; "never", "inf" and "infinite"
/// are unbounded.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::DurationParse("empty duration string".to_string()));
    }
    if matches!(
        s.to_ascii_lowercase().as_str(),
        "never" | "inf" | "infinite"
    ) {
        return Ok(NEVER);
    }

    let mut total_ms: u64 = 0;
    let mut num_buf = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            num_buf.push(c);
            continue;
        }

        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;
        num_buf.clear();

        let multiplier = match c {
            'm' | 'M' if chars.peek().is_some_and(|n| n.eq_ignore_ascii_case(&'s')) => {
                chars.next();
                1
            }
            'h' | 'H' => 3_600_000,
            'm' | 'M' => 60_000,
            's' | 'S' => 1_000,
            'd' | 'D' => 86_400_000,
            _ => {
                return Err(Error::DurationParse(format!(
                    "unknown duration unit: {}",
                    c
                )))
            }
        };

        total_ms = num
            .checked_mul(multiplier)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(|| Error::DurationParse(format!("duration overflows: {}", s)))?;
    }

    // Handle case where string ends with a number (assume seconds)
    if !num_buf.is_empty() {
        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;
        total_ms = num
            .checked_mul(1_000)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(|| Error::DurationParse(format!("duration overflows: {}", s)))?;
    }

    Ok(Duration::from_millis(total_ms))
}

fn never() -> String {
    "never".to_string()
}

fn default_read_ahead() -> usize {
    DEFAULT_READ_AHEAD
}

// =============================================================================
// Settings
// =============================================================================

/// Soft/hard limits as duration strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySpec {
    pub soft: String,
    #[serde(default = "never")]
    pub hard: String,
}

impl PolicySpec {
    pub fn new(soft: impl Into<String>, hard: impl Into<String>) -> Self {
        Self {
            soft: soft.into(),
            hard: hard.into(),
        }
    }

    /// Parse and validate into a policy
    pub fn to_policy(&self) -> Result<FreshnessPolicy> {
        FreshnessPolicy::new(parse_duration(&self.soft)?, parse_duration(&self.hard)?)
    }
}

/// Cache settings file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub board: Option<PolicySpec>,
    pub board_msg: Option<PolicySpec>,
    pub portfolio: Option<PolicySpec>,
    pub portfolio_submissions: Option<PolicySpec>,
    /// Pages streamed ahead of the consumer
    #[serde(default = "default_read_ahead")]
    pub read_ahead: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            board: None,
            board_msg: None,
            portfolio: None,
            portfolio_submissions: None,
            read_ahead: DEFAULT_READ_AHEAD,
        }
    }
}

impl CacheSettings {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let settings: Self = serde_yaml::from_str(yaml)?;
        settings.policies()?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading cache settings");
        Self::from_yaml_str(&yaml)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    fn spec_for(&self, kind: ListingKind) -> Option<&PolicySpec> {
        match kind {
            ListingKind::Board => self.board.as_ref(),
            ListingKind::BoardMsg => self.board_msg.as_ref(),
            ListingKind::Portfolio => self.portfolio.as_ref(),
            ListingKind::PortfolioSubmissions => self.portfolio_submissions.as_ref(),
        }
    }

    /// Resolve the policy of every kind, falling back to defaults
    pub fn policies(&self) -> Result<ListingPolicies> {
        let mut policies = ListingPolicies::default();
        for kind in ListingKind::ALL {
            if let Some(spec) = self.spec_for(kind) {
                let policy = spec
                    .to_policy()
                    .map_err(|e| Error::Config(format!("{}: {}", kind, e)))?;
                policies.set(kind, policy);
            }
        }
        Ok(policies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    // =========================================================================
    // parse_duration Tests
    // =========================================================================

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_parse_duration_compound() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(
            parse_duration("1m30s500ms").unwrap(),
            Duration::from_millis(90_500)
        );
        assert_eq!(parse_duration(" 2h ").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn test_parse_duration_bare_number_is_seconds() {
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_duration_unbounded() {
        assert_eq!(parse_duration("never").unwrap(), NEVER);
        assert_eq!(parse_duration("INF").unwrap(), NEVER);
        assert_eq!(parse_duration("infinite").unwrap(), NEVER);
    }

    #[test]
    fn test_parse_duration_errors() {
        assert_matches!(parse_duration(""), Err(Error::DurationParse(_)));
        assert_matches!(parse_duration("5x"), Err(Error::DurationParse(_)));
        assert_matches!(parse_duration("h"), Err(Error::DurationParse(_)));
        assert_matches!(parse_duration("1.5h"), Err(Error::DurationParse(_)));
    }

    // =========================================================================
    // Settings Tests
    // =========================================================================

    #[test]
    fn test_empty_settings_use_defaults() {
        let settings = CacheSettings::from_yaml_str("{}").unwrap();
        assert_eq!(settings.read_ahead, DEFAULT_READ_AHEAD);
        assert_eq!(settings.policies().unwrap(), ListingPolicies::default());
    }

    #[test]
    fn test_settings_override_some_kinds() {
        let yaml = r#"
board:
  soft: 10m
  hard: 1h
portfolio_submissions:
  soft: "0"
  hard: "0"
read_ahead: 3
"#;
        let settings = CacheSettings::from_yaml_str(yaml).unwrap();
        let policies = settings.policies().unwrap();

        assert_eq!(policies.board.soft(), Duration::from_secs(600));
        assert_eq!(policies.board.hard(), Duration::from_secs(3600));
        assert!(policies.portfolio_submissions.is_uncached());
        assert_eq!(policies.board_msg, FreshnessPolicy::BOARD_MSG);
        assert_eq!(settings.read_ahead, 3);
    }

    #[test]
    fn test_hard_defaults_to_never() {
        let settings = CacheSettings::from_yaml_str("portfolio:\n  soft: 5m\n").unwrap();
        let policy = settings.policies().unwrap().portfolio;
        assert!(policy.never_expires());
        assert_eq!(policy.soft(), Duration::from_secs(300));
    }

    #[test]
    fn test_settings_reject_hard_below_soft() {
        let yaml = "board:\n  soft: 2h\n  hard: 1h\n";
        assert_matches!(CacheSettings::from_yaml_str(yaml), Err(Error::Config(_)));
    }

    #[test]
    fn test_settings_reject_unknown_fields() {
        assert_matches!(
            CacheSettings::from_yaml_str("boards:\n  soft: 1h\n"),
            Err(Error::Yaml(_))
        );
    }

    #[test]
    fn test_settings_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "board_msg:\n  soft: 1m\n  hard: 2m").unwrap();

        let settings = CacheSettings::from_file(file.path()).unwrap();
        let policies = settings.policies().unwrap();
        assert_eq!(policies.board_msg.hard(), Duration::from_secs(120));

        assert_matches!(
            CacheSettings::from_file("/nonexistent/pagewise.yaml"),
            Err(Error::Io(_))
        );
    }
}
