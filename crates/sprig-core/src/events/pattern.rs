use std::fmt;

use super::EventError;

/// Name a bubble entry answers to: an exact event name, or a single `*`
/// at one edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventPattern {
    Exact(String),
    /// `*`
    Any,
    /// `prefix*`: `prefixclick` resolves to `click`.
    Prefix(String),
    /// `*suffix`: `clicksuffix` resolves to `click`.
    Suffix(String),
}

impl EventPattern {
    pub fn parse(pattern: &str) -> Result<Self, EventError> {
        let invalid = || EventError::InvalidPattern {
            pattern: pattern.to_string(),
        };
        if pattern.is_empty() {
            return Err(invalid());
        }
        match pattern.matches('*').count() {
            0 => Ok(EventPattern::Exact(pattern.to_string())),
            1 if pattern == "*" => Ok(EventPattern::Any),
            1 => {
                if let Some(suffix) = pattern.strip_prefix('*') {
                    Ok(EventPattern::Suffix(suffix.to_string()))
                } else if let Some(prefix) = pattern.strip_suffix('*') {
                    Ok(EventPattern::Prefix(prefix.to_string()))
                } else {
                    Err(invalid())
                }
            }
            _ => Err(invalid()),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        !matches!(self, EventPattern::Exact(_))
    }

    /// The underlying event name to attach for a listener on `name`, or
    /// `None` when the pattern does not match. An empty fragment never
    /// matches.
    pub fn resolve<'a>(&self, name: &'a str) -> Option<&'a str> {
        let resolved = match self {
            EventPattern::Exact(exact) => (exact == name).then_some(name),
            EventPattern::Any => Some(name),
            EventPattern::Prefix(prefix) => name.strip_prefix(prefix.as_str()),
            EventPattern::Suffix(suffix) => name.strip_suffix(suffix.as_str()),
        };
        resolved.filter(|r| !r.is_empty())
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventPattern::Exact(name) => f.write_str(name),
            EventPattern::Any => f.write_str("*"),
            EventPattern::Prefix(p) => write!(f, "{p}*"),
            EventPattern::Suffix(s) => write!(f, "*{s}"),
        }
    }
}

/// Whether `alias` is acceptable as the exposed name of a `*` forward.
pub fn is_valid_wildcard_alias(alias: &str) -> bool {
    EventPattern::parse(alias).is_ok_and(|p| p.is_wildcard())
}
