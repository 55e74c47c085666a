use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{TypesError, TypesResult};

static EVENT_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]+:[A-Z0-9_]+$").ok());
static SEMVER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+(-[a-zA-Z0-9.]+)?$").ok());

const DEFAULT_VERSION: &str = "1.0.0";

/// Contract for an application-level event published through the outbox.
///
/// Names follow `DOMAIN:VERB` (uppercase, digits and `_` in the verb) and
/// versions are semantic versions. Both are checked at construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemEvent {
    name: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl SystemEvent {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> TypesResult<Self> {
        let name = name.into();
        let version = version.into();
        if !matches(&EVENT_NAME, &name) {
            return Err(TypesError::InvalidEventName(name));
        }
        if !matches(&SEMVER, &version) {
            return Err(TypesError::InvalidEventVersion(version));
        }
        Ok(Self {
            name,
            version,
            description: None,
        })
    }

    /// Event at version 1.0.0.
    pub fn named(name: impl Into<String>) -> TypesResult<Self> {
        Self::new(name, DEFAULT_VERSION)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn domain(&self) -> &str {
        self.name.split_once(':').map(|(d, _)| d).unwrap_or(&self.name)
    }

    pub fn verb(&self) -> &str {
        self.name.split_once(':').map(|(_, v)| v).unwrap_or("")
    }
}

fn matches(pattern: &LazyLock<Option<Regex>>, text: &str) -> bool {
    pattern.as_ref().map(|re| re.is_match(text)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_domain_verb_names() {
        let event = SystemEvent::named("USER:LOGIN").unwrap();
        assert_eq!(event.domain(), "USER");
        assert_eq!(event.verb(), "LOGIN");
        assert_eq!(event.version(), "1.0.0");

        assert!(SystemEvent::new("INVOICE:PAYMENT_FAILED", "2.1.0-rc.1").is_ok());
    }

    #[test]
    fn rejects_malformed_names() {
        for bad in ["user:login", "USER", "USER:", ":LOGIN", "USER:LOG-IN", "USER:LOGIN:X"] {
            assert_eq!(
                SystemEvent::named(bad),
                Err(TypesError::InvalidEventName(bad.to_string())),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_non_semver_versions() {
        assert!(matches!(
            SystemEvent::new("USER:LOGIN", "1.0"),
            Err(TypesError::InvalidEventVersion(_))
        ));
        assert!(matches!(
            SystemEvent::new("USER:LOGIN", "v1.0.0"),
            Err(TypesError::InvalidEventVersion(_))
        ));
    }
}
