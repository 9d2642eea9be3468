//! Log redaction for concealed secrets.

use regex::Regex;
use std::borrow::Cow;
use tracing::{debug, warn};

use crate::models::Secret;

const MASK: &str = "*****";

/// Replaces concealed secret values in log output with `*****`.
#[derive(Debug, Clone, Default)]
pub struct SecretReplacer {
    pattern: Option<Regex>,
}

impl SecretReplacer {
    pub fn new(secrets: &[Secret]) -> Self {
        let mut values: Vec<&str> = secrets
            .iter()
            .filter(|s| s.conceal && !s.value.is_empty())
            .map(|s| s.value.as_str())
            .collect();
        if values.is_empty() {
            return Self::default();
        }

        // longest first so overlapping values are masked whole
        values.sort_by(|a, b| b.len().cmp(&a.len()));
        values.dedup();

        let alternation = values
            .iter()
            .map(|v| regex::escape(v))
            .collect::<Vec<_>>()
            .join("|");

        match Regex::new(&alternation) {
            Ok(pattern) => {
                debug!("🔒 Redacting {} concealed secret value(s)", values.len());
                Self {
                    pattern: Some(pattern),
                }
            }
            Err(e) => {
                warn!("⚠️ Failed to build secret redactor: {}", e);
                Self::default()
            }
        }
    }

    pub fn is_noop(&self) -> bool {
        self.pattern.is_none()
    }

    pub fn replace<'a>(&self, line: &'a str) -> Cow<'a, str> {
        match &self.pattern {
            Some(pattern) => pattern.replace_all(line, MASK),
            None => Cow::Borrowed(line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concealed(value: &str) -> Secret {
        Secret {
            conceal: true,
            ..Secret::new("SECRET", value)
        }
    }

    #[test]
    fn test_replace_concealed() {
        let replacer = SecretReplacer::new(&[concealed("secret_value")]);
        assert_eq!(replacer.replace("This is SECRET: secret_value"), "This is SECRET: *****");
    }

    #[test]
    fn test_plain_secrets_pass_through() {
        let replacer = SecretReplacer::new(&[Secret::new("SECRET", "secret_value")]);
        assert!(replacer.is_noop());
        assert_eq!(
            replacer.replace("This is SECRET: secret_value"),
            "This is SECRET: secret_value"
        );
    }

    #[test]
    fn test_overlapping_and_special_values() {
        let replacer = SecretReplacer::new(&[concealed("abc"), concealed("abcdef"), concealed("a.b*c")]);
        assert_eq!(replacer.replace("abcdef abc a.b*c axbc"), "***** ***** ***** axbc");
    }

    #[test]
    fn test_empty_values_ignored() {
        let replacer = SecretReplacer::new(&[concealed("")]);
        assert!(replacer.is_noop());
        assert_eq!(replacer.replace("nothing to hide"), "nothing to hide");
    }
}
