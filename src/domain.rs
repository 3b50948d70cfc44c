use std::{fmt, ops::Deref};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// canonical bare-hostname values used as the unit of blocking

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("'{input}' does not contain a domain")]
    Empty { input: String },
}

/// A lowercase hostname without scheme, leading `www.` or path.
///
/// Only obtainable through [`Domain::parse`], so the value is never empty
/// and never contains `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let host = normalize(input);
        if host.is_empty() {
            return Err(DomainError::Empty {
                input: input.to_string(),
            });
        }
        Ok(Self(host))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last two dot-separated labels, `None` for single-label hosts.
    ///
    /// Multi-part public suffixes are not special-cased, so
    /// `news.example.co.uk` yields `co.uk`.
    pub fn base_domain(&self) -> Option<&str> {
        let mut dots = self.0.rmatch_indices('.');
        match (dots.next(), dots.next()) {
            (Some(_), Some((idx, _))) => Some(&self.0[idx + 1..]),
            (Some(_), None) => Some(&self.0),
            _ => None,
        }
    }
}

impl Deref for Domain {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Domain {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Domain> for String {
    fn from(value: Domain) -> Self {
        value.0
    }
}

/// Canonicalizes user input into a bare hostname.
///
/// The result may be empty; [`Domain::parse`] turns that into an error.
pub fn normalize(input: &str) -> String {
    let lowered = input.to_lowercase();
    let mut host = lowered.as_str();

    // strip to a fixpoint so normalize(normalize(s)) == normalize(s)
    loop {
        let before = host.len();
        host = host.trim();
        if let Some(stripped) = host.strip_prefix("http://") {
            host = stripped;
        } else if let Some(stripped) = host.strip_prefix("https://") {
            host = stripped;
        }
        if let Some(stripped) = host.strip_prefix("www.") {
            host = stripped;
        }
        if host.len() == before {
            break;
        }
    }

    if let Some((before, _)) = host.split_once('/') {
        host = before;
    }

    host.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_www_and_path() {
        assert_eq!(normalize("https://WWW.Example.com/path?q=1"), "example.com");
        assert_eq!(normalize("  http://news.example.com/a/b "), "news.example.com");
        assert_eq!(normalize("example.com"), "example.com");
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = [
            "https://WWW.Example.com/path?q=1",
            "www.www.example.com",
            "http://https://example.com",
            "http:// www.example.com /x",
            "EXAMPLE.org",
            "sub.domain.example.co.uk/",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "input {input:?}");
        }
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(Domain::parse("   "), Err(DomainError::Empty { .. })));
        assert!(Domain::parse("https://").is_err());
        assert!(Domain::parse("www./path").is_err());
    }

    #[test]
    fn parsed_domain_never_contains_slash() {
        let domain = Domain::parse("https://example.com/a/b/c").unwrap();
        assert_eq!(domain.as_str(), "example.com");
        assert!(!domain.contains('/'));
    }

    #[test]
    fn base_domain_takes_last_two_labels() {
        let d = |s: &str| Domain::parse(s).unwrap();
        assert_eq!(d("news.example.com").base_domain(), Some("example.com"));
        assert_eq!(d("example.com").base_domain(), Some("example.com"));
        assert_eq!(d("news.example.co.uk").base_domain(), Some("co.uk"));
        assert_eq!(d("localhost").base_domain(), None);
    }

    #[test]
    fn deserializing_normalizes() {
        let domain: Domain = serde_json::from_str("\"https://www.Example.com/\"").unwrap();
        assert_eq!(domain.as_str(), "example.com");
        assert!(serde_json::from_str::<Domain>("\"  \"").is_err());
    }
}
