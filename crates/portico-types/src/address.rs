//! URL-shaped function addresses.
//!
//! An [`Address`] uniquely identifies a function within the portal that owns
//! its scheme. Canonical form: `scheme://[authority]/path[?query][#fragment]`.
//! Addresses are immutable once built; construct them with [`Address::parse`]
//! or [`AddressBuilder`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Schemes served without leaving the process.
const LOCAL_SCHEMES: &[&str] = &["local", "test"];

/// Schemes that cross a network boundary.
const NETWORK_SCHEMES: &[&str] = &["http", "https", "ws", "wss"];

/// Error from parsing or building an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// No `scheme://` prefix and generic URL parsing found no scheme either.
    MissingScheme,
    /// The address text could not be interpreted.
    Malformed(String),
    /// The scheme is valid but not one the resolving portal serves.
    UnsupportedScheme(String),
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::MissingScheme => write!(f, "address has no scheme"),
            AddressError::Malformed(msg) => write!(f, "malformed address: {msg}"),
            AddressError::UnsupportedScheme(s) => write!(f, "unsupported scheme: {s}"),
        }
    }
}

impl std::error::Error for AddressError {}

/// A parsed, immutable function address.
///
/// The query map is ordered, so formatting an address is deterministic and
/// parse → `to_string()` round-trips to a semantically equivalent value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    scheme: String,
    authority: String,
    path: String,
    query: BTreeMap<String, String>,
    fragment: Option<String>,
}

impl Address {
    /// Parse the canonical `scheme://[authority]/path[?query][#fragment]` form.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let (scheme, rest) = match input.split_once("://") {
            Some((scheme, rest)) if !scheme.is_empty() => (scheme, rest),
            _ => return Err(AddressError::MissingScheme),
        };
        if !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(AddressError::Malformed(format!("invalid scheme: {scheme}")));
        }

        let (rest, fragment) = match rest.split_once('#') {
            Some((rest, frag)) => (rest, Some(frag.to_string())),
            None => (rest, None),
        };
        let (rest, raw_query) = match rest.split_once('?') {
            Some((rest, q)) => (rest, Some(q)),
            None => (rest, None),
        };
        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };

        let mut query = BTreeMap::new();
        if let Some(raw) = raw_query {
            for pair in raw.split('&').filter(|p| !p.is_empty()) {
                match pair.split_once('=') {
                    Some((k, v)) => query.insert(k.to_string(), v.to_string()),
                    None => query.insert(pair.to_string(), String::new()),
                };
            }
        }

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            authority: authority.to_string(),
            path: path.to_string(),
            query,
            fragment,
        })
    }

    /// Start building an address with the given scheme.
    pub fn builder(scheme: impl Into<String>) -> AddressBuilder {
        AddressBuilder::new(scheme)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    /// Look up a single query parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// The final path segment, conventionally the function name.
    pub fn function_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    /// Whether this address resolves without leaving the process.
    pub fn is_local(&self) -> bool {
        LOCAL_SCHEMES.contains(&self.scheme.as_str())
    }

    /// Whether this address crosses a network boundary.
    pub fn is_network(&self) -> bool {
        NETWORK_SCHEMES.contains(&self.scheme.as_str())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.path)?;
        let mut sep = '?';
        for (k, v) in &self.query {
            if v.is_empty() {
                write!(f, "{sep}{k}")?;
            } else {
                write!(f, "{sep}{k}={v}")?;
            }
            sep = '&';
        }
        if let Some(frag) = &self.fragment {
            write!(f, "#{frag}")?;
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

/// Fluent constructor for [`Address`].
#[derive(Debug, Clone, Default)]
pub struct AddressBuilder {
    scheme: String,
    authority: String,
    path: String,
    query: BTreeMap<String, String>,
    fragment: Option<String>,
}

impl AddressBuilder {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    /// Set the path. A leading `/` is added when missing.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.is_empty() || path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        self
    }

    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn query(mut self, query: BTreeMap<String, String>) -> Self {
        self.query = query;
        self
    }

    pub fn fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }

    pub fn build(self) -> Result<Address, AddressError> {
        if self.scheme.is_empty() {
            return Err(AddressError::MissingScheme);
        }
        Ok(Address {
            scheme: self.scheme,
            authority: self.authority,
            path: self.path,
            query: self.query,
            fragment: self.fragment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_form() {
        let addr = Address::parse("ws://host:9000/calc/add?version=2&mode=fast#frag").unwrap();
        assert_eq!(addr.scheme(), "ws");
        assert_eq!(addr.authority(), "host:9000");
        assert_eq!(addr.path(), "/calc/add");
        assert_eq!(addr.query_param("version"), Some("2"));
        assert_eq!(addr.query_param("mode"), Some("fast"));
        assert_eq!(addr.fragment(), Some("frag"));
        assert_eq!(addr.function_name(), "add");
    }

    #[test]
    fn display_round_trips() {
        let addr = Address::parse("http://127.0.0.1:8080/call/echo?b=2&a=1").unwrap();
        let reparsed = Address::parse(&addr.to_string()).unwrap();
        assert_eq!(addr, reparsed);
    }

    #[test]
    fn builder_round_trips() {
        let addr = Address::builder("https")
            .authority("example.com")
            .path("fn/lookup")
            .query_param("tenant", "t1")
            .fragment("v1")
            .build()
            .unwrap();
        let parsed = Address::parse(&addr.to_string()).unwrap();
        assert_eq!(parsed.scheme(), "https");
        assert_eq!(parsed.authority(), "example.com");
        assert_eq!(parsed.path(), "/fn/lookup");
        assert_eq!(parsed.query_param("tenant"), Some("t1"));
        assert_eq!(parsed.fragment(), Some("v1"));
        assert_eq!(addr, parsed);
    }

    #[test]
    fn missing_scheme_rejected() {
        assert_eq!(Address::parse("no-scheme-here"), Err(AddressError::MissingScheme));
        assert_eq!(Address::parse("://x"), Err(AddressError::MissingScheme));
    }

    #[test]
    fn locality_by_scheme() {
        assert!(Address::parse("local://main/echo").unwrap().is_local());
        assert!(Address::parse("test://mock/echo").unwrap().is_local());
        for net in ["http", "https", "ws", "wss"] {
            let addr = Address::parse(&format!("{net}://h/f")).unwrap();
            assert!(addr.is_network(), "{net} should be a network scheme");
            assert!(!addr.is_local());
        }
    }

    #[test]
    fn authority_only_address() {
        let addr = Address::parse("local://registry").unwrap();
        assert_eq!(addr.authority(), "registry");
        assert_eq!(addr.path(), "");
        assert_eq!(addr.to_string(), "local://registry");
    }
}
