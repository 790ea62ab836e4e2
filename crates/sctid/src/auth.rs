use crate::{Error, Result};
use std::collections::HashMap;

/// Principal a credential resolved to. Used verbatim as the requestor id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Principal(String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Principal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Gate consulted before any coordinator call.
pub trait Authorizer: Send + Sync {
    /// # Errors
    /// [`Error::Unauthorized`] if the credential is unknown or missing.
    fn authorize(&self, credential: Option<&str>) -> Result<Principal>;
}

/// Fixed token → principal table.
#[derive(Clone, Debug, Default)]
pub struct StaticTokenAuthorizer {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenAuthorizer {
    pub fn new<I, T, P>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (T, P)>,
        T: Into<String>,
        P: Into<String>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(|(t, p)| (t.into(), Principal::new(p)))
                .collect(),
        }
    }

    /// Parses `token=principal` pairs separated by commas.
    ///
    /// # Errors
    /// [`Error::BadRequest`] on a pair without `=` or with an empty side.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut tokens = HashMap::new();
        for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (token, principal) = pair
                .split_once('=')
                .map(|(t, p)| (t.trim(), p.trim()))
                .filter(|(t, p)| !t.is_empty() && !p.is_empty())
                .ok_or_else(|| Error::bad_request(format!("malformed token entry: {pair:?}")))?;
            tokens.insert(token.to_owned(), Principal::new(principal));
        }
        Ok(Self { tokens })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authorizer for StaticTokenAuthorizer {
    fn authorize(&self, credential: Option<&str>) -> Result<Principal> {
        let credential = credential.ok_or_else(|| Error::Unauthorized {
            reason: "missing credential".into(),
        })?;
        self.tokens
            .get(credential)
            .cloned()
            .ok_or_else(|| Error::Unauthorized {
                reason: "unknown credential".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_tokens() {
        let auth = StaticTokenAuthorizer::parse("s3cret=alice, other = bob").unwrap();
        assert_eq!(auth.len(), 2);
        assert_eq!(auth.authorize(Some("s3cret")).unwrap().as_str(), "alice");
        assert_eq!(auth.authorize(Some("other")).unwrap().as_str(), "bob");
    }

    #[test]
    fn rejects_unknown_and_missing() {
        let auth = StaticTokenAuthorizer::new([("t", "alice")]);
        assert!(matches!(
            auth.authorize(Some("nope")),
            Err(Error::Unauthorized { .. })
        ));
        assert!(matches!(auth.authorize(None), Err(Error::Unauthorized { .. })));
    }

    #[test]
    fn malformed_table_is_rejected() {
        assert!(StaticTokenAuthorizer::parse("token-without-principal").is_err());
        assert!(StaticTokenAuthorizer::parse("=alice").is_err());
        assert!(StaticTokenAuthorizer::parse("").unwrap().is_empty());
    }
}
