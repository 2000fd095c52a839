//! Qualified names for feature types and attributes.
//!
//! A name is an optional namespace plus a local part, written `ns:local`.
//! Parsing splits on the last `:` so namespace URIs such as
//! `http://example.org/roads:segment` keep their scheme separator.
//!
//! ## Ordering
//!
//! Names order by namespace first (absent namespace sorts first), then local
//! part.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Separator between namespace and local part in the text form.
pub const NAME_SEPARATOR: char = ':';

/// Namespace-qualified name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenericName {
    namespace: Option<Arc<str>>,
    local: Arc<str>,
}

impl GenericName {
    /// Create an unqualified name.
    pub fn local(local: impl AsRef<str>) -> Self {
        Self {
            namespace: None,
            local: Arc::from(local.as_ref()),
        }
    }

    /// Create a qualified name. An empty namespace is treated as absent.
    pub fn qualified(namespace: impl AsRef<str>, local: impl AsRef<str>) -> Self {
        let ns = namespace.as_ref();
        Self {
            namespace: (!ns.is_empty()).then(|| Arc::from(ns)),
            local: Arc::from(local.as_ref()),
        }
    }

    /// Parse `ns:local` or `local`.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let (ns, local) = match text.rfind(NAME_SEPARATOR) {
            Some(pos) => (&text[..pos], &text[pos + 1..]),
            None => ("", text),
        };
        if local.is_empty() {
            return Err(Error::invalid_name(format!(
                "name '{}' has an empty local part",
                text
            )));
        }
        Ok(Self::qualified(ns, local))
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn local_part(&self) -> &str {
        &self.local
    }

    pub fn is_qualified(&self) -> bool {
        self.namespace.is_some()
    }

    /// Same local part, namespace replaced.
    pub fn with_namespace(&self, namespace: Option<&str>) -> Self {
        match namespace {
            Some(ns) => Self::qualified(ns, &*self.local),
            None => Self::local(&*self.local),
        }
    }
}

impl fmt::Display for GenericName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}{}{}", ns, NAME_SEPARATOR, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

impl FromStr for GenericName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<&str> for GenericName {
    /// Unqualified name; use [`GenericName::parse`] for `ns:local` text.
    fn from(local: &str) -> Self {
        Self::local(local)
    }
}
