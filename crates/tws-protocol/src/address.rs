//! Object addresses: `<endpointLocator>` or `<endpointLocator>~<instanceId>`.
//!
//! An object reached through properties of another has no instance of its
//! own. It is addressed by extending its parent's locator with the member
//! path (`<endpointLocator>/Inner~<instanceId>`), which routes every call
//! through the parent.

use std::fmt;
use std::str::FromStr;

use crate::error::{TwsError, TwsResult};
use crate::wire::Wire;

/// Where a remote object lives. Root objects carry no instance id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    endpoint: String,
    instance_id: Option<String>,
}

impl Address {
    /// Address of the root object hosted at `endpoint`.
    pub fn root(endpoint: impl Into<String>) -> TwsResult<Self> {
        Self::new(endpoint, None)
    }

    pub fn new(endpoint: impl Into<String>, instance_id: Option<String>) -> TwsResult<Self> {
        let endpoint = endpoint.into();
        if endpoint.contains(Wire::ADDRESS_SEPARATOR) {
            return Err(TwsError::format(format!(
                "endpoint locator '{endpoint}' must not contain '{}'",
                Wire::ADDRESS_SEPARATOR
            )));
        }
        Ok(Self {
            endpoint,
            instance_id,
        })
    }

    /// Split address text at the first separator.
    pub fn parse(text: &str) -> TwsResult<Self> {
        if text.is_empty() {
            return Err(TwsError::format("empty address"));
        }
        Ok(match text.split_once(Wire::ADDRESS_SEPARATOR) {
            Some((endpoint, id)) => Self {
                endpoint: endpoint.to_string(),
                instance_id: Some(id.to_string()),
            },
            None => Self {
                endpoint: text.to_string(),
                instance_id: None,
            },
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.instance_id.is_none()
    }

    /// Same endpoint, different instance.
    pub fn with_instance(&self, instance_id: impl Into<String>) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            instance_id: Some(instance_id.into()),
        }
    }

    /// Path-extended address of the object reached through `path`.
    pub fn member(&self, path: &str) -> Self {
        Self {
            endpoint: self.member_url(path.trim_matches(Wire::PATH_SEPARATOR)),
            instance_id: self.instance_id.clone(),
        }
    }

    /// `<endpointLocator>/<segment>/.../<member>` for a member path.
    pub fn member_url(&self, path: &str) -> String {
        let base = self.endpoint.trim_end_matches(Wire::PATH_SEPARATOR);
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}{}{path}", Wire::PATH_SEPARATOR)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance_id {
            Some(id) => write!(f, "{}{}{id}", self.endpoint, Wire::ADDRESS_SEPARATOR),
            None => f.write_str(&self.endpoint),
        }
    }
}

impl FromStr for Address {
    type Err = TwsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
