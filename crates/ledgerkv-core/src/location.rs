use std::{fmt::Display, str::FromStr};

use crate::backend::BackendError;

const SCHEME_SEPARATOR: &str = "://";

/// A data location, `<access-method>://<address>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    access_method: String,
    address: String,
}

impl Location {
    pub fn parse(text: &str) -> Result<Self, BackendError> {
        let (access_method, address) = text
            .split_once(SCHEME_SEPARATOR)
            .ok_or_else(|| BackendError::BadLocation(format!("missing access method in '{}'", text)))?;
        if access_method.is_empty() {
            return Err(BackendError::BadLocation(format!("empty access method in '{}'", text)));
        }
        Ok(Self {
            access_method: access_method.to_string(),
            address: address.to_string(),
        })
    }

    /// The URL scheme, without `://`. Matched case-sensitively.
    pub fn access_method(&self) -> &str {
        &self.access_method
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl FromStr for Location {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Location::parse(s)
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.access_method, SCHEME_SEPARATOR, self.address)
    }
}
