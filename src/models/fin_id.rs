use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};

/// Market identifier such as `US.NYSE`; the first segment is the country code.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FinId(String);

impl FinId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn country(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }

    /// Everything after the country segment.
    pub fn acronym(&self) -> &str {
        self.0.split_once('.').map(|(_, rest)| rest).unwrap_or_default()
    }
}

impl FromStr for FinId {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let valid = value.split('.').count() >= 2 && value.split('.').all(|part| !part.is_empty());
        if !valid {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("invalid FinID {value:?}"))
                .with_hint("FinIDs look like COUNTRY.MARKET, e.g. US.NYSE."));
        }
        Ok(Self(value.to_string()))
    }
}

impl TryFrom<String> for FinId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse().map_err(|err: Error| err.to_string())
    }
}

impl From<FinId> for String {
    fn from(value: FinId) -> Self {
        value.0
    }
}

impl fmt::Display for FinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
