// ABOUTME: Stack name validation.
// ABOUTME: Stack names double as provider tag values and snapshot id prefixes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MIN_LEN: usize = 3;
const MAX_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StackNameError {
    #[error("stack name cannot be empty")]
    Empty,

    #[error("stack name must be at least {MIN_LEN} characters")]
    TooShort,

    #[error("stack name exceeds maximum length of {MAX_LEN} characters")]
    TooLong,

    #[error("stack name must start with a letter")]
    StartsWithNonLetter,

    #[error("stack name cannot end with a hyphen")]
    EndsWithHyphen,

    #[error("invalid character in stack name: '{0}'")]
    InvalidChar(char),
}

/// Unique, immutable identifier of a stack.
///
/// Letters, digits and hyphens only. Underscores are rejected so that
/// `{stack}_{type}_{timestamp}` snapshot ids split unambiguously.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackName(String);

impl StackName {
    pub fn new(value: &str) -> Result<Self, StackNameError> {
        if value.is_empty() {
            return Err(StackNameError::Empty);
        }

        if value.len() < MIN_LEN {
            return Err(StackNameError::TooShort);
        }

        if value.len() > MAX_LEN {
            return Err(StackNameError::TooLong);
        }

        if !value.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err(StackNameError::StartsWithNonLetter);
        }

        if value.ends_with('-') {
            return Err(StackNameError::EndsWithHyphen);
        }

        if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '-')
        {
            return Err(StackNameError::InvalidChar(c));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StackName {
    type Err = StackNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for StackName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StackName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        StackName::new(&s).map_err(serde::de::Error::custom)
    }
}
