//! Naming tokens carried by worlds and models.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A human-readable name plus the configuration-file section it came from.
///
/// Tokens are immutable after creation. The name doubles as a registry
/// index key; the section id is informational and is echoed back to the
/// user in logs and errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    name: String,
    section: u32,
}

impl Token {
    pub fn new(name: impl Into<String>, section: u32) -> Self {
        Self {
            name: name.into(),
            section,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn section(&self) -> u32 {
        self.section
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" (section {})", self.name, self.section)
    }
}
