//! Chat ↔ backend username mapping.
//!
//! Loaded from a YAML file of the form:
//!
//! ```yaml
//! users:
//!   jane.doe: jdoe          # chat username: backend username
//!   sam: samuel@example.com
//! ```
//!
//! Lookups that miss return `None`; callers decide the fallback.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors loading a mapping file.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("failed to read mapping file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse mapping file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Two chat users map to the same backend user
    #[error("backend user {0:?} is mapped more than once")]
    Duplicate(String),
}

#[derive(Debug, Default, Deserialize)]
struct MappingFile {
    #[serde(default)]
    users: HashMap<String, String>,
}

/// Bidirectional username lookup.
#[derive(Debug, Clone, Default)]
pub struct UserMapper {
    chat_to_backend: HashMap<String, String>,
    backend_to_chat: HashMap<String, String>,
}

impl UserMapper {
    /// Build from `(chat, backend)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::Duplicate`] if a backend user appears twice.
    pub fn from_pairs<I, C, B>(pairs: I) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = (C, B)>,
        C: Into<String>,
        B: Into<String>,
    {
        let mut mapper = Self::default();
        for (chat, backend) in pairs {
            let chat = chat.into();
            let backend = backend.into();
            if mapper
                .backend_to_chat
                .insert(backend.clone(), chat.clone())
                .is_some()
            {
                return Err(MappingError::Duplicate(backend));
            }
            mapper.chat_to_backend.insert(chat, backend);
        }
        Ok(mapper)
    }

    /// Parse a YAML mapping document.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or contains duplicates.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, MappingError> {
        let file: MappingFile = serde_yaml::from_str(yaml)?;
        Self::from_pairs(file.users)
    }

    /// Load a YAML mapping file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, MappingError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Backend username for a chat username.
    #[must_use]
    pub fn to_backend(&self, chat_username: &str) -> Option<&str> {
        self.chat_to_backend.get(chat_username).map(String::as_str)
    }

    /// Chat username for a backend username.
    #[must_use]
    pub fn to_chat(&self, backend_username: &str) -> Option<&str> {
        self.backend_to_chat.get(backend_username).map(String::as_str)
    }

    /// Chat-side name for a backend assignee, falling back to the raw value.
    #[must_use]
    pub fn display_for_backend(&self, backend_username: &str) -> String {
        self.to_chat(backend_username)
            .unwrap_or(backend_username)
            .to_string()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chat_to_backend.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chat_to_backend.is_empty()
    }
}
