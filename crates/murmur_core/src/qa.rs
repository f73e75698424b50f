//! Scripted question/answer lookup used by the `ask` command.

use crate::config::QaConfig;
use std::collections::HashMap;

/// Immutable exact-match table, built once at startup.
#[derive(Debug, Clone)]
pub struct QaTable {
    entries: HashMap<String, String>,
    fallback: String,
}

impl QaTable {
    pub fn new<I, K, V>(entries: I, fallback: &str) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into().trim().to_string(), v.into()))
                .collect(),
            fallback: fallback.to_string(),
        }
    }

    pub fn from_config(config: &QaConfig) -> Self {
        Self::new(config.entries.clone(), &config.fallback)
    }

    /// Exact match on the trimmed question; the fallback text otherwise.
    pub fn answer(&self, question: &str) -> &str {
        self.entries
            .get(question.trim())
            .map(String::as_str)
            .unwrap_or(&self.fallback)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
