//! INI-style user configuration.
//!
//! Parses `[section]` headers, `#` comments and `key = value` pairs into
//! `section.key` entries. The `[user]` section supplies the author identity
//! `"Name <email>"`; missing keys fall back to defaults.

use crate::artifacts::objects::commit::Author;
use std::collections::HashMap;
use std::path::Path;

const DEFAULT_USER_NAME: &str = "User";
const DEFAULT_USER_EMAIL: &str = "user@grit";

#[derive(Debug)]
pub struct Config {
    path: Box<Path>,
}

impl Config {
    pub fn new(path: Box<Path>) -> Self {
        Config { path }
    }

    pub fn read_all(&self) -> anyhow::Result<HashMap<String, String>> {
        let mut out = HashMap::new();

        if !self.path.exists() {
            return Ok(out);
        }

        let mut section: Option<String> = None;
        for line in std::fs::read_to_string(&self.path)?.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                section = Some(line[1..line.len() - 1].to_string());
                continue;
            }

            if let (Some(section), Some((key, value))) = (&section, line.split_once('=')) {
                out.insert(
                    format!("{}.{}", section, key.trim()),
                    value.trim().to_string(),
                );
            }
        }

        Ok(out)
    }

    pub fn user_name(&self) -> anyhow::Result<String> {
        Ok(self
            .read_all()?
            .remove("user.name")
            .unwrap_or_else(|| DEFAULT_USER_NAME.to_string()))
    }

    pub fn user_email(&self) -> anyhow::Result<String> {
        Ok(self
            .read_all()?
            .remove("user.email")
            .unwrap_or_else(|| DEFAULT_USER_EMAIL.to_string()))
    }

    /// Author identity for new commits, stamped with the current time.
    pub fn author(&self) -> anyhow::Result<Author> {
        Ok(Author::new(self.user_name()?, self.user_email()?))
    }
}
