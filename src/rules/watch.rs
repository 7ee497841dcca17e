//! RuleFileWatcher: notice edits to a rule file between polls
//!
//! The watcher compares file content, not timestamps, so touching a file
//! without changing it does not reload anything. A file that fails to load
//! is reported once; the caller keeps the rules it already has.

use super::declarative::parse_rules;
use super::registry::RuleRegistry;
use crate::config::ConfigError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug)]
pub struct RuleFileWatcher {
    path: PathBuf,
    /// Content seen at the last poll; `None` while the file is unreadable
    last: Option<String>,
}

impl RuleFileWatcher {
    /// Watch `path`, treating its current content as already loaded.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last = std::fs::read_to_string(&path).ok();
        Self { path, last }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return freshly compiled rules when the file changed since the last
    /// poll, `None` when it did not.
    pub fn poll(&mut self) -> Result<Option<RuleRegistry>, ConfigError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(source) => {
                if self.last.take().is_none() {
                    return Ok(None);
                }
                return Err(ConfigError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if self.last.as_deref() == Some(content.as_str()) {
            return Ok(None);
        }

        debug!(path = %self.path.display(), "rule file changed");
        self.last = Some(content);
        let registry = self.last.as_deref().map(parse_rules).transpose()?;
        if let Some(registry) = &registry {
            info!(path = %self.path.display(), rules = registry.len(), "rule file reloaded");
        }
        Ok(registry)
    }
}
