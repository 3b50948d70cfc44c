use std::{collections::HashSet, io, path::PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{fs, sync::Mutex};

use crate::{rules::RuleDescriptor, store::write_atomic};

// active dynamic rule set, replaced wholesale on every regeneration

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("rule id {0} is already active")]
    DuplicateRuleId(u32),
    #[error("rule id must be positive")]
    ZeroRuleId,
    #[error("rule set io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("rule set at {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("rule engine rejected update: {0}")]
    Rejected(String),
}

/// Platform rule engine accepting bulk replacement of dynamic rules.
#[async_trait]
pub trait RuleSink: Send + Sync {
    async fn active_rules(&self) -> Result<Vec<RuleDescriptor>, SinkError>;

    /// Removes `remove` ids, then adds `add`, as one update.
    async fn replace_all(&self, remove: &[u32], add: &[RuleDescriptor]) -> Result<(), SinkError>;

    async fn active_rule_ids(&self) -> Result<Vec<u32>, SinkError> {
        Ok(self.active_rules().await?.iter().map(|rule| rule.id).collect())
    }
}

/// Applies a replacement the way browser rule engines do: ids must stay
/// unique and positive, otherwise nothing changes.
pub fn apply_replacement(
    mut current: Vec<RuleDescriptor>,
    remove: &[u32],
    add: &[RuleDescriptor],
) -> Result<Vec<RuleDescriptor>, SinkError> {
    let remove: HashSet<u32> = remove.iter().copied().collect();
    current.retain(|rule| !remove.contains(&rule.id));

    let mut ids: HashSet<u32> = current.iter().map(|rule| rule.id).collect();
    for rule in add {
        if rule.id == 0 {
            return Err(SinkError::ZeroRuleId);
        }
        if !ids.insert(rule.id) {
            return Err(SinkError::DuplicateRuleId(rule.id));
        }
    }

    current.extend_from_slice(add);
    Ok(current)
}

/// Keeps the active rules in a JSON file using the dynamic-rule schema, so
/// the file can be handed to a browser rule engine as-is.
#[derive(Debug)]
pub struct JsonFileRuleSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileRuleSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read(&self) -> Result<Vec<RuleDescriptor>, SinkError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SinkError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&contents).map_err(|source| SinkError::Malformed {
            path: self.path.clone(),
            source,
        })
    }
}

#[async_trait]
impl RuleSink for JsonFileRuleSink {
    async fn active_rules(&self) -> Result<Vec<RuleDescriptor>, SinkError> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    async fn replace_all(&self, remove: &[u32], add: &[RuleDescriptor]) -> Result<(), SinkError> {
        let _guard = self.lock.lock().await;
        let next = apply_replacement(self.read().await?, remove, add)?;
        let body = serde_json::to_vec_pretty(&next).map_err(|source| SinkError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, &body)
            .await
            .map_err(|source| SinkError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

#[derive(Debug, Default)]
pub struct MemoryRuleSink {
    rules: Mutex<Vec<RuleDescriptor>>,
}

impl MemoryRuleSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleSink for MemoryRuleSink {
    async fn active_rules(&self) -> Result<Vec<RuleDescriptor>, SinkError> {
        Ok(self.rules.lock().await.clone())
    }

    async fn replace_all(&self, remove: &[u32], add: &[RuleDescriptor]) -> Result<(), SinkError> {
        let mut rules = self.rules.lock().await;
        *rules = apply_replacement(rules.clone(), remove, add)?;
        Ok(())
    }
}
