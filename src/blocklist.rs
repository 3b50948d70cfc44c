use std::{collections::HashSet, io, sync::Arc};

use serde_json::Value;
use tokio::sync::{watch, Mutex};
use url::Url;

use crate::{
    domain::{normalize, Domain},
    error::BlokError,
    matcher::{DomainMirror, DomainSnapshot},
    notify::{NotificationSink, Notice},
    rules::{generate, RuleDescriptor},
    sink::RuleSink,
    store::DomainStore,
};

// user block list: edits the stored list and keeps rules and mirror in sync

pub struct BlockList {
    store: Arc<dyn DomainStore>,
    sink: Arc<dyn RuleSink>,
    notifier: Arc<dyn NotificationSink>,
    mirror: watch::Sender<DomainSnapshot>,
    // serialises edits so each regeneration sees the list it follows
    update: Mutex<()>,
}

impl BlockList {
    /// Loads the stored list and publishes it to subscribers.
    ///
    /// Rules are not touched until [`BlockList::sync_rules`] or an edit.
    pub async fn open(
        store: Arc<dyn DomainStore>,
        sink: Arc<dyn RuleSink>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self, BlokError> {
        let stored = store.get().await?;
        let domains = normalize_entries(&stored);
        tracing::info!(count = domains.len(), "block list loaded");
        let (mirror, _) = watch::channel(DomainSnapshot::from(domains));

        Ok(Self {
            store,
            sink,
            notifier,
            mirror,
            update: Mutex::new(()),
        })
    }

    pub fn subscribe(&self) -> DomainMirror {
        DomainMirror::from_receiver(self.mirror.subscribe())
    }

    pub fn snapshot(&self) -> DomainSnapshot {
        self.mirror.borrow().clone()
    }

    /// Stored entries sorted for display.
    pub async fn list(&self) -> Result<Vec<String>, BlokError> {
        let mut entries = self.store.get().await?;
        entries.sort();
        Ok(entries)
    }

    pub async fn add(&self, input: &str) -> Result<Domain, BlokError> {
        let domain = Domain::parse(input).map_err(|_| BlokError::InvalidDomain {
            input: input.trim().to_string(),
        })?;

        let _guard = self.update.lock().await;
        let mut stored = self.store.get().await?;
        if stored.iter().any(|entry| normalize(entry) == domain.as_str()) {
            return Err(BlokError::DuplicateDomain(domain));
        }

        stored.push(domain.to_string());
        self.store.set(&stored).await?;
        tracing::info!(domain = %domain, "domain added");

        self.regenerate(&stored).await?;
        self.notifier.notify(&Notice::Added(domain.clone()));
        Ok(domain)
    }

    /// Blocks the site a page was served from.
    pub async fn block_page(&self, page_url: &str) -> Result<Domain, BlokError> {
        let unsupported = || BlokError::UnsupportedPage {
            url: page_url.to_string(),
        };
        let url = Url::parse(page_url).map_err(|_| unsupported())?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(unsupported());
        }
        let host = url.host_str().ok_or_else(unsupported)?;
        self.add(host.strip_prefix("www.").unwrap_or(host)).await
    }

    /// Removes entries equal to `entry`. Returns `false` when none matched.
    pub async fn remove(&self, entry: &str) -> Result<bool, BlokError> {
        let _guard = self.update.lock().await;
        let mut stored = self.store.get().await?;
        let before = stored.len();
        stored.retain(|existing| existing != entry);
        if stored.len() == before {
            return Ok(false);
        }

        self.store.set(&stored).await?;
        tracing::info!(domain = %entry, "domain removed");

        self.regenerate(&stored).await?;
        self.notifier.notify(&Notice::Removed(entry.to_string()));
        Ok(true)
    }

    pub async fn clear(&self) -> Result<(), BlokError> {
        let _guard = self.update.lock().await;
        self.store.set(&[]).await?;
        tracing::info!("block list cleared");

        self.regenerate(&[]).await?;
        self.notifier.notify(&Notice::Cleared);
        Ok(())
    }

    /// Replaces the whole list with the entries of a JSON array.
    ///
    /// Entries are stored as given; malformed input leaves the list untouched.
    pub async fn import(&self, json: &str) -> Result<usize, BlokError> {
        let entries = parse_import(json)?;

        let _guard = self.update.lock().await;
        self.store.set(&entries).await?;
        tracing::info!(count = entries.len(), "block list imported");

        self.regenerate(&entries).await?;
        self.notifier.notify(&Notice::Imported(entries.len()));
        Ok(entries.len())
    }

    pub async fn export(&self) -> Result<String, BlokError> {
        let stored = self.store.get().await?;
        serde_json::to_string_pretty(&stored)
            .map_err(|err| BlokError::Io(io::Error::new(io::ErrorKind::InvalidData, err)))
    }

    /// Rules the current list would produce, without applying them.
    pub async fn preview_rules(&self) -> Result<Vec<RuleDescriptor>, BlokError> {
        let stored = self.store.get().await?;
        Ok(generate(&normalize_entries(&stored)))
    }

    /// Regenerates the full rule set from the stored list.
    pub async fn sync_rules(&self) -> Result<usize, BlokError> {
        let _guard = self.update.lock().await;
        let stored = self.store.get().await?;
        self.regenerate(&stored).await
    }

    async fn regenerate(&self, stored: &[String]) -> Result<usize, BlokError> {
        let domains = normalize_entries(stored);
        let rules = generate(&domains);
        let domain_count = domains.len();

        // pages follow the stored list even if the rule engine rejects the update
        self.mirror.send_replace(DomainSnapshot::from(domains));

        let previous = self.sink.active_rule_ids().await?;
        self.sink.replace_all(&previous, &rules).await?;
        tracing::info!(
            rules = rules.len(),
            domains = domain_count,
            "blocking rules updated"
        );
        Ok(rules.len())
    }
}

/// Normalizes stored entries, dropping invalid ones and repeats.
pub fn normalize_entries(stored: &[String]) -> Vec<Domain> {
    let mut seen = HashSet::new();
    let mut domains = Vec::with_capacity(stored.len());
    for entry in stored {
        match Domain::parse(entry) {
            Ok(domain) => {
                if seen.insert(domain.clone()) {
                    domains.push(domain);
                }
            }
            Err(err) => {
                tracing::warn!(entry = %entry, error = %err, "skipping invalid stored entry");
            }
        }
    }
    domains
}

fn parse_import(json: &str) -> Result<Vec<String>, BlokError> {
    let value: Value = serde_json::from_str(json).map_err(BlokError::ImportParse)?;
    let Value::Array(items) = value else {
        return Err(BlokError::ImportFormat);
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::String(entry) => Ok(entry),
            _ => Err(BlokError::ImportFormat),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_entries_skips_invalid_and_repeats() {
        let stored = vec![
            "https://www.Example.com/".to_string(),
            "   ".to_string(),
            "example.com".to_string(),
            "tracker.net".to_string(),
        ];
        let domains = normalize_entries(&stored);
        let names: Vec<&str> = domains.iter().map(Domain::as_str).collect();
        assert_eq!(names, vec!["example.com", "tracker.net"]);
    }

    #[test]
    fn import_requires_array_of_strings() {
        assert_eq!(
            parse_import("[\"a.com\", \"https://b.com\"]").unwrap(),
            vec!["a.com".to_string(), "https://b.com".to_string()]
        );
        assert!(matches!(parse_import("{}"), Err(BlokError::ImportFormat)));
        assert!(matches!(parse_import("[1, 2]"), Err(BlokError::ImportFormat)));
        assert!(matches!(parse_import("[oops"), Err(BlokError::ImportParse(_))));
    }
}
