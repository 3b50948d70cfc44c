use std::sync::Arc;

use tokio::sync::watch;
use url::Url;

use crate::domain::Domain;

// heuristic url matching against the blocked-domain list

/// Returns `true` when `candidate` references any blocked domain.
///
/// The parsed hostname (leading `www.` removed) matches when it contains the
/// domain or ends with `.domain`; the raw string matches when it contains the
/// domain anywhere, which catches redirect targets in query parameters.
/// Unparseable input falls back to the raw substring check alone.
pub fn is_blocked(blocked: &[Domain], candidate: &str) -> bool {
    if blocked.is_empty() || candidate.is_empty() {
        return false;
    }

    let host = Url::parse(candidate)
        .ok()
        .and_then(|url| url.host_str().map(|h| h.strip_prefix("www.").unwrap_or(h).to_string()));

    blocked.iter().any(|domain| {
        let domain = domain.as_str();
        if let Some(host) = &host {
            if host.contains(domain) || host.ends_with(&format!(".{domain}")) {
                return true;
            }
        }
        candidate.contains(domain)
    })
}

/// Like [`is_blocked`], returning the first domain that matched.
pub fn first_match<'a>(blocked: &'a [Domain], candidate: &str) -> Option<&'a Domain> {
    blocked
        .iter()
        .find(|domain| is_blocked(std::slice::from_ref(*domain), candidate))
}

pub type DomainSnapshot = Arc<[Domain]>;

/// Read side of the in-memory blocked-domain list.
///
/// Snapshots are published by [`crate::blocklist::BlockList`] after every
/// change; holders always see the latest complete list.
#[derive(Debug, Clone)]
pub struct DomainMirror {
    rx: watch::Receiver<DomainSnapshot>,
}

impl DomainMirror {
    pub fn channel(initial: Vec<Domain>) -> (watch::Sender<DomainSnapshot>, Self) {
        let (tx, rx) = watch::channel(DomainSnapshot::from(initial));
        (tx, Self { rx })
    }

    pub fn from_receiver(rx: watch::Receiver<DomainSnapshot>) -> Self {
        Self { rx }
    }

    /// A mirror that never changes.
    pub fn fixed(domains: Vec<Domain>) -> Self {
        let (_tx, mirror) = Self::channel(domains);
        mirror
    }

    pub fn snapshot(&self) -> DomainSnapshot {
        self.rx.borrow().clone()
    }

    pub fn is_blocked(&self, candidate: &str) -> bool {
        is_blocked(&self.rx.borrow(), candidate)
    }

    /// Waits for the next published list. Errors once the publisher is gone.
    pub async fn changed(&mut self) -> Result<DomainSnapshot, watch::error::RecvError> {
        self.rx.changed().await?;
        Ok(self.rx.borrow_and_update().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains(list: &[&str]) -> Vec<Domain> {
        list.iter().map(|d| Domain::parse(d).unwrap()).collect()
    }

    #[test]
    fn subdomain_matches() {
        assert!(is_blocked(&domains(&["example.com"]), "https://sub.example.com/page"));
        assert!(is_blocked(&domains(&["example.com"]), "https://www.example.com/"));
    }

    #[test]
    fn raw_string_catches_redirect_targets() {
        assert!(is_blocked(
            &domains(&["example.com"]),
            "https://unrelated.com/?redirect=example.com"
        ));
    }

    #[test]
    fn empty_list_never_matches() {
        assert!(!is_blocked(&[], "https://example.com"));
        assert!(!is_blocked(&domains(&["example.com"]), ""));
    }

    #[test]
    fn unparseable_input_falls_back_to_substring() {
        assert!(!is_blocked(&domains(&["example.com"]), "not a url"));
        assert!(is_blocked(&domains(&["example.com"]), "see example.com/path"));
        assert!(is_blocked(&domains(&["example.com"]), "//cdn.example.com/x.js"));
    }

    #[test]
    fn unrelated_hosts_are_allowed() {
        let blocked = domains(&["example.com", "tracker.net"]);
        assert!(!is_blocked(&blocked, "https://example.org/"));
        assert!(!is_blocked(&blocked, "https://news.ycombinator.com/item?id=1"));
    }

    #[test]
    fn first_match_reports_domain() {
        let blocked = domains(&["a.com", "tracker.net"]);
        let hit = first_match(&blocked, "https://cdn.tracker.net/p.gif");
        assert_eq!(hit.map(Domain::as_str), Some("tracker.net"));
        assert!(first_match(&blocked, "https://b.com").is_none());
    }

    #[tokio::test]
    async fn mirror_follows_published_lists() {
        let (tx, mut mirror) = DomainMirror::channel(Vec::new());
        assert!(!mirror.is_blocked("https://example.com/"));

        tx.send(DomainSnapshot::from(domains(&["example.com"]))).unwrap();
        let snapshot = mirror.changed().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(mirror.is_blocked("https://example.com/"));

        drop(tx);
        assert!(mirror.changed().await.is_err());
    }
}
