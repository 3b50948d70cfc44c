use std::fmt;

use crate::domain::Domain;

// fire-and-forget user notifications about list changes

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Added(Domain),
    Removed(String),
    Cleared,
    Imported(usize),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Added(domain) => write!(f, "{domain} was added to the block list."),
            Notice::Removed(domain) => write!(f, "{domain} was removed from the block list."),
            Notice::Cleared => f.write_str("All blocked sites were removed."),
            Notice::Imported(count) => write!(f, "List imported ({count} entries)."),
        }
    }
}

/// Delivery is best effort; implementations must not fail the caller.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Emits notices as log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, notice: &Notice) {
        tracing::info!(notice = %notice, "notification");
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl NotificationSink for Silent {
    fn notify(&self, _notice: &Notice) {}
}
