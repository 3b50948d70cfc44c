pub mod blocklist;
pub mod config;
pub mod domain;
pub mod error;
pub mod intercept;
pub mod matcher;
pub mod notify;
pub mod page;
pub mod rules;
pub mod scan;
pub mod sink;
pub mod store;

pub use blocklist::BlockList;
pub use domain::{normalize, Domain};
pub use error::BlokError;
pub use matcher::{is_blocked, DomainMirror};
pub use rules::{generate, RuleDescriptor};
