use std::io;

use thiserror::Error;

use crate::{domain::Domain, page::PageError, sink::SinkError, store::StoreError};

#[derive(Debug, Error)]
pub enum BlokError {
    #[error("'{input}' is not a valid domain")]
    InvalidDomain { input: String },
    #[error("{0} is already blocked")]
    DuplicateDomain(Domain),
    #[error("only http and https pages can be blocked: {url}")]
    UnsupportedPage { url: String },
    #[error("store update failed: {0}")]
    Store(#[from] StoreError),
    #[error("rule update failed: {0}")]
    RuleSink(#[from] SinkError),
    #[error("import file is not valid json: {0}")]
    ImportParse(#[source] serde_json::Error),
    #[error("import file must be a json array of strings")]
    ImportFormat,
    #[error(transparent)]
    Page(#[from] PageError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl BlokError {
    /// Text shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            BlokError::InvalidDomain { .. } => "Please enter a valid domain.".to_string(),
            BlokError::DuplicateDomain(_) => "This site is already blocked!".to_string(),
            BlokError::UnsupportedPage { .. } => "Current site cannot be blocked.".to_string(),
            BlokError::Store(_) | BlokError::RuleSink(_) => {
                "Error: settings could not be updated.".to_string()
            }
            BlokError::ImportParse(_) | BlokError::Io(_) => "File could not be read!".to_string(),
            BlokError::ImportFormat => "Invalid list format!".to_string(),
            BlokError::Page(err) => format!("Page could not be filtered: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_failures_share_generic_message() {
        let store = BlokError::from(StoreError::Unavailable("quota".into()));
        let sink = BlokError::from(SinkError::Rejected("limit".into()));
        assert_eq!(store.user_message(), sink.user_message());
        assert_eq!(store.user_message(), "Error: settings could not be updated.");
    }
}
