//! Error types for mailbox-search

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Recipient could not be resolved: {0}")]
    RecipientUnresolved(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Item extraction error: {0}")]
    Extraction(String),

    #[error("Folder unavailable: {0}")]
    FolderUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("Email parsing error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),
}

pub type Result<T> = std::result::Result<T, Error>;
