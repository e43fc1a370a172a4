pub mod certs;
pub mod config;
pub mod crypto;
pub mod encoders;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod session;
pub mod website;

pub use config::HttpC2Config;
pub use server::C2Server;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WraithError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("Certificate error: {0}")]
    Certs(#[from] certs::CertError),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid message format")]
    InvalidMessage,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, WraithError>;
