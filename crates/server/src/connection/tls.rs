use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::connection::{BindOptions, Listener};

/// Certificate material handed to a [`TlsBind`] implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl CertInfo {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self { cert_path: cert_path.into(), key_path: key_path.into() }
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }
}

/// Creates TLS listeners.
///
/// Loading certificates and performing handshakes is up to the implementation;
/// the server only needs the resulting [`Listener`].
#[async_trait]
pub trait TlsBind: Send + Sync {
    type Listener: Listener;

    async fn bind_tls(&self, options: &BindOptions, cert: &CertInfo) -> io::Result<Self::Listener>;
}
