use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The key is not (or no longer) present in the store that was queried.
    #[error("key not found in cache [{0}]")]
    NotFound(String),
    /// The sweep thread could not be started.
    #[error("io error [{0}]")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    pub(crate) fn not_found(key: &str) -> Self {
        CacheError::NotFound(key.to_owned())
    }
}
