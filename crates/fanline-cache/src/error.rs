use thiserror::Error;

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The entry exists but holds the other value kind (bytes vs list).
    #[error("wrong value kind at key: {0}")]
    WrongKind(String),

    /// Backend failure (network, protocol). Callers on the read path
    /// downgrade this to a cache miss.
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}
