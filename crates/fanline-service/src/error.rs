//! Service Error Types
//!
//! Foreground paths (follow, publish, fetch) surface these; background
//! workers never do, they log and rely on the next tick.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("cannot follow self")]
    SelfFollow,

    #[error(transparent)]
    Store(#[from] fanline_store::StoreError),
}
