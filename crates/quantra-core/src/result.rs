//! Result type aliases for Quantra.

use crate::QuantraError;

/// A specialized `Result` type for Quantra operations.
pub type QuantraResult<T> = Result<T, QuantraError>;

/// A boxed future returning a `QuantraResult`.
pub type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = QuantraResult<T>> + Send + 'a>>;
