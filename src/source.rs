use std::env::{self, VarError};
use std::error::Error;

/// Boxed error produced by a [`Source`] lookup.
pub type SourceError = Box<dyn Error + Send + Sync + 'static>;

/// A pluggable key/value backend for population.
///
/// The engine only ever talks to its backend through this two-operation
/// capability: composing a lookup key from an accumulated prefix, and
/// fetching the raw string value for a composed key.
pub trait Source: Send + Sync {
    /// Join an accumulated key prefix with a field's tag key.
    ///
    /// The default rule joins non-empty parts with `_`; if either part is
    /// empty the other is returned unchanged.
    fn compose(&self, prefix: &str, key: &str) -> String {
        if !prefix.is_empty() && !key.is_empty() {
            format!("{prefix}_{key}")
        } else if !prefix.is_empty() {
            prefix.to_string()
        } else {
            key.to_string()
        }
    }

    /// Fetch the raw value for a composed key.
    ///
    /// `Ok(None)` means the key is not present in the backend, which is not
    /// an error — it lets the engine fall back to the field's declared
    /// default.
    fn lookup(&self, key: &str) -> Result<Option<String>, SourceError>;
}

/// The default source: upper-cases the key and reads the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSource;

impl Source for EnvSource {
    fn lookup(&self, key: &str) -> Result<Option<String>, SourceError> {
        match env::var(key.to_uppercase()) {
            Ok(value) => Ok(Some(value)),
            Err(VarError::NotPresent) => Ok(None),
            Err(err @ VarError::NotUnicode(_)) => Err(Box::new(err)),
        }
    }
}
