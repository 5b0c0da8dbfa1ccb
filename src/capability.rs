use std::fmt;

/// An optional external capability (learned model, OCR engine, ...).
///
/// Components ask for availability and degrade to their fallbacks instead of
/// failing when a capability is missing.
pub enum Capability<T> {
    Available(T),
    Unavailable(String),
}

impl<T> Capability<T> {
    /// Wrap a loader result, logging why the capability could not be loaded.
    pub fn load(what: &str, result: anyhow::Result<T>) -> Self {
        match result {
            Ok(handle) => {
                tracing::info!("{what} loaded");
                Capability::Available(handle)
            }
            Err(e) => {
                tracing::warn!("{what} not available: {e:#}");
                Capability::Unavailable(format!("{e:#}"))
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Capability::Available(handle) => Some(handle),
            Capability::Unavailable(_) => None,
        }
    }
}

impl<T> fmt::Debug for Capability<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Available(_) => f.write_str("Available"),
            Capability::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}
