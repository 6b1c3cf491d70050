use thiserror::Error;

/// Result type for observation operations
pub type ObservationResult<T> = Result<T, ObservationError>;

/// Errors raised by the observation kernel and its upstream adapters.
///
/// None of these are fatal to the registry: start/stop failures are logged
/// and the affected context simply runs without an upstream link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObservationError {
    /// The item a subscription or mutation refers to does not exist
    #[error("Item not found: {0}")]
    NotFound(String),

    /// The item a mutation would create already exists
    #[error("Item already exists: {0}")]
    ItemExists(String),

    /// Upstream source refused or lost a subscription
    #[error("Upstream subscription failed: {0}")]
    Upstream(String),

    /// Locator could not be parsed
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    /// Configuration rejected at load time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The registry backing a context has been dropped
    #[error("Registry closed")]
    RegistryClosed,
}
