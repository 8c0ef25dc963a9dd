//! Error types for pooled component handling.

use thiserror::Error;

/// Error raised by component code: factories, lifecycle hooks, delegated calls.
pub type ComponentError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while checking instances in and out of a pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The component factory failed to create an instance.
    #[error("failed to create component `{class}`: {source}")]
    Create {
        /// Name of the component class.
        class: String,
        /// Error returned by the factory.
        #[source]
        source: ComponentError,
    },

    /// A freshly created instance failed to initialize.
    #[error("failed to initialize component `{class}`: {source}")]
    Initialize {
        /// Name of the component class.
        class: String,
        /// Error returned by the initialize hook.
        #[source]
        source: ComponentError,
    },

    /// A returned instance failed to recycle and was discarded.
    #[error("failed to recycle component `{class}`: {source}")]
    Recycle {
        /// Name of the component class.
        class: String,
        /// Error returned by the recycle hook.
        #[source]
        source: ComponentError,
    },

    /// No instance became available before the blocking timeout elapsed.
    #[error("pool for `{class}` exhausted after waiting {waited_ms} ms")]
    Exhausted {
        /// Name of the component class.
        class: String,
        /// How long the caller waited.
        waited_ms: u64,
    },

    /// The pool was disposed.
    #[error("pool for `{0}` has been disposed")]
    Disposed(String),
}

/// Errors raised by a proxy before the delegated call runs.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Binding an instance to the unit of work failed.
    #[error(transparent)]
    Acquire(#[from] PoolError),

    /// The method belongs to an interface the component does not implement.
    #[error("component `{class}` does not implement `{interface}` (called `{method}`)")]
    UnsupportedInterface {
        /// Name of the component class.
        class: String,
        /// Interface named by the method.
        interface: String,
        /// Method name.
        method: String,
    },

    /// The proxy was called again from inside its own delegated call.
    #[error("re-entrant call to `{method}` on `{class}` within one unit of work")]
    Reentrant {
        /// Name of the component class.
        class: String,
        /// Method name.
        method: String,
    },
}

impl ProxyError {
    /// Returns the pool error behind a failed acquisition, if any.
    pub fn as_pool_error(&self) -> Option<&PoolError> {
        match self {
            ProxyError::Acquire(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors raised while building a component handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The component class exposes no interface a proxy could implement.
    #[error("component `{0}` implements no proxyable interface")]
    NoInterfaces(String),

    /// The handler configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Warming up the pool failed.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// A specialized Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
