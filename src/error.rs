//! Error types for the ClickHouse operator
//!
//! Errors carry the object kind, namespace/name and operation they relate to
//! so that a failure reported at the end of a reconcile pass can be diagnosed
//! without re-deriving controller state.

use thiserror::Error;

/// Main error type for operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error that has not been classified further
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The requested platform object does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Object kind (Service, ConfigMap, StatefulSet, ...)
        kind: String,
        /// Object namespace
        namespace: String,
        /// Object name
        name: String,
    },

    /// A desired change touches a field the platform does not allow to change
    #[error("immutable field change on {kind} {namespace}/{name}: {message}")]
    ImmutableField {
        /// Object kind
        kind: String,
        /// Object namespace
        namespace: String,
        /// Object name
        name: String,
        /// What changed
        message: String,
    },

    /// Invalid input, e.g. an out-of-range port in a service template
    #[error("validation error for {object}: {message}")]
    Validation {
        /// Object or template being validated
        object: String,
        /// Description of what's invalid
        message: String,
    },

    /// A platform call failed
    #[error("{operation} {kind} {namespace}/{name} failed: {source}")]
    Platform {
        /// Object kind
        kind: String,
        /// get / create / update / delete / list
        operation: &'static str,
        /// Object namespace
        namespace: String,
        /// Object name (empty for list)
        name: String,
        /// Underlying client error
        #[source]
        source: kube::Error,
    },

    /// Administrative SQL call failed
    #[error("sql error on {dsn}: {message}")]
    Sql {
        /// Connection string with credentials hidden
        dsn: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Operator configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The call was cancelled or its deadline expired
    #[error("{operation} cancelled")]
    Cancelled {
        /// Operation that was cancelled
        operation: String,
    },

    /// Contract violation inside the operator
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Where the violation was detected
        context: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a not-found error
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create an immutable-field error
    pub fn immutable_field(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::ImmutableField {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error for the given object
    pub fn validation(object: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            object: object.into(),
            message: msg.into(),
        }
    }

    /// Wrap a client error with the object and operation it belongs to.
    ///
    /// A 404 from the API server is classified as [`Error::NotFound`].
    pub fn platform(
        kind: impl Into<String>,
        operation: &'static str,
        namespace: impl Into<String>,
        name: impl Into<String>,
        source: kube::Error,
    ) -> Self {
        if matches!(&source, kube::Error::Api(ae) if ae.code == 404) {
            return Self::not_found(kind, namespace, name);
        }
        Self::Platform {
            kind: kind.into(),
            operation,
            namespace: namespace.into(),
            name: name.into(),
            source,
        }
    }

    /// Create an SQL error
    pub fn sql(dsn: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Sql {
            dsn: dsn.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a cancellation error for the given operation
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// True when the object does not exist on the platform
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube(kube::Error::Api(ae)) => ae.code == 404,
            _ => false,
        }
    }

    /// Check if this error is retryable on a later pass
    ///
    /// Validation, configuration and contract errors need a spec or code
    /// fix. Client errors are retryable unless the API server rejected the
    /// request with a 4xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(source) | Error::Platform { source, .. } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::NotFound { .. } => true,
            Error::ImmutableField { .. } => true,
            Error::Validation { .. } => false,
            Error::Sql { .. } => true,
            Error::Serialization(_) => false,
            Error::Config(_) => false,
            Error::Cancelled { .. } => true,
            Error::Internal { .. } => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::serialization(e.to_string())
    }
}
