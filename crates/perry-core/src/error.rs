//! Error types for Perry operations.

use std::fmt;

/// The primary error type for all Perry operations.
#[derive(Debug)]
pub enum Error {
    /// Bad or missing model/association declaration
    Configuration(ConfigurationError),
    /// Malformed call: ambiguous option forms, cross-type merge, unknown
    /// clause or scope names
    Argument(ArgumentError),
    /// An association name did not resolve on its model type
    AssociationNotFound(AssociationNotFound),
    /// The association cannot be batch eager-loaded
    AssociationPreloadNotSupported(AssociationPreloadNotSupported),
    /// A string type reference matched no registered model
    ModelNotDefined(ModelNotDefined),
    /// A string type reference matched more than one registered model
    AmbiguousClassName(AmbiguousClassName),
    /// The fetch collaborator failed
    Fetch(FetchError),
}

#[derive(Debug)]
pub struct ConfigurationError {
    pub message: String,
}

#[derive(Debug)]
pub struct ArgumentError {
    pub message: String,
}

#[derive(Debug)]
pub struct AssociationNotFound {
    /// Model type the lookup ran against.
    pub model: String,
    /// The association name that failed to resolve.
    pub association: String,
}

#[derive(Debug)]
pub struct AssociationPreloadNotSupported {
    pub model: String,
    pub association: String,
    /// Why the association cannot be batched.
    pub reason: String,
}

#[derive(Debug)]
pub struct ModelNotDefined {
    /// The name that failed to resolve, after sanitization.
    pub name: String,
}

#[derive(Debug)]
pub struct AmbiguousClassName {
    pub name: String,
    /// Qualified names of every matching type.
    pub candidates: Vec<String>,
}

#[derive(Debug)]
pub struct FetchError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Create a configuration error with the given message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(ConfigurationError {
            message: message.into(),
        })
    }

    /// Create an argument error with the given message.
    pub fn argument(message: impl Into<String>) -> Self {
        Error::Argument(ArgumentError {
            message: message.into(),
        })
    }

    /// Create an association-not-found error.
    pub fn association_not_found(model: impl Into<String>, association: impl Into<String>) -> Self {
        Error::AssociationNotFound(AssociationNotFound {
            model: model.into(),
            association: association.into(),
        })
    }

    /// Create a preload-not-supported error.
    pub fn preload_not_supported(
        model: impl Into<String>,
        association: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::AssociationPreloadNotSupported(AssociationPreloadNotSupported {
            model: model.into(),
            association: association.into(),
            reason: reason.into(),
        })
    }

    /// Create a model-not-defined error.
    pub fn model_not_defined(name: impl Into<String>) -> Self {
        Error::ModelNotDefined(ModelNotDefined { name: name.into() })
    }

    /// Create an ambiguous-class-name error.
    pub fn ambiguous_class_name(name: impl Into<String>, candidates: Vec<String>) -> Self {
        Error::AmbiguousClassName(AmbiguousClassName {
            name: name.into(),
            candidates,
        })
    }

    /// Create a fetch error with only a message.
    pub fn fetch(message: impl Into<String>) -> Self {
        Error::Fetch(FetchError {
            message: message.into(),
            source: None,
        })
    }

    /// Create a fetch error wrapping an adapter failure.
    pub fn fetch_with_source(
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Error::Fetch(FetchError {
            message: message.into(),
            source: Some(source),
        })
    }

    /// Is this an argument error?
    pub fn is_argument(&self) -> bool {
        matches!(self, Error::Argument(_))
    }

    /// Is this a configuration error?
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    /// Is this an association-not-found error?
    pub fn is_association_not_found(&self) -> bool {
        matches!(self, Error::AssociationNotFound(_))
    }

    /// Is this a preload-not-supported error?
    pub fn is_preload_not_supported(&self) -> bool {
        matches!(self, Error::AssociationPreloadNotSupported(_))
    }

    /// Is this a model-not-defined error?
    pub fn is_model_not_defined(&self) -> bool {
        matches!(self, Error::ModelNotDefined(_))
    }

    /// Is this an ambiguous-class-name error?
    pub fn is_ambiguous_class_name(&self) -> bool {
        matches!(self, Error::AmbiguousClassName(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration(e) => write!(f, "configuration error: {}", e.message),
            Error::Argument(e) => write!(f, "argument error: {}", e.message),
            Error::AssociationNotFound(e) => write!(
                f,
                "association '{}' is not defined on model '{}'",
                e.association, e.model
            ),
            Error::AssociationPreloadNotSupported(e) => write!(
                f,
                "association '{}' on model '{}' cannot be eager loaded: {}",
                e.association, e.model, e.reason
            ),
            Error::ModelNotDefined(e) => write!(f, "model '{}' is not defined", e.name),
            Error::AmbiguousClassName(e) => write!(
                f,
                "class name '{}' is ambiguous; use a namespace to disambiguate (candidates: {})",
                e.name,
                e.candidates.join(", ")
            ),
            Error::Fetch(e) => write!(f, "fetch failed: {}", e.message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Fetch(e) => e
                .source
                .as_ref()
                .map(|s| s.as_ref() as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

/// Convenience result alias used throughout Perry.
pub type Result<T> = std::result::Result<T, Error>;
