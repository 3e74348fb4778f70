// src/error.rs
//! Error and warning types for the material composer.
//!
//! - **Errors** are local validation failures returned synchronously from a
//!   property write (`UnknownProperty`, `TypeMismatch`, ...). A rejected write
//!   leaves the store untouched and never reaches the backend.
//! - **Warnings** are non-fatal conditions (`BackendUnavailable`,
//!   `InjectionCorruption`, backend rejections) that ride along in every
//!   `DispatchReport`. Stored values are never rolled back because of them.

use std::fmt;
use thiserror::Error;

use crate::value::ValueKind;

/// Main error type for the crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No field with this global name exists in the catalog (or, for custom
    /// shader parameters, in the active parameter set).
    #[error("unknown property: {0}")]
    UnknownProperty(String),

    /// No property group with this name exists in the catalog.
    #[error("unknown property group: {0}")]
    UnknownGroup(String),

    /// The written value's variant does not match the field's declared type.
    #[error("type mismatch for '{name}': expected {expected}, got {got}")]
    TypeMismatch {
        name: String,
        expected: ValueKind,
        got: ValueKind,
    },

    /// Enum-valued field written with an index outside its variant list.
    #[error("'{name}' has no variant {value} (expected 0..{count})")]
    InvalidVariant { name: String, value: i32, count: usize },

    /// Two catalog fields resolve to the same global name.
    #[error("duplicate property name in catalog: {0}")]
    DuplicateProperty(String),

    /// A texture was assigned to a slot that cannot hold one.
    #[error("invalid texture format: {0}")]
    InvalidTextureFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),

    /// Context chaining, see [`crate::context::Context`].
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    #[inline]
    pub fn custom<S: Into<String>>(msg: S) -> Self {
        Self::Custom(msg.into())
    }

    #[inline]
    pub fn format(args: fmt::Arguments) -> Self {
        Self::Custom(fmt::format(args))
    }

    /// Wrap this error with a context message.
    #[inline]
    pub fn context<C: Into<String>>(self, context: C) -> Self {
        Self::WithContext {
            message: context.into(),
            source: Box::new(self),
        }
    }

    #[inline]
    pub fn msg(msg: &'static str) -> Self {
        Self::Custom(msg.into())
    }

    /// Looks through context wrappers to the original error.
    pub fn root(&self) -> &Error {
        match self {
            Error::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    #[inline]
    pub fn is_unknown_property(&self) -> bool {
        matches!(self.root(), Error::UnknownProperty(_))
    }

    #[inline]
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self.root(), Error::TypeMismatch { .. })
    }

    #[inline]
    pub fn is_json(&self) -> bool {
        matches!(self.root(), Error::Json(_))
    }
}

/// Convenient `Result` alias, use `crate::Result<T>` everywhere.
pub type Result<T> = std::result::Result<T, Error>;

/// Non-fatal conditions surfaced alongside a successful dispatch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A rebuild or push was requested before a backend was attached. The
    /// source was rendered and cached; the push happens on attach.
    #[error("no render backend attached, backend update deferred")]
    BackendUnavailable,

    /// Editor block delimiters did not pair up. The whole previous source
    /// was kept as body.
    #[error("editor block corrupted ({detail}), previous source kept as body")]
    InjectionCorruption { detail: String },

    /// The backend refused the shader source (e.g. compilation failure).
    #[error("backend rejected shader source: {0}")]
    ShaderRejected(String),

    /// The backend reported a declared uniform as unknown.
    #[error("backend rejected parameter '{0}'")]
    ParamRejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_chain_keeps_root() {
        let err = Error::UnknownProperty("bogus_field".into()).context("while restoring");
        assert!(err.is_unknown_property());
        assert_eq!(
            err.to_string(),
            "while restoring: unknown property: bogus_field"
        );
    }

    #[test]
    fn test_type_mismatch_message() {
        let err = Error::TypeMismatch {
            name: "blending_sharpness".into(),
            expected: ValueKind::Float,
            got: ValueKind::Bool,
        };
        assert!(err.is_type_mismatch());
        assert_eq!(
            err.to_string(),
            "type mismatch for 'blending_sharpness': expected float, got bool"
        );
    }

    #[test]
    fn test_warning_display() {
        let w = Warning::InjectionCorruption {
            detail: "missing end delimiter".into(),
        };
        assert!(w.to_string().contains("missing end delimiter"));
    }
}
