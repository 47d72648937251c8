//! Error types for the code-generation stage.
//!
//! The backend is a total function on well-formed low-level NIR. There is
//! no retry and no partial recovery: a shard either produces a complete
//! `.ll` module or fails the whole build with one of the errors below.

use thiserror::Error;

/// A fatal code-generation failure.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// A defn, type, value, or op outside the supported low-level subset
    /// reached the emitter. Upstream lowering should have eliminated it.
    #[error("unsupported {what}: {entity}")]
    Unsupported {
        /// What kind of entity was rejected (e.g. "op", "next", "callee").
        what: &'static str,
        /// Textual form of the offending entity.
        entity: String,
    },

    /// A referenced global is not present in the defn map handed to the
    /// emitter.
    #[error("undefined global @\"{0}\"")]
    UndefinedGlobal(String),

    /// Working-directory write failure.
    #[error("failed to write LLVM IR: {0}")]
    Io(#[from] std::io::Error),
}

impl CodegenError {
    /// Shorthand for an [`CodegenError::Unsupported`] built from any
    /// debug-printable entity.
    pub(crate) fn unsupported(what: &'static str, entity: &impl std::fmt::Debug) -> Self {
        CodegenError::Unsupported {
            what,
            entity: format!("{entity:?}"),
        }
    }
}
