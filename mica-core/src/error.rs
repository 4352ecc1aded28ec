// mica-core - Error types for the Mica engine
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Error types shared by every stage of the engine.
//!
//! The four error families follow the pipeline: parse errors from the
//! lexer/parser, semantic errors from the pre-codegen checker, codegen
//! limits (constant pool, local offsets, call arity), and runtime errors
//! from the VM. Runtime errors carry a [`VmPosition`] which is attached
//! layer by layer as the error unwinds out of the VM; the host maps it
//! back to a source position through the code map.

use std::fmt;

use crate::bytecode::VmPosition;
use crate::position::ScriptPosition;

/// Result type used across the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the Mica engine.
#[derive(Debug, Clone)]
pub enum Error {
    /// Malformed source text.
    Parse {
        message: String,
        position: ScriptPosition,
    },
    /// Rejected by the semantic checker before codegen.
    Semantic {
        message: String,
        position: ScriptPosition,
    },
    /// A codegen limit was exceeded (constant pool, local offset, arity).
    Codegen {
        message: String,
        position: ScriptPosition,
    },
    /// Runtime error inside the VM.
    Runtime {
        message: String,
        position: Option<VmPosition>,
        /// Source position resolved through the code map, when available.
        source: Option<ScriptPosition>,
    },
    /// I/O error (script files, module imports, artifacts).
    Io {
        operation: &'static str,
        path: Option<String>,
        message: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse { message, position } => {
                write!(f, "Parse error at {}: {}", position, message)
            }
            Error::Semantic { message, position } => {
                write!(f, "Semantic error at {}: {}", position, message)
            }
            Error::Codegen { message, position } => {
                write!(f, "Codegen error at {}: {}", position, message)
            }
            Error::Runtime {
                message,
                position,
                source,
            } => {
                write!(f, "Runtime error: {}", message)?;
                if let Some(src) = source {
                    write!(f, " ({})", src)?;
                } else if let Some(pos) = position {
                    write!(f, " ({})", pos)?;
                }
                Ok(())
            }
            Error::Io {
                operation,
                path,
                message,
            } => {
                if let Some(path) = path {
                    write!(f, "{} '{}': {}", operation, path, message)
                } else {
                    write!(f, "{}: {}", operation, message)
                }
            }
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Create a parse error.
    pub fn parse(message: impl Into<String>, position: ScriptPosition) -> Self {
        Error::Parse {
            message: message.into(),
            position,
        }
    }

    /// Create a semantic error.
    pub fn semantic(message: impl Into<String>, position: ScriptPosition) -> Self {
        Error::Semantic {
            message: message.into(),
            position,
        }
    }

    /// Create a codegen limit error.
    pub fn codegen(message: impl Into<String>, position: ScriptPosition) -> Self {
        Error::Codegen {
            message: message.into(),
            position,
        }
    }

    /// Create a runtime error with no position yet.
    pub fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime {
            message: message.into(),
            position: None,
            source: None,
        }
    }

    /// Create an I/O error from a `std::io::Error`.
    pub fn io(operation: &'static str, path: Option<String>, error: std::io::Error) -> Self {
        Error::Io {
            operation,
            path,
            message: error.to_string(),
        }
    }

    /// Whether this is a runtime error (used by the harness pass rules).
    pub fn is_runtime(&self) -> bool {
        matches!(self, Error::Runtime { .. })
    }

    /// Attach a VM position to a runtime error if it has none yet.
    ///
    /// Non-runtime errors and errors that already carry a position pass
    /// through unchanged, so the innermost layer wins.
    pub fn with_vm_position(self, pos: VmPosition) -> Self {
        match self {
            Error::Runtime {
                message,
                position: None,
                source,
            } => Error::Runtime {
                message,
                position: Some(pos),
                source,
            },
            other => other,
        }
    }

    /// Attach a resolved source position to a runtime error if it has none.
    pub fn with_source_position(self, src: ScriptPosition) -> Self {
        match self {
            Error::Runtime {
                message,
                position,
                source: None,
            } => Error::Runtime {
                message,
                position,
                source: Some(src),
            },
            other => other,
        }
    }

    /// The VM position of a runtime error, if attached.
    pub fn vm_position(&self) -> Option<VmPosition> {
        match self {
            Error::Runtime { position, .. } => *position,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_position_attachment() {
        let err = Error::runtime("boom");
        assert!(err.vm_position().is_none());

        let pos = VmPosition::new(1, 2, 3);
        let err = err.with_vm_position(pos);
        assert_eq!(err.vm_position(), Some(pos));

        // Inner position wins: a second attach is a no-op.
        let err = err.with_vm_position(VmPosition::new(9, 9, 9));
        assert_eq!(err.vm_position(), Some(pos));
    }

    #[test]
    fn test_display() {
        let err = Error::parse("unexpected '}'", ScriptPosition::new(2, 5));
        assert_eq!(err.to_string(), "Parse error at line 2, column 5: unexpected '}'");

        let err = Error::runtime("Stack underflow");
        assert_eq!(err.to_string(), "Runtime error: Stack underflow");
    }
}
