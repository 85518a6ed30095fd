//! Error types for file patching and external tool invocation

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure of a file patching operation.
///
/// Whenever one of these is returned the target file has not been written.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PatchError {
    /// The literal text to replace does not occur in the file
    #[error("unable to find the content to be replaced in {path}: {target:?}")]
    TargetNotFound { path: PathBuf, target: String },

    /// A regex substitution left the file byte-identical
    #[error("unable to find the content to be replaced in {path}: pattern {pattern:?} changed nothing")]
    NoEffectiveChange { path: PathBuf, pattern: String },

    /// The commented block does not occur verbatim in the file
    #[error("unable to find the code {target:?} to be uncommented in {path}")]
    UncommentTargetNotFound { path: PathBuf, target: String },

    /// The regex pattern failed to compile
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// An empty target was supplied; there is nothing to locate
    #[error("empty target: nothing to locate")]
    EmptyTarget,

    /// Stat, read, or write failure on the target file
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the operation failed because its target was not located.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TargetNotFound { .. }
                | Self::NoEffectiveChange { .. }
                | Self::UncommentTargetNotFound { .. }
        )
    }

    /// The underlying I/O error, if this is an I/O failure.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failure while driving an external tool (kubectl, kind, the scaffolding CLI).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToolError {
    /// The executable could not be located on PATH
    #[error("{tool} not found on PATH")]
    ToolNotFound { tool: String },

    /// The process could not be started
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The process ran but exited unsuccessfully
    #[error("{command} failed with {}: {output}", exit_description(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// Project directory setup failed
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A polled condition did not become true in time
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    #[error(transparent)]
    Patch(#[from] PatchError),
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {code}"),
        None => "no exit status (terminated by signal)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let err = PatchError::TargetNotFound {
            path: PathBuf::from("a.txt"),
            target: "x".into(),
        };
        assert!(err.is_not_found());

        let err = PatchError::io("a.txt", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(!err.is_not_found());
        assert_eq!(err.io_error().map(io::Error::kind), Some(io::ErrorKind::NotFound));
    }

    #[test]
    fn test_uncomment_message_names_target() {
        let err = PatchError::UncommentTargetNotFound {
            path: PathBuf::from("main.go"),
            target: "// foo".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("unable to find the code"));
        assert!(msg.contains("// foo"));
        assert!(msg.contains("main.go"));
    }

    #[test]
    fn test_command_failed_message() {
        let err = ToolError::CommandFailed {
            command: "kubectl get pods".into(),
            code: Some(1),
            output: "boom".into(),
        };
        assert_eq!(err.to_string(), "kubectl get pods failed with exit status 1: boom");

        let err = ToolError::CommandFailed {
            command: "kind".into(),
            code: None,
            output: String::new(),
        };
        assert!(err.to_string().contains("terminated by signal"));
    }
}
