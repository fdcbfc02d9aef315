// This module defines the error taxonomy for hipcomp using the thiserror crate. CompileError
// is the single error type surfaced to callers of the compile pipeline. Its variants cover
// one-time backend initialization, failed comgr actions (with the decoded build log of the
// failing stage), IR verification, LLVM code generation, linking, external tool invocation,
// plain comgr API failures, library loading, architecture parsing and configuration. Build
// logs are decoded lossily so a garbled log never prevents an error from being reported.
// CompileResult<T> is the convenience alias used throughout the crate.

//! Error types for the compile pipeline.

use thiserror::Error;

/// Main error type for kernel compilation.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Backend initialization failed: {reason}")]
    BackendInit { reason: String },

    #[error("{stage} failed (status {status}){}", render_log(.log))]
    StageAction {
        stage: &'static str,
        status: u32,
        log: String,
    },

    #[error("IR verification failed: {reason}")]
    Verification { reason: String },

    #[error("Code generation failed: {reason}")]
    Codegen { reason: String },

    #[error("Link failed: {reason}{}", render_log(.log))]
    Link { reason: String, log: String },

    #[error("{tool} exited with {}{}", render_code(.code), render_log(.stderr))]
    ProcessInvocation {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("comgr call {call} failed with status {status}: {message}")]
    Native {
        call: &'static str,
        status: u32,
        message: String,
    },

    #[error("Could not load comgr: {reason}")]
    LibraryLoad { reason: String },

    #[error("Unsupported architecture: {arch:?}")]
    InvalidArch { arch: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

impl CompileError {
    /// Captured diagnostic text attached to this error, if any.
    pub fn log(&self) -> Option<&str> {
        match self {
            CompileError::StageAction { log, .. } | CompileError::Link { log, .. } => {
                Some(log.as_str()).filter(|l| !l.is_empty())
            }
            CompileError::ProcessInvocation { stderr, .. } => {
                Some(stderr.as_str()).filter(|l| !l.is_empty())
            }
            _ => None,
        }
    }
}

/// Decode a native build log. Invalid UTF-8 is replaced, never rejected.
pub fn decode_log(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .trim_end()
        .to_string()
}

fn render_log(log: &str) -> String {
    if log.is_empty() {
        String::new()
    } else {
        format!("\n{log}")
    }
}

fn render_code(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}
