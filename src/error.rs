// THEORY:
// Every fallible operation in the engine reports through one error type. Failures
// here are precondition violations (a mis-sized frame, a bad configuration) and are
// reported immediately; the pipeline never attempts partial work on bad input.
// Ordinary "nothing found" outcomes (degenerate contours, regions without a usable
// depth) are NOT errors and never show up here: they are dropped and logged.

use thiserror::Error;

/// Errors produced by the location engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocationError {
    /// The depth buffer length does not match `width * height`.
    #[error("invalid frame: expected {expected} depth samples, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },

    /// The frame is well-formed but its dimensions differ from the ones the
    /// pipeline was built for.
    #[error("frame size mismatch: pipeline expects {expected:?}, frame is {actual:?}")]
    FrameSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A volume with this id is already registered.
    #[error("volume `{0}` is already registered")]
    DuplicateVolume(String),

    #[error("no volume registered with id `{0}`")]
    UnknownVolume(String),

    /// The per-pixel worker pool could not be built.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    /// The processing task behind a service went away.
    #[error("location service is no longer running")]
    ServiceStopped,
}

pub type Result<T> = std::result::Result<T, LocationError>;
