use std::io;

use thiserror::Error;

use crate::cell::Kind;

/// Errors that could occur while registering metrics or configuring a poller.
#[derive(Debug, Error)]
pub enum Error {
    /// Metric and registry names must have at least one character.
    #[error("name cannot be empty")]
    NameEmpty,

    /// Metric and registry names are bounded to keep keys bounded.
    #[error("name '{name}' is longer than {max} bytes")]
    NameTooLong {
        /// The offending name.
        name: String,
        /// The maximum number of bytes allowed.
        max: usize,
    },

    /// Names end up in dotted keys, so control characters are rejected outright.
    #[error("name '{name}' contains control characters")]
    NameInvalid {
        /// The offending name.
        name: String,
    },

    /// A metric with the same name is already registered.
    #[error("metric '{name}' already exists")]
    AlreadyExists {
        /// The contested name.
        name: String,
    },

    /// The name is registered under a different metric kind.
    #[error("metric '{name}' is registered as a {existing}, not a {requested}")]
    KindMismatch {
        /// The contested name.
        name: String,
        /// The kind already present in the registry.
        existing: Kind,
        /// The kind the caller asked for.
        requested: Kind,
    },

    /// Histogram thresholds were empty, too many, or not strictly ascending.
    #[error("histogram thresholds must be two to nine strictly ascending values")]
    InvalidThresholds,

    /// The target quantile must be strictly between zero and one.
    #[error("target quantile {0} is not within (0, 1)")]
    InvalidQuantile(f64),

    /// Spawning the background poll thread did not succeed.
    #[error("failed to spawn poll thread: {0}")]
    Thread(#[from] io::Error),
}

/// Errors surfaced while reading a slot during a sweep.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum ReadError {
    /// A recorder holds the slot; the value stays put and is picked up by the next sweep.
    #[error("slot is being written, retry on the next sweep")]
    Busy,
}
