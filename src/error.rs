//! Error types for the bridge
//!
//! Registration-time problems are fatal: the public `register` entry points
//! panic with the `Display` text of a [`RegistrationError`], while the
//! `try_*` variants hand the same error back to the caller.

use std::path::PathBuf;
use thiserror::Error;

use crate::variant::VariantType;

/// Class registration failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("class `{0}` is already registered")]
    DuplicateClass(String),

    #[error("class `{class}` extends `{parent}`, which the engine does not know")]
    UnknownParent { class: String, parent: String },

    #[error("invalid class name `{0}`")]
    InvalidName(String),

    #[error(
        "`{class}::{method}` cannot override virtual `{engine_name}`: \
         expected {expected} parameter(s), found {found}"
    )]
    VirtualArity {
        class: String,
        method: String,
        engine_name: String,
        expected: usize,
        found: usize,
    },

    #[error(
        "`{class}::{method}` cannot override virtual `{engine_name}`: \
         parameter {index} is {found}, engine passes {expected}"
    )]
    VirtualParamType {
        class: String,
        method: String,
        engine_name: String,
        index: usize,
        expected: VariantType,
        found: VariantType,
    },

    #[error("`{class}` declares member `{member}` twice")]
    DuplicateMember { class: String, member: String },

    #[error("`{class}::{member}` cannot be a property: {reason}")]
    InvalidProperty {
        class: String,
        member: String,
        reason: &'static str,
    },

    #[error("class `{0}` is not registered")]
    NotRegistered(String),

    #[error("child `{child}` of `{class}` is a `{found}`, declared as `{expected}`")]
    ChildClassMismatch {
        class: String,
        child: String,
        expected: String,
        found: String,
    },
}

/// Variant conversion failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvertError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: VariantType,
        found: VariantType,
    },

    #[error("value {value} does not fit in {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("object is null")]
    NullObject,

    #[error("object {0:#x} does not exist")]
    UnknownObject(usize),

    #[error("expected a `{expected}`, found a `{found}`")]
    ClassMismatch { expected: String, found: String },

    #[error("no bridge is active on this thread to resolve objects")]
    NoBridge,

    #[error("{0}")]
    Custom(String),
}

impl serde::ser::Error for ConvertError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        ConvertError::Custom(msg.to_string())
    }
}

/// Engine-initiated call failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error("`{class}` has no method `{method}`")]
    NoSuchMethod { class: String, method: String },

    #[error("`{method}` expects {expected} argument(s), got {got}")]
    ArgCountMismatch {
        method: String,
        expected: usize,
        got: usize,
    },

    #[error("argument {index} of `{method}`: {source}")]
    InvalidArgument {
        method: String,
        index: usize,
        #[source]
        source: ConvertError,
    },

    #[error("no live instance for object {0:#x}")]
    NoInstance(usize),

    #[error("`{method}` is not static")]
    NotStatic { method: String },
}

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Documentation sidecar failures
#[derive(Debug, Error)]
pub enum DocError {
    #[error("failed to read documentation {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse documentation {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Umbrella error for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Doc(#[from] DocError),
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
