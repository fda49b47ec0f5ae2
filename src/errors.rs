use std::fmt;
use thiserror::Error;

use crate::cluster::tree::PathError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error")]
    Config(#[from] ConfigError),

    /// Cluster connection errors
    #[error("Connection error")]
    Connection(#[from] ConnectionError),

    /// Resource discovery errors
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// A namespace named on the command line could not be read
    #[error("failed to get namespace {name}")]
    Namespace {
        name: String,
        #[source]
        source: ClientError,
    },

    /// Listing errors that could not be skipped
    #[error(transparent)]
    List(#[from] ListError),

    /// Restart patch generation errors
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Reads of a single object that could not be skipped
    #[error(transparent)]
    Read(#[from] RemoteReadError),

    /// Writes rejected by the control plane
    #[error(transparent)]
    Write(#[from] RemoteWriteError),

    /// Secret codec errors
    #[error("Secret codec error")]
    Codec(#[from] CodecError),

    /// Terminal or report output errors
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Some independent units of a batch failed
    #[error("{failed} of {total} {what} failed")]
    PartialFailure {
        what: String,
        failed: usize,
        total: usize,
    },
}

impl AppError {
    /// Create a partial failure error for a batch
    pub fn partial<S: Into<String>>(what: S, failed: usize, total: usize) -> Self {
        Self::PartialFailure {
            what: what.into(),
            failed,
            total,
        }
    }

    /// Create a namespace lookup error
    pub fn namespace<S: Into<String>>(name: S, source: ClientError) -> Self {
        Self::Namespace {
            name: name.into(),
            source,
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

impl ConfigError {
    /// Create a missing configuration error
    pub fn missing<S: Into<String>>(key: S) -> Self {
        Self::MissingConfig(key.into())
    }

    /// Create an invalid configuration value error
    pub fn invalid<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        Self::ParseError(err.to_string())
    }
}

/// Errors raised while building a client for the cluster
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("failed to load kubeconfig")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("failed to infer cluster configuration")]
    Infer(#[from] kube::config::InferConfigError),

    #[error("failed to reach the Kubernetes API")]
    Kube(#[from] kube::Error),
}

/// Failure of a single control-plane call.
///
/// `AlreadyExists` and `NotFound` are split out so callers can recover
/// from them without string matching.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("request rejected ({code} {reason}): {message}")]
    Rejected {
        code: u16,
        reason: String,
        message: String,
    },

    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Create a rejection error
    pub fn rejected<R: Into<String>, M: Into<String>>(code: u16, reason: R, message: M) -> Self {
        Self::Rejected {
            code,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// The set of namespaced kinds could not be enumerated at all
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("failed to list API groups")]
    Unreachable(#[source] ClientError),

    #[error("discovery failed for every API group ({groups} attempted)")]
    AllGroupsFailed {
        groups: usize,
        #[source]
        last: ClientError,
    },
}

/// A list call failed for one kind in one namespace
#[derive(Error, Debug)]
#[error("failed to list {resource} in namespace {namespace:?}")]
pub struct ListError {
    pub resource: String,
    pub namespace: String,
    #[source]
    pub source: ClientError,
}

impl ListError {
    pub fn new<R: Into<String>, N: Into<String>>(resource: R, namespace: N, source: ClientError) -> Self {
        Self {
            resource: resource.into(),
            namespace: namespace.into(),
            source,
        }
    }
}

/// The object does not have the layout of a workload controller
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("{kind} {name}: pod template metadata not found")]
    MissingTemplate {
        kind: String,
        name: String,
        #[source]
        source: PathError,
    },

    #[error("{kind} {name}: failed to serialize object")]
    Serialization {
        kind: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported workload kind {0}")]
    UnsupportedKind(String),
}

/// Remote write operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
    Patch,
    Delete,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            WriteOp::Create => "create",
            WriteOp::Update => "update",
            WriteOp::Patch => "patch",
            WriteOp::Delete => "delete",
        };
        f.write_str(verb)
    }
}

/// A create/update/patch/delete call was rejected by the control plane
#[derive(Error, Debug)]
#[error("failed to {op} {kind} {namespace}/{name}")]
pub struct RemoteWriteError {
    pub op: WriteOp,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    #[source]
    pub source: ClientError,
}

impl RemoteWriteError {
    pub fn new<K, NS, N>(op: WriteOp, kind: K, namespace: NS, name: N, source: ClientError) -> Self
    where
        K: Into<String>,
        NS: Into<String>,
        N: Into<String>,
    {
        Self {
            op,
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
            source,
        }
    }
}

/// A get of a single object failed for a reason other than `NotFound`
#[derive(Error, Debug)]
#[error("failed to get {kind} {namespace}/{name}")]
pub struct RemoteReadError {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    #[source]
    pub source: ClientError,
}

impl RemoteReadError {
    pub fn new<K, NS, N>(kind: K, namespace: NS, name: N, source: ClientError) -> Self
    where
        K: Into<String>,
        NS: Into<String>,
        N: Into<String>,
    {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
            source,
        }
    }
}

/// Secret codec input errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to parse input as yaml ({yaml}) or json ({json})")]
    Parse { yaml: String, json: String },

    #[error("input does not look like a secret (missing 'data' or not a mapping)")]
    NotASecret,

    #[error("key {0} has a non string value")]
    NonString(String),

    #[error("key {key} is not valid base64")]
    InvalidBase64 {
        key: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("key {0} does not decode to UTF-8 text")]
    NotUtf8(String),

    #[error("failed to render yaml")]
    Render(#[from] serde_yaml::Error),
}
