use thiserror::Error;

use crate::link::LinkId;
use crate::node::{DataType, NodeId, PortId};

/// Errors raised by camera setters that refuse to clamp.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Invalid camera state: {0}")]
    InvalidCameraState(String),
}

/// Integrity violations reported by the state manager.
///
/// These are never fatal: the rejected operation leaves the graph untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Node '{0}' already exists")]
    DuplicateNode(NodeId),

    #[error("Link '{0}' already exists")]
    DuplicateLink(LinkId),

    #[error("Node '{0}' not found")]
    NodeNotFound(NodeId),

    #[error("Link '{0}' not found")]
    LinkNotFound(LinkId),

    #[error("Port '{port}' appears twice on node '{node}'")]
    DuplicatePort { node: NodeId, port: PortId },

    #[error("Port '{port}' not found on node '{node}'")]
    PortNotFound { node: NodeId, port: PortId },

    #[error("Port '{port}' on node '{node}' is not an {expected} port")]
    WrongDirection {
        node: NodeId,
        port: PortId,
        expected: &'static str,
    },

    #[error("Cannot connect {source_type} output to {target_type} input")]
    TypeMismatch {
        source_type: DataType,
        target_type: DataType,
    },

    #[error("Link from '{from}' to '{to}' would create a cycle")]
    WouldCreateCycle { from: NodeId, to: NodeId },

    #[error("Cannot connect node '{0}' to itself")]
    SelfConnection(NodeId),

    #[error("Input '{port}' on node '{node}' already has a connection")]
    InputAlreadyConnected { node: NodeId, port: PortId },
}

/// Configuration problems found while loading or validating settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Zoom bounds must satisfy 0 < min < max (got {min}..{max})")]
    InvalidZoomBounds { min: f32, max: f32 },

    #[error("Initial zoom {0} must be a positive finite number")]
    InvalidZoom(f32),

    #[error("Grid size must be a positive number (got {0})")]
    InvalidGridSize(f32),

    #[error("Invalid colour '{0}'")]
    InvalidColor(String),

    #[error("{field} must be a positive finite number (got {value})")]
    NotPositive { field: &'static str, value: f32 },

    #[error("No configuration directory available on this platform")]
    NoConfigDir,

    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures while saving or restoring a scene file.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Failed to access scene file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse scene JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported scene version {found} (expected at most {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("No data directory available on this platform")]
    NoDataDir,

    #[error("Invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Top-level error for engine construction and host-facing commands.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid engine configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error("Engine has been destroyed")]
    Destroyed,
}
