//! Interactive node-graph canvas: a world-space camera, an integrity-checked
//! graph store, pointer gestures and a layered renderer driven by an iced
//! canvas.

pub mod camera;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod interaction;
pub mod layout;
pub mod link;
pub mod node;
pub mod perf;
pub mod render;
pub mod scene;
pub mod state;
pub mod view;

pub use engine::{CanvasEngine, EngineEvent, EngineEventKind};
pub use error::{CameraError, ConfigError, EngineError, GraphError, SceneError};
