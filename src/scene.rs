use directories::ProjectDirs;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::camera::CameraState;
use crate::error::SceneError;
use crate::link::Link;
use crate::node::{Node, NodeData, NodeKind, NodeStatus};

/// A saved canvas: nodes, links and optionally the camera.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scene {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraState>,
    #[serde(default)]
    pub nodes: Vec<NodeData>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            camera: None,
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }
}

impl Scene {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        let scene: Scene = serde_json::from_str(json)?;
        if scene.version > Self::CURRENT_VERSION {
            return Err(SceneError::UnsupportedVersion {
                found: scene.version,
                supported: Self::CURRENT_VERSION,
            });
        }
        Ok(scene)
    }

    pub fn to_json(&self) -> Result<String, SceneError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load_from(path: &Path) -> Result<Self, SceneError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SceneError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf, SceneError> {
        let dirs = ProjectDirs::from("", "", "nodeflow").ok_or(SceneError::NoDataDir)?;
        Ok(dirs.data_dir().join("scene.json"))
    }
}

/// How a matcher compares node labels.
#[derive(Debug, Clone)]
enum LabelPattern {
    Any,
    /// Lowercased needle for a case-insensitive substring match.
    Substring(String),
    Regex(Regex),
}

/// Identifies nodes by label, kind and status for searching
#[derive(Debug, Clone)]
pub struct NodeMatcher {
    label: LabelPattern,
    kind: Option<NodeKind>,
    status: Option<NodeStatus>,
}

impl NodeMatcher {
    /// Case-insensitive label substring. An empty label matches every node.
    pub fn new(label: &str) -> Self {
        let label = if label.is_empty() {
            LabelPattern::Any
        } else {
            LabelPattern::Substring(label.to_lowercase())
        };
        Self {
            label,
            kind: None,
            status: None,
        }
    }

    /// Label regex, compiled once here.
    pub fn regex(pattern: &str) -> Result<Self, SceneError> {
        Ok(Self {
            label: LabelPattern::Regex(Regex::new(pattern)?),
            kind: None,
            status: None,
        })
    }

    /// `/pattern` searches by regex, anything else by substring.
    pub fn parse(query: &str) -> Result<Self, SceneError> {
        match query.strip_prefix('/') {
            Some(pattern) => Self::regex(pattern),
            None => Ok(Self::new(query.trim())),
        }
    }

    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, node: &Node) -> bool {
        if self.kind.is_some_and(|kind| kind != node.kind()) {
            return false;
        }
        if self.status.is_some_and(|status| status != node.status) {
            return false;
        }
        match &self.label {
            LabelPattern::Any => true,
            LabelPattern::Substring(needle) => node.label.to_lowercase().contains(needle),
            LabelPattern::Regex(re) => re.is_match(&node.label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iced::Point;

    #[test]
    fn matcher_filters_by_kind_and_label() {
        let node = Node::new("n", NodeKind::Webhook, Point::ORIGIN).with_label("Order Hook");
        assert!(NodeMatcher::new("order").matches(&node));
        assert!(NodeMatcher::new("").with_kind(NodeKind::Webhook).matches(&node));
        assert!(!NodeMatcher::new("order").with_kind(NodeKind::Filter).matches(&node));
        assert!(NodeMatcher::regex("^Order\\s").unwrap().matches(&node));
        assert!(NodeMatcher::regex("([").is_err());
    }

    #[test]
    fn queries_with_a_slash_are_regexes() {
        let node = Node::new("n", NodeKind::Filter, Point::ORIGIN).with_label("Drop Nulls");
        assert!(!NodeMatcher::parse("/^drop").unwrap().matches(&node));
        assert!(NodeMatcher::parse("/^Drop\\b").unwrap().matches(&node));
        assert!(NodeMatcher::parse(" nulls ").unwrap().matches(&node));
        assert!(matches!(NodeMatcher::parse("/(["), Err(SceneError::InvalidPattern(_))));
    }

    #[test]
    fn newer_versions_are_rejected() {
        let json = r#"{"version": 99, "nodes": [], "links": []}"#;
        assert!(matches!(
            Scene::from_json(json),
            Err(SceneError::UnsupportedVersion { found: 99, .. })
        ));
    }
}
