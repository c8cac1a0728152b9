//! Host scene collaborator interface.
//!
//! The driver never owns scene objects.  Everything it needs from the host
//! application goes through [`SceneHost`]: named transforms, scalar node
//! attributes, change observations, slice navigation, and status messages.
//! Nodes are referenced by [`NodeId`], a non-owning identity handle that
//! becomes invalid (rather than dangling) when the host deletes the node.

pub mod memory;

pub use memory::MemoryScene;

use crate::geometry::{self, Mat4, Vec3};

// ── Handles ────────────────────────────────────────────────

/// Identity handle for a host scene node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Handle for one registered observation, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverTag(pub u64);

/// Notification channels a node can fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneEvent {
    /// Generic "something on this node changed" (attributes, matrix, ...).
    Modified,
    /// The node's transform to world changed.  Only transform nodes fire it.
    TransformModified,
}

/// A notification delivered for one registered observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub tag: ObserverTag,
    pub node: NodeId,
    pub event: SceneEvent,
}

// ── Attribute values ───────────────────────────────────────

/// Value of a driver-owned node attribute.
///
/// The host stores attributes as nullable strings; the only values the
/// driver ever writes are null and `"pinch"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttributeValue {
    #[default]
    Absent,
    Pinch,
}

impl AttributeValue {
    /// Host-side string form (`None` for a null attribute).
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Self::Absent => None,
            Self::Pinch => Some("pinch"),
        }
    }

    /// Interpret a host string attribute.  Anything but `"pinch"` reads as
    /// absent.
    pub fn from_host(raw: Option<&str>) -> Self {
        match raw {
            Some("pinch") => Self::Pinch,
            _ => Self::Absent,
        }
    }
}

// ── Geometry collaborators ─────────────────────────────────

/// Parameters of the active 3D view camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub focal_point: Vec3,
    pub view_up: Vec3,
    pub view_plane_normal: Vec3,
}

impl Camera {
    /// Camera looking at `focal_point` from `position`, with the view plane
    /// normal pointing back toward the camera.
    pub fn looking_at(position: Vec3, focal_point: Vec3, view_up: Vec3) -> Self {
        Self {
            position,
            focal_point,
            view_up,
            view_plane_normal: geometry::normalize(geometry::sub(position, focal_point)),
        }
    }
}

/// Shape of a model node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelShape {
    Sphere,
    Box { dimensions: Vec3, center: Vec3 },
    /// Two-point polyline.
    Line,
}

/// Model node description used by [`SceneHost::ensure_model`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelSpec {
    pub shape: ModelShape,
    pub color: [f64; 3],
    pub opacity: f64,
}

// ── Errors ─────────────────────────────────────────────────

/// A required host object is missing or of the wrong kind.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SceneError {
    #[error("scene node {0:?} no longer exists")]
    UnknownNode(NodeId),
    #[error("scene node {node:?} is not a {expected} node")]
    WrongKind { node: NodeId, expected: &'static str },
    #[error("parenting {node:?} under {parent:?} would create a cycle")]
    ParentCycle { node: NodeId, parent: NodeId },
    #[error("slice view {0:?} not found")]
    MissingView(String),
    #[error("no active 3D view camera")]
    NoCamera,
}

// ── Host interface ─────────────────────────────────────────

/// Everything the driver needs from the host application's scene.
pub trait SceneHost {
    /// Look up a node by name.
    fn find_node(&self, name: &str) -> Option<NodeId>;

    /// Return the named linear transform, creating an identity one if needed.
    fn get_or_create_transform(&mut self, name: &str) -> NodeId;

    /// Return the named model, creating it from `spec` if needed.
    fn ensure_model(&mut self, name: &str, spec: &ModelSpec) -> NodeId;

    /// Transform-to-parent matrix of a transform node.
    fn matrix(&self, node: NodeId) -> Result<Mat4, SceneError>;

    /// Replace the transform-to-parent matrix.  Fires `Modified` and
    /// `TransformModified`.
    fn set_matrix(&mut self, node: NodeId, matrix: Mat4) -> Result<(), SceneError>;

    /// Write the translation column of a transform node.
    fn set_translation(&mut self, node: NodeId, position: Vec3) -> Result<(), SceneError> {
        let mut m = self.matrix(node)?;
        geometry::set_translation(&mut m, position);
        self.set_matrix(node, m)
    }

    /// Translation of a transform node expressed in world coordinates.
    fn world_translation(&self, node: NodeId) -> Result<Vec3, SceneError>;

    /// Place `node` under a parent transform (or at the root).
    fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>) -> Result<(), SceneError>;

    /// Set a node attribute.  Fires `Modified` even if the value is unchanged.
    fn set_attribute(
        &mut self,
        node: NodeId,
        key: &str,
        value: AttributeValue,
    ) -> Result<(), SceneError>;

    /// Read a node attribute (`Absent` if never set).
    fn attribute(&self, node: NodeId, key: &str) -> Result<AttributeValue, SceneError>;

    /// Register for notifications on `node`.
    fn add_observer(&mut self, node: NodeId, event: SceneEvent) -> Result<ObserverTag, SceneError>;

    /// Remove a registration.  Unknown tags are ignored.
    fn remove_observer(&mut self, tag: ObserverTag);

    /// Drain notifications fired since the last call, in firing order.
    fn take_notifications(&mut self) -> Vec<Notification>;

    /// Set both endpoints of a line model.
    fn set_line_points(&mut self, node: NodeId, start: Vec3, end: Vec3) -> Result<(), SceneError>;

    /// Re-center one slice view on a 3D point.
    fn set_slice_focal_point(&mut self, view: &str, point: Vec3) -> Result<(), SceneError>;

    /// Current focal point of a slice view.
    fn slice_focal_point(&self, view: &str) -> Result<Vec3, SceneError>;

    /// Re-center every linked slice view on a 3D point.
    fn propagate_to_linked_views(&mut self, point: Vec3) -> Result<(), SceneError>;

    /// Camera of the first 3D view, if there is one.
    fn active_camera(&self) -> Option<Camera>;

    /// Show a transient message in the host's status bar.
    fn show_status_message(&mut self, message: &str);
}
