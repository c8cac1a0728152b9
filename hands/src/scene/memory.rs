//! In-process scene model implementing [`SceneHost`].
//!
//! Used by the headless backend and by tests.  Mirrors the host behaviour
//! the driver relies on: attribute writes always fire `Modified`, matrix
//! writes fire `Modified` then `TransformModified`, and a transform change
//! propagates `TransformModified` to every descendant transform.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use super::{
    AttributeValue, Camera, ModelShape, ModelSpec, NodeId, Notification, ObserverTag, SceneError,
    SceneEvent, SceneHost,
};
use crate::geometry::{self, Mat4, Vec3};

/// Slice views the default layout provides, primary first.
pub const DEFAULT_SLICE_VIEWS: [&str; 3] = ["Red", "Yellow", "Green"];

#[derive(Debug, Clone)]
enum NodeKind {
    Transform { matrix: Mat4 },
    Model { spec: ModelSpec, points: Vec<Vec3> },
}

#[derive(Debug, Clone)]
struct SceneNode {
    kind: NodeKind,
    parent: Option<NodeId>,
    /// Stored the way the host stores them: nullable strings.
    attributes: HashMap<String, Option<String>>,
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    tag: ObserverTag,
    node: NodeId,
    event: SceneEvent,
}

/// Scene graph held entirely in memory.
pub struct MemoryScene {
    nodes: HashMap<NodeId, SceneNode>,
    by_name: HashMap<String, NodeId>,
    observers: Vec<Registration>,
    pending: Vec<Notification>,
    /// Slice view name -> focal point.
    views: BTreeMap<String, Vec3>,
    camera: Option<Camera>,
    next_node_id: u64,
    next_tag: u64,
}

impl MemoryScene {
    /// Scene with the default three slice views and a camera looking at the
    /// origin from anterior.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            by_name: HashMap::new(),
            observers: Vec::new(),
            pending: Vec::new(),
            views: DEFAULT_SLICE_VIEWS
                .iter()
                .map(|v| (v.to_string(), geometry::ORIGIN))
                .collect(),
            camera: Some(Camera::looking_at(
                [0.0, 500.0, 0.0],
                geometry::ORIGIN,
                [0.0, 0.0, 1.0],
            )),
            next_node_id: 1,
            next_tag: 1,
        }
    }

    fn node(&self, node: NodeId) -> Result<&SceneNode, SceneError> {
        self.nodes.get(&node).ok_or(SceneError::UnknownNode(node))
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut SceneNode, SceneError> {
        self.nodes.get_mut(&node).ok_or(SceneError::UnknownNode(node))
    }

    fn insert_node(&mut self, name: &str, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        self.nodes.insert(
            id,
            SceneNode {
                kind,
                parent: None,
                attributes: HashMap::new(),
            },
        );
        self.by_name.insert(name.to_string(), id);
        debug!(?id, name, "scene node created");
        id
    }

    fn notify(&mut self, node: NodeId, event: SceneEvent) {
        let fired = self
            .observers
            .iter()
            .filter(|r| r.node == node && r.event == event)
            .map(|r| Notification { tag: r.tag, node, event });
        self.pending.extend(fired);
    }

    /// Fire `TransformModified` on `node` (if it is a transform) and on every
    /// transform below it.
    fn notify_transform_changed(&mut self, node: NodeId) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if matches!(
                self.nodes.get(&current).map(|n| &n.kind),
                Some(NodeKind::Transform { .. })
            ) {
                self.notify(current, SceneEvent::TransformModified);
            }
            let mut children: Vec<NodeId> = self
                .nodes
                .iter()
                .filter(|(_, n)| n.parent == Some(current))
                .map(|(id, _)| *id)
                .collect();
            children.sort();
            stack.extend(children.into_iter().rev());
        }
    }

    fn transform_to_world(&self, node: NodeId) -> Result<Mat4, SceneError> {
        let mut world = geometry::identity();
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            let n = self.node(current)?;
            if let NodeKind::Transform { matrix } = &n.kind {
                world = geometry::mul(matrix, &world);
            }
            cursor = n.parent;
        }
        Ok(world)
    }
}

/// Inspection and host-side edits used by tests.
#[cfg(test)]
impl MemoryScene {
    pub fn set_camera(&mut self, camera: Option<Camera>) {
        self.camera = camera;
    }

    /// Remove the slice views (e.g. a 3D-only layout).
    pub fn clear_slice_views(&mut self) {
        self.views.clear();
    }

    /// Delete a node, as the host's scene management would.  Its
    /// observations and children's parent links go with it.
    pub fn remove_node(&mut self, node: NodeId) {
        if self.nodes.remove(&node).is_some() {
            self.by_name.retain(|_, id| *id != node);
            self.observers.retain(|r| r.node != node);
            for child in self.nodes.values_mut() {
                if child.parent == Some(node) {
                    child.parent = None;
                }
            }
            debug!(?node, "scene node removed");
        }
    }

    /// Number of live observations.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn parent(&self, node: NodeId) -> Result<Option<NodeId>, SceneError> {
        Ok(self.node(node)?.parent)
    }

    pub fn model_spec(&self, node: NodeId) -> Result<ModelSpec, SceneError> {
        match &self.node(node)?.kind {
            NodeKind::Model { spec, .. } => Ok(*spec),
            NodeKind::Transform { .. } => Err(SceneError::WrongKind { node, expected: "model" }),
        }
    }

    pub fn line_points(&self, node: NodeId) -> Result<Vec<Vec3>, SceneError> {
        match &self.node(node)?.kind {
            NodeKind::Model { points, .. } => Ok(points.clone()),
            NodeKind::Transform { .. } => Err(SceneError::WrongKind { node, expected: "model" }),
        }
    }
}

impl Default for MemoryScene {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneHost for MemoryScene {
    fn find_node(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    fn get_or_create_transform(&mut self, name: &str) -> NodeId {
        if let Some(id) = self.find_node(name) {
            return id;
        }
        self.insert_node(
            name,
            NodeKind::Transform {
                matrix: geometry::identity(),
            },
        )
    }

    fn ensure_model(&mut self, name: &str, spec: &ModelSpec) -> NodeId {
        if let Some(id) = self.find_node(name) {
            return id;
        }
        let points = match spec.shape {
            ModelShape::Line => vec![geometry::ORIGIN, [1.0, 1.0, 1.0]],
            ModelShape::Sphere | ModelShape::Box { .. } => Vec::new(),
        };
        self.insert_node(name, NodeKind::Model { spec: *spec, points })
    }

    fn matrix(&self, node: NodeId) -> Result<Mat4, SceneError> {
        match &self.node(node)?.kind {
            NodeKind::Transform { matrix } => Ok(*matrix),
            NodeKind::Model { .. } => Err(SceneError::WrongKind {
                node,
                expected: "transform",
            }),
        }
    }

    fn set_matrix(&mut self, node: NodeId, new_matrix: Mat4) -> Result<(), SceneError> {
        match &mut self.node_mut(node)?.kind {
            NodeKind::Transform { matrix } => *matrix = new_matrix,
            NodeKind::Model { .. } => {
                return Err(SceneError::WrongKind {
                    node,
                    expected: "transform",
                })
            }
        }
        self.notify(node, SceneEvent::Modified);
        self.notify_transform_changed(node);
        Ok(())
    }

    fn world_translation(&self, node: NodeId) -> Result<Vec3, SceneError> {
        self.matrix(node)?;
        Ok(geometry::translation(&self.transform_to_world(node)?))
    }

    fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>) -> Result<(), SceneError> {
        self.node(node)?;
        if let Some(p) = parent {
            self.matrix(p)?;
            let mut cursor = Some(p);
            while let Some(current) = cursor {
                if current == node {
                    return Err(SceneError::ParentCycle { node, parent: p });
                }
                cursor = self.node(current)?.parent;
            }
        }
        self.node_mut(node)?.parent = parent;
        self.notify(node, SceneEvent::Modified);
        self.notify_transform_changed(node);
        Ok(())
    }

    fn set_attribute(
        &mut self,
        node: NodeId,
        key: &str,
        value: AttributeValue,
    ) -> Result<(), SceneError> {
        let raw = value.as_str().map(str::to_string);
        self.node_mut(node)?.attributes.insert(key.to_string(), raw);
        self.notify(node, SceneEvent::Modified);
        Ok(())
    }

    fn attribute(&self, node: NodeId, key: &str) -> Result<AttributeValue, SceneError> {
        let raw = self.node(node)?.attributes.get(key).and_then(|v| v.as_deref());
        Ok(AttributeValue::from_host(raw))
    }

    fn add_observer(&mut self, node: NodeId, event: SceneEvent) -> Result<ObserverTag, SceneError> {
        self.node(node)?;
        let tag = ObserverTag(self.next_tag);
        self.next_tag += 1;
        self.observers.push(Registration { tag, node, event });
        Ok(tag)
    }

    fn remove_observer(&mut self, tag: ObserverTag) {
        self.observers.retain(|r| r.tag != tag);
        self.pending.retain(|n| n.tag != tag);
    }

    fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.pending)
    }

    fn set_line_points(&mut self, node: NodeId, start: Vec3, end: Vec3) -> Result<(), SceneError> {
        match &mut self.node_mut(node)?.kind {
            NodeKind::Model {
                spec:
                    ModelSpec {
                        shape: ModelShape::Line,
                        ..
                    },
                points,
            } => {
                *points = vec![start, end];
            }
            _ => return Err(SceneError::WrongKind { node, expected: "line" }),
        }
        self.notify(node, SceneEvent::Modified);
        Ok(())
    }

    fn set_slice_focal_point(&mut self, view: &str, point: Vec3) -> Result<(), SceneError> {
        let focal = self
            .views
            .get_mut(view)
            .ok_or_else(|| SceneError::MissingView(view.to_string()))?;
        *focal = point;
        debug!(view, x = point[0], y = point[1], z = point[2], "slice jump");
        Ok(())
    }

    fn slice_focal_point(&self, view: &str) -> Result<Vec3, SceneError> {
        self.views
            .get(view)
            .copied()
            .ok_or_else(|| SceneError::MissingView(view.to_string()))
    }

    fn propagate_to_linked_views(&mut self, point: Vec3) -> Result<(), SceneError> {
        if self.views.is_empty() {
            return Err(SceneError::MissingView("linked".to_string()));
        }
        for focal in self.views.values_mut() {
            *focal = point;
        }
        Ok(())
    }

    fn active_camera(&self) -> Option<Camera> {
        self.camera
    }

    fn show_status_message(&mut self, message: &str) {
        info!(status = message, "status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_transform_is_idempotent() {
        let mut scene = MemoryScene::new();
        let a = scene.get_or_create_transform("Left-To-Table");
        let b = scene.get_or_create_transform("Left-To-Table");
        assert_eq!(a, b);
        assert_eq!(scene.find_node("Left-To-Table"), Some(a));
        assert_eq!(scene.matrix(a).unwrap(), geometry::identity());
    }

    #[test]
    fn test_attribute_write_always_fires_modified() {
        let mut scene = MemoryScene::new();
        let t = scene.get_or_create_transform("t");
        let tag = scene.add_observer(t, SceneEvent::Modified).unwrap();
        scene.set_attribute(t, "k", AttributeValue::Pinch).unwrap();
        scene.set_attribute(t, "k", AttributeValue::Pinch).unwrap();
        let fired = scene.take_notifications();
        assert_eq!(fired.len(), 2);
        assert!(fired.iter().all(|n| n.tag == tag && n.event == SceneEvent::Modified));
        assert!(scene.take_notifications().is_empty());
    }

    #[test]
    fn test_matrix_write_fires_modified_then_transform_modified() {
        let mut scene = MemoryScene::new();
        let t = scene.get_or_create_transform("t");
        scene.add_observer(t, SceneEvent::Modified).unwrap();
        scene.add_observer(t, SceneEvent::TransformModified).unwrap();
        scene.set_translation(t, [1.0, 2.0, 3.0]).unwrap();
        let events: Vec<SceneEvent> = scene.take_notifications().iter().map(|n| n.event).collect();
        assert_eq!(events, vec![SceneEvent::Modified, SceneEvent::TransformModified]);
    }

    #[test]
    fn test_world_translation_follows_parent_chain() {
        let mut scene = MemoryScene::new();
        let parent = scene.get_or_create_transform("parent");
        let child = scene.get_or_create_transform("child");
        scene.set_translation(parent, [10.0, 0.0, 0.0]).unwrap();
        scene.set_translation(child, [1.0, 2.0, 3.0]).unwrap();
        scene.set_parent(child, Some(parent)).unwrap();
        assert_eq!(scene.world_translation(child).unwrap(), [11.0, 2.0, 3.0]);
    }

    #[test]
    fn test_parent_change_propagates_transform_modified() {
        let mut scene = MemoryScene::new();
        let parent = scene.get_or_create_transform("parent");
        let child = scene.get_or_create_transform("child");
        scene.set_parent(child, Some(parent)).unwrap();
        let tag = scene.add_observer(child, SceneEvent::TransformModified).unwrap();
        scene.set_translation(parent, [0.0, 5.0, 0.0]).unwrap();
        let fired = scene.take_notifications();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].tag, tag);
    }

    #[test]
    fn test_parent_cycle_rejected() {
        let mut scene = MemoryScene::new();
        let a = scene.get_or_create_transform("a");
        let b = scene.get_or_create_transform("b");
        scene.set_parent(b, Some(a)).unwrap();
        assert_eq!(
            scene.set_parent(a, Some(b)),
            Err(SceneError::ParentCycle { node: a, parent: b })
        );
    }

    #[test]
    fn test_removed_node_handle_goes_stale() {
        let mut scene = MemoryScene::new();
        let t = scene.get_or_create_transform("t");
        scene.add_observer(t, SceneEvent::Modified).unwrap();
        scene.remove_node(t);
        assert_eq!(scene.observer_count(), 0);
        assert_eq!(scene.world_translation(t), Err(SceneError::UnknownNode(t)));
        assert!(scene.find_node("t").is_none());
    }

    #[test]
    fn test_remove_observer_drops_pending() {
        let mut scene = MemoryScene::new();
        let t = scene.get_or_create_transform("t");
        let tag = scene.add_observer(t, SceneEvent::Modified).unwrap();
        scene.set_attribute(t, "k", AttributeValue::Pinch).unwrap();
        scene.remove_observer(tag);
        assert!(scene.take_notifications().is_empty());
    }

    #[test]
    fn test_linked_views() {
        let mut scene = MemoryScene::new();
        scene.set_slice_focal_point("Red", [1.0, 1.0, 1.0]).unwrap();
        assert_eq!(scene.slice_focal_point("Yellow").unwrap(), geometry::ORIGIN);
        scene.propagate_to_linked_views([2.0, 3.0, 4.0]).unwrap();
        for view in DEFAULT_SLICE_VIEWS {
            assert_eq!(scene.slice_focal_point(view).unwrap(), [2.0, 3.0, 4.0]);
        }
        assert_eq!(
            scene.set_slice_focal_point("Blue", geometry::ORIGIN),
            Err(SceneError::MissingView("Blue".to_string()))
        );
    }

    #[test]
    fn test_line_model_points() {
        let mut scene = MemoryScene::new();
        let spec = ModelSpec {
            shape: ModelShape::Line,
            color: [1.0, 1.0, 0.0],
            opacity: 1.0,
        };
        let line = scene.ensure_model("DropLine-Left", &spec);
        assert_eq!(scene.line_points(line).unwrap().len(), 2);
        scene.set_line_points(line, [1.0, 0.0, 3.0], [1.0, 2.0, 3.0]).unwrap();
        assert_eq!(
            scene.line_points(line).unwrap(),
            vec![[1.0, 0.0, 3.0], [1.0, 2.0, 3.0]]
        );
        assert!(scene.matrix(line).is_err());

        let sphere = scene.ensure_model(
            "Cursor-Left",
            &ModelSpec {
                shape: ModelShape::Sphere,
                ..spec
            },
        );
        assert_eq!(
            scene.set_line_points(sphere, [0.0; 3], [1.0; 3]),
            Err(SceneError::WrongKind {
                node: sphere,
                expected: "line",
            })
        );
    }

    #[test]
    fn test_attributes_stored_as_host_strings() {
        let mut scene = MemoryScene::new();
        let t = scene.get_or_create_transform("t");
        scene.set_attribute(t, "g", AttributeValue::Pinch).unwrap();
        assert_eq!(
            scene.nodes[&t].attributes.get("g").cloned(),
            Some(Some("pinch".to_string()))
        );
        scene.set_attribute(t, "g", AttributeValue::Absent).unwrap();
        assert_eq!(scene.nodes[&t].attributes.get("g").cloned(), Some(None));
        assert_eq!(scene.attribute(t, "g").unwrap(), AttributeValue::Absent);
    }
}
