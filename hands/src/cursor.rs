//! Hand cursors: per-hand pose and gesture state, and the scene geometry
//! that shows it.
//!
//! Each hand owns a `<Hand>-To-Table` transform carrying a sphere cursor and
//! a drop line from the table plane up to the hand.  The table itself hangs
//! off a `Camera-To-RAS` transform derived from the 3D view camera, so the
//! hands move with the viewpoint.  Nodes are looked up by name on every use
//! and created on first reference.

use tracing::{debug, info};

use crate::config::TableDimensions;
use crate::geometry::{self, Vec3};
use crate::scene::{AttributeValue, ModelShape, ModelSpec, NodeId, SceneError, SceneHost};

/// Node attribute carrying the current gesture of a hand.
pub const GESTURE_ATTRIBUTE: &str = "SlicerHands.gesture";

/// Uniform scale applied to the cursor sphere.
pub const CURSOR_SCALE: f64 = 10.0;

/// Table offset below the camera axis before any camera update.
pub const TABLE_DROP: f64 = -100.0;

pub const CAMERA_TRANSFORM: &str = "Camera-To-RAS";
pub const TABLE_TRANSFORM: &str = "Table-To-Camera";

const GOLD: [f64; 3] = [1.0, 0.843_137_254_901_960_8, 0.0];
const SKIN: [f64; 3] = [0.694_117_647_058_823_5, 0.478_431_372_549_019_6, 0.396_078_431_372_549];
const YELLOW: [f64; 3] = [1.0, 1.0, 0.0];
const GAINSBORO: [f64; 3] = [0.862_745_098_039_215_7; 3];

// ── Hand enum ──────────────────────────────────────────────

/// Which hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub const ALL: [Hand; 2] = [Hand::Left, Hand::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    /// Title-case name used in scene node names.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Left => "Left",
            Self::Right => "Right",
        }
    }

    /// Case-insensitive parse of a hand name.
    pub fn parse(s: &str) -> Option<Hand> {
        if s.eq_ignore_ascii_case("left") {
            Some(Self::Left)
        } else if s.eq_ignore_ascii_case("right") {
            Some(Self::Right)
        } else {
            None
        }
    }

    pub fn transform_name(&self) -> String {
        format!("{}-To-Table", self.title())
    }

    fn cursor_color(&self) -> [f64; 3] {
        match self {
            // wedding ring hand
            Self::Left => GOLD,
            Self::Right => SKIN,
        }
    }
}

// ── Scene structure ────────────────────────────────────────

/// Scene nodes backing one hand cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandNodes {
    pub transform: NodeId,
    pub drop_line: NodeId,
}

/// Return the nodes for `hand`, creating cursor sphere, transform and drop
/// line on first use.
pub fn hand_cursor(scene: &mut dyn SceneHost, hand: Hand) -> Result<HandNodes, SceneError> {
    let name = hand.transform_name();
    let transform = match scene.find_node(&name) {
        Some(node) => node,
        None => {
            let sphere = scene.ensure_model(
                &format!("Cursor-{}", hand.title()),
                &ModelSpec {
                    shape: ModelShape::Sphere,
                    color: hand.cursor_color(),
                    opacity: 1.0,
                },
            );
            let node = scene.get_or_create_transform(&name);
            scene.set_matrix(node, geometry::scaling(CURSOR_SCALE))?;
            scene.set_parent(sphere, Some(node))?;
            info!(hand = hand.as_str(), "created hand cursor");
            node
        }
    };
    let drop_line = hand_line(scene, hand);
    Ok(HandNodes {
        transform,
        drop_line,
    })
}

/// Line from the hand down to the table plane.
fn hand_line(scene: &mut dyn SceneHost, hand: Hand) -> NodeId {
    scene.ensure_model(
        &format!("DropLine-{}", hand.title()),
        &ModelSpec {
            shape: ModelShape::Line,
            color: YELLOW,
            opacity: 1.0,
        },
    )
}

/// Return the table transform, creating the table box on first use.
pub fn table_cursor(
    scene: &mut dyn SceneHost,
    dimensions: &TableDimensions,
) -> Result<NodeId, SceneError> {
    if let Some(node) = scene.find_node(TABLE_TRANSFORM) {
        return Ok(node);
    }
    let table = scene.ensure_model(
        "Cursor-Table",
        &ModelSpec {
            shape: ModelShape::Box {
                dimensions: [dimensions.width, dimensions.height, dimensions.depth],
                center: [0.0, -dimensions.height / 2.0, 0.0],
            },
            color: GAINSBORO,
            opacity: 0.5,
        },
    );
    let node = scene.get_or_create_transform(TABLE_TRANSFORM);
    let mut m = geometry::identity();
    m[1][3] = TABLE_DROP;
    scene.set_matrix(node, m)?;
    scene.set_parent(table, Some(node))?;
    debug!(?dimensions, "created table cursor");
    Ok(node)
}

/// Write the camera-to-RAS transform from the active 3D view camera.
///
/// Columns are view-right, view-up, view-plane normal and camera position.
/// Returns the transform and the camera-to-focal-point distance.
pub fn camera_transform(scene: &mut dyn SceneHost) -> Result<(NodeId, f64), SceneError> {
    let camera = scene.active_camera().ok_or(SceneError::NoCamera)?;
    let view_right = geometry::cross(camera.view_up, camera.view_plane_normal);
    let distance = geometry::norm(geometry::sub(camera.focal_point, camera.position));

    let mut m = geometry::identity();
    for row in 0..3 {
        m[row][0] = view_right[row];
        m[row][1] = camera.view_up[row];
        m[row][2] = camera.view_plane_normal[row];
        m[row][3] = camera.position[row];
    }
    let node = scene.get_or_create_transform(CAMERA_TRANSFORM);
    scene.set_matrix(node, m)?;
    Ok((node, distance))
}

/// Hang the table in front of the camera at the focal distance and put both
/// hands on the table.  Returns the focal distance.
pub fn update_camera(
    scene: &mut dyn SceneHost,
    dimensions: &TableDimensions,
) -> Result<f64, SceneError> {
    let (camera_to_ras, distance) = camera_transform(scene)?;
    let table = table_cursor(scene, dimensions)?;
    let mut m = scene.matrix(table)?;
    m[2][3] = -distance;
    scene.set_matrix(table, m)?;
    scene.set_parent(table, Some(camera_to_ras))?;
    for hand in Hand::ALL {
        let nodes = hand_cursor(scene, hand)?;
        scene.set_parent(nodes.transform, Some(table))?;
        scene.set_parent(nodes.drop_line, Some(table))?;
    }
    info!(distance, "camera transform updated");
    Ok(distance)
}

// ── Per-hand state ─────────────────────────────────────────

/// Last known state of one hand.
#[derive(Debug, Clone, Default)]
pub struct HandCursor {
    pub pose: Option<Vec3>,
    pub gesture: AttributeValue,
}

/// Pose and gesture state for both hands.
#[derive(Debug, Default)]
pub struct HandCursors {
    left: HandCursor,
    right: HandCursor,
}

impl HandCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hand(&self, hand: Hand) -> &HandCursor {
        match hand {
            Hand::Left => &self.left,
            Hand::Right => &self.right,
        }
    }

    fn hand_mut(&mut self, hand: Hand) -> &mut HandCursor {
        match hand {
            Hand::Left => &mut self.left,
            Hand::Right => &mut self.right,
        }
    }

    /// Move a hand cursor and its drop line to `pose`.
    pub fn apply_pose(
        &mut self,
        scene: &mut dyn SceneHost,
        hand: Hand,
        pose: Vec3,
    ) -> Result<(), SceneError> {
        let nodes = hand_cursor(scene, hand)?;
        scene.set_translation(nodes.transform, pose)?;
        scene.set_line_points(nodes.drop_line, [pose[0], 0.0, pose[2]], pose)?;
        self.hand_mut(hand).pose = Some(pose);
        Ok(())
    }

    /// Publish a gesture label on the hand's transform.
    pub fn set_gesture(
        &mut self,
        scene: &mut dyn SceneHost,
        hand: Hand,
        gesture: AttributeValue,
    ) -> Result<(), SceneError> {
        let nodes = hand_cursor(scene, hand)?;
        scene.set_attribute(nodes.transform, GESTURE_ATTRIBUTE, gesture)?;
        self.hand_mut(hand).gesture = gesture;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Camera, MemoryScene};

    #[test]
    fn test_hand_parse() {
        assert_eq!(Hand::parse("left"), Some(Hand::Left));
        assert_eq!(Hand::parse("LEFT"), Some(Hand::Left));
        assert_eq!(Hand::parse("Right"), Some(Hand::Right));
        assert_eq!(Hand::parse("0.9"), None);
        assert_eq!(Hand::Left.transform_name(), "Left-To-Table");
    }

    #[test]
    fn test_hand_cursor_created_once() {
        let mut scene = MemoryScene::new();
        let first = hand_cursor(&mut scene, Hand::Left).unwrap();
        let second = hand_cursor(&mut scene, Hand::Left).unwrap();
        assert_eq!(first, second);

        let m = scene.matrix(first.transform).unwrap();
        assert_eq!(m[0][0], CURSOR_SCALE);
        assert_eq!(m[2][2], CURSOR_SCALE);

        let sphere = scene.find_node("Cursor-Left").unwrap();
        assert_eq!(scene.parent(sphere).unwrap(), Some(first.transform));
        assert_eq!(scene.model_spec(sphere).unwrap().color, GOLD);
        assert!(scene.find_node("DropLine-Left").is_some());
        assert!(scene.find_node("Right-To-Table").is_none());
    }

    #[test]
    fn test_apply_pose_moves_cursor_and_line() {
        let mut scene = MemoryScene::new();
        let mut cursors = HandCursors::new();
        cursors
            .apply_pose(&mut scene, Hand::Right, [4.0, 5.0, 6.0])
            .unwrap();

        let nodes = hand_cursor(&mut scene, Hand::Right).unwrap();
        assert_eq!(scene.world_translation(nodes.transform).unwrap(), [4.0, 5.0, 6.0]);
        assert_eq!(
            scene.line_points(nodes.drop_line).unwrap(),
            vec![[4.0, 0.0, 6.0], [4.0, 5.0, 6.0]]
        );
        assert_eq!(cursors.hand(Hand::Right).pose, Some([4.0, 5.0, 6.0]));
        assert_eq!(cursors.hand(Hand::Left).pose, None);
    }

    #[test]
    fn test_set_gesture_writes_attribute() {
        let mut scene = MemoryScene::new();
        let mut cursors = HandCursors::new();
        cursors
            .set_gesture(&mut scene, Hand::Left, AttributeValue::Pinch)
            .unwrap();
        let nodes = hand_cursor(&mut scene, Hand::Left).unwrap();
        assert_eq!(
            scene.attribute(nodes.transform, GESTURE_ATTRIBUTE).unwrap(),
            AttributeValue::Pinch
        );
        assert_eq!(cursors.hand(Hand::Left).gesture, AttributeValue::Pinch);
    }

    #[test]
    fn test_table_cursor_geometry() {
        let mut scene = MemoryScene::new();
        let dims = TableDimensions::default();
        let table = table_cursor(&mut scene, &dims).unwrap();
        assert_eq!(scene.world_translation(table).unwrap(), [0.0, TABLE_DROP, 0.0]);
        let model = scene.find_node("Cursor-Table").unwrap();
        let spec = scene.model_spec(model).unwrap();
        assert_eq!(spec.opacity, 0.5);
        assert_eq!(
            spec.shape,
            ModelShape::Box {
                dimensions: [900.0, 30.0, 600.0],
                center: [0.0, -15.0, 0.0],
            }
        );
    }

    #[test]
    fn test_camera_transform_columns() {
        let mut scene = MemoryScene::new();
        scene.set_camera(Some(Camera::looking_at(
            [0.0, 500.0, 0.0],
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
        )));
        let (node, distance) = camera_transform(&mut scene).unwrap();
        assert_eq!(distance, 500.0);
        let m = scene.matrix(node).unwrap();
        // right = up x normal = (0,0,1) x (0,1,0)
        assert_eq!([m[0][0], m[1][0], m[2][0]], [-1.0, 0.0, 0.0]);
        assert_eq!([m[0][2], m[1][2], m[2][2]], [0.0, 1.0, 0.0]);
        assert_eq!(geometry::translation(&m), [0.0, 500.0, 0.0]);
    }

    #[test]
    fn test_update_camera_builds_hierarchy() {
        let mut scene = MemoryScene::new();
        let dims = TableDimensions::default();
        let distance = update_camera(&mut scene, &dims).unwrap();
        assert_eq!(distance, 500.0);

        let camera = scene.find_node(CAMERA_TRANSFORM).unwrap();
        let table = scene.find_node(TABLE_TRANSFORM).unwrap();
        assert_eq!(scene.parent(table).unwrap(), Some(camera));
        assert_eq!(scene.matrix(table).unwrap()[2][3], -500.0);
        for hand in Hand::ALL {
            let nodes = hand_cursor(&mut scene, hand).unwrap();
            assert_eq!(scene.parent(nodes.transform).unwrap(), Some(table));
            assert_eq!(scene.parent(nodes.drop_line).unwrap(), Some(table));
        }

        // Table origin in camera frame is (0, -100, -500): camera at y=500
        // looking down -y, so -z in camera is -y in RAS.
        let world = scene.world_translation(table).unwrap();
        assert!((world[0] - 0.0).abs() < 1e-9);
        assert!((world[1] - 0.0).abs() < 1e-9);
        assert!((world[2] - -100.0).abs() < 1e-9);
    }

    #[test]
    fn test_update_camera_without_camera() {
        let mut scene = MemoryScene::new();
        scene.set_camera(None);
        assert_eq!(
            update_camera(&mut scene, &TableDimensions::default()),
            Err(SceneError::NoCamera)
        );
        assert!(scene.find_node(TABLE_TRANSFORM).is_none());
    }
}
