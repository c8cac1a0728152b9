//! Pinch-and-drag slice navigation.
//!
//! A [`SliceJumper`] is bound to one hand transform.  While the hand's
//! gesture attribute reads `pinch`, every transform change moves the slice
//! views by the hand's displacement since the pinch started.  Releasing the
//! pinch keeps the accumulated location, so the next pinch continues from
//! there (clutch-style relative navigation).

use tracing::{debug, info};

use crate::cursor::GESTURE_ATTRIBUTE;
use crate::geometry::{self, Vec3};
use crate::observer::{AttributeChange, AttributeHandler, AttributeObserver, ObserverError};
use crate::scene::{
    AttributeValue, NodeId, Notification, ObserverTag, SceneError, SceneEvent, SceneHost,
};

/// Slice view that receives the jump before it is propagated.
pub const PRIMARY_SLICE_VIEW: &str = "Red";

/// Navigation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpPhase {
    Idle,
    Jumping,
}

/// Accumulated navigation state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JumpState {
    /// Location reached when the previous pinch ended.
    pub last_jump_location: Vec3,
    /// Location of the current drag.  Meaningful only while jumping.
    pub current_jump_location: Vec3,
    /// Hand world position when the current pinch started.
    pub start_of_jump_position: Vec3,
    pub jumping: bool,
}

impl Default for JumpState {
    fn default() -> Self {
        Self {
            last_jump_location: geometry::ORIGIN,
            current_jump_location: geometry::ORIGIN,
            start_of_jump_position: geometry::ORIGIN,
            jumping: false,
        }
    }
}

/// Attribute handler driving [`JumpState`] from gesture changes.
#[derive(Debug)]
pub struct JumpTracker {
    transform: NodeId,
    pub state: JumpState,
}

impl JumpTracker {
    fn new(transform: NodeId) -> Self {
        Self {
            transform,
            state: JumpState::default(),
        }
    }

    /// Follow a transform change.  Returns whether a jump was issued.
    fn on_transform(&mut self, scene: &mut dyn SceneHost) -> Result<bool, SceneError> {
        if !self.state.jumping {
            return Ok(false);
        }
        let position = scene.world_translation(self.transform)?;
        let movement = geometry::sub(position, self.state.start_of_jump_position);
        let target = geometry::add(self.state.last_jump_location, movement);
        self.state.current_jump_location = target;
        scene.set_slice_focal_point(PRIMARY_SLICE_VIEW, target)?;
        scene.propagate_to_linked_views(target)?;
        debug!(x = target[0], y = target[1], z = target[2], "slices jumped");
        Ok(true)
    }
}

impl AttributeHandler for JumpTracker {
    fn on_attribute_changed(
        &mut self,
        scene: &mut dyn SceneHost,
        change: &AttributeChange<'_>,
    ) -> Result<(), SceneError> {
        if change.node != self.transform || change.attribute != GESTURE_ATTRIBUTE {
            return Ok(());
        }
        let pinching = change.new_value == AttributeValue::Pinch;
        if pinching && !self.state.jumping {
            self.state.start_of_jump_position = scene.world_translation(self.transform)?;
            self.state.current_jump_location = self.state.last_jump_location;
            info!(start = ?self.state.start_of_jump_position, "jump started");
        }
        if !pinching && self.state.jumping {
            self.state.last_jump_location = self.state.current_jump_location;
            info!(location = ?self.state.last_jump_location, "jump ended");
        }
        self.state.jumping = pinching;
        Ok(())
    }
}

/// Gesture-driven slice navigation for one hand transform.
pub struct SliceJumper {
    observer: AttributeObserver<JumpTracker>,
    transform_tag: Option<ObserverTag>,
}

impl SliceJumper {
    /// Watch the gesture attribute and transform changes of `transform`.
    pub fn new(scene: &mut dyn SceneHost, transform: NodeId) -> Result<Self, ObserverError> {
        let mut observer = AttributeObserver::new(JumpTracker::new(transform));
        observer.subscribe(scene, transform, &[GESTURE_ATTRIBUTE])?;
        let transform_tag = match scene.add_observer(transform, SceneEvent::TransformModified) {
            Ok(tag) => tag,
            Err(e) => {
                observer.unsubscribe_all(scene);
                return Err(e.into());
            }
        };
        Ok(Self {
            observer,
            transform_tag: Some(transform_tag),
        })
    }

    pub fn state(&self) -> &JumpState {
        &self.observer.handler().state
    }

    pub fn phase(&self) -> JumpPhase {
        if self.state().jumping {
            JumpPhase::Jumping
        } else {
            JumpPhase::Idle
        }
    }

    /// Route a scene notification.  Notifications for other observers are
    /// ignored; returns whether this jumper consumed it.
    pub fn handle_notification(
        &mut self,
        scene: &mut dyn SceneHost,
        notification: &Notification,
    ) -> Result<bool, ObserverError> {
        if self.observer.owns(notification.tag) {
            self.observer.on_notify(scene, notification.node)?;
            return Ok(true);
        }
        if self.transform_tag == Some(notification.tag) {
            self.observer.handler_mut().on_transform(scene)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Release both the attribute and transform observations.
    pub fn cleanup(&mut self, scene: &mut dyn SceneHost) {
        self.observer.unsubscribe_all(scene);
        if let Some(tag) = self.transform_tag.take() {
            scene.remove_observer(tag);
        }
    }
}
