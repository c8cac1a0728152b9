//! Driver state: the central struct holding the scene, hand cursors,
//! navigation and the driver connection.
//!
//! A single `HandsState` owns everything and is passed as `&mut` to every
//! event loop callback.  Scene notifications are drained and routed after
//! each mutation, so observers run synchronously in delivery order.

use calloop::LoopHandle;
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::connection::{ConnectionError, DriverConnection};
use crate::cursor::{self, Hand, HandCursors, GESTURE_ATTRIBUTE};
use crate::jumper::SliceJumper;
use crate::observer::{AttributeObserver, LogChanges, ObserverError};
use crate::protocol::{DriverEvent, ProtocolDecoder};
use crate::scene::{AttributeValue, SceneError, SceneHost};

/// Rounds of notification draining before giving up on a feedback loop.
const MAX_DISPATCH_ROUNDS: usize = 16;

/// Errors that end the run.
#[derive(Debug, thiserror::Error)]
pub enum HandsError {
    #[error(transparent)]
    Observer(#[from] ObserverError),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Central driver state.
pub struct HandsState {
    pub loop_handle: LoopHandle<'static, Self>,
    pub config: DriverConfig,

    // Host scene
    pub scene: Box<dyn SceneHost>,

    // Hands
    pub cursors: HandCursors,
    pub jumper: Option<SliceJumper>,
    pub gesture_log: AttributeObserver<LogChanges>,

    // Driver stream
    pub decoder: ProtocolDecoder,
    pub connection: DriverConnection,

    /// Last status message shown to the user.
    pub last_status: Option<String>,

    // Shutdown flag
    pub running: bool,
}

impl HandsState {
    pub fn new(
        config: DriverConfig,
        scene: Box<dyn SceneHost>,
        loop_handle: LoopHandle<'static, Self>,
    ) -> Self {
        info!(address = %config.address(), hand = config.jump_hand.as_str(), "HandsState initialized");
        Self {
            loop_handle,
            config,
            scene,
            cursors: HandCursors::new(),
            jumper: None,
            gesture_log: AttributeObserver::new(LogChanges::default()),
            decoder: ProtocolDecoder::new(),
            connection: DriverConnection::new(),
            last_status: None,
            running: true,
        }
    }

    /// Build the cursor scene and attach the observers.
    ///
    /// A missing camera only skips the camera update; the hands still work
    /// in table space.
    pub fn start_session(&mut self) -> Result<(), HandsError> {
        if let Err(e) = cursor::update_camera(self.scene.as_mut(), &self.config.table) {
            self.report_scene_error("camera update", &e);
        }

        for hand in Hand::ALL {
            let nodes = cursor::hand_cursor(self.scene.as_mut(), hand)?;
            self.gesture_log
                .subscribe(self.scene.as_mut(), nodes.transform, &[GESTURE_ATTRIBUTE])?;
        }

        let nodes = cursor::hand_cursor(self.scene.as_mut(), self.config.jump_hand)?;
        self.jumper = Some(SliceJumper::new(self.scene.as_mut(), nodes.transform)?);

        // Setup writes are not driver input.
        self.scene.take_notifications();
        info!(hand = self.config.jump_hand.as_str(), "session started");
        Ok(())
    }

    /// Release observers and the connection.  Safe to call more than once.
    pub fn end_session(&mut self) {
        DriverConnection::disconnect(self);
        if let Some(mut jumper) = self.jumper.take() {
            jumper.cleanup(self.scene.as_mut());
        }
        self.gesture_log.unsubscribe_all(self.scene.as_mut());
        info!(
            lines = self.decoder.lines_seen,
            decode_errors = self.decoder.decode_errors,
            "session ended"
        );
    }

    /// Connect to the driver, posting a status message on failure.
    pub fn connect_driver(&mut self) -> Result<(), ConnectionError> {
        match DriverConnection::connect(self) {
            Ok(()) => {
                self.post_status(format!("SlicerHands: connected to {}", self.config.address()));
                Ok(())
            }
            Err(e) => {
                warn!("{}", e);
                self.post_status(format!("SlicerHands: {e}"));
                Err(e)
            }
        }
    }

    /// Called by the connection after the driver went away.
    pub fn connection_lost(&mut self, reason: &ConnectionError) {
        warn!("hand driver disconnected: {}", reason);
        self.post_status(format!("SlicerHands: disconnected from {}", self.config.address()));
    }

    /// Decode and apply one protocol line.
    pub fn handle_line(&mut self, line: &str) -> Result<(), HandsError> {
        if self.config.trace_protocol {
            info!("<< {}", line);
        }
        match self.decoder.decode(line) {
            Some(event) => self.apply_event(event),
            None => Ok(()),
        }
    }

    pub fn apply_event(&mut self, event: DriverEvent) -> Result<(), HandsError> {
        match event {
            DriverEvent::Pose { left, right } => {
                for (hand, pose) in [(Hand::Left, left), (Hand::Right, right)] {
                    let result = self.cursors.apply_pose(self.scene.as_mut(), hand, pose);
                    match result {
                        Ok(()) => self.dispatch_notifications()?,
                        Err(e) => self.report_scene_error("hand pose", &e),
                    }
                }
            }
            DriverEvent::Gesture { hand, phase } => {
                self.post_status(format!("{} {}", phase.as_str(), hand.as_str()));
                if phase.in_gesture() {
                    self.set_gesture(hand, AttributeValue::Pinch)?;
                }
                if phase.ends_gesture() {
                    self.set_gesture(hand, AttributeValue::Absent)?;
                }
            }
            ref point @ DriverEvent::Point { .. } => {
                if point.is_pointing() {
                    debug!(?point, "pointing");
                }
            }
            DriverEvent::Unrecognized { keyword } => {
                debug!(keyword, "ignoring unrecognized message");
            }
        }
        Ok(())
    }

    fn set_gesture(&mut self, hand: Hand, value: AttributeValue) -> Result<(), HandsError> {
        match self.cursors.set_gesture(self.scene.as_mut(), hand, value) {
            Ok(()) => self.dispatch_notifications(),
            Err(e) => {
                self.report_scene_error("gesture update", &e);
                Ok(())
            }
        }
    }

    /// Route pending scene notifications until none are left.
    ///
    /// Observer scene failures fail only that notification.  A notification
    /// for a node its observer never subscribed is a broken invariant and
    /// is returned.
    pub fn dispatch_notifications(&mut self) -> Result<(), HandsError> {
        for _ in 0..MAX_DISPATCH_ROUNDS {
            let batch = self.scene.take_notifications();
            if batch.is_empty() {
                return Ok(());
            }
            for notification in &batch {
                if let Some(jumper) = self.jumper.as_mut() {
                    match jumper.handle_notification(self.scene.as_mut(), notification) {
                        Ok(true) => continue,
                        Ok(false) => {}
                        Err(ObserverError::Scene(e)) => {
                            self.report_scene_error("slice jump", &e);
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                if self.gesture_log.owns(notification.tag) {
                    match self.gesture_log.on_notify(self.scene.as_mut(), notification.node) {
                        Ok(()) => {}
                        Err(ObserverError::Scene(e)) => self.report_scene_error("gesture log", &e),
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
        warn!(rounds = MAX_DISPATCH_ROUNDS, "scene notifications did not settle");
        Ok(())
    }

    fn report_scene_error(&mut self, operation: &str, error: &SceneError) {
        warn!(operation, "{}", error);
        self.post_status(format!("SlicerHands: {operation} failed: {error}"));
    }

    fn post_status(&mut self, message: String) {
        self.scene.show_status_message(&message);
        self.last_status = Some(message);
    }
}
