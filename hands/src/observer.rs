//! Attribute observation: turn generic "node modified" notifications into
//! per-attribute change callbacks.
//!
//! The host only says *that* a node changed, never *what* changed, so every
//! notification re-reads all watched attributes of the node and diffs them
//! against the last seen values.  A handler is called only for attributes
//! whose value actually differs.  Observations can be added incrementally
//! but are only ever released all at once via
//! [`AttributeObserver::unsubscribe_all`].

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::scene::{AttributeValue, NodeId, ObserverTag, SceneError, SceneEvent, SceneHost};

// ── Changes and handlers ───────────────────────────────────

/// One observed attribute transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeChange<'a> {
    pub node: NodeId,
    pub attribute: &'a str,
    pub new_value: AttributeValue,
    pub old_value: AttributeValue,
}

/// Reaction to attribute changes, injected into an [`AttributeObserver`].
pub trait AttributeHandler {
    fn on_attribute_changed(
        &mut self,
        scene: &mut dyn SceneHost,
        change: &AttributeChange<'_>,
    ) -> Result<(), SceneError>;
}

/// Default handler: log and count the change, nothing else.
#[derive(Debug, Default)]
pub struct LogChanges {
    pub changes: u64,
}

impl AttributeHandler for LogChanges {
    fn on_attribute_changed(
        &mut self,
        _scene: &mut dyn SceneHost,
        change: &AttributeChange<'_>,
    ) -> Result<(), SceneError> {
        self.changes += 1;
        debug!(
            node = ?change.node,
            attribute = change.attribute,
            new = ?change.new_value,
            old = ?change.old_value,
            "attribute changed"
        );
        Ok(())
    }
}

// ── Errors ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ObserverError {
    /// A notification arrived for a node this observer never subscribed.
    #[error("notification for unsubscribed node {0:?}")]
    NotSubscribed(NodeId),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

// ── Observer ───────────────────────────────────────────────

type Snapshot = HashMap<NodeId, BTreeMap<String, AttributeValue>>;

/// Watches named attributes on a set of nodes and forwards changes to `H`.
pub struct AttributeObserver<H> {
    handler: H,
    /// One `Modified` registration per subscribed node.
    tags: HashMap<NodeId, ObserverTag>,
    /// Last observed value per (node, attribute).
    current: Snapshot,
    /// Value immediately before the last change per (node, attribute).
    previous: Snapshot,
}

impl<H: AttributeHandler> AttributeObserver<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            tags: HashMap::new(),
            current: HashMap::new(),
            previous: HashMap::new(),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Start watching `attributes` on `node`.
    ///
    /// Records the current values without calling the handler.  The node's
    /// `Modified` notification is registered once; subscribing the same node
    /// again only adds attribute names that were not watched yet.
    pub fn subscribe(
        &mut self,
        scene: &mut dyn SceneHost,
        node: NodeId,
        attributes: &[&str],
    ) -> Result<(), ObserverError> {
        let mut initial = Vec::with_capacity(attributes.len());
        for attribute in attributes {
            initial.push((attribute.to_string(), scene.attribute(node, attribute)?));
        }

        if !self.is_subscribed(node) {
            let tag = scene.add_observer(node, SceneEvent::Modified)?;
            self.tags.insert(node, tag);
        }

        let watched = self.current.entry(node).or_default();
        for (attribute, value) in initial {
            watched.entry(attribute).or_insert(value);
        }
        self.previous.entry(node).or_default();

        debug!(?node, ?attributes, "subscribed to attributes");
        Ok(())
    }

    /// Whether `tag` is one of this observer's registrations.
    pub fn owns(&self, tag: ObserverTag) -> bool {
        self.tags.values().any(|t| *t == tag)
    }

    pub fn is_subscribed(&self, node: NodeId) -> bool {
        self.current.contains_key(&node)
    }

    /// Handle a `Modified` notification for `node`.
    pub fn on_notify(
        &mut self,
        scene: &mut dyn SceneHost,
        node: NodeId,
    ) -> Result<(), ObserverError> {
        let attributes: Vec<String> = self
            .current
            .get(&node)
            .ok_or(ObserverError::NotSubscribed(node))?
            .keys()
            .cloned()
            .collect();

        for attribute in attributes {
            let new_value = scene.attribute(node, &attribute)?;
            let Some(watched) = self.current.get_mut(&node) else {
                return Err(ObserverError::NotSubscribed(node));
            };
            let Some(stored) = watched.get_mut(&attribute) else {
                continue;
            };
            if *stored == new_value {
                continue;
            }
            let old_value = std::mem::replace(stored, new_value);
            self.previous
                .entry(node)
                .or_default()
                .insert(attribute.clone(), old_value);

            let change = AttributeChange {
                node,
                attribute: &attribute,
                new_value,
                old_value,
            };
            self.handler.on_attribute_changed(scene, &change)?;
        }
        Ok(())
    }

    /// Last observed value of a watched attribute.
    #[cfg(test)]
    pub fn current(&self, node: NodeId, attribute: &str) -> Option<AttributeValue> {
        self.current.get(&node)?.get(attribute).copied()
    }

    /// Value before the last change, if the attribute has changed at all.
    #[cfg(test)]
    pub fn previous(&self, node: NodeId, attribute: &str) -> Option<AttributeValue> {
        self.previous.get(&node)?.get(attribute).copied()
    }

    /// Remove every registration and forget all snapshots.
    pub fn unsubscribe_all(&mut self, scene: &mut dyn SceneHost) {
        for (_, tag) in self.tags.drain() {
            scene.remove_observer(tag);
        }
        self.current.clear();
        self.previous.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::MemoryScene;

    const KEY: &str = "SlicerHands.gesture";

    /// Records every change it sees.
    #[derive(Default)]
    struct Recorder {
        seen: Vec<(NodeId, String, AttributeValue, AttributeValue)>,
    }

    impl AttributeHandler for Recorder {
        fn on_attribute_changed(
            &mut self,
            _scene: &mut dyn SceneHost,
            change: &AttributeChange<'_>,
        ) -> Result<(), SceneError> {
            self.seen.push((
                change.node,
                change.attribute.to_string(),
                change.new_value,
                change.old_value,
            ));
            Ok(())
        }
    }

    fn deliver(observer: &mut AttributeObserver<Recorder>, scene: &mut MemoryScene) {
        for n in scene.take_notifications() {
            if observer.owns(n.tag) {
                observer.on_notify(scene, n.node).unwrap();
            }
        }
    }

    #[test]
    fn test_subscribe_does_not_fire() {
        let mut scene = MemoryScene::new();
        let t = scene.get_or_create_transform("t");
        scene.set_attribute(t, KEY, AttributeValue::Pinch).unwrap();
        let mut observer = AttributeObserver::new(Recorder::default());
        observer.subscribe(&mut scene, t, &[KEY]).unwrap();
        assert_eq!(observer.current(t, KEY), Some(AttributeValue::Pinch));
        assert_eq!(observer.previous(t, KEY), None);
        deliver(&mut observer, &mut scene);
        assert!(observer.handler().seen.is_empty());
    }

    #[test]
    fn test_fires_only_on_value_change() {
        let mut scene = MemoryScene::new();
        let t = scene.get_or_create_transform("t");
        let mut observer = AttributeObserver::new(Recorder::default());
        observer.subscribe(&mut scene, t, &[KEY]).unwrap();

        let writes = [
            AttributeValue::Absent,
            AttributeValue::Pinch,
            AttributeValue::Pinch,
            AttributeValue::Absent,
            AttributeValue::Absent,
            AttributeValue::Pinch,
        ];
        for value in writes {
            scene.set_attribute(t, KEY, value).unwrap();
            deliver(&mut observer, &mut scene);
        }

        let transitions: Vec<(AttributeValue, AttributeValue)> = observer
            .handler()
            .seen
            .iter()
            .map(|(_, _, new, old)| (*new, *old))
            .collect();
        assert_eq!(
            transitions,
            vec![
                (AttributeValue::Pinch, AttributeValue::Absent),
                (AttributeValue::Absent, AttributeValue::Pinch),
                (AttributeValue::Pinch, AttributeValue::Absent),
            ]
        );
        assert_eq!(observer.previous(t, KEY), Some(AttributeValue::Absent));
        assert_eq!(observer.current(t, KEY), Some(AttributeValue::Pinch));
    }

    #[test]
    fn test_all_attributes_rechecked_per_notification() {
        let mut scene = MemoryScene::new();
        let t = scene.get_or_create_transform("t");
        let mut observer = AttributeObserver::new(Recorder::default());
        observer.subscribe(&mut scene, t, &["a", "b"]).unwrap();

        scene.set_attribute(t, "a", AttributeValue::Pinch).unwrap();
        scene.set_attribute(t, "b", AttributeValue::Pinch).unwrap();
        // First delivery already sees both new values; second sees nothing new.
        deliver(&mut observer, &mut scene);

        let names: Vec<&str> = observer.handler().seen.iter().map(|s| s.1.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_resubscribe_registers_once_and_merges() {
        let mut scene = MemoryScene::new();
        let t = scene.get_or_create_transform("t");
        let mut observer = AttributeObserver::new(Recorder::default());
        observer.subscribe(&mut scene, t, &["a"]).unwrap();
        observer.subscribe(&mut scene, t, &["b"]).unwrap();
        assert_eq!(scene.observer_count(), 1);

        scene.set_attribute(t, "a", AttributeValue::Pinch).unwrap();
        deliver(&mut observer, &mut scene);
        scene.set_attribute(t, "b", AttributeValue::Pinch).unwrap();
        deliver(&mut observer, &mut scene);
        assert_eq!(observer.handler().seen.len(), 2);
    }

    #[test]
    fn test_notify_unsubscribed_node_fails_fast() {
        let mut scene = MemoryScene::new();
        let t = scene.get_or_create_transform("t");
        let mut observer = AttributeObserver::new(LogChanges::default());
        assert_eq!(
            observer.on_notify(&mut scene, t),
            Err(ObserverError::NotSubscribed(t))
        );
    }

    #[test]
    fn test_unsubscribe_all_clears_everything() {
        let mut scene = MemoryScene::new();
        let a = scene.get_or_create_transform("a");
        let b = scene.get_or_create_transform("b");
        let mut observer = AttributeObserver::new(Recorder::default());
        observer.subscribe(&mut scene, a, &[KEY]).unwrap();
        observer.subscribe(&mut scene, b, &[KEY]).unwrap();
        assert_eq!(scene.observer_count(), 2);

        observer.unsubscribe_all(&mut scene);
        assert_eq!(scene.observer_count(), 0);
        assert!(!observer.is_subscribed(a));
        assert_eq!(observer.current(b, KEY), None);

        scene.set_attribute(a, KEY, AttributeValue::Pinch).unwrap();
        assert!(scene.take_notifications().is_empty());
        assert!(matches!(
            observer.on_notify(&mut scene, a),
            Err(ObserverError::NotSubscribed(_))
        ));
    }

    #[test]
    fn test_subscribe_stale_node_errors() {
        let mut scene = MemoryScene::new();
        let t = scene.get_or_create_transform("t");
        scene.remove_node(t);
        let mut observer = AttributeObserver::new(LogChanges::default());
        assert_eq!(
            observer.subscribe(&mut scene, t, &[KEY]),
            Err(ObserverError::Scene(SceneError::UnknownNode(t)))
        );
        assert!(!observer.is_subscribed(t));
    }
}
