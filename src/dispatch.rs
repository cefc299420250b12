use glam::Vec2;

use crate::types::{BodyId, ListenerId};

/// Position-update callback: `(body id, translation delta, rotation delta)`.
pub type Listener = Box<dyn FnMut(BodyId, Vec2, f32)>;

/// Ordered registry of position-update listeners.
///
/// Listeners run synchronously, in registration order, from inside `step`.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: ListenerId,
    listeners: Vec<(ListenerId, Listener)>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = self.next_id;
        self.listeners.push((id, listener));
        id
    }

    /// Returns false when `id` is not registered.
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Invoke every listener once for this body.
    pub fn emit(&mut self, body: BodyId, translation: Vec2, rotation: f32) {
        for (_, listener) in &mut self.listeners {
            listener(body, translation, rotation);
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("next_id", &self.next_id)
            .field(
                "listeners",
                &self.listeners.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_emit_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut reg = ListenerRegistry::new();
        for tag in ["first", "second"] {
            let log = log.clone();
            reg.register(Box::new(move |id, _, _| log.borrow_mut().push((tag, id))));
        }
        reg.emit(7, Vec2::X, 0.0);
        assert_eq!(*log.borrow(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn test_unregister_stops_delivery() {
        let hits = Rc::new(RefCell::new(0));
        let mut reg = ListenerRegistry::new();
        let h = hits.clone();
        let id = reg.register(Box::new(move |_, _, _| *h.borrow_mut() += 1));
        reg.emit(1, Vec2::ZERO, 0.1);
        assert!(reg.unregister(id));
        assert!(!reg.unregister(id));
        reg.emit(1, Vec2::ZERO, 0.1);
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn test_ids_not_reused() {
        let mut reg = ListenerRegistry::new();
        let a = reg.register(Box::new(|_, _, _| {}));
        reg.unregister(a);
        let b = reg.register(Box::new(|_, _, _| {}));
        assert_ne!(a, b);
    }
}
