//! Data-change listener registration.
//!
//! Data sources embed a [`DataChangeNotifier`] and forward their mutations
//! through it; the virtualization layer registers as a listener while it is
//! attached (or measured off-screen) and unregisters on detach.

use std::cell::{Cell, RefCell};

/// Receives incremental data-source mutations, in delivery order.
///
/// Mutations are never reordered relative to subsequent lookups; everything
/// runs on the single logical update thread.
pub trait DataChangeListener {
    /// The whole data set was replaced; item identity is only recoverable
    /// through keys.
    fn on_data_reloaded(&self);

    /// An item was inserted at `index`; items at or above shift up by one.
    fn on_data_added(&self, index: usize);

    /// The item at `index` was removed; items above shift down by one.
    fn on_data_deleted(&self, index: usize);

    /// The item at `index` changed in place and must be rebuilt.
    fn on_data_changed(&self, index: usize);

    /// The items at `from` and `to` exchanged positions.
    fn on_data_moved(&self, from: usize, to: usize);
}

/// Listener registry for a data source.
///
/// Registration hands back an id used for removal, in the same style as
/// invalidation callbacks elsewhere in the stack.
#[derive(Default)]
pub struct DataChangeNotifier {
    listeners: RefCell<Vec<(u64, Box<dyn DataChangeListener>)>>,
    next_id: Cell<u64>,
}

impl DataChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener and returns its id.
    pub fn add_listener(&self, listener: Box<dyn DataChangeListener>) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    /// Removes a previously registered listener. Unknown ids are ignored.
    pub fn remove_listener(&self, id: u64) {
        self.listeners.borrow_mut().retain(|(lid, _)| *lid != id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn notify_reloaded(&self) {
        for (_, listener) in self.listeners.borrow().iter() {
            listener.on_data_reloaded();
        }
    }

    pub fn notify_added(&self, index: usize) {
        for (_, listener) in self.listeners.borrow().iter() {
            listener.on_data_added(index);
        }
    }

    pub fn notify_deleted(&self, index: usize) {
        for (_, listener) in self.listeners.borrow().iter() {
            listener.on_data_deleted(index);
        }
    }

    pub fn notify_changed(&self, index: usize) {
        for (_, listener) in self.listeners.borrow().iter() {
            listener.on_data_changed(index);
        }
    }

    pub fn notify_moved(&self, from: usize, to: usize) {
        for (_, listener) in self.listeners.borrow().iter() {
            listener.on_data_moved(from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<String>>,
    }

    struct RecordingListener(Rc<Recorder>);

    impl DataChangeListener for RecordingListener {
        fn on_data_reloaded(&self) {
            self.0.events.borrow_mut().push("reload".into());
        }
        fn on_data_added(&self, index: usize) {
            self.0.events.borrow_mut().push(format!("add {index}"));
        }
        fn on_data_deleted(&self, index: usize) {
            self.0.events.borrow_mut().push(format!("del {index}"));
        }
        fn on_data_changed(&self, index: usize) {
            self.0.events.borrow_mut().push(format!("chg {index}"));
        }
        fn on_data_moved(&self, from: usize, to: usize) {
            self.0.events.borrow_mut().push(format!("mov {from}->{to}"));
        }
    }

    #[test]
    fn test_notify_in_delivery_order() {
        let recorder = Rc::new(Recorder::default());
        let notifier = DataChangeNotifier::new();
        notifier.add_listener(Box::new(RecordingListener(recorder.clone())));

        notifier.notify_added(3);
        notifier.notify_deleted(1);
        notifier.notify_reloaded();

        assert_eq!(
            *recorder.events.borrow(),
            vec!["add 3".to_string(), "del 1".into(), "reload".into()]
        );
    }

    #[test]
    fn test_remove_listener() {
        let recorder = Rc::new(Recorder::default());
        let notifier = DataChangeNotifier::new();
        let id = notifier.add_listener(Box::new(RecordingListener(recorder.clone())));
        assert_eq!(notifier.listener_count(), 1);

        notifier.remove_listener(id);
        assert_eq!(notifier.listener_count(), 0);

        notifier.notify_changed(0);
        assert!(recorder.events.borrow().is_empty());
    }
}
