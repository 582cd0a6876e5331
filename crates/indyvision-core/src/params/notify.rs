//! Equality-gated change notification for parameter records.
//!
//! Every parameter set owns a [`ChangeNotifier`]. Setters route their writes
//! through [`ChangeNotifier::update`], which stores the value and notifies
//! subscribers only when the value actually differs from the current one.

use std::fmt;

use super::Operation;

/// Notification payload delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldChange {
    /// The operation whose parameters changed
    pub operation: Operation,
    /// Name of the field that changed (snake_case)
    pub field: &'static str,
}

/// Handle returned by [`ChangeNotifier::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Raw numeric value, for bindings that cannot hold the handle type.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(value: u64) -> Self {
        Self(value)
    }
}

type Callback = Box<dyn FnMut(&FieldChange)>;

/// Subscriber list for field changes.
///
/// Subscribers are not carried over by `Clone`: a cloned parameter set starts
/// with nobody listening. Subscribers never take part in equality either.
#[derive(Default)]
pub struct ChangeNotifier {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Callback)>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked for every effective field change.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&FieldChange) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a subscriber. Returns `false` if the id was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Store `value` into `slot` and notify, unless the value is unchanged.
    ///
    /// Returns `true` when the slot was written.
    pub fn update<T: PartialEq>(
        &mut self,
        slot: &mut T,
        value: T,
        operation: Operation,
        field: &'static str,
    ) -> bool {
        if *slot == value {
            return false;
        }
        *slot = value;
        self.emit(FieldChange { operation, field });
        true
    }

    fn emit(&mut self, change: FieldChange) {
        log::trace!("{:?}.{} changed", change.operation, change.field);
        for (_, callback) in self.subscribers.iter_mut() {
            callback(&change);
        }
    }
}

impl Clone for ChangeNotifier {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl PartialEq for ChangeNotifier {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording(notifier: &mut ChangeNotifier) -> Rc<RefCell<Vec<&'static str>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        notifier.subscribe(move |change| sink.borrow_mut().push(change.field));
        log
    }

    #[test]
    fn test_update_changed_value_notifies() {
        let mut notifier = ChangeNotifier::new();
        let log = recording(&mut notifier);
        let mut slot = 1u32;

        assert!(notifier.update(&mut slot, 2, Operation::Morphology, "iterations"));
        assert_eq!(slot, 2);
        assert_eq!(*log.borrow(), vec!["iterations"]);
    }

    #[test]
    fn test_update_same_value_is_silent() {
        let mut notifier = ChangeNotifier::new();
        let log = recording(&mut notifier);
        let mut slot = 7u8;

        assert!(!notifier.update(&mut slot, 7, Operation::Threshold, "threshold_min"));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let mut notifier = ChangeNotifier::new();
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let id = notifier.subscribe(move |_| *sink.borrow_mut() += 1);

        let mut slot = false;
        notifier.update(&mut slot, true, Operation::Blob, "draw_box");
        assert!(notifier.unsubscribe(id));
        notifier.update(&mut slot, false, Operation::Blob, "draw_box");

        assert_eq!(*count.borrow(), 1);
        assert!(!notifier.unsubscribe(id));
    }

    #[test]
    fn test_clone_drops_subscribers() {
        let mut notifier = ChangeNotifier::new();
        notifier.subscribe(|_| {});
        assert_eq!(notifier.clone().subscriber_count(), 0);
        assert_eq!(notifier.subscriber_count(), 1);
    }

    #[test]
    fn test_subscription_ids_are_unique() {
        let mut notifier = ChangeNotifier::new();
        let a = notifier.subscribe(|_| {});
        let b = notifier.subscribe(|_| {});
        assert_ne!(a, b);
        assert_eq!(SubscriptionId::from_u64(a.as_u64()), a);
    }
}
