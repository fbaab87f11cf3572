//! Change notification.

use crate::records::RecordId;
use crate::rules::TitleId;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    RecordsAdded(Vec<RecordId>),
    RecordsEdited(Vec<RecordId>),
    RecordsRemoved(Vec<RecordId>),
    FieldsChanged,
    RulesChanged { title: TitleId },
    TitlesChanged,
    LinesChanged,
    /// Several mutations applied as one logical change.
    Batch(Vec<ChangeKind>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Monotonic; bumped once per emitted change.
    pub version: u64,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn FnMut(&Change)>;

/// Version counter plus observers, notified once per logical mutation.
#[derive(Default)]
pub struct ChangeNotifier {
    version: u64,
    next_subscription: u64,
    observers: Vec<(SubscriptionId, Observer)>,
    /// Nesting depth of open batches and the kinds collected so far.
    suspended: usize,
    pending: Vec<ChangeKind>,
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("version", &self.version)
            .field("observers", &self.observers.len())
            .field("suspended", &self.suspended)
            .field("pending", &self.pending)
            .finish()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&Change) + 'static) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.observers.len() != before
    }

    pub fn notify(&mut self, kind: ChangeKind) {
        if self.suspended > 0 {
            self.pending.push(kind);
            return;
        }
        self.emit(kind);
    }

    /// Hold notifications until the matching [`ChangeNotifier::resume`].
    pub fn suspend(&mut self) {
        self.suspended += 1;
    }

    /// Close a batch; the outermost close emits one `Batch` if anything happened.
    pub fn resume(&mut self) {
        self.suspended = self.suspended.saturating_sub(1);
        if self.suspended > 0 || self.pending.is_empty() {
            return;
        }
        let mut kinds = std::mem::take(&mut self.pending);
        let kind = if kinds.len() == 1 {
            kinds.remove(0)
        } else {
            ChangeKind::Batch(kinds)
        };
        self.emit(kind);
    }

    fn emit(&mut self, kind: ChangeKind) {
        self.version += 1;
        let change = Change {
            version: self.version,
            kind,
        };
        for (_, observer) in &mut self.observers {
            observer(&change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    fn recorder(n: &mut ChangeNotifier) -> Rc<RefCell<Vec<Change>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        n.subscribe(move |c| sink.borrow_mut().push(c.clone()));
        seen
    }

    #[test]
    fn each_notify_bumps_version() {
        let mut n = ChangeNotifier::new();
        let seen = recorder(&mut n);
        n.notify(ChangeKind::FieldsChanged);
        n.notify(ChangeKind::LinesChanged);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].version, 2);
    }

    #[test]
    fn nested_batches_emit_once() {
        let mut n = ChangeNotifier::new();
        let seen = recorder(&mut n);
        n.suspend();
        n.notify(ChangeKind::FieldsChanged);
        n.suspend();
        n.notify(ChangeKind::LinesChanged);
        n.resume();
        assert!(seen.borrow().is_empty());
        n.resume();
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].kind,
            ChangeKind::Batch(vec![ChangeKind::FieldsChanged, ChangeKind::LinesChanged])
        );
    }

    #[test]
    fn empty_batch_is_silent() {
        let mut n = ChangeNotifier::new();
        let seen = recorder(&mut n);
        n.suspend();
        n.resume();
        assert!(seen.borrow().is_empty());
        assert_eq!(n.version(), 0);
    }

    #[test]
    fn unsubscribed_observer_is_not_called() {
        let mut n = ChangeNotifier::new();
        let seen = Rc::new(RefCell::new(0));
        let sink = seen.clone();
        let id = n.subscribe(move |_| *sink.borrow_mut() += 1);
        assert!(n.unsubscribe(id));
        n.notify(ChangeKind::TitlesChanged);
        assert_eq!(*seen.borrow(), 0);
    }
}
