//! User-activity signals.
//!
//! The host UI forwards raw interaction events into an [`ActivityBus`]; an
//! [`ActivityMonitor`] subscribes to a fixed set of signal kinds and calls its
//! callback once per raw signal. There is no debouncing here: extending a
//! deadline twice is harmless.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Kinds of user interaction that count as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    PointerMove,
    KeyPress,
    Click,
    Scroll,
    Touch,
}

impl SignalKind {
    pub const ALL: [SignalKind; 5] = [
        SignalKind::PointerMove,
        SignalKind::KeyPress,
        SignalKind::Click,
        SignalKind::Scroll,
        SignalKind::Touch,
    ];
}

/// Activity callback. Invoked synchronously, with no payload.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Fan-out point for raw interaction signals.
///
/// - No IO / no async
/// - Listeners run on the emitting thread, outside the registry lock
#[derive(Default)]
pub struct ActivityBus {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, SignalKind, Listener)>>,
}

impl ActivityBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one signal. Returns how many listeners were invoked.
    pub fn emit(&self, kind: SignalKind) -> usize {
        let targets: Vec<Listener> = self
            .lock()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, l)| Arc::clone(l))
            .collect();

        for listener in &targets {
            listener();
        }
        targets.len()
    }

    pub fn subscribe(&self, kind: SignalKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, kind, listener));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, SignalKind, Listener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl core::fmt::Debug for ActivityBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ActivityBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Scoped subscription of one callback to a set of signal kinds.
///
/// At most one subscription set is active per monitor: `start` releases the
/// previous one first, `stop` releases everything and is idempotent.
#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    bus: Arc<ActivityBus>,
    kinds: Arc<[SignalKind]>,
    subscriptions: Arc<Mutex<Vec<ListenerId>>>,
}

impl ActivityMonitor {
    pub fn new(bus: Arc<ActivityBus>, kinds: &[SignalKind]) -> Self {
        let mut unique: Vec<SignalKind> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if !unique.contains(kind) {
                unique.push(*kind);
            }
        }

        Self {
            bus,
            kinds: unique.into(),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn start(&self, on_signal: Listener) {
        let mut subs = self.lock();
        self.release(&mut subs);
        for kind in self.kinds.iter() {
            subs.push(self.bus.subscribe(*kind, Arc::clone(&on_signal)));
        }
        tracing::debug!(kinds = self.kinds.len(), "activity monitor started");
    }

    pub fn stop(&self) {
        let mut subs = self.lock();
        if !subs.is_empty() {
            self.release(&mut subs);
            tracing::debug!("activity monitor stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        !self.lock().is_empty()
    }

    pub fn kinds(&self) -> &[SignalKind] {
        &self.kinds
    }

    fn release(&self, subs: &mut Vec<ListenerId>) {
        for id in subs.drain(..) {
            self.bus.unsubscribe(id);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ListenerId>> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Listener) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn every_raw_signal_reaches_the_callback() {
        let bus = Arc::new(ActivityBus::new());
        let monitor = ActivityMonitor::new(Arc::clone(&bus), &SignalKind::ALL);
        let (count, listener) = counter();

        monitor.start(listener);
        bus.emit(SignalKind::Click);
        bus.emit(SignalKind::Click);
        bus.emit(SignalKind::Scroll);

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unconfigured_kinds_are_ignored() {
        let bus = Arc::new(ActivityBus::new());
        let monitor = ActivityMonitor::new(Arc::clone(&bus), &[SignalKind::KeyPress]);
        let (count, listener) = counter();

        monitor.start(listener);
        assert_eq!(bus.emit(SignalKind::PointerMove), 0);
        assert_eq!(bus.emit(SignalKind::KeyPress), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn restart_replaces_previous_subscriptions() {
        let bus = Arc::new(ActivityBus::new());
        let monitor = ActivityMonitor::new(Arc::clone(&bus), &SignalKind::ALL);
        let (first, l1) = counter();
        let (second, l2) = counter();

        monitor.start(l1);
        monitor.start(l2);
        assert_eq!(bus.listener_count(), SignalKind::ALL.len());

        bus.emit(SignalKind::Touch);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_is_idempotent_and_safe_before_start() {
        let bus = Arc::new(ActivityBus::new());
        let monitor = ActivityMonitor::new(Arc::clone(&bus), &SignalKind::ALL);

        monitor.stop();
        assert!(!monitor.is_active());

        let (count, listener) = counter();
        monitor.start(listener);
        monitor.stop();
        monitor.stop();

        assert_eq!(bus.listener_count(), 0);
        bus.emit(SignalKind::Click);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn duplicate_kinds_subscribe_once() {
        let bus = Arc::new(ActivityBus::new());
        let monitor = ActivityMonitor::new(Arc::clone(&bus), &[SignalKind::Click, SignalKind::Click]);
        let (count, listener) = counter();

        monitor.start(listener);
        bus.emit(SignalKind::Click);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listeners_may_reenter_the_bus() {
        let bus = Arc::new(ActivityBus::new());
        let monitor = ActivityMonitor::new(Arc::clone(&bus), &[SignalKind::Click]);
        let inner_bus = Arc::clone(&bus);

        monitor.start(Arc::new(move || {
            // Would deadlock if the registry lock were held during delivery.
            let _ = inner_bus.listener_count();
        }));
        assert_eq!(bus.emit(SignalKind::Click), 1);
    }
}
