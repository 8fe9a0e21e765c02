use apm::event::Event;

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// A registered event hook.
pub type EventHook = Box<dyn Fn(&Event) + Send + Sync>;

/// Holds the registered event hooks for a pool or topology.
///
/// `no_hooks` lets dispatch skip the lock entirely when nothing is
/// registered, which is the common case.
pub struct Listener {
    no_hooks: AtomicBool,
    hooks: RwLock<Vec<EventHook>>,
}

impl Listener {
    pub fn new() -> Listener {
        Listener {
            no_hooks: AtomicBool::new(true),
            hooks: RwLock::new(Vec::new()),
        }
    }

    /// Registers a hook to be called for every emitted event.
    pub fn add_hook(&self, hook: EventHook) {
        if let Ok(mut guard) = self.hooks.write() {
            guard.push(hook);
            self.no_hooks.store(false, Ordering::SeqCst);
        }
    }

    /// Runs every registered hook against the event.
    pub fn dispatch(&self, event: &Event) {
        if self.no_hooks.load(Ordering::SeqCst) {
            return;
        }

        if let Ok(guard) = self.hooks.read() {
            for hook in guard.iter() {
                hook(event);
            }
        }
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener::new()
    }
}
