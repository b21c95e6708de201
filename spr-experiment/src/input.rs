//! Key input plumbing between a host event loop and trial engines.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};

use spr_core::{KeyEvent, KeyToken};
use tracing::trace;

pub type KeyHandler = Box<dyn FnMut(&KeyEvent)>;

/// Anything that can deliver discrete key presses to subscribers.
pub trait InputSource {
    fn subscribe(&mut self, handler: KeyHandler) -> Subscription;
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, KeyHandler)>,
    dispatching: bool,
    removed_while_dispatching: Vec<u64>,
}

impl Registry {
    fn remove(&mut self, id: u64) {
        let before = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        if self.handlers.len() == before && self.dispatching {
            self.removed_while_dispatching.push(id);
        }
    }
}

/// Handle returned by `subscribe`. Delivery stops when it is dropped.
pub struct Subscription {
    id: u64,
    registry: Weak<RefCell<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().remove(self.id);
        }
    }
}

/// Single-threaded fan-out of key presses to live subscribers.
#[derive(Clone, Default)]
pub struct KeyboardHub {
    registry: Rc<RefCell<Registry>>,
}

impl KeyboardHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` to every subscriber in subscription order.
    ///
    /// Handlers may subscribe or drop subscriptions while being called.
    pub fn dispatch(&self, event: &KeyEvent) {
        let mut handlers = {
            let mut reg = self.registry.borrow_mut();
            reg.dispatching = true;
            std::mem::take(&mut reg.handlers)
        };
        trace!(key = %event.token, subscribers = handlers.len(), "dispatching key");
        for (_, handler) in handlers.iter_mut() {
            handler(event);
        }
        let mut reg = self.registry.borrow_mut();
        let removed = std::mem::take(&mut reg.removed_while_dispatching);
        handlers.retain(|(id, _)| !removed.contains(id));
        handlers.append(&mut reg.handlers);
        reg.handlers = handlers;
        reg.dispatching = false;
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.borrow().handlers.len()
    }
}

impl InputSource for KeyboardHub {
    fn subscribe(&mut self, handler: KeyHandler) -> Subscription {
        let mut reg = self.registry.borrow_mut();
        let id = reg.next_id;
        reg.next_id += 1;
        reg.handlers.push((id, handler));
        Subscription {
            id,
            registry: Rc::downgrade(&self.registry),
        }
    }
}

/// Raw keyboard signal as reported by a windowing system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKeyState {
    Pressed { repeat: bool },
    Released,
}

/// Turns raw press/release/repeat signals into one event per physical press.
#[derive(Debug, Default)]
pub struct PressFilter {
    held: HashSet<KeyToken>,
}

impl PressFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(
        &mut self,
        token: KeyToken,
        state: RawKeyState,
        timestamp_ns: u64,
    ) -> Option<KeyEvent> {
        match state {
            RawKeyState::Pressed { repeat: true } => None,
            RawKeyState::Pressed { repeat: false } => {
                if self.held.insert(token.clone()) {
                    Some(KeyEvent::new(token, timestamp_ns))
                } else {
                    trace!(key = %token, "press without release dropped");
                    None
                }
            }
            RawKeyState::Released => {
                self.held.remove(&token);
                None
            }
        }
    }

    /// Forget held keys, e.g. when the window loses focus.
    pub fn reset(&mut self) {
        self.held.clear();
    }
}
