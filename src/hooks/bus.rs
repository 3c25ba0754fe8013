//! Priority-ordered multi-subscriber hook dispatch (spec §4.4).

use super::event::HookEvent;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

/// Typed propagation outcome (spec §9: "reproduce with a typed
/// Continue|Stop outcome; do not rely on truthiness").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Stop,
}

type HandlerFn = dyn Fn(&mut HookEvent) -> Outcome + Send + Sync;

struct Registration {
    id: u64,
    /// `None` subscribes to every command.
    filter: Option<&'static str>,
    priority: i32,
    handler: Arc<HandlerFn>,
}

/// A registration handle returned by [`HookBus::add_hook`], usable to
/// unsubscribe (plugins remove their hooks on unload, spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookId(u64);

#[derive(Default)]
pub struct HookBus {
    registrations: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

impl HookBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Higher `priority` fires first (spec §4.4,
    /// default 100). `filter = None` subscribes to every command name.
    pub fn add_hook(
        &self,
        filter: Option<&'static str>,
        priority: i32,
        handler: impl Fn(&mut HookEvent) -> Outcome + Send + Sync + 'static,
    ) -> HookId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut regs = self.registrations.write();
        regs.push(Registration {
            id,
            filter,
            priority,
            handler: Arc::new(handler),
        });
        regs.sort_by(|a, b| b.priority.cmp(&a.priority));
        HookId(id)
    }

    /// Remove a previously registered handler.
    pub fn remove_hook(&self, id: HookId) {
        self.registrations.write().retain(|r| r.id != id.0);
    }

    /// Dispatch `event` to every matching handler in priority order.
    /// Handlers may mutate the event's payload; later handlers observe the
    /// edits (spec §4.4: used by antispam-style filtering). A handler
    /// returning `Outcome::Stop` halts further propagation. A panicking
    /// handler is caught, logged, and propagation continues (spec §4.4,
    /// §7: "Hook-handler exceptions are caught and logged; they never drop
    /// the current connection").
    pub fn dispatch(&self, event: &mut HookEvent) {
        // Snapshot Arc-cloned handlers under the lock, then run them
        // without holding it so a handler registering/removing a hook
        // doesn't deadlock.
        let handlers: Vec<Arc<HandlerFn>> = {
            let regs = self.registrations.read();
            regs.iter()
                .filter(|r| r.filter.is_none_or(|f| f == event.command()))
                .map(|r| Arc::clone(&r.handler))
                .collect()
        };

        for handler in handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(event)));

            match outcome {
                Ok(Outcome::Stop) => break,
                Ok(Outcome::Continue) => {}
                Err(panic) => {
                    let msg = panic_message(&panic);
                    error!(command = event.command(), error = %msg, "hook handler panicked");
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Fill in `ts` with the current wall-clock time if a caller constructed an
/// event without one (spec §4.4, §6.2: "auto-filled ts if not set").
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[allow(dead_code)]
fn silence_unused_warn() {
    let _ = warn;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::event::HookPayload;

    fn event(command_payload: HookPayload) -> HookEvent {
        HookEvent {
            network: "TestNet".into(),
            source: "1AAAAAAAA".into(),
            ts: now_ts(),
            payload: command_payload,
        }
    }

    #[test]
    fn handlers_fire_in_priority_order() {
        let bus = HookBus::new();
        let order = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let o1 = order.clone();
        bus.add_hook(Some("ENDBURST"), 50, move |_| {
            o1.lock().push(50);
            Outcome::Continue
        });
        let o2 = order.clone();
        bus.add_hook(Some("ENDBURST"), 200, move |_| {
            o2.lock().push(200);
            Outcome::Continue
        });
        bus.dispatch(&mut event(HookPayload::Endburst));
        assert_eq!(*order.lock(), vec![200, 50]);
    }

    #[test]
    fn stop_halts_propagation() {
        let bus = HookBus::new();
        let fired = std::sync::Arc::new(parking_lot::Mutex::new(false));
        bus.add_hook(None, 100, |_| Outcome::Stop);
        let f = fired.clone();
        bus.add_hook(None, 50, move |_| {
            *f.lock() = true;
            Outcome::Continue
        });
        bus.dispatch(&mut event(HookPayload::Endburst));
        assert!(!*fired.lock());
    }

    #[test]
    fn payload_mutation_is_observed_by_later_handlers() {
        let bus = HookBus::new();
        bus.add_hook(Some("PRIVMSG"), 100, |ev| {
            if let HookPayload::Privmsg { text, .. } = &mut ev.payload {
                *text = "[filtered]".to_string();
            }
            Outcome::Continue
        });
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(String::new()));
        let s = seen.clone();
        bus.add_hook(Some("PRIVMSG"), 50, move |ev| {
            if let HookPayload::Privmsg { text, .. } = &ev.payload {
                *s.lock() = text.clone();
            }
            Outcome::Continue
        });
        let mut ev = event(HookPayload::Privmsg {
            target: "#chan".into(),
            text: "hello".into(),
        });
        bus.dispatch(&mut ev);
        assert_eq!(*seen.lock(), "[filtered]");
    }

    #[test]
    fn panicking_handler_is_caught_and_propagation_continues() {
        let bus = HookBus::new();
        bus.add_hook(None, 100, |_| panic!("boom"));
        let fired = std::sync::Arc::new(parking_lot::Mutex::new(false));
        let f = fired.clone();
        bus.add_hook(None, 50, move |_| {
            *f.lock() = true;
            Outcome::Continue
        });
        bus.dispatch(&mut event(HookPayload::Endburst));
        assert!(*fired.lock());
    }
}
