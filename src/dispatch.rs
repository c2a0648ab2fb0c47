//! Delivery of matched hotkeys to pressed/released subscribers.

use crate::event::{panic_message, Direction, HandlerFault, HotkeyArgs, HotkeyEvent};
use crate::platform::Verdict;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Subscriber for one of the pressed/released channels.
pub type Handler = Arc<dyn Fn(&mut HotkeyArgs) + Send + Sync>;

/// Receives panics caught while dispatching.
pub type FaultSink = Arc<dyn Fn(&HandlerFault) + Send + Sync>;

/// How matched keystrokes reach subscribers.
///
/// A listener uses exactly one mode for its whole lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Subscribers run inside the keyboard callback, before the keystroke is
    /// forwarded. Setting [`HotkeyArgs::handled`] swallows the keystroke;
    /// leaving it unset forwards it.
    #[default]
    Inline,
    /// The callback queues the hotkey and returns at once, swallowing unless
    /// the binding was registered with `forward_default`. Subscribers run
    /// later on whichever thread calls
    /// [`HotkeyListener::dispatch_pending`](crate::HotkeyListener::dispatch_pending)
    /// and cannot change the outcome.
    Deferred,
}

/// Token returned by a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type HandlerList = RwLock<Vec<(SubscriptionId, Handler)>>;

/// Deferred events held before the owner calls `dispatch_pending`. Once full,
/// further hotkeys still get their forward/swallow decision but are not queued.
pub(crate) const DEFERRED_QUEUE_CAPACITY: usize = 256;

pub(crate) struct Dispatcher {
    mode: DispatchMode,
    pressed: HandlerList,
    released: HandlerList,
    next_id: AtomicU64,
    fault_sink: FaultSink,
    queue_tx: SyncSender<HotkeyEvent>,
    queue_rx: Mutex<Receiver<HotkeyEvent>>,
}

pub(crate) fn log_fault() -> FaultSink {
    Arc::new(|fault: &HandlerFault| log::error!("{}", fault))
}

impl Dispatcher {
    pub fn new(mode: DispatchMode, fault_sink: FaultSink) -> Self {
        let (queue_tx, queue_rx) = mpsc::sync_channel(DEFERRED_QUEUE_CAPACITY);
        Self {
            mode,
            pressed: RwLock::new(Vec::new()),
            released: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            fault_sink,
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    fn channel(&self, direction: Direction) -> &HandlerList {
        match direction {
            Direction::Pressed => &self.pressed,
            Direction::Released => &self.released,
        }
    }

    pub fn subscribe(&self, direction: Direction, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.channel(direction)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        [&self.pressed, &self.released].iter().any(|list| {
            let mut list = list.write().unwrap_or_else(PoisonError::into_inner);
            let before = list.len();
            list.retain(|(sid, _)| *sid != id);
            list.len() != before
        })
    }

    /// Swallow decision an occurrence starts with before subscribers run.
    pub fn initial_swallow(&self, forward_default: bool) -> bool {
        match self.mode {
            DispatchMode::Inline => false,
            DispatchMode::Deferred => !forward_default,
        }
    }

    /// Hand a matched keystroke over. Called from the keyboard callback.
    pub fn deliver(&self, event: HotkeyEvent) -> Verdict {
        let swallow = match self.mode {
            DispatchMode::Inline => self.notify(&event, false),
            DispatchMode::Deferred => {
                let swallow = event.swallow;
                // The receiver lives as long as self, so the queue can only be full.
                if let Err(TrySendError::Full(event)) = self.queue_tx.try_send(event) {
                    log::warn!("Deferred hotkey queue full, dropping {}", describe(&event));
                }
                swallow
            }
        };

        if swallow {
            Verdict::Swallow
        } else {
            Verdict::Forward
        }
    }

    /// Deliver every queued event to subscribers. Returns the number delivered.
    pub fn dispatch_pending(&self) -> usize {
        let events: Vec<HotkeyEvent> = {
            let rx = self.queue_rx.lock().unwrap_or_else(PoisonError::into_inner);
            rx.try_iter().collect()
        };
        for event in &events {
            self.notify(event, true);
        }
        events.len()
    }

    /// Run all handlers for the event's direction. Returns the final `handled` flag.
    ///
    /// The handler list is snapshotted first so no lock is held while user
    /// code runs. On the callback path (`wait == false`) a contended list is
    /// skipped rather than waited for.
    fn notify(&self, event: &HotkeyEvent, wait: bool) -> bool {
        let list = self.channel(event.direction);
        let handlers: Vec<Handler> = if wait {
            let guard = list.read().unwrap_or_else(PoisonError::into_inner);
            guard.iter().map(|(_, h)| Arc::clone(h)).collect()
        } else {
            match list.try_read() {
                Ok(guard) => guard.iter().map(|(_, h)| Arc::clone(h)).collect(),
                Err(_) => {
                    log::warn!("Hotkey subscribers busy, skipping dispatch");
                    return event.swallow;
                }
            }
        };

        let mut args = HotkeyArgs::from_event(event);
        for (idx, handler) in handlers.iter().enumerate() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(&mut args))) {
                self.report(HandlerFault {
                    hotkey: Some(describe(event)),
                    handler: Some(idx),
                    message: panic_message(payload.as_ref()),
                });
            }
        }
        args.handled
    }

    pub fn report(&self, fault: HandlerFault) {
        let sink = Arc::clone(&self.fault_sink);
        if catch_unwind(AssertUnwindSafe(|| sink(&fault))).is_err() {
            log::error!("Fault sink panicked while reporting: {}", fault);
        }
    }
}

fn describe(event: &HotkeyEvent) -> String {
    match &event.name {
        Some(name) => format!("{:?}", name),
        None => crate::hotkey::Binding::new(event.key, event.modifiers).to_string(),
    }
}
