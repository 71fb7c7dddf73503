// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Process-wide event dispatch.
//!
//! Each event type gets its own handler table, keyed by [`TypeId`]. Handlers
//! run synchronously from whatever task fires the event, in registration
//! order; a handler may set the `handled` flag to short-circuit the rest.
//! Registrations are keyed by an [`EventOwner`] token so an owner can remove
//! everything it registered in one call.

use std::{any::{Any, TypeId},
          cell::{Cell, RefCell},
          rc::Rc};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Opaque token tying registrations to their owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventOwner(usize);

impl EventOwner {
    /// A fresh, unique owner token.
    #[must_use]
    pub fn unique() -> Self {
        thread_local! {
            static NEXT: Cell<usize> = const { Cell::new(1) };
        }
        NEXT.with(|next| {
            let id = next.get();
            next.set(id + 1);
            EventOwner(id)
        })
    }
}

type ErasedHandler = Rc<dyn Fn(&dyn Any, &mut bool)>;

struct HandlerEntry {
    owner: EventOwner,
    handler: ErasedHandler,
}

thread_local! {
    static REGISTRY: RefCell<FxHashMap<TypeId, SmallVec<[HandlerEntry; 2]>>> =
        RefCell::new(FxHashMap::default());
}

/// Registers a handler for events of type `E` under the given owner.
pub fn register_event<E: Any>(owner: EventOwner, handler: impl Fn(&E, &mut bool) + 'static) {
    let erased: ErasedHandler = Rc::new(move |event, handled| {
        let event = event.downcast_ref::<E>().expect("event type matches table");
        handler(event, handled);
    });
    REGISTRY.with(|registry| {
        registry
            .borrow_mut()
            .entry(TypeId::of::<E>())
            .or_default()
            .push(HandlerEntry {
                owner,
                handler: erased,
            });
    });
}

/// Removes every handler the owner registered for events of type `E`,
/// leaving its registrations for other event types alone.
pub fn unregister_event<E: Any>(owner: EventOwner) {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        if let Some(entries) = registry.get_mut(&TypeId::of::<E>()) {
            entries.retain(|entry| entry.owner != owner);
            if entries.is_empty() {
                registry.remove(&TypeId::of::<E>());
            }
        }
    });
}

/// Removes every handler the owner registered, across all event types.
pub fn unregister_owner(owner: EventOwner) {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        for entries in registry.values_mut() {
            entries.retain(|entry| entry.owner != owner);
        }
        registry.retain(|_, entries| !entries.is_empty());
    });
}

/// Fires an event synchronously. Returns `true` when some handler marked it
/// handled; the remaining handlers are skipped from that point on.
pub fn fire_event<E: Any>(event: &E) -> bool {
    // Snapshot the table so handlers may register or unregister re-entrantly.
    let handlers: SmallVec<[ErasedHandler; 2]> = REGISTRY.with(|registry| {
        registry
            .borrow()
            .get(&TypeId::of::<E>())
            .map(|entries| entries.iter().map(|e| e.handler.clone()).collect())
            .unwrap_or_default()
    });

    let mut handled = false;
    for handler in handlers {
        handler(event, &mut handled);
        if handled {
            break;
        }
    }
    handled
}
