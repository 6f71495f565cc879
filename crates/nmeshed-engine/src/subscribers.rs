// Copyright (C) 2026 The Nmeshed Authors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Typed subscriber lists with explicit unsubscribe handles, replacing the
//! source's string-keyed listener sets. Each event kind owns one
//! [`SubscriberList`]; dispatch walks a snapshot so a callback that
//! subscribes or unsubscribes during delivery cannot corrupt iteration, and
//! a panicking callback cannot prevent later subscribers from running.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::error;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    subscribers: Mutex<Vec<(u64, Callback<T>)>>,
}

/// A handle returned by [`SubscriberList::subscribe`]. Dropping it does
/// nothing; call [`Unsubscribe::unsubscribe`] to detach the callback.
pub struct Unsubscribe<T> {
    inner: Arc<Inner<T>>,
    id: u64,
}

impl<T> Unsubscribe<T> {
    pub fn unsubscribe(self) {
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .retain(|(id, _)| *id != self.id);
    }
}

pub struct SubscriberList<T> {
    inner: Arc<Inner<T>>,
    next_id: AtomicU64,
}

impl<T> Default for SubscriberList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SubscriberList<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(Vec::new()),
            }),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .push((id, Arc::new(callback)));
        Unsubscribe {
            inner: self.inner.clone(),
            id,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.subscribers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch `event` to every current subscriber, in registration order,
    /// over a snapshot of the list taken at the start of the call.
    pub fn dispatch(&self, event: &T) {
        let snapshot: Vec<Callback<T>> = {
            let guard = self.inner.subscribers.lock().unwrap();
            guard.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for callback in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!("subscriber callback panicked; continuing delivery to remaining subscribers");
            }
        }
    }
}
