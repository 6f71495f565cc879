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

//! The Sync Engine and its supporting cast: the local [`Store`], the
//! conflict-resolving [`merge`] policies, and the offline [`OperationQueue`].

mod engine;
mod file_store;
mod merge;
mod queue;
mod store;
mod subscribers;

pub use engine::{ApplyResult, EngineError, EphemeralEvent, InitEvent, OpEvent, SyncEngine};
pub use file_store::{FileQueueStore, default_dir_under};
pub use merge::{CollaborativeMergeCore, MergePolicy, PassthroughMergeCore, lww_accepts};
pub use queue::{InMemoryQueueStore, OperationQueue, QueueEntry, QueueEvent, QueueStore, QueueStoreError};
pub use store::Store;
pub use subscribers::{SubscriberList, Unsubscribe};
