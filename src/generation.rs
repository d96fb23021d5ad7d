// Copyright 2023 Strixpyrr
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! An append-only, lookup-ordered list of [`BufferGroup`]s of one backing kind.
//! Reads are lock-free (`arc_swap::ArcSwap` over an immutable `Vec`); appends take a
//! short `parking_lot::Mutex` solely to serialize growth and publish the new
//! snapshot, mirroring the "brief pool-level mutex" the spec calls for.

use std::sync::Arc;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use crate::error::{Result, SegError};
use crate::group::{BufferGroup, GroupId, GROUP_SIZE};
use crate::segment::{BackingKind, Segment};
use crate::settings::ZeroBufferBehavior;
use crate::zeroer::ZeroWorker;

pub struct GroupGenerationArray {
	backing: BackingKind,
	segment_size: usize,
	groups: ArcSwap<Vec<Arc<BufferGroup>>>,
	append_lock: Mutex<()>,
}

impl GroupGenerationArray {
	pub fn new(backing: BackingKind, segment_size: usize) -> Self {
		Self {
			backing,
			segment_size,
			groups: ArcSwap::from_pointee(Vec::new()),
			append_lock: Mutex::new(()),
		}
	}

	/// Tries to rent `count` contiguous segments from the first group (in insertion
	/// order) that has room, creating a new group if none does.
	pub fn rent(&self, count: usize) -> Result<Vec<Segment>> {
		debug_assert!(count >= 1 && count <= GROUP_SIZE);

		if let Some(segs) = self.try_existing(count) {
			return Ok(segs);
		}

		// No existing group fits; create one under the append lock, then retry. A
		// racing thread may have already appended a group that fits by the time we
		// get the lock, which `try_existing` picks up for free.
		let _guard = self.append_lock.lock();
		if let Some(segs) = self.try_existing(count) {
			return Ok(segs);
		}

		let group = Arc::new(BufferGroup::new(self.backing, self.segment_size)?);
		log::trace!(
			"created buffer group {:?} ({:?} backing, {} segments of {} bytes)",
			group.id(),
			self.backing,
			GROUP_SIZE,
			self.segment_size,
		);
		let segs = group
			.try_rent_run(count)
			.expect("a freshly created group always has room for a run within its own size");

		self.groups.rcu(|groups| {
			let mut next = (**groups).clone();
			next.push(group.clone());
			next
		});

		Ok(segs)
	}

	fn try_existing(&self, count: usize) -> Option<Vec<Segment>> {
		let groups = self.groups.load();
		groups.iter().find_map(|g| g.try_rent_run(count))
	}

	/// Finds the group owning `id` and returns a run to it.
	pub fn release(&self, id: GroupId, first_slot: u32, count: usize, policy: ZeroBufferBehavior, worker: Option<&ZeroWorker>) {
		let groups = self.groups.load();
		if let Some(group) = groups.iter().find(|g| g.id() == id) {
			group.return_run(first_slot, count, policy, worker);
		}
	}

	/// Releases the backing memory of every empty native-backed group. Managed
	/// (heap-backed) generation arrays are a no-op, since those groups are never
	/// freed.
	///
	/// `worker` must be the pool's zero worker, if one has ever been spawned: an
	/// `OutOfBand` release clears a group's free bit (making it look empty) before its
	/// zero-fill entry has actually run, so a group can appear empty while a queued
	/// entry still targets its memory. We flush the worker's queue before freeing
	/// anything, which blocks until every entry enqueued up to this point — including
	/// any still in flight for the groups we're about to drop — has completed.
	pub fn drain(&self, worker: Option<&ZeroWorker>) {
		if self.backing != BackingKind::Native {
			return;
		}

		let _guard = self.append_lock.lock();
		let groups = self.groups.load();
		let (kept, dropped): (Vec<_>, Vec<_>) = (**groups)
			.iter()
			.cloned()
			.partition(|g| !g.is_empty());

		if dropped.is_empty() {
			return;
		}

		if let Some(worker) = worker {
			worker.flush();
		}

		log::trace!("draining {} empty native buffer group(s)", dropped.len());
		self.groups.store(Arc::new(kept));
		// `dropped` goes out of scope here, freeing each group's native allocation
		// once its last `Arc` (this one) is dropped, now that no queued zero entry can
		// still reference it.
	}

	pub fn group_count(&self) -> usize { self.groups.load().len() }
}
