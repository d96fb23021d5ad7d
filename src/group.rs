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

//! A contiguous region of memory holding up to [`GROUP_SIZE`] segments plus a
//! lock-free free-slot bitmap. Modeled directly on the atomic-bitmap slab pool
//! pattern used elsewhere in this pack (`hdds`'s `core::rt::slabpool`), generalized
//! to two backing kinds and a configurable release-time zeroing policy.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use crate::atomic;
use crate::native;
use crate::segment::{BackingKind, Segment, DEFAULT_SEGMENT_SIZE};
use crate::settings::ZeroBufferBehavior;
use crate::zeroer::{ZeroEntry, ZeroWorker};

/// Segments per group. A single 64-bit word covers the whole free-slot bitmap.
pub const GROUP_SIZE: usize = 64;

/// Unique, process-wide identifier for a [`BufferGroup`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct GroupId(u64);

static NEXT_GROUP_ID: AtomicU64 = AtomicU64::new(0);

impl GroupId {
	fn next() -> Self { Self(NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed)) }

	pub fn value(self) -> u64 { self.0 }
}

enum Storage {
	Heap(Box<[u8]>),
	Native { ptr: *mut u8, len: usize },
}

impl Drop for Storage {
	fn drop(&mut self) {
		if let Storage::Native { ptr, len } = *self {
			native::free(ptr, len);
		}
	}
}

/// A contiguous region of `GROUP_SIZE * segment_size` bytes, with a free/in-use
/// bitmap (`1` bit ⇔ slot rented) and a rented-segment counter.
pub struct BufferGroup {
	id: GroupId,
	backing: BackingKind,
	segment_size: usize,
	base: *mut u8,
	storage: Storage,
	bitmap: AtomicU64,
	rented: AtomicUsize,
}

// SAFETY: `base` always points into `storage`, which this group uniquely owns; all
// mutable access to the region is gated by the bitmap CAS, which guarantees that two
// live `Segment`s never cover the same slot.
unsafe impl Send for BufferGroup {}
unsafe impl Sync for BufferGroup {}

impl BufferGroup {
	pub fn new(backing: BackingKind, segment_size: usize) -> crate::error::Result<Self> {
		let region_len = segment_size * GROUP_SIZE;
		let (base, storage) = match backing {
			BackingKind::Heap => {
				let mut vec = vec![0u8; region_len].into_boxed_slice();
				let base = vec.as_mut_ptr();
				(base, Storage::Heap(vec))
			}
			BackingKind::Native => {
				let ptr = native::alloc(region_len)?;
				(ptr, Storage::Native { ptr, len: region_len })
			}
		};

		Ok(Self {
			id: GroupId::next(),
			backing,
			segment_size,
			base,
			storage,
			bitmap: AtomicU64::new(0),
			rented: AtomicUsize::new(0),
		})
	}

	pub fn with_default_segment_size(backing: BackingKind) -> crate::error::Result<Self> {
		Self::new(backing, DEFAULT_SEGMENT_SIZE)
	}

	pub fn id(&self) -> GroupId { self.id }
	pub fn backing(&self) -> BackingKind { self.backing }

	/// Number of segments currently rented from this group.
	pub fn rented_count(&self) -> usize { self.rented.load(Ordering::Acquire) }

	/// `true` once every slot has been returned — a precondition for draining a
	/// native-backed group.
	pub fn is_empty(&self) -> bool { self.rented_count() == 0 }

	/// Finds a contiguous run of `count` free slots and claims them in one CAS,
	/// retrying the whole search-and-claim cycle on contention.
	pub fn try_rent_run(&self, count: usize) -> Option<Vec<Segment>> {
		debug_assert!(count >= 1 && count <= GROUP_SIZE);
		loop {
			let old = self.bitmap.load(Ordering::Acquire);
			let slot = find_free_run(old, count)?;
			let mask = run_mask(slot, count);
			match self.bitmap.compare_exchange_weak(old, old | mask, Ordering::AcqRel, Ordering::Acquire) {
				Ok(_) => {
					self.rented.fetch_add(count, Ordering::AcqRel);
					return Some(
						(0..count)
							.map(|i| {
								let this_slot = slot + i;
								Segment::new(
									self.slot_ptr(this_slot as u32),
									self.segment_size,
									self.id,
									this_slot as u32,
									self.backing,
									false,
								)
							})
							.collect(),
					);
				}
				Err(_) => continue,
			}
		}
	}

	/// Returns `count` contiguous slots starting at `first_slot`, honoring the given
	/// zeroing policy. The free bit is always cleared *before* any out-of-band
	/// zeroing begins, so no allocator thread ever waits on the zero worker.
	pub fn return_run(
		&self,
		first_slot: u32,
		count: usize,
		policy: ZeroBufferBehavior,
		worker: Option<&ZeroWorker>,
	) {
		debug_assert!(count >= 1 && first_slot as usize + count <= GROUP_SIZE);
		let mask = run_mask(first_slot as usize, count);

		match policy {
			ZeroBufferBehavior::OnRelease => {
				self.zero_range(first_slot, count);
				atomic::clear_bits(&self.bitmap, mask);
			}
			ZeroBufferBehavior::OutOfBand => {
				atomic::clear_bits(&self.bitmap, mask);
				let entry = ZeroEntry::Zero {
					ptr: self.slot_ptr(first_slot),
					len: self.segment_size * count,
				};
				let enqueued = worker.map(|w| w.try_enqueue(entry)).unwrap_or(false);
				if !enqueued {
					self.zero_range(first_slot, count);
				}
			}
			ZeroBufferBehavior::None => {
				atomic::clear_bits(&self.bitmap, mask);
			}
		}

		self.rented.fetch_sub(count, Ordering::AcqRel);
	}

	fn slot_ptr(&self, slot: u32) -> *mut u8 {
		// SAFETY: `slot < GROUP_SIZE` is an invariant of every caller (enforced by
		// `find_free_run`/the group's own slot-count check), so the offset stays
		// within the region allocated in `new`.
		unsafe { self.base.add(slot as usize * self.segment_size) }
	}

	fn zero_range(&self, first_slot: u32, count: usize) {
		let ptr = self.slot_ptr(first_slot);
		let len = self.segment_size * count;
		// SAFETY: the caller holds exclusive claim on these slots (either they were
		// just unclaimed by this same call, before any new rental can observe them
		// through the cleared bitmap bit, or they are being zeroed before the bit is
		// cleared at all).
		unsafe { std::ptr::write_bytes(ptr, 0, len) };
	}
}

fn run_mask(slot: usize, count: usize) -> u64 {
	if count == GROUP_SIZE {
		u64::MAX
	} else {
		((1u64 << count) - 1) << slot
	}
}

/// Finds the first contiguous run of `count` clear bits in `bitmap`, scanning
/// word-at-a-time via `trailing_zeros`/`trailing_ones` rather than bit-by-bit. Ties
/// are broken by lowest slot id because the scan proceeds from bit 0 upward.
fn find_free_run(bitmap: u64, count: usize) -> Option<usize> {
	let free = !bitmap;
	let mut pos = 0usize;
	while pos < GROUP_SIZE {
		let window = free >> pos;
		if window == 0 {
			return None;
		}
		let skip = window.trailing_zeros() as usize;
		pos += skip;
		if pos + count > GROUP_SIZE {
			return None;
		}
		let run = (!(free >> pos)).trailing_zeros() as usize;
		if run >= count {
			return Some(pos);
		}
		pos += run.max(1);
	}
	None
}
