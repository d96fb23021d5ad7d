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

//! The unit of rent/return in the [`pool`](crate::pool): a fixed-size block of bytes
//! owned by exactly one [`BufferGroup`](crate::group::BufferGroup) slot at a time.

use std::fmt;
use crate::group::GroupId;

/// Default segment size, 64 KiB — large enough that a heap-backed group lands on the
/// large-object heap on runtimes that have one, small enough to keep per-stream
/// internal fragmentation low.
pub const DEFAULT_SEGMENT_SIZE: usize = 64 * 1024;

/// Where a segment's bytes physically live.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BackingKind {
	/// A managed, heap-allocated byte array. Never freed once allocated.
	Heap,
	/// Pinned native memory obtained directly from the OS. Freed on `drain()` once
	/// its owning group is empty.
	Native,
}

/// A fixed-size, rented buffer segment.
///
/// A segment's identity is `(group, slot)`; its bytes live in its group's contiguous
/// backing region at `slot * SegmentSize`. Segments are never shared between streams
/// while live — a `Segment` value is the unique capability to read and write that
/// span of bytes.
pub struct Segment {
	ptr: *mut u8,
	len: usize,
	group: GroupId,
	slot: u32,
	backing: BackingKind,
	/// Whether the bytes are currently known to be all-zero. Cleared on first write;
	/// never assumed true on rent, since out-of-band zeroing completes asynchronously
	/// with respect to the rental that reused the slot.
	zeroed: bool,
}

// SAFETY: a `Segment` is the sole handle to its slot for its entire lifetime: the
// owning group's bitmap guarantees no other `Segment` aliases the same `(group,
// slot)` pair while this one is live. Sending it across threads only transfers that
// unique ownership.
unsafe impl Send for Segment {}

impl Segment {
	/// Constructs a segment wrapping a slot's byte range. Only called by
	/// [`BufferGroup::try_rent_run`](crate::group::BufferGroup::try_rent_run).
	pub(crate) fn new(ptr: *mut u8, len: usize, group: GroupId, slot: u32, backing: BackingKind, zeroed: bool) -> Self {
		Self { ptr, len, group, slot, backing, zeroed }
	}

	pub fn len(&self) -> usize { self.len }
	pub fn is_empty(&self) -> bool { self.len == 0 }
	pub fn group(&self) -> GroupId { self.group }
	pub fn slot(&self) -> u32 { self.slot }
	pub fn backing(&self) -> BackingKind { self.backing }
	pub fn is_zeroed(&self) -> bool { self.zeroed }

	/// Returns a slice over the segment's bytes.
	pub fn data(&self) -> &[u8] {
		// SAFETY: `ptr` is valid for `len` bytes for the lifetime of this segment,
		// per the group's bitmap-enforced exclusive rental.
		unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
	}

	/// Returns a mutable slice over the segment's bytes. Any write through this slice
	/// clears [`is_zeroed`](Self::is_zeroed); callers that write zero bytes explicitly
	/// (gap-zeroing) should call [`zero_fill_range`](Self::zero_fill_range) instead so
	/// future reads short-circuit correctly — zeroed-ness is cosmetic bookkeeping, not
	/// load-bearing for correctness, since the stream never trusts it for anything
	/// beyond avoiding redundant zero-fills.
	pub fn data_mut(&mut self) -> &mut [u8] {
		self.zeroed = false;
		// SAFETY: see `data`.
		unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
	}

	/// Zeroes the whole segment in place.
	pub fn zero_fill(&mut self) {
		// SAFETY: see `data`.
		unsafe { std::ptr::write_bytes(self.ptr, 0, self.len) };
		self.zeroed = true;
	}

	/// Zeroes a sub-range `[start, end)` of the segment in place, without disturbing
	/// the rest. Used for gap-zeroing a partially-written segment.
	pub fn zero_fill_range(&mut self, start: usize, end: usize) {
		debug_assert!(start <= end && end <= self.len);
		if start == end {
			return;
		}
		// SAFETY: bounds asserted above; `ptr` valid for `len` bytes.
		unsafe { std::ptr::write_bytes(self.ptr.add(start), 0, end - start) };
		if start == 0 && end == self.len {
			self.zeroed = true;
		}
	}

	/// Raw pointer and length, used by the pool to enqueue out-of-band zeroing work
	/// after the segment has been consumed back into its group.
	pub(crate) fn raw_parts(&self) -> (*mut u8, usize) { (self.ptr, self.len) }
}

impl fmt::Debug for Segment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Segment")
			.field("group", &self.group)
			.field("slot", &self.slot)
			.field("len", &self.len)
			.field("backing", &self.backing)
			.field("zeroed", &self.zeroed)
			.finish()
	}
}
