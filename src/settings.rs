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

//! Typed configuration for streams and the pool, in the style of the teacher's
//! `BufferOptions`: plain `#[non_exhaustive]` structs with a `Default` impl and
//! builder-style setters that consume and return `Self`.

use crate::segment::DEFAULT_SEGMENT_SIZE;

/// When a released segment's bytes are zeroed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum ZeroBufferBehavior {
	/// No zeroing on release; fastest, weakest guarantee. The stream still zeroes
	/// logical gaps itself — this only controls what a released-but-not-yet-rented
	/// segment looks like to diagnostic tools.
	None,
	/// Zero inline before clearing the free bit. Slower releases, but a rental of
	/// the same slot is guaranteed to see all-zero bytes.
	OnRelease,
	/// Clear the free bit immediately; zeroing happens on a background FIFO worker.
	/// Fastest releases, but a rental may observe non-zero bytes until the worker
	/// catches up.
	#[default]
	OutOfBand,
}

/// The largest `MaximumCapacity` a stream may request: 8 GiB, capped further by
/// `i32::MAX` bytes on 32-bit hosts where `usize` can't address more anyway.
pub fn absolute_max_capacity() -> usize {
	const EIGHT_GIB: u64 = 8 * 1024 * 1024 * 1024;
	let cap = EIGHT_GIB.min(usize::MAX as u64);
	#[cfg(target_pointer_width = "32")]
	let cap = cap.min(i32::MAX as u64);
	cap as usize
}

/// Per-instance options for a [`SegmentStream`](crate::stream::SegmentStream).
#[derive(Copy, Clone, Debug)]
#[non_exhaustive]
pub struct StreamOptions {
	zero_behavior: ZeroBufferBehavior,
	initial_capacity: usize,
	maximum_capacity: usize,
}

impl Default for StreamOptions {
	fn default() -> Self {
		Self {
			zero_behavior: ZeroBufferBehavior::default(),
			initial_capacity: 0,
			maximum_capacity: absolute_max_capacity(),
		}
	}
}

impl StreamOptions {
	pub fn zero_behavior(&self) -> ZeroBufferBehavior { self.zero_behavior }
	pub fn initial_capacity(&self) -> usize { self.initial_capacity }
	pub fn maximum_capacity(&self) -> usize { self.maximum_capacity }

	pub fn set_zero_behavior(mut self, value: ZeroBufferBehavior) -> Self {
		self.zero_behavior = value;
		self
	}

	/// Sets the initial capacity, in bytes; validated against `maximum_capacity` at
	/// stream construction, not here, since the two may be set in either order.
	pub fn set_initial_capacity(mut self, value: usize) -> Self {
		self.initial_capacity = value;
		self
	}

	/// Sets the hard per-stream capacity cap, in bytes. Values above
	/// [`absolute_max_capacity`] are clamped down to it at stream construction.
	pub fn set_maximum_capacity(mut self, value: usize) -> Self {
		self.maximum_capacity = value;
		self
	}

	pub(crate) fn segment_size(&self) -> usize { DEFAULT_SEGMENT_SIZE }
}
