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

//! The process-wide segmented buffer pool: one [`GroupGenerationArray`] for
//! heap-backed segments and, once enabled, one for native-backed segments.
//!
//! Mirrors the teacher's split between a single global pool instance (`pool::pool()`)
//! and the per-stream options that parameterize how it's used, but swaps the
//! teacher's thread-local `RefCell` for a genuinely concurrent, lock-free pool, since
//! this crate's streams must be usable from any thread.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use crate::error::{Result, SegError};
use crate::generation::GroupGenerationArray;
use crate::group::GROUP_SIZE;
use crate::segment::{BackingKind, Segment, DEFAULT_SEGMENT_SIZE};
use crate::settings::{StreamOptions, ZeroBufferBehavior};
use crate::zeroer::ZeroWorker;

static POOL: Lazy<BufferPool> = Lazy::new(BufferPool::new);

/// Returns the process-wide pool instance.
pub fn pool() -> &'static BufferPool { &POOL }

/// Sets the global default [`StreamOptions`] used by [`SegmentStream::new`] and
/// [`SegmentStream::with_capacity`](crate::stream::SegmentStream::with_capacity).
/// Fails with [`SegError::InvalidOperation`] once any stream has ever been created.
pub fn set_global_default_settings(options: StreamOptions) -> Result<()> {
	pool().set_default_settings(options)
}

/// Enables or disables native-backed groups. Fails once any stream has ever been
/// created.
pub fn enable_native_buffers(flag: bool) -> Result<()> {
	pool().enable_native_buffers(flag)
}

/// Best-effort hint: releases empty native-backed groups.
pub fn release_memory_buffers() {
	pool().drain();
}

/// The process-wide allocator and recycler of buffer segments.
pub struct BufferPool {
	managed: GroupGenerationArray,
	native: OnceCell<GroupGenerationArray>,
	native_enabled: AtomicBool,
	zero_worker: OnceCell<ZeroWorker>,
	default_settings: Mutex<StreamOptions>,
	active_streams: AtomicUsize,
}

impl BufferPool {
	fn new() -> Self {
		Self {
			managed: GroupGenerationArray::new(BackingKind::Heap, DEFAULT_SEGMENT_SIZE),
			native: OnceCell::new(),
			native_enabled: AtomicBool::new(false),
			zero_worker: OnceCell::new(),
			default_settings: Mutex::new(StreamOptions::default()),
			active_streams: AtomicUsize::new(0),
		}
	}

	pub fn default_settings(&self) -> StreamOptions { *self.default_settings.lock() }

	fn set_default_settings(&self, options: StreamOptions) -> Result<()> {
		self.seal_if_streams_exist("changing the global default stream settings")?;
		*self.default_settings.lock() = options;
		Ok(())
	}

	fn enable_native_buffers(&self, flag: bool) -> Result<()> {
		self.seal_if_streams_exist("enabling native buffers")?;
		if flag {
			self.native.get_or_init(|| GroupGenerationArray::new(BackingKind::Native, DEFAULT_SEGMENT_SIZE));
		}
		self.native_enabled.store(flag, Ordering::Release);
		Ok(())
	}

	fn seal_if_streams_exist(&self, what: &str) -> Result<()> {
		if self.active_streams.load(Ordering::Acquire) > 0 {
			return Err(SegError::invalid_operation(format_args!(
				"cannot seal change: {what} after a stream has been created"
			)));
		}
		Ok(())
	}

	pub(crate) fn mark_stream_created(&self) { self.active_streams.fetch_add(1, Ordering::AcqRel); }
	pub(crate) fn mark_stream_disposed(&self) { self.active_streams.fetch_sub(1, Ordering::AcqRel); }

	fn generation(&self) -> &GroupGenerationArray {
		if self.native_enabled.load(Ordering::Acquire) {
			self.native.get().unwrap_or(&self.managed)
		} else {
			&self.managed
		}
	}

	fn zero_worker(&self) -> &ZeroWorker {
		self.zero_worker.get_or_init(ZeroWorker::spawn)
	}

	/// Rents enough segments to cover `total_bytes`, splitting the request across
	/// groups when it spans more than [`GROUP_SIZE`] segments.
	pub fn rent(&self, total_bytes: usize) -> Result<Vec<Segment>> {
		let segment_size = DEFAULT_SEGMENT_SIZE;
		let mut remaining = total_bytes.div_ceil(segment_size);
		let mut segments = Vec::with_capacity(remaining);
		let generation = self.generation();

		while remaining > 0 {
			let chunk = remaining.min(GROUP_SIZE);
			match generation.rent(chunk) {
				Ok(mut segs) => {
					remaining -= segs.len();
					segments.append(&mut segs);
				}
				Err(err) => {
					log::error!("pool exhausted while renting {total_bytes} bytes: {err}");
					// Return whatever we already claimed so the caller's eventual
					// drop/dispose path still recycles it.
					self.release_all(segments);
					return Err(err);
				}
			}
		}

		Ok(segments)
	}

	/// Returns a single segment to its owning group.
	pub fn release(&self, segment: Segment) {
		let policy = self.default_settings().zero_behavior();
		self.release_with_policy(segment, policy);
	}

	pub(crate) fn release_with_policy(&self, segment: Segment, policy: ZeroBufferBehavior) {
		let group_id = segment.group();
		let slot = segment.slot();
		let backing = segment.backing();
		drop(segment);

		let worker = matches!(policy, ZeroBufferBehavior::OutOfBand).then(|| self.zero_worker());
		let generation = match backing {
			BackingKind::Heap => &self.managed,
			BackingKind::Native => self.native.get().unwrap_or(&self.managed),
		};
		generation.release(group_id, slot, 1, policy, worker);
	}

	fn release_all(&self, segments: Vec<Segment>) {
		let policy = self.default_settings().zero_behavior();
		for seg in segments {
			self.release_with_policy(seg, policy);
		}
	}

	/// Best-effort: releases the backing memory of empty native groups.
	pub fn drain(&self) {
		if let Some(native) = self.native.get() {
			native.drain(self.zero_worker.get());
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	// Each test uses a throwaway `BufferPool` rather than the process-global
	// singleton, so they can run concurrently without fighting over the sealed
	// latches.
	fn fresh_pool() -> BufferPool { BufferPool::new() }

	#[test]
	fn rent_and_release_round_trip() {
		let pool = fresh_pool();
		let segs = pool.rent(DEFAULT_SEGMENT_SIZE * 3).unwrap();
		assert_eq!(segs.len(), 3);
		for seg in segs {
			pool.release(seg);
		}
	}

	#[test]
	fn settings_are_sealed_after_first_stream() {
		let pool = fresh_pool();
		pool.mark_stream_created();
		let err = pool.set_default_settings(StreamOptions::default());
		assert!(matches!(err, Err(SegError::InvalidOperation(_))));
	}

	#[test]
	fn native_buffers_are_sealed_after_first_stream() {
		let pool = fresh_pool();
		pool.mark_stream_created();
		let err = pool.enable_native_buffers(true);
		assert!(matches!(err, Err(SegError::InvalidOperation(_))));
	}

	#[test]
	fn native_buffers_can_be_enabled_before_any_stream() {
		let pool = fresh_pool();
		pool.enable_native_buffers(true).unwrap();
		let segs = pool.rent(DEFAULT_SEGMENT_SIZE).unwrap();
		assert_eq!(segs[0].backing(), BackingKind::Native);
		for seg in segs {
			pool.release(seg);
		}
	}
}
