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

//! The out-of-band zeroing collaborator: a single background thread draining a
//! bounded FIFO of `(pointer, length)` spans released under
//! [`ZeroBufferBehavior::OutOfBand`](crate::settings::ZeroBufferBehavior::OutOfBand).
//!
//! The free bit for a span is always cleared *before* it's enqueued here, so a
//! concurrent rental may observe non-zero bytes; [`SegmentStream`](crate::stream::SegmentStream)
//! never relies on pool-released bytes being zero for that reason — see the gap
//! zeroing obligation in the stream module.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// One queued unit of work for the zero worker: either a span to zero, or a barrier
/// used by [`ZeroWorker::flush`] to wait for every previously queued span to finish.
pub(crate) enum ZeroEntry {
	/// A zero-fill span. The pointer stays valid until the zero completes because
	/// groups backing heap segments are never freed, and native groups are only
	/// freed via `drain()`, which calls [`ZeroWorker::flush`] first to let in-flight
	/// entries for that group's slots run to completion.
	Zero { ptr: *mut u8, len: usize },
	/// Signals completion on the given channel once every entry queued before it has
	/// been applied, since the queue is a single FIFO drained by one worker thread.
	Barrier(Sender<()>),
}

// SAFETY: the entry's target region is guaranteed exclusive to the zero worker for
// the entry's lifetime: the group's free bit was cleared before enqueuing, so no
// rental can alias it until the worker's write completes and a later rental sees the
// post-zero state. The `Barrier` variant carries no raw pointer.
unsafe impl Send for ZeroEntry {}

/// Default bound on the zero queue. Past this many pending spans, `return_run` falls
/// back to zeroing inline rather than blocking the releasing thread.
const QUEUE_CAPACITY: usize = 4096;

pub struct ZeroWorker {
	tx: Sender<ZeroEntry>,
	_handle: std::thread::JoinHandle<()>,
}

impl ZeroWorker {
	pub fn spawn() -> Self {
		let (tx, rx): (Sender<ZeroEntry>, Receiver<ZeroEntry>) = bounded(QUEUE_CAPACITY);
		let handle = std::thread::Builder::new()
			.name("segstream-zeroer".into())
			.spawn(move || Self::run(rx))
			.expect("failed to spawn the out-of-band zeroing thread");

		Self { tx, _handle: handle }
	}

	fn run(rx: Receiver<ZeroEntry>) {
		for entry in rx {
			match entry {
				// SAFETY: see `ZeroEntry`'s `Send` impl rationale.
				ZeroEntry::Zero { ptr, len } => unsafe { std::ptr::write_bytes(ptr, 0, len) },
				ZeroEntry::Barrier(done) => {
					let _ = done.send(());
				}
			}
		}
	}

	/// Enqueues a span for background zeroing. Returns `false` if the queue is full,
	/// in which case the caller must zero the span itself.
	pub(crate) fn try_enqueue(&self, entry: ZeroEntry) -> bool {
		match self.tx.try_send(entry) {
			Ok(()) => true,
			Err(TrySendError::Full(_)) => {
				log::warn!("out-of-band zero queue full, falling back to inline zeroing");
				false
			}
			Err(TrySendError::Disconnected(_)) => {
				log::error!("out-of-band zero worker thread is gone, falling back to inline zeroing");
				false
			}
		}
	}

	/// Blocks until every span enqueued before this call has been zeroed. Used by
	/// `drain()` to ensure no in-flight zero-op still references a native group's
	/// memory before it's freed.
	pub(crate) fn flush(&self) {
		let (done_tx, done_rx) = bounded(1);
		if self.tx.send(ZeroEntry::Barrier(done_tx)).is_err() {
			// Worker thread is gone; nothing can still be in flight.
			return;
		}
		let _ = done_rx.recv();
	}
}
