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

//! ## How it works
//!
//! Data is written to and read from reusable, fixed-size chunks of memory called
//! *segments*. Segments live in *groups* of 64, each group a single contiguous
//! allocation with a lock-free bitmap marking which of its slots are currently
//! rented out. Groups are organized by backing kind (heap or pinned native memory)
//! into a [`pool`], a process-wide singleton: renting walks existing groups for a
//! free run of slots before allocating a new group, and a released segment's bytes
//! are cleared per the active [`settings::ZeroBufferBehavior`] before its slot
//! becomes rentable again.
//!
//! A [`stream::SegmentStream`] presents a logical, growable byte sequence over a
//! list of rented segments, implementing `std::io::{Read, Write, Seek}`. Seeking
//! past the current length and then writing leaves a gap; that gap always reads
//! back as zero, regardless of the pool's zeroing policy, since the stream enforces
//! it itself at the logical level.

mod atomic;
mod error;
mod generation;
mod group;
mod native;
pub mod pool;
mod segment;
pub mod settings;
pub mod stream;
mod zeroer;

pub use error::{Result, SegError};
pub use pool::{enable_native_buffers, pool, release_memory_buffers, set_global_default_settings, BufferPool};
pub use segment::{BackingKind, Segment, DEFAULT_SEGMENT_SIZE};
pub use settings::{StreamOptions, ZeroBufferBehavior};
pub use stream::{AsyncSink, SegmentStream};
