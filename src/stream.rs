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

//! The dynamic-mode stream: a logical byte sequence composed of pool-rented
//! segments, implementing `std::io::{Read, Write, Seek}` so it drops in wherever
//! `std::io::Cursor<Vec<u8>>` would otherwise be used, but backed by the recycling
//! pool in [`crate::pool`] instead of one big contiguous allocation.

use std::future::Future;
use std::io::SeekFrom;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, SegError};
use crate::pool::pool;
use crate::segment::{Segment, DEFAULT_SEGMENT_SIZE};
use crate::settings::StreamOptions;

/// A seekable, resizable, write-once-per-byte-range in-memory stream backed by
/// pool-recycled segments.
///
/// Not `Sync`: concurrent mutation of the same stream from multiple threads requires
/// external synchronization, the same contract `std::io::Cursor` carries. Distinct
/// streams may be freely used concurrently from different threads.
pub struct SegmentStream {
	segments: Vec<Segment>,
	options: StreamOptions,
	length: usize,
	position: usize,
	disposed: bool,
}

impl SegmentStream {
	/// Creates an empty stream using the pool's global default settings.
	pub fn new() -> Result<Self> {
		Self::with_options(pool().default_settings())
	}

	/// Creates an empty stream pre-sized to `capacity` bytes, using the pool's
	/// global default settings otherwise.
	pub fn with_capacity(capacity: usize) -> Result<Self> {
		let options = pool().default_settings().set_initial_capacity(capacity);
		Self::with_options(options)
	}

	/// Creates an empty stream with fully explicit options.
	pub fn with_options(options: StreamOptions) -> Result<Self> {
		let max = options.maximum_capacity().min(crate::settings::absolute_max_capacity());
		if max == 0 {
			return Err(SegError::invalid_argument("maximum capacity must be at least 1 byte"));
		}
		if options.initial_capacity() > max {
			return Err(SegError::invalid_argument("initial capacity exceeds maximum capacity"));
		}
		let options = options.set_maximum_capacity(max);

		let segments = if options.initial_capacity() > 0 {
			pool().rent(options.initial_capacity())?
		} else {
			Vec::new()
		};

		pool().mark_stream_created();

		Ok(Self {
			segments,
			options,
			length: 0,
			position: 0,
			disposed: false,
		})
	}

	fn check_open(&self) -> Result<()> {
		if self.disposed {
			Err(SegError::ObjectDisposed)
		} else {
			Ok(())
		}
	}

	pub fn length(&self) -> usize { self.length }
	pub fn position(&self) -> usize { self.position }
	pub fn capacity(&self) -> usize { self.segments.len() * DEFAULT_SEGMENT_SIZE }
	pub fn is_disposed(&self) -> bool { self.disposed }

	pub fn set_position(&mut self, pos: usize) -> Result<()> {
		self.check_open()?;
		if pos > self.options.maximum_capacity() {
			return Err(SegError::invalid_argument("position exceeds maximum stream length"));
		}
		self.position = pos;
		Ok(())
	}

	/// Sets the stream's reported capacity. Shrinking below the current length is
	/// an error; growing allocates the required segments immediately.
	pub fn set_capacity(&mut self, new_capacity: usize) -> Result<()> {
		self.check_open()?;
		if new_capacity < self.length {
			return Err(SegError::invalid_argument("capacity cannot be set below the current length"));
		}
		if new_capacity > self.options.maximum_capacity() {
			return Err(SegError::invalid_argument("capacity exceeds the stream's maximum capacity"));
		}

		let needed = new_capacity.div_ceil(DEFAULT_SEGMENT_SIZE);
		if needed > self.segments.len() {
			self.rent_more(needed - self.segments.len())?;
		} else if needed < self.segments.len() {
			self.release_segments_from(needed);
		}
		Ok(())
	}

	/// Grows or logically truncates the stream to `new_length`. Bytes newly exposed
	/// by growth, and bytes left behind by truncation, are eagerly zeroed — this is
	/// a correctness guarantee independent of the pool's zero-buffer policy.
	pub fn set_length(&mut self, new_length: usize) -> Result<()> {
		self.check_open()?;
		if new_length > self.options.maximum_capacity() {
			return Err(SegError::invalid_argument("length exceeds the stream's maximum capacity"));
		}

		if new_length > self.length {
			self.ensure_capacity_for(new_length)?;
			self.zero_logical_range(self.length, new_length);
			self.length = new_length;
		} else if new_length < self.length {
			self.zero_logical_range(new_length, self.length);
			self.length = new_length;
			let needed = new_length.div_ceil(DEFAULT_SEGMENT_SIZE);
			if needed < self.segments.len() {
				self.release_segments_from(needed);
			}
		}
		Ok(())
	}

	fn ensure_capacity_for(&mut self, new_length: usize) -> Result<()> {
		let needed = new_length.div_ceil(DEFAULT_SEGMENT_SIZE);
		if needed > self.segments.len() {
			self.rent_more(needed - self.segments.len())?;
		}
		Ok(())
	}

	fn rent_more(&mut self, extra_segments: usize) -> Result<()> {
		let mut new_segs = pool().rent(extra_segments * DEFAULT_SEGMENT_SIZE)?;
		self.segments.append(&mut new_segs);
		Ok(())
	}

	fn release_segments_from(&mut self, keep: usize) {
		let policy = self.options.zero_behavior();
		for seg in self.segments.drain(keep..) {
			pool().release_with_policy(seg, policy);
		}
	}

	fn zero_logical_range(&mut self, start: usize, end: usize) {
		if start >= end {
			return;
		}
		let mut pos = start;
		while pos < end {
			let idx = pos / DEFAULT_SEGMENT_SIZE;
			let local = pos % DEFAULT_SEGMENT_SIZE;
			let take = (end - pos).min(DEFAULT_SEGMENT_SIZE - local);
			self.segments[idx].zero_fill_range(local, local + take);
			pos += take;
		}
	}

	fn write_logical_range(&mut self, start: usize, mut src: &[u8]) {
		let mut pos = start;
		while !src.is_empty() {
			let idx = pos / DEFAULT_SEGMENT_SIZE;
			let local = pos % DEFAULT_SEGMENT_SIZE;
			let take = src.len().min(DEFAULT_SEGMENT_SIZE - local);
			self.segments[idx].data_mut()[local..local + take].copy_from_slice(&src[..take]);
			pos += take;
			src = &src[take..];
		}
	}

	fn read_logical_range(&self, start: usize, mut dst: &mut [u8]) {
		let mut pos = start;
		while !dst.is_empty() {
			let idx = pos / DEFAULT_SEGMENT_SIZE;
			let local = pos % DEFAULT_SEGMENT_SIZE;
			let take = dst.len().min(DEFAULT_SEGMENT_SIZE - local);
			dst[..take].copy_from_slice(&self.segments[idx].data()[local..local + take]);
			pos += take;
			dst = &mut dst[take..];
		}
	}

	/// Writes `bytes` at the current position, growing the stream as needed. The
	/// span `[length, position)` — a gap left by a prior seek past the end — is
	/// zeroed before the new bytes become visible.
	pub fn write(&mut self, bytes: &[u8]) -> Result<usize> {
		self.check_open()?;
		if bytes.is_empty() {
			return Ok(0);
		}
		let end = self
			.position
			.checked_add(bytes.len())
			.ok_or_else(|| SegError::invalid_argument("write would overflow the addressable stream length"))?;
		if end > self.options.maximum_capacity() {
			return Err(SegError::out_of_capacity());
		}

		self.ensure_capacity_for(end)?;
		if self.position > self.length {
			self.zero_logical_range(self.length, self.position);
		}
		self.write_logical_range(self.position, bytes);
		self.position = end;
		self.length = self.length.max(end);
		Ok(bytes.len())
	}

	pub fn write_byte(&mut self, byte: u8) -> Result<()> {
		self.write(&[byte]).map(|_| ())
	}

	/// Reads up to `buf.len()` bytes starting at the current position, never past
	/// the stream's length. Returns `0` at end-of-stream.
	pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
		self.check_open()?;
		if buf.is_empty() || self.position >= self.length {
			return Ok(0);
		}
		let n = buf.len().min(self.length - self.position);
		self.read_logical_range(self.position, &mut buf[..n]);
		self.position += n;
		Ok(n)
	}

	/// Returns the byte at the current position as `0..=255`, or `-1` at the end of
	/// the stream.
	pub fn read_byte(&mut self) -> Result<i32> {
		self.check_open()?;
		if self.position >= self.length {
			return Ok(-1);
		}
		let idx = self.position / DEFAULT_SEGMENT_SIZE;
		let local = self.position % DEFAULT_SEGMENT_SIZE;
		let byte = self.segments[idx].data()[local];
		self.position += 1;
		Ok(byte as i32)
	}

	/// Moves the position, per `std::io::SeekFrom` semantics. Seeking past the
	/// length is allowed and does not itself extend the length; a later write
	/// through the gap will.
	pub fn seek(&mut self, from: SeekFrom) -> Result<u64> {
		self.check_open()?;
		let base = match from {
			SeekFrom::Start(pos) => pos as i128,
			SeekFrom::End(offset) => self.length as i128 + offset as i128,
			SeekFrom::Current(offset) => self.position as i128 + offset as i128,
		};
		if base < 0 {
			return Err(SegError::invalid_argument("seek would move before the start of the stream"));
		}
		let new_pos = base as u128;
		if new_pos > self.options.maximum_capacity() as u128 {
			return Err(SegError::invalid_argument("seek target exceeds the stream's maximum capacity"));
		}
		self.position = new_pos as usize;
		Ok(self.position as u64)
	}

	/// Returns a contiguous copy of the live region `[0, length)`.
	pub fn to_array(&self) -> Vec<u8> {
		let mut out = vec![0u8; self.length];
		self.read_logical_range(0, &mut out);
		out
	}

	/// Copies `[0, length)` to `other` without disturbing this stream's position.
	pub fn write_to<W: std::io::Write>(&self, other: &mut W) -> Result<()> {
		let mut pos = 0usize;
		let mut buf = vec![0u8; DEFAULT_SEGMENT_SIZE];
		while pos < self.length {
			let n = (self.length - pos).min(buf.len());
			self.read_logical_range(pos, &mut buf[..n]);
			other.write_all(&buf[..n])?;
			pos += n;
		}
		Ok(())
	}

	/// Copies from the current position to the end of the stream into `dest`, in
	/// chunks no larger than `buf_size`. Advances this stream's position to its
	/// length.
	pub fn copy_to<W: std::io::Write>(&mut self, dest: &mut W, buf_size: usize) -> Result<u64> {
		self.check_open()?;
		let mut total = 0u64;
		let mut buf = vec![0u8; buf_size.max(1)];
		loop {
			let n = self.read(&mut buf)?;
			if n == 0 {
				break;
			}
			dest.write_all(&buf[..n])?;
			total += n as u64;
		}
		Ok(total)
	}

	/// Copies from the current position to the end of the stream into `dest`. If
	/// `dest` is backed by ordinary synchronous memory (any blanket
	/// [`AsyncSink`] impl over `std::io::Write`), the copy runs synchronously and
	/// the returned future is already complete; a destination with a genuinely
	/// asynchronous [`AsyncSink`] impl is awaited chunk by chunk.
	///
	/// `cancel` is polled once per chunk, at the yield point right after the
	/// previous chunk's write completes; setting it from another thread stops the
	/// copy before the next chunk is read, surfacing [`SegError::Cancelled`]. Pass
	/// an `AtomicBool` that never becomes `true` if the copy should always run to
	/// completion.
	pub fn copy_to_async<'a>(
		&'a mut self,
		dest: &'a mut (dyn AsyncSink + 'a),
		buf_size: usize,
		cancel: &'a AtomicBool,
	) -> Pin<Box<dyn Future<Output = Result<u64>> + 'a>> {
		Box::pin(async move {
			self.check_open()?;
			let mut total = 0u64;
			let mut buf = vec![0u8; buf_size.max(1)];
			loop {
				if cancel.load(Ordering::Relaxed) {
					return Err(SegError::Cancelled);
				}
				let n = self.read(&mut buf)?;
				if n == 0 {
					break;
				}
				dest.write_chunk(&buf[..n]).await?;
				total += n as u64;
			}
			Ok(total)
		})
	}

	/// Returns every owned segment to the pool under the configured zeroing policy
	/// and marks the stream closed. Idempotent: a second call is a no-op, and no
	/// segment is ever returned twice.
	pub fn dispose(&mut self) {
		if self.disposed {
			return;
		}
		self.release_segments_from(0);
		self.length = 0;
		self.position = 0;
		self.disposed = true;
		pool().mark_stream_disposed();
		log::trace!("disposed segment stream, segments returned to the pool");
	}
}

impl Drop for SegmentStream {
	fn drop(&mut self) {
		self.dispose();
	}
}

impl std::io::Read for SegmentStream {
	fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
		SegmentStream::read(self, buf).map_err(Into::into)
	}
}

impl std::io::Write for SegmentStream {
	fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
		SegmentStream::write(self, buf).map_err(Into::into)
	}

	fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
}

impl std::io::Seek for SegmentStream {
	fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
		SegmentStream::seek(self, pos).map_err(Into::into)
	}
}

/// The seam a genuinely asynchronous `copy_to_async` destination implements.
///
/// Any ordinary `std::io::Write` gets a blanket implementation that performs the
/// write synchronously and wraps the result in an already-ready future, matching the
/// "asynchronous methods that are truly synchronous" pattern used throughout this
/// crate's public API.
pub trait AsyncSink {
	fn write_chunk<'a>(&'a mut self, chunk: &'a [u8]) -> Pin<Box<dyn Future<Output = std::io::Result<()>> + 'a>>;
}

impl<W: std::io::Write + ?Sized> AsyncSink for W {
	fn write_chunk<'a>(&'a mut self, chunk: &'a [u8]) -> Pin<Box<dyn Future<Output = std::io::Result<()>> + 'a>> {
		let result = self.write_all(chunk);
		Box::pin(std::future::ready(result))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::{Read as _, Seek as _, Write as _};

	#[test]
	fn scenario_basic_round_trip() {
		let mut s = SegmentStream::new().unwrap();
		s.write(&[1, 2, 3, 4, 5]).unwrap();
		s.seek(SeekFrom::Start(0)).unwrap();
		let mut buf = [0u8; 5];
		let n = s.read(&mut buf).unwrap();
		assert_eq!(n, 5);
		assert_eq!(buf, [1, 2, 3, 4, 5]);
		assert_eq!(s.position(), 5);
		assert_eq!(s.length(), 5);
	}

	#[test]
	fn scenario_seek_past_end_zeros_the_gap() {
		let mut s = SegmentStream::new().unwrap();
		s.write(&[7, 7, 7]).unwrap();
		s.seek(SeekFrom::Start(10)).unwrap();
		s.write(&[9]).unwrap();

		s.seek(SeekFrom::Start(0)).unwrap();
		let mut buf = [0u8; 11];
		let n = s.read(&mut buf).unwrap();
		assert_eq!(n, 11);
		assert_eq!(buf, [7, 7, 7, 0, 0, 0, 0, 0, 0, 0, 9]);
		assert_eq!(s.length(), 11);
	}

	#[test]
	fn scenario_maximum_capacity_is_enforced() {
		let options = StreamOptions::default().set_maximum_capacity(DEFAULT_SEGMENT_SIZE * 2);
		let mut s = SegmentStream::with_options(options).unwrap();
		let payload = vec![1u8; DEFAULT_SEGMENT_SIZE * 2];
		s.write(&payload).unwrap();

		let err = s.write(&[1]).unwrap_err();
		assert!(matches!(err, SegError::OutOfCapacity { .. }));
	}

	#[test]
	fn scenario_none_zero_policy_still_zeroes_logical_gaps() {
		let options = StreamOptions::default().set_zero_behavior(crate::settings::ZeroBufferBehavior::None);
		let first_len;
		{
			let mut s1 = SegmentStream::with_options(options).unwrap();
			s1.write(&vec![0xAB; 4096]).unwrap();
			first_len = s1.length();
			// s1 drops here, returning its segments to the pool unzeroed.
		}

		let mut s2 = SegmentStream::with_options(options).unwrap();
		s2.set_length(first_len).unwrap();
		let mut buf = vec![0xFFu8; first_len];
		s2.seek(SeekFrom::Start(0)).unwrap();
		s2.read(&mut buf).unwrap();
		assert!(buf.iter().all(|&b| b == 0), "gap bytes must read as zero regardless of pool zero policy");
	}

	#[test]
	fn dispose_is_idempotent() {
		let mut s = SegmentStream::new().unwrap();
		s.write(&[1, 2, 3]).unwrap();
		s.dispose();
		s.dispose();
		assert!(s.is_disposed());
		assert!(matches!(s.write(&[1]), Err(SegError::ObjectDisposed)));
	}

	#[test]
	fn to_array_and_write_to_agree() {
		let mut s = SegmentStream::new().unwrap();
		s.write(b"hello world").unwrap();
		assert_eq!(s.to_array(), b"hello world");

		let mut sink = Vec::new();
		s.write_to(&mut sink).unwrap();
		assert_eq!(sink, b"hello world");
	}

	#[test]
	fn copy_to_drains_from_current_position() {
		let mut s = SegmentStream::new().unwrap();
		s.write(b"0123456789").unwrap();
		s.seek(SeekFrom::Start(5)).unwrap();

		let mut sink = Vec::new();
		let n = s.copy_to(&mut sink, 3).unwrap();
		assert_eq!(n, 5);
		assert_eq!(sink, b"56789");
		assert_eq!(s.position(), s.length());
	}

	#[test]
	fn zero_length_reads_and_writes_are_noops() {
		let mut s = SegmentStream::new().unwrap();
		assert_eq!(s.write(&[]).unwrap(), 0);
		assert_eq!(s.read(&mut []).unwrap(), 0);
		assert_eq!(s.length(), 0);
	}

	#[test]
	fn set_length_zero_truncates_without_failing() {
		let mut s = SegmentStream::new().unwrap();
		s.write(b"some data").unwrap();
		s.set_length(0).unwrap();
		assert_eq!(s.length(), 0);
	}

	#[test]
	fn std_io_traits_compose_with_io_copy() {
		let mut s = SegmentStream::new().unwrap();
		std::io::Write::write_all(&mut s, b"via std::io::Write").unwrap();
		s.seek(SeekFrom::Start(0)).unwrap();
		let mut out = String::new();
		std::io::Read::read_to_string(&mut s, &mut out).unwrap();
		assert_eq!(out, "via std::io::Write");
	}
}
