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

//! Lock-free compare-and-swap helpers shared by the free-slot bitmaps in
//! [`group`](crate::group). Every helper is wait-free per step and makes no syscalls;
//! progress only requires that some thread on the location is making progress.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// A fixed-width atomic word the bitmap helpers can operate on.
///
/// Sealed: only [`AtomicU32`] and [`AtomicU64`] implement it.
pub trait Word: word_sealed::Sealed {
	type Value: Copy + PartialEq;

	fn load(&self, order: Ordering) -> Self::Value;
	fn fetch_or(&self, mask: Self::Value, order: Ordering) -> Self::Value;
	fn fetch_and(&self, mask: Self::Value, order: Ordering) -> Self::Value;
	fn compare_exchange_weak(
		&self,
		current: Self::Value,
		new: Self::Value,
		success: Ordering,
		failure: Ordering,
	) -> Result<Self::Value, Self::Value>;
	fn xor_value(a: Self::Value, b: Self::Value) -> Self::Value;
	fn and_value(a: Self::Value, b: Self::Value) -> Self::Value;
	fn or_value(a: Self::Value, b: Self::Value) -> Self::Value;
	fn not_value(a: Self::Value) -> Self::Value;
}

mod word_sealed {
	pub trait Sealed {}
	impl Sealed for super::AtomicU32 {}
	impl Sealed for super::AtomicU64 {}
}

macro_rules! impl_word {
	($atomic:ty, $value:ty) => {
		impl Word for $atomic {
			type Value = $value;

			#[inline]
			fn load(&self, order: Ordering) -> Self::Value { <$atomic>::load(self, order) }

			#[inline]
			fn fetch_or(&self, mask: Self::Value, order: Ordering) -> Self::Value {
				<$atomic>::fetch_or(self, mask, order)
			}

			#[inline]
			fn fetch_and(&self, mask: Self::Value, order: Ordering) -> Self::Value {
				<$atomic>::fetch_and(self, mask, order)
			}

			#[inline]
			fn compare_exchange_weak(
				&self,
				current: Self::Value,
				new: Self::Value,
				success: Ordering,
				failure: Ordering,
			) -> Result<Self::Value, Self::Value> {
				<$atomic>::compare_exchange_weak(self, current, new, success, failure)
			}

			#[inline]
			fn xor_value(a: Self::Value, b: Self::Value) -> Self::Value { a ^ b }
			#[inline]
			fn and_value(a: Self::Value, b: Self::Value) -> Self::Value { a & b }
			#[inline]
			fn or_value(a: Self::Value, b: Self::Value) -> Self::Value { a | b }
			#[inline]
			fn not_value(a: Self::Value) -> Self::Value { !a }
		}
	};
}

impl_word!(AtomicU32, u32);
impl_word!(AtomicU64, u64);

/// Unconditional XOR: `new = old ^ value`. Always a CAS loop; there is no native
/// atomic-xor-and-fetch on most targets that also reports the previous value.
pub fn xor<W: Word>(loc: &W, value: W::Value) -> (W::Value, W::Value) {
	let mut old = loc.load(Ordering::Acquire);
	loop {
		let new = W::xor_value(old, value);
		match loc.compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Acquire) {
			Ok(_) => return (old, new),
			Err(observed) => old = observed,
		}
	}
}

/// Sets the bits in `mask`, returning `(old, new)`. Uses a native atomic-or, which is
/// idempotent and needs no retry loop.
pub fn set_bits<W: Word>(loc: &W, mask: W::Value) -> (W::Value, W::Value) {
	let old = loc.fetch_or(mask, Ordering::AcqRel);
	(old, W::or_value(old, mask))
}

/// Clears the bits in `mask`, returning `(old, new)`. Implemented as a single
/// atomic-and with the complement of the mask.
pub fn clear_bits<W: Word>(loc: &W, mask: W::Value) -> (W::Value, W::Value) {
	let not_mask = W::not_value(mask);
	let old = loc.fetch_and(not_mask, Ordering::AcqRel);
	(old, W::and_value(old, not_mask))
}

/// Conditional XOR: if `pred(old)` is false, returns `(old, old)` without writing.
/// Otherwise computes `new = old ^ value` and attempts the CAS, retrying on
/// contention until either the predicate fails or the CAS succeeds.
pub fn condition_xor<W: Word>(
	loc: &W,
	mut pred: impl FnMut(W::Value) -> bool,
	value: W::Value,
) -> (W::Value, W::Value) {
	let mut old = loc.load(Ordering::Acquire);
	loop {
		if !pred(old) {
			return (old, old);
		}
		let new = W::xor_value(old, value);
		match loc.compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Acquire) {
			Ok(_) => return (old, new),
			Err(observed) => old = observed,
		}
	}
}

/// Conditional OR, see [`condition_xor`].
pub fn condition_or<W: Word>(
	loc: &W,
	mut pred: impl FnMut(W::Value) -> bool,
	value: W::Value,
) -> (W::Value, W::Value) {
	let mut old = loc.load(Ordering::Acquire);
	loop {
		if !pred(old) {
			return (old, old);
		}
		let new = W::or_value(old, value);
		match loc.compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Acquire) {
			Ok(_) => return (old, new),
			Err(observed) => old = observed,
		}
	}
}

/// Conditional AND. The spec's upstream analog computes `original ^ value` here,
/// which is a documented bug; this implementation computes the intended
/// `original & value`.
pub fn condition_and<W: Word>(
	loc: &W,
	mut pred: impl FnMut(W::Value) -> bool,
	value: W::Value,
) -> (W::Value, W::Value) {
	let mut old = loc.load(Ordering::Acquire);
	loop {
		if !pred(old) {
			return (old, old);
		}
		let new = W::and_value(old, value);
		match loc.compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Acquire) {
			Ok(_) => return (old, new),
			Err(observed) => old = observed,
		}
	}
}

/// Conditional OR taking an explicit captured argument instead of a closure, to avoid
/// allocating a boxed closure on the pool's hot path.
pub fn condition_or_with<W: Word, A>(
	loc: &W,
	pred: fn(W::Value, &A) -> bool,
	arg: &A,
	value: W::Value,
) -> (W::Value, W::Value) {
	condition_or(loc, |old| pred(old, arg), value)
}

/// Conditional AND taking an explicit captured argument; see [`condition_or_with`].
pub fn condition_and_with<W: Word, A>(
	loc: &W,
	pred: fn(W::Value, &A) -> bool,
	arg: &A,
	value: W::Value,
) -> (W::Value, W::Value) {
	condition_and(loc, |old| pred(old, arg), value)
}

/// Conditional XOR taking an explicit captured argument; see [`condition_or_with`].
pub fn condition_xor_with<W: Word, A>(
	loc: &W,
	pred: fn(W::Value, &A) -> bool,
	arg: &A,
	value: W::Value,
) -> (W::Value, W::Value) {
	condition_xor(loc, |old| pred(old, arg), value)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::thread;

	#[test]
	fn set_bits_is_or() {
		let loc = AtomicU64::new(0b1010);
		let (old, new) = set_bits(&loc, 0b0101);
		assert_eq!(old, 0b1010);
		assert_eq!(new, 0b1111);
		assert_eq!(loc.load(Ordering::Relaxed), 0b1111);
	}

	#[test]
	fn clear_bits_is_and_not() {
		let loc = AtomicU64::new(0b1111);
		let (old, new) = clear_bits(&loc, 0b0101);
		assert_eq!(old, 0b1111);
		assert_eq!(new, 0b1010);
		assert_eq!(loc.load(Ordering::Relaxed), 0b1010);
	}

	#[test]
	fn xor_is_xor() {
		let loc = AtomicU64::new(0b1100);
		let (old, new) = xor(&loc, 0b1010);
		assert_eq!(old, 0b1100);
		assert_eq!(new, 0b0110);
	}

	#[test]
	fn condition_and_is_and() {
		// Regression test for the upstream XOR-instead-of-AND bug named in the spec.
		let loc = AtomicU64::new(0b1110);
		let (old, new) = condition_and(&loc, |v| v != 0, 0b1010);
		assert_eq!(old, 0b1110);
		assert_eq!(new, 0b1010, "condition_and must compute AND, not XOR");
	}

	#[test]
	fn condition_or_example_from_spec() {
		let loc = AtomicU64::new(0);
		let (old, new) = condition_or(&loc, |v| v == 0, 7);
		assert_eq!((old, new), (0, 7));
		assert_eq!(loc.load(Ordering::Relaxed), 7);

		let (old, new) = condition_or(&loc, |v| v == 0, 7);
		assert_eq!((old, new), (7, 7));
		assert_eq!(loc.load(Ordering::Relaxed), 7);
	}

	#[test]
	fn condition_false_pred_is_a_noop() {
		let loc = AtomicU64::new(5);
		let (old, new) = condition_xor(&loc, |v| v == 0, 0xFF);
		assert_eq!(old, 5);
		assert_eq!(new, 5);
		assert_eq!(loc.load(Ordering::Relaxed), 5);
	}

	#[test]
	fn concurrent_set_bits_converge() {
		let loc = Arc::new(AtomicU64::new(0));
		let a = {
			let loc = loc.clone();
			thread::spawn(move || {
				for _ in 0..1000 {
					set_bits(&loc, 0b01);
					clear_bits(&loc, 0b01);
				}
				set_bits(&loc, 0b01);
			})
		};
		let b = {
			let loc = loc.clone();
			thread::spawn(move || {
				for _ in 0..1000 {
					set_bits(&loc, 0b10);
					clear_bits(&loc, 0b10);
				}
				set_bits(&loc, 0b10);
			})
		};
		a.join().unwrap();
		b.join().unwrap();
		assert_eq!(loc.load(Ordering::Relaxed), 0b11);
	}
}
