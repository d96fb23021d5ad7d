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

//! Pinned native memory for [`BufferGroup`](crate::group::BufferGroup)s created while
//! native buffers are enabled. Split by platform the same way `mimalloc-rs`'s `os`
//! module splits `mmap`/`munmap` from `VirtualAlloc`/`VirtualFree` in this pack.

use crate::error::SegError;

cfg_if::cfg_if! {
	if #[cfg(not(windows))] {
		/// Reserves and commits `len` bytes of anonymous, zero-initialized memory.
		pub fn alloc(len: usize) -> Result<*mut u8, SegError> {
			// SAFETY: a fixed, valid set of flags for an anonymous private mapping;
			// the returned pointer is checked against MAP_FAILED before use.
			let ptr = unsafe {
				libc::mmap(
					std::ptr::null_mut(),
					len,
					libc::PROT_READ | libc::PROT_WRITE,
					libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
					-1,
					0,
				)
			};
			if ptr == libc::MAP_FAILED {
				return Err(SegError::out_of_capacity_from(std::io::Error::last_os_error()));
			}
			Ok(ptr as *mut u8)
		}

		/// Releases memory obtained from [`alloc`].
		pub fn free(ptr: *mut u8, len: usize) {
			// SAFETY: `ptr`/`len` are exactly those returned by a prior `alloc` call,
			// and the caller (the group) guarantees no live segment still refers to
			// this region.
			unsafe { libc::munmap(ptr as *mut libc::c_void, len) };
		}
	} else {
		use winapi::um::memoryapi::{VirtualAlloc, VirtualFree};
		use winapi::um::winnt::{MEM_COMMIT, MEM_RESERVE, MEM_RELEASE, PAGE_READWRITE};

		/// Reserves and commits `len` bytes of zero-initialized memory.
		pub fn alloc(len: usize) -> Result<*mut u8, SegError> {
			// SAFETY: fixed, valid flags for a committed read/write region; the
			// returned pointer is checked for null before use.
			let ptr = unsafe {
				VirtualAlloc(
					std::ptr::null_mut(),
					len,
					MEM_COMMIT | MEM_RESERVE,
					PAGE_READWRITE,
				)
			};
			if ptr.is_null() {
				return Err(SegError::out_of_capacity_from(std::io::Error::last_os_error()));
			}
			Ok(ptr as *mut u8)
		}

		/// Releases memory obtained from [`alloc`].
		pub fn free(ptr: *mut u8, _len: usize) {
			// SAFETY: `ptr` is exactly the value returned by a prior `alloc` call.
			unsafe { VirtualFree(ptr as _, 0, MEM_RELEASE) };
		}
	}
}
