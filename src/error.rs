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

use std::error;
use std::fmt;

/// The single error type returned from every fallible operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum SegError {
	/// A negative-would-be offset/count, an out-of-range seek, or a capacity set
	/// below the current length.
	#[error("invalid argument: {0}")]
	InvalidArgument(String),
	/// An operation was attempted on a disposed [`SegmentStream`](crate::stream::SegmentStream).
	#[error("operation on a disposed stream")]
	ObjectDisposed,
	/// An operation forbidden by the stream or pool's current state, such as
	/// changing a sealed global setting after any stream has been created.
	#[error("invalid operation: {0}")]
	InvalidOperation(String),
	/// The pool could not satisfy a rental, or a stream could not grow to the
	/// required size.
	#[error("out of capacity")]
	OutOfCapacity {
		#[source]
		source: Option<Box<dyn error::Error + Send + Sync>>,
	},
	/// A feature reserved for fixed-mode streams was requested on a dynamic-mode
	/// stream.
	#[error("not supported: {0}")]
	NotSupported(&'static str),
	/// A `std::io` operation on a destination/source passed to `copy_to`/`write_to`
	/// failed.
	#[error("i/o error: {0}")]
	Io(#[from] std::io::Error),
	/// A caller-provided cancellation signal was observed set partway through
	/// [`copy_to_async`](crate::stream::SegmentStream::copy_to_async).
	#[error("copy cancelled")]
	Cancelled,
}

impl SegError {
	pub(crate) fn invalid_argument(msg: impl fmt::Display) -> Self {
		Self::InvalidArgument(msg.to_string())
	}

	pub(crate) fn invalid_operation(msg: impl fmt::Display) -> Self {
		Self::InvalidOperation(msg.to_string())
	}

	pub(crate) fn out_of_capacity() -> Self {
		Self::OutOfCapacity { source: None }
	}

	pub(crate) fn out_of_capacity_from(source: impl error::Error + Send + Sync + 'static) -> Self {
		Self::OutOfCapacity { source: Some(Box::new(source)) }
	}
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SegError>;

impl From<SegError> for std::io::Error {
	fn from(err: SegError) -> Self {
		use std::io::ErrorKind;
		if let SegError::Io(inner) = err {
			return inner;
		}
		let kind = match &err {
			SegError::InvalidArgument(_) => ErrorKind::InvalidInput,
			SegError::ObjectDisposed => ErrorKind::Other,
			SegError::InvalidOperation(_) => ErrorKind::Other,
			SegError::OutOfCapacity { .. } => ErrorKind::OutOfMemory,
			SegError::NotSupported(_) => ErrorKind::Unsupported,
			SegError::Cancelled => ErrorKind::Interrupted,
			SegError::Io(_) => unreachable!("handled above"),
		};
		std::io::Error::new(kind, err)
	}
}
