// SPDX-License-Identifier: Apache-2.0

use std::io::{Read, Seek, SeekFrom, Write};

use pretty_assertions::assert_eq;
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use segstream::SegmentStream;

#[quickcheck]
fn write_then_seek_zero_then_read_round_trips(data: Vec<u8>) -> TestResult {
	if data.len() > 1024 * 1024 {
		return TestResult::discard();
	}

	let mut s = match SegmentStream::new() {
		Ok(s) => s,
		Err(e) => return TestResult::error(e.to_string()),
	};
	if let Err(e) = s.write(&data) {
		return TestResult::error(e.to_string());
	}
	if let Err(e) = s.seek(SeekFrom::Start(0)) {
		return TestResult::error(e.to_string());
	}

	let mut read_back = vec![0u8; data.len()];
	match s.read(&mut read_back) {
		Ok(n) if n == data.len() => TestResult::from_bool(read_back == data),
		Ok(_) => TestResult::failed(),
		Err(e) => TestResult::error(e.to_string()),
	}
}

#[quickcheck]
fn zero_length_write_and_read_are_noops(initial: Vec<u8>) -> TestResult {
	if initial.len() > 65536 {
		return TestResult::discard();
	}

	let mut s = SegmentStream::new().unwrap();
	s.write(&initial).unwrap();
	let before_len = s.length();
	let before_pos = s.position();

	assert_eq!(s.write(&[]).unwrap(), 0);
	assert_eq!(s.read(&mut []).unwrap(), 0);

	TestResult::from_bool(s.length() == before_len && s.position() == before_pos)
}

#[test]
fn set_length_zero_never_fails_and_clears_length() {
	let mut s = SegmentStream::new().unwrap();
	s.write(b"some arbitrary payload").unwrap();
	s.set_length(0).unwrap();
	assert_eq!(s.length(), 0);
}

#[test]
fn capacity_at_maximum_succeeds_one_past_fails() {
	use segstream::StreamOptions;
	let max = 4096;
	let options = StreamOptions::default().set_maximum_capacity(max);
	let mut s = SegmentStream::with_options(options).unwrap();

	s.write(&vec![1u8; max]).unwrap();
	assert_eq!(s.length(), max);

	let err = s.write(&[1]).unwrap_err();
	assert!(matches!(err, segstream::SegError::OutOfCapacity { .. }));
}
