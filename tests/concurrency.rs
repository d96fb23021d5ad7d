// SPDX-License-Identifier: Apache-2.0

//! Two threads, each creating and tearing down many streams concurrently against the
//! shared process-wide pool, must never corrupt each other's data.

use std::io::{Read, Seek, SeekFrom, Write};
use std::thread;

use pretty_assertions::assert_eq;
use segstream::SegmentStream;

fn run_worker(seed: u64, streams: usize) {
	let mut state = seed.wrapping_mul(2_685_821_657) | 1;
	let mut next_rand = move || {
		state ^= state << 13;
		state ^= state >> 7;
		state ^= state << 17;
		state
	};

	for _ in 0..streams {
		let len = 1 + (next_rand() % 20_000) as usize;
		let payload: Vec<u8> = (0..len).map(|_| (next_rand() % 256) as u8).collect();

		let mut s = SegmentStream::new().unwrap();
		s.write(&payload).unwrap();
		assert_eq!(s.length(), len);

		s.seek(SeekFrom::Start(0)).unwrap();
		let mut read_back = vec![0u8; len];
		let n = s.read(&mut read_back).unwrap();
		assert_eq!(n, len);
		assert_eq!(read_back, payload, "stream contents must match what was written");

		s.dispose();
	}
}

#[test]
fn two_threads_1000_streams_each_no_corruption() {
	let a = thread::spawn(|| run_worker(1, 1000));
	let b = thread::spawn(|| run_worker(2, 1000));
	a.join().expect("worker A panicked");
	b.join().expect("worker B panicked");
}
