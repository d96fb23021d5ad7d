// SPDX-License-Identifier: Apache-2.0

use std::io::{Read, Seek, SeekFrom, Write};

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use segstream::{SegmentStream, StreamOptions};

const CHUNK: &[u8] = &[0xAB; 4096];

fn write_sequential(c: &mut Criterion) {
	c.bench_function("write_1mb_sequential", |b| {
		b.iter_batched(
			|| SegmentStream::new().unwrap(),
			|mut s| {
				for _ in 0..256 {
					s.write(black_box(CHUNK)).unwrap();
				}
				s
			},
			BatchSize::SmallInput,
		)
	});
}

fn write_then_read_back(c: &mut Criterion) {
	c.bench_function("write_then_read_1mb", |b| {
		b.iter_batched(
			|| {
				let mut s = SegmentStream::new().unwrap();
				for _ in 0..256 {
					s.write(CHUNK).unwrap();
				}
				s
			},
			|mut s| {
				s.seek(SeekFrom::Start(0)).unwrap();
				let mut buf = [0u8; 4096];
				while s.read(&mut buf).unwrap() > 0 {
					black_box(&buf);
				}
			},
			BatchSize::SmallInput,
		)
	});
}

fn seek_gap_write(c: &mut Criterion) {
	c.bench_function("seek_past_end_then_write", |b| {
		b.iter_batched(
			|| SegmentStream::with_options(StreamOptions::default()).unwrap(),
			|mut s| {
				s.seek(SeekFrom::Start(1_000_000)).unwrap();
				s.write(&[1]).unwrap();
			},
			BatchSize::SmallInput,
		)
	});
}

criterion_group!(benches, write_sequential, write_then_read_back, seek_gap_write);
criterion_main!(benches);
