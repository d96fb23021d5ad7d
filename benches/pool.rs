// SPDX-License-Identifier: Apache-2.0

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use segstream::DEFAULT_SEGMENT_SIZE;

fn rent_release_single(c: &mut Criterion) {
	c.bench_function("rent_release_single_segment", |b| {
		b.iter(|| {
			let segs = black_box(segstream::pool()).rent(DEFAULT_SEGMENT_SIZE).unwrap();
			for seg in segs {
				segstream::pool().release(seg);
			}
		})
	});
}

fn rent_release_run(c: &mut Criterion) {
	let mut group = c.benchmark_group("rent_release_run");
	for &segments in &[4usize, 16, 64] {
		group.bench_function(format!("{segments}_segments"), |b| {
			b.iter(|| {
				let segs = segstream::pool().rent(segments * DEFAULT_SEGMENT_SIZE).unwrap();
				for seg in segs {
					segstream::pool().release(seg);
				}
			})
		});
	}
}

fn repeated_rent_release_cycles(c: &mut Criterion) {
	c.bench_function("1000_rent_release_cycles", |b| {
		b.iter(|| {
			for _ in 0..1000 {
				let segs = segstream::pool().rent(DEFAULT_SEGMENT_SIZE).unwrap();
				for seg in segs {
					segstream::pool().release(seg);
				}
			}
		})
	});
}

criterion_group!(benches, rent_release_single, rent_release_run, repeated_rent_release_cycles);
criterion_main!(benches);
