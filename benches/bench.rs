// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use criterion::*;
use marlu::{c64, Jones};

fn jones_operations(c: &mut Criterion) {
    let j = Jones::from([
        c64::new(1.0, -2.0),
        c64::new(5.0, -6.0),
        c64::new(3.0, -4.0),
        c64::new(7.0, -8.0),
    ]);
    let j2 = j * 2.0;
    let k = c64::new(0.6, 0.8);

    c.bench_function("brightness sandwich", |b| {
        b.iter(|| black_box(j * j2 * j.h()))
    });
    c.bench_function("phase application", |b| b.iter(|| black_box(j * k)));
}

fn work_unit_decomposition(c: &mut Criterion) {
    c.bench_function("work-unit decomposition", |b| {
        b.iter(|| {
            let mut acc = 0;
            for i in 0..1024_usize {
                acc += black_box(i) / 16 + black_box(i) % 16;
            }
            black_box(acc)
        })
    });
}

criterion_group!(benches, jones_operations, work_unit_decomposition);
criterion_main!(benches);
