// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use seismic_fdtd::{
    ricker, Acquisition, Boundary, CpmlSettings, FdtdSolver, Medium, Physics, Receiver,
    ReceiverField, Shot, Source, SourceFlag,
};

fn homogeneous(n: usize, elastic: bool) -> Medium {
    let h = 10.0;
    let rho = vec![2000.0; n * n];
    if elastic {
        let mu = vec![2.0e9; n * n];
        let lam = vec![4.0e9; n * n];
        Medium::elastic(n, n, h, h, lam, mu, rho).unwrap()
    } else {
        Medium::from_velocity(n, n, h, h, vec![2000.0; n * n], rho).unwrap()
    }
}

fn make_solver(n: usize, nt: usize, shots: usize, threads: usize, elastic: bool) -> FdtdSolver {
    let dt = 2.0e-3;
    let extent = (n - 1) as f64 * 10.0;
    let mut solver = FdtdSolver::new(homogeneous(n, elastic), dt, nt)
        .unwrap()
        .with_boundary(Boundary::Cpml(CpmlSettings {
            thickness: 20,
            ..CpmlSettings::default()
        }))
        .unwrap()
        .with_threads(threads);
    if elastic {
        solver = solver.with_physics(Physics::Elastic).unwrap();
    }
    let acq = Acquisition {
        shots: (0..shots)
            .map(|i| Shot {
                sources: vec![Source {
                    x: extent * (i + 1) as f64 / (shots + 1) as f64,
                    z: extent * 0.1,
                    flag: SourceFlag::Pressure,
                }],
                receivers: (0..32)
                    .map(|r| Receiver {
                        x: extent * (r + 1) as f64 / 33.0,
                        z: extent * 0.9,
                    })
                    .collect(),
                record: ReceiverField::Pressure,
            })
            .collect(),
    };
    solver.update_acquisition(acq).unwrap();
    let wavelets = (0..shots).map(|_| vec![ricker(10.0, dt, nt)]).collect();
    solver.update_wavelets(wavelets).unwrap();
    solver
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Single-shot acoustic baseline: 256^2 physical cells, 500 steps, 1 thread.
fn bench_acoustic_single_shot(c: &mut Criterion) {
    c.bench_function("acoustic_256x256_1shot", |b| {
        b.iter_with_setup(
            || make_solver(256, 500, 1, 1, false),
            |mut solver| {
                solver.run().unwrap();
                black_box(solver)
            },
        );
    });
}

/// Shot scaling: 8 shots on 128^2 with varying worker counts.
fn bench_shot_scaling(c: &mut Criterion) {
    let cpus = num_cpus();
    let mut group = c.benchmark_group("shot_scaling_128x128_8shots");
    for &threads in &[1, 2, 4, 8] {
        if threads <= cpus {
            group.bench_function(format!("{}threads", threads), |b| {
                b.iter_with_setup(
                    || make_solver(128, 300, 8, threads, false),
                    |mut solver| {
                        solver.run().unwrap();
                        black_box(solver)
                    },
                );
            });
        }
    }
    group.finish();
}

/// Elastic baseline: 128^2 physical cells, 300 steps, 1 thread.
fn bench_elastic_single_shot(c: &mut Criterion) {
    c.bench_function("elastic_128x128_1shot", |b| {
        b.iter_with_setup(
            || make_solver(128, 300, 1, 1, true),
            |mut solver| {
                solver.run().unwrap();
                black_box(solver)
            },
        );
    });
}

/// Gradient cost relative to the forward pass: 96^2, 200 steps.
fn bench_gradient(c: &mut Criterion) {
    c.bench_function("gradient_96x96_1shot", |b| {
        b.iter_with_setup(
            || {
                let mut observed_from = make_solver(96, 200, 1, 1, false);
                let observed = observed_from.run().unwrap();
                (make_solver(96, 200, 1, 1, false), observed)
            },
            |(mut solver, observed)| {
                solver.run_gradient(&observed).unwrap();
                black_box(solver)
            },
        );
    });
}

criterion_group!(
    benches,
    bench_acoustic_single_shot,
    bench_shot_scaling,
    bench_elastic_single_shot,
    bench_gradient,
);
criterion_main!(benches);
