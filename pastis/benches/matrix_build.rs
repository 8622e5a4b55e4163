use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use pastis::closed_loop::{ClosedLoop, ClosedLoopParams, DetectorNoise};
use pastis::forward_model::{ForwardModel, Reference};
use pastis::models::{LinearFieldModel, SyntheticLayout};
use pastis::requirements::PastisModes;
use pastis::{Calibration, MatrixMode, PastisMatrixBuilder};

fn make_model(num_modes: usize) -> LinearFieldModel {
    let layout = SyntheticLayout {
        num_modes,
        ..SyntheticLayout::default()
    };
    LinearFieldModel::synthetic(&layout, 42).unwrap()
}

fn bench_matrix_build(c: &mut Criterion) {
    let model = make_model(36);

    let mut group = c.benchmark_group("matrix_build");
    group.sample_size(20);
    group.bench_function("intensity_36_modes", |b| {
        b.iter(|| {
            PastisMatrixBuilder::new(black_box(&model), Calibration::default())
                .mode(MatrixMode::Intensity)
                .build()
                .unwrap()
        })
    });
    group.bench_function("field_36_modes", |b| {
        b.iter(|| {
            PastisMatrixBuilder::new(black_box(&model), Calibration::default())
                .mode(MatrixMode::Field)
                .build()
                .unwrap()
        })
    });
    group.finish();
}

fn bench_requirements(c: &mut Criterion) {
    let model = make_model(120);
    let matrix = PastisMatrixBuilder::new(&model, Calibration::default())
        .mode(MatrixMode::Field)
        .build()
        .unwrap()
        .matrix;

    c.bench_function("pastis_modes_120", |b| {
        b.iter(|| PastisModes::from_matrix(black_box(&matrix)).unwrap())
    });
}

fn bench_closed_loop(c: &mut Criterion) {
    let model = make_model(36);
    let reference = Reference::compute(&model).unwrap();
    let params = ClosedLoopParams {
        exposure_time: 1.0,
        flux: 1e10,
        iterations: 50,
        seed: 1,
        science_noise: DetectorNoise::Uniform(0.0),
        sensor_noise: DetectorNoise::Uniform(1.0),
    };
    let closed_loop = ClosedLoop::new(
        model.science_jacobian(),
        model.sensor_jacobian(),
        model.dark_hole(),
        reference.norm,
        Array2::eye(model.num_modes()) * 1e-6,
        params,
    )
    .unwrap();

    let mut group = c.benchmark_group("closed_loop_50_iterations");
    group.bench_function("recursive", |b| {
        b.iter(|| black_box(&closed_loop).run_recursive().unwrap())
    });
    group.bench_function("batch", |b| {
        b.iter(|| black_box(&closed_loop).run_batch().unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_matrix_build, bench_requirements, bench_closed_loop);
criterion_main!(benches);
