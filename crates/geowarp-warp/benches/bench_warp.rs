use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use geowarp_raster::{RasterBuffer, RasterSize, Window, WorkingType};
use geowarp_warp::parallel::ExecutionStrategy;
use geowarp_warp::progress::ScaledProgress;
use geowarp_warp::raster_io::{MemRaster, RasterWriter};
use geowarp_warp::transformer::AffineTransformer;
use geowarp_warp::{ResampleAlg, WarpOperation, WarpOptions};

fn source(size: RasterSize) -> MemRaster {
    let data = (0..size.pixel_count() * 3).map(|i| (i % 251) as u8).collect();
    MemRaster::new(RasterBuffer::from_vec(WorkingType::Byte, size, 3, data).unwrap())
}

fn rotation(size: RasterSize) -> Arc<AffineTransformer> {
    let center = (size.width as f64 / 2.0, size.height as f64 / 2.0);
    Arc::new(AffineTransformer::rotation(center, center, 45.0, 1.0).unwrap())
}

fn bench_warp_kernel(c: &mut Criterion) {
    let mut group = c.benchmark_group("warp_kernel");
    let image_sizes = vec![(256, 224), (512, 448), (1024, 896)];

    for (width, height) in image_sizes {
        let size = RasterSize { width, height };
        let id = format!("{}x{}", width, height);
        let src = Arc::new(source(size));

        for alg in ResampleAlg::ALL {
            let mut options = WarpOptions::new(src.clone(), None, rotation(size));
            options.resample_alg = alg;
            let operation = WarpOperation::new(options).unwrap();
            let window = Window::full(size);
            let mut buffer = operation.create_destination_buffer(size).unwrap();

            group.bench_with_input(
                BenchmarkId::new(format!("{alg:?}"), &id),
                &operation,
                |b, op| {
                    b.iter(|| {
                        op.warp_region_to_buffer(
                            black_box(window),
                            &mut buffer,
                            None,
                            ScaledProgress::default(),
                        )
                    })
                },
            );
        }
    }
    group.finish();
}

fn bench_chunked_warp(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunked_warp");
    let size = RasterSize {
        width: 1024,
        height: 896,
    };
    let src = Arc::new(source(size));

    for execution in [ExecutionStrategy::Serial, ExecutionStrategy::ParallelChunks] {
        let dst: Arc<dyn RasterWriter> = Arc::new(MemRaster::zeros(WorkingType::Byte, size, 3));
        let mut options = WarpOptions::new(src.clone(), Some(dst), rotation(size));
        options.resample_alg = ResampleAlg::Bilinear;
        options.memory_limit = 256 * 1024;
        options.execution = execution;
        let operation = WarpOperation::new(options).unwrap();

        group.bench_with_input(
            BenchmarkId::new(format!("{execution:?}"), "1024x896"),
            &operation,
            |b, op| b.iter(|| op.chunk_and_warp_multi(black_box(Window::full(size)))),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_warp_kernel, bench_chunked_warp);
criterion_main!(benches);
