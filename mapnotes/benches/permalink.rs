//! Benchmarks du codec de permalien et de la reprojection de vue

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mapnotes::permalink::{decode, encode};
use mapnotes::projection::{ensure_projection, ViewState};
use mapnotes::{LayerDescriptor, LonLat, Projection};

const FRAGMENTS: &[&str] = &[
    "#10.50000,20.25000,3.00,2024-01-01,gibs:MODIS_Terra_CorrectedReflectance_TrueColor,EPSG:3857",
    "#-122.41940,37.77490,12.50,,osm,EPSG:3857",
    "#,,,,,EPSG:4326",
    "#abc,NaN,inf,,layer,EPSG:9999",
    "",
];

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("permalink_decode");
    for fragment in FRAGMENTS {
        group.throughput(Throughput::Bytes(fragment.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fragment), fragment, |b, f| {
            b.iter(|| black_box(decode(black_box(f))))
        });
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    c.bench_function("permalink_encode", |b| {
        b.iter(|| {
            black_box(encode(
                black_box(Some(LonLat::new(10.5, 20.25))),
                black_box(Some(3.0)),
                Some("2024-01-01"),
                Some("gibs:MODIS_Terra_CorrectedReflectance_TrueColor"),
                Some(Projection::WebMercator),
            ))
        })
    });
}

fn bench_ensure_projection(c: &mut Criterion) {
    let target = LayerDescriptor {
        layer_key: "modis".to_string(),
        title: String::new(),
        body_id: "earth".to_string(),
        projection: Projection::Geographic,
        tile_template: "{z}/{x}/{y}".to_string(),
        requires_date: true,
        default_date: None,
        min_zoom: None,
        max_zoom: Some(9.0),
    };
    let view = ViewState::new(Projection::WebMercator, LonLat::new(2.35, 48.85), 12.0);

    c.bench_function("ensure_projection_3857_to_4326", |b| {
        b.iter(|| black_box(ensure_projection(black_box(&view), &target, true)))
    });
}

criterion_group!(benches, bench_decode, bench_encode, bench_ensure_projection);
criterion_main!(benches);
