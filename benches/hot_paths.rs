use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use transit_access::braille::BrailleCanvas;
use transit_access::data::{cells_from, normalize_lines, parse_feature_collection, stations_from};
use transit_access::layers::{build_layers, StyleSet};
use transit_access::map::{Basemap, MapSurface, Viewport};
use transit_access::store::{InteractionState, LayerSink, StoreSnapshot};
use transit_access::style::MetricScale;

const LON: f64 = 114.0579;
const LAT: f64 = 22.5431;

/// A grid of square "hexagons" around the city center
fn cells_json(side: usize) -> String {
    let step = 0.004;
    let mut features = Vec::with_capacity(side * side);
    for i in 0..side {
        for j in 0..side {
            let x = LON - step * side as f64 / 2.0 + step * i as f64;
            let y = LAT - step * side as f64 / 2.0 + step * j as f64;
            features.push(format!(
                r#"{{"type": "Feature", "properties": {{"h3_id": "c{i}-{j}", "avg_walk_time_min": {walk}}},
                   "geometry": {{"type": "Polygon", "coordinates": [[[{x}, {y}], [{x2}, {y}], [{x2}, {y2}], [{x}, {y2}], [{x}, {y}]]]}}}}"#,
                walk = (i * 7 + j * 3) % 40,
                x2 = x + step,
                y2 = y + step,
            ));
        }
    }
    format!(r#"{{"type": "FeatureCollection", "features": [{}]}}"#, features.join(","))
}

fn lines_json(count: usize) -> String {
    let features: Vec<String> = (0..count)
        .map(|n| {
            let coords: Vec<String> = (0..50)
                .map(|k| format!("[{}, {}]", LON - 0.2 + k as f64 * 0.008, LAT - 0.1 + n as f64 * 0.01))
                .collect();
            format!(
                r#"{{"type": "Feature", "properties": {{"line_name": "{}号线"}},
                   "geometry": {{"type": "MultiLineString", "coordinates": [[{}], [{}]]}}}}"#,
                n + 1,
                coords.join(","),
                coords.join(",")
            )
        })
        .collect();
    format!(r#"{{"type": "FeatureCollection", "features": [{}]}}"#, features.join(","))
}

fn snapshot() -> StoreSnapshot {
    let cells = parse_feature_collection("cells", cells_json(100).into_bytes()).unwrap_or_else(|e| panic!("{e}"));
    let lines = parse_feature_collection("lines", lines_json(20).into_bytes()).unwrap_or_else(|e| panic!("{e}"));
    let stations = parse_feature_collection(
        "stations",
        br#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"name": "Futian"}, "geometry": {"type": "Point", "coordinates": [114.0579, 22.5431]}}
        ]}"#
        .to_vec(),
    )
    .unwrap_or_else(|e| panic!("{e}"));

    StoreSnapshot {
        cells: Some(Arc::new(cells_from(&cells))),
        stations: Some(Arc::new(stations_from(&stations))),
        fragments: Some(Arc::new(normalize_lines(&lines.features))),
        interaction: InteractionState::new(7),
        styles: StyleSet::default(),
    }
}

fn bench_normalize(c: &mut Criterion) {
    let lines = parse_feature_collection("lines", lines_json(20).into_bytes()).unwrap_or_else(|e| panic!("{e}"));
    c.bench_function("normalize_lines_20x2", |b| {
        b.iter(|| normalize_lines(black_box(&lines.features)))
    });
}

fn bench_metric(c: &mut Criterion) {
    let scale = MetricScale::default();
    c.bench_function("color_and_elevation_1k", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for i in 0..1000 {
                let v = Some(i as f64 * 0.04);
                acc += scale.color_for(black_box(v))[0] as f64;
                acc += scale.elevation_for(black_box(v), 1.5);
            }
            acc
        })
    });
}

fn bench_layers(c: &mut Criterion) {
    let snap = snapshot();
    c.bench_function("build_layers", |b| b.iter(|| build_layers(black_box(&snap))));

    let mut pitched = snap.clone();
    c.bench_function("publish_multiplier_change_10k_cells", |b| {
        let mut surface = MapSurface::new(Basemap::Streets, Arc::new(Vec::new()));
        let mut m = 1.0;
        b.iter(|| {
            m = if m >= 5.0 { 0.1 } else { m + 0.1 };
            pitched.interaction.extrusion_multiplier = m;
            surface.publish(build_layers(&pitched));
        })
    });
}

fn bench_render(c: &mut Criterion) {
    let snap = snapshot();
    let mut surface = MapSurface::new(Basemap::Streets, Arc::new(Vec::new()));
    surface.publish(build_layers(&snap));
    let viewport = Viewport::new(LON, LAT, 11.0, 320, 160).with_camera(55.0, -20.0);

    c.bench_function("render_10k_cells", |b| {
        b.iter(|| {
            let mut canvas = BrailleCanvas::new(160, 40);
            surface.render(&mut canvas, black_box(&viewport), None)
        })
    });
}

criterion_group!(benches, bench_normalize, bench_metric, bench_layers, bench_render);
criterion_main!(benches);
