use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::basemap::Basemap;
use super::geometry::{
    distance_to_segment, draw_circle, draw_line, draw_thick_line, fill_polygon, point_in_polygon, Rgb,
};
use super::projection::Viewport;
use crate::braille::BrailleCanvas;
use crate::data::{AccessibilityCell, LineFragment, LineString, Station};
use crate::layers::{LayerId, LayerKind, LayerSpec, LineStyle, StationStyle, SurfaceStyle, UpdateTrigger};
use crate::store::LayerSink;
use crate::style::Rgba;

/// Station names are drawn from this zoom on
const LABEL_MIN_ZOOM: f64 = 13.0;
const STATION_COLOR: Rgba = [240, 240, 240, 255];

/// A feature under the cursor: its layer and index into that layer's data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pick {
    pub layer: LayerId,
    pub index: usize,
}

/// A text label at a character position
pub type Label = (u16, u16, String);

#[derive(Debug, Clone, Copy, PartialEq)]
struct CellStyle {
    color: Rgba,
    elevation_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PathStyle {
    color: Rgba,
    width_px: f64,
    highlighted: bool,
}

#[derive(Debug)]
enum FeatureStyles {
    Cells(Vec<CellStyle>),
    Paths(Vec<PathStyle>),
    /// Every feature styled alike
    Uniform,
}

/// Per-feature styling evaluated for one published layer
#[derive(Debug)]
struct StyleCache {
    data_key: usize,
    triggers: Vec<UpdateTrigger>,
    styles: FeatureStyles,
}

impl StyleCache {
    fn compute(layer: &LayerSpec) -> Self {
        let styles = match &layer.kind {
            LayerKind::Surface { cells, style } => FeatureStyles::Cells(
                cells
                    .iter()
                    .map(|cell| CellStyle {
                        color: style.fill_color(cell),
                        elevation_m: if style.extruded { style.elevation(cell) } else { 0.0 },
                    })
                    .collect(),
            ),
            LayerKind::Lines { fragments, style } => FeatureStyles::Paths(
                fragments
                    .iter()
                    .map(|f| PathStyle {
                        color: style.color(f),
                        width_px: style.width(f),
                        highlighted: style.is_highlighted(f),
                    })
                    .collect(),
            ),
            LayerKind::Stations { .. } => FeatureStyles::Uniform,
        };
        Self {
            data_key: layer.data_key(),
            triggers: layer.update_triggers.clone(),
            styles,
        }
    }

    fn is_stale_for(&self, layer: &LayerSpec) -> bool {
        self.data_key != layer.data_key() || self.triggers != layer.update_triggers
    }
}

/// Terminal rendering surface for the published layer list.
///
/// Per-feature styles are cached per layer and only recomputed when the layer's
/// data or one of its update triggers changes.
pub struct MapSurface {
    basemap: Basemap,
    backdrop: Arc<Vec<LineString>>,
    layers: Vec<LayerSpec>,
    caches: HashMap<LayerId, StyleCache>,
    recomputes: u64,
    publishes: u64,
}

impl LayerSink for MapSurface {
    fn publish(&mut self, layers: Vec<LayerSpec>) {
        // Cached data keys stay meaningful because `self.layers` keeps the old
        // data alive until it is replaced below.
        self.caches.retain(|id, _| layers.iter().any(|l| l.id == *id));
        for layer in &layers {
            let stale = self
                .caches
                .get(&layer.id)
                .map_or(true, |cache| cache.is_stale_for(layer));
            if stale {
                self.caches.insert(layer.id, StyleCache::compute(layer));
                self.recomputes += 1;
                debug!(layer = layer.id.as_str(), features = layer.len(), "recomputed layer styles");
            }
        }
        self.layers = layers;
        self.publishes += 1;
    }
}

impl MapSurface {
    pub fn new(basemap: Basemap, backdrop: Arc<Vec<LineString>>) -> Self {
        Self {
            basemap,
            backdrop,
            layers: Vec::new(),
            caches: HashMap::new(),
            recomputes: 0,
            publishes: 0,
        }
    }

    pub fn basemap(&self) -> Basemap {
        self.basemap
    }

    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Number of times any layer's per-feature styles were evaluated
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }

    pub fn publish_count(&self) -> u64 {
        self.publishes
    }

    /// Render backdrop and visible layers, in list order, onto the canvas.
    /// Returns station labels in character coordinates.
    pub fn render(&self, canvas: &mut BrailleCanvas, viewport: &Viewport, hover: Option<Pick>) -> Vec<Label> {
        let mut labels = Vec::new();

        let backdrop = self.basemap.backdrop();
        for line in self.backdrop.iter() {
            draw_linestring(canvas, line, viewport, backdrop, false);
        }

        for layer in self.layers.iter().filter(|l| l.visible) {
            let Some(cache) = self.caches.get(&layer.id) else {
                continue;
            };
            let hovered = hover.filter(|p| p.layer == layer.id).map(|p| p.index);
            let tint = layer.auto_highlight.filter(|_| hovered.is_some());

            match (&layer.kind, &cache.styles) {
                (LayerKind::Surface { cells, style }, FeatureStyles::Cells(styles)) => {
                    self.draw_surface(canvas, viewport, cells, style, styles, hovered.zip(tint));
                }
                (LayerKind::Lines { fragments, .. }, FeatureStyles::Paths(styles)) => {
                    self.draw_paths(canvas, viewport, fragments, styles);
                }
                (LayerKind::Stations { stations, style }, _) => {
                    self.draw_stations(canvas, viewport, stations, style, hovered, &mut labels);
                }
                _ => {}
            }
        }

        labels
    }

    fn draw_surface(
        &self,
        canvas: &mut BrailleCanvas,
        viewport: &Viewport,
        cells: &[AccessibilityCell],
        style: &SurfaceStyle,
        styles: &[CellStyle],
        hovered: Option<(usize, Rgba)>,
    ) {
        // Back to front so nearer columns cover farther ones
        let mut order: Vec<(usize, f64)> = cells
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| {
                let (x, y, depth) = viewport.project_3d(cell.centroid.0, cell.centroid.1, 0.0);
                viewport.is_visible(x, y).then_some((i, depth))
            })
            .collect();
        order.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        for (i, _) in order {
            let cell = &cells[i];
            let Some(cs) = styles.get(i) else { continue };
            let color = match hovered {
                Some((index, tint)) if index == i => tint,
                _ => cs.color,
            };
            let fill = self.basemap.blend(color);

            for ring in &cell.rings {
                let top = project_ring(viewport, ring, cs.elevation_m);
                if cs.elevation_m > 0.0 && viewport.pitch > 0.0 {
                    // Column edge at the vertex nearest the bottom of the screen
                    if let Some((j, &(tx, ty))) = top.iter().enumerate().max_by_key(|(_, p)| p.1) {
                        let (lon, lat) = ring[j];
                        let (gx, gy) = viewport.project(lon, lat);
                        draw_line(canvas, gx, gy, tx, ty, shade(fill));
                    }
                }
                if style.wireframe {
                    draw_ring(canvas, &top, fill);
                } else {
                    fill_polygon(canvas, &top, fill);
                }
            }
        }
    }

    fn draw_paths(
        &self,
        canvas: &mut BrailleCanvas,
        viewport: &Viewport,
        fragments: &[LineFragment],
        styles: &[PathStyle],
    ) {
        // Highlighted paths last so they stay on top
        let (highlighted, normal): (Vec<_>, Vec<_>) = fragments
            .iter()
            .zip(styles)
            .partition(|(_, s)| s.highlighted);
        for (fragment, s) in normal.into_iter().chain(highlighted) {
            let thick = s.highlighted || s.width_px >= 5.0;
            draw_linestring(canvas, &fragment.path, viewport, self.basemap.blend(s.color), thick);
        }
    }

    fn draw_stations(
        &self,
        canvas: &mut BrailleCanvas,
        viewport: &Viewport,
        stations: &[Station],
        style: &StationStyle,
        hovered: Option<usize>,
        labels: &mut Vec<Label>,
    ) {
        let radius = marker_radius(style, viewport.zoom);
        for (i, station) in stations.iter().enumerate() {
            let (px, py) = viewport.project(station.position.0, station.position.1);
            if !viewport.is_visible(px, py) {
                continue;
            }
            let color = if hovered == Some(i) { style.highlight_color } else { STATION_COLOR };
            draw_circle(canvas, px, py, radius, self.basemap.blend(color));

            if viewport.zoom >= LABEL_MIN_ZOOM && px >= 0 && py >= 0 {
                let char_x = (px / 2) as u16;
                let char_y = (py / 4) as u16;
                if let Some(label_x) = char_x.checked_add(2) {
                    labels.push((label_x, char_y, station.display_name()));
                }
            }
        }
    }

    /// Topmost visible, pickable feature under a canvas pixel
    pub fn pick(&self, px: i32, py: i32, viewport: &Viewport) -> Option<Pick> {
        let (x, y) = (px as f64, py as f64);
        for layer in self.layers.iter().rev() {
            if !layer.visible || !layer.pickable {
                continue;
            }
            let Some(cache) = self.caches.get(&layer.id) else {
                continue;
            };
            let hit = match (&layer.kind, &cache.styles) {
                (LayerKind::Lines { fragments, style }, FeatureStyles::Paths(styles)) => {
                    pick_path(x, y, viewport, fragments, style, styles)
                }
                (LayerKind::Stations { stations, style }, _) => {
                    let radius = marker_radius(style, viewport.zoom) as f64 + 1.0;
                    nearest_within(stations.iter().map(|s| {
                        let p = viewport.project(s.position.0, s.position.1);
                        distance_to_segment(x, y, p, p)
                    }), radius)
                }
                (LayerKind::Surface { cells, .. }, FeatureStyles::Cells(styles)) => {
                    pick_cell(x, y, viewport, cells, styles)
                }
                _ => None,
            };
            if let Some(index) = hit {
                return Some(Pick { layer: layer.id, index });
            }
        }
        None
    }
}

/// Marker radius in braille pixels, growing with zoom inside the style's bounds
fn marker_radius(style: &StationStyle, zoom: f64) -> i32 {
    let size_px = (style.icon_size * 2f64.powf(zoom - 8.0)).clamp(style.min_size_px, style.max_size_px);
    (size_px / 16.0).round().max(1.0) as i32
}

fn shade(rgb: Rgb) -> Rgb {
    rgb.map(|c| (c as u16 * 3 / 5) as u8)
}

fn project_ring(viewport: &Viewport, ring: &[(f64, f64)], height_m: f64) -> Vec<(i32, i32)> {
    ring.iter()
        .map(|&(lon, lat)| {
            let (x, y, _) = viewport.project_3d(lon, lat, height_m);
            (x, y)
        })
        .collect()
}

fn draw_ring(canvas: &mut BrailleCanvas, points: &[(i32, i32)], rgb: Rgb) {
    for pair in points.windows(2) {
        draw_line(canvas, pair[0].0, pair[0].1, pair[1].0, pair[1].1, rgb);
    }
}

/// Draw a linestring, skipping segments whose bounds miss the viewport
fn draw_linestring(canvas: &mut BrailleCanvas, line: &LineString, viewport: &Viewport, rgb: Rgb, thick: bool) {
    if line.len() < 2 {
        return;
    }

    let mut prev: Option<(i32, i32)> = None;

    for &(lon, lat) in line {
        let (px, py) = viewport.project(lon, lat);

        if let Some((prev_x, prev_y)) = prev {
            if viewport.line_might_be_visible((prev_x, prev_y), (px, py)) {
                if thick {
                    draw_thick_line(canvas, prev_x, prev_y, px, py, rgb);
                } else {
                    draw_line(canvas, prev_x, prev_y, px, py, rgb);
                }
            }
        }

        prev = Some((px, py));
    }
}

fn nearest_within(distances: impl Iterator<Item = f64>, limit: f64) -> Option<usize> {
    distances
        .enumerate()
        .filter(|(_, d)| *d <= limit)
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        .map(|(i, _)| i)
}

fn pick_path(
    x: f64,
    y: f64,
    viewport: &Viewport,
    fragments: &[LineFragment],
    style: &LineStyle,
    styles: &[PathStyle],
) -> Option<usize> {
    let tolerance = (style.highlight_width_px / 2.0).max(2.0);
    nearest_within(
        fragments.iter().enumerate().map(|(i, f)| {
            let limit = styles.get(i).map_or(style.width_px, |s| s.width_px) / 2.0;
            let points: Vec<(i32, i32)> = f.path.iter().map(|&(lon, lat)| viewport.project(lon, lat)).collect();
            let d = points
                .windows(2)
                .map(|w| distance_to_segment(x, y, w[0], w[1]))
                .fold(f64::INFINITY, f64::min);
            // Thin paths still get a grabbable margin
            if d <= limit.max(2.0) {
                d
            } else {
                f64::INFINITY
            }
        }),
        tolerance,
    )
}

/// Nearest cell whose lifted top contains the pixel
fn pick_cell(x: f64, y: f64, viewport: &Viewport, cells: &[AccessibilityCell], styles: &[CellStyle]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, cell) in cells.iter().enumerate() {
        let height = styles.get(i).map_or(0.0, |s| s.elevation_m);
        let hit = cell
            .rings
            .iter()
            .any(|ring| point_in_polygon(x, y, &project_ring(viewport, ring, height)));
        if !hit {
            continue;
        }
        let (_, _, depth) = viewport.project_3d(cell.centroid.0, cell.centroid.1, height);
        if best.map_or(true, |(_, d)| depth < d) {
            best = Some((i, depth));
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{cells_from, normalize_lines, parse_feature_collection, stations_from, LineFragment, LineId};
    use geojson::JsonObject;
    use crate::layers::{build_layers, StyleSet};
    use crate::store::{InteractionState, StoreSnapshot};

    const LON: f64 = 114.0579;
    const LAT: f64 = 22.5431;

    fn collection(json: &str) -> geojson::FeatureCollection {
        parse_feature_collection("t.geojson", json.as_bytes().to_vec()).unwrap()
    }

    fn snapshot() -> StoreSnapshot {
        let cells = cells_from(&collection(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"h3_id": "c1", "avg_walk_time_min": 4.0},
                 "geometry": {"type": "Polygon", "coordinates": [[
                    [114.0479, 22.5331], [114.0679, 22.5331], [114.0679, 22.5531],
                    [114.0479, 22.5531], [114.0479, 22.5331]]]}}
            ]}"#,
        ));
        let stations = stations_from(&collection(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"name": "Futian"},
                 "geometry": {"type": "Point", "coordinates": [114.0579, 22.52]}}
            ]}"#,
        ));
        let fragments = normalize_lines(
            &collection(
                r#"{"type": "FeatureCollection", "features": [
                    {"type": "Feature", "properties": {"line_name": "1号线", "color": "ff00ff"},
                     "geometry": {"type": "LineString", "coordinates": [[114.03, 22.5431], [114.08, 22.5431]]}}
                ]}"#,
            )
            .features,
        );
        StoreSnapshot {
            cells: Some(Arc::new(cells)),
            stations: Some(Arc::new(stations)),
            fragments: Some(Arc::new(fragments)),
            interaction: InteractionState::new(7),
            styles: StyleSet::default(),
        }
    }

    fn flat_viewport() -> Viewport {
        Viewport::new(LON, LAT, 12.0, 200, 100)
    }

    fn surface_with(snapshot: &StoreSnapshot) -> MapSurface {
        let mut surface = MapSurface::new(Basemap::Streets, Arc::new(Vec::new()));
        surface.publish(build_layers(snapshot));
        surface
    }

    #[test]
    fn test_style_cache_reused_for_unrelated_changes() {
        let mut snap = snapshot();
        let mut surface = surface_with(&snap);
        assert_eq!(surface.recompute_count(), 3);

        snap.interaction.visibility.stations = false;
        surface.publish(build_layers(&snap));
        assert_eq!(surface.recompute_count(), 3);
        assert_eq!(surface.publish_count(), 2);
    }

    #[test]
    fn test_multiplier_change_recomputes_surface_only() {
        let mut snap = snapshot();
        let mut surface = surface_with(&snap);
        snap.interaction.extrusion_multiplier = 2.5;
        surface.publish(build_layers(&snap));
        assert_eq!(surface.recompute_count(), 4);

        snap.interaction.highlighted_line = Some(LineId::from("1号线"));
        surface.publish(build_layers(&snap));
        assert_eq!(surface.recompute_count(), 5);
    }

    #[test]
    fn test_new_data_recomputes() {
        let mut snap = snapshot();
        let mut surface = surface_with(&snap);
        let cells = snap.cells.as_ref().map(|c| Arc::new(Vec::clone(c)));
        snap.cells = cells;
        surface.publish(build_layers(&snap));
        assert_eq!(surface.recompute_count(), 4);
    }

    #[test]
    fn test_pick_prefers_topmost_layer() {
        let mut snap = snapshot();
        let vp = flat_viewport();
        let surface = surface_with(&snap);
        assert_eq!(
            surface.pick(100, 50, &vp),
            Some(Pick {
                layer: LayerId::Lines,
                index: 0
            })
        );

        snap.interaction.visibility.lines = false;
        let surface = surface_with(&snap);
        assert_eq!(
            surface.pick(100, 50, &vp),
            Some(Pick {
                layer: LayerId::Accessibility,
                index: 0
            })
        );
        assert_eq!(surface.pick(0, 0, &vp), None);
    }

    #[test]
    fn test_pick_station() {
        let surface = surface_with(&snapshot());
        let vp = flat_viewport();
        let (sx, sy) = vp.project(114.0579, 22.52);
        assert_eq!(
            surface.pick(sx, sy, &vp),
            Some(Pick {
                layer: LayerId::Stations,
                index: 0
            })
        );
    }

    #[test]
    fn test_render_draws_lines_over_cells() {
        let surface = surface_with(&snapshot());
        let vp = flat_viewport();
        let mut canvas = BrailleCanvas::new(100, 25);
        surface.render(&mut canvas, &vp, None);

        let (_, color) = canvas.cell(50, 12).expect("line pixel");
        assert_eq!(color, Basemap::Streets.blend([255, 0, 255, 200]));
        // Off the line but inside the cell
        let (_, color) = canvas.cell(48, 11).expect("cell pixel");
        let expected = StyleSet::default().metric.color_for(Some(4.0));
        assert_eq!(color, Basemap::Streets.blend(expected));
    }

    #[test]
    fn test_hidden_layers_are_not_drawn() {
        let mut snap = snapshot();
        snap.interaction.visibility.accessibility = false;
        snap.interaction.visibility.lines = false;
        let surface = surface_with(&snap);
        let mut canvas = BrailleCanvas::new(100, 25);
        surface.render(&mut canvas, &flat_viewport(), None);
        assert_eq!(canvas.cell(50, 12), None);
    }

    fn lines_only(path: Vec<(f64, f64)>) -> MapSurface {
        let fragment = LineFragment {
            parent: LineId::from("1号线"),
            path,
            properties: Arc::new(JsonObject::new()),
            feature_index: 0,
            segment_index: 0,
        };
        surface_with(&StoreSnapshot {
            cells: None,
            stations: None,
            fragments: Some(Arc::new(vec![fragment])),
            interaction: InteractionState::new(7),
            styles: StyleSet::default(),
        })
    }

    #[test]
    fn test_long_segment_crossing_view_is_drawn_at_street_zoom() {
        // Both vertices lie hundreds of dots off screen at zoom 18
        let surface = lines_only(vec![(LON - 0.02, LAT), (LON + 0.02, LAT)]);
        let vp = Viewport::new(LON, LAT, 18.0, 200, 100);
        let mut canvas = BrailleCanvas::new(100, 25);
        surface.render(&mut canvas, &vp, None);
        let drawn = (0..100).filter(|&col| canvas.cell(col, 12).is_some()).count();
        assert_eq!(drawn, 100);
    }

    #[test]
    fn test_vertex_projecting_out_of_range_does_not_panic() {
        let surface = lines_only(vec![(LON, LAT), (-1e12, 22.5)]);
        let mut canvas = BrailleCanvas::new(100, 25);
        surface.render(&mut canvas, &flat_viewport(), None);
        assert!(canvas.cell(50, 12).is_some());
    }

    #[test]
    fn test_marker_radius_bounds() {
        let style = StationStyle::default();
        assert_eq!(marker_radius(&style, 8.0), 1);
        assert_eq!(marker_radius(&style, 18.0), 6);
    }
}
