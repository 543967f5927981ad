pub mod loader;
pub mod normalize;

pub use loader::{DatasetLoader, DatasetSource, FsSource, LoadOutcome, LoadTicket};
pub use normalize::{fragment_counts, line_id_for, normalize_lines, LineFragment, LineId};

use anyhow::Result;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue, Value};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// A geographic line (sequence of lon/lat coordinates)
pub type LineString = Vec<(f64, f64)>;

/// The three independently loaded datasets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatasetKind {
    Cells,
    Stations,
    Lines,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 3] = [DatasetKind::Cells, DatasetKind::Stations, DatasetKind::Lines];

    pub fn index(self) -> usize {
        match self {
            DatasetKind::Cells => 0,
            DatasetKind::Stations => 1,
            DatasetKind::Lines => 2,
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DatasetKind::Cells => "accessibility cells",
            DatasetKind::Stations => "stations",
            DatasetKind::Lines => "transit lines",
        })
    }
}

/// Why a dataset could not be loaded. Never fatal: the dataset is treated as absent.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("{path} is not a GeoJSON FeatureCollection")]
    NotFeatureCollection { path: String },
}

/// Parse a FeatureCollection, converting each feature on its own.
/// A feature that fails to convert becomes an empty placeholder (no geometry, no
/// properties) rather than failing the document, so positions match the input.
pub fn parse_feature_collection(path: &str, mut bytes: Vec<u8>) -> Result<FeatureCollection, LoadError> {
    let value: JsonValue = simd_json::serde::from_slice(&mut bytes).map_err(|e| LoadError::Parse {
        path: path.to_string(),
        message: e.to_string(),
    })?;

    let not_fc = || LoadError::NotFeatureCollection {
        path: path.to_string(),
    };

    let JsonValue::Object(mut root) = value else {
        return Err(not_fc());
    };
    if root.get("type").and_then(|t| t.as_str()) != Some("FeatureCollection") {
        return Err(not_fc());
    }
    let Some(JsonValue::Array(raw)) = root.remove("features") else {
        return Err(not_fc());
    };

    let mut features = Vec::with_capacity(raw.len());
    let mut malformed = 0usize;
    for (index, value) in raw.into_iter().enumerate() {
        match Feature::from_json_value(value) {
            Ok(feature) => features.push(feature),
            Err(e) => {
                malformed += 1;
                debug!(path, index, error = %e, "blanking malformed feature");
                features.push(Feature {
                    bbox: None,
                    geometry: None,
                    id: None,
                    properties: None,
                    foreign_members: None,
                });
            }
        }
    }
    if malformed > 0 {
        warn!(path, malformed, total = features.len(), "malformed features left empty");
    }

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

/// Read a numeric property; null, missing and non-numeric all read as `None`
pub fn number_prop(props: Option<&JsonObject>, key: &str) -> Option<f64> {
    props.and_then(|p| p.get(key)).and_then(|v| v.as_f64())
}

/// Read a property as text, accepting numbers too. Empty strings read as `None`.
pub fn text_prop(props: Option<&JsonObject>, key: &str) -> Option<String> {
    match props.and_then(|p| p.get(key))? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A position is usable when it has at least lon/lat, both finite and on the globe
pub fn finite_xy(position: &[f64]) -> Option<(f64, f64)> {
    match position {
        [x, y, ..] if (-180.0..=180.0).contains(x) && (-90.0..=90.0).contains(y) => Some((*x, *y)),
        _ => None,
    }
}

/// One hexagonal accessibility bin
#[derive(Debug, Clone, PartialEq)]
pub struct AccessibilityCell {
    pub id: String,
    pub avg_walk_time_min: Option<f64>,
    pub avg_distance_m: Option<f64>,
    /// Exterior rings (one per polygon part)
    pub rings: Vec<LineString>,
    pub centroid: (f64, f64),
}

impl AccessibilityCell {
    /// Build a cell from a polygon feature. Non-polygon or empty geometry yields `None`.
    pub fn from_feature(feature: &Feature, index: usize) -> Option<Self> {
        let geometry = feature.geometry.as_ref()?;
        let rings: Vec<LineString> = match &geometry.value {
            Value::Polygon(rings) => rings.first().map(|r| ring_points(r)).into_iter().collect(),
            Value::MultiPolygon(polygons) => polygons
                .iter()
                .filter_map(|rings| rings.first())
                .map(|r| ring_points(r))
                .collect(),
            _ => return None,
        };
        let rings: Vec<LineString> = rings.into_iter().filter(|r| r.len() >= 3).collect();
        let centroid = ring_centroid(rings.first()?)?;

        let props = feature.properties.as_ref();
        let id = text_prop(props, "h3_id")
            .or_else(|| text_prop(props, "id"))
            .unwrap_or_else(|| format!("cell-{index}"));

        Some(Self {
            id,
            avg_walk_time_min: number_prop(props, "avg_walk_time_min"),
            avg_distance_m: number_prop(props, "avg_dist_to_subway_m"),
            rings,
            centroid,
        })
    }
}

fn ring_points<P: AsRef<[f64]>>(ring: &[P]) -> LineString {
    ring.iter().filter_map(|p| finite_xy(p.as_ref())).collect()
}

/// Vertex mean of a ring, ignoring a closing duplicate
fn ring_centroid(ring: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut points = ring;
    if points.len() >= 2 && points.first() == points.last() {
        points = &points[..points.len() - 1];
    }
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
    Some((sx / n, sy / n))
}

/// Convert every polygon feature into a cell
pub fn cells_from(fc: &FeatureCollection) -> Vec<AccessibilityCell> {
    fc.features
        .iter()
        .enumerate()
        .filter_map(|(i, f)| AccessibilityCell::from_feature(f, i))
        .collect()
}

/// Name fields tried in order when labelling a station
pub const STATION_NAME_KEYS: [&str; 3] = ["station_name_zh", "name", "Name"];
pub const STATION_FALLBACK_NAME: &str = "Metro station";

/// A metro station marker
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub position: (f64, f64),
    pub properties: JsonObject,
}

impl Station {
    pub fn from_feature(feature: &Feature) -> Option<Self> {
        let geometry = feature.geometry.as_ref()?;
        let Value::Point(coords) = &geometry.value else {
            return None;
        };
        let position = finite_xy(coords)?;
        Some(Self {
            position,
            properties: feature.properties.clone().unwrap_or_default(),
        })
    }

    /// First non-empty name field, else a generic label
    pub fn display_name(&self) -> String {
        STATION_NAME_KEYS
            .iter()
            .find_map(|key| text_prop(Some(&self.properties), key))
            .unwrap_or_else(|| STATION_FALLBACK_NAME.to_string())
    }
}

/// Convert every point feature into a station
pub fn stations_from(fc: &FeatureCollection) -> Vec<Station> {
    fc.features.iter().filter_map(Station::from_feature).collect()
}

/// Load basemap backdrop lines (coastlines, roads, district borders) from GeoJSON
pub fn load_backdrop(path: &Path) -> Result<Vec<LineString>> {
    let content = fs::read_to_string(path)?;
    let geojson: GeoJson = content.parse()?;
    let mut lines = Vec::new();
    process_geojson_lines(&geojson, |line| lines.push(line));
    Ok(lines)
}

/// Process GeoJSON and extract line features
fn process_geojson_lines<F>(geojson: &GeoJson, mut add_line: F)
where
    F: FnMut(LineString),
{
    match geojson {
        GeoJson::FeatureCollection(fc) => {
            for feature in &fc.features {
                if let Some(ref geometry) = feature.geometry {
                    process_geometry_lines(geometry, &mut add_line);
                }
            }
        }
        GeoJson::Feature(f) => {
            if let Some(ref geometry) = f.geometry {
                process_geometry_lines(geometry, &mut add_line);
            }
        }
        GeoJson::Geometry(geometry) => {
            process_geometry_lines(geometry, &mut add_line);
        }
    }
}

fn process_geometry_lines<F>(geometry: &Geometry, add_line: &mut F)
where
    F: FnMut(LineString),
{
    if let Value::GeometryCollection(geometries) = &geometry.value {
        for g in geometries {
            process_geometry_lines(g, add_line);
        }
        return;
    }

    let mut emit = |coords: LineString| {
        if coords.len() >= 2 {
            add_line(coords);
        }
    };
    match &geometry.value {
        Value::LineString(coords) => emit(ring_points(coords)),
        Value::MultiLineString(lines) => {
            for coords in lines {
                emit(ring_points(coords));
            }
        }
        Value::Polygon(rings) => {
            for ring in rings {
                emit(ring_points(ring));
            }
        }
        Value::MultiPolygon(polygons) => {
            for ring in polygons.iter().flatten() {
                emit(ring_points(ring));
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<FeatureCollection, LoadError> {
        parse_feature_collection("test.geojson", json.as_bytes().to_vec())
    }

    #[test]
    fn test_parse_blanks_malformed_features() {
        let fc = parse(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [114.0, 22.5]}, "properties": {"name": "A"}},
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": "nope"}, "properties": {}},
                {"type": "NotAFeature"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(fc.features.len(), 3);
        assert!(fc.features[0].geometry.is_some());
        assert!(fc.features[1].geometry.is_none() && fc.features[1].properties.is_none());
        assert!(fc.features[2].geometry.is_none());
        assert_eq!(stations_from(&fc).len(), 1);
    }

    #[test]
    fn test_unnamed_line_keeps_its_input_position() {
        let fc = parse(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "geometry": {"type": "LineString", "coordinates": 7}, "properties": {}},
                {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[114.0, 22.5], [114.1, 22.6]]}, "properties": {}}
            ]}"#,
        )
        .unwrap();
        let fragments = normalize_lines(&fc.features);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].parent, LineId::from("line-1"));
        assert_eq!(fragments[0].feature_index, 1);
    }

    #[test]
    fn test_parse_rejects_non_collections() {
        assert!(matches!(
            parse(r#"{"type": "Feature", "geometry": null, "properties": {}}"#),
            Err(LoadError::NotFeatureCollection { .. })
        ));
        assert!(matches!(parse("{not json"), Err(LoadError::Parse { .. })));
        assert!(matches!(parse("[1, 2, 3]"), Err(LoadError::NotFeatureCollection { .. })));
    }

    #[test]
    fn test_positions_must_be_on_the_globe() {
        assert_eq!(finite_xy(&[114.05, 22.54, 12.0]), Some((114.05, 22.54)));
        assert_eq!(finite_xy(&[-180.0, 90.0]), Some((-180.0, 90.0)));
        assert_eq!(finite_xy(&[-1e12, 22.5]), None);
        assert_eq!(finite_xy(&[114.0, 91.0]), None);
        assert_eq!(finite_xy(&[f64::NAN, 22.5]), None);
        assert_eq!(finite_xy(&[114.0]), None);
    }

    #[test]
    fn test_cells_from_polygons() {
        let fc = parse(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"h3_id": "8a411c", "avg_walk_time_min": 4.2, "avg_dist_to_subway_m": 350.0},
                 "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [2, 0], [2, 2], [0, 2], [0, 0]]]}},
                {"type": "Feature", "properties": {"h3_id": "8a411d", "avg_walk_time_min": null},
                 "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}},
                {"type": "Feature", "properties": {"h3_id": "pt"},
                 "geometry": {"type": "Point", "coordinates": [0, 0]}}
            ]}"#,
        )
        .unwrap();
        let cells = cells_from(&fc);
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].id, "8a411c");
        assert_eq!(cells[0].avg_walk_time_min, Some(4.2));
        assert_eq!(cells[0].avg_distance_m, Some(350.0));
        assert_eq!(cells[0].centroid, (1.0, 1.0));
        assert_eq!(cells[1].avg_walk_time_min, None);
    }

    #[test]
    fn test_station_name_fallback() {
        let fc = parse(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"station_name_zh": "福田", "name": "Futian"}, "geometry": {"type": "Point", "coordinates": [114.05, 22.54]}},
                {"type": "Feature", "properties": {"Name": "Chegongmiao"}, "geometry": {"type": "Point", "coordinates": [114.02, 22.53]}},
                {"type": "Feature", "properties": {"name": ""}, "geometry": {"type": "Point", "coordinates": [114.0, 22.5]}},
                {"type": "Feature", "properties": null, "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}}
            ]}"#,
        )
        .unwrap();
        let stations = stations_from(&fc);
        assert_eq!(stations.len(), 3);
        assert_eq!(stations[0].display_name(), "福田");
        assert_eq!(stations[1].display_name(), "Chegongmiao");
        assert_eq!(stations[2].display_name(), STATION_FALLBACK_NAME);
    }

    #[test]
    fn test_backdrop_flattens_lines_and_rings() {
        let geojson: GeoJson = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {}, "geometry": {"type": "MultiLineString", "coordinates": [[[0, 0], [1, 1]], [[2, 2]]]}},
            {"type": "Feature", "properties": {}, "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}}
        ]}"#
        .parse()
        .unwrap();
        let mut lines = Vec::new();
        process_geojson_lines(&geojson, |l| lines.push(l));
        assert_eq!(lines.len(), 2);
    }
}
