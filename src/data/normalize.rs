//! Flattening of transit line features into single-path fragments.
//!
//! A MultiLineString contributes one fragment per usable segment, and every
//! fragment keeps the id of the feature it came from so a whole line can be
//! highlighted from any one of its pieces.

use geojson::feature::Id;
use geojson::{Feature, JsonObject, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{finite_xy, text_prop, LineString};

/// Identity of a transit line, shared by all fragments cut from one feature
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineId(String);

impl LineId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LineId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for LineId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One drawable path of a transit line
#[derive(Debug, Clone, PartialEq)]
pub struct LineFragment {
    /// Id of the owning raw feature
    pub parent: LineId,
    pub path: LineString,
    /// The owning feature's properties, shared between its fragments
    pub properties: Arc<JsonObject>,
    /// Position of the owning feature in the input collection
    pub feature_index: usize,
    /// Position of this segment inside a MultiLineString (0 for a LineString)
    pub segment_index: usize,
}

/// Property names tried, in order, before falling back to the feature id and then
/// the position in the collection
pub const LINE_ID_KEYS: [&str; 3] = ["line_name", "name", "id"];

/// Stable identifier of a raw line feature
pub fn line_id_for(feature: &Feature, index: usize) -> LineId {
    let props = feature.properties.as_ref();
    if let Some(name) = LINE_ID_KEYS.iter().find_map(|key| text_prop(props, key)) {
        return LineId(name);
    }
    match &feature.id {
        Some(Id::String(s)) if !s.trim().is_empty() => LineId(s.clone()),
        Some(Id::Number(n)) => LineId(n.to_string()),
        _ => LineId(format!("line-{index}")),
    }
}

/// A path is drawable when it has at least two positions and every position
/// carries a finite lon/lat pair
pub fn valid_path<P: AsRef<[f64]>>(coords: &[P]) -> Option<LineString> {
    if coords.len() < 2 {
        return None;
    }
    coords.iter().map(|p| finite_xy(p.as_ref())).collect()
}

/// Flatten line features into fragments, in feature then segment order.
/// Unusable geometry is skipped, never reported as an error.
pub fn normalize_lines(features: &[Feature]) -> Vec<LineFragment> {
    let mut out = Vec::with_capacity(features.len());

    for (feature_index, feature) in features.iter().enumerate() {
        let Some(geometry) = feature.geometry.as_ref() else {
            continue;
        };

        let paths: Vec<(usize, LineString)> = match &geometry.value {
            Value::LineString(coords) => valid_path(coords).map(|p| (0, p)).into_iter().collect(),
            Value::MultiLineString(lines) => lines
                .iter()
                .enumerate()
                .filter_map(|(i, coords)| valid_path(coords).map(|p| (i, p)))
                .collect(),
            _ => Vec::new(),
        };
        if paths.is_empty() {
            continue;
        }

        let parent = line_id_for(feature, feature_index);
        let properties = Arc::new(feature.properties.clone().unwrap_or_default());
        for (segment_index, path) in paths {
            out.push(LineFragment {
                parent: parent.clone(),
                path,
                properties: Arc::clone(&properties),
                feature_index,
                segment_index,
            });
        }
    }

    out
}

/// Number of fragments per line id
pub fn fragment_counts(fragments: &[LineFragment]) -> BTreeMap<LineId, usize> {
    let mut counts = BTreeMap::new();
    for fragment in fragments {
        *counts.entry(fragment.parent.clone()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse_feature_collection;
    use pretty_assertions::assert_eq;

    fn features(json: &str) -> Vec<Feature> {
        parse_feature_collection("lines.geojson", json.as_bytes().to_vec())
            .unwrap()
            .features
    }

    #[test]
    fn test_multilinestring_drops_degenerate_segment() {
        let fs = features(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"line_name": "2号线"}, "geometry": {"type": "MultiLineString", "coordinates": [
                    [[114.0, 22.5], [114.1, 22.6]],
                    [[114.2, 22.5]],
                    [[114.1, 22.6], [114.2, 22.7], [114.3, 22.7]]
                ]}}
            ]}"#,
        );
        let fragments = normalize_lines(&fs);
        assert_eq!(fragments.len(), 2);
        assert!(fragments.iter().all(|f| f.parent.as_str() == "2号线"));
        assert_eq!(fragments[0].segment_index, 0);
        assert_eq!(fragments[1].segment_index, 2);
        assert!(Arc::ptr_eq(&fragments[0].properties, &fragments[1].properties));
    }

    #[test]
    fn test_id_fallback_chain() {
        let fs = features(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"line_name": "1号线", "name": "Luobao"}, "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}},
                {"type": "Feature", "properties": {"name": "Shekou"}, "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}},
                {"type": "Feature", "properties": {"id": 7}, "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}},
                {"type": "Feature", "id": "feature-id", "properties": {}, "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}},
                {"type": "Feature", "properties": null, "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}}
            ]}"#,
        );
        let ids: Vec<String> = normalize_lines(&fs).iter().map(|f| f.parent.to_string()).collect();
        assert_eq!(ids, vec!["1号线", "Shekou", "7", "feature-id", "line-4"]);
    }

    #[test]
    fn test_other_geometry_kinds_yield_nothing() {
        let fs = features(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"name": "pt"}, "geometry": {"type": "Point", "coordinates": [0, 0]}},
                {"type": "Feature", "properties": {"name": "none"}, "geometry": null},
                {"type": "Feature", "properties": {"name": "empty"}, "geometry": {"type": "MultiLineString", "coordinates": []}},
                {"type": "Feature", "properties": {"name": "short"}, "geometry": {"type": "LineString", "coordinates": [[0, 0]]}},
                {"type": "Feature", "properties": {"name": "1d"}, "geometry": {"type": "LineString", "coordinates": [[0], [1]]}}
            ]}"#,
        );
        assert!(normalize_lines(&fs).is_empty());
    }

    #[test]
    fn test_valid_path_rejects_non_finite() {
        let good: Vec<Vec<f64>> = vec![vec![0.0, 0.0], vec![1.0, 1.0, 30.0]];
        let nan: Vec<Vec<f64>> = vec![vec![0.0, 0.0], vec![f64::NAN, 1.0]];
        let inf: Vec<Vec<f64>> = vec![vec![f64::INFINITY, 0.0], vec![1.0, 1.0]];
        assert_eq!(valid_path(&good), Some(vec![(0.0, 0.0), (1.0, 1.0)]));
        assert_eq!(valid_path(&nan), None);
        assert_eq!(valid_path(&inf), None);
    }

    #[test]
    fn test_flat_input_is_one_fragment_per_feature() {
        let json = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"name": "A"}, "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}},
            {"type": "Feature", "properties": {"name": "B"}, "geometry": {"type": "LineString", "coordinates": [[1, 1], [2, 2], [3, 2]]}}
        ]}"#;
        let first = normalize_lines(&features(json));
        let second = normalize_lines(&features(json));
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].parent.as_str(), "A");
        assert_eq!(first[1].parent.as_str(), "B");
    }

    #[test]
    fn test_fragment_counts_partition() {
        let fs = features(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"name": "A"}, "geometry": {"type": "MultiLineString", "coordinates": [[[0, 0], [1, 1]], [[1, 1], [2, 2]], [[5, 5], [6, 6]]]}},
                {"type": "Feature", "properties": {"name": "B"}, "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}},
                {"type": "Feature", "properties": {"name": "C"}, "geometry": {"type": "MultiLineString", "coordinates": [[[0, 0]]]}}
            ]}"#,
        );
        let counts = fragment_counts(&normalize_lines(&fs));
        assert_eq!(counts.get(&LineId::from("A")), Some(&3));
        assert_eq!(counts.get(&LineId::from("B")), Some(&1));
        assert_eq!(counts.get(&LineId::from("C")), None);
    }
}
