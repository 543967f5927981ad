use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::data::DatasetKind;
use crate::layers::{StationStyle, StyleSet};
use crate::store::ResolutionSet;
use crate::style::{LinePalette, MetricScale};

/// Dataset file names, relative to the data directory
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// `{resolution}` is replaced by the active resolution
    pub cells_path_template: String,
    pub stations_path: String,
    pub lines_path: String,
    /// Optional basemap geometry (coastline, roads) drawn under everything
    pub backdrop_path: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            cells_path_template: "shenzhen_h3_access_pandana_res{resolution}.geojson".to_string(),
            stations_path: "shenzhen_subway_stations.geojson".to_string(),
            lines_path: "shenzhen_subway_lines.geojson".to_string(),
            backdrop_path: Some("basemap.geojson".to_string()),
        }
    }
}

/// Initial camera
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: f64,
    /// Degrees from straight down
    pub pitch: f64,
    /// Degrees
    pub bearing: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            longitude: 114.0579,
            latitude: 22.5431,
            zoom: 10.5,
            pitch: 55.0,
            bearing: -20.0,
            min_zoom: 8.0,
            max_zoom: 18.0,
        }
    }
}

/// Range of the extrusion multiplier control
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExtrusionRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub initial: f64,
}

impl Default for ExtrusionRange {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 5.0,
            step: 0.1,
            initial: 1.0,
        }
    }
}

impl ExtrusionRange {
    /// Move `current` by `steps` increments, staying inside the range
    pub fn nudge(&self, current: f64, steps: i32) -> f64 {
        let next = current + self.step * steps as f64;
        // Keep one decimal so repeated nudges don't drift
        ((next * 10.0).round() / 10.0).clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub data: DataConfig,
    pub resolutions: Vec<u8>,
    pub default_resolution: f64,
    pub view: ViewConfig,
    pub metric: MetricScale,
    pub lines: LinePalette,
    pub stations: StationStyle,
    pub extrusion: ExtrusionRange,
    pub basemap: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            resolutions: vec![5, 6, 7, 8, 9, 10],
            default_resolution: 7.0,
            view: ViewConfig::default(),
            metric: MetricScale::default(),
            lines: LinePalette::default(),
            stations: StationStyle::default(),
            extrusion: ExtrusionRange::default(),
            basemap: "streets".to_string(),
        }
    }
}

impl DashboardConfig {
    /// Read a JSON config file; fields it leaves out keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn cells_path(&self, resolution: u8) -> String {
        self.data
            .cells_path_template
            .replace("{resolution}", &resolution.to_string())
    }

    /// File to fetch for a dataset kind at the given resolution
    pub fn dataset_path(&self, kind: DatasetKind, resolution: u8) -> String {
        match kind {
            DatasetKind::Cells => self.cells_path(resolution),
            DatasetKind::Stations => self.data.stations_path.clone(),
            DatasetKind::Lines => self.data.lines_path.clone(),
        }
    }

    pub fn style_set(&self) -> StyleSet {
        StyleSet {
            metric: Arc::new(self.metric.clone()),
            palette: Arc::new(self.lines.clone()),
            stations: self.stations.clone(),
        }
    }

    pub fn resolution_set(&self) -> ResolutionSet {
        ResolutionSet::new(self.resolutions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cells_path_template() {
        let config = DashboardConfig::default();
        assert_eq!(config.cells_path(8), "shenzhen_h3_access_pandana_res8.geojson");
        assert_eq!(
            config.dataset_path(DatasetKind::Stations, 8),
            "shenzhen_subway_stations.geojson"
        );
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: DashboardConfig = serde_json::from_str(
            r#"{"resolutions": [7, 8], "metric": {"elevation": {"exponent": 1.0}}, "view": {"zoom": 12}}"#,
        )
        .unwrap();
        assert_eq!(config.resolutions, vec![7, 8]);
        assert_eq!(config.metric.elevation.exponent, 1.0);
        assert_eq!(config.metric.elevation.cap_minutes, 30.0);
        assert_eq!(config.metric.bins.len(), 12);
        assert_eq!(config.view.zoom, 12.0);
        assert_eq!(config.view.pitch, 55.0);
        assert_eq!(config.basemap, "streets");
    }

    #[test]
    fn test_extrusion_nudge_clamps() {
        let range = ExtrusionRange::default();
        assert_eq!(range.nudge(1.0, 1), 1.1);
        assert_eq!(range.nudge(0.05, -1), 0.0);
        assert_eq!(range.nudge(4.95, 3), 5.0);
    }
}
