//! Hover text for picked features.

use crate::data::{AccessibilityCell, LineFragment, Station};
use crate::layers::{LayerKind, LayerSpec};
use crate::map::Pick;

pub const NO_DATA_TEXT: &str = "No accessibility data for this area";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tooltip {
    pub title: String,
    pub lines: Vec<String>,
}

impl Tooltip {
    pub fn for_cell(cell: &AccessibilityCell) -> Self {
        let mut lines = vec![format!("H3 ID: {}", cell.id)];
        match cell.avg_walk_time_min {
            Some(minutes) => {
                lines.push(format!("Avg walk time: {minutes:.1} min"));
                if let Some(meters) = cell.avg_distance_m {
                    lines.push(format!("Avg walk distance: {meters:.0} m"));
                }
            }
            None => lines.push(NO_DATA_TEXT.to_string()),
        }
        Self {
            title: "Accessibility".to_string(),
            lines,
        }
    }

    pub fn for_station(station: &Station) -> Self {
        Self {
            title: station.display_name(),
            lines: vec!["Metro station".to_string()],
        }
    }

    /// `all` is the full fragment list, used to count the line's paths
    pub fn for_line(fragment: &LineFragment, all: &[LineFragment]) -> Self {
        let count = all.iter().filter(|f| f.parent == fragment.parent).count();
        let mut lines = Vec::with_capacity(2);
        if count > 1 {
            lines.push(format!("{count} segments"));
        }
        lines.push("Click to toggle highlight".to_string());
        Self {
            title: fragment.parent.to_string(),
            lines,
        }
    }

    /// Tooltip for a pick against the layer it came from
    pub fn from_pick(pick: Pick, layers: &[LayerSpec]) -> Option<Self> {
        let layer = layers.iter().find(|l| l.id == pick.layer)?;
        match &layer.kind {
            LayerKind::Surface { cells, .. } => cells.get(pick.index).map(Self::for_cell),
            LayerKind::Stations { stations, .. } => stations.get(pick.index).map(Self::for_station),
            LayerKind::Lines { fragments, .. } => fragments
                .get(pick.index)
                .map(|f| Self::for_line(f, fragments)),
        }
    }
}
