//! Declarative layer descriptions derived from a store snapshot.
//!
//! `build_layers` is pure: the same snapshot always yields the same list. Style
//! functions take the interaction values they depend on as explicit fields, and
//! every such dependency is listed in `update_triggers` so a rendering surface can
//! tell when cached per-feature styling must be recomputed.

use serde::Deserialize;
use std::sync::Arc;

use crate::data::{AccessibilityCell, LineFragment, LineId, Station};
use crate::store::StoreSnapshot;
use crate::style::{LinePalette, MetricScale, Rgba};

/// Fixed identities, also the draw order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerId {
    Accessibility,
    Stations,
    Lines,
}

impl LayerId {
    pub fn as_str(self) -> &'static str {
        match self {
            LayerId::Accessibility => "h3-accessibility-layer",
            LayerId::Stations => "subway-stations-layer",
            LayerId::Lines => "subway-lines-layer",
        }
    }
}

/// A per-feature style function whose output can change without the data changing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accessor {
    Elevation,
    LineColor,
    LineWidth,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerValue {
    Number(f64),
    Key(Option<LineId>),
}

/// "Recompute `accessor` whenever `value` changes"
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateTrigger {
    pub accessor: Accessor,
    pub value: TriggerValue,
}

/// Styling inputs that come from configuration rather than interaction
#[derive(Debug, Clone)]
pub struct StyleSet {
    pub metric: Arc<MetricScale>,
    pub palette: Arc<LinePalette>,
    pub stations: StationStyle,
}

impl Default for StyleSet {
    fn default() -> Self {
        Self {
            metric: Arc::new(MetricScale::default()),
            palette: Arc::new(LinePalette::default()),
            stations: StationStyle::default(),
        }
    }
}

/// Extruded hexagon styling
#[derive(Debug, Clone)]
pub struct SurfaceStyle {
    pub scale: Arc<MetricScale>,
    pub extrusion_multiplier: f64,
    pub extruded: bool,
    pub wireframe: bool,
}

impl SurfaceStyle {
    pub fn fill_color(&self, cell: &AccessibilityCell) -> Rgba {
        self.scale.color_for(cell.avg_walk_time_min)
    }

    pub fn elevation(&self, cell: &AccessibilityCell) -> f64 {
        self.scale.elevation_for(cell.avg_walk_time_min, self.extrusion_multiplier)
    }
}

/// Station marker styling
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StationStyle {
    pub icon_size: f64,
    pub min_size_px: f64,
    pub max_size_px: f64,
    pub highlight_color: Rgba,
}

impl Default for StationStyle {
    fn default() -> Self {
        Self {
            icon_size: 4.0,
            min_size_px: 20.0,
            max_size_px: 96.0,
            highlight_color: [0, 255, 255, 255],
        }
    }
}

/// Transit line styling
#[derive(Debug, Clone)]
pub struct LineStyle {
    pub palette: Arc<LinePalette>,
    pub highlighted: Option<LineId>,
    pub width_px: f64,
    pub highlight_width_px: f64,
}

impl LineStyle {
    pub fn color(&self, fragment: &LineFragment) -> Rgba {
        self.palette.resolve(fragment, self.highlighted.as_ref())
    }

    pub fn width(&self, fragment: &LineFragment) -> f64 {
        if self.is_highlighted(fragment) {
            self.highlight_width_px
        } else {
            self.width_px
        }
    }

    pub fn is_highlighted(&self, fragment: &LineFragment) -> bool {
        self.highlighted.as_ref() == Some(&fragment.parent)
    }
}

#[derive(Debug, Clone)]
pub enum LayerKind {
    Surface {
        cells: Arc<Vec<AccessibilityCell>>,
        style: SurfaceStyle,
    },
    Stations {
        stations: Arc<Vec<Station>>,
        style: StationStyle,
    },
    Lines {
        fragments: Arc<Vec<LineFragment>>,
        style: LineStyle,
    },
}

/// Everything a rendering surface needs to draw one layer
#[derive(Debug, Clone)]
pub struct LayerSpec {
    pub id: LayerId,
    pub visible: bool,
    pub pickable: bool,
    /// Hover tint, if the surface should tint the hovered feature
    pub auto_highlight: Option<Rgba>,
    pub update_triggers: Vec<UpdateTrigger>,
    pub kind: LayerKind,
}

impl LayerSpec {
    pub fn trigger(&self, accessor: Accessor) -> Option<&TriggerValue> {
        self.update_triggers
            .iter()
            .find(|t| t.accessor == accessor)
            .map(|t| &t.value)
    }

    /// Number of features in the layer's data
    pub fn len(&self) -> usize {
        match &self.kind {
            LayerKind::Surface { cells, .. } => cells.len(),
            LayerKind::Stations { stations, .. } => stations.len(),
            LayerKind::Lines { fragments, .. } => fragments.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Address of the shared data, identifying the dataset for caching
    pub fn data_key(&self) -> usize {
        match &self.kind {
            LayerKind::Surface { cells, .. } => Arc::as_ptr(cells) as usize,
            LayerKind::Stations { stations, .. } => Arc::as_ptr(stations) as usize,
            LayerKind::Lines { fragments, .. } => Arc::as_ptr(fragments) as usize,
        }
    }
}

const SURFACE_HOVER_TINT: Rgba = [255, 255, 0, 180];

/// Build the ordered layer list: surface, then stations, then lines.
/// A layer is omitted only when its data is absent or empty.
pub fn build_layers(snapshot: &StoreSnapshot) -> Vec<LayerSpec> {
    let mut layers = Vec::with_capacity(3);
    let interaction = &snapshot.interaction;

    if let Some(cells) = snapshot.cells.as_ref().filter(|c| !c.is_empty()) {
        let multiplier = interaction.extrusion_multiplier;
        layers.push(LayerSpec {
            id: LayerId::Accessibility,
            visible: interaction.visibility.accessibility,
            pickable: true,
            auto_highlight: Some(SURFACE_HOVER_TINT),
            update_triggers: vec![UpdateTrigger {
                accessor: Accessor::Elevation,
                value: TriggerValue::Number(multiplier),
            }],
            kind: LayerKind::Surface {
                cells: Arc::clone(cells),
                style: SurfaceStyle {
                    scale: Arc::clone(&snapshot.styles.metric),
                    extrusion_multiplier: multiplier,
                    extruded: true,
                    wireframe: false,
                },
            },
        });
    }

    if let Some(stations) = snapshot.stations.as_ref().filter(|s| !s.is_empty()) {
        layers.push(LayerSpec {
            id: LayerId::Stations,
            visible: interaction.visibility.stations,
            pickable: true,
            auto_highlight: Some(snapshot.styles.stations.highlight_color),
            update_triggers: Vec::new(),
            kind: LayerKind::Stations {
                stations: Arc::clone(stations),
                style: snapshot.styles.stations.clone(),
            },
        });
    }

    if let Some(fragments) = snapshot.fragments.as_ref().filter(|f| !f.is_empty()) {
        let highlighted = interaction.highlighted_line.clone();
        layers.push(LayerSpec {
            id: LayerId::Lines,
            visible: interaction.visibility.lines,
            pickable: true,
            auto_highlight: None,
            update_triggers: vec![
                UpdateTrigger {
                    accessor: Accessor::LineColor,
                    value: TriggerValue::Key(highlighted.clone()),
                },
                UpdateTrigger {
                    accessor: Accessor::LineWidth,
                    value: TriggerValue::Key(highlighted.clone()),
                },
            ],
            kind: LayerKind::Lines {
                fragments: Arc::clone(fragments),
                style: LineStyle {
                    palette: Arc::clone(&snapshot.styles.palette),
                    highlighted,
                    width_px: 3.0,
                    highlight_width_px: 6.0,
                },
            },
        });
    }

    layers
}
