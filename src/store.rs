use geojson::{Feature, FeatureCollection};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::data::{
    cells_from, normalize_lines, stations_from, AccessibilityCell, DatasetKind, LineFragment,
    LineId, LoadOutcome, LoadTicket, Station,
};
use crate::layers::{build_layers, LayerSpec, StyleSet};
use crate::style::LegendEntry;

/// Receives every freshly built layer list
pub trait LayerSink {
    fn publish(&mut self, layers: Vec<LayerSpec>);
}

/// The discrete spatial resolutions cell data exists for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionSet {
    allowed: Vec<u8>,
}

impl Default for ResolutionSet {
    fn default() -> Self {
        Self {
            allowed: vec![5, 6, 7, 8, 9, 10],
        }
    }
}

impl ResolutionSet {
    /// Sorted and deduplicated; an empty list falls back to the default set
    pub fn new(mut allowed: Vec<u8>) -> Self {
        allowed.sort_unstable();
        allowed.dedup();
        if allowed.is_empty() {
            return Self::default();
        }
        Self { allowed }
    }

    pub fn values(&self) -> &[u8] {
        &self.allowed
    }

    pub fn contains(&self, resolution: u8) -> bool {
        self.allowed.contains(&resolution)
    }

    fn min(&self) -> u8 {
        self.allowed[0]
    }

    fn max(&self) -> u8 {
        self.allowed[self.allowed.len() - 1]
    }

    /// Round, clamp to the allowed range, then take the nearest allowed value
    /// (the lower one on a tie)
    pub fn snap(&self, requested: f64) -> u8 {
        if !requested.is_finite() {
            return self.min();
        }
        let rounded = requested.round().clamp(self.min() as f64, self.max() as f64) as i32;

        let mut best = self.min();
        let mut best_dist = i32::MAX;
        for &candidate in &self.allowed {
            let dist = (candidate as i32 - rounded).abs();
            if dist < best_dist {
                best = candidate;
                best_dist = dist;
            }
        }
        best
    }
}

/// Which layers the user wants drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerVisibility {
    pub accessibility: bool,
    pub stations: bool,
    pub lines: bool,
}

impl Default for LayerVisibility {
    fn default() -> Self {
        Self {
            accessibility: true,
            stations: true,
            lines: true,
        }
    }
}

impl LayerVisibility {
    pub fn get(&self, kind: DatasetKind) -> bool {
        match kind {
            DatasetKind::Cells => self.accessibility,
            DatasetKind::Stations => self.stations,
            DatasetKind::Lines => self.lines,
        }
    }

    fn set(&mut self, kind: DatasetKind, visible: bool) {
        match kind {
            DatasetKind::Cells => self.accessibility = visible,
            DatasetKind::Stations => self.stations = visible,
            DatasetKind::Lines => self.lines = visible,
        }
    }
}

/// User-controlled view state. Survives dataset reloads and basemap changes.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionState {
    /// Never negative
    pub extrusion_multiplier: f64,
    pub active_resolution: u8,
    pub visibility: LayerVisibility,
    pub highlighted_line: Option<LineId>,
}

impl InteractionState {
    pub fn new(active_resolution: u8) -> Self {
        Self {
            extrusion_multiplier: 1.0,
            active_resolution,
            visibility: LayerVisibility::default(),
            highlighted_line: None,
        }
    }
}

/// Everything the layer factory reads
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub cells: Option<Arc<Vec<AccessibilityCell>>>,
    pub stations: Option<Arc<Vec<Station>>>,
    pub fragments: Option<Arc<Vec<LineFragment>>>,
    pub interaction: InteractionState,
    pub styles: StyleSet,
}

/// Owns the loaded datasets and interaction state for one session.
///
/// Every operation ends by rebuilding the layer list and publishing it to the
/// attached surface. With no surface attached the state still changes but nothing
/// is published.
pub struct VisualizationStore<S> {
    styles: StyleSet,
    resolutions: ResolutionSet,
    cells: Option<Arc<Vec<AccessibilityCell>>>,
    stations: Option<Arc<Vec<Station>>>,
    raw_lines: Option<Arc<Vec<Feature>>>,
    fragments: Option<Arc<Vec<LineFragment>>>,
    interaction: InteractionState,
    /// Latest request generation per dataset kind
    generations: [u64; 3],
    surface: Option<S>,
    publishes: u64,
}

impl<S: LayerSink> VisualizationStore<S> {
    pub fn new(styles: StyleSet, resolutions: ResolutionSet, initial_resolution: f64) -> Self {
        let active = resolutions.snap(initial_resolution);
        Self {
            styles,
            resolutions,
            cells: None,
            stations: None,
            raw_lines: None,
            fragments: None,
            interaction: InteractionState::new(active),
            generations: [0; 3],
            surface: None,
            publishes: 0,
        }
    }

    pub fn interaction(&self) -> &InteractionState {
        &self.interaction
    }

    pub fn resolutions(&self) -> &ResolutionSet {
        &self.resolutions
    }

    pub fn styles(&self) -> &StyleSet {
        &self.styles
    }

    pub fn cells(&self) -> Option<&Arc<Vec<AccessibilityCell>>> {
        self.cells.as_ref()
    }

    pub fn stations(&self) -> Option<&Arc<Vec<Station>>> {
        self.stations.as_ref()
    }

    pub fn raw_lines(&self) -> Option<&Arc<Vec<Feature>>> {
        self.raw_lines.as_ref()
    }

    pub fn fragments(&self) -> Option<&Arc<Vec<LineFragment>>> {
        self.fragments.as_ref()
    }

    /// Present means loaded and non-empty
    pub fn has_dataset(&self, kind: DatasetKind) -> bool {
        match kind {
            DatasetKind::Cells => self.cells.is_some(),
            DatasetKind::Stations => self.stations.is_some(),
            // Raw features alone draw nothing; presence needs a drawable fragment
            DatasetKind::Lines => self.fragments.is_some(),
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            cells: self.cells.clone(),
            stations: self.stations.clone(),
            fragments: self.fragments.clone(),
            interaction: self.interaction.clone(),
            styles: self.styles.clone(),
        }
    }

    pub fn legend(&self) -> Vec<LegendEntry> {
        self.styles.metric.legend()
    }

    /// How many layer lists have reached a surface
    pub fn publish_count(&self) -> u64 {
        self.publishes
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    /// Attach a (new) rendering surface and give it the full layer list
    pub fn attach_surface(&mut self, surface: S) {
        self.surface = Some(surface);
        self.publish();
    }

    pub fn detach_surface(&mut self) -> Option<S> {
        self.surface.take()
    }

    /// Replace a dataset wholesale. Empty or missing input is stored as absent.
    /// Supersedes any load of the same kind still in flight.
    pub fn set_dataset(&mut self, kind: DatasetKind, raw: Option<FeatureCollection>) {
        self.generations[kind.index()] += 1;
        self.apply_dataset(kind, raw);
        self.publish();
    }

    pub fn set_visibility(&mut self, kind: DatasetKind, visible: bool) {
        self.interaction.visibility.set(kind, visible);
        debug!(kind = %kind, visible, "layer visibility changed");
        self.publish();
    }

    /// Non-finite values are ignored; negatives clamp to zero
    pub fn set_extrusion_multiplier(&mut self, value: f64) {
        if value.is_finite() {
            self.interaction.extrusion_multiplier = value.max(0.0);
        } else {
            warn!(value, "ignoring non-finite extrusion multiplier");
        }
        self.publish();
    }

    /// Snap and apply a resolution. On change the current cells are dropped and any
    /// cells load in flight is superseded; returns whether the resolution changed.
    pub fn set_active_resolution(&mut self, requested: f64) -> bool {
        let snapped = self.resolutions.snap(requested);
        let changed = snapped != self.interaction.active_resolution;
        if changed {
            info!(from = self.interaction.active_resolution, to = snapped, "resolution changed");
            self.interaction.active_resolution = snapped;
            self.cells = None;
            self.generations[DatasetKind::Cells.index()] += 1;
        }
        self.publish();
        changed
    }

    /// Select a line, or clear the selection if it is already selected
    pub fn toggle_highlighted_line(&mut self, candidate: &LineId) {
        if self.interaction.highlighted_line.as_ref() == Some(candidate) {
            self.interaction.highlighted_line = None;
        } else {
            self.interaction.highlighted_line = Some(candidate.clone());
        }
        debug!(highlighted = ?self.interaction.highlighted_line, "line highlight toggled");
        self.publish();
    }

    pub fn clear_highlight(&mut self) {
        self.interaction.highlighted_line = None;
        self.publish();
    }

    /// Issue a ticket for a new load of `kind`, superseding earlier ones
    pub fn begin_load(&mut self, kind: DatasetKind) -> LoadTicket {
        let slot = &mut self.generations[kind.index()];
        *slot += 1;
        LoadTicket {
            kind,
            generation: *slot,
            resolution: (kind == DatasetKind::Cells).then_some(self.interaction.active_resolution),
        }
    }

    /// Apply a finished load if it is still the latest request for its kind.
    /// A failed load leaves the dataset absent. Returns whether it was applied.
    pub fn complete_load(&mut self, outcome: LoadOutcome) -> bool {
        let LoadOutcome { ticket, path, result } = outcome;
        let latest = self.generations[ticket.kind.index()];
        let wrong_resolution = ticket.kind == DatasetKind::Cells
            && ticket.resolution != Some(self.interaction.active_resolution);
        if ticket.generation != latest || wrong_resolution {
            debug!(
                kind = %ticket.kind,
                generation = ticket.generation,
                latest,
                path = %path,
                "discarding superseded load"
            );
            return false;
        }

        match result {
            Ok(fc) => {
                info!(kind = %ticket.kind, path = %path, features = fc.features.len(), "dataset loaded");
                self.apply_dataset(ticket.kind, Some(fc));
            }
            Err(e) => {
                warn!(kind = %ticket.kind, error = %e, "dataset load failed; treating as absent");
                self.apply_dataset(ticket.kind, None);
            }
        }
        self.publish();
        true
    }

    fn apply_dataset(&mut self, kind: DatasetKind, raw: Option<FeatureCollection>) {
        match kind {
            DatasetKind::Cells => {
                self.cells = non_empty(raw.map(|fc| cells_from(&fc)));
            }
            DatasetKind::Stations => {
                self.stations = non_empty(raw.map(|fc| stations_from(&fc)));
            }
            DatasetKind::Lines => {
                self.raw_lines = non_empty(raw.map(|fc| fc.features));
                self.fragments = self
                    .raw_lines
                    .as_ref()
                    .and_then(|raw| non_empty(Some(normalize_lines(raw))));
            }
        }
        if !self.has_dataset(kind) {
            warn!(kind = %kind, "dataset is empty or invalid; treating as absent");
        }
    }

    fn publish(&mut self) {
        if self.surface.is_none() {
            debug!("no rendering surface attached; layer list not published");
            return;
        }
        let layers = build_layers(&self.snapshot());
        if let Some(surface) = self.surface.as_mut() {
            surface.publish(layers);
            self.publishes += 1;
        }
    }
}

fn non_empty<T>(items: Option<Vec<T>>) -> Option<Arc<Vec<T>>> {
    items.filter(|v| !v.is_empty()).map(Arc::new)
}
