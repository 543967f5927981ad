use std::sync::Arc;
use tracing::info;

use transit_access::config::DashboardConfig;
use transit_access::data::{DatasetKind, DatasetLoader, DatasetSource, LineString};
use transit_access::layers::{LayerId, LayerKind};
use transit_access::map::{Basemap, MapSurface, Pick, Viewport};
use transit_access::store::VisualizationStore;
use transit_access::tooltip::Tooltip;

/// Character columns taken by the legend pane
pub const LEGEND_WIDTH: usize = 30;

const PITCH_STEP: f64 = 5.0;
const BEARING_STEP: f64 = 15.0;

/// Application state
pub struct App {
    pub viewport: Viewport,
    pub store: VisualizationStore<MapSurface>,
    pub config: DashboardConfig,
    loader: DatasetLoader,
    backdrop: Arc<Vec<LineString>>,
    pub should_quit: bool,
    /// Last mouse position for drag tracking
    pub last_mouse: Option<(u16, u16)>,
    /// Current mouse position for cursor marker
    pub mouse_pos: Option<(u16, u16)>,
    /// Whether the current left-button press has moved
    dragged: bool,
    pub hover: Option<Pick>,
    pub tooltip: Option<Tooltip>,
}

/// Map pane size in braille pixels for a terminal of the given size.
/// Accounts for the border, the status bar and the legend pane.
fn map_pixels(width: usize, height: usize) -> (usize, usize) {
    let inner_width = width.saturating_sub(2 + LEGEND_WIDTH);
    let inner_height = height.saturating_sub(3);
    (inner_width * 2, inner_height * 4)
}

/// Terminal cell to braille pixel inside the bordered map pane
fn to_pixel(col: u16, row: u16) -> (i32, i32) {
    ((col.saturating_sub(1)) as i32 * 2, (row.saturating_sub(1)) as i32 * 4)
}

impl App {
    /// Build the app, attach the rendering surface and start loading every dataset
    pub fn new(
        config: DashboardConfig,
        source: Arc<dyn DatasetSource>,
        backdrop: Vec<LineString>,
        basemap: Basemap,
        width: usize,
        height: usize,
    ) -> Self {
        let (pixel_width, pixel_height) = map_pixels(width, height);
        let view = &config.view;
        let viewport = Viewport::new(view.longitude, view.latitude, view.zoom, pixel_width, pixel_height)
            .with_zoom_range(view.min_zoom, view.max_zoom)
            .with_camera(view.pitch, view.bearing);

        let mut store = VisualizationStore::new(
            config.style_set(),
            config.resolution_set(),
            config.default_resolution,
        );
        store.set_extrusion_multiplier(config.extrusion.initial);

        let backdrop = Arc::new(backdrop);
        store.attach_surface(MapSurface::new(basemap, Arc::clone(&backdrop)));

        let mut app = Self {
            viewport,
            store,
            config,
            loader: DatasetLoader::new(source),
            backdrop,
            should_quit: false,
            last_mouse: None,
            mouse_pos: None,
            dragged: false,
            hover: None,
            tooltip: None,
        };
        for kind in DatasetKind::ALL {
            app.request(kind);
        }
        app
    }

    fn request(&mut self, kind: DatasetKind) {
        let ticket = self.store.begin_load(kind);
        let path = self
            .config
            .dataset_path(kind, self.store.interaction().active_resolution);
        self.loader.request(ticket, path);
    }

    /// Apply finished loads. Returns whether anything was applied.
    pub fn tick(&mut self) -> bool {
        let mut applied = false;
        for outcome in self.loader.drain() {
            applied |= self.store.complete_load(outcome);
        }
        if applied {
            self.refresh_hover();
        }
        applied
    }

    pub fn is_loading(&self) -> bool {
        self.loader.in_flight() > 0
    }

    /// Update viewport size when terminal resizes
    pub fn resize(&mut self, width: usize, height: usize) {
        let (w, h) = map_pixels(width, height);
        self.viewport.width = w;
        self.viewport.height = h;
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub fn toggle_layer(&mut self, kind: DatasetKind) {
        let visible = !self.store.interaction().visibility.get(kind);
        self.store.set_visibility(kind, visible);
        self.refresh_hover();
    }

    /// Move the extrusion multiplier by `steps` slider increments
    pub fn nudge_multiplier(&mut self, steps: i32) {
        let next = self
            .config
            .extrusion
            .nudge(self.store.interaction().extrusion_multiplier, steps);
        self.store.set_extrusion_multiplier(next);
    }

    /// Step to the neighbouring allowed resolution and fetch its cells
    pub fn step_resolution(&mut self, direction: i32) {
        let active = self.store.interaction().active_resolution;
        let values = self.store.resolutions().values();
        let next = if direction > 0 {
            values.iter().copied().find(|&r| r > active)
        } else {
            values.iter().rev().copied().find(|&r| r < active)
        };
        let Some(next) = next else {
            return;
        };
        if self.store.set_active_resolution(next as f64) {
            self.request(DatasetKind::Cells);
            self.refresh_hover();
        }
    }

    pub fn cycle_basemap(&mut self) {
        let current = self.basemap();
        self.switch_basemap(current.next());
    }

    /// Replace the rendering surface with one for `basemap`. The store republishes
    /// the full layer list and datasets that are still absent are fetched again.
    pub fn switch_basemap(&mut self, basemap: Basemap) {
        info!(basemap = basemap.id(), "switching basemap");
        self.store.detach_surface();
        self.store
            .attach_surface(MapSurface::new(basemap, Arc::clone(&self.backdrop)));
        for kind in DatasetKind::ALL {
            if !self.store.has_dataset(kind) {
                self.request(kind);
            }
        }
        self.refresh_hover();
    }

    pub fn basemap(&self) -> Basemap {
        self.store
            .surface()
            .map(|s| s.basemap())
            .unwrap_or_default()
    }

    pub fn clear_highlight(&mut self) {
        self.store.clear_highlight();
    }

    pub fn tilt(&mut self, direction: f64) {
        self.viewport.set_pitch(self.viewport.pitch + direction * PITCH_STEP);
        self.refresh_hover();
    }

    pub fn rotate(&mut self, direction: f64) {
        self.viewport.set_bearing(self.viewport.bearing + direction * BEARING_STEP);
        self.refresh_hover();
    }

    /// Pan the map
    pub fn pan(&mut self, dx: i32, dy: i32) {
        self.viewport.pan(dx, dy);
        self.refresh_hover();
    }

    pub fn zoom_in(&mut self) {
        self.viewport.zoom_in();
        self.refresh_hover();
    }

    pub fn zoom_out(&mut self) {
        self.viewport.zoom_out();
        self.refresh_hover();
    }

    /// Zoom in towards a screen position (terminal column/row)
    pub fn zoom_in_at(&mut self, col: u16, row: u16) {
        let (px, py) = to_pixel(col, row);
        self.viewport.zoom_in_at(px, py);
        self.refresh_hover();
    }

    /// Zoom out from a screen position (terminal column/row)
    pub fn zoom_out_at(&mut self, col: u16, row: u16) {
        let (px, py) = to_pixel(col, row);
        self.viewport.zoom_out_at(px, py);
        self.refresh_hover();
    }

    pub fn begin_drag(&mut self, col: u16, row: u16) {
        self.last_mouse = Some((col, row));
        self.dragged = false;
    }

    /// Handle mouse drag
    pub fn handle_drag(&mut self, x: u16, y: u16) {
        if let Some((last_x, last_y)) = self.last_mouse {
            let dx = last_x as i32 - x as i32;
            let dy = last_y as i32 - y as i32;
            if dx != 0 || dy != 0 {
                self.dragged = true;
                // One terminal cell is 2x4 braille pixels
                self.pan(dx * 2, dy * 4);
            }
        }
        self.last_mouse = Some((x, y));
    }

    /// Mouse released: a press that never moved is a click
    pub fn end_drag(&mut self, col: u16, row: u16) {
        let clicked = self.last_mouse.is_some() && !self.dragged;
        self.last_mouse = None;
        self.dragged = false;
        if clicked {
            let (px, py) = to_pixel(col, row);
            self.click_at_pixel(px, py);
        }
    }

    /// A click on a transit line toggles its highlight
    pub fn click_at_pixel(&mut self, px: i32, py: i32) {
        let Some(pick) = self.pick_at_pixel(px, py) else {
            return;
        };
        if pick.layer != LayerId::Lines {
            return;
        }
        let parent = self
            .store
            .surface()
            .and_then(|s| s.layer(LayerId::Lines))
            .and_then(|layer| match &layer.kind {
                LayerKind::Lines { fragments, .. } => fragments.get(pick.index).map(|f| f.parent.clone()),
                _ => None,
            });
        if let Some(id) = parent {
            self.store.toggle_highlighted_line(&id);
            self.refresh_hover();
        }
    }

    fn pick_at_pixel(&self, px: i32, py: i32) -> Option<Pick> {
        self.store.surface()?.pick(px, py, &self.viewport)
    }

    /// Update mouse cursor position and the hover tooltip
    pub fn set_mouse_pos(&mut self, col: u16, row: u16) {
        self.mouse_pos = Some((col, row));
        self.refresh_hover();
    }

    /// Get mouse position in braille pixel coordinates (for rendering marker)
    pub fn mouse_pixel_pos(&self) -> Option<(i32, i32)> {
        self.mouse_pos.map(|(col, row)| to_pixel(col, row))
    }

    fn refresh_hover(&mut self) {
        self.hover = self
            .mouse_pixel_pos()
            .and_then(|(px, py)| self.pick_at_pixel(px, py));
        self.tooltip = match (self.hover, self.store.surface()) {
            (Some(pick), Some(surface)) => Tooltip::from_pick(pick, surface.layers()),
            _ => None,
        };
    }

    pub fn multiplier_label(&self) -> String {
        format!("{:.1}×", self.store.interaction().extrusion_multiplier)
    }

    pub fn zoom_level(&self) -> String {
        format!("z{:.1}", self.viewport.zoom)
    }

    /// Get current center coordinates as a string
    pub fn center_coords(&self) -> String {
        format!(
            "{:.3}°{}, {:.3}°{}",
            self.viewport.center_lat.abs(),
            if self.viewport.center_lat >= 0.0 { "N" } else { "S" },
            self.viewport.center_lon.abs(),
            if self.viewport.center_lon >= 0.0 { "E" } else { "W" }
        )
    }
}
