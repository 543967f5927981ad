use glam::{DMat3, DVec3};
use std::f64::consts::PI;

/// Width in braille pixels of the whole world at zoom 0
pub const WORLD_TILE_PX: f64 = 64.0;

/// Equatorial circumference, meters
const EARTH_CIRCUMFERENCE_M: f64 = 40_075_016.686;

const MAX_LATITUDE: f64 = 85.051_128;
pub const MAX_PITCH: f64 = 70.0;

/// Camera over a web-mercator plane, optionally pitched and rotated.
///
/// `zoom` is logarithmic like a slippy map: one step doubles the scale.
#[derive(Debug, Clone)]
pub struct Viewport {
    /// Center longitude (-180 to 180)
    pub center_lon: f64,
    /// Center latitude (clamped to the mercator range)
    pub center_lat: f64,
    pub zoom: f64,
    /// Degrees from straight down, 0..=MAX_PITCH
    pub pitch: f64,
    /// Degrees clockwise from north
    pub bearing: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Canvas pixel width
    pub width: usize,
    /// Canvas pixel height
    pub height: usize,
}

/// Normalized web-mercator coordinates, y pointing south
fn mercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = (lon + 180.0) / 360.0;
    let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0;
    (x, y)
}

fn inverse_mercator(x: f64, y: f64) -> (f64, f64) {
    let lon = x * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees();
    (lon, lat)
}

impl Viewport {
    pub fn new(center_lon: f64, center_lat: f64, zoom: f64, width: usize, height: usize) -> Self {
        Self {
            center_lon,
            center_lat: center_lat.clamp(-MAX_LATITUDE, MAX_LATITUDE),
            zoom,
            pitch: 0.0,
            bearing: 0.0,
            min_zoom: 0.0,
            max_zoom: 22.0,
            width,
            height,
        }
    }

    /// Restrict zoom to `[min, max]`, clamping the current value
    pub fn with_zoom_range(mut self, min: f64, max: f64) -> Self {
        self.min_zoom = min.min(max);
        self.max_zoom = max.max(min);
        self.zoom = self.zoom.clamp(self.min_zoom, self.max_zoom);
        self
    }

    pub fn with_camera(mut self, pitch: f64, bearing: f64) -> Self {
        self.set_pitch(pitch);
        self.set_bearing(bearing);
        self
    }

    pub fn set_pitch(&mut self, pitch: f64) {
        self.pitch = pitch.clamp(0.0, MAX_PITCH);
    }

    /// Wrapped into (-180, 180]
    pub fn set_bearing(&mut self, bearing: f64) {
        let mut b = bearing.rem_euclid(360.0);
        if b > 180.0 {
            b -= 360.0;
        }
        self.bearing = b;
    }

    /// Pixel width of the whole world at the current zoom
    pub fn world_px(&self) -> f64 {
        WORLD_TILE_PX * 2f64.powf(self.zoom)
    }

    /// Ground meters covered by one pixel at the view center
    pub fn meters_per_px(&self) -> f64 {
        EARTH_CIRCUMFERENCE_M * self.center_lat.to_radians().cos() / self.world_px()
    }

    fn rotation(&self) -> DMat3 {
        DMat3::from_rotation_x(-self.pitch.to_radians()) * DMat3::from_rotation_z(self.bearing.to_radians())
    }

    /// Project a ground point to pixel coordinates
    pub fn project(&self, lon: f64, lat: f64) -> (i32, i32) {
        let (x, y, _) = self.project_3d(lon, lat, 0.0);
        (x, y)
    }

    /// Project a point `height_m` above the ground. The third value grows with
    /// distance from the camera, for back-to-front sorting.
    pub fn project_3d(&self, lon: f64, lat: f64, height_m: f64) -> (i32, i32, f64) {
        let (x, y, depth) = self.project_f(lon, lat, height_m);
        (x.round() as i32, y.round() as i32, depth)
    }

    fn project_f(&self, lon: f64, lat: f64, height_m: f64) -> (f64, f64, f64) {
        let (mx, my) = mercator(lon, lat);
        let (cx, cy) = mercator(self.center_lon, self.center_lat);
        let world = self.world_px();

        // Map plane: x east, y north, z up, all in pixels
        let local = DVec3::new((mx - cx) * world, (cy - my) * world, height_m / self.meters_per_px());
        let view = self.rotation() * local;

        let px = self.width as f64 / 2.0 + view.x;
        let py = self.height as f64 / 2.0 - view.y;
        (px, py, -view.z)
    }

    /// Ground-plane point under a pixel
    pub fn unproject(&self, px: i32, py: i32) -> (f64, f64) {
        let vx = px as f64 - self.width as f64 / 2.0;
        let vy = self.height as f64 / 2.0 - py as f64;

        // Undo the pitch for points with zero height, then the bearing
        let tilted = DVec3::new(vx, vy / self.pitch.to_radians().cos(), 0.0);
        let local = DMat3::from_rotation_z(-self.bearing.to_radians()) * tilted;

        let (cx, cy) = mercator(self.center_lon, self.center_lat);
        let world = self.world_px();
        inverse_mercator(cx + local.x / world, cy - local.y / world)
    }

    /// Move the view so the pixel offset (dx, dy) from the center becomes the center
    pub fn pan(&mut self, dx: i32, dy: i32) {
        let (lon, lat) = self.unproject(self.width as i32 / 2 + dx, self.height as i32 / 2 + dy);

        self.center_lon = lon;
        // Wrap longitude
        if self.center_lon > 180.0 {
            self.center_lon -= 360.0;
        } else if self.center_lon < -180.0 {
            self.center_lon += 360.0;
        }
        self.center_lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    }

    pub fn zoom_in(&mut self) {
        self.zoom = (self.zoom + 0.5).clamp(self.min_zoom, self.max_zoom);
    }

    pub fn zoom_out(&mut self) {
        self.zoom = (self.zoom - 0.5).clamp(self.min_zoom, self.max_zoom);
    }

    pub fn zoom_in_at(&mut self, px: i32, py: i32) {
        self.zoom_at(px, py, 0.5);
    }

    pub fn zoom_out_at(&mut self, px: i32, py: i32) {
        self.zoom_at(px, py, -0.5);
    }

    /// Change zoom by `delta` steps keeping the ground point under (px, py) in place
    pub fn zoom_at(&mut self, px: i32, py: i32, delta: f64) {
        let (lon, lat) = self.unproject(px, py);
        self.zoom = (self.zoom + delta).clamp(self.min_zoom, self.max_zoom);

        let (new_px, new_py) = self.project(lon, lat);
        self.pan(new_px - px, new_py - py);
    }

    /// Check if a projected point is visible in the viewport
    pub fn is_visible(&self, px: i32, py: i32) -> bool {
        px >= -10 && px < self.width as i32 + 10 && py >= -10 && py < self.height as i32 + 10
    }

    /// Check if a line segment might be visible (rough bounding box check)
    pub fn line_might_be_visible(&self, p1: (i32, i32), p2: (i32, i32)) -> bool {
        let min_x = p1.0.min(p2.0);
        let max_x = p1.0.max(p2.0);
        let min_y = p1.1.min(p2.1);
        let max_y = p1.1.max(p2.1);

        max_x >= 0 && min_x < self.width as i32 && max_y >= 0 && min_y < self.height as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shenzhen() -> Viewport {
        Viewport::new(114.0579, 22.5431, 10.5, 200, 100)
    }

    #[test]
    fn test_project_center() {
        let vp = shenzhen().with_camera(55.0, -20.0);
        assert_eq!(vp.project(114.0579, 22.5431), (100, 50));
    }

    #[test]
    fn test_north_is_up_without_rotation() {
        let vp = shenzhen();
        let (x, y) = vp.project(114.0579, 22.6);
        assert_eq!(x, 100);
        assert!(y < 50);
        let (x, _) = vp.project(114.2, 22.5431);
        assert!(x > 100);
    }

    #[test]
    fn test_height_lifts_only_when_pitched() {
        let flat = shenzhen();
        let (_, ground, _) = flat.project_3d(114.0579, 22.5431, 0.0);
        let (_, lifted, _) = flat.project_3d(114.0579, 22.5431, 4000.0);
        assert_eq!(ground, lifted);

        let pitched = shenzhen().with_camera(55.0, 0.0);
        let (_, lifted, _) = pitched.project_3d(114.0579, 22.5431, 4000.0);
        assert!(lifted < ground);
    }

    #[test]
    fn test_far_points_have_larger_depth() {
        let vp = shenzhen().with_camera(55.0, 0.0);
        let (_, _, near) = vp.project_3d(114.0579, 22.50, 0.0);
        let (_, _, far) = vp.project_3d(114.0579, 22.60, 0.0);
        assert!(far > near);
    }

    #[test]
    fn test_unproject_inverts_project() {
        let vp = Viewport::new(114.0579, 22.5431, 14.0, 400, 200).with_camera(40.0, 30.0);
        let (px, py) = vp.project(114.07, 22.55);
        let (lon, lat) = vp.unproject(px, py);
        assert!((lon - 114.07).abs() < 1e-3, "lon {lon}");
        assert!((lat - 22.55).abs() < 1e-3, "lat {lat}");
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut vp = shenzhen().with_zoom_range(8.0, 18.0);
        for _ in 0..40 {
            vp.zoom_in();
        }
        assert_eq!(vp.zoom, 18.0);
        for _ in 0..40 {
            vp.zoom_out_at(10, 10);
        }
        assert_eq!(vp.zoom, 8.0);
    }

    #[test]
    fn test_pan_moves_center_east() {
        let mut vp = shenzhen();
        vp.pan(10, 0);
        assert!(vp.center_lon > 114.0579);
        assert!((vp.center_lat - 22.5431).abs() < 1e-6);
    }

    #[test]
    fn test_zoom_at_keeps_point_under_cursor() {
        let mut vp = Viewport::new(114.0579, 22.5431, 12.0, 400, 200);
        let before = vp.unproject(300, 50);
        vp.zoom_in_at(300, 50);
        let after = vp.unproject(300, 50);
        assert!((before.0 - after.0).abs() < 0.01);
        assert!((before.1 - after.1).abs() < 0.01);
    }

    #[test]
    fn test_bearing_wraps() {
        let mut vp = shenzhen();
        vp.set_bearing(370.0);
        assert!((vp.bearing - 10.0).abs() < 1e-9);
        vp.set_bearing(-190.0);
        assert!((vp.bearing - 170.0).abs() < 1e-9);
        vp.set_pitch(120.0);
        assert_eq!(vp.pitch, MAX_PITCH);
    }
}
