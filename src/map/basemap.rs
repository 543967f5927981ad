use std::fmt;

use super::geometry::Rgb;
use crate::style::Rgba;

/// Background style drawn under the data layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Basemap {
    Satellite,
    Streets,
    Topo,
    Dark,
}

impl Basemap {
    pub const ALL: [Basemap; 4] = [Basemap::Satellite, Basemap::Streets, Basemap::Topo, Basemap::Dark];

    pub fn id(self) -> &'static str {
        match self {
            Basemap::Satellite => "satellite",
            Basemap::Streets => "streets",
            Basemap::Topo => "topo",
            Basemap::Dark => "dark",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Basemap::Satellite => "Satellite",
            Basemap::Streets => "Streets",
            Basemap::Topo => "Topographic",
            Basemap::Dark => "Dark",
        }
    }

    /// Case-insensitive lookup by id
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.id().eq_ignore_ascii_case(id.trim()))
    }

    pub fn next(self) -> Self {
        match self {
            Basemap::Satellite => Basemap::Streets,
            Basemap::Streets => Basemap::Topo,
            Basemap::Topo => Basemap::Dark,
            Basemap::Dark => Basemap::Satellite,
        }
    }

    /// Pane background
    pub fn background(self) -> Rgb {
        match self {
            Basemap::Satellite => [12, 22, 16],
            Basemap::Streets => [28, 30, 36],
            Basemap::Topo => [30, 27, 20],
            Basemap::Dark => [0, 0, 0],
        }
    }

    /// Color of the backdrop geometry (coastline, roads)
    pub fn backdrop(self) -> Rgb {
        match self {
            Basemap::Satellite => [70, 100, 70],
            Basemap::Streets => [95, 100, 115],
            Basemap::Topo => [130, 110, 75],
            Basemap::Dark => [60, 60, 60],
        }
    }

    /// Composite a translucent color over the background
    pub fn blend(self, color: Rgba) -> Rgb {
        let bg = self.background();
        let a = color[3] as u32;
        let mix = |fg: u8, bg: u8| ((fg as u32 * a + bg as u32 * (255 - a)) / 255) as u8;
        [mix(color[0], bg[0]), mix(color[1], bg[1]), mix(color[2], bg[2])]
    }
}

impl Default for Basemap {
    fn default() -> Self {
        Basemap::Streets
    }
}

impl fmt::Display for Basemap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
