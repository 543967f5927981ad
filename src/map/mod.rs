mod basemap;
mod geometry;
mod projection;
mod renderer;

pub use basemap::Basemap;
pub use projection::{Viewport, MAX_PITCH};
pub use renderer::{Label, MapSurface, Pick};
