//! Transit accessibility dashboard: walking-time hexagons, metro stations and
//! lines drawn as layers over a terminal map.

pub mod braille;
pub mod config;
pub mod data;
pub mod layers;
pub mod map;
pub mod store;
pub mod style;
pub mod tooltip;

pub use config::DashboardConfig;
pub use data::{DatasetKind, LoadError};
pub use layers::{build_layers, LayerId, LayerSpec};
pub use store::{LayerSink, VisualizationStore};
