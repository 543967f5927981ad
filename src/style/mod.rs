pub mod color;

pub use color::{parse_hex_color, LinePalette};

use serde::Deserialize;

/// RGBA color, 0-255 per channel
pub type Rgba = [u8; 4];

/// Alpha shared by the surface bins and explicit line colors
pub const ALPHA: u8 = 200;

/// One step of the walk-time color ramp
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColorBin {
    /// Inclusive upper bound in minutes; omitted means unbounded
    #[serde(default = "unbounded")]
    pub upper_bound: f64,
    pub color: Rgba,
}

fn unbounded() -> f64 {
    f64::INFINITY
}

impl ColorBin {
    pub const fn new(upper_bound: f64, color: Rgba) -> Self {
        Self { upper_bound, color }
    }
}

/// Parameters of the extrusion curve
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ElevationParams {
    /// Walk time at (and beyond) which a column gets only the minimum height
    pub cap_minutes: f64,
    /// Exponent applied to the remaining-time ratio; > 1 favours short walks
    pub exponent: f64,
    pub max_height_m: f64,
    pub min_height_m: f64,
    /// Walk times at or below this count as "at the station"
    pub epsilon: f64,
}

impl Default for ElevationParams {
    fn default() -> Self {
        Self {
            cap_minutes: 30.0,
            exponent: 2.3,
            max_height_m: 4500.0,
            min_height_m: 15.0,
            epsilon: 0.01,
        }
    }
}

/// Maps average walk time to fill color and column height
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetricScale {
    /// Ascending by `upper_bound`
    pub bins: Vec<ColorBin>,
    pub no_data: Rgba,
    pub elevation: ElevationParams,
}

impl Default for MetricScale {
    fn default() -> Self {
        Self {
            bins: vec![
                ColorBin::new(2.5, [252, 255, 164, ALPHA]),
                ColorBin::new(5.0, [245, 219, 75, ALPHA]),
                ColorBin::new(7.5, [252, 173, 18, ALPHA]),
                ColorBin::new(10.0, [247, 131, 17, ALPHA]),
                ColorBin::new(12.5, [230, 93, 47, ALPHA]),
                ColorBin::new(15.0, [203, 65, 73, ALPHA]),
                ColorBin::new(17.5, [169, 46, 94, ALPHA]),
                ColorBin::new(20.0, [133, 33, 107, ALPHA]),
                ColorBin::new(22.5, [96, 19, 110, ALPHA]),
                ColorBin::new(25.0, [58, 9, 99, ALPHA]),
                ColorBin::new(27.5, [20, 11, 53, ALPHA]),
                ColorBin::new(f64::INFINITY, [0, 0, 4, ALPHA]),
            ],
            no_data: [200, 200, 200, ALPHA - 80],
            elevation: ElevationParams::default(),
        }
    }
}

/// One row of the legend
#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub label: String,
    pub color: Rgba,
}

pub const LEGEND_TITLE: &str = "Avg walk time (min)";
pub const NO_DATA_LABEL: &str = "No data / unreachable";

impl MetricScale {
    /// Fill color for a walk time. Missing or NaN values get the no-data color.
    pub fn color_for(&self, metric: Option<f64>) -> Rgba {
        let Some(value) = metric.filter(|v| !v.is_nan()) else {
            return self.no_data;
        };
        for bin in &self.bins {
            if value <= bin.upper_bound {
                return bin.color;
            }
        }
        self.bins.last().map(|b| b.color).unwrap_or(self.no_data)
    }

    /// Column height in meters for a walk time, scaled by the extrusion multiplier
    pub fn elevation_for(&self, metric: Option<f64>, multiplier: f64) -> f64 {
        let p = &self.elevation;
        let value = match metric {
            Some(v) if !v.is_nan() && v >= 0.0 => v,
            _ => return p.min_height_m * multiplier,
        };

        let mut proportion = 0.0;
        if value < p.cap_minutes && value > p.epsilon {
            proportion = (1.0 - value / p.cap_minutes).powf(p.exponent);
        } else if value <= p.epsilon {
            proportion = 1.0;
        }
        let proportion = proportion.clamp(0.0, 1.0);

        (proportion * p.max_height_m + p.min_height_m) * multiplier
    }

    /// Legend rows derived from the bin table, ending with the no-data row
    pub fn legend(&self) -> Vec<LegendEntry> {
        let mut entries = Vec::with_capacity(self.bins.len() + 1);
        let mut lower: Option<f64> = None;

        for bin in &self.bins {
            let label = match (lower, bin.upper_bound.is_finite()) {
                (None, true) => format!("≤ {}", fmt_bound(bin.upper_bound)),
                (None, false) => "all".to_string(),
                (Some(lb), true) => format!("{} – {}", fmt_bound(lb), fmt_bound(bin.upper_bound)),
                (Some(lb), false) => format!("> {}", fmt_bound(lb)),
            };
            entries.push(LegendEntry { label, color: bin.color });
            if bin.upper_bound.is_finite() {
                lower = Some(bin.upper_bound);
            }
        }

        entries.push(LegendEntry {
            label: NO_DATA_LABEL.to_string(),
            color: self.no_data,
        });
        entries
    }
}

/// Bounds print without a trailing ".0" (5 rather than 5.0)
fn fmt_bound(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}
