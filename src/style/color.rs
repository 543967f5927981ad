use std::collections::BTreeMap;

use serde::Deserialize;

use super::{Rgba, ALPHA};
use crate::data::{LineFragment, LineId};

/// Parse `#rrggbb`, `rrggbb`, `#rgb` or `rgb` into a color with the given alpha.
/// Returns `None` for anything else so callers can fall through to the next rule.
pub fn parse_hex_color(raw: &str, alpha: u8) -> Option<Rgba> {
    let hex = raw.trim();
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    match hex.len() {
        6 => {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some([r, g, b, alpha])
        }
        3 => {
            let mut out = [0u8, 0, 0, alpha];
            for (i, c) in hex.chars().enumerate() {
                let nibble = c.to_digit(16)? as u8;
                out[i] = nibble * 17;
            }
            Some(out)
        }
        _ => None,
    }
}

/// Property holding an explicit line color
pub const COLOR_PROPERTY: &str = "color";

/// Colors for transit lines
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LinePalette {
    /// Fallback colors keyed by line id
    pub named: BTreeMap<String, Rgba>,
    pub default_color: Rgba,
    pub highlight_color: Rgba,
    /// Alpha given to colors parsed from hex strings
    pub alpha: u8,
}

impl Default for LinePalette {
    fn default() -> Self {
        let named = [
            ("1号线", [0, 177, 64, 255]),
            ("2号线", [185, 71, 0, 255]),
            ("3号线", [0, 162, 225, 255]),
            ("4号线", [220, 36, 31, 255]),
            ("5号线", [160, 94, 181, 255]),
            ("6号线", [0, 176, 168, 255]),
            ("7号线", [0, 53, 173, 255]),
            ("8号线", [231, 121, 41, 255]),
            ("9号线", [123, 100, 105, 255]),
            ("10号线", [248, 119, 158, 255]),
            ("11号线", [101, 44, 144, 255]),
            ("12号线", [163, 199, 64, 255]),
            ("14号线", [241, 196, 15, 255]),
            ("16号线", [33, 64, 154, 255]),
            ("20号线", [136, 200, 230, 255]),
        ]
        .into_iter()
        .map(|(name, color)| (name.to_string(), color))
        .collect();

        Self {
            named,
            default_color: [160, 160, 160, ALPHA],
            highlight_color: [255, 255, 0, 255],
            alpha: ALPHA,
        }
    }
}

impl LinePalette {
    /// Render color of a fragment.
    ///
    /// The highlighted line wins outright. After that an explicit hex color on the
    /// feature, then the named table, then the default.
    pub fn resolve(&self, fragment: &LineFragment, highlighted: Option<&LineId>) -> Rgba {
        if highlighted == Some(&fragment.parent) {
            return self.highlight_color;
        }

        if let Some(color) = fragment
            .properties
            .get(COLOR_PROPERTY)
            .and_then(|v| v.as_str())
            .and_then(|s| parse_hex_color(s, self.alpha))
        {
            return color;
        }

        if let Some(color) = self.named.get(fragment.parent.as_str()) {
            return *color;
        }

        self.default_color
    }
}
