use crate::braille::BrailleCanvas;

pub type Rgb = [u8; 3];

/// Dots drawn past the canvas edge, so thick strokes stay continuous at the border
const CLIP_MARGIN: f64 = 2.0;

/// Clip a segment to the canvas (plus a small margin) with Liang-Barsky.
/// Segments already inside come back unchanged; `None` when nothing is inside.
pub fn clip_segment(canvas: &BrailleCanvas, a: (i32, i32), b: (i32, i32)) -> Option<((i32, i32), (i32, i32))> {
    let (x_min, y_min) = (-CLIP_MARGIN, -CLIP_MARGIN);
    let x_max = (canvas.width() * 2) as f64 - 1.0 + CLIP_MARGIN;
    let y_max = (canvas.height() * 4) as f64 - 1.0 + CLIP_MARGIN;
    let inside = |(x, y): (i32, i32)| {
        let (x, y) = (x as f64, y as f64);
        x >= x_min && x <= x_max && y >= y_min && y <= y_max
    };
    if inside(a) && inside(b) {
        return Some((a, b));
    }

    let (ax, ay) = (a.0 as f64, a.1 as f64);
    let (dx, dy) = (b.0 as f64 - ax, b.1 as f64 - ay);
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in [(-dx, ax - x_min), (dx, x_max - ax), (-dy, ay - y_min), (dy, y_max - ay)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }

    let at = |t: f64| ((ax + t * dx).round() as i32, (ay + t * dy).round() as i32);
    Some((at(t0), at(t1)))
}

/// Draw a line using Bresenham's algorithm, clipped to the canvas
pub fn draw_line(canvas: &mut BrailleCanvas, x0: i32, y0: i32, x1: i32, y1: i32, rgb: Rgb) {
    let Some(((x0, y0), (x1, y1))) = clip_segment(canvas, (x0, y0), (x1, y1)) else {
        return;
    };
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    let mut x = x0;
    let mut y = y0;

    loop {
        canvas.set_pixel_signed(x, y, rgb);

        if x == x1 && y == y1 {
            break;
        }

        let e2 = 2 * err;

        if e2 >= dy {
            if x == x1 {
                break;
            }
            err += dy;
            x += sx;
        }

        if e2 <= dx {
            if y == y1 {
                break;
            }
            err += dx;
            y += sy;
        }
    }
}

/// Draw a thicker line (highlighted paths)
pub fn draw_thick_line(canvas: &mut BrailleCanvas, x0: i32, y0: i32, x1: i32, y1: i32, rgb: Rgb) {
    draw_line(canvas, x0, y0, x1, y1, rgb);
    draw_line(canvas, x0.saturating_add(1), y0, x1.saturating_add(1), y1, rgb);
    draw_line(canvas, x0, y0.saturating_add(1), x1, y1.saturating_add(1), rgb);
}

/// Draw a filled circle (station markers)
pub fn draw_circle(canvas: &mut BrailleCanvas, cx: i32, cy: i32, radius: i32, rgb: Rgb) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                canvas.set_pixel_signed(cx + dx, cy + dy, rgb);
            }
        }
    }
}

/// Even-odd scanline fill of a closed polygon given in pixel coordinates
pub fn fill_polygon(canvas: &mut BrailleCanvas, points: &[(i32, i32)], rgb: Rgb) {
    if points.len() < 3 {
        return;
    }
    let min_y = points.iter().map(|p| p.1).min().unwrap_or(0).max(0);
    let max_y = points
        .iter()
        .map(|p| p.1)
        .max()
        .unwrap_or(0)
        .min(canvas.height() as i32 * 4 - 1);

    let max_x = canvas.width() as i32 * 2 - 1;

    let mut crossings: Vec<i32> = Vec::with_capacity(8);
    for y in min_y..=max_y {
        crossings.clear();
        let scan = y as f64 + 0.5;
        for i in 0..points.len() {
            let (x0, y0) = points[i];
            let (x1, y1) = points[(i + 1) % points.len()];
            let (fy0, fy1) = (y0 as f64, y1 as f64);
            if (fy0 <= scan && fy1 > scan) || (fy1 <= scan && fy0 > scan) {
                let t = (scan - fy0) / (fy1 - fy0);
                let x = x0 as f64 + t * (x1 as f64 - x0 as f64);
                crossings.push(x.round().clamp(-1.0, max_x as f64 + 1.0) as i32);
            }
        }
        crossings.sort_unstable();
        for pair in crossings.chunks_exact(2) {
            for x in pair[0].max(0)..=pair[1].min(max_x) {
                canvas.set_pixel_signed(x, y, rgb);
            }
        }
    }
}

/// Even-odd point-in-polygon test in pixel space
pub fn point_in_polygon(px: f64, py: f64, points: &[(i32, i32)]) -> bool {
    let mut inside = false;
    let n = points.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (points[i].0 as f64, points[i].1 as f64);
        let (xj, yj) = (points[j].0 as f64, points[j].1 as f64);
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Distance from a pixel to a segment
pub fn distance_to_segment(px: f64, py: f64, a: (i32, i32), b: (i32, i32)) -> f64 {
    let (ax, ay) = (a.0 as f64, a.1 as f64);
    let (bx, by) = (b.0 as f64, b.1 as f64);
    let (dx, dy) = (bx - ax, by - ay);
    let len2 = dx * dx + dy * dy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((px - ax) * dx + (py - ay) * dy) / len2).clamp(0.0, 1.0)
    };
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}
