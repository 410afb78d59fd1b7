use glam::DVec2;

use crate::raster::Raster;

/// Local maxima above `threshold` within a `box_size x box_size` neighborhood.
///
/// On a plateau only the first pixel in raster order is reported. Positions
/// are relative to `data`.
pub fn find_peaks(data: &Raster, threshold: f32, box_size: usize) -> Vec<DVec2> {
    let half = (box_size / 2) as i64;
    let mut peaks = Vec::new();

    for (x, y, &value) in data.iter_xy() {
        if !(value.is_finite() && value > threshold) {
            continue;
        }
        let (xi, yi) = (x as i64, y as i64);
        let mut is_peak = true;
        'window: for dy in -half..=half {
            for dx in -half..=half {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let Some(&other) = data.get_checked(xi + dx, yi + dy) else {
                    continue;
                };
                let earlier = dy < 0 || (dy == 0 && dx < 0);
                if other > value || (earlier && other == value) {
                    is_peak = false;
                    break 'window;
                }
            }
        }
        if is_peak {
            peaks.push(DVec2::new(x as f64, y as f64));
        }
    }

    peaks
}
