//! Text rendering of the two needles.

use vu_capture_core::{MeterScale, VuReading};

const BELOW_ZERO: char = '=';
const ABOVE_ZERO: char = '+';
const EMPTY: char = ' ';

/// Column count covered by `vu_db` on a bar of `width` columns.
pub fn filled_columns(vu_db: f32, scale: MeterScale, width: usize) -> usize {
    if !vu_db.is_finite() {
        return 0;
    }
    let span = scale.max_vu - scale.min_vu;
    let fraction = ((scale.clamp(vu_db) - scale.min_vu) / span).clamp(0.0, 1.0);
    (fraction * width as f32).round() as usize
}

/// Bar with the part past 0 VU drawn in a different glyph.
pub fn render_bar(vu_db: f32, scale: MeterScale, width: usize) -> String {
    let filled = filled_columns(vu_db, scale, width);
    let zero = filled_columns(0.0, scale, width);
    (0..width)
        .map(|col| match col {
            c if c >= filled => EMPTY,
            c if c < zero => BELOW_ZERO,
            _ => ABOVE_ZERO,
        })
        .collect()
}

pub fn render_line(reading: VuReading, scale: MeterScale, width: usize) -> String {
    format!(
        "L [{}] {:>6.1}  R [{}] {:>6.1} VU",
        render_bar(reading.left_db, scale, width),
        reading.left_db,
        render_bar(reading.right_db, scale, width),
        reading.right_db
    )
}
