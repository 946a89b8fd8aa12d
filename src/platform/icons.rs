//! Icon generation.
//!
//! Draws the tray speaker glyph as RGBA pixels, so no image assets ship
//! with the binary.

/// Icon size in pixels.
pub const ICON_SIZE: u32 = 32;

const GLYPH: [u8; 3] = [235, 235, 235];
const STRIKE: [u8; 3] = [220, 60, 60];

/// Generate the speaker icon as RGBA data. The muted variant drops the sound
/// waves and adds a red strike-through.
pub fn speaker_rgba(muted: bool) -> Vec<u8> {
    let size = ICON_SIZE as usize;
    let mut rgba = vec![0u8; size * size * 4];

    draw_speaker(&mut rgba, size);
    if muted {
        draw_strike_through(&mut rgba, size);
    } else {
        draw_waves(&mut rgba, size);
    }

    rgba
}

fn put(rgba: &mut [u8], size: usize, x: usize, y: usize, color: [u8; 3], alpha: u8) {
    if x >= size || y >= size {
        return;
    }
    let idx = (y * size + x) * 4;
    rgba[idx..idx + 3].copy_from_slice(&color);
    rgba[idx + 3] = rgba[idx + 3].max(alpha);
}

/// Magnet box plus flared cone.
fn draw_speaker(rgba: &mut [u8], size: usize) {
    let mid = size / 2;

    // Box
    for y in mid - 4..mid + 4 {
        for x in 5..11 {
            put(rgba, size, x, y, GLYPH, 255);
        }
    }

    // Cone widens by one pixel per column on each side
    for (step, x) in (11..18).enumerate() {
        let half = 4 + step;
        for y in mid - half..mid + half {
            put(rgba, size, x, y, GLYPH, 255);
        }
    }
}

/// Two arcs to the right of the cone.
fn draw_waves(rgba: &mut [u8], size: usize) {
    let cx = 17.0f32;
    let cy = size as f32 / 2.0;

    for y in 0..size {
        for x in 19..size {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            // Keep to a cone of about 50 degrees either side of horizontal
            if dy.abs() > dx * 1.2 {
                continue;
            }
            let dist = (dx * dx + dy * dy).sqrt();
            for radius in [6.0f32, 11.0] {
                let edge = 1.0 - ((dist - radius).abs() - 0.75).max(0.0);
                if edge > 0.0 {
                    put(rgba, size, x, y, GLYPH, (edge.min(1.0) * 255.0) as u8);
                }
            }
        }
    }
}

/// Thick diagonal from top left to bottom right.
fn draw_strike_through(rgba: &mut [u8], size: usize) {
    for i in 3..size - 3 {
        for offset in 0..3 {
            put(rgba, size, i + offset, i, STRIKE, 255);
        }
    }
}
