//! Deterministic frame fixtures shared by the core unit tests.

use crate::types::RgbFrame;

/// Splitmix-style step; deterministic across platforms.
fn next(state: &mut u64) -> u32 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    (*state >> 33) as u32
}

/// A frame with every channel set to `value`.
pub(crate) fn uniform_frame(width: u32, height: u32, value: u8) -> RgbFrame {
    RgbFrame::new(
        vec![value; width as usize * height as usize * 3],
        width,
        height,
    )
    .unwrap()
}

/// A frame with a diagonal ramp plus seeded noise.
///
/// Mid-range brightness, moderate sharpness and per-channel spread, so the
/// fixture passes both the quality gate and the liveness heuristics. Distinct
/// seeds give visually unrelated textures.
pub(crate) fn textured_frame(width: u32, height: u32, seed: u64) -> RgbFrame {
    let mut rng = seed.wrapping_mul(0x9E3779B97F4A7C15).wrapping_add(seed + 1);
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);

    for y in 0..height {
        for x in 0..width {
            let ramp = (x as f32 / width as f32) * 128.0 + (y as f32 / height as f32) * 64.0 + 48.0;
            let noise = (next(&mut rng) % 19) as f32 - 9.0;
            let r = ramp + noise;
            let g = ramp * 0.9 + noise;
            let b = ramp * 0.8 - noise;
            data.push(r.round().clamp(0.0, 255.0) as u8);
            data.push(g.round().clamp(0.0, 255.0) as u8);
            data.push(b.round().clamp(0.0, 255.0) as u8);
        }
    }

    RgbFrame::new(data, width, height).unwrap()
}

/// `frame` with every channel shifted by `delta` — a near-duplicate capture.
pub(crate) fn brightness_shifted(frame: &RgbFrame, delta: i16) -> RgbFrame {
    let data = frame
        .data
        .iter()
        .map(|&p| (p as i16 + delta).clamp(0, 255) as u8)
        .collect();
    RgbFrame::new(data, frame.width, frame.height).unwrap()
}
