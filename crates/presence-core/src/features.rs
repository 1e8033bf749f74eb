//! Multi-feature face encoding.
//!
//! A face region is canonicalized to 128x128 and summarized as a fixed
//! 272-component vector: color distribution (CIELAB histograms), structure
//! (gradient-orientation grid), texture (local binary patterns) and contour
//! density (edge-map histogram). Each block is L2-normalized independently so
//! no single feature family dominates the fused distance metrics.
//!
//! The block order and lengths are load-bearing: stored signatures are only
//! comparable to vectors produced by this exact scheme. See
//! [`crate::types::SIGNATURE_LEN`].

use crate::types::{
    RgbFrame, Signature, COLOR_BINS, EDGE_BINS, GRADIENT_BINS, SIGNATURE_LEN, TEXTURE_BINS,
};

/// Canonical face size for encoding.
const CANONICAL_SIZE: u32 = 128;
/// Cells per axis of the gradient-orientation grid.
const GRID_CELLS: usize = 4;
/// Unsigned orientation bins per grid cell (GRID_CELLS^2 * ORIENTATION_BINS = 128).
const ORIENTATION_BINS: usize = 8;
/// Canny hysteresis thresholds on gradient magnitude.
const EDGE_LOW_THRESHOLD: f32 = 100.0;
const EDGE_HIGH_THRESHOLD: f32 = 200.0;

/// Encode a cropped face region into a signature.
///
/// Deterministic: identical pixel input yields an identical vector.
pub fn encode(region: &RgbFrame) -> Signature {
    let canonical = region.resize_bilinear(CANONICAL_SIZE, CANONICAL_SIZE);
    let gray = canonical.to_luma();
    let size = CANONICAL_SIZE as usize;

    let mut values = Vec::with_capacity(SIGNATURE_LEN);
    let (hist_l, hist_a, hist_b) = lab_histograms(&canonical);
    values.extend_from_slice(&hist_l);
    values.extend_from_slice(&hist_a);
    values.extend_from_slice(&hist_b);
    values.extend_from_slice(&gradient_histogram(&gray.data, size));
    values.extend_from_slice(&lbp_histogram(&gray.data, size));
    values.extend_from_slice(&edge_histogram(&gray.data, size));

    debug_assert_eq!(values.len(), SIGNATURE_LEN);
    Signature::new(values).expect("encoder produced a mis-sized vector")
}

/// 32-bin L2-normalized histograms of the CIELAB channels.
///
/// CIELAB separates lightness from chroma, which keeps the color blocks
/// usable under moderate lighting shifts. Channels are scaled to 0..255
/// before binning (L * 255/100, a and b offset by 128).
fn lab_histograms(frame: &RgbFrame) -> ([f32; COLOR_BINS], [f32; COLOR_BINS], [f32; COLOR_BINS]) {
    let mut hist_l = [0f32; COLOR_BINS];
    let mut hist_a = [0f32; COLOR_BINS];
    let mut hist_b = [0f32; COLOR_BINS];

    for px in frame.data.chunks_exact(3) {
        let (l, a, b) = rgb_to_lab(px[0], px[1], px[2]);
        hist_l[(l / 8.0) as usize % COLOR_BINS] += 1.0;
        hist_a[(a / 8.0) as usize % COLOR_BINS] += 1.0;
        hist_b[(b / 8.0) as usize % COLOR_BINS] += 1.0;
    }

    l2_normalize(&mut hist_l);
    l2_normalize(&mut hist_a);
    l2_normalize(&mut hist_b);
    (hist_l, hist_a, hist_b)
}

/// sRGB (8-bit) to CIELAB, channels scaled to 0..255.
fn rgb_to_lab(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    // sRGB gamma expansion
    fn linearize(c: u8) -> f32 {
        let c = c as f32 / 255.0;
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    }

    let (r, g, b) = (linearize(r), linearize(g), linearize(b));

    // Linear RGB -> XYZ (D65)
    let x = 0.4124 * r + 0.3576 * g + 0.1805 * b;
    let y = 0.2126 * r + 0.7152 * g + 0.0722 * b;
    let z = 0.0193 * r + 0.1192 * g + 0.9505 * b;

    // XYZ -> Lab, D65 white point
    fn f(t: f32) -> f32 {
        const DELTA: f32 = 6.0 / 29.0;
        if t > DELTA * DELTA * DELTA {
            t.cbrt()
        } else {
            t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
        }
    }

    let fx = f(x / 0.95047);
    let fy = f(y / 1.0);
    let fz = f(z / 1.08883);

    let l = 116.0 * fy - 16.0;
    let a = 500.0 * (fx - fy);
    let b = 200.0 * (fy - fz);

    (
        (l * 255.0 / 100.0).clamp(0.0, 255.0),
        (a + 128.0).clamp(0.0, 255.0),
        (b + 128.0).clamp(0.0, 255.0),
    )
}

/// Magnitude-weighted gradient-orientation histogram over a 4x4 cell grid.
///
/// Sobel gradients, unsigned orientation (0-180 degrees) in 8 bins per cell.
/// The whole 128-value block is L2-normalized as one unit.
fn gradient_histogram(gray: &[u8], size: usize) -> [f32; GRADIENT_BINS] {
    let mut hist = [0f32; GRADIENT_BINS];
    let cell_size = size / GRID_CELLS;
    let bin_width = 180.0 / ORIENTATION_BINS as f32;

    for y in 1..size - 1 {
        for x in 1..size - 1 {
            let (gx, gy) = sobel_at(gray, size, x, y);
            let magnitude = (gx * gx + gy * gy).sqrt();
            if magnitude == 0.0 {
                continue;
            }

            let mut angle = gy.atan2(gx).to_degrees();
            if angle < 0.0 {
                angle += 180.0;
            }
            if angle >= 180.0 {
                angle -= 180.0;
            }
            let bin = ((angle / bin_width) as usize).min(ORIENTATION_BINS - 1);

            let cell = (y / cell_size).min(GRID_CELLS - 1) * GRID_CELLS
                + (x / cell_size).min(GRID_CELLS - 1);
            hist[cell * ORIENTATION_BINS + bin] += magnitude;
        }
    }

    l2_normalize(&mut hist);
    hist
}

/// 3x3 Sobel response at (x, y). Caller keeps (x, y) interior.
#[inline]
fn sobel_at(gray: &[u8], size: usize, x: usize, y: usize) -> (f32, f32) {
    let px = |x: usize, y: usize| gray[y * size + x] as f32;

    let gx = px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1)
        - px(x - 1, y - 1)
        - 2.0 * px(x - 1, y)
        - px(x - 1, y + 1);
    let gy = px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1)
        - px(x - 1, y - 1)
        - 2.0 * px(x, y - 1)
        - px(x + 1, y - 1);
    (gx, gy)
}

/// 32-bin L2-normalized histogram of the 8-neighbor local binary pattern.
///
/// Neighbor order runs clockwise from the top-left corner; a neighbor >= the
/// center pixel sets its bit. Codes are grouped 8 per bin.
fn lbp_histogram(gray: &[u8], size: usize) -> [f32; TEXTURE_BINS] {
    let px = |x: usize, y: usize| gray[y * size + x];
    let mut hist = [0f32; TEXTURE_BINS];

    for y in 1..size - 1 {
        for x in 1..size - 1 {
            let center = px(x, y);
            let neighbors = [
                px(x - 1, y - 1),
                px(x, y - 1),
                px(x + 1, y - 1),
                px(x + 1, y),
                px(x + 1, y + 1),
                px(x, y + 1),
                px(x - 1, y + 1),
                px(x - 1, y),
            ];

            let mut code = 0u8;
            for (bit, &n) in neighbors.iter().enumerate() {
                if n >= center {
                    code |= 1 << bit;
                }
            }

            hist[code as usize * TEXTURE_BINS / 256] += 1.0;
        }
    }

    l2_normalize(&mut hist);
    hist
}

/// 16-bin L2-normalized histogram of a Canny-style binary edge map.
///
/// The map is binary (0 or 255), so the histogram reduces to contour density;
/// the 16-bin shape keeps the block byte-compatible with the stored layout.
fn edge_histogram(gray: &[u8], size: usize) -> [f32; EDGE_BINS] {
    let edges = canny_edges(gray, size);

    let mut hist = [0f32; EDGE_BINS];
    for &v in &edges {
        hist[v as usize * EDGE_BINS / 256] += 1.0;
    }

    l2_normalize(&mut hist);
    hist
}

/// Compact Canny: Gaussian smooth, Sobel, orientation-quantized non-maximum
/// suppression, double-threshold hysteresis. Returns a binary map (0 / 255).
fn canny_edges(gray: &[u8], size: usize) -> Vec<u8> {
    let smoothed = gaussian_smooth(gray, size);

    // Gradient magnitude and quantized direction (0, 45, 90, 135 degrees)
    let mut magnitude = vec![0f32; size * size];
    let mut direction = vec![0u8; size * size];
    for y in 1..size - 1 {
        for x in 1..size - 1 {
            let (gx, gy) = sobel_f32(&smoothed, size, x, y);
            magnitude[y * size + x] = (gx * gx + gy * gy).sqrt();

            let mut angle = gy.atan2(gx).to_degrees();
            if angle < 0.0 {
                angle += 180.0;
            }
            direction[y * size + x] = match angle {
                a if !(22.5..157.5).contains(&a) => 0, // horizontal gradient
                a if a < 67.5 => 1,                    // diagonal /
                a if a < 112.5 => 2,                   // vertical
                _ => 3,                                // diagonal \
            };
        }
    }

    // Non-maximum suppression along the gradient direction
    let mut thinned = vec![0f32; size * size];
    for y in 1..size - 1 {
        for x in 1..size - 1 {
            let i = y * size + x;
            let m = magnitude[i];
            let (n1, n2) = match direction[i] {
                0 => (magnitude[i - 1], magnitude[i + 1]),
                1 => (magnitude[i - size + 1], magnitude[i + size - 1]),
                2 => (magnitude[i - size], magnitude[i + size]),
                _ => (magnitude[i - size - 1], magnitude[i + size + 1]),
            };
            if m >= n1 && m >= n2 {
                thinned[i] = m;
            }
        }
    }

    // Hysteresis: strong edges seed a flood fill; weak edges survive only
    // when 8-connected to a strong one
    let mut edges = vec![0u8; size * size];
    let mut stack: Vec<usize> = Vec::new();
    for i in 0..size * size {
        if thinned[i] >= EDGE_HIGH_THRESHOLD && edges[i] == 0 {
            edges[i] = 255;
            stack.push(i);
            while let Some(j) = stack.pop() {
                let jx = (j % size) as isize;
                let jy = (j / size) as isize;
                for dy in -1isize..=1 {
                    for dx in -1isize..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let (nx, ny) = (jx + dx, jy + dy);
                        if nx < 0 || ny < 0 || nx >= size as isize || ny >= size as isize {
                            continue;
                        }
                        let n = ny as usize * size + nx as usize;
                        if edges[n] == 0 && thinned[n] >= EDGE_LOW_THRESHOLD {
                            edges[n] = 255;
                            stack.push(n);
                        }
                    }
                }
            }
        }
    }

    edges
}

/// Separable 5x5 Gaussian smoothing (sigma ~1.4), borders clamped.
fn gaussian_smooth(gray: &[u8], size: usize) -> Vec<f32> {
    const KERNEL: [f32; 5] = [0.1201, 0.2339, 0.2920, 0.2339, 0.1201];

    let clamp = |v: isize| v.clamp(0, size as isize - 1) as usize;

    // Horizontal pass
    let mut tmp = vec![0f32; size * size];
    for y in 0..size {
        for x in 0..size {
            let mut acc = 0.0;
            for (k, &w) in KERNEL.iter().enumerate() {
                let sx = clamp(x as isize + k as isize - 2);
                acc += w * gray[y * size + sx] as f32;
            }
            tmp[y * size + x] = acc;
        }
    }

    // Vertical pass
    let mut out = vec![0f32; size * size];
    for y in 0..size {
        for x in 0..size {
            let mut acc = 0.0;
            for (k, &w) in KERNEL.iter().enumerate() {
                let sy = clamp(y as isize + k as isize - 2);
                acc += w * tmp[sy * size + x];
            }
            out[y * size + x] = acc;
        }
    }

    out
}

/// Sobel on an f32 buffer. Caller keeps (x, y) interior.
#[inline]
fn sobel_f32(buf: &[f32], size: usize, x: usize, y: usize) -> (f32, f32) {
    let px = |x: usize, y: usize| buf[y * size + x];

    let gx = px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1)
        - px(x - 1, y - 1)
        - 2.0 * px(x - 1, y)
        - px(x - 1, y + 1);
    let gy = px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1)
        - px(x - 1, y - 1)
        - 2.0 * px(x, y - 1)
        - px(x + 1, y - 1);
    (gx, gy)
}

/// Scale a block to unit L2 norm. An all-zero block stays zero.
fn l2_normalize(block: &mut [f32]) {
    let norm: f32 = block.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in block.iter_mut() {
            *v /= norm;
        }
    }
}
