//! Tone mapping and BCM lookup table construction.
//!
//! The lookup table turns an 8-bit channel value into a right-aligned
//! `bit_depth`-bit BCM mask, folding in gamma, per-channel calibration,
//! the selected tone curve and (when jitter brightness is off) the overall
//! brightness. Building it is 768 entries of `O(bit_depth)` work, so it is
//! done once per tone-map identity and shared read-only afterwards; the
//! per-frame path only indexes it.

use crate::config::{SceneConfig, ToneMap};

// ACES filmic approximation constants.
const ACES_A: f32 = 2.51;
const ACES_B: f32 = 0.03;
const ACES_C: f32 = 2.43;
const ACES_D: f32 = 0.59;
const ACES_E: f32 = 0.14;

// Hable / Uncharted 2 constants.
const UNCHART_A: f32 = 0.15;
const UNCHART_B: f32 = 0.50;
const UNCHART_C: f32 = 0.10;
const UNCHART_D: f32 = 0.20;
const UNCHART_E: f32 = 0.02;
const UNCHART_F: f32 = 0.30;

/// Normalize a channel byte to 0.0-1.0.
#[inline]
pub fn normalize8(value: u8) -> f32 {
    f32::from(value) / 255.0
}

#[inline]
fn clampf(x: f32, lower: f32, upper: f32) -> f32 {
    x.max(lower).min(upper)
}

/// Gamma-correct a normalized value.
#[inline]
pub fn gamma_correct(x: f32, gamma: f32) -> f32 {
    x.powf(gamma)
}

/// Rec.601 luma of a normalized RGB triple.
#[inline]
fn luminance(rgb: [f32; 3]) -> f32 {
    0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2]
}

#[inline]
fn aces_tone_map(c: f32) -> f32 {
    (c * (ACES_A * c + ACES_B)) / (c * (ACES_C * c + ACES_D) + ACES_E)
}

#[inline]
fn reinhard_tone_map(c: f32, white: f32) -> f32 {
    let white = if white > 0.0 { white } else { 1.0 };
    c * (1.0 + c / (white * white)) / (1.0 + c)
}

#[inline]
fn hable_tone_map(c: f32) -> f32 {
    ((c * (UNCHART_A * c + UNCHART_C * UNCHART_B) + UNCHART_D * UNCHART_E)
        / (c * (UNCHART_A * c + UNCHART_B) + UNCHART_D * UNCHART_F))
        - UNCHART_E / UNCHART_F
}

/// Sigmoid contrast curve, renormalized so 0 maps to 0 and 1 maps to 1.
#[inline]
fn sigmoid_tone_map(c: f32, steepness: f32) -> f32 {
    let k = if steepness > 0.0 { steepness } else { 6.0 };
    let s = |x: f32| 1.0 / (1.0 + (-k * (x - 0.5)).exp());
    let lo = s(0.0);
    let hi = s(1.0);
    (s(c) - lo) / (hi - lo)
}

impl ToneMap {
    /// Apply this curve to a normalized RGB triple. Pure; the only state is
    /// the curve selection and `level`.
    pub fn apply(self, rgb: [f32; 3], level: f32) -> [f32; 3] {
        let per_channel = |f: fn(f32) -> f32, rgb: [f32; 3]| rgb.map(f);
        let out = match self {
            ToneMap::None => rgb,
            ToneMap::Aces => per_channel(aces_tone_map, rgb),
            ToneMap::Reinhard => rgb.map(|c| reinhard_tone_map(c, level)),
            ToneMap::Hable => per_channel(hable_tone_map, rgb),
            ToneMap::Sigmoid => rgb.map(|c| sigmoid_tone_map(c, level)),
            ToneMap::Saturation => {
                // Map luminance only and rescale the channels, so hue and
                // saturation survive the compression.
                let lum = luminance(rgb);
                if lum <= f32::EPSILON {
                    rgb
                } else {
                    let scale = aces_tone_map(lum) / lum;
                    rgb.map(|c| c * scale)
                }
            }
        };
        out.map(|c| clampf(c, 0.0, 1.0))
    }
}

/// Spread `round(value * bit_depth / 255)` set bits (floored at 1 for any
/// nonzero input) evenly across a `bit_depth`-bit mask.
///
/// Even spacing is the core visual-quality decision: clustering the set
/// bits at the low-order planes causes temporal banding and motion smear,
/// while spreading them approximates true linear PWM.
pub fn bcm_mask(value: u8, bit_depth: u8) -> u64 {
    debug_assert!(bit_depth >= 1 && bit_depth <= 64);
    if value == 0 {
        return 0;
    }
    let ones = ((u32::from(value) * u32::from(bit_depth) + 127) / 255).max(1);
    let step = f32::from(bit_depth) / ones as f32;
    let mut mask = 0u64;
    for k in 0..ones {
        mask |= 1u64 << (k as f32 * step) as u32;
    }
    mask
}

/// BCM lookup table: 3 x 256 contiguous entries (red, green, blue blocks).
///
/// Entries are stored as `u64`; for bit depths of 32 and below the encoder
/// reads only the low word.
pub struct ToneLut {
    bits: Box<[u64; 768]>,
    tone_map: ToneMap,
}

impl ToneLut {
    /// Build the table for the current scene settings.
    pub fn build(scene: &SceneConfig) -> Self {
        // With jitter brightness the table assumes full brightness and the
        // OE mask dims the output; the two mechanisms never stack.
        let brightness = if scene.jitter_brightness {
            255.0
        } else {
            f32::from(scene.brightness)
        };
        let linear = [scene.red_linear, scene.green_linear, scene.blue_linear];
        let gamma = [
            scene.gamma * scene.red_gamma,
            scene.gamma * scene.green_gamma,
            scene.gamma * scene.blue_gamma,
        ];

        let mut bits = Box::new([0u64; 768]);
        for i in 0..=255u16 {
            let value = normalize8(i as u8);
            let mut rgb = [0.0f32; 3];
            for ch in 0..3 {
                rgb[ch] = gamma_correct(clampf(value * linear[ch], 0.0, 1.0), gamma[ch]);
            }
            let toned = scene.tone_map.apply(rgb, scene.tone_level);
            for ch in 0..3 {
                let byte = (toned[ch] * brightness).min(255.0) as u8;
                bits[ch * 256 + i as usize] = bcm_mask(byte, scene.bit_depth);
            }
        }

        Self {
            bits,
            tone_map: scene.tone_map,
        }
    }

    /// Tone-map identity this table was built for; a change invalidates it.
    pub fn tone_map(&self) -> ToneMap {
        self.tone_map
    }

    #[inline]
    pub fn red(&self, value: u8) -> u64 {
        self.bits[value as usize]
    }

    #[inline]
    pub fn green(&self, value: u8) -> u64 {
        self.bits[256 + value as usize]
    }

    #[inline]
    pub fn blue(&self, value: u8) -> u64 {
        self.bits[512 + value as usize]
    }

    /// Raw table bytes, for the idempotence checks.
    #[cfg(test)]
    fn raw(&self) -> &[u64] {
        &self.bits[..]
    }
}
