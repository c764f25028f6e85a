//! Frame orchestration: source image in, published BCM buffer out.
//!
//! [`FrameEncoder`] owns everything the per-frame path needs: the lookup
//! table (rebuilt lazily when the tone map changes), the dither noise map
//! (allocated once, stable across frames), the channel pin masks and the
//! writer half of the double buffer. One call to [`FrameEncoder::encode`]
//! performs the full pipeline and publishes the result; the render loop
//! picks it up at its next bit-plane boundary.

use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use rand::Rng;

use crate::buffer::{bcm_buffers, BcmReader, BcmWriter};
use crate::config::{ConfigError, ImageMap, SceneConfig, ToneMap};
use crate::encoder::{self, PortChannelMasks};
use crate::geometry::PanelGeometry;
use crate::tonemap::ToneLut;

/// Dither strengths at or below this are treated as off.
const DITHER_THRESHOLD: f32 = 0.33;

/// Per-frame encoder; the producer side of the double buffer.
pub struct FrameEncoder {
    scene: SceneConfig,
    geo: PanelGeometry,
    writer: BcmWriter,
    masks: Vec<PortChannelMasks>,
    lut: Option<ToneLut>,
    dither_map: Option<Box<[f32]>>,
    prev_frame: Option<Instant>,
}

impl FrameEncoder {
    /// Validate the scene, allocate both BCM buffers and return the encoder
    /// together with the reader handle for the render loop.
    pub fn new(scene: SceneConfig) -> Result<(Self, BcmReader), ConfigError> {
        scene.validate()?;
        let geo = PanelGeometry::new(&scene);
        let (writer, reader) = bcm_buffers(geo.bcm_len());
        let masks = encoder::channel_masks(scene.pixel_order, scene.num_ports);
        let encoder = Self {
            scene,
            geo,
            writer,
            masks,
            lut: None,
            dither_map: None,
            prev_frame: None,
        };
        Ok((encoder, reader))
    }

    pub fn scene(&self) -> &SceneConfig {
        &self.scene
    }

    /// Switch the tone curve. The lookup table is rebuilt on the next
    /// [`encode`](Self::encode) call, not here.
    pub fn set_tone_map(&mut self, tone_map: ToneMap, level: f32) {
        self.scene.tone_map = tone_map;
        self.scene.tone_level = level;
    }

    /// Encode one frame into the back buffer and publish it.
    ///
    /// The image is modified in place by the geometric remap and the
    /// dither pass; callers that redraw every frame never notice.
    pub fn encode(&mut self, image: &mut [u8]) {
        debug_assert!(image.len() >= self.geo.image_len(self.scene.num_ports));

        let lut = match &mut self.lut {
            Some(lut) if lut.tone_map() == self.scene.tone_map => lut,
            slot => {
                debug!("building tone lookup table for {:?}", self.scene.tone_map);
                slot.insert(ToneLut::build(&self.scene))
            }
        };

        let dither = self.scene.dither > DITHER_THRESHOLD;
        if dither && self.dither_map.is_none() {
            self.dither_map = Some(build_dither_map(image.len(), self.scene.dither));
        }

        remap_image(image, &self.scene);
        if dither {
            if let Some(map) = &self.dither_map {
                apply_dither(image, map, self.scene.stride as usize);
            }
        }

        let wide = self.geo.bit_depth > 32;
        let back = self.writer.back();
        for y in 0..self.geo.half_height {
            for x in 0..self.geo.width {
                let base = self.geo.column_base(y, x);
                let out = &mut back[self.geo.bcm_index(y, x)..][..self.geo.bit_depth];
                if wide {
                    encoder::encode_column_64(lut, image, base, &self.geo, &self.masks, out);
                } else {
                    encoder::encode_column_32(lut, image, base, &self.geo, &self.masks, out);
                }
            }
        }
        self.writer.publish();
    }

    /// [`encode`](Self::encode), then sleep away whatever remains of the
    /// frame budget implied by the configured frame rate.
    pub fn encode_synced(&mut self, image: &mut [u8]) {
        self.encode(image);
        let budget = Duration::from_micros(1_000_000 / u64::from(self.scene.fps.max(1)));
        let now = Instant::now();
        if let Some(prev) = self.prev_frame {
            let elapsed = now - prev;
            if elapsed < budget {
                thread::sleep(budget - elapsed);
            }
        }
        self.prev_frame = Some(Instant::now());
    }
}

/// One uniform random float in `[-strength, +strength]` per image byte.
/// Built once and reused: a fixed spatial pattern dithers without the
/// shimmer that per-frame noise would cause.
fn build_dither_map(len: usize, strength: f32) -> Box<[f32]> {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| rng.random_range(-strength..=strength))
        .collect()
}

/// Add the noise map to every channel byte, clamped to `[1, 250]`.
/// Zero bytes stay zero so true black survives.
fn apply_dither(image: &mut [u8], map: &[f32], stride: usize) {
    for (pixel, noise) in image.chunks_exact_mut(stride).zip(map.chunks_exact(stride)) {
        for ch in 0..3 {
            let byte = pixel[ch];
            if byte != 0 {
                let dithered = (f32::from(byte) + noise[ch]).clamp(1.0, 250.0);
                pixel[ch] = dithered as u8;
            }
        }
    }
}

/// Apply the configured geometric remap to the raw image, in place.
fn remap_image(image: &mut [u8], scene: &SceneConfig) {
    let width = scene.width as usize;
    let height = scene.height as usize;
    let stride = scene.stride as usize;
    let row_bytes = width * stride;
    match scene.image_map {
        ImageMap::None => {}
        ImageMap::Flip => flip_rows(image, row_bytes, height),
        ImageMap::Mirror => mirror_rows(image, width, stride),
        ImageMap::FlipMirror => {
            flip_rows(image, row_bytes, height);
            mirror_rows(image, width, stride);
        }
        ImageMap::U => {
            // Serpentine chains feed the bottom half of the image first.
            for y in 0..height / 2 {
                swap_rows(image, row_bytes, y, y + height / 2);
            }
        }
    }
}

fn flip_rows(image: &mut [u8], row_bytes: usize, height: usize) {
    for y in 0..height / 2 {
        swap_rows(image, row_bytes, y, height - 1 - y);
    }
}

fn mirror_rows(image: &mut [u8], width: usize, stride: usize) {
    for row in image.chunks_exact_mut(width * stride) {
        for x in 0..width / 2 {
            let i = x * stride;
            let j = (width - 1 - x) * stride;
            for k in 0..stride {
                row.swap(i + k, j + k);
            }
        }
    }
}

fn swap_rows(image: &mut [u8], row_bytes: usize, a: usize, b: usize) {
    debug_assert!(a < b);
    let (head, tail) = image.split_at_mut(b * row_bytes);
    head[a * row_bytes..(a + 1) * row_bytes].swap_with_slice(&mut tail[..row_bytes]);
}
