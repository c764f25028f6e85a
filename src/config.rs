//! Scene configuration: the immutable-after-setup description of the panel
//! chain, signal quality settings and color pipeline.
//!
//! Validation happens exactly once, before any thread starts. There is no
//! safe degraded mode for an unsynchronized HUB75 signal, so every check
//! here is fatal: a scene that does not validate never reaches the encoder
//! or the render loop.

use thiserror::Error;

/// Supported bit depths must be a multiple of this.
pub const BIT_DEPTH_ALIGNMENT: u8 = 4;
/// Deepest supported BCM signal.
pub const MAX_BIT_DEPTH: u8 = 64;
/// Upper bound on motion blur accumulation.
pub const MAX_MOTION_BLUR_FRAMES: u8 = 32;

/// Order the panel expects color channels on its data pins.
///
/// Some panel batches swap the green/blue (or red/blue) shift registers;
/// the encoder permutes the channel pin masks accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelOrder {
    #[default]
    Rgb,
    Rbg,
    Bgr,
}

/// Tone-map curve applied when building the BCM lookup table.
///
/// `level` (where a curve takes one) comes from [`SceneConfig::tone_level`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToneMap {
    /// Pass gamma-corrected values through unchanged.
    #[default]
    None,
    /// ACES filmic approximation.
    Aces,
    /// Extended Reinhard; `tone_level` is the white point.
    Reinhard,
    /// Hable / Uncharted 2 filmic curve.
    Hable,
    /// Sigmoid contrast curve; `tone_level` is the steepness.
    Sigmoid,
    /// Luminance-domain ACES that preserves channel ratios (saturation).
    Saturation,
}

/// Geometric remap applied to the source image before encoding, to match
/// physical panel chaining that differs from raster order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageMap {
    #[default]
    None,
    /// Vertical flip.
    Flip,
    /// Horizontal mirror.
    Mirror,
    /// Both.
    FlipMirror,
    /// Half-swap for serpentine ("U") panel chaining: the bottom half of
    /// the image feeds the first half of the chain and vice versa.
    U,
}

/// Everything needed to drive one scene: geometry, wiring, signal quality
/// and the color pipeline settings.
///
/// Immutable once [`SceneConfig::validate`] has passed.
#[derive(Debug, Clone)]
pub struct SceneConfig {
    /// Total image width in pixels (all chained panels).
    pub width: u16,
    /// Total image height in pixels (all ports stacked).
    pub height: u16,
    /// Bytes per pixel in the source image (3 for RGB, 4 for RGBA).
    pub stride: u8,
    /// Single panel width in pixels; multiple of 16.
    pub panel_width: u16,
    /// Single panel height in pixels; multiple of 16.
    pub panel_height: u16,
    /// Number of parallel output ports wired up (1-3).
    pub num_ports: u8,
    /// Panels daisy-chained per port (1-16).
    pub num_chains: u8,
    /// BCM bit planes per frame; 4-64, multiple of [`BIT_DEPTH_ALIGNMENT`].
    pub bit_depth: u8,
    /// Overall brightness (0-254).
    pub brightness: u8,
    /// Ordered-noise dither strength, 0.0 (off) to 10.0.
    pub dither: f32,
    /// Channel wiring order of the connected panels.
    pub pixel_order: PixelOrder,
    /// Tone-map curve for the lookup table.
    pub tone_map: ToneMap,
    /// Curve parameter for the tone mappers that take one.
    pub tone_level: f32,
    /// Geometric remap for non-raster panel chaining.
    pub image_map: ImageMap,
    /// Target frame rate for paced encoding.
    pub fps: u16,
    /// Base gamma; 1.0 disables correction.
    pub gamma: f32,
    pub red_gamma: f32,
    pub green_gamma: f32,
    pub blue_gamma: f32,
    pub red_linear: f32,
    pub green_linear: f32,
    pub blue_linear: f32,
    /// Apply brightness via the OE jitter mask instead of the lookup table.
    /// The two mechanisms are mutually exclusive.
    pub jitter_brightness: bool,
    /// Frames of motion blur accumulation (0-32) done by the producer.
    pub motion_blur_frames: u8,
}

impl Default for SceneConfig {
    fn default() -> Self {
        let panel_width = 64;
        let bit_depth = 32;
        Self {
            width: 64,
            height: 64,
            stride: 4,
            panel_width,
            panel_height: 64,
            num_ports: 1,
            num_chains: 1,
            bit_depth,
            brightness: 200,
            dither: 0.0,
            pixel_order: PixelOrder::Rgb,
            tone_map: ToneMap::None,
            tone_level: 1.0,
            image_map: ImageMap::None,
            fps: default_fps(bit_depth, panel_width),
            gamma: 1.0,
            red_gamma: 1.0,
            green_gamma: 1.0,
            blue_gamma: 1.0,
            red_linear: 1.0,
            green_linear: 1.0,
            blue_linear: 1.0,
            jitter_brightness: true,
            motion_blur_frames: 0,
        }
    }
}

/// Upper bound on the refresh rate the shift clock can sustain for a given
/// depth and chain width.
pub fn max_fps(bit_depth: u8, panel_width: u16) -> u16 {
    19200 / bit_depth as u16 / (panel_width / 16)
}

/// Conservative default refresh rate for a given depth and chain width;
/// half the ceiling, leaving headroom for the encoder thread.
pub fn default_fps(bit_depth: u8, panel_width: u16) -> u16 {
    9600 / bit_depth as u16 / (panel_width / 16)
}

impl SceneConfig {
    /// Half the panel height; HUB75 drives two rows per address.
    pub fn half_height(&self) -> u16 {
        self.panel_height / 2
    }

    /// Verify the scene before any buffer is allocated or thread started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_ports < 1 || self.num_ports > 3 {
            return Err(ConfigError::PortCount(self.num_ports));
        }
        if self.num_chains < 1 || self.num_chains > 16 {
            return Err(ConfigError::ChainCount(self.num_chains));
        }
        if self.stride != 3 && self.stride != 4 {
            return Err(ConfigError::Stride(self.stride));
        }
        if self.panel_width == 0 || self.panel_width % 16 != 0 {
            return Err(ConfigError::PanelSize(self.panel_width, self.panel_height));
        }
        if self.panel_height == 0 || self.panel_height % 16 != 0 {
            return Err(ConfigError::PanelSize(self.panel_width, self.panel_height));
        }
        if self.width < self.panel_width || self.height < self.panel_height {
            return Err(ConfigError::ImageSize(self.width, self.height));
        }
        if self.bit_depth < BIT_DEPTH_ALIGNMENT || self.bit_depth > MAX_BIT_DEPTH {
            return Err(ConfigError::BitDepth(self.bit_depth));
        }
        if self.bit_depth % BIT_DEPTH_ALIGNMENT != 0 {
            return Err(ConfigError::BitDepthAlignment(self.bit_depth));
        }
        if self.motion_blur_frames > MAX_MOTION_BLUR_FRAMES {
            return Err(ConfigError::MotionBlur(self.motion_blur_frames));
        }
        if !(0.0..=10.0).contains(&self.dither) {
            return Err(ConfigError::Dither(self.dither));
        }
        Ok(())
    }
}

/// Fatal scene configuration errors, checked once before setup completes.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("only 1-3 ports supported, got {0}")]
    PortCount(u8),
    #[error("only 1-16 panels per chain supported, got {0}")]
    ChainCount(u8),
    #[error("only 3 or 4 byte pixel stride supported, got {0}")]
    Stride(u8),
    #[error("panel dimensions must be nonzero multiples of 16, got {0}x{1}")]
    PanelSize(u16, u16),
    #[error("image ({0}x{1}) smaller than a single panel")]
    ImageSize(u16, u16),
    #[error("bit depth {0} outside supported range 4-64")]
    BitDepth(u8),
    #[error("bit depth {0} is not a multiple of {BIT_DEPTH_ALIGNMENT}")]
    BitDepthAlignment(u8),
    #[error("max motion blur frames is {MAX_MOTION_BLUR_FRAMES}, got {0}")]
    MotionBlur(u8),
    #[error("dither strength {0} outside 0.0-10.0")]
    Dither(f32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scene_is_valid() {
        SceneConfig::default().validate().unwrap();
    }

    #[test]
    fn default_fps_stays_below_the_ceiling() {
        let scene = SceneConfig::default();
        // 9600 / 32 / (64/16)
        assert_eq!(scene.fps, 75);
        assert_eq!(scene.fps, default_fps(scene.bit_depth, scene.panel_width));
        assert!(scene.fps <= max_fps(scene.bit_depth, scene.panel_width));
    }

    #[test]
    fn rejects_bad_geometry() {
        let mut scene = SceneConfig::default();
        scene.panel_width = 60;
        assert!(matches!(
            scene.validate(),
            Err(ConfigError::PanelSize(60, 64))
        ));

        let mut scene = SceneConfig::default();
        scene.num_ports = 4;
        assert!(matches!(scene.validate(), Err(ConfigError::PortCount(4))));

        let mut scene = SceneConfig::default();
        scene.stride = 2;
        assert!(matches!(scene.validate(), Err(ConfigError::Stride(2))));
    }

    #[test]
    fn rejects_misaligned_bit_depth() {
        let mut scene = SceneConfig::default();
        scene.bit_depth = 30;
        assert!(matches!(
            scene.validate(),
            Err(ConfigError::BitDepthAlignment(30))
        ));
        scene.bit_depth = 2;
        assert!(matches!(scene.validate(), Err(ConfigError::BitDepth(2))));
        scene.bit_depth = 68;
        assert!(matches!(scene.validate(), Err(ConfigError::BitDepth(68))));
    }

    #[test]
    fn accepts_all_aligned_depths() {
        let mut scene = SceneConfig::default();
        for depth in (4..=64).step_by(4) {
            scene.bit_depth = depth;
            scene.validate().unwrap();
        }
    }
}
