//! Panel geometry offsets.
//!
//! One column of the BCM signal sources six pixels: for each active port,
//! the pixel on the addressed row in the top half of that port's panel and
//! its partner half a panel further down. All of those locations are fixed
//! linear functions of the scene geometry, so they are computed once here
//! and reused for every column instead of being re-derived inline in the
//! encoder hot loop.

use crate::config::SceneConfig;

/// Memoized byte/word offsets derived from a validated [`SceneConfig`].
#[derive(Debug, Clone)]
pub struct PanelGeometry {
    /// Image width in pixels.
    pub width: usize,
    /// Rows scanned per bit plane (panel_height / 2).
    pub half_height: usize,
    /// Bytes per source pixel.
    pub stride: usize,
    /// BCM planes per column; also the column stride in output words.
    pub bit_depth: usize,
    /// Byte offset from the column base to each port's top pixel.
    port_offsets: [usize; 3],
    /// Byte offset from a top pixel to its bottom-half partner.
    bottom_offset: usize,
}

impl PanelGeometry {
    pub fn new(scene: &SceneConfig) -> Self {
        let width = scene.width as usize;
        let stride = scene.stride as usize;
        let panel_height = scene.panel_height as usize;
        let half_height = panel_height / 2;
        let row_bytes = width * stride;

        let mut port_offsets = [0; 3];
        for (port, offset) in port_offsets.iter_mut().enumerate() {
            *offset = port * panel_height * row_bytes;
        }

        Self {
            width,
            half_height,
            stride,
            bit_depth: scene.bit_depth as usize,
            port_offsets,
            bottom_offset: half_height * row_bytes,
        }
    }

    /// Byte offset of the port-0 top pixel for column `x` of half-row `y`.
    #[inline]
    pub fn column_base(&self, y: usize, x: usize) -> usize {
        (y * self.width + x) * self.stride
    }

    /// Byte offset from the column base to `port`'s top pixel.
    #[inline]
    pub fn port_offset(&self, port: usize) -> usize {
        self.port_offsets[port]
    }

    /// Byte offset from a top pixel to the matching bottom-half pixel.
    #[inline]
    pub fn bottom_offset(&self) -> usize {
        self.bottom_offset
    }

    /// Word index of the first bit plane for column `x` of half-row `y`.
    #[inline]
    pub fn bcm_index(&self, y: usize, x: usize) -> usize {
        (y * self.width + x) * self.bit_depth
    }

    /// Total length of one BCM signal buffer in words.
    pub fn bcm_len(&self) -> usize {
        self.width * self.half_height * self.bit_depth
    }

    /// Minimum source image size in bytes for the configured port count.
    pub fn image_len(&self, num_ports: u8) -> usize {
        self.port_offsets[num_ports as usize - 1] + 2 * self.bottom_offset
    }
}
