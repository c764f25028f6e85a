//! Per-column BCM signal encoding.
//!
//! One column of output is `bit_depth` 32-bit words, each the literal GPIO
//! output-register value for one bit plane: the OR of up to 18 pin bits
//! (3 ports x top/bottom pixel x 3 channels). The lookup table has already
//! collapsed gamma, tone mapping and brightness into per-channel BCM masks,
//! so the inner loop is pure bit testing and ORing.
//!
//! Two bit-width variants exist because table entries are 64-bit but depths
//! of 32 and below only ever touch the low word; the emitted hardware word
//! is always 32 bits either way. The pixel wiring order is handled up
//! front, by permuting which pin masks each source channel drives.

use crate::config::PixelOrder;
use crate::geometry::PanelGeometry;
use crate::pins;
use crate::tonemap::ToneLut;

/// `[top, bottom]` pin masks per source channel (R, G, B) for one port.
pub type PortChannelMasks = [[u32; 2]; 3];

/// Pin masks for every active port, permuted for the panel wiring order.
///
/// Ports beyond `num_ports` are simply absent: no wiring exists to drive
/// them, so no term is emitted.
pub fn channel_masks(order: PixelOrder, num_ports: u8) -> Vec<PortChannelMasks> {
    (0..num_ports as usize)
        .map(|port| {
            let [r, g, b] = pins::port_masks(port);
            match order {
                PixelOrder::Rgb => [r, g, b],
                PixelOrder::Rbg => [r, b, g],
                PixelOrder::Bgr => [b, g, r],
            }
        })
        .collect()
}

/// Table entry truncated to the width the bit depth requires.
trait PlaneBits: Copy {
    fn from_entry(entry: u64) -> Self;
    fn test(self, plane: usize) -> bool;
}

impl PlaneBits for u32 {
    #[inline]
    fn from_entry(entry: u64) -> Self {
        entry as u32
    }

    #[inline]
    fn test(self, plane: usize) -> bool {
        self & (1 << plane) != 0
    }
}

impl PlaneBits for u64 {
    #[inline]
    fn from_entry(entry: u64) -> Self {
        entry
    }

    #[inline]
    fn test(self, plane: usize) -> bool {
        self & (1 << plane) != 0
    }
}

#[inline]
fn encode_column<W: PlaneBits>(
    lut: &ToneLut,
    image: &[u8],
    base: usize,
    geo: &PanelGeometry,
    masks: &[PortChannelMasks],
    out: &mut [u32],
) {
    out.fill(0);
    for (port, port_masks) in masks.iter().enumerate() {
        let top = base + geo.port_offset(port);
        let bottom = top + geo.bottom_offset();

        let channels: [(W, W, &[u32; 2]); 3] = [
            (
                W::from_entry(lut.red(image[top])),
                W::from_entry(lut.red(image[bottom])),
                &port_masks[0],
            ),
            (
                W::from_entry(lut.green(image[top + 1])),
                W::from_entry(lut.green(image[bottom + 1])),
                &port_masks[1],
            ),
            (
                W::from_entry(lut.blue(image[top + 2])),
                W::from_entry(lut.blue(image[bottom + 2])),
                &port_masks[2],
            ),
        ];

        for (top_bits, bottom_bits, mask) in channels {
            for (plane, word) in out.iter_mut().enumerate() {
                if top_bits.test(plane) {
                    *word |= mask[0];
                }
                if bottom_bits.test(plane) {
                    *word |= mask[1];
                }
            }
        }
    }
}

/// Encode one column for bit depths of 32 and below.
pub fn encode_column_32(
    lut: &ToneLut,
    image: &[u8],
    base: usize,
    geo: &PanelGeometry,
    masks: &[PortChannelMasks],
    out: &mut [u32],
) {
    encode_column::<u32>(lut, image, base, geo, masks, out);
}

/// Encode one column for bit depths above 32.
pub fn encode_column_64(
    lut: &ToneLut,
    image: &[u8],
    base: usize,
    geo: &PanelGeometry,
    masks: &[PortChannelMasks],
    out: &mut [u32],
) {
    encode_column::<u64>(lut, image, base, geo, masks, out);
}
