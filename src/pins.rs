//! HUB75 pin assignments for the supported Raspberry Pi HAT families.
//!
//! All values are BCM GPIO numbers. The two HAT families route the same
//! logical HUB75 signals to different physical pins; the family is a
//! compile-time choice (`hzeller-hat` or `adafruit-hat` feature, enforced by
//! build.rs) because a board only ever carries one HAT.

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "adafruit-hat")] {
        pub const PINOUT_NAME: &str = "ADAFRUIT_HAT";

        pub const PORT0_R1: u32 = 5;
        pub const PORT0_G1: u32 = 13;
        pub const PORT0_B1: u32 = 6;
        pub const PORT0_R2: u32 = 12;
        pub const PORT0_G2: u32 = 16;
        pub const PORT0_B2: u32 = 23;

        // The Adafruit HAT wires a single port.
        pub const PORT1_R1: u32 = 0;
        pub const PORT1_G1: u32 = 0;
        pub const PORT1_B1: u32 = 0;
        pub const PORT1_R2: u32 = 0;
        pub const PORT1_G2: u32 = 0;
        pub const PORT1_B2: u32 = 0;

        pub const PORT2_R1: u32 = 0;
        pub const PORT2_G1: u32 = 0;
        pub const PORT2_B1: u32 = 0;
        pub const PORT2_R2: u32 = 0;
        pub const PORT2_G2: u32 = 0;
        pub const PORT2_B2: u32 = 0;

        pub const ADDR_A: u32 = 22;
        pub const ADDR_B: u32 = 26;
        pub const ADDR_C: u32 = 27;
        pub const ADDR_D: u32 = 20;
        pub const ADDR_E: u32 = 24;
        pub const STROBE: u32 = 21;
        pub const CLOCK: u32 = 17;
        pub const OE: u32 = 4;
    } else {
        pub const PINOUT_NAME: &str = "HZELLER_HAT";

        pub const PORT0_R1: u32 = 11;
        pub const PORT0_G1: u32 = 27;
        pub const PORT0_B1: u32 = 7;
        pub const PORT0_R2: u32 = 8;
        pub const PORT0_G2: u32 = 9;
        pub const PORT0_B2: u32 = 10;

        pub const PORT1_R1: u32 = 12;
        pub const PORT1_G1: u32 = 5;
        pub const PORT1_B1: u32 = 6;
        pub const PORT1_R2: u32 = 19;
        pub const PORT1_G2: u32 = 13;
        pub const PORT1_B2: u32 = 20;

        pub const PORT2_R1: u32 = 14;
        pub const PORT2_G1: u32 = 2;
        pub const PORT2_B1: u32 = 3;
        pub const PORT2_R2: u32 = 26;
        pub const PORT2_G2: u32 = 16;
        pub const PORT2_B2: u32 = 21;

        pub const ADDR_A: u32 = 22;
        pub const ADDR_B: u32 = 23;
        pub const ADDR_C: u32 = 24;
        pub const ADDR_D: u32 = 25;
        pub const ADDR_E: u32 = 15;
        pub const STROBE: u32 = 4;
        pub const CLOCK: u32 = 17;
        pub const OE: u32 = 18;
    }
}

/// Output-enable (blank) control mask. The panel displays while OE is low.
pub const PIN_OE: u32 = 1 << OE;
/// Latch (strobe) control mask.
pub const PIN_LATCH: u32 = 1 << STROBE;
/// Shift clock control mask.
pub const PIN_CLK: u32 = 1 << CLOCK;

/// All row-address lines as one mask.
pub const ADDRESS_MASK: u32 =
    1 << ADDR_A | 1 << ADDR_B | 1 << ADDR_C | 1 << ADDR_D | 1 << ADDR_E;

/// RGB data pins for one port, split into top-half and bottom-half rows.
#[derive(Debug, Clone, Copy)]
pub struct PortPins {
    pub r1: u32,
    pub g1: u32,
    pub b1: u32,
    pub r2: u32,
    pub g2: u32,
    pub b2: u32,
}

impl PortPins {
    const fn mask(self) -> [[u32; 2]; 3] {
        [
            [1 << self.r1, 1 << self.r2],
            [1 << self.g1, 1 << self.g2],
            [1 << self.b1, 1 << self.b2],
        ]
    }
}

/// Pin numbers for the three ports in wiring order.
pub const PORTS: [PortPins; 3] = [
    PortPins {
        r1: PORT0_R1,
        g1: PORT0_G1,
        b1: PORT0_B1,
        r2: PORT0_R2,
        g2: PORT0_G2,
        b2: PORT0_B2,
    },
    PortPins {
        r1: PORT1_R1,
        g1: PORT1_G1,
        b1: PORT1_B1,
        r2: PORT1_R2,
        g2: PORT1_G2,
        b2: PORT1_B2,
    },
    PortPins {
        r1: PORT2_R1,
        g1: PORT2_G1,
        b1: PORT2_B1,
        r2: PORT2_R2,
        g2: PORT2_G2,
        b2: PORT2_B2,
    },
];

/// Per-channel `[top, bottom]` bit masks for `port`, in R, G, B order.
pub const fn port_masks(port: usize) -> [[u32; 2]; 3] {
    PORTS[port].mask()
}

/// Address-line mask selecting half-height row `row`.
pub fn row_address_mask(row: u16) -> u32 {
    let mut mask = 0;
    if row & 1 << 0 != 0 {
        mask |= 1 << ADDR_A;
    }
    if row & 1 << 1 != 0 {
        mask |= 1 << ADDR_B;
    }
    if row & 1 << 2 != 0 {
        mask |= 1 << ADDR_C;
    }
    if row & 1 << 3 != 0 {
        mask |= 1 << ADDR_D;
    }
    if row & 1 << 4 != 0 {
        mask |= 1 << ADDR_E;
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_mask_covers_all_rows() {
        assert_eq!(row_address_mask(0), 0);
        for row in 0..32 {
            let mask = row_address_mask(row);
            assert_eq!(mask & !ADDRESS_MASK, 0);
        }
        assert_eq!(row_address_mask(31), ADDRESS_MASK);
    }

    #[test]
    fn row_addresses_are_unique() {
        let masks: Vec<u32> = (0..32).map(row_address_mask).collect();
        for (i, a) in masks.iter().enumerate() {
            for b in &masks[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn control_pins_do_not_overlap_address_lines() {
        assert_eq!(PIN_CLK & ADDRESS_MASK, 0);
        assert_eq!(PIN_LATCH & ADDRESS_MASK, 0);
        assert_eq!(PIN_OE & ADDRESS_MASK, 0);
    }
}
