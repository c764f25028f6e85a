//! Output-enable jitter mask: temporal dithering of the blank pin.
//!
//! BCM alone quantizes brightness to one bit plane. Randomly blanking a
//! fraction of column writes proportional to (255 - brightness) dims the
//! panel with resolution far below one plane. The pattern length is prime
//! so the temporal sequence never locks onto the row/column scan period,
//! which would show up as moire banding.

use rand::Rng;

use crate::pins::PIN_OE;

/// Pattern length; prime, and small enough to stay cache-resident.
pub const JITTER_SIZE: usize = 32771;
/// Runs of this many identical slots or more get re-randomized.
pub const JITTER_MAX_RUN_LEN: usize = 4;
/// Number of run-smoothing passes.
pub const JITTER_PASSES: usize = 3;

// Give up breaking a run after this many re-rolls; only plausible at
// brightness extremes, where long runs are the correct output anyway.
const MAX_REROLLS: usize = 32;

/// Blanking pattern for the OE pin, one `u32` per column write: either 0
/// (display) or [`PIN_OE`] (blank). Immutable after construction; the
/// render loop walks it with a wrapping cursor.
pub struct JitterMask {
    words: Box<[u32]>,
    cursor: usize,
}

impl JitterMask {
    /// Build the pattern for `brightness` (0 = always blank, 255 = never).
    pub fn new(brightness: u8) -> Self {
        // rand's thread RNG is a CSPRNG, matching the /dev/urandom quality
        // the blanking statistics are calibrated for.
        let mut rng = rand::rng();
        let mut words: Box<[u32]> = (0..JITTER_SIZE)
            .map(|_| roll(&mut rng, brightness))
            .collect();
        for _ in 0..JITTER_PASSES {
            if !smooth_pass(&mut words, &mut rng, brightness) {
                break;
            }
        }
        Self { words, cursor: 0 }
    }

    /// All-display pattern, used when brightness is applied through the
    /// lookup table instead of the OE pin.
    pub fn disabled() -> Self {
        Self {
            words: vec![0u32; JITTER_SIZE].into_boxed_slice(),
            cursor: 0,
        }
    }

    /// Current slot; advances the cursor by one column write.
    #[inline]
    pub fn next_word(&mut self) -> u32 {
        let word = self.words[self.cursor];
        self.cursor += 1;
        if self.cursor == self.words.len() {
            self.cursor = 0;
        }
        word
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    #[cfg(test)]
    fn slots(&self) -> &[u32] {
        &self.words
    }
}

#[inline]
fn roll<R: Rng>(rng: &mut R, brightness: u8) -> u32 {
    if rng.random::<u8>() > brightness {
        PIN_OE
    } else {
        0
    }
}

/// One smoothing pass: re-randomize every run of `JITTER_MAX_RUN_LEN` or
/// more identical slots. Long runs read as visible flicker bands. Returns
/// whether anything was changed.
fn smooth_pass<R: Rng>(words: &mut [u32], rng: &mut R, brightness: u8) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i < words.len() {
        let mut run = 1;
        while i + run < words.len() && words[i + run] == words[i] {
            run += 1;
        }
        if run >= JITTER_MAX_RUN_LEN {
            reroll_run(&mut words[i..i + run], rng, brightness);
            changed = true;
        }
        i += run;
    }
    changed
}

/// Re-roll a run until the replacement contains no long run of its own.
/// A single re-roll can reproduce the problem, so retry; at brightness
/// extremes a uniform run is the expected distribution and the retry
/// budget runs out harmlessly.
fn reroll_run<R: Rng>(run: &mut [u32], rng: &mut R, brightness: u8) {
    for _ in 0..MAX_REROLLS {
        for slot in run.iter_mut() {
            *slot = roll(rng, brightness);
        }
        let broken = run
            .windows(JITTER_MAX_RUN_LEN)
            .all(|w| w.iter().any(|&s| s != w[0]));
        if broken {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_run(slots: &[u32]) -> usize {
        let mut longest = 0;
        let mut i = 0;
        while i < slots.len() {
            let mut run = 1;
            while i + run < slots.len() && slots[i + run] == slots[i] {
                run += 1;
            }
            longest = longest.max(run);
            i += run;
        }
        longest
    }

    #[test]
    fn full_brightness_never_blanks() {
        let mask = JitterMask::new(255);
        assert!(mask.slots().iter().all(|&w| w == 0));
    }

    #[test]
    fn zero_brightness_always_blanks() {
        let mask = JitterMask::new(0);
        let blank = mask.slots().iter().filter(|&&w| w == PIN_OE).count();
        // random byte > 0 fails only for byte == 0
        assert!(blank > JITTER_SIZE * 9 / 10);
    }

    #[test]
    fn midpoint_brightness_is_balanced() {
        let mask = JitterMask::new(127);
        let blank = mask.slots().iter().filter(|&&w| w == PIN_OE).count();
        let ratio = blank as f64 / JITTER_SIZE as f64;
        assert!((0.4..0.6).contains(&ratio), "blank ratio {ratio}");
    }

    #[test]
    fn smoothing_limits_run_length() {
        let mask = JitterMask::new(128);
        // Cross-boundary merges can leave the odd run at the max; anything
        // beyond a merged pair means smoothing is broken.
        assert!(max_run(mask.slots()) < 2 * JITTER_MAX_RUN_LEN);
    }

    #[test]
    fn disabled_mask_displays_every_slot() {
        let mask = JitterMask::disabled();
        assert_eq!(mask.len(), JITTER_SIZE);
        assert!(mask.slots().iter().all(|&w| w == 0));
    }

    #[test]
    fn cursor_wraps_at_pattern_length() {
        let mut mask = JitterMask::disabled();
        for _ in 0..JITTER_SIZE {
            mask.next_word();
        }
        assert_eq!(mask.cursor, 0);
    }

    #[test]
    fn slots_are_either_display_or_blank() {
        let mask = JitterMask::new(200);
        assert!(mask.slots().iter().all(|&w| w == 0 || w == PIN_OE));
    }
}
