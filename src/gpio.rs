//! Memory-mapped GPIO access and the real-time render loop.
//!
//! Two register dialects are supported behind [`GpioBackend`]. The Pi 5
//! routes GPIO through the RP1 chip, whose RIO block accepts a full
//! 32-pin output word in one write and exposes SET/CLR aliases for
//! single-pin pulses. Older boards (BCM283x) only have GPSET0/GPCLR0
//! pairs, and their GPIO block needs short settle delays between
//! consecutive writes. The render loop itself is dialect-agnostic; pick
//! the backend for the board once at startup.
//!
//! Everything here runs without root: the register window comes from
//! `/dev/gpiomem0` (Pi 5) or `/dev/gpiomem` (legacy).

use std::ffi::CStr;
use std::mem;
use std::ptr;
use std::sync::atomic::{compiler_fence, AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use thiserror::Error;

use crate::buffer::BcmReader;
use crate::config::SceneConfig;
use crate::jitter::JitterMask;
use crate::pins::{self, PIN_CLK, PIN_LATCH, PIN_OE};

/// Fatal hardware-access errors. There is no degraded mode: if the
/// register window cannot be mapped the panel cannot be driven at all.
#[derive(Debug, Error)]
pub enum GpioError {
    #[error("failed to open {path}: errno {errno}")]
    Open { path: &'static str, errno: i32 },
    #[error("mmap of the GPIO register window failed: errno {0}")]
    Mmap(i32),
    #[error("failed to pin thread to cpu {cpu}: errno {errno}")]
    Affinity { cpu: usize, errno: i32 },
}

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Which register dialect the board speaks. Detection is the caller's
/// job (device tree, `/proc/cpuinfo`, or a CLI flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardRevision {
    /// BCM2837 (Pi 3) and earlier.
    Pi3,
    /// BCM2711 (Pi 4).
    Pi4,
    /// RP1 (Pi 5).
    Pi5,
}

impl BoardRevision {
    fn device(self) -> &'static CStr {
        match self {
            BoardRevision::Pi5 => c"/dev/gpiomem0",
            _ => c"/dev/gpiomem",
        }
    }

    fn device_name(self) -> &'static str {
        match self {
            BoardRevision::Pi5 => "/dev/gpiomem0",
            _ => "/dev/gpiomem",
        }
    }

    /// Physical offset of the register window within the device.
    fn mmap_offset(self) -> libc::off_t {
        match self {
            // gpiomem0 exposes the RP1 peripheral space; 0xD0000 to the
            // GPIO bank is already folded into this base.
            BoardRevision::Pi5 => 0x1f000d0000,
            // gpiomem maps the GPIO block itself at offset 0.
            _ => 0,
        }
    }

    fn map_len(self) -> usize {
        match self {
            BoardRevision::Pi5 => 64 * 1024 * 1024,
            _ => 0x1000,
        }
    }
}

/// Owned mmap of the GPIO register window.
pub struct GpioMem {
    base: *mut u32,
    len: usize,
}

// The registers are only ever touched from the thread that owns the
// backend built on top of this mapping.
unsafe impl Send for GpioMem {}

impl GpioMem {
    pub fn map(revision: BoardRevision) -> Result<Self, GpioError> {
        let path = revision.device();
        let len = revision.map_len();
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR | libc::O_SYNC) };
        if fd < 0 {
            return Err(GpioError::Open {
                path: revision.device_name(),
                errno: last_errno(),
            });
        }
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                revision.mmap_offset(),
            )
        };
        unsafe { libc::close(fd) };
        if base == libc::MAP_FAILED {
            return Err(GpioError::Mmap(last_errno()));
        }
        debug!("mapped {} ({len} bytes)", revision.device_name());
        Ok(Self {
            base: base.cast(),
            len,
        })
    }

    /// Pointer `words` 32-bit registers into the window.
    fn word_ptr(&self, words: usize) -> *mut u32 {
        unsafe { self.base.add(words) }
    }
}

impl Drop for GpioMem {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base.cast(), self.len);
        }
    }
}

/// The three operations the render loop needs from a register dialect.
pub trait GpioBackend {
    /// Replace the whole output register with `mask` in one operation.
    fn write(&mut self, mask: u32);
    /// Drive the pins in `mask` high, leaving the rest untouched.
    fn set(&mut self, mask: u32);
    /// Drive the pins in `mask` low, leaving the rest untouched.
    fn clear(&mut self, mask: u32);
}

impl<B: GpioBackend + ?Sized> GpioBackend for Box<B> {
    #[inline]
    fn write(&mut self, mask: u32) {
        (**self).write(mask);
    }

    #[inline]
    fn set(&mut self, mask: u32) {
        (**self).set(mask);
    }

    #[inline]
    fn clear(&mut self, mask: u32) {
        (**self).clear(mask);
    }
}

// RP1 RIO block layout, in 32-bit words from the mapped base.
const RIO_BASE: usize = 0x10000 / 4;
const RIO_SET: usize = RIO_BASE + 0x2000 / 4;
const RIO_CLR: usize = RIO_BASE + 0x3000 / 4;
const PAD_BASE: usize = 0x20000 / 4;
// Word index of the OE register inside a RIO alias (Out, OE, In, InSync).
const RIO_OE: usize = 1;

/// Pi 5 backend: RP1 RIO registers.
pub struct RioBackend {
    out: *mut u32,
    set: *mut u32,
    clr: *mut u32,
    _mem: GpioMem,
}

// Register pointers derive from the owned mapping; the backend moves to
// the render thread whole.
unsafe impl Send for RioBackend {}

impl RioBackend {
    /// Take ownership of the mapping and configure pins 2..28 for RIO
    /// output: function select 5, fast slew, 8mA drive, pull-down.
    pub fn new(mem: GpioMem) -> Self {
        let gpio = mem.word_ptr(0);
        let pad = mem.word_ptr(PAD_BASE + 1);
        let set_out = mem.word_ptr(RIO_SET);
        let set_oe = mem.word_ptr(RIO_SET + RIO_OE);
        for pin in 2..28usize {
            unsafe {
                // status/ctrl pairs; ctrl is the odd word
                gpio.add(pin * 2 + 1).write_volatile(5);
                pad.add(pin).write_volatile(0x15);
                set_oe.write_volatile(1 << pin);
                set_out.write_volatile(1 << pin);
            }
        }
        debug!("configured RIO pins 2..28 for output");
        Self {
            out: mem.word_ptr(RIO_BASE),
            set: mem.word_ptr(RIO_SET),
            clr: mem.word_ptr(RIO_CLR),
            _mem: mem,
        }
    }
}

impl GpioBackend for RioBackend {
    #[inline]
    fn write(&mut self, mask: u32) {
        compiler_fence(Ordering::SeqCst);
        unsafe { self.out.write_volatile(mask) };
    }

    #[inline]
    fn set(&mut self, mask: u32) {
        compiler_fence(Ordering::SeqCst);
        unsafe { self.set.write_volatile(mask) };
    }

    #[inline]
    fn clear(&mut self, mask: u32) {
        compiler_fence(Ordering::SeqCst);
        unsafe { self.clr.write_volatile(mask) };
    }
}

// BCM283x GPIO block layout, in words from the mapped base.
const GPSET0: usize = 0x1c / 4;
const GPCLR0: usize = 0x28 / 4;

// Spin iterations for the GPIO block to settle between writes.
const SETTLE_WRITE: u32 = 40;
const SETTLE_PULSE: u32 = 8;

#[inline]
fn settle(iterations: u32) {
    for _ in 0..iterations {
        compiler_fence(Ordering::SeqCst);
        std::hint::spin_loop();
    }
}

/// Legacy backend: BCM283x set/clear register pairs.
///
/// A full-register write does not exist on this block, so it is emulated
/// as clear-then-set; the settle delays keep consecutive writes from
/// outrunning the (much slower) GPIO bus.
pub struct SetClearBackend {
    set: *mut u32,
    clr: *mut u32,
    _mem: GpioMem,
}

unsafe impl Send for SetClearBackend {}

impl SetClearBackend {
    /// Take ownership of the mapping and switch pins 2..28 to output via
    /// the GPFSEL function-select registers.
    pub fn new(mem: GpioMem) -> Self {
        for pin in 2..28usize {
            let reg = mem.word_ptr(pin / 10);
            let shift = (pin % 10) * 3;
            unsafe {
                let mut fsel = reg.read_volatile();
                fsel &= !(0b111 << shift);
                fsel |= 0b001 << shift;
                reg.write_volatile(fsel);
            }
        }
        debug!("configured GPFSEL pins 2..28 for output");
        Self {
            set: mem.word_ptr(GPSET0),
            clr: mem.word_ptr(GPCLR0),
            _mem: mem,
        }
    }
}

impl GpioBackend for SetClearBackend {
    #[inline]
    fn write(&mut self, mask: u32) {
        compiler_fence(Ordering::SeqCst);
        unsafe {
            self.clr.write_volatile(!mask);
            settle(SETTLE_WRITE);
            self.set.write_volatile(mask);
            settle(SETTLE_WRITE);
        }
    }

    #[inline]
    fn set(&mut self, mask: u32) {
        compiler_fence(Ordering::SeqCst);
        unsafe { self.set.write_volatile(mask) };
        settle(SETTLE_PULSE);
    }

    #[inline]
    fn clear(&mut self, mask: u32) {
        compiler_fence(Ordering::SeqCst);
        unsafe { self.clr.write_volatile(mask) };
        settle(SETTLE_PULSE);
    }
}

/// Build a backend for `revision` by mapping its register window.
pub fn open_backend(revision: BoardRevision) -> Result<Box<dyn GpioBackend + Send>, GpioError> {
    let mem = GpioMem::map(revision)?;
    Ok(match revision {
        BoardRevision::Pi5 => Box::new(RioBackend::new(mem)),
        _ => Box::new(SetClearBackend::new(mem)),
    })
}

/// The bit-banging render loop: consumes the published BCM buffer and the
/// jitter mask, drives the panel until the liveness flag drops.
pub struct Hub75Renderer<B: GpioBackend> {
    backend: B,
    reader: BcmReader,
    jitter: JitterMask,
    addr_map: Vec<u32>,
    running: Arc<AtomicBool>,
    width: usize,
    half_height: usize,
    bit_depth: usize,
}

impl<B: GpioBackend> Hub75Renderer<B> {
    pub fn new(
        backend: B,
        reader: BcmReader,
        scene: &SceneConfig,
        running: Arc<AtomicBool>,
    ) -> Self {
        let jitter = if scene.jitter_brightness {
            JitterMask::new(scene.brightness)
        } else {
            JitterMask::disabled()
        };
        let addr_map = (0..scene.half_height()).map(pins::row_address_mask).collect();
        Self {
            backend,
            reader,
            jitter,
            addr_map,
            running,
            width: scene.width as usize,
            half_height: scene.half_height() as usize,
            bit_depth: scene.bit_depth as usize,
        }
    }

    /// Shift out one bit plane across every half-row.
    ///
    /// Each column is one combined register write (data, row address and
    /// jitter in a single word) followed by a clock pulse; each row ends
    /// blanked while the latch commits it.
    fn render_plane(&mut self, plane: usize) {
        let bcm = self.reader.front();
        let backend = &mut self.backend;
        let jitter = &mut self.jitter;

        let mut offset = plane;
        for y in 0..self.half_height {
            let addr = self.addr_map[y];
            for _ in 0..self.width {
                backend.write(bcm[offset] | addr | jitter.next_word());
                backend.set(PIN_CLK);
                offset += self.bit_depth;
            }
            backend.write(PIN_OE);
            backend.set(PIN_LATCH);
            backend.clear(PIN_LATCH);
        }
    }

    /// Render one full frame: every bit plane, re-checking the flip flag
    /// only between planes so a swap never lands mid-row. The liveness
    /// flag is also re-read per plane, so cancellation takes effect within
    /// one bit-plane's duration rather than one frame's.
    pub fn render_frame(&mut self) {
        for plane in 0..self.bit_depth {
            if !self.running.load(Ordering::Relaxed) {
                return;
            }
            self.render_plane(plane);
            self.reader.refresh();
        }
    }

    /// Drive the panel until the liveness flag drops, then leave it blank.
    pub fn run(&mut self) {
        info!(
            "render loop starting: {}x{} half-rows, depth {}, pinout {}",
            self.width,
            self.half_height,
            self.bit_depth,
            pins::PINOUT_NAME
        );
        self.reader.refresh();
        while self.running.load(Ordering::Relaxed) {
            self.render_frame();
        }
        self.backend.write(PIN_OE);
        info!("render loop stopped");
    }
}

/// Pin the calling thread to one CPU. The render loop misses its timing
/// when the scheduler migrates it mid-plane.
pub fn pin_to_cpu(cpu: usize) -> Result<(), GpioError> {
    unsafe {
        let mut set: libc::cpu_set_t = mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        if libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            return Err(GpioError::Affinity {
                cpu,
                errno: last_errno(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::bcm_buffers;

    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    enum Op {
        Write(u32),
        Set(u32),
        Clear(u32),
    }

    #[derive(Default)]
    struct MockBackend {
        ops: Vec<Op>,
        /// Flag to drop on the first register write, if set.
        kill: Option<Arc<AtomicBool>>,
    }

    impl GpioBackend for MockBackend {
        fn write(&mut self, mask: u32) {
            if let Some(flag) = &self.kill {
                flag.store(false, Ordering::Relaxed);
            }
            self.ops.push(Op::Write(mask));
        }
        fn set(&mut self, mask: u32) {
            self.ops.push(Op::Set(mask));
        }
        fn clear(&mut self, mask: u32) {
            self.ops.push(Op::Clear(mask));
        }
    }

    fn test_scene() -> SceneConfig {
        let mut scene = SceneConfig::default();
        scene.width = 64;
        scene.height = 64;
        scene.stride = 3;
        scene.bit_depth = 8;
        scene.jitter_brightness = false;
        scene
    }

    fn renderer(scene: &SceneConfig) -> (Hub75Renderer<MockBackend>, crate::buffer::BcmWriter) {
        let geo = crate::geometry::PanelGeometry::new(scene);
        let (writer, reader) = bcm_buffers(geo.bcm_len());
        let running = Arc::new(AtomicBool::new(true));
        (
            Hub75Renderer::new(MockBackend::default(), reader, scene, running),
            writer,
        )
    }

    #[test]
    fn row_sequence_is_columns_then_blank_and_latch() {
        let scene = test_scene();
        let (mut r, _writer) = renderer(&scene);
        r.render_plane(0);

        let per_row = 64 * 2 + 3;
        assert_eq!(r.backend.ops.len(), per_row * 32);

        let row = &r.backend.ops[..per_row];
        for pair in row[..128].chunks(2) {
            assert!(matches!(pair[0], Op::Write(_)));
            assert_eq!(pair[1], Op::Set(PIN_CLK));
        }
        assert_eq!(row[128], Op::Write(PIN_OE));
        assert_eq!(row[129], Op::Set(PIN_LATCH));
        assert_eq!(row[130], Op::Clear(PIN_LATCH));
    }

    #[test]
    fn column_writes_carry_the_row_address() {
        let scene = test_scene();
        let (mut r, _writer) = renderer(&scene);
        r.render_plane(0);

        let per_row = 64 * 2 + 3;
        for y in 0..32usize {
            let addr = pins::row_address_mask(y as u16);
            let row = &r.backend.ops[y * per_row..y * per_row + 128];
            for pair in row.chunks(2) {
                // unpublished buffer is all zero, jitter disabled
                assert_eq!(pair[0], Op::Write(addr));
            }
        }
    }

    #[test]
    fn published_data_reaches_the_register_writes() {
        let scene = test_scene();
        let (mut r, mut writer) = renderer(&scene);
        let [red, _, _] = pins::port_masks(0);
        writer.back().fill(red[0]);
        writer.publish();
        r.reader.refresh();
        r.render_plane(0);

        let addr0 = pins::row_address_mask(0);
        assert_eq!(r.backend.ops[0], Op::Write(red[0] | addr0));
    }

    #[test]
    fn frame_renders_every_plane() {
        let scene = test_scene();
        let (mut r, _writer) = renderer(&scene);
        r.render_frame();
        let per_row = 64 * 2 + 3;
        assert_eq!(r.backend.ops.len(), per_row * 32 * 8);
    }

    #[test]
    fn swap_is_deferred_to_a_plane_boundary() {
        let scene = test_scene();
        let (mut r, mut writer) = renderer(&scene);
        r.render_frame(); // both handles settled on the zero buffer
        r.backend.ops.clear();

        writer.back().fill(1);
        writer.publish();
        r.render_frame();

        let per_row = 64 * 2 + 3;
        let addr0 = pins::row_address_mask(0);
        // plane 0 started before any refresh, so it still shows the old
        // (zero) buffer; plane 1 onward shows the published data
        assert_eq!(r.backend.ops[0], Op::Write(addr0));
        assert_eq!(r.backend.ops[per_row * 32], Op::Write(1 | addr0));
    }

    #[test]
    fn dropped_liveness_flag_stops_within_one_plane() {
        let mut scene = test_scene();
        scene.bit_depth = 32;
        let geo = crate::geometry::PanelGeometry::new(&scene);
        let (_writer, reader) = bcm_buffers(geo.bcm_len());
        let running = Arc::new(AtomicBool::new(true));
        let backend = MockBackend {
            ops: Vec::new(),
            kill: Some(Arc::clone(&running)),
        };
        let mut r = Hub75Renderer::new(backend, reader, &scene, running);
        r.run();

        // The flag drops on the very first register write: the current
        // plane may finish, plus the final blanking write, but never a
        // second plane.
        let per_plane = (64 * 2 + 3) * 32;
        assert!(
            r.backend.ops.len() <= per_plane + 1,
            "{} register ops after the flag dropped",
            r.backend.ops.len()
        );
        assert_eq!(*r.backend.ops.last().unwrap(), Op::Write(PIN_OE));
    }

    #[test]
    fn jitter_blanking_is_ored_into_column_writes() {
        let mut scene = test_scene();
        scene.jitter_brightness = true;
        scene.brightness = 0;
        let (mut r, _writer) = renderer(&scene);
        r.render_plane(0);
        let blanked = r.backend.ops[..128]
            .iter()
            .filter(|op| matches!(**op, Op::Write(w) if w & PIN_OE != 0))
            .count();
        // brightness 0 blanks nearly every slot
        assert!(blanked > 32);
    }
}
