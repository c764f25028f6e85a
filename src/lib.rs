//! HUB75 LED matrix driver for Raspberry Pi GPIO.
//!
//! Drives chained HUB75 panels by bit-banging a BCM (binary code
//! modulation) signal straight to the GPIO output register, with no
//! dedicated hardware support. An encoder thread turns source images into
//! pre-computed per-plane register words; a render thread replays them in
//! a tight loop. The two sides share a lock-free double buffer and swap
//! only at bit-plane boundaries, so a frame never tears on the panel.
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! use rpi_hub75::{
//!     BoardRevision, FrameBuffer, FrameEncoder, GpioMem, Hub75Renderer, RioBackend,
//!     SceneConfig,
//! };
//!
//! let scene = SceneConfig::default();
//! let (mut encoder, reader) = FrameEncoder::new(scene.clone())?;
//! let running = Arc::new(AtomicBool::new(true));
//!
//! let backend = RioBackend::new(GpioMem::map(BoardRevision::Pi5)?);
//! let mut renderer = Hub75Renderer::new(backend, reader, &scene, Arc::clone(&running));
//! std::thread::spawn(move || renderer.run());
//!
//! let mut image = FrameBuffer::new(&scene);
//! loop {
//!     // draw into `image`, then:
//!     encoder.encode_synced(image.as_mut_bytes());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use embedded_graphics::pixelcolor::Rgb888;

pub mod buffer;
pub mod config;
pub mod encoder;
pub mod frame;
pub mod geometry;
pub mod gpio;
pub mod image;
pub mod jitter;
pub mod pins;
pub mod tonemap;

pub type Color = Rgb888;

pub use buffer::{bcm_buffers, BcmReader, BcmWriter};
pub use config::{ConfigError, ImageMap, PixelOrder, SceneConfig, ToneMap};
pub use frame::FrameEncoder;
pub use geometry::PanelGeometry;
pub use gpio::{
    open_backend, pin_to_cpu, BoardRevision, GpioBackend, GpioError, GpioMem, Hub75Renderer,
    RioBackend, SetClearBackend,
};
pub use image::{draw_random_square, FrameBuffer};
pub use jitter::JitterMask;
pub use tonemap::{bcm_mask, ToneLut};
