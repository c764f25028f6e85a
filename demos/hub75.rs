//! Demo: decaying random squares on a HUB75 panel chain.
//!
//! ```text
//! cargo run --release --example hub75 -- --width 128 --height 128 --ports 2 \
//!     --bit-depth 48 --brightness 192 --gamma 2.2 --fps 120
//! ```

use std::error::Error;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use clap::{Parser, ValueEnum};
use env_logger::Env;
use log::info;

use rpi_hub75::{
    draw_random_square, open_backend, pin_to_cpu, BoardRevision, FrameEncoder, Hub75Renderer,
    ImageMap, PixelOrder, SceneConfig, ToneMap,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ToneArg {
    None,
    Aces,
    Reinhard,
    Hable,
    Sigmoid,
    Saturation,
}

impl From<ToneArg> for ToneMap {
    fn from(arg: ToneArg) -> Self {
        match arg {
            ToneArg::None => ToneMap::None,
            ToneArg::Aces => ToneMap::Aces,
            ToneArg::Reinhard => ToneMap::Reinhard,
            ToneArg::Hable => ToneMap::Hable,
            ToneArg::Sigmoid => ToneMap::Sigmoid,
            ToneArg::Saturation => ToneMap::Saturation,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OrderArg {
    Rgb,
    Rbg,
    Bgr,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BoardArg {
    Pi3,
    Pi4,
    Pi5,
}

impl From<BoardArg> for BoardRevision {
    fn from(arg: BoardArg) -> Self {
        match arg {
            BoardArg::Pi3 => BoardRevision::Pi3,
            BoardArg::Pi4 => BoardRevision::Pi4,
            BoardArg::Pi5 => BoardRevision::Pi5,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "hub75", about = "HUB75 panel demo: decaying random squares")]
struct Args {
    /// Total image width in pixels
    #[arg(short = 'x', long, default_value_t = 64)]
    width: u16,
    /// Total image height in pixels
    #[arg(short = 'y', long, default_value_t = 64)]
    height: u16,
    /// Single panel width
    #[arg(short = 'w', long, default_value_t = 64)]
    panel_width: u16,
    /// Single panel height
    #[arg(long, default_value_t = 64)]
    panel_height: u16,
    /// Number of parallel ports (1-3)
    #[arg(short = 'p', long, default_value_t = 1)]
    ports: u8,
    /// Panels chained per port (1-16)
    #[arg(short = 'c', long, default_value_t = 1)]
    chains: u8,
    /// BCM bit depth (4-64, multiple of 4)
    #[arg(short = 'd', long, default_value_t = 32)]
    bit_depth: u8,
    /// Overall brightness (0-254)
    #[arg(short = 'b', long, default_value_t = 200)]
    brightness: u8,
    /// Gamma correction (1.0 disables)
    #[arg(short = 'g', long, default_value_t = 1.0)]
    gamma: f32,
    /// Target frames per second (0 = derive from bit depth)
    #[arg(short = 'f', long, default_value_t = 0)]
    fps: u16,
    /// Apply brightness in the lookup table instead of OE jitter
    #[arg(short = 'j', long)]
    no_jitter: bool,
    /// Ordered-noise dither strength (0.0-10.0)
    #[arg(long, default_value_t = 0.0)]
    dither: f32,
    /// Tone mapping curve
    #[arg(short = 't', long, value_enum, default_value_t = ToneArg::None)]
    tone_map: ToneArg,
    /// Tone curve parameter (Reinhard white point, sigmoid steepness)
    #[arg(long, default_value_t = 1.0)]
    tone_level: f32,
    /// Vertically flip the image
    #[arg(short = 'v', long)]
    flip: bool,
    /// Horizontally mirror the image
    #[arg(short = 'm', long)]
    mirror: bool,
    /// Use the serpentine "U" panel chaining map
    #[arg(short = 'u', long)]
    u_map: bool,
    /// Panel channel wiring order
    #[arg(long, value_enum, default_value_t = OrderArg::Rgb)]
    pixel_order: OrderArg,
    /// Board revision (selects the GPIO register dialect)
    #[arg(long, value_enum, default_value_t = BoardArg::Pi5)]
    board: BoardArg,
    /// CPU to pin the render thread to
    #[arg(long, default_value_t = 3)]
    render_cpu: usize,
}

impl Args {
    fn scene(&self) -> SceneConfig {
        let mut scene = SceneConfig::default();
        scene.width = self.width;
        scene.height = self.height;
        scene.panel_width = self.panel_width;
        scene.panel_height = self.panel_height;
        scene.num_ports = self.ports;
        scene.num_chains = self.chains;
        scene.bit_depth = self.bit_depth;
        scene.brightness = self.brightness;
        scene.gamma = self.gamma;
        scene.dither = self.dither;
        scene.tone_map = self.tone_map.into();
        scene.tone_level = self.tone_level;
        scene.jitter_brightness = !self.no_jitter;
        scene.pixel_order = match self.pixel_order {
            OrderArg::Rgb => PixelOrder::Rgb,
            OrderArg::Rbg => PixelOrder::Rbg,
            OrderArg::Bgr => PixelOrder::Bgr,
        };
        scene.image_map = match (self.u_map, self.flip, self.mirror) {
            (true, _, _) => ImageMap::U,
            (false, true, true) => ImageMap::FlipMirror,
            (false, true, false) => ImageMap::Flip,
            (false, false, true) => ImageMap::Mirror,
            (false, false, false) => ImageMap::None,
        };
        if self.fps > 0 {
            scene.fps = self.fps;
        } else {
            scene.fps = rpi_hub75::config::default_fps(scene.bit_depth, scene.panel_width);
        }
        scene
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let scene = args.scene();
    scene.validate()?;
    info!(
        "{}x{} at depth {}, {} fps target",
        scene.width, scene.height, scene.bit_depth, scene.fps
    );

    let (mut encoder, reader) = FrameEncoder::new(scene.clone())?;
    let running = Arc::new(AtomicBool::new(true));

    let width = scene.width as usize;
    let height = scene.height as usize;
    let stride = scene.stride as usize;
    thread::spawn(move || {
        let mut image = vec![0u8; width * height * stride];
        loop {
            for byte in image.iter_mut() {
                *byte = (f32::from(*byte) * 0.99) as u8;
            }
            draw_random_square(&mut image, width, height, stride);
            encoder.encode_synced(&mut image);
        }
    });

    let backend = open_backend(args.board.into())?;
    pin_to_cpu(args.render_cpu)?;
    let mut renderer = Hub75Renderer::new(backend, reader, &scene, running);
    renderer.run();
    Ok(())
}
