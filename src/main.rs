use std::env;
use std::process;

use log::info;
use snes_gfx::ppu::SpriteAttr;
use snes_gfx::{debug_flags, PixelFormat, Ppu, SceneCapture};

// Demo scene layout (word addresses)
const DEMO_MAP: u16 = 0x0400;
const DEMO_CHARS: u16 = 0x1000;

/// Mode 1 checkerboard on BG1, a row of sprites, and a half-add fixed colour
/// over the backdrop.
fn build_demo_scene(format: PixelFormat) -> snes_gfx::Result<Ppu> {
    let mut ppu = Ppu::graphics_init(format)?;
    let regs = &mut ppu.regs;
    regs.write(0x2100, 0x0F);
    regs.write(0x2105, 0x01);
    regs.write(0x2107, (DEMO_MAP >> 8) as u8);
    regs.write(0x210B, (DEMO_CHARS >> 12) as u8);
    regs.write(0x212C, 0x11);
    regs.write(0x2131, 0x60);
    regs.write(0x2132, 0x20 | 0x10);
    regs.write(0x2132, 0x80 | 0x08);

    let mem = &mut ppu.mem;
    // BG tile 1: colour 1 in plane 0, colour 2 in plane 1 on alternate rows
    let mut bg_tile = [0u8; 32];
    for row in 0..8 {
        bg_tile[row * 2 + (row & 1)] = 0xFF;
    }
    mem.load_vram(DEMO_CHARS + 16, &bg_tile);
    for ty in 0..32u16 {
        for tx in 0..32u16 {
            let entry = if (tx + ty) & 1 == 0 { 0x0001 } else { 0x0001 | (1 << 10) };
            mem.write_vram_word(DEMO_MAP + ty * 32 + tx, entry);
        }
    }
    mem.write_cgram(0, 0x2108);
    mem.write_cgram(1, 0x001F);
    mem.write_cgram(2, 0x03E0);
    mem.write_cgram(17, 0x7C00);
    mem.write_cgram(18, 0x7FFF);

    // OBJ tile 1 at name base 0: solid colour 1
    let mut obj_tile = [0u8; 32];
    for row in 0..8 {
        obj_tile[row * 2] = 0xFF;
    }
    mem.load_vram(16, &obj_tile);
    mem.write_cgram(128 + 4 * 16 + 1, 0x03FF);
    for i in 0..16 {
        let attr = SpriteAttr {
            x: (i * 16) as i16,
            y: 100,
            tile: 1,
            palette: 4,
            priority: 3,
            ..SpriteAttr::default()
        };
        mem.set_sprite(i, &attr);
    }
    // park the rest below the screen through their Y bytes
    for i in 16..128 {
        mem.write_oam(i * 4 + 1, 240);
    }
    Ok(ppu)
}

fn usage(prog: &str) {
    eprintln!(
        "Usage: {} [--frames N] [--rgb565] [--force-display] [--save <capture>] [capture]",
        prog
    );
    eprintln!("Without a capture file a built-in demo scene is rendered.");
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        usage(&args[0]);
        return;
    }

    let mut frames: u32 = 1;
    let mut format: Option<PixelFormat> = None;
    let mut save_path: Option<String> = None;
    let mut capture_path: Option<String> = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--frames" => {
                let Some(v) = args.get(i + 1) else {
                    eprintln!("--frames requires a value");
                    process::exit(2);
                };
                frames = match v.parse() {
                    Ok(n) => n,
                    Err(_) => {
                        eprintln!("--frames: invalid count '{}'", v);
                        process::exit(2);
                    }
                };
                i += 2;
            }
            "--rgb565" => {
                format = Some(PixelFormat::Rgb565);
                i += 1;
            }
            "--force-display" => {
                env::set_var("FORCE_DISPLAY", "1");
                i += 1;
            }
            "--save" => {
                let Some(v) = args.get(i + 1) else {
                    eprintln!("--save requires a path");
                    process::exit(2);
                };
                save_path = Some(v.clone());
                i += 2;
            }
            s if s.starts_with('-') => {
                eprintln!("Unknown option: {}", s);
                usage(&args[0]);
                process::exit(2);
            }
            s => {
                capture_path = Some(s.to_string());
                i += 1;
            }
        }
    }

    let quiet = debug_flags::quiet();

    let loaded = match &capture_path {
        Some(path) => SceneCapture::load_from_file(path)
            .map_err(|e| format!("Failed to load capture {}: {}", path, e))
            .and_then(|c| c.into_ppu().map_err(|e| e.to_string())),
        None => build_demo_scene(format.unwrap_or(PixelFormat::Rgb555)).map_err(|e| e.to_string()),
    };
    let mut ppu = match loaded {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("{}", msg);
            process::exit(1);
        }
    };
    // a capture keeps its own format unless one was asked for
    if let Some(format) = format.filter(|&f| f != ppu.format()) {
        if let Err(e) = ppu.set_pixel_format(format) {
            eprintln!("Failed to switch pixel format: {}", e);
            process::exit(1);
        }
    }

    if let Some(path) = &save_path {
        if let Err(e) = SceneCapture::capture(&ppu).save_to_file(path) {
            eprintln!("Failed to save capture {}: {}", path, e);
            process::exit(1);
        }
        info!("scene saved to {}", path);
    }

    for frame in 1..=frames {
        if let Err(e) = ppu.render_frame() {
            eprintln!("Frame {} failed: {}", frame, e);
            process::exit(1);
        }
        if !quiet {
            let fb = ppu.frame_buffer();
            println!(
                "frame {}: {}x{} checksum={:016x} obj={:?}",
                frame,
                snes_gfx::ppu::SCREEN_WIDTH,
                fb.height(),
                fb.checksum(),
                ppu.obj_status()
            );
        }
    }
    if !quiet {
        println!("{}", ppu.take_render_metrics_summary());
    }
    ppu.graphics_deinit();
}
