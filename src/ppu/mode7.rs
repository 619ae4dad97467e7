//! Mode 7: one 1024x1024 8bpp playfield under a 2x2 affine matrix.
//!
//! VRAM is interleaved: even bytes hold the 128x128 tilemap, odd bytes the
//! 256 character bitmaps (64 bytes each).

use log::trace;

use super::background::{BackgroundLayer, LineContext};
use super::line_state::LineMatrixData;
use super::registers::ScreenOver;

const BG1_DEPTH: u8 = 7;
const BG2_DEPTH_HIGH: u8 = 11;
const BG2_DEPTH_LOW: u8 = 3;

/// What happened to out-of-playfield samples on a line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mode7Stats {
    pub wrapped: u32,
    pub transparent: u32,
    pub filled: u32,
}

#[inline]
fn clip_10_bit_signed(a: i32) -> i32 {
    if a & 0x2000 != 0 {
        a | !0x3FF
    } else {
        a & 0x3FF
    }
}

/// Fixed-point walker for one line: playfield position of the leftmost
/// pixel and the per-pixel step, both 8.8 fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode7Walker {
    x: i32,
    y: i32,
    step_x: i32,
    step_y: i32,
}

impl Mode7Walker {
    /// Set up for output row `line` (0-based) from that line's matrix.
    pub fn new(m: &LineMatrixData, hflip: bool, vflip: bool, line: u16) -> Self {
        let a = m.a as i32;
        let b = m.b as i32;
        let c = m.c as i32;
        let d = m.d as i32;
        let cx = m.centre_x as i32;
        let cy = m.centre_y as i32;

        let screen_y = line as i32 + 1;
        let starty = if vflip { 255 - screen_y } else { screen_y };
        let yy = clip_10_bit_signed(m.vofs as i32 - cy);
        let bb = ((b * starty) & !63) + ((b * yy) & !63) + (cx << 8);
        let dd = ((d * starty) & !63) + ((d * yy) & !63) + (cy << 8);

        let (startx, step_x, step_y) = if hflip { (255, -a, -c) } else { (0, a, c) };
        let xx = clip_10_bit_signed(m.hofs as i32 - cx);
        let aa = a * startx + ((a * xx) & !63);
        let cc = c * startx + ((c * xx) & !63);

        Self {
            x: aa + bb,
            y: cc + dd,
            step_x,
            step_y,
        }
    }

    /// Integer playfield coordinate for output column `x`, before wrapping.
    #[inline]
    pub fn at(&self, x: u16) -> (i32, i32) {
        let x = x as i32;
        ((self.x + self.step_x * x) >> 8, (self.y + self.step_y * x) >> 8)
    }
}

/// Pixel byte for playfield (`x`, `y`), or None when the screen-over mode
/// leaves it transparent.
#[inline]
fn sample(vram: &[u8], x: i32, y: i32, over: ScreenOver, stats: &mut Mode7Stats) -> Option<u8> {
    let outside = (x | y) & !0x3FF != 0;
    let (x, y) = match (outside, over) {
        (false, _) => (x, y),
        (true, ScreenOver::Wrap) => {
            stats.wrapped += 1;
            (x & 0x3FF, y & 0x3FF)
        }
        (true, ScreenOver::Transparent) => {
            stats.transparent += 1;
            return None;
        }
        (true, ScreenOver::Tile0) => {
            stats.filled += 1;
            let addr = (((y & 7) << 4) + ((x & 7) << 1) + 1) as usize;
            return Some(vram[addr]);
        }
    };
    let map = ((((y >> 3) << 7) + (x >> 3)) << 1) as usize;
    let tile = vram[map] as usize;
    let addr = (tile << 7) + (((y & 7) << 4) + ((x & 7) << 1) + 1) as usize;
    Some(vram[addr])
}

/// Render BG1 (`bg == 0`) or the EXTBG BG2 view (`bg == 1`) of the Mode 7
/// playfield into the layer's next line buffer.
pub fn render_mode7_line(
    layer: &mut BackgroundLayer,
    bg: usize,
    ctx: &LineContext<'_>,
    over: ScreenOver,
) -> Mode7Stats {
    let regs = ctx.regs;
    let mosaic = if regs.bg[bg].mosaic {
        regs.mosaic_size as u16
    } else {
        1
    };
    let mut stats = Mode7Stats::default();
    layer.sync_vram(ctx.mem);
    if layer.lines.reusable(ctx.line, mosaic) {
        return stats;
    }

    let walker = Mode7Walker::new(&ctx.matrix, regs.mode7.hflip, regs.mode7.vflip, ctx.line);
    let direct = regs.color_window.direct_colour && bg == 0;
    let vram = ctx.mem.vram();
    let buf = layer.lines.advance(ctx.line);

    for x in 0..256u16 {
        let (px, py) = walker.at(x);
        let xi = x as usize;
        let b = sample(vram, px, py, over, &mut stats).unwrap_or(0);
        let (index, depth) = if bg == 0 {
            (b, BG1_DEPTH)
        } else if b & 0x80 != 0 {
            (b & 0x7F, BG2_DEPTH_HIGH)
        } else {
            (b & 0x7F, BG2_DEPTH_LOW)
        };
        if index == 0 {
            buf.colour[xi] = 0;
            buf.depth[xi] = 0;
            continue;
        }
        buf.colour[xi] = if direct {
            ctx.tables.direct_colour(0, index)
        } else {
            ctx.tables.screen_colour(ctx.mem.cgram_colour(index))
        };
        buf.depth[xi] = depth;
    }
    buf.apply_mosaic(mosaic as usize);

    if crate::debug_flags::render_verbose() {
        trace!(
            "M7 BG{} line {}: wrap={} clip={} fill={}",
            bg + 1,
            ctx.line,
            stats.wrapped,
            stats.transparent,
            stats.filled
        );
    }
    stats
}
