use log::trace;

use super::line_state::{LineData, LineMatrixData};
use super::memory::VideoMemory;
use super::registers::{BgRegisters, PpuRegisters};
use super::tables::ColourTables;
use super::tile::{BitDepth, Orientation, TileCache};

/// How one BG is drawn in the current mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerSetup {
    pub depth: BitDepth,
    /// Depth written for priority-0 tiles
    pub z_low: u8,
    /// Depth written for priority-1 tiles
    pub z_high: u8,
    /// First CGRAM entry of palette 0
    pub palette_base: u8,
    /// 8bpp layer that may use direct colour
    pub direct_colour: bool,
}

const fn setup(depth: BitDepth, z_low: u8, z_high: u8, palette_base: u8) -> Option<LayerSetup> {
    Some(LayerSetup {
        depth,
        z_low,
        z_high,
        palette_base,
        direct_colour: matches!(depth, BitDepth::Bpp8),
    })
}

/// Tile layers for BG modes 0-6. Mode 7 has its own renderer.
pub fn mode_layers(mode: u8, bg3_priority: bool) -> [Option<LayerSetup>; 4] {
    use BitDepth::*;
    match mode & 7 {
        0 => [
            setup(Bpp2, 11, 15, 0),
            setup(Bpp2, 10, 14, 32),
            setup(Bpp2, 3, 7, 64),
            setup(Bpp2, 2, 6, 96),
        ],
        1 => [
            setup(Bpp4, 11, 15, 0),
            setup(Bpp4, 10, 14, 0),
            setup(Bpp2, 3, if bg3_priority { 17 } else { 7 }, 0),
            None,
        ],
        2 => [setup(Bpp4, 7, 15, 0), setup(Bpp4, 3, 11, 0), None, None],
        3 => [setup(Bpp8, 7, 15, 0), setup(Bpp4, 3, 11, 0), None, None],
        4 => [setup(Bpp8, 7, 15, 0), setup(Bpp2, 3, 11, 0), None, None],
        5 => [setup(Bpp4, 7, 15, 0), setup(Bpp2, 3, 11, 0), None, None],
        6 => [setup(Bpp4, 7, 15, 0), None, None, None],
        _ => [None; 4],
    }
}

#[inline]
pub fn has_offset_per_tile(mode: u8) -> bool {
    matches!(mode, 2 | 4 | 6)
}

#[inline]
pub fn is_hires(mode: u8) -> bool {
    matches!(mode, 5 | 6)
}

/// Shared per-line inputs for the BG and Mode 7 renderers.
#[derive(Clone, Copy)]
pub struct LineContext<'a> {
    pub regs: &'a PpuRegisters,
    pub mem: &'a VideoMemory,
    pub tables: &'a ColourTables,
    /// Output row, 0-based
    pub line: u16,
    pub odd_field: bool,
    /// Scroll offsets latched for this line
    pub scroll: LineData,
    /// Mode 7 matrix latched for this line
    pub matrix: LineMatrixData,
}

/// One decoded BG line: final colour and depth per pixel, depth 0 = transparent.
#[derive(Debug, Clone, Copy)]
pub struct LineBuffer {
    pub colour: [u16; 256],
    pub depth: [u8; 256],
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self {
            colour: [0; 256],
            depth: [0; 256],
        }
    }
}

impl LineBuffer {
    pub fn clear(&mut self) {
        self.colour.fill(0);
        self.depth.fill(0);
    }

    /// Repeat the first pixel of each `size`-wide block across the block.
    pub fn apply_mosaic(&mut self, size: usize) {
        if size <= 1 {
            return;
        }
        for x in 0..256 {
            let src = x - x % size;
            self.colour[x] = self.colour[src];
            self.depth[x] = self.depth[src];
        }
    }
}

/// Current/previous decoded lines. Advancing flips an index; the previous
/// buffer stays intact for vertical mosaic.
#[derive(Debug, Clone, Default)]
pub struct LineBuffers {
    bufs: [LineBuffer; 2],
    current: usize,
    last_line: Option<u16>,
}

impl LineBuffers {
    #[inline]
    pub fn current(&self) -> &LineBuffer {
        &self.bufs[self.current]
    }

    #[inline]
    pub fn previous(&self) -> &LineBuffer {
        &self.bufs[self.current ^ 1]
    }

    /// Make the other buffer current and hand it out for decoding `line`.
    pub fn advance(&mut self, line: u16) -> &mut LineBuffer {
        self.current ^= 1;
        self.last_line = Some(line);
        &mut self.bufs[self.current]
    }

    /// True when `line` falls in the same vertical mosaic block as the last
    /// decoded line, so the current buffer can be shown again.
    pub fn reusable(&self, line: u16, mosaic: u16) -> bool {
        match self.last_line {
            Some(last) => mosaic > 1 && last <= line && last / mosaic == line / mosaic,
            None => false,
        }
    }

    /// Start of frame: nothing carries over.
    pub fn reset(&mut self) {
        self.last_line = None;
    }
}

/// Tilemap word for tile (`tx`, `ty`), honouring the 32/64 screen layout.
pub fn tilemap_entry(bg: &BgRegisters, mem: &VideoMemory, tx: u16, ty: u16) -> u16 {
    let tx = tx & if bg.sc_size & 1 != 0 { 63 } else { 31 };
    let ty = ty & if bg.sc_size & 2 != 0 { 63 } else { 31 };
    let mut word = bg.sc_base;
    if tx >= 32 {
        word = word.wrapping_add(0x400);
    }
    if ty >= 32 {
        word = word.wrapping_add(if bg.sc_size == 3 { 0x800 } else { 0x400 });
    }
    mem.vram_word(word.wrapping_add((ty & 31) * 32 + (tx & 31)))
}

/// Per 8-px column (hofs, vofs) for BG1/BG2 in the offset-per-tile modes.
/// Column 0 always uses the line's own offsets.
pub fn offset_columns(
    regs: &PpuRegisters,
    scroll: &LineData,
    mem: &VideoMemory,
    bg: usize,
) -> [(u16, u16); 33] {
    let own = scroll.offsets[bg];
    let (bg3_hofs, bg3_vofs) = scroll.offsets[2];
    let bg3 = &regs.bg[2];
    let enable = 0x2000u16 << bg;
    let mut cols = [own; 33];
    let row = bg3_vofs >> 3;

    for (col, out) in cols.iter_mut().enumerate().skip(1) {
        let tx = (bg3_hofs >> 3).wrapping_add(col as u16 - 1);
        let (h_entry, v_entry) = if regs.bg_mode == 4 {
            let e = tilemap_entry(bg3, mem, tx, row);
            if e & 0x8000 != 0 {
                (0, e)
            } else {
                (e, 0)
            }
        } else {
            (
                tilemap_entry(bg3, mem, tx, row),
                tilemap_entry(bg3, mem, tx, row.wrapping_add(1)),
            )
        };
        if h_entry & enable != 0 {
            out.0 = (h_entry & 0x3F8) | (own.0 & 7);
        }
        if v_entry & enable != 0 {
            out.1 = v_entry & 0x3FF;
        }
    }
    cols
}

#[inline]
fn cache_slot(depth: BitDepth) -> usize {
    match depth {
        BitDepth::Bpp2 => 0,
        BitDepth::Bpp4 => 1,
        BitDepth::Bpp8 => 2,
    }
}

/// Decode state for one background layer. Tile caches are kept per bit
/// depth and allocated on first use, so a mid-frame mode change does not
/// throw decodes away.
#[derive(Debug, Clone)]
pub struct BackgroundLayer {
    caches: [Option<TileCache>; 3],
    pub lines: LineBuffers,
    vram_generation: u64,
}

impl Default for BackgroundLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundLayer {
    pub fn new() -> Self {
        Self {
            caches: Default::default(),
            lines: LineBuffers::default(),
            vram_generation: 0,
        }
    }

    fn invalidate(&mut self) {
        for cache in self.caches.iter_mut().flatten() {
            cache.invalidate();
        }
        self.lines.reset();
    }

    /// Start of frame: drop decodes, VRAM may have changed since.
    pub fn begin_frame(&mut self) {
        self.invalidate();
    }

    /// Drop decodes and the mosaic line if VRAM was written since the last
    /// line this layer drew.
    pub fn sync_vram(&mut self, mem: &VideoMemory) {
        let generation = mem.vram_generation();
        if generation != self.vram_generation {
            self.invalidate();
            self.vram_generation = generation;
        }
    }

    pub fn tile_cache(&self, depth: BitDepth) -> Option<&TileCache> {
        self.caches[cache_slot(depth)].as_ref()
    }

    /// (hits, decodes) summed over every depth since the last call.
    pub fn take_tile_stats(&mut self) -> (u64, u64) {
        self.caches
            .iter_mut()
            .flatten()
            .map(TileCache::take_stats)
            .fold((0, 0), |acc, s| (acc.0 + s.0, acc.1 + s.1))
    }

    #[inline]
    pub fn line(&self) -> &LineBuffer {
        self.lines.current()
    }

    /// Decode BG `bg` for `ctx.line` into the current line buffer.
    pub fn render_line(&mut self, bg: usize, setup: &LayerSetup, ctx: &LineContext<'_>) {
        let regs = ctx.regs;
        let mem = ctx.mem;
        let bgr = &regs.bg[bg];
        let (bg_hofs, bg_vofs) = ctx.scroll.offsets[bg];
        let mosaic = if bgr.mosaic { regs.mosaic_size as u16 } else { 1 };
        self.sync_vram(mem);
        if self.lines.reusable(ctx.line, mosaic) {
            return;
        }

        let cache = self.caches[cache_slot(setup.depth)]
            .get_or_insert_with(|| TileCache::new(setup.depth));
        let hires = is_hires(regs.bg_mode);
        let opt = (has_offset_per_tile(regs.bg_mode) && bg < 2)
            .then(|| offset_columns(regs, &ctx.scroll, mem, bg));
        let tile_w: u16 = if bgr.tile_16 || hires { 16 } else { 8 };
        let tile_h: u16 = if bgr.tile_16 { 16 } else { 8 };
        let direct = regs.color_window.direct_colour && setup.direct_colour;
        let row_base = if regs.bg_interlace() {
            ((ctx.line + 1) << 1) | ctx.odd_field as u16
        } else {
            ctx.line + 1
        };
        let name_base = (bgr.name_base as usize) << 1;
        let bpt = setup.depth.bytes_per_tile();
        let palette_size = setup.depth.palette_size() as u8;

        let buf = self.lines.advance(ctx.line);
        for x in 0..256u16 {
            let (hofs, vofs) = match &opt {
                Some(cols) => cols[((x + (bg_hofs & 7)) >> 3) as usize],
                None => (bg_hofs, bg_vofs),
            };
            let px = if hires {
                ((x + hofs) << 1) | 1
            } else {
                x + hofs
            };
            let py = row_base + vofs;

            let entry = tilemap_entry(bgr, mem, px / tile_w, py / tile_h);
            let hflip = entry & 0x4000 != 0;
            let vflip = entry & 0x8000 != 0;

            let f = px % tile_w;
            let fx = if hflip { tile_w - 1 - f } else { f };
            let fy = if vflip {
                tile_h - 1 - py % tile_h
            } else {
                py % tile_h
            };
            let name = ((entry & 0x3FF) + (fx >> 3) + ((fy >> 3) << 4)) & 0x3FF;
            let addr = (name_base + name as usize * bpt) & 0xFFFF;

            let x = x as usize;
            let p = match cache.get(mem.vram(), addr, Orientation::from_flip(hflip)) {
                Some(pixels) => pixels[((fy & 7) * 8 + (f & 7)) as usize],
                None => 0,
            };
            if p == 0 {
                buf.colour[x] = 0;
                buf.depth[x] = 0;
                continue;
            }

            let palette = ((entry >> 10) & 7) as u8;
            buf.colour[x] = if direct {
                ctx.tables.direct_colour(palette, p)
            } else {
                let index = match setup.depth {
                    BitDepth::Bpp8 => p,
                    _ => setup.palette_base + palette * palette_size + p,
                };
                ctx.tables.screen_colour(mem.cgram_colour(index))
            };
            buf.depth[x] = if entry & 0x2000 != 0 {
                setup.z_high
            } else {
                setup.z_low
            };
        }
        buf.apply_mosaic(mosaic as usize);

        if crate::debug_flags::render_verbose() {
            trace!(
                "BG{} line {} decoded (hofs={} vofs={} mosaic={})",
                bg + 1,
                ctx.line,
                bg_hofs,
                bg_vofs,
                mosaic
            );
        }
    }
}
