mod background;
mod color_math;
mod frame_buffer;
mod line_state;
mod memory;
mod mode7;
mod pixel_format;
mod registers;
mod renderer;
mod sprites;
mod tables;
mod tile;
mod window;

#[cfg(test)]
mod tests;

use log::{debug, info, trace, warn};

pub use background::{mode_layers, BackgroundLayer, LayerSetup, LineBuffer, LineBuffers};
pub use color_math::{BlendOp, ColorMath};
pub use frame_buffer::{FrameBuffer, MAX_HEIGHT, MAX_WIDTH, SCREEN_WIDTH};
pub use line_state::{LineData, LineHistory, LineMatrixData};
pub use memory::{SpriteAttr, VideoMemory};
pub use mode7::{Mode7Stats, Mode7Walker};
pub use pixel_format::PixelFormat;
pub use registers::{
    ColorMathDesignation, ColorWindowSelect, Layer, LayerMask, LayerWindow, PpuRegisters,
    ScreenInit, ScreenOver, WindowLogic, WindowRegion,
};
pub use renderer::RenderMetrics;
pub use sprites::{
    ObjStatus, SpriteLineEntry, SpriteLineRecord, MAX_SPRITES_PER_LINE, MAX_TILES_PER_LINE,
};
pub use tables::ColourTables;
pub use tile::{decode_tile, BitDepth, Orientation, TileCache, TileState};
pub use window::{ClipSpan, ClipWindowSet, ClipWindows, DrawMode, HardwareWindows, WindowPolicy};

use background::{is_hires, LineContext};
use crate::error::Result;
use renderer::{Compositor, LineLayers};
use sprites::ObjLine;

/// Scanline renderer. Owns the frame buffer, colour tables and per-layer
/// decode state; register and memory state are written by the host.
pub struct Ppu {
    pub regs: PpuRegisters,
    pub mem: VideoMemory,

    tables: ColourTables,
    frame: FrameBuffer,
    tables_pending: bool,

    bgs: [BackgroundLayer; 4],
    obj_line: ObjLine,
    sprite_record: SpriteLineRecord,
    clip: ClipWindows,
    history: LineHistory,
    window_policy: Box<dyn WindowPolicy + Send>,

    // STAT77 range/time over, accumulated over the frame
    obj_status: ObjStatus,
    odd_field: bool,
    in_frame: bool,
    frame_count: u64,

    metrics: RenderMetrics,
}

impl Ppu {
    /// Allocate buffers and build colour tables for `format`.
    pub fn graphics_init(format: PixelFormat) -> Result<Self> {
        let regs = PpuRegisters::new();
        let tables = tables::build_direct_colour_maps(format, regs.brightness)?;
        let frame = FrameBuffer::new(format)?;
        info!("graphics initialised ({:?})", format);
        Ok(Self {
            regs,
            mem: VideoMemory::new(),
            tables,
            frame,
            tables_pending: false,
            bgs: Default::default(),
            obj_line: ObjLine::default(),
            sprite_record: SpriteLineRecord::default(),
            clip: ClipWindows::unclipped(),
            history: LineHistory::default(),
            window_policy: Box::new(HardwareWindows),
            obj_status: ObjStatus::empty(),
            odd_field: false,
            in_frame: false,
            frame_count: 0,
            metrics: RenderMetrics::default(),
        })
    }

    /// Release everything. A reset is deinit followed by a fresh init.
    pub fn graphics_deinit(self) {
        info!("graphics released after {} frame(s)", self.frame_count);
    }

    pub fn set_window_policy(&mut self, policy: Box<dyn WindowPolicy + Send>) {
        self.window_policy = policy;
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.tables.format()
    }

    /// Change output layout. Not allowed inside a frame.
    pub fn set_pixel_format(&mut self, format: PixelFormat) -> Result<()> {
        if self.in_frame {
            warn!("pixel format change ignored during a frame");
            return Ok(());
        }
        self.tables = tables::build_direct_colour_maps(format, self.tables.brightness())?;
        self.frame.set_format(format)?;
        info!("pixel format set to {:?}", format);
        Ok(())
    }

    /// Rebuild the colour tables for the current brightness and format.
    /// Inside a frame the rebuild is deferred to the next frame start so
    /// lines of one frame never see two table sets.
    pub fn build_direct_colour_maps(&mut self) -> Result<()> {
        if self.in_frame {
            self.tables_pending = true;
            return Ok(());
        }
        self.tables = tables::build_direct_colour_maps(self.tables.format(), self.regs.brightness)?;
        self.tables_pending = false;
        Ok(())
    }

    /// Apply overscan/interlace from SETINI to the frame buffer geometry.
    pub fn graphics_screen_resize(&mut self) -> bool {
        self.frame.resize(self.regs.overscan(), self.regs.interlace())
    }

    /// Frame start: geometry, tables, and per-frame state.
    pub fn start_screen_refresh(&mut self) -> Result<()> {
        if self.regs.interlace() {
            self.odd_field = !self.odd_field;
        } else {
            self.odd_field = false;
        }
        self.regs.interlace_field = self.odd_field;
        self.graphics_screen_resize();

        if self.tables_pending || self.tables.brightness() != self.regs.brightness {
            self.tables = tables::build_direct_colour_maps(self.tables.format(), self.regs.brightness)?;
            self.tables_pending = false;
        }

        for bg in &mut self.bgs {
            bg.begin_frame();
        }
        self.history.reset();
        self.obj_status = ObjStatus::empty();
        self.in_frame = true;
        self.frame_count += 1;
        debug!(
            "frame {} start: mode={} brightness={} lines={}..{}",
            self.frame_count,
            self.regs.bg_mode,
            self.regs.brightness,
            self.frame.start_y,
            self.frame.end_y
        );
        Ok(())
    }

    pub fn end_screen_refresh(&mut self) {
        self.in_frame = false;
        if crate::debug_flags::render_metrics() {
            let (hits, decodes) = self
                .bgs
                .iter_mut()
                .map(BackgroundLayer::take_tile_stats)
                .fold((0, 0), |acc, s| (acc.0 + s.0, acc.1 + s.1));
            debug!(
                "frame {}: {} tile_hits={} tile_decodes={}",
                self.frame_count,
                self.metrics.summary(),
                hits,
                decodes
            );
        }
        if !self.obj_status.is_empty() {
            debug!("frame {} obj status: {:?}", self.frame_count, self.obj_status);
        }
    }

    /// Recompute every layer's clip spans from the current window registers.
    pub fn compute_clip_windows(&mut self) {
        self.clip = window::compute_clip_windows(&self.regs, self.window_policy.as_ref());
    }

    /// Output lines per 8-row tile.
    #[inline]
    pub fn lines_per_tile(&self) -> u8 {
        if self.regs.bg_interlace() {
            4
        } else {
            8
        }
    }

    /// Draw output line `line` (0-based) into the frame buffer.
    pub fn render_line(&mut self, line: u16) {
        if !self.in_frame {
            warn!("render_line({}) outside a frame", line);
            return;
        }
        let l = line as usize;
        if l < self.frame.start_y || l >= self.frame.end_y {
            return;
        }
        let row = self.frame.row_for_line(l, self.odd_field);
        let (scroll, matrix) = self.history.record(line, &self.regs);
        if crate::debug_flags::render_metrics() {
            self.metrics.lines += 1;
        }

        if self.regs.forced_blank && !crate::debug_flags::force_display() {
            let black = self.tables.black_colour();
            let planes = self.frame.row_planes(row);
            planes.main.fill(black);
            planes.sub.fill(black);
            planes.main_depth.fill(0);
            planes.sub_depth.fill(0);
            return;
        }

        self.compute_clip_windows();

        // Sprites
        let obj_interlace = self.regs.setini.contains(ScreenInit::OBJ_INTERLACE);
        self.sprite_record = sprites::evaluate_sprites_for_line(
            line,
            &self.mem,
            &self.regs.obj,
            obj_interlace,
            self.odd_field,
        );
        let flags = self.sprite_record.flags;
        self.obj_status |= flags;
        if crate::debug_flags::render_metrics() {
            if flags.contains(ObjStatus::RANGE_OVER) {
                self.metrics.obj_range_over += 1;
            }
            if flags.contains(ObjStatus::TIME_OVER) {
                self.metrics.obj_time_over += 1;
            }
        }
        sprites::draw_sprite_line(&self.sprite_record, &self.mem, &self.regs.obj, &mut self.obj_line);

        // Backgrounds
        let ctx = LineContext {
            regs: &self.regs,
            mem: &self.mem,
            tables: &self.tables,
            line,
            odd_field: self.odd_field,
            scroll,
            matrix,
        };
        let shown = self.regs.main_screen | self.regs.sub_screen;
        let mut present = [false; 4];
        if self.regs.bg_mode == 7 {
            let over = self.regs.mode7.screen_over;
            let views: &[usize] = if self.regs.extbg() { &[0, 1] } else { &[0] };
            for &bg in views {
                if !shown.contains(Layer::BGS[bg].screen_bit()) {
                    continue;
                }
                let stats = mode7::render_mode7_line(&mut self.bgs[bg], bg, &ctx, over);
                if crate::debug_flags::render_metrics() {
                    self.metrics.m7_wrap += stats.wrapped as u64;
                    self.metrics.m7_clip += stats.transparent as u64;
                    self.metrics.m7_fill += stats.filled as u64;
                }
                present[bg] = true;
            }
        } else {
            let setups = mode_layers(self.regs.bg_mode, self.regs.bg3_priority);
            for (bg, setup) in setups.iter().enumerate() {
                let Some(setup) = setup else { continue };
                if !shown.contains(Layer::BGS[bg].screen_bit()) {
                    continue;
                }
                self.bgs[bg].render_line(bg, setup, &ctx);
                present[bg] = true;
            }
        }

        let bgs = std::array::from_fn(|i| present[i].then(|| self.bgs[i].line()));
        let layers = LineLayers {
            bgs,
            obj: &self.obj_line,
        };
        let compositor = Compositor {
            regs: &self.regs,
            tables: &self.tables,
            mem: &self.mem,
            clip: &self.clip,
        };
        compositor.composite_line(&layers, self.frame.row_planes(row), &mut self.metrics);

        if crate::debug_flags::render_verbose() {
            trace!(
                "line {} row {}: mode={}{} sprites={} tiles={} flags={:?}",
                line,
                row,
                self.regs.bg_mode,
                if is_hires(self.regs.bg_mode) { " hires" } else { "" },
                self.sprite_record.entries().len(),
                self.sprite_record.tile_count(),
                flags
            );
        }
    }

    /// Render every active line of one frame.
    pub fn render_frame(&mut self) -> Result<()> {
        self.start_screen_refresh()?;
        for line in self.frame.start_y..self.frame.end_y {
            self.render_line(line as u16);
        }
        self.end_screen_refresh();
        Ok(())
    }

    #[inline]
    pub fn frame_buffer(&self) -> &FrameBuffer {
        &self.frame
    }

    #[inline]
    pub fn tables(&self) -> &ColourTables {
        &self.tables
    }

    #[inline]
    pub fn clip_windows(&self) -> &ClipWindows {
        &self.clip
    }

    /// Scroll offsets `line` was rendered with this frame.
    pub fn line_scroll(&self, line: u16) -> Option<&LineData> {
        self.history.scroll(line)
    }

    pub fn line_matrix(&self, line: u16) -> Option<&LineMatrixData> {
        self.history.matrix(line)
    }

    /// Sprite selection for the most recently rendered line.
    #[inline]
    pub fn sprite_record(&self) -> &SpriteLineRecord {
        &self.sprite_record
    }

    /// STAT77 range/time-over bits for the current frame.
    #[inline]
    pub fn obj_status(&self) -> ObjStatus {
        self.obj_status
    }

    #[inline]
    pub fn odd_field(&self) -> bool {
        self.odd_field
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    // Summarize per-frame render metrics and reset counters
    pub fn take_render_metrics_summary(&mut self) -> String {
        if !crate::debug_flags::render_metrics() {
            return "RENDER_METRICS: off".to_string();
        }
        let s = self.metrics.summary();
        self.metrics = RenderMetrics::default();
        s
    }
}
