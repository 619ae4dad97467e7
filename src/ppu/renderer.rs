//! Scanline compositing: depth-tested layer merge plus colour math.
//!
//! Every screen pixel carries a depth; a source pixel is written only when
//! its depth beats what is already there. Sprites go first against a low
//! test depth so the first-evaluated sprite keeps a pixel, then each BG, then
//! the backdrop fills whatever is still empty. Colour math happens as the
//! main screen is written, so the sub screen must be finished first.

use super::background::LineBuffer;
use super::color_math::{BlendOp, ColorMath};
use super::frame_buffer::RowPlanes;
use super::memory::VideoMemory;
use super::registers::{ColorMathDesignation, Layer, LayerMask, PpuRegisters};
use super::sprites::ObjLine;
use super::tables::ColourTables;
use super::window::{ClipWindowSet, ClipWindows, DrawMode};

/// OBJ pixels only land where nothing but the clear value (0) or backdrop is.
const OBJ_TEST_DEPTH: u8 = 2;
pub const BACKDROP_DEPTH: u8 = 1;

/// Per-frame counters, collected when RENDER_METRICS is on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderMetrics {
    pub lines: u64,
    pub math_add: u64,
    pub math_sub: u64,
    pub math_half: u64,
    pub forced_black: u64,
    pub masked_bg: u64,
    pub masked_obj: u64,
    pub obj_range_over: u64,
    pub obj_time_over: u64,
    pub m7_wrap: u64,
    pub m7_clip: u64,
    pub m7_fill: u64,
}

impl RenderMetrics {
    pub fn summary(&self) -> String {
        format!(
            "RENDER_METRICS: lines={} add={} sub={} half={} black={} masked_bg={} masked_obj={} range_over={} time_over={} m7_wrap={} m7_clip={} m7_fill={}",
            self.lines,
            self.math_add,
            self.math_sub,
            self.math_half,
            self.forced_black,
            self.masked_bg,
            self.masked_obj,
            self.obj_range_over,
            self.obj_time_over,
            self.m7_wrap,
            self.m7_clip,
            self.m7_fill
        )
    }
}

/// Final stage of a pixel write.
pub trait PixelWriter {
    fn write(&mut self, x: usize, colour: u16, mode: DrawMode) -> u16;
}

/// No blending; honours forced black.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainWriter {
    pub black: u16,
}

impl PixelWriter for PlainWriter {
    #[inline]
    fn write(&mut self, _x: usize, colour: u16, mode: DrawMode) -> u16 {
        if mode.contains(DrawMode::BLACK) {
            self.black
        } else {
            colour
        }
    }
}

/// Second operand of the blend.
#[derive(Debug, Clone, Copy)]
pub enum MathSource<'a> {
    SubScreen { colour: &'a [u16], depth: &'a [u8] },
    Fixed(u16),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MathCounts {
    pub add: u64,
    pub sub: u64,
    pub half: u64,
    pub black: u64,
}

/// Blends the main pixel with the sub screen or fixed colour wherever the
/// colour window allows it.
pub struct MathWriter<'a> {
    math: ColorMath<'a>,
    op: BlendOp,
    source: MathSource<'a>,
    black: u16,
    pub counts: MathCounts,
}

impl<'a> MathWriter<'a> {
    pub fn new(math: ColorMath<'a>, op: BlendOp, source: MathSource<'a>, black: u16) -> Self {
        Self {
            math,
            op,
            source,
            black,
            counts: MathCounts::default(),
        }
    }
}

impl PixelWriter for MathWriter<'_> {
    #[inline]
    fn write(&mut self, x: usize, colour: u16, mode: DrawMode) -> u16 {
        let black = mode.contains(DrawMode::BLACK);
        let main = if black {
            self.counts.black += 1;
            self.black
        } else {
            colour
        };
        if !mode.contains(DrawMode::MATH) {
            return main;
        }

        // Halving is skipped against a bare sub backdrop and on black pixels.
        let (other, halve) = match self.source {
            MathSource::SubScreen { colour, depth } => (colour[x], depth[x] != BACKDROP_DEPTH),
            MathSource::Fixed(c) => (c, true),
        };
        let op = if halve && !black {
            self.op
        } else {
            self.op.full()
        };
        if op.is_subtract() {
            self.counts.sub += 1;
        } else {
            self.counts.add += 1;
        }
        if op.is_half() {
            self.counts.half += 1;
        }
        self.math.blend(op, main, other)
    }
}

/// One screen's row while it is being composed.
struct Screen<'p> {
    colour: &'p mut [u16],
    depth: &'p mut [u8],
}

impl Screen<'_> {
    fn draw_bg<W: PixelWriter>(&mut self, src: &LineBuffer, clip: &ClipWindowSet, writer: &mut W) {
        for span in clip.spans() {
            for x in span.left as usize..span.right as usize {
                let d = src.depth[x];
                if d > self.depth[x] {
                    self.colour[x] = writer.write(x, src.colour[x], span.mode);
                    self.depth[x] = d;
                }
            }
        }
    }

    fn draw_obj<W: PixelWriter>(
        &mut self,
        obj: &ObjLine,
        colours: &[u16; 256],
        clip: &ClipWindowSet,
        writer: &mut W,
        plain: &mut PlainWriter,
        math: bool,
    ) {
        for span in clip.spans() {
            for x in span.left as usize..span.right as usize {
                if !obj.is_opaque(x) || self.depth[x] >= OBJ_TEST_DEPTH {
                    continue;
                }
                let c = colours[obj.colour[x] as usize];
                self.colour[x] = if math && obj.math_allowed(x) {
                    writer.write(x, c, span.mode)
                } else {
                    plain.write(x, c, span.mode)
                };
                self.depth[x] = obj.depth(x);
            }
        }
    }

    fn draw_backdrop<W: PixelWriter>(&mut self, colour: u16, clip: &ClipWindowSet, writer: &mut W) {
        for span in clip.spans() {
            for x in span.left as usize..span.right as usize {
                if self.depth[x] == 0 {
                    self.colour[x] = writer.write(x, colour, span.mode);
                    self.depth[x] = BACKDROP_DEPTH;
                }
            }
        }
    }
}

/// Decoded sources for one line.
pub struct LineLayers<'a> {
    /// BG line per layer present in the current mode
    pub bgs: [Option<&'a LineBuffer>; 4],
    pub obj: &'a ObjLine,
}

/// Read-only state the compositor needs for a line.
pub struct Compositor<'a> {
    pub regs: &'a PpuRegisters,
    pub tables: &'a ColourTables,
    pub mem: &'a VideoMemory,
    pub clip: &'a ClipWindows,
}

impl Compositor<'_> {
    #[inline]
    fn plain_writer(&self) -> PlainWriter {
        PlainWriter {
            black: self.tables.black_colour(),
        }
    }

    /// Screen colours for every CGRAM entry at the current brightness.
    fn palette(&self) -> [u16; 256] {
        let mut out = [0u16; 256];
        for (i, c) in out.iter_mut().enumerate() {
            *c = self.tables.screen_colour(self.mem.cgram_colour(i as u8));
        }
        out
    }

    fn masked_pixels(&self, screen: usize, layer: Layer) -> u64 {
        256 - self.clip.get(screen, layer).coverage() as u64
    }

    /// Compose the sub screen, then the main screen with colour math.
    pub fn composite_line(
        &self,
        layers: &LineLayers<'_>,
        planes: RowPlanes<'_>,
        metrics: &mut RenderMetrics,
    ) {
        let regs = self.regs;
        let RowPlanes {
            main,
            sub,
            main_depth,
            sub_depth,
            zero,
        } = planes;
        let palette = self.palette();
        let (r, g, b) = regs.fixed_colour;
        let fixed = self.tables.fixed_colour(r, g, b);
        let collect = crate::debug_flags::render_metrics();
        let mut plain = self.plain_writer();

        // Sub screen: no math, backdrop is the fixed colour.
        main_depth.fill(0);
        sub_depth.fill(0);
        {
            let mut scr = Screen {
                colour: &mut *sub,
                depth: &mut *sub_depth,
            };
            self.draw_layers(
                &mut scr,
                ClipWindows::SUB,
                regs.sub_screen,
                layers,
                &palette,
                &mut plain,
                ColorMathDesignation::empty(),
            );
            scr.draw_backdrop(
                fixed,
                self.clip.get(ClipWindows::SUB, Layer::Backdrop),
                &mut plain,
            );
        }

        let sub: &[u16] = sub;
        let sub_depth: &[u8] = sub_depth;
        let op = BlendOp::select(
            regs.color_math.contains(ColorMathDesignation::SUBTRACT),
            regs.color_math.contains(ColorMathDesignation::HALF),
            self.tables.brightness(),
        );
        let source = if regs.color_window.sub_screen_source {
            MathSource::SubScreen {
                colour: sub,
                depth: sub_depth,
            }
        } else {
            MathSource::Fixed(fixed)
        };
        let math = ColorMath::new(self.tables.format(), &self.tables.brightness_cap, zero);
        let mut writer = MathWriter::new(math, op, source, self.tables.black_colour());

        let mut scr = Screen {
            colour: main,
            depth: main_depth,
        };
        self.draw_layers(
            &mut scr,
            ClipWindows::MAIN,
            regs.main_screen,
            layers,
            &palette,
            &mut writer,
            regs.color_math,
        );
        let backdrop_clip = self.clip.get(ClipWindows::MAIN, Layer::Backdrop);
        if regs.color_math.contains(ColorMathDesignation::BACKDROP) {
            scr.draw_backdrop(palette[0], backdrop_clip, &mut writer);
        } else {
            scr.draw_backdrop(palette[0], backdrop_clip, &mut plain);
        }

        if collect {
            metrics.math_add += writer.counts.add;
            metrics.math_sub += writer.counts.sub;
            metrics.math_half += writer.counts.half;
            metrics.forced_black += writer.counts.black;
            for layer in Layer::BGS {
                if layers.bgs[layer.index()].is_some() && regs.main_screen.contains(layer.screen_bit()) {
                    metrics.masked_bg += self.masked_pixels(ClipWindows::MAIN, layer);
                }
            }
            if regs.main_screen.contains(LayerMask::OBJ) {
                metrics.masked_obj += self.masked_pixels(ClipWindows::MAIN, Layer::Obj);
            }
        }
    }

    /// OBJ then BG1-BG4 on one screen. Layers flagged in `math_layers` go
    /// through `writer`, the rest are written plainly.
    #[allow(clippy::too_many_arguments)]
    fn draw_layers<W: PixelWriter>(
        &self,
        scr: &mut Screen<'_>,
        screen: usize,
        enabled: LayerMask,
        layers: &LineLayers<'_>,
        palette: &[u16; 256],
        writer: &mut W,
        math_layers: ColorMathDesignation,
    ) {
        let mut plain = self.plain_writer();
        if enabled.contains(LayerMask::OBJ) {
            let math = math_layers.contains(ColorMathDesignation::OBJ);
            let clip = self.clip.get(screen, Layer::Obj);
            scr.draw_obj(layers.obj, palette, clip, writer, &mut plain, math);
        }
        for layer in Layer::BGS {
            let Some(src) = layers.bgs[layer.index()] else {
                continue;
            };
            if !enabled.contains(layer.screen_bit()) {
                continue;
            }
            let clip = self.clip.get(screen, layer);
            if math_layers.contains(layer.math_bit()) {
                scr.draw_bg(src, clip, writer);
            } else {
                scr.draw_bg(src, clip, &mut plain);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ppu::pixel_format::PixelFormat;
    use crate::ppu::tables::{build_direct_colour_maps, build_zero_table};
    use crate::ppu::window::{compute_clip_windows, HardwareWindows};

    const F: PixelFormat = PixelFormat::Rgb555;

    struct Rig {
        regs: PpuRegisters,
        mem: VideoMemory,
        tables: ColourTables,
        zero: Vec<u16>,
        main: [u16; 256],
        sub: [u16; 256],
        main_depth: [u8; 256],
        sub_depth: [u8; 256],
    }

    impl Rig {
        fn new() -> Self {
            Self {
                regs: PpuRegisters::new(),
                mem: VideoMemory::new(),
                tables: build_direct_colour_maps(F, 15).unwrap(),
                zero: build_zero_table(F).unwrap(),
                main: [0; 256],
                sub: [0; 256],
                main_depth: [0; 256],
                sub_depth: [0; 256],
            }
        }

        fn run(&mut self, layers: &LineLayers<'_>) -> RenderMetrics {
            let clip = compute_clip_windows(&self.regs, &HardwareWindows);
            let comp = Compositor {
                regs: &self.regs,
                tables: &self.tables,
                mem: &self.mem,
                clip: &clip,
            };
            let mut metrics = RenderMetrics::default();
            comp.composite_line(
                layers,
                RowPlanes {
                    main: &mut self.main,
                    sub: &mut self.sub,
                    main_depth: &mut self.main_depth,
                    sub_depth: &mut self.sub_depth,
                    zero: &self.zero,
                },
                &mut metrics,
            );
            metrics
        }
    }

    fn solid(colour: u16, depth: u8) -> LineBuffer {
        LineBuffer {
            colour: [colour; 256],
            depth: [depth; 256],
        }
    }

    #[test]
    fn backdrop_fills_empty_line() {
        let mut rig = Rig::new();
        rig.mem.write_cgram(0, 0x001F);
        let obj = ObjLine::default();
        rig.run(&LineLayers {
            bgs: [None; 4],
            obj: &obj,
        });
        assert!(rig.main.iter().all(|&c| c == F.build_pixel(31, 0, 0)));
        assert!(rig.main_depth.iter().all(|&d| d == BACKDROP_DEPTH));
    }

    #[test]
    fn higher_depth_wins() {
        let mut rig = Rig::new();
        rig.regs.main_screen = LayerMask::BG1 | LayerMask::BG2 | LayerMask::OBJ;
        let bg1 = solid(0x1111, 11);
        let bg2 = solid(0x2222, 14);
        let mut obj = ObjLine::default();
        obj.colour[0] = 130;
        obj.priority[0] = 3; // depth 16
        obj.colour[1] = 130;
        obj.priority[1] = 1; // depth 8
        rig.mem.write_cgram(130, 0x7FFF);
        rig.run(&LineLayers {
            bgs: [Some(&bg1), Some(&bg2), None, None],
            obj: &obj,
        });
        assert_eq!(rig.main[0], 0x7FFF);
        assert_eq!(rig.main_depth[0], 16);
        assert_eq!(rig.main[1], 0x2222);
        assert_eq!(rig.main[2], 0x2222);
    }

    #[test]
    fn layer_only_on_sub_screen_stays_off_main() {
        let mut rig = Rig::new();
        rig.regs.sub_screen = LayerMask::BG1;
        let bg1 = solid(0x0421, 11);
        let obj = ObjLine::default();
        rig.run(&LineLayers {
            bgs: [Some(&bg1), None, None, None],
            obj: &obj,
        });
        assert_eq!(rig.sub[5], 0x0421);
        assert_eq!(rig.main_depth[5], BACKDROP_DEPTH);
    }

    #[test]
    fn fixed_colour_add_with_half() {
        let mut rig = Rig::new();
        rig.regs.main_screen = LayerMask::BG1;
        rig.regs.color_math = ColorMathDesignation::BG1 | ColorMathDesignation::HALF;
        rig.regs.fixed_colour = (20, 10, 0);
        let bg1 = solid(F.build_pixel(10, 20, 30), 11);
        let obj = ObjLine::default();
        rig.run(&LineLayers {
            bgs: [Some(&bg1), None, None, None],
            obj: &obj,
        });
        assert_eq!(F.channels(rig.main[0]), (15, 15, 15));
    }

    #[test]
    fn sub_backdrop_skips_halving() {
        let mut rig = Rig::new();
        rig.regs.main_screen = LayerMask::BG1;
        rig.regs.color_math = ColorMathDesignation::BG1 | ColorMathDesignation::HALF;
        rig.regs.color_window.sub_screen_source = true;
        rig.regs.fixed_colour = (4, 4, 4);
        let bg1 = solid(F.build_pixel(10, 10, 10), 11);
        let bg2 = solid(F.build_pixel(20, 20, 20), 10);
        rig.regs.sub_screen = LayerMask::BG2;
        rig.regs.window_pos[0] = (0, 127);
        rig.regs.windows[Layer::Bg2.index()].w1.enabled = true;
        rig.regs.sub_window = LayerMask::BG2;
        let obj = ObjLine::default();
        rig.run(&LineLayers {
            bgs: [Some(&bg1), Some(&bg2), None, None],
            obj: &obj,
        });
        // left half: sub is backdrop (fixed colour), full add
        assert_eq!(F.channels(rig.main[10]), (14, 14, 14));
        // right half: BG2 on sub, averaged
        assert_eq!(F.channels(rig.main[200]), (15, 15, 15));
    }

    #[test]
    fn subtract_and_forced_black() {
        let mut rig = Rig::new();
        rig.regs.main_screen = LayerMask::BG1;
        rig.regs.color_math = ColorMathDesignation::BG1 | ColorMathDesignation::SUBTRACT;
        rig.regs.fixed_colour = (5, 5, 5);
        rig.regs.window_pos[0] = (100, 199);
        rig.regs.windows[Layer::Backdrop.index()].w1.enabled = true;
        // black inside the colour window, math everywhere
        rig.regs.color_window = crate::ppu::registers::ColorWindowSelect::from_bits(0x80);
        let bg1 = solid(F.build_pixel(20, 3, 10), 11);
        let obj = ObjLine::default();
        rig.run(&LineLayers {
            bgs: [Some(&bg1), None, None, None],
            obj: &obj,
        });
        assert_eq!(F.channels(rig.main[0]), (15, 0, 5));
        // black minus anything clamps to black
        assert_eq!(rig.main[150], 0);
    }

    #[test]
    fn low_obj_palettes_never_blend() {
        let mut rig = Rig::new();
        rig.regs.main_screen = LayerMask::OBJ;
        rig.regs.color_math = ColorMathDesignation::OBJ;
        rig.regs.fixed_colour = (1, 1, 1);
        // BGR555 red 8
        rig.mem.write_cgram(129, 0x0008);
        rig.mem.write_cgram(193, 0x0008);
        let mut obj = ObjLine::default();
        obj.colour[0] = 129;
        obj.colour[1] = 193;
        rig.run(&LineLayers {
            bgs: [None; 4],
            obj: &obj,
        });
        assert_eq!(F.channels(rig.main[0]), (8, 0, 0));
        assert_eq!(F.channels(rig.main[1]), (9, 1, 1));
    }

    #[test]
    fn window_masked_layer_shows_backdrop() {
        let mut rig = Rig::new();
        rig.regs.main_screen = LayerMask::BG1;
        rig.regs.main_window = LayerMask::BG1;
        rig.regs.window_pos[0] = (0, 9);
        rig.regs.windows[Layer::Bg1.index()].w1.enabled = true;
        let bg1 = solid(0x1234, 11);
        let obj = ObjLine::default();
        rig.run(&LineLayers {
            bgs: [Some(&bg1), None, None, None],
            obj: &obj,
        });
        assert_eq!(rig.main_depth[9], BACKDROP_DEPTH);
        assert_eq!(rig.main[10], 0x1234);
    }

    #[test]
    fn clip_to_black_writes_the_black_map_colour() {
        let mut rig = Rig::new();
        rig.tables.black_colour_map = [0x0421; 256];
        rig.regs.main_screen = LayerMask::BG1;
        rig.regs.window_pos[0] = (100, 199);
        rig.regs.windows[Layer::Backdrop.index()].w1.enabled = true;
        rig.regs.color_window = crate::ppu::registers::ColorWindowSelect::from_bits(0x80);
        let bg1 = solid(0x1234, 11);
        let obj = ObjLine::default();
        rig.run(&LineLayers {
            bgs: [Some(&bg1), None, None, None],
            obj: &obj,
        });
        assert_eq!(rig.main[99], 0x1234);
        assert!((100..200).all(|x| rig.main[x] == 0x0421));
        assert_eq!(rig.main[200], 0x1234);

        // the blending path takes the same black
        rig.regs.color_math = ColorMathDesignation::BG1;
        rig.regs.fixed_colour = (0, 0, 0);
        rig.run(&LineLayers {
            bgs: [Some(&bg1), None, None, None],
            obj: &obj,
        });
        assert_eq!(rig.main[150], 0x0421);
    }
}
