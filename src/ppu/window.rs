//! Per-line clip windows.
//!
//! Each layer gets, per screen, the ordered spans of the line where it may
//! draw. Spans also carry the colour window's verdict (math allowed, forced
//! black) so the compositor never has to re-evaluate window state per pixel.

use bitflags::bitflags;

use super::registers::{Layer, LayerMask, LayerWindow, PpuRegisters, WindowLogic};

/// Boundaries {0, w1l, w1r+1, w2l, w2r+1, 256} give at most five segments.
pub const MAX_CLIP_SPANS: usize = 6;
const LINE_END: u16 = 256;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DrawMode: u8 {
        /// Colour math permitted
        const MATH = 0b01;
        /// Main colour forced to black before math
        const BLACK = 0b10;
    }
}

/// Half-open `[left, right)` run of visible pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClipSpan {
    pub left: u16,
    pub right: u16,
    pub mode: DrawMode,
}

impl ClipSpan {
    #[inline]
    pub fn width(&self) -> u16 {
        self.right - self.left
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClipWindowSet {
    spans: [ClipSpan; MAX_CLIP_SPANS],
    count: u8,
}

impl ClipWindowSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn full(mode: DrawMode) -> Self {
        let mut set = Self::default();
        set.push(0, LINE_END, mode);
        set
    }

    /// Append a span, merging with the previous one when contiguous and
    /// sharing a mode.
    fn push(&mut self, left: u16, right: u16, mode: DrawMode) {
        if left >= right {
            return;
        }
        if let Some(last) = self.spans[..self.count as usize].last_mut() {
            if last.right == left && last.mode == mode {
                last.right = right;
                return;
            }
        }
        debug_assert!((self.count as usize) < MAX_CLIP_SPANS);
        if (self.count as usize) < MAX_CLIP_SPANS {
            self.spans[self.count as usize] = ClipSpan { left, right, mode };
            self.count += 1;
        }
    }

    #[inline]
    pub fn spans(&self) -> &[ClipSpan] {
        &self.spans[..self.count as usize]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Total visible pixels.
    pub fn coverage(&self) -> u16 {
        self.spans().iter().map(ClipSpan::width).sum()
    }

    /// Draw mode at `x`, or None when `x` is clipped.
    pub fn mode_at(&self, x: u16) -> Option<DrawMode> {
        self.spans()
            .iter()
            .find(|s| s.left <= x && x < s.right)
            .map(|s| s.mode)
    }
}

/// Window combination rules. Swappable so the truth table can be checked
/// against captured hardware output.
pub trait WindowPolicy {
    fn combine(&self, logic: WindowLogic, a: bool, b: bool) -> bool;

    /// Area covered when neither window is enabled.
    fn disabled_area(&self, cfg: &LayerWindow) -> bool;

    /// Whether a pixel inside (`in1`, `in2`) belongs to the layer's window area.
    fn area(&self, cfg: &LayerWindow, in1: bool, in2: bool) -> bool {
        let a = in1 ^ cfg.w1.inverted;
        let b = in2 ^ cfg.w2.inverted;
        match (cfg.w1.enabled, cfg.w2.enabled) {
            (false, false) => self.disabled_area(cfg),
            (true, false) => a,
            (false, true) => b,
            (true, true) => self.combine(cfg.logic, a, b),
        }
    }
}

/// OR/AND/XOR/XNOR as WBGLOG and WOBJLOG encode them.
#[derive(Debug, Clone, Copy, Default)]
pub struct HardwareWindows;

impl WindowPolicy for HardwareWindows {
    #[inline]
    fn combine(&self, logic: WindowLogic, a: bool, b: bool) -> bool {
        match logic {
            WindowLogic::Or => a | b,
            WindowLogic::And => a & b,
            WindowLogic::Xor => a ^ b,
            WindowLogic::Xnor => !(a ^ b),
        }
    }

    #[inline]
    fn disabled_area(&self, cfg: &LayerWindow) -> bool {
        cfg.w1.inverted || cfg.w2.inverted
    }
}

/// Clip sets for one line: `[screen][layer]`, screen 0 = main, 1 = sub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipWindows {
    pub sets: [[ClipWindowSet; 6]; 2],
}

impl ClipWindows {
    pub const MAIN: usize = 0;
    pub const SUB: usize = 1;

    /// Every layer visible everywhere with math permitted.
    pub fn unclipped() -> Self {
        Self {
            sets: [[ClipWindowSet::full(DrawMode::MATH); 6]; 2],
        }
    }

    #[inline]
    pub fn get(&self, screen: usize, layer: Layer) -> &ClipWindowSet {
        &self.sets[screen][layer.index()]
    }
}

impl Default for ClipWindows {
    fn default() -> Self {
        Self::unclipped()
    }
}

#[inline]
fn inside(pos: (u8, u8), x: u16) -> bool {
    pos.0 as u16 <= x && x <= pos.1 as u16
}

/// Segment boundaries on the line, sorted and deduplicated.
fn boundaries(window_pos: &[(u8, u8); 2]) -> ([u16; 6], usize) {
    let mut pts = [0u16; 6];
    let mut n = 0;
    pts[n] = 0;
    n += 1;
    for &(l, r) in window_pos {
        if l <= r {
            pts[n] = l as u16;
            pts[n + 1] = r as u16 + 1;
            n += 2;
        }
    }
    pts[n] = LINE_END;
    n += 1;
    pts[..n].sort_unstable();
    let mut out = [0u16; 6];
    let mut m = 0;
    for &p in &pts[..n] {
        if m == 0 || out[m - 1] != p {
            out[m] = p;
            m += 1;
        }
    }
    (out, m)
}

/// Compute every layer's visible spans on both screens for the current
/// window registers.
pub fn compute_clip_windows<P: WindowPolicy + ?Sized>(
    regs: &PpuRegisters,
    policy: &P,
) -> ClipWindows {
    let (pts, n) = boundaries(&regs.window_pos);
    let colour_cfg = &regs.windows[Layer::Backdrop.index()];
    let masks: [LayerMask; 2] = [regs.main_window, regs.sub_window];

    let mut out = ClipWindows {
        sets: [[ClipWindowSet::empty(); 6]; 2],
    };

    for seg in pts[..n].windows(2) {
        let (left, right) = (seg[0], seg[1]);
        let in1 = inside(regs.window_pos[0], left);
        let in2 = inside(regs.window_pos[1], left);

        let colour_in = policy.area(colour_cfg, in1, in2);
        let mut mode = DrawMode::empty();
        if regs.color_window.math_region.contains(colour_in) {
            mode |= DrawMode::MATH;
        }
        let black = regs.color_window.clip_to_black.contains(colour_in);

        for (screen, mask) in masks.iter().enumerate() {
            // forced black is a main-screen effect
            let mode = if screen == ClipWindows::MAIN && black {
                mode | DrawMode::BLACK
            } else {
                mode
            };
            for layer in Layer::ALL {
                let masked = mask.intersects(layer.screen_bit())
                    && policy.area(&regs.windows[layer.index()], in1, in2);
                if !masked {
                    out.sets[screen][layer.index()].push(left, right, mode);
                }
            }
        }
    }

    out
}
