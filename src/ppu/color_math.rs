//! Fixed-function colour arithmetic over packed 16-bit pixels.
//!
//! Every routine is total: channels saturate at 31 on add and clamp at 0 on
//! subtract, the same way the hardware's adder does.

use super::pixel_format::PixelFormat;

/// Blend selected from CGADSUB (and master brightness) for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOp {
    Add,
    AddHalf,
    /// Add through `brightness_cap`; used when both operands are already
    /// brightness-scaled.
    AddBrightness,
    Sub,
    SubHalf,
}

impl BlendOp {
    pub fn select(subtract: bool, half: bool, brightness: u8) -> Self {
        match (subtract, half) {
            (false, false) if brightness < 15 => BlendOp::AddBrightness,
            (false, false) => BlendOp::Add,
            (false, true) => BlendOp::AddHalf,
            (true, false) => BlendOp::Sub,
            (true, true) => BlendOp::SubHalf,
        }
    }

    /// Same family without the halving step. The hardware skips halving when
    /// the sub screen only supplied backdrop.
    pub fn full(self) -> Self {
        match self {
            BlendOp::AddHalf => BlendOp::Add,
            BlendOp::SubHalf => BlendOp::Sub,
            other => other,
        }
    }

    pub fn is_half(self) -> bool {
        matches!(self, BlendOp::AddHalf | BlendOp::SubHalf)
    }

    pub fn is_subtract(self) -> bool {
        matches!(self, BlendOp::Sub | BlendOp::SubHalf)
    }
}

/// Saturating add.
#[inline]
pub fn add(format: PixelFormat, c1: u16, c2: u16) -> u16 {
    let (c1, c2) = (c1 as u32, c2 as u32);
    let rs = format.red_shift();
    let gs = format.green_shift();
    let red_blue = (0x1F << rs) | 0x1F;
    let green = 0x1F << gs;

    let rb = (c1 & red_blue) + (c2 & red_blue);
    let rb_carry = rb & ((0x20 << rs) | 0x20);
    let g = (c1 & green) + (c2 & green);
    let saturate = (((g & (0x20 << gs)) | rb_carry) >> 5) * 0x1F;
    let mut out = ((rb & red_blue) | (g & green) | saturate) as u16;
    if format == PixelFormat::Rgb565 {
        out |= (out & 0x0400) >> 5;
    }
    out
}

/// Average of two colours, keeping the low bits both operands share.
#[inline]
pub fn add_half(format: PixelFormat, c1: u16, c2: u16) -> u16 {
    let (c1, c2) = (c1 as u32, c2 as u32);
    let rl = format.remove_low_bits_mask();
    let out = ((((c1 & rl) + (c2 & rl)) >> 1) + (c1 & c2 & format.low_bits_mask()))
        | format.alpha_bits_mask();
    out as u16
}

/// Saturating add through the brightness cap table.
#[inline]
pub fn add_brightness(format: PixelFormat, cap: &[u8; 64], c1: u16, c2: u16) -> u16 {
    let (c1, c2) = (c1 as u32, c2 as u32);
    let rs = format.red_shift();
    let gs = format.green_shift();
    let sum = |shift: u32| cap[(((c1 >> shift) & 0x1F) + ((c2 >> shift) & 0x1F)) as usize] as u32;

    let green = sum(gs);
    let mut out = (sum(rs) << rs) | (green << gs) | sum(0);
    if format == PixelFormat::Rgb565 {
        out |= (green & 0x10) << 1;
    }
    out as u16
}

/// Clamped subtract. A bias bit above each channel absorbs the borrow; if
/// it is consumed the channel went negative and is forced to zero.
#[inline]
pub fn sub(format: PixelFormat, c1: u16, c2: u16) -> u16 {
    let (c1, c2) = (c1 as u32, c2 as u32);
    let rs = format.red_shift();
    let gs = format.green_shift();
    let red_blue = format.red_mask() | format.blue_mask();
    let green = format.green_mask();

    let rb = ((c1 & red_blue) | (0x20 | (0x20 << rs))) - (c2 & red_blue);
    let rb_carry = rb & ((0x20 << rs) | 0x20);
    let g = ((c1 & green) | (0x20 << gs)) - (c2 & green);
    let saturate = (((g & (0x20 << gs)) | rb_carry) >> 5) * 0x1F;
    let mut out = (((rb & red_blue) | (g & green)) & saturate) as u16;
    if format == PixelFormat::Rgb565 {
        out |= (out & 0x0400) >> 5;
    }
    out
}

/// Halved clamped subtract via the frame buffer's zero table.
#[inline]
pub fn sub_half(format: PixelFormat, zero: &[u16], c1: u16, c2: u16) -> u16 {
    let (c1, c2) = (c1 as u32, c2 as u32);
    let idx = ((c1 | format.hi_bits_mask_x2()) - (c2 & format.remove_low_bits_mask())) >> 1;
    zero[idx as usize]
}

/// The blend unit for one frame: format plus the read-only tables it needs.
#[derive(Debug, Clone, Copy)]
pub struct ColorMath<'a> {
    format: PixelFormat,
    brightness_cap: &'a [u8; 64],
    zero: &'a [u16],
}

impl<'a> ColorMath<'a> {
    pub fn new(format: PixelFormat, brightness_cap: &'a [u8; 64], zero: &'a [u16]) -> Self {
        debug_assert_eq!(zero.len(), 0x10000);
        Self {
            format,
            brightness_cap,
            zero,
        }
    }

    #[inline]
    pub fn blend(&self, op: BlendOp, c1: u16, c2: u16) -> u16 {
        match op {
            BlendOp::Add => add(self.format, c1, c2),
            BlendOp::AddHalf => add_half(self.format, c1, c2),
            BlendOp::AddBrightness => add_brightness(self.format, self.brightness_cap, c1, c2),
            BlendOp::Sub => sub(self.format, c1, c2),
            BlendOp::SubHalf => sub_half(self.format, self.zero, c1, c2),
        }
    }
}
