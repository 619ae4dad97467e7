use serde::{Deserialize, Serialize};

use crate::error::GfxError;

/// Packed 16-bit output layout. Chosen once when the tables are built and
/// threaded through every blend; never switched per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 0rrrrrgggggbbbbb
    Rgb555,
    /// rrrrrggggggbbbbb, the low green bit mirrors the high one
    Rgb565,
}

impl Default for PixelFormat {
    fn default() -> Self {
        PixelFormat::Rgb565
    }
}

impl TryFrom<u8> for PixelFormat {
    type Error = GfxError;

    /// Select a layout by green channel width.
    fn try_from(green_bits: u8) -> Result<Self, Self::Error> {
        match green_bits {
            5 => Ok(PixelFormat::Rgb555),
            6 => Ok(PixelFormat::Rgb565),
            other => Err(GfxError::UnsupportedPixelFormat(other)),
        }
    }
}

impl PixelFormat {
    #[inline]
    pub const fn green_bits(self) -> u8 {
        match self {
            PixelFormat::Rgb555 => 5,
            PixelFormat::Rgb565 => 6,
        }
    }

    #[inline]
    pub const fn red_shift(self) -> u32 {
        match self {
            PixelFormat::Rgb555 => 10,
            PixelFormat::Rgb565 => 11,
        }
    }

    /// Shift of the 5 significant green bits.
    #[inline]
    pub const fn green_shift(self) -> u32 {
        match self {
            PixelFormat::Rgb555 => 5,
            PixelFormat::Rgb565 => 6,
        }
    }

    #[inline]
    pub const fn red_mask(self) -> u32 {
        0x1F << self.red_shift()
    }

    /// Native green field, including the extra low bit on RGB565.
    #[inline]
    pub const fn green_mask(self) -> u32 {
        match self {
            PixelFormat::Rgb555 => 0x03E0,
            PixelFormat::Rgb565 => 0x07E0,
        }
    }

    #[inline]
    pub const fn blue_mask(self) -> u32 {
        0x001F
    }

    #[inline]
    pub const fn low_bits_mask(self) -> u32 {
        match self {
            PixelFormat::Rgb555 => 0x0421,
            PixelFormat::Rgb565 => 0x0821,
        }
    }

    #[inline]
    pub const fn remove_low_bits_mask(self) -> u32 {
        !self.low_bits_mask() & 0xFFFF & !self.unused_bits()
    }

    #[inline]
    const fn unused_bits(self) -> u32 {
        match self {
            PixelFormat::Rgb555 => 0x8000,
            PixelFormat::Rgb565 => 0,
        }
    }

    #[inline]
    pub const fn hi_bits_mask(self) -> u32 {
        match self {
            PixelFormat::Rgb555 => 0x4210,
            PixelFormat::Rgb565 => 0x8410,
        }
    }

    /// One bit above each channel: the borrow bias for subtractive halving.
    #[inline]
    pub const fn hi_bits_mask_x2(self) -> u32 {
        self.hi_bits_mask() << 1
    }

    /// Marker bit forced on half-add results. Neither layout reserves one.
    #[inline]
    pub const fn alpha_bits_mask(self) -> u32 {
        0
    }

    #[inline]
    pub const fn max_green(self) -> u32 {
        match self {
            PixelFormat::Rgb555 => 31,
            PixelFormat::Rgb565 => 63,
        }
    }

    /// Pack three 5-bit channels.
    #[inline]
    pub const fn build_pixel(self, r: u8, g: u8, b: u8) -> u16 {
        let (r, g, b) = ((r & 0x1F) as u16, (g & 0x1F) as u16, (b & 0x1F) as u16);
        match self {
            PixelFormat::Rgb555 => (r << 10) | (g << 5) | b,
            PixelFormat::Rgb565 => (r << 11) | (g << 6) | ((g & 0x10) << 1) | b,
        }
    }

    /// Pack with green already at native width.
    #[inline]
    pub const fn build_pixel_native(self, r: u32, g: u32, b: u32) -> u32 {
        (r << self.red_shift()) | (g << 5) | b
    }

    /// Split into 5-bit channels.
    #[inline]
    pub const fn channels(self, c: u16) -> (u8, u8, u8) {
        let c = c as u32;
        (
            ((c >> self.red_shift()) & 0x1F) as u8,
            ((c >> self.green_shift()) & 0x1F) as u8,
            (c & 0x1F) as u8,
        )
    }

    /// Convert a CGRAM word (0bbbbbgggggrrrrr) at full brightness.
    #[inline]
    pub const fn from_bgr555(self, bgr: u16) -> u16 {
        self.build_pixel(
            (bgr & 0x1F) as u8,
            ((bgr >> 5) & 0x1F) as u8,
            ((bgr >> 10) & 0x1F) as u8,
        )
    }
}
