use log::info;

use super::pixel_format::PixelFormat;
use super::tables::build_zero_table;
use crate::error::{try_alloc, Result};

pub const MAX_WIDTH: usize = 512;
pub const MAX_HEIGHT: usize = 478;
pub const SCREEN_WIDTH: usize = 256;
pub const NORMAL_HEIGHT: usize = 224;
pub const OVERSCAN_HEIGHT: usize = 239;

/// Mutable views of one buffer row across every plane.
pub struct RowPlanes<'a> {
    pub main: &'a mut [u16],
    pub sub: &'a mut [u16],
    pub main_depth: &'a mut [u8],
    pub sub_depth: &'a mut [u8],
    pub zero: &'a [u16],
}

/// Main/sub pixel planes with their depth planes.
///
/// Rows are `MAX_WIDTH` apart; only the first `SCREEN_WIDTH` columns of a row
/// are written. Interlaced frames store the two fields on alternate rows.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    format: PixelFormat,
    pub(crate) main: Vec<u16>,
    pub(crate) sub: Vec<u16>,
    pub(crate) main_depth: Vec<u8>,
    pub(crate) sub_depth: Vec<u8>,
    pub(crate) zero: Vec<u16>,
    /// Visible lines (224 or 239)
    lines: usize,
    interlace: bool,
    pub start_y: usize,
    pub end_y: usize,
}

impl FrameBuffer {
    pub fn new(format: PixelFormat) -> Result<Self> {
        let len = MAX_WIDTH * MAX_HEIGHT;
        let fb = Self {
            format,
            main: try_alloc("main plane", len, 0u16)?,
            sub: try_alloc("sub plane", len, 0u16)?,
            main_depth: try_alloc("main depth", len, 0u8)?,
            sub_depth: try_alloc("sub depth", len, 0u8)?,
            zero: build_zero_table(format)?,
            lines: NORMAL_HEIGHT,
            interlace: false,
            start_y: 0,
            end_y: NORMAL_HEIGHT,
        };
        info!(
            "frame buffer allocated: {}x{} {:?}",
            MAX_WIDTH, MAX_HEIGHT, format
        );
        Ok(fb)
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Switch output layout; the planes are cleared and the subtract
    /// lookup rebuilt.
    pub fn set_format(&mut self, format: PixelFormat) -> Result<()> {
        if format != self.format {
            self.zero = build_zero_table(format)?;
            self.format = format;
            self.clear();
        }
        Ok(())
    }

    #[inline]
    pub fn lines(&self) -> usize {
        self.lines
    }

    #[inline]
    pub fn interlace(&self) -> bool {
        self.interlace
    }

    /// Output rows, counting both fields when interlaced.
    #[inline]
    pub fn height(&self) -> usize {
        if self.interlace {
            self.lines * 2
        } else {
            self.lines
        }
    }

    /// Returns true if the geometry changed.
    pub fn resize(&mut self, overscan: bool, interlace: bool) -> bool {
        let lines = if overscan {
            OVERSCAN_HEIGHT
        } else {
            NORMAL_HEIGHT
        };
        if lines == self.lines && interlace == self.interlace {
            return false;
        }
        self.lines = lines;
        self.interlace = interlace;
        self.start_y = 0;
        self.end_y = lines;
        self.clear();
        info!(
            "screen resized: {}x{}{}",
            SCREEN_WIDTH,
            self.height(),
            if interlace { " interlaced" } else { "" }
        );
        true
    }

    pub fn clear(&mut self) {
        self.main.fill(0);
        self.sub.fill(0);
        self.main_depth.fill(0);
        self.sub_depth.fill(0);
    }

    /// Buffer row that holds `line` for the given field.
    #[inline]
    pub fn row_for_line(&self, line: usize, odd_field: bool) -> usize {
        if self.interlace {
            line * 2 + odd_field as usize
        } else {
            line
        }
    }

    #[inline]
    pub(crate) fn row_offset(row: usize) -> usize {
        row * MAX_WIDTH
    }

    pub fn row_planes(&mut self, row: usize) -> RowPlanes<'_> {
        let r = Self::row_offset(row)..Self::row_offset(row) + SCREEN_WIDTH;
        RowPlanes {
            main: &mut self.main[r.clone()],
            sub: &mut self.sub[r.clone()],
            main_depth: &mut self.main_depth[r.clone()],
            sub_depth: &mut self.sub_depth[r],
            zero: &self.zero,
        }
    }

    pub fn main_row(&self, row: usize) -> &[u16] {
        let o = Self::row_offset(row);
        &self.main[o..o + SCREEN_WIDTH]
    }

    pub fn sub_row(&self, row: usize) -> &[u16] {
        let o = Self::row_offset(row);
        &self.sub[o..o + SCREEN_WIDTH]
    }

    pub fn main_depth_row(&self, row: usize) -> &[u8] {
        let o = Self::row_offset(row);
        &self.main_depth[o..o + SCREEN_WIDTH]
    }

    /// Finished picture, top to bottom.
    pub fn main_rows(&self) -> impl Iterator<Item = &[u16]> + '_ {
        (0..self.height()).map(move |row| self.main_row(row))
    }

    /// FNV-1a over the visible main plane. Used to compare replays.
    pub fn checksum(&self) -> u64 {
        let mut h: u64 = 0xcbf29ce484222325;
        for row in self.main_rows() {
            for &px in row {
                for b in px.to_le_bytes() {
                    h ^= b as u64;
                    h = h.wrapping_mul(0x100000001b3);
                }
            }
        }
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_tracks_overscan_and_interlace() {
        let mut fb = FrameBuffer::new(PixelFormat::Rgb565).unwrap();
        assert_eq!(fb.height(), 224);
        assert!(!fb.resize(false, false));
        assert!(fb.resize(true, false));
        assert_eq!(fb.height(), 239);
        assert_eq!(fb.end_y, 239);
        assert!(fb.resize(true, true));
        assert_eq!(fb.height(), 478);
        assert_eq!(fb.main_rows().count(), 478);
    }

    #[test]
    fn interlace_fields_use_alternate_rows() {
        let mut fb = FrameBuffer::new(PixelFormat::Rgb555).unwrap();
        assert_eq!(fb.row_for_line(10, true), 10);
        fb.resize(false, true);
        assert_eq!(fb.row_for_line(10, false), 20);
        assert_eq!(fb.row_for_line(10, true), 21);
    }

    #[test]
    fn checksum_changes_with_content() {
        let mut fb = FrameBuffer::new(PixelFormat::Rgb555).unwrap();
        let before = fb.checksum();
        fb.main[FrameBuffer::row_offset(5) + 7] = 0x1234;
        assert_ne!(fb.checksum(), before);
        assert_eq!(fb.main_row(5)[7], 0x1234);
    }
}
