use super::frame_buffer::OVERSCAN_HEIGHT;
use super::registers::{Mode7Registers, PpuRegisters};

/// BG scroll offsets in effect when a line was rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineData {
    /// (hofs, vofs) per BG
    pub offsets: [(u16, u16); 4],
}

impl From<&PpuRegisters> for LineData {
    fn from(regs: &PpuRegisters) -> Self {
        let mut offsets = [(0, 0); 4];
        for (slot, bg) in offsets.iter_mut().zip(regs.bg.iter()) {
            *slot = (bg.hofs, bg.vofs);
        }
        Self { offsets }
    }
}

/// Mode 7 matrix state in effect when a line was rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineMatrixData {
    pub a: i16,
    pub b: i16,
    pub c: i16,
    pub d: i16,
    pub centre_x: i16,
    pub centre_y: i16,
    pub hofs: i16,
    pub vofs: i16,
}

impl From<&Mode7Registers> for LineMatrixData {
    fn from(m7: &Mode7Registers) -> Self {
        Self {
            a: m7.matrix_a,
            b: m7.matrix_b,
            c: m7.matrix_c,
            d: m7.matrix_d,
            centre_x: m7.centre_x,
            centre_y: m7.centre_y,
            hofs: m7.hofs,
            vofs: m7.vofs,
        }
    }
}

/// Per-line register history for the current frame. The BG and Mode 7
/// renderers draw from the entry recorded for their line, not from the live
/// registers. Entries are only meaningful for lines rendered since the last
/// `reset`.
#[derive(Debug, Clone)]
pub struct LineHistory {
    scroll: Vec<LineData>,
    matrix: Vec<LineMatrixData>,
    rendered: Vec<bool>,
}

impl Default for LineHistory {
    fn default() -> Self {
        Self {
            scroll: vec![LineData::default(); OVERSCAN_HEIGHT],
            matrix: vec![LineMatrixData::default(); OVERSCAN_HEIGHT],
            rendered: vec![false; OVERSCAN_HEIGHT],
        }
    }
}

impl LineHistory {
    pub fn reset(&mut self) {
        self.rendered.fill(false);
    }

    /// Latch the scroll and matrix registers for `line` and hand them back.
    pub fn record(&mut self, line: u16, regs: &PpuRegisters) -> (LineData, LineMatrixData) {
        let scroll = LineData::from(regs);
        let matrix = LineMatrixData::from(&regs.mode7);
        let l = line as usize;
        if l < self.rendered.len() {
            self.scroll[l] = scroll;
            self.matrix[l] = matrix;
            self.rendered[l] = true;
        }
        (scroll, matrix)
    }

    pub fn scroll(&self, line: u16) -> Option<&LineData> {
        let l = line as usize;
        self.rendered.get(l).copied().unwrap_or(false).then(|| &self.scroll[l])
    }

    pub fn matrix(&self, line: u16) -> Option<&LineMatrixData> {
        let l = line as usize;
        self.rendered.get(l).copied().unwrap_or(false).then(|| &self.matrix[l])
    }
}
