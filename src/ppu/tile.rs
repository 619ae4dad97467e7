//! Planar tile decoding.
//!
//! A tile row stores bitplanes in pairs: row `r` of plane pair `p` sits at
//! byte `r * 2 + p * 16`. Decoding spreads each plane byte across eight
//! pixel lanes of a u64 with one of two lookup tables, so a row is a handful
//! of ORs regardless of depth.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitDepth {
    Bpp2 = 2,
    Bpp4 = 4,
    Bpp8 = 8,
}

impl BitDepth {
    #[inline]
    pub fn planes(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn bytes_per_tile(self) -> usize {
        self.planes() * 8
    }

    /// Colours per palette; also the CGRAM stride between palettes.
    #[inline]
    pub fn palette_size(self) -> usize {
        1 << self.planes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Plain = 0,
    Flipped = 1,
}

impl Orientation {
    #[inline]
    pub fn from_flip(flip_x: bool) -> Self {
        if flip_x {
            Orientation::Flipped
        } else {
            Orientation::Plain
        }
    }
}

/// Bit 7 of the plane byte lands in lane 0 (leftmost pixel).
const fn build_plain_lut() -> [u64; 256] {
    let mut lut = [0u64; 256];
    let mut v = 0;
    while v < 256 {
        let mut bit = 0;
        let mut out = 0u64;
        while bit < 8 {
            if v & (0x80 >> bit) != 0 {
                out |= 1u64 << (bit * 8);
            }
            bit += 1;
        }
        lut[v] = out;
        v += 1;
    }
    lut
}

/// Bit 0 of the plane byte lands in lane 0.
const fn build_flip_lut() -> [u64; 256] {
    let mut lut = [0u64; 256];
    let mut v = 0;
    while v < 256 {
        let mut bit = 0;
        let mut out = 0u64;
        while bit < 8 {
            if v & (1 << bit) != 0 {
                out |= 1u64 << (bit * 8);
            }
            bit += 1;
        }
        lut[v] = out;
        v += 1;
    }
    lut
}

static PLAIN_LUT: [u64; 256] = build_plain_lut();
static FLIP_LUT: [u64; 256] = build_flip_lut();

/// Decode one 8-pixel row. `tile` must hold a full tile at `depth`.
#[inline]
pub fn decode_row(tile: &[u8], depth: BitDepth, orientation: Orientation, row: usize) -> [u8; 8] {
    let lut = match orientation {
        Orientation::Plain => &PLAIN_LUT,
        Orientation::Flipped => &FLIP_LUT,
    };
    let mut acc = 0u64;
    for pair in 0..depth.planes() / 2 {
        let o = row * 2 + pair * 16;
        acc |= lut[tile[o] as usize] << (pair * 2);
        acc |= lut[tile[o + 1] as usize] << (pair * 2 + 1);
    }
    acc.to_le_bytes()
}

/// Decode a whole tile to palette indices, row-major. Index 0 is transparent.
pub fn decode_tile(tile: &[u8], depth: BitDepth, orientation: Orientation) -> [u8; 64] {
    let mut out = [0u8; 64];
    for (row, chunk) in out.chunks_exact_mut(8).enumerate() {
        chunk.copy_from_slice(&decode_row(tile, depth, orientation, row));
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileState {
    #[default]
    NotDecoded,
    Blank,
    Opaque,
}

/// Decoded tiles at one bit depth, both orientations.
#[derive(Debug, Clone)]
pub struct TileCache {
    depth: BitDepth,
    pixels: [Vec<[u8; 64]>; 2],
    state: [Vec<TileState>; 2],
    hits: u64,
    decodes: u64,
}

impl TileCache {
    pub fn new(depth: BitDepth) -> Self {
        let n = Self::tile_count(depth);
        Self {
            depth,
            pixels: [vec![[0; 64]; n], vec![[0; 64]; n]],
            state: [vec![TileState::NotDecoded; n], vec![TileState::NotDecoded; n]],
            hits: 0,
            decodes: 0,
        }
    }

    #[inline]
    fn tile_count(depth: BitDepth) -> usize {
        0x10000 / depth.bytes_per_tile()
    }

    #[inline]
    pub fn depth(&self) -> BitDepth {
        self.depth
    }

    /// Forget every decode; VRAM may have changed.
    pub fn invalidate(&mut self) {
        for s in &mut self.state {
            s.fill(TileState::NotDecoded);
        }
    }

    pub fn state(&self, byte_addr: usize, orientation: Orientation) -> TileState {
        let idx = (byte_addr & 0xFFFF) / self.depth.bytes_per_tile();
        self.state[orientation as usize][idx]
    }

    /// Pixels of the tile at `byte_addr`, or None if every pixel is transparent.
    pub fn get(
        &mut self,
        vram: &[u8],
        byte_addr: usize,
        orientation: Orientation,
    ) -> Option<&[u8; 64]> {
        let bpt = self.depth.bytes_per_tile();
        let idx = (byte_addr & 0xFFFF) / bpt;
        let o = orientation as usize;
        if self.state[o][idx] == TileState::NotDecoded {
            let start = idx * bpt;
            let px = decode_tile(&vram[start..start + bpt], self.depth, orientation);
            self.state[o][idx] = if px.iter().all(|&p| p == 0) {
                TileState::Blank
            } else {
                TileState::Opaque
            };
            self.pixels[o][idx] = px;
            self.decodes += 1;
        } else {
            self.hits += 1;
        }
        match self.state[o][idx] {
            TileState::Opaque => Some(&self.pixels[o][idx]),
            _ => None,
        }
    }

    /// (hits, decodes) since the last call.
    pub fn take_stats(&mut self) -> (u64, u64) {
        let s = (self.hits, self.decodes);
        self.hits = 0;
        self.decodes = 0;
        s
    }
}
