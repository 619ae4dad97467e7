use serde::{Deserialize, Serialize};

pub const VRAM_SIZE: usize = 0x10000;
pub const CGRAM_COLOURS: usize = 256;
/// 512-byte low table plus the 32-byte high table
pub const OAM_SIZE: usize = 544;
pub const SPRITE_COUNT: usize = 128;

/// One OAM entry, decoded from the low and high tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpriteAttr {
    /// 9-bit X, sign-extended: 256..511 become -256..-1
    pub x: i16,
    pub y: u8,
    /// Character number including the name-select bit
    pub tile: u16,
    pub palette: u8,
    pub priority: u8,
    pub flip_x: bool,
    pub flip_y: bool,
    pub large: bool,
}

/// VRAM, CGRAM and OAM as seen by the renderer.
///
/// VRAM is only reachable through methods so every write bumps
/// `vram_generation`; decoders holding tiles compare it before reuse.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct VideoMemory {
    vram: Vec<u8>,
    /// BGR555 words
    pub cgram: Vec<u16>,
    pub oam: Vec<u8>,
    #[serde(skip)]
    vram_generation: u64,
}

impl PartialEq for VideoMemory {
    fn eq(&self, other: &Self) -> bool {
        self.vram == other.vram && self.cgram == other.cgram && self.oam == other.oam
    }
}

impl Default for VideoMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoMemory {
    pub fn new() -> Self {
        Self {
            vram: vec![0; VRAM_SIZE],
            cgram: vec![0; CGRAM_COLOURS],
            oam: vec![0; OAM_SIZE],
            vram_generation: 0,
        }
    }

    #[inline]
    pub fn vram(&self) -> &[u8] {
        &self.vram
    }

    /// Raw VRAM for bulk edits. Counts as a write even if nothing changes.
    pub fn vram_mut(&mut self) -> &mut [u8] {
        self.vram_generation = self.vram_generation.wrapping_add(1);
        &mut self.vram
    }

    /// Changes whenever VRAM may have been written.
    #[inline]
    pub fn vram_generation(&self) -> u64 {
        self.vram_generation
    }

    /// Word-addressed read, little endian, wrapping at 64 KiB.
    #[inline]
    pub fn vram_word(&self, word_addr: u16) -> u16 {
        let i = (word_addr as usize & 0x7FFF) << 1;
        u16::from_le_bytes([self.vram[i], self.vram[i + 1]])
    }

    pub fn write_vram_word(&mut self, word_addr: u16, value: u16) {
        let i = (word_addr as usize & 0x7FFF) << 1;
        self.vram_mut()[i..i + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Copy a block starting at a word address, e.g. a tile or tilemap.
    pub fn load_vram(&mut self, word_addr: u16, bytes: &[u8]) {
        let start = (word_addr as usize & 0x7FFF) << 1;
        let vram = self.vram_mut();
        for (i, &b) in bytes.iter().enumerate() {
            vram[(start + i) & (VRAM_SIZE - 1)] = b;
        }
    }

    #[inline]
    pub fn cgram_colour(&self, index: u8) -> u16 {
        self.cgram[index as usize]
    }

    pub fn write_cgram(&mut self, index: u8, bgr: u16) {
        self.cgram[index as usize] = bgr & 0x7FFF;
    }

    /// Raw OAM byte write; addresses past the high table are dropped.
    pub fn write_oam(&mut self, addr: usize, value: u8) {
        if let Some(b) = self.oam.get_mut(addr) {
            *b = value;
        }
    }

    /// Set a sprite's low-table entry and its two high-table bits together.
    pub fn set_sprite(&mut self, index: usize, attr: &SpriteAttr) {
        let index = index & (SPRITE_COUNT - 1);
        let base = index * 4;
        let x = attr.x as u16 & 0x1FF;
        self.oam[base] = x as u8;
        self.oam[base + 1] = attr.y;
        self.oam[base + 2] = attr.tile as u8;
        self.oam[base + 3] = ((attr.tile >> 8) & 0x01) as u8
            | ((attr.palette & 0x07) << 1)
            | ((attr.priority & 0x03) << 4)
            | if attr.flip_x { 0x40 } else { 0 }
            | if attr.flip_y { 0x80 } else { 0 };

        let hi = 0x200 + index / 4;
        let shift = (index % 4) * 2;
        let bits = ((x >> 8) as u8) | if attr.large { 0x02 } else { 0 };
        self.oam[hi] = (self.oam[hi] & !(0x03 << shift)) | (bits << shift);
    }

    pub fn sprite(&self, index: usize) -> SpriteAttr {
        let index = index & (SPRITE_COUNT - 1);
        let base = index * 4;
        let attr = self.oam[base + 3];
        let high = (self.oam[0x200 + index / 4] >> ((index % 4) * 2)) & 0x03;

        let x9 = self.oam[base] as u16 | ((high as u16 & 0x01) << 8);
        SpriteAttr {
            x: ((x9 << 7) as i16) >> 7,
            y: self.oam[base + 1],
            tile: self.oam[base + 2] as u16 | ((attr as u16 & 0x01) << 8),
            palette: (attr >> 1) & 0x07,
            priority: (attr >> 4) & 0x03,
            flip_x: attr & 0x40 != 0,
            flip_y: attr & 0x80 != 0,
            large: high & 0x02 != 0,
        }
    }
}
