use bitflags::bitflags;
use log::trace;
use serde::{Deserialize, Serialize};

bitflags! {
    /// TM/TS/TMW/TSW layer bits ($212C-$212F)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct LayerMask: u8 {
        const BG1 = 0b00000001;
        const BG2 = 0b00000010;
        const BG3 = 0b00000100;
        const BG4 = 0b00001000;
        const OBJ = 0b00010000;
    }
}

bitflags! {
    /// CGADSUB ($2131)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ColorMathDesignation: u8 {
        const BG1 = 0b00000001;
        const BG2 = 0b00000010;
        const BG3 = 0b00000100;
        const BG4 = 0b00001000;
        const OBJ = 0b00010000;
        const BACKDROP = 0b00100000;
        const HALF = 0b01000000;
        const SUBTRACT = 0b10000000;
    }
}

bitflags! {
    /// SETINI ($2133)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ScreenInit: u8 {
        const SCREEN_INTERLACE = 0b00000001;
        const OBJ_INTERLACE = 0b00000010;
        const OVERSCAN = 0b00000100;
        const PSEUDO_HIRES = 0b00001000;
        const EXTBG = 0b01000000;
        const EXTERNAL_SYNC = 0b10000000;
    }
}

/// Compositing layers, in clip-set order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layer {
    Bg1 = 0,
    Bg2 = 1,
    Bg3 = 2,
    Bg4 = 3,
    Obj = 4,
    Backdrop = 5,
}

impl Layer {
    pub const ALL: [Layer; 6] = [
        Layer::Bg1,
        Layer::Bg2,
        Layer::Bg3,
        Layer::Bg4,
        Layer::Obj,
        Layer::Backdrop,
    ];

    pub const BGS: [Layer; 4] = [Layer::Bg1, Layer::Bg2, Layer::Bg3, Layer::Bg4];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Screen/window designation bit; the backdrop has none.
    pub fn screen_bit(self) -> LayerMask {
        match self {
            Layer::Bg1 => LayerMask::BG1,
            Layer::Bg2 => LayerMask::BG2,
            Layer::Bg3 => LayerMask::BG3,
            Layer::Bg4 => LayerMask::BG4,
            Layer::Obj => LayerMask::OBJ,
            Layer::Backdrop => LayerMask::empty(),
        }
    }

    pub fn math_bit(self) -> ColorMathDesignation {
        match self {
            Layer::Bg1 => ColorMathDesignation::BG1,
            Layer::Bg2 => ColorMathDesignation::BG2,
            Layer::Bg3 => ColorMathDesignation::BG3,
            Layer::Bg4 => ColorMathDesignation::BG4,
            Layer::Obj => ColorMathDesignation::OBJ,
            Layer::Backdrop => ColorMathDesignation::BACKDROP,
        }
    }
}

/// How the two windows combine when both are enabled (WBGLOG/WOBJLOG).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindowLogic {
    #[default]
    Or,
    And,
    Xor,
    Xnor,
}

impl WindowLogic {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => WindowLogic::Or,
            1 => WindowLogic::And,
            2 => WindowLogic::Xor,
            _ => WindowLogic::Xnor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WindowSel {
    pub enabled: bool,
    pub inverted: bool,
}

/// Per-layer window configuration: W12SEL/W34SEL/WOBJSEL nibble plus logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LayerWindow {
    pub w1: WindowSel,
    pub w2: WindowSel,
    pub logic: WindowLogic,
}

impl LayerWindow {
    fn set_select(&mut self, nibble: u8) {
        self.w1 = WindowSel {
            inverted: nibble & 0x01 != 0,
            enabled: nibble & 0x02 != 0,
        };
        self.w2 = WindowSel {
            inverted: nibble & 0x04 != 0,
            enabled: nibble & 0x08 != 0,
        };
    }
}

/// Where on the line a CGWSEL region applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowRegion {
    Nowhere,
    OutsideWindow,
    InsideWindow,
    Everywhere,
}

impl WindowRegion {
    #[inline]
    pub fn contains(self, in_window: bool) -> bool {
        match self {
            WindowRegion::Nowhere => false,
            WindowRegion::OutsideWindow => !in_window,
            WindowRegion::InsideWindow => in_window,
            WindowRegion::Everywhere => true,
        }
    }
}

/// CGWSEL ($2130)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorWindowSelect {
    /// Main screen forced to black
    pub clip_to_black: WindowRegion,
    /// Colour math permitted
    pub math_region: WindowRegion,
    /// Blend with the sub screen instead of the fixed colour
    pub sub_screen_source: bool,
    pub direct_colour: bool,
}

impl Default for ColorWindowSelect {
    fn default() -> Self {
        Self::from_bits(0)
    }
}

impl ColorWindowSelect {
    pub fn from_bits(value: u8) -> Self {
        let clip_to_black = match (value >> 6) & 0x03 {
            0 => WindowRegion::Nowhere,
            1 => WindowRegion::OutsideWindow,
            2 => WindowRegion::InsideWindow,
            _ => WindowRegion::Everywhere,
        };
        let math_region = match (value >> 4) & 0x03 {
            0 => WindowRegion::Everywhere,
            1 => WindowRegion::InsideWindow,
            2 => WindowRegion::OutsideWindow,
            _ => WindowRegion::Nowhere,
        };
        Self {
            clip_to_black,
            math_region,
            sub_screen_source: value & 0x02 != 0,
            direct_colour: value & 0x01 != 0,
        }
    }
}

/// Mode 7 area outside the 1024x1024 playfield (M7SEL bits 7-6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScreenOver {
    #[default]
    Wrap,
    Transparent,
    Tile0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BgRegisters {
    /// Tilemap base, word address
    pub sc_base: u16,
    /// 0=32x32, 1=64x32, 2=32x64, 3=64x64
    pub sc_size: u8,
    /// Character base, word address
    pub name_base: u16,
    pub hofs: u16,
    pub vofs: u16,
    pub tile_16: bool,
    pub mosaic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObjRegisters {
    /// OBSEL size pair, 0..=7
    pub size_select: u8,
    /// Word address of the first name table
    pub name_base: u16,
    /// Word gap between the first and second name tables
    pub name_select: u16,
    pub priority_rotation: bool,
    /// Word address written through OAMADD
    pub oam_addr: u16,
}

impl ObjRegisters {
    /// Sprite that wins evaluation order for the frame.
    pub fn first_sprite(&self) -> u8 {
        if self.priority_rotation {
            ((self.oam_addr & 0xFE) >> 1) as u8
        } else {
            0
        }
    }

    /// (small, large) sizes in pixels as (width, height).
    pub fn sizes(&self) -> [(u16, u16); 2] {
        match self.size_select & 0x07 {
            0 => [(8, 8), (16, 16)],
            1 => [(8, 8), (32, 32)],
            2 => [(8, 8), (64, 64)],
            3 => [(16, 16), (32, 32)],
            4 => [(16, 16), (64, 64)],
            5 => [(32, 32), (64, 64)],
            6 => [(16, 32), (32, 64)],
            _ => [(16, 32), (32, 32)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mode7Registers {
    pub matrix_a: i16,
    pub matrix_b: i16,
    pub matrix_c: i16,
    pub matrix_d: i16,
    pub centre_x: i16,
    pub centre_y: i16,
    pub hofs: i16,
    pub vofs: i16,
    pub hflip: bool,
    pub vflip: bool,
    pub screen_over: ScreenOver,
}

impl Default for Mode7Registers {
    fn default() -> Self {
        Self {
            matrix_a: 0x0100,
            matrix_b: 0,
            matrix_c: 0,
            matrix_d: 0x0100,
            centre_x: 0,
            centre_y: 0,
            hofs: 0,
            vofs: 0,
            hflip: false,
            vflip: false,
            screen_over: ScreenOver::Wrap,
        }
    }
}

/// Display-affecting PPU register state, as committed by the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PpuRegisters {
    pub forced_blank: bool,
    pub brightness: u8,

    pub bg_mode: u8,
    pub bg3_priority: bool,
    pub bg: [BgRegisters; 4],
    /// 1..=16
    pub mosaic_size: u8,

    pub obj: ObjRegisters,
    pub mode7: Mode7Registers,

    /// Inclusive (left, right) for window 1 and 2
    pub window_pos: [(u8, u8); 2],
    pub windows: [LayerWindow; 6],

    pub main_screen: LayerMask,
    pub sub_screen: LayerMask,
    pub main_window: LayerMask,
    pub sub_window: LayerMask,

    pub color_window: ColorWindowSelect,
    pub color_math: ColorMathDesignation,
    /// COLDATA 5-bit (r, g, b)
    pub fixed_colour: (u8, u8, u8),

    pub setini: ScreenInit,
    /// Odd field of an interlaced frame
    pub interlace_field: bool,

    // Write-twice latches
    bg_ofs_latch: u8,
    bg_hofs_raw: [u16; 4],
    m7_latch: u8,
}

impl Default for PpuRegisters {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn sign_extend_13(v: u16) -> i16 {
    ((v << 3) as i16) >> 3
}

impl PpuRegisters {
    pub fn new() -> Self {
        Self {
            forced_blank: true,
            brightness: 0,
            bg_mode: 0,
            bg3_priority: false,
            bg: [BgRegisters::default(); 4],
            mosaic_size: 1,
            obj: ObjRegisters::default(),
            mode7: Mode7Registers::default(),
            window_pos: [(1, 0); 2],
            windows: [LayerWindow::default(); 6],
            main_screen: LayerMask::empty(),
            sub_screen: LayerMask::empty(),
            main_window: LayerMask::empty(),
            sub_window: LayerMask::empty(),
            color_window: ColorWindowSelect::default(),
            color_math: ColorMathDesignation::empty(),
            fixed_colour: (0, 0, 0),
            setini: ScreenInit::empty(),
            interlace_field: false,
            bg_ofs_latch: 0,
            bg_hofs_raw: [0; 4],
            m7_latch: 0,
        }
    }

    /// 239-line display
    #[inline]
    pub fn overscan(&self) -> bool {
        self.setini.contains(ScreenInit::OVERSCAN)
    }

    #[inline]
    pub fn interlace(&self) -> bool {
        self.setini.contains(ScreenInit::SCREEN_INTERLACE)
    }

    /// BG field stepping only applies to the hi-res modes.
    #[inline]
    pub fn bg_interlace(&self) -> bool {
        self.interlace() && matches!(self.bg_mode, 5 | 6)
    }

    #[inline]
    pub fn extbg(&self) -> bool {
        self.setini.contains(ScreenInit::EXTBG)
    }

    /// Decode a write to one of the display registers at $2100-$2133.
    /// VRAM/CGRAM/OAM data ports belong to [`super::memory::VideoMemory`].
    pub fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0x2100 => {
                self.forced_blank = value & 0x80 != 0;
                self.brightness = value & 0x0F;
            }
            0x2101 => {
                self.obj.size_select = value >> 5;
                self.obj.name_base = ((value & 0x07) as u16) << 13;
                self.obj.name_select = (((value >> 3) & 0x03) as u16 + 1) << 12;
            }
            0x2102 => {
                self.obj.oam_addr = (self.obj.oam_addr & 0x100) | value as u16;
            }
            0x2103 => {
                self.obj.oam_addr = (self.obj.oam_addr & 0xFF) | (((value & 0x01) as u16) << 8);
                self.obj.priority_rotation = value & 0x80 != 0;
            }
            0x2105 => {
                self.bg_mode = value & 0x07;
                self.bg3_priority = value & 0x08 != 0;
                for (i, bg) in self.bg.iter_mut().enumerate() {
                    bg.tile_16 = value & (0x10 << i) != 0;
                }
            }
            0x2106 => {
                self.mosaic_size = (value >> 4) + 1;
                for (i, bg) in self.bg.iter_mut().enumerate() {
                    bg.mosaic = value & (1 << i) != 0;
                }
            }
            0x2107..=0x210A => {
                let bg = &mut self.bg[(addr - 0x2107) as usize];
                bg.sc_base = ((value & 0xFC) as u16) << 8;
                bg.sc_size = value & 0x03;
            }
            0x210B => {
                self.bg[0].name_base = ((value & 0x0F) as u16) << 12;
                self.bg[1].name_base = ((value >> 4) as u16) << 12;
            }
            0x210C => {
                self.bg[2].name_base = ((value & 0x0F) as u16) << 12;
                self.bg[3].name_base = ((value >> 4) as u16) << 12;
            }
            0x210D..=0x2114 => {
                let idx = ((addr - 0x210D) / 2) as usize;
                let horizontal = (addr - 0x210D) % 2 == 0;
                if addr == 0x210D {
                    self.mode7.hofs = sign_extend_13(((value as u16) << 8) | self.m7_latch as u16);
                    self.m7_latch = value;
                } else if addr == 0x210E {
                    self.mode7.vofs = sign_extend_13(((value as u16) << 8) | self.m7_latch as u16);
                    self.m7_latch = value;
                }
                let bg = &mut self.bg[idx];
                if horizontal {
                    let raw = &mut self.bg_hofs_raw[idx];
                    *raw = ((value as u16) << 8) | (self.bg_ofs_latch & !7) as u16 | ((*raw >> 8) & 7);
                    bg.hofs = *raw & 0x3FF;
                    self.bg_ofs_latch = value;
                } else {
                    bg.vofs = (((value as u16) << 8) | self.bg_ofs_latch as u16) & 0x3FF;
                    self.bg_ofs_latch = value;
                }
            }
            0x211A => {
                self.mode7.hflip = value & 0x01 != 0;
                self.mode7.vflip = value & 0x02 != 0;
                self.mode7.screen_over = match value >> 6 {
                    2 => ScreenOver::Transparent,
                    3 => ScreenOver::Tile0,
                    _ => ScreenOver::Wrap,
                };
            }
            0x211B..=0x2120 => {
                let word = ((value as u16) << 8) | self.m7_latch as u16;
                self.m7_latch = value;
                match addr {
                    0x211B => self.mode7.matrix_a = word as i16,
                    0x211C => self.mode7.matrix_b = word as i16,
                    0x211D => self.mode7.matrix_c = word as i16,
                    0x211E => self.mode7.matrix_d = word as i16,
                    0x211F => self.mode7.centre_x = sign_extend_13(word),
                    _ => self.mode7.centre_y = sign_extend_13(word),
                }
            }
            0x2123 => {
                self.windows[Layer::Bg1.index()].set_select(value & 0x0F);
                self.windows[Layer::Bg2.index()].set_select(value >> 4);
            }
            0x2124 => {
                self.windows[Layer::Bg3.index()].set_select(value & 0x0F);
                self.windows[Layer::Bg4.index()].set_select(value >> 4);
            }
            0x2125 => {
                self.windows[Layer::Obj.index()].set_select(value & 0x0F);
                self.windows[Layer::Backdrop.index()].set_select(value >> 4);
            }
            0x2126 => self.window_pos[0].0 = value,
            0x2127 => self.window_pos[0].1 = value,
            0x2128 => self.window_pos[1].0 = value,
            0x2129 => self.window_pos[1].1 = value,
            0x212A => {
                for (i, w) in self.windows[..4].iter_mut().enumerate() {
                    w.logic = WindowLogic::from_bits(value >> (i * 2));
                }
            }
            0x212B => {
                self.windows[Layer::Obj.index()].logic = WindowLogic::from_bits(value);
                self.windows[Layer::Backdrop.index()].logic = WindowLogic::from_bits(value >> 2);
            }
            0x212C => self.main_screen = LayerMask::from_bits_truncate(value),
            0x212D => self.sub_screen = LayerMask::from_bits_truncate(value),
            0x212E => self.main_window = LayerMask::from_bits_truncate(value),
            0x212F => self.sub_window = LayerMask::from_bits_truncate(value),
            0x2130 => self.color_window = ColorWindowSelect::from_bits(value),
            0x2131 => self.color_math = ColorMathDesignation::from_bits_retain(value),
            0x2132 => {
                let intensity = value & 0x1F;
                if value & 0x20 != 0 {
                    self.fixed_colour.0 = intensity;
                }
                if value & 0x40 != 0 {
                    self.fixed_colour.1 = intensity;
                }
                if value & 0x80 != 0 {
                    self.fixed_colour.2 = intensity;
                }
            }
            0x2133 => self.setini = ScreenInit::from_bits_truncate(value),
            _ => {
                trace!("ignored PPU write ${:04X} = ${:02X}", addr, value);
            }
        }
    }
}
