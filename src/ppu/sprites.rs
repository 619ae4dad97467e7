use bitflags::bitflags;
use log::trace;

use super::memory::{SpriteAttr, VideoMemory, SPRITE_COUNT};
use super::registers::ObjRegisters;
use super::tile::{decode_row, BitDepth, Orientation};

pub const MAX_SPRITES_PER_LINE: usize = 32;
pub const MAX_TILES_PER_LINE: usize = 34;
pub const SPRITE_RECORD_CAPACITY: usize = SPRITE_COUNT;

const OBJ_TILE_BYTES: usize = 32;
const OBJ_PALETTE_BASE: u8 = 128;

bitflags! {
    /// Overflow flags in their STAT77 bit positions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ObjStatus: u8 {
        const RANGE_OVER = 0x40;
        const TIME_OVER = 0x80;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpriteLineEntry {
    pub sprite: u8,
    /// Row within the sprite, before vertical flip
    pub line: u8,
    /// Visible 8-px columns fetched for this line
    pub tiles: u8,
}

/// Sprites selected for one line, in draw-priority order.
#[derive(Debug, Clone, Copy)]
pub struct SpriteLineRecord {
    entries: [SpriteLineEntry; SPRITE_RECORD_CAPACITY],
    count: u8,
    tiles: u8,
    pub flags: ObjStatus,
}

impl Default for SpriteLineRecord {
    fn default() -> Self {
        Self {
            entries: [SpriteLineEntry::default(); SPRITE_RECORD_CAPACITY],
            count: 0,
            tiles: 0,
            flags: ObjStatus::empty(),
        }
    }
}

impl SpriteLineRecord {
    #[inline]
    pub fn entries(&self) -> &[SpriteLineEntry] {
        &self.entries[..self.count as usize]
    }

    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tiles as usize
    }

    fn push(&mut self, entry: SpriteLineEntry) {
        self.entries[self.count as usize] = entry;
        self.count += 1;
        self.tiles += entry.tiles;
    }
}

#[inline]
fn sprite_size(obj: &ObjRegisters, attr: &SpriteAttr) -> (u16, u16) {
    obj.sizes()[attr.large as usize]
}

/// Number of 8-px columns of a sprite that land on screen.
fn visible_columns(x: i16, width: u16) -> u8 {
    (0..width / 8)
        .filter(|&c| {
            let px = x as i32 + c as i32 * 8;
            px > -8 && px < 256
        })
        .count() as u8
}

/// Select the sprites drawn on `line`.
///
/// Walks OAM from the rotation start. The 33rd sprite in range sets
/// RANGE_OVER; a sprite that would push the fetch past 34 tiles keeps what
/// fits and sets TIME_OVER. Either ends evaluation.
pub fn evaluate_sprites_for_line(
    line: u16,
    mem: &VideoMemory,
    obj: &ObjRegisters,
    obj_interlace: bool,
    odd_field: bool,
) -> SpriteLineRecord {
    let mut rec = SpriteLineRecord::default();
    let first = obj.first_sprite() as usize;

    for step in 0..SPRITE_COUNT {
        let index = (first + step) & (SPRITE_COUNT - 1);
        let attr = mem.sprite(index);
        let (width, height) = sprite_size(obj, &attr);
        let height = if obj_interlace { height / 2 } else { height };

        let dy = line.wrapping_sub(attr.y as u16) & 0xFF;
        if dy >= height || attr.x <= -(width as i16) {
            continue;
        }

        if rec.count as usize == MAX_SPRITES_PER_LINE {
            rec.flags |= ObjStatus::RANGE_OVER;
            trace!("line {}: range over at sprite {}", line, index);
            break;
        }

        let cols = visible_columns(attr.x, width);
        let room = MAX_TILES_PER_LINE - rec.tiles as usize;
        let row = if obj_interlace {
            dy * 2 + odd_field as u16
        } else {
            dy
        };
        if cols as usize > room {
            rec.flags |= ObjStatus::TIME_OVER;
            if room > 0 {
                rec.push(SpriteLineEntry {
                    sprite: index as u8,
                    line: row as u8,
                    tiles: room as u8,
                });
            }
            trace!("line {}: time over at sprite {}", line, index);
            break;
        }
        rec.push(SpriteLineEntry {
            sprite: index as u8,
            line: row as u8,
            tiles: cols,
        });
    }

    rec
}

/// Resolved OBJ pixels for one line: CGRAM index (0 = none) and priority.
#[derive(Debug, Clone, Copy)]
pub struct ObjLine {
    pub colour: [u8; 256],
    pub priority: [u8; 256],
}

impl Default for ObjLine {
    fn default() -> Self {
        Self {
            colour: [0; 256],
            priority: [0; 256],
        }
    }
}

impl ObjLine {
    pub fn clear(&mut self) {
        self.colour.fill(0);
        self.priority.fill(0);
    }

    #[inline]
    pub fn is_opaque(&self, x: usize) -> bool {
        self.colour[x] != 0
    }

    /// Sprite palettes 0-3 are excluded from colour math.
    #[inline]
    pub fn math_allowed(&self, x: usize) -> bool {
        self.colour[x] >= OBJ_PALETTE_BASE + 64
    }

    /// Depth stored for the OBJ pixel at `x`.
    #[inline]
    pub fn depth(&self, x: usize) -> u8 {
        (self.priority[x] + 1) * 4
    }
}

/// Byte address of an OBJ character.
fn obj_tile_addr(obj: &ObjRegisters, tile: u16, col: u16, row: u16) -> usize {
    let low = (tile.wrapping_add(col)) & 0x0F;
    let high = ((tile >> 4).wrapping_add(row)) & 0x0F;
    let name = ((high << 4) | low) as usize;
    let mut addr = (obj.name_base as usize) << 1;
    if tile & 0x100 != 0 {
        addr += (obj.name_select as usize) << 1;
    }
    (addr + name * OBJ_TILE_BYTES) & 0xFFFF
}

/// Rasterise the record's sprites. Earlier entries win, so each pixel is
/// written at most once.
pub fn draw_sprite_line(
    rec: &SpriteLineRecord,
    mem: &VideoMemory,
    obj: &ObjRegisters,
    out: &mut ObjLine,
) {
    out.clear();
    for entry in rec.entries() {
        let attr = mem.sprite(entry.sprite as usize);
        let (width, height) = sprite_size(obj, &attr);
        let mut row = entry.line as u16 % height;
        if attr.flip_y {
            row = height - 1 - row;
        }
        let orientation = Orientation::from_flip(attr.flip_x);
        let columns = width / 8;

        let mut fetched = 0u8;
        for c in 0..columns {
            let sx = attr.x as i32 + c as i32 * 8;
            if sx <= -8 || sx >= 256 {
                continue;
            }
            if fetched == entry.tiles {
                break;
            }
            fetched += 1;

            let src_col = if attr.flip_x { columns - 1 - c } else { c };
            let addr = obj_tile_addr(obj, attr.tile, src_col, row / 8);
            let tile = &mem.vram()[addr..addr + OBJ_TILE_BYTES];
            let pixels = decode_row(tile, BitDepth::Bpp4, orientation, (row & 7) as usize);

            for (i, &p) in pixels.iter().enumerate() {
                let x = sx + i as i32;
                if p == 0 || !(0..256).contains(&x) {
                    continue;
                }
                let x = x as usize;
                if out.colour[x] == 0 {
                    out.colour[x] = OBJ_PALETTE_BASE + attr.palette * 16 + p;
                    out.priority[x] = attr.priority;
                }
            }
        }
    }
}
