use super::*;
use crate::ppu::color_math::add_half;
use crate::ppu::memory::SPRITE_COUNT;

const F: PixelFormat = PixelFormat::Rgb555;
const MAP_WORD: u16 = 0x0400;
const CHAR_WORD: u16 = 0x1000;

/// Unblanked PPU at full brightness with every sprite parked below the screen.
fn ppu() -> Ppu {
    let mut ppu = Ppu::graphics_init(F).unwrap();
    ppu.regs.write(0x2100, 0x0F);
    for i in 0..SPRITE_COUNT {
        ppu.mem.set_sprite(
            i,
            &SpriteAttr {
                y: 240,
                ..SpriteAttr::default()
            },
        );
    }
    ppu
}

/// Mode 1 with BG1 on the main screen, map at MAP_WORD, characters at
/// CHAR_WORD, and a solid 4bpp tile 1 drawn in CGRAM colour 1.
fn mode1_bg1(ppu: &mut Ppu) {
    ppu.regs.write(0x2105, 0x01);
    ppu.regs.write(0x2107, (MAP_WORD >> 8) as u8);
    ppu.regs.write(0x210B, (CHAR_WORD >> 12) as u8);
    ppu.regs.write(0x212C, 0x01);
    let base = ((CHAR_WORD as usize) << 1) + 32;
    for row in 0..8 {
        ppu.mem.vram_mut()[base + row * 2] = 0xFF;
    }
    ppu.mem.write_cgram(1, 0x001F);
}

fn fill_map(ppu: &mut Ppu) {
    for i in 0..32 * 32 {
        ppu.mem.write_vram_word(MAP_WORD + i, 0x0001);
    }
}

#[test]
fn single_tile_frame() {
    let mut ppu = ppu();
    mode1_bg1(&mut ppu);
    ppu.mem.write_vram_word(MAP_WORD, 0x0001);
    ppu.render_frame().unwrap();

    let red = F.build_pixel(31, 0, 0);
    let fb = ppu.frame_buffer();
    assert_eq!(fb.height(), 224);
    // screen line 0 samples tilemap row 1 of the tile
    assert!((0..8).all(|x| fb.main_row(0)[x] == red));
    assert_eq!(fb.main_row(0)[8], 0);
    assert!((0..7).all(|row| fb.main_row(row)[0] == red));
    assert_eq!(fb.main_row(7)[0], 0);
    assert_eq!(fb.main_depth_row(100)[0], renderer::BACKDROP_DEPTH);
}

#[test]
fn same_scene_same_checksum() {
    let mut a = ppu();
    mode1_bg1(&mut a);
    fill_map(&mut a);
    a.render_frame().unwrap();

    let mut b = ppu();
    mode1_bg1(&mut b);
    fill_map(&mut b);
    b.render_frame().unwrap();
    assert_eq!(a.frame_buffer().checksum(), b.frame_buffer().checksum());

    b.regs.write(0x2100, 0x08);
    b.render_frame().unwrap();
    assert_ne!(a.frame_buffer().checksum(), b.frame_buffer().checksum());
}

#[test]
fn forced_blank_renders_black() {
    let mut ppu = ppu();
    mode1_bg1(&mut ppu);
    fill_map(&mut ppu);
    ppu.mem.write_cgram(0, 0x7FFF);
    ppu.regs.write(0x2100, 0x8F);
    ppu.render_frame().unwrap();
    if !crate::debug_flags::force_display() {
        assert!(ppu.frame_buffer().main_rows().all(|row| row.iter().all(|&p| p == 0)));
    }
}

#[test]
fn zero_brightness_frame_is_black() {
    let mut ppu = ppu();
    ppu.mem.write_cgram(0, 0x7FFF);
    ppu.regs.write(0x2100, 0x00);
    ppu.render_frame().unwrap();
    assert!(ppu.frame_buffer().main_rows().all(|row| row.iter().all(|&p| p == 0)));

    ppu.regs.write(0x2100, 0x0F);
    ppu.render_frame().unwrap();
    assert_eq!(ppu.frame_buffer().main_row(0)[0], F.build_pixel(31, 31, 31));
}

#[test]
fn vram_upload_during_forced_blank_reaches_later_lines() {
    let mut ppu = ppu();
    mode1_bg1(&mut ppu);
    fill_map(&mut ppu);
    ppu.start_screen_refresh().unwrap();
    for line in 0..10 {
        ppu.render_line(line);
    }
    ppu.regs.write(0x2100, 0x8F);
    ppu.render_line(10);
    let tile1 = ((CHAR_WORD as usize) << 1) + 32;
    ppu.mem.vram_mut()[tile1..tile1 + 32].fill(0);
    ppu.regs.write(0x2100, 0x0F);
    for line in 11..20 {
        ppu.render_line(line);
    }
    ppu.end_screen_refresh();

    let fb = ppu.frame_buffer();
    assert_eq!(fb.main_row(5)[0], F.build_pixel(31, 0, 0));
    assert!(fb.main_row(15).iter().all(|&p| p == 0));
}

#[test]
fn tile_rewritten_mid_frame_is_decoded_again() {
    let mut ppu = ppu();
    mode1_bg1(&mut ppu);
    fill_map(&mut ppu);
    ppu.mem.write_cgram(3, 0x03E0);
    ppu.start_screen_refresh().unwrap();
    ppu.render_line(0);
    // planes 0 and 1 set on every row: colour 3
    ppu.mem.load_vram(CHAR_WORD + 16, &[0xFF; 16]);
    ppu.render_line(1);
    ppu.end_screen_refresh();

    let fb = ppu.frame_buffer();
    assert_eq!(fb.main_row(0)[0], F.build_pixel(31, 0, 0));
    assert!(fb.main_row(1).iter().all(|&p| p == F.build_pixel(0, 31, 0)));
}

#[test]
fn too_many_sprites_set_range_over() {
    let mut ppu = ppu();
    for i in 0..40 {
        ppu.mem.set_sprite(
            i,
            &SpriteAttr {
                x: (i * 4) as i16,
                y: 50,
                ..SpriteAttr::default()
            },
        );
    }
    ppu.render_frame().unwrap();
    assert!(ppu.obj_status().contains(ObjStatus::RANGE_OVER));
    assert!(!ppu.obj_status().contains(ObjStatus::TIME_OVER));

    // cleared at the next frame start
    for i in 0..40 {
        ppu.mem.set_sprite(
            i,
            &SpriteAttr {
                y: 240,
                ..SpriteAttr::default()
            },
        );
    }
    ppu.render_frame().unwrap();
    assert_eq!(ppu.obj_status(), ObjStatus::empty());
}

#[test]
fn wide_sprites_set_time_over() {
    let mut ppu = ppu();
    ppu.mem.set_sprite(
        0,
        &SpriteAttr {
            y: 20,
            ..SpriteAttr::default()
        },
    );
    for i in 1..=20 {
        ppu.mem.set_sprite(
            i,
            &SpriteAttr {
                x: (i * 8) as i16,
                y: 20,
                large: true,
                ..SpriteAttr::default()
            },
        );
    }
    ppu.render_frame().unwrap();
    assert!(ppu.obj_status().contains(ObjStatus::TIME_OVER));
    assert!(!ppu.obj_status().contains(ObjStatus::RANGE_OVER));
}

#[test]
fn sprite_drawn_over_backdrop() {
    let mut ppu = ppu();
    ppu.regs.write(0x212C, 0x10);
    // OBJ tile 1 at name base 0, 4bpp, colour 1 everywhere
    for row in 0..8 {
        ppu.mem.vram_mut()[32 + row * 2] = 0xFF;
    }
    ppu.mem.write_cgram(128 + 16 + 1, 0x7C00);
    ppu.mem.set_sprite(
        0,
        &SpriteAttr {
            x: 16,
            y: 30,
            tile: 1,
            palette: 1,
            priority: 2,
            ..SpriteAttr::default()
        },
    );
    ppu.render_frame().unwrap();

    let blue = F.build_pixel(0, 0, 31);
    let fb = ppu.frame_buffer();
    assert!((16..24).all(|x| fb.main_row(30)[x] == blue));
    assert_eq!(fb.main_depth_row(30)[16], 12);
    assert_eq!(fb.main_row(30)[24], 0);
    assert_eq!(fb.main_row(29)[16], 0);
}

#[test]
fn mode7_identity_frame() {
    let mut ppu = ppu();
    ppu.regs.write(0x2105, 0x07);
    ppu.regs.write(0x212C, 0x01);
    ppu.mem.vram_mut()[0] = 1;
    for y in 0..8 {
        for x in 0..8 {
            ppu.mem.vram_mut()[(1 << 7) + (y << 4) + (x << 1) + 1] = 5;
        }
    }
    ppu.mem.write_cgram(5, 0x7FFF);
    ppu.render_frame().unwrap();

    let white = F.build_pixel(31, 31, 31);
    let fb = ppu.frame_buffer();
    assert!((0..8).all(|x| fb.main_row(0)[x] == white));
    assert_eq!(fb.main_row(0)[8], 0);
    assert_eq!(fb.main_row(7)[0], 0);
}

#[test]
fn window_masks_bg_interval() {
    let mut ppu = ppu();
    mode1_bg1(&mut ppu);
    fill_map(&mut ppu);
    ppu.mem.write_cgram(0, 0x03E0);
    ppu.regs.write(0x2123, 0x02);
    ppu.regs.write(0x2126, 10);
    ppu.regs.write(0x2127, 20);
    ppu.regs.write(0x212E, 0x01);
    ppu.render_frame().unwrap();

    let red = F.build_pixel(31, 0, 0);
    let green = F.build_pixel(0, 31, 0);
    let row = ppu.frame_buffer().main_row(50);
    assert_eq!(row[9], red);
    assert!((10..=20).all(|x| row[x] == green));
    assert_eq!(row[21], red);
}

#[test]
fn window_covering_nothing_leaves_layer_whole() {
    let mut ppu = ppu();
    mode1_bg1(&mut ppu);
    fill_map(&mut ppu);
    // left > right: empty window
    ppu.regs.write(0x2123, 0x02);
    ppu.regs.write(0x2126, 200);
    ppu.regs.write(0x2127, 100);
    ppu.regs.write(0x212E, 0x01);
    ppu.render_frame().unwrap();

    let red = F.build_pixel(31, 0, 0);
    assert!(ppu.frame_buffer().main_row(3).iter().all(|&p| p == red));
    assert_eq!(
        ppu.clip_windows().get(ClipWindows::MAIN, Layer::Bg1).coverage(),
        256
    );
}

#[test]
fn inverted_full_window_hides_layer() {
    let mut ppu = ppu();
    mode1_bg1(&mut ppu);
    fill_map(&mut ppu);
    ppu.regs.write(0x2123, 0x03);
    ppu.regs.write(0x2126, 200);
    ppu.regs.write(0x2127, 100);
    ppu.regs.write(0x212E, 0x01);
    ppu.render_frame().unwrap();
    assert!(ppu.frame_buffer().main_row(3).iter().all(|&p| p == 0));
}

#[test]
fn clip_to_black_inside_colour_window() {
    let mut ppu = ppu();
    ppu.mem.write_cgram(0, 0x7FFF);
    ppu.regs.write(0x2125, 0x20);
    ppu.regs.write(0x2126, 100);
    ppu.regs.write(0x2127, 149);
    ppu.regs.write(0x2130, 0x80);
    ppu.render_frame().unwrap();

    let white = F.build_pixel(31, 31, 31);
    let row = ppu.frame_buffer().main_row(10);
    assert_eq!(row[99], white);
    assert!((100..150).all(|x| row[x] == 0));
    assert_eq!(row[150], white);
}

#[test]
fn backdrop_adds_fixed_colour() {
    let mut ppu = ppu();
    ppu.mem.write_cgram(0, 0x0010);
    ppu.regs.write(0x2131, 0x20);
    ppu.regs.write(0x2132, 0x20 | 0x0F);
    ppu.render_frame().unwrap();
    assert_eq!(ppu.frame_buffer().main_row(0)[0], F.build_pixel(31, 0, 0));

    // fixed-colour halving always applies
    ppu.regs.write(0x2131, 0x60);
    ppu.render_frame().unwrap();
    let expected = add_half(F, F.build_pixel(16, 0, 0), F.build_pixel(15, 0, 0));
    assert_eq!(ppu.frame_buffer().main_row(0)[0], expected);
}

#[test]
fn subtract_from_sub_screen_layer() {
    let mut ppu = ppu();
    mode1_bg1(&mut ppu);
    fill_map(&mut ppu);
    ppu.mem.write_cgram(0, 0x7FFF);
    // BG1 only on the sub screen, backdrop subtracts it
    ppu.regs.write(0x212C, 0x00);
    ppu.regs.write(0x212D, 0x01);
    ppu.regs.write(0x2130, 0x02);
    ppu.regs.write(0x2131, 0xA0);
    ppu.render_frame().unwrap();

    let fb = ppu.frame_buffer();
    assert_eq!(fb.main_row(0)[0], F.build_pixel(0, 31, 31));
    assert_eq!(fb.sub_row(0)[0], F.build_pixel(31, 0, 0));
}

#[test]
fn brightness_rebuild_waits_for_frame_start() {
    let mut ppu = ppu();
    ppu.start_screen_refresh().unwrap();
    assert_eq!(ppu.tables().brightness(), 15);
    ppu.regs.write(0x2100, 0x07);
    ppu.build_direct_colour_maps().unwrap();
    assert_eq!(ppu.tables().brightness(), 15);
    ppu.end_screen_refresh();

    ppu.start_screen_refresh().unwrap();
    assert_eq!(ppu.tables().brightness(), 7);
    ppu.end_screen_refresh();

    ppu.regs.write(0x2100, 0x03);
    ppu.build_direct_colour_maps().unwrap();
    assert_eq!(ppu.tables().brightness(), 3);
}

#[test]
fn setini_resizes_frame() {
    let mut ppu = ppu();
    ppu.regs.write(0x2133, 0x04);
    ppu.render_frame().unwrap();
    assert_eq!(ppu.frame_buffer().height(), 239);
    assert!(!ppu.odd_field());

    ppu.regs.write(0x2133, 0x05);
    ppu.render_frame().unwrap();
    assert_eq!(ppu.frame_buffer().height(), 478);
    assert!(ppu.odd_field());
    ppu.render_frame().unwrap();
    assert!(!ppu.odd_field());

    ppu.regs.write(0x2133, 0x00);
    assert!(ppu.graphics_screen_resize());
    assert_eq!(ppu.frame_buffer().height(), 224);
}

#[test]
fn lines_per_tile_halves_in_hires_interlace() {
    let mut ppu = ppu();
    assert_eq!(ppu.lines_per_tile(), 8);
    ppu.regs.write(0x2133, 0x01);
    assert_eq!(ppu.lines_per_tile(), 8);
    ppu.regs.write(0x2105, 0x05);
    assert_eq!(ppu.lines_per_tile(), 4);
}

#[test]
fn pixel_format_switch_outside_frame() {
    let mut ppu = ppu();
    ppu.mem.write_cgram(0, 0x7FFF);
    ppu.set_pixel_format(PixelFormat::Rgb565).unwrap();
    assert_eq!(ppu.format(), PixelFormat::Rgb565);
    ppu.render_frame().unwrap();
    assert_eq!(ppu.frame_buffer().main_row(0)[0], 0xFFFF);

    // ignored mid-frame
    ppu.start_screen_refresh().unwrap();
    ppu.set_pixel_format(PixelFormat::Rgb555).unwrap();
    assert_eq!(ppu.format(), PixelFormat::Rgb565);
    ppu.end_screen_refresh();
}

#[test]
fn render_line_outside_frame_is_ignored() {
    let mut ppu = ppu();
    ppu.mem.write_cgram(0, 0x7FFF);
    ppu.render_line(0);
    assert_eq!(ppu.frame_buffer().main_row(0)[0], 0);
    assert_eq!(ppu.frame_count(), 0);
}

#[test]
fn metrics_summary_reports_off_or_counts() {
    let mut ppu = ppu();
    ppu.render_frame().unwrap();
    let s = ppu.take_render_metrics_summary();
    if crate::debug_flags::render_metrics() {
        assert!(s.starts_with("RENDER_METRICS: lines=224"));
    } else {
        assert_eq!(s, "RENDER_METRICS: off");
    }
}

#[test]
fn scroll_history_follows_mid_frame_writes() {
    let mut ppu = ppu();
    mode1_bg1(&mut ppu);
    fill_map(&mut ppu);
    ppu.start_screen_refresh().unwrap();
    for line in 0..20 {
        if line == 10 {
            ppu.regs.write(0x210D, 0x05);
            ppu.regs.write(0x210D, 0x00);
        }
        ppu.render_line(line);
    }
    ppu.end_screen_refresh();

    assert_eq!(ppu.line_scroll(9).unwrap().offsets[0], (0, 0));
    assert_eq!(ppu.line_scroll(10).unwrap().offsets[0], (5, 0));
    assert!(ppu.line_scroll(20).is_none());
    assert_eq!(ppu.line_matrix(0).unwrap().a, 0x100);
}

/// Ignores every window: layers are never masked.
struct NoWindows;

impl WindowPolicy for NoWindows {
    fn combine(&self, _logic: WindowLogic, _a: bool, _b: bool) -> bool {
        false
    }

    fn disabled_area(&self, _cfg: &LayerWindow) -> bool {
        false
    }

    fn area(&self, _cfg: &LayerWindow, _in1: bool, _in2: bool) -> bool {
        false
    }
}

#[test]
fn window_policy_is_pluggable() {
    let mut ppu = ppu();
    mode1_bg1(&mut ppu);
    fill_map(&mut ppu);
    ppu.regs.write(0x2123, 0x03);
    ppu.regs.write(0x212E, 0x01);
    ppu.set_window_policy(Box::new(NoWindows));
    ppu.render_frame().unwrap();

    let red = F.build_pixel(31, 0, 0);
    assert!(ppu.frame_buffer().main_row(3).iter().all(|&p| p == red));
}
