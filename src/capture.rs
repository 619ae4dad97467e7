//! Scene captures: register and memory state sufficient to reproduce a frame.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ppu::{PixelFormat, Ppu, PpuRegisters, VideoMemory};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneCapture {
    pub version: u32,
    pub format: PixelFormat,
    pub regs: PpuRegisters,
    pub mem: VideoMemory,
}

impl SceneCapture {
    pub const VERSION: u32 = 1;

    pub fn capture(ppu: &Ppu) -> Self {
        Self {
            version: Self::VERSION,
            format: ppu.format(),
            regs: ppu.regs.clone(),
            mem: ppu.mem.clone(),
        }
    }

    /// Fresh renderer holding this scene.
    pub fn into_ppu(self) -> Result<Ppu> {
        let mut ppu = Ppu::graphics_init(self.format)?;
        ppu.regs = self.regs;
        ppu.mem = self.mem;
        ppu.build_direct_colour_maps()?;
        Ok(ppu)
    }

    pub fn save_to_file(&self, filename: &str) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let data = bincode::serialize(self)?;
        std::fs::write(filename, data)?;
        Ok(())
    }

    pub fn load_from_file(filename: &str) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read(filename)?;
        let capture: SceneCapture = bincode::deserialize(&data)?;
        if capture.version != Self::VERSION {
            return Err(format!(
                "unsupported capture version {} (expected {})",
                capture.version,
                Self::VERSION
            )
            .into());
        }
        Ok(capture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> Ppu {
        let mut ppu = Ppu::graphics_init(PixelFormat::Rgb565).unwrap();
        ppu.regs.write(0x2100, 0x0F);
        ppu.regs.write(0x2132, 0x3F);
        ppu.mem.write_cgram(0, 0x1234);
        ppu.mem.vram_mut()[0x100] = 0xAA;
        ppu
    }

    #[test]
    fn capture_restores_into_identical_frame() {
        let mut original = scene();
        let capture = SceneCapture::capture(&original);
        let mut restored = capture.clone().into_ppu().unwrap();
        assert_eq!(restored.format(), PixelFormat::Rgb565);
        assert_eq!(restored.regs, original.regs);

        original.render_frame().unwrap();
        restored.render_frame().unwrap();
        assert_eq!(
            original.frame_buffer().checksum(),
            restored.frame_buffer().checksum()
        );
    }

    #[test]
    fn file_round_trip() {
        let capture = SceneCapture::capture(&scene());
        let path = std::env::temp_dir().join(format!("snes-gfx-capture-{}.bin", std::process::id()));
        let path = path.to_str().unwrap().to_string();
        capture.save_to_file(&path).unwrap();
        let loaded = SceneCapture::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, capture);
    }

    #[test]
    fn rejects_other_versions() {
        let mut capture = SceneCapture::capture(&scene());
        capture.version = 99;
        let path = std::env::temp_dir().join(format!("snes-gfx-badver-{}.bin", std::process::id()));
        let path = path.to_str().unwrap().to_string();
        capture.save_to_file(&path).unwrap();
        let err = SceneCapture::load_from_file(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(err.to_string().contains("version 99"));
    }
}
