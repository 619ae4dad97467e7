pub mod capture;
pub mod debug_flags;
pub mod error;
pub mod ppu;

pub use capture::SceneCapture;
pub use error::{GfxError, Result};
pub use ppu::{FrameBuffer, PixelFormat, Ppu, PpuRegisters, VideoMemory};
