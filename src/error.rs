use std::fmt;

/// Failures that can reach the host. Per-pixel work never fails; these are all
/// raised at init or at the table-build boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GfxError {
    /// Master brightness outside 0..=15.
    InvalidBrightness(u8),
    /// Green channel width other than 5 or 6 bits.
    UnsupportedPixelFormat(u8),
    /// Frame buffer or lookup table could not be allocated.
    Allocation { what: &'static str, bytes: usize },
}

impl fmt::Display for GfxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GfxError::InvalidBrightness(b) => {
                write!(f, "master brightness {} out of range (0-15)", b)
            }
            GfxError::UnsupportedPixelFormat(bits) => {
                write!(f, "unsupported pixel format: {}-bit green channel", bits)
            }
            GfxError::Allocation { what, bytes } => {
                write!(f, "failed to allocate {} ({} bytes)", what, bytes)
            }
        }
    }
}

impl std::error::Error for GfxError {}

pub type Result<T> = std::result::Result<T, GfxError>;

/// Allocate a zero-filled buffer, reporting failure instead of aborting.
pub(crate) fn try_alloc<T: Copy>(what: &'static str, len: usize, fill: T) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| GfxError::Allocation {
        what,
        bytes: len * std::mem::size_of::<T>(),
    })?;
    v.resize(len, fill);
    Ok(v)
}
