//! Data cubes: tensor regions in device memory.

use crate::error::{NnaError, Result};
use nna_chip::geometry::{MAX_CUBE_EXTENT, MEMORY_ATOMIC_SIZE};
use std::fmt;

/// Memory layout of a cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataFormat {
    /// Channels interleaved in 8-byte atomic groups ahead of width/height.
    #[default]
    Feature,
    /// Planar image layout (`line_stride == width`).
    Pixel,
}

impl DataFormat {
    /// Lower-case name, as used in diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Pixel => "pixel",
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Width × height × channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CubeDims {
    /// Elements per line.
    pub width: u32,
    /// Lines per surface.
    pub height: u32,
    /// Channels.
    pub channel: u32,
}

impl CubeDims {
    /// New dimensions.
    pub const fn new(width: u32, height: u32, channel: u32) -> Self {
        Self {
            width,
            height,
            channel,
        }
    }

    /// Reject any zero dimension or one wider than the size fields.
    ///
    /// # Errors
    ///
    /// Returns [`NnaError::InvalidGeometry`] naming `what` and the
    /// offending axis.
    pub fn validate(&self, what: &str) -> Result<()> {
        for (axis, v) in [
            ("width", self.width),
            ("height", self.height),
            ("channel", self.channel),
        ] {
            if v == 0 {
                return Err(NnaError::invalid_geometry(format!("{what} {axis} is zero")));
            }
            if v > MAX_CUBE_EXTENT {
                return Err(NnaError::invalid_geometry(format!(
                    "{what} {axis} {v} exceeds {MAX_CUBE_EXTENT}"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for CubeDims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channel)
    }
}

/// Rectangular tensor region in device memory.
///
/// `address == 0` means the cube is not staged in memory: the engine
/// receives it directly from (or hands it directly to) a neighbouring
/// engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataCube {
    /// Physical byte address, 0 when flying.
    pub address: u64,
    /// Width, height, channel.
    pub dims: CubeDims,
    /// Bytes between consecutive lines.
    pub line_stride: u32,
    /// Bytes between consecutive surfaces.
    pub surface_stride: u32,
    /// Byte length.
    pub size: u32,
    /// Memory layout.
    pub format: DataFormat,
}

impl DataCube {
    /// Feature-format cube with strides derived from its dimensions.
    pub fn feature(address: u64, dims: CubeDims) -> Self {
        let line_stride = MEMORY_ATOMIC_SIZE.saturating_mul(dims.width);
        let surface_stride = dims.height.saturating_mul(line_stride);
        Self {
            address,
            dims,
            line_stride,
            surface_stride,
            size: surface_stride.saturating_mul(dims.channel.div_ceil(MEMORY_ATOMIC_SIZE)),
            format: DataFormat::Feature,
        }
    }

    /// Feature cube fed from or to a neighbouring engine.
    pub fn flying(dims: CubeDims) -> Self {
        Self::feature(0, dims)
    }

    /// Pixel-format cube (`line_stride == width`).
    pub fn pixel(address: u64, dims: CubeDims) -> Self {
        let line_stride = dims.width;
        let surface_stride = dims.height.saturating_mul(line_stride);
        Self {
            address,
            dims,
            line_stride,
            surface_stride,
            size: surface_stride.saturating_mul(dims.channel),
            format: DataFormat::Pixel,
        }
    }

    /// True when the cube lives in memory rather than flying between engines.
    pub const fn in_memory(&self) -> bool {
        self.address != 0
    }

    /// Width.
    pub const fn width(&self) -> u32 {
        self.dims.width
    }

    /// Height.
    pub const fn height(&self) -> u32 {
        self.dims.height
    }

    /// Channel count.
    pub const fn channel(&self) -> u32 {
        self.dims.channel
    }

    /// Check dimensions, and for in-memory cubes the byte layout.
    ///
    /// Feature cubes must carry the strides their dimensions imply, and every
    /// in-memory cube must fit the 32-bit size and stride registers.
    ///
    /// # Errors
    ///
    /// Returns [`NnaError::InvalidGeometry`] on a zero or oversized
    /// dimension, strides that disagree with the feature layout, or a cube
    /// larger than 4 GiB.
    pub fn validate(&self, what: &str) -> Result<()> {
        self.dims.validate(what)?;
        if !self.in_memory() {
            return Ok(());
        }
        let (width, height) = (u64::from(self.dims.width), u64::from(self.dims.height));
        let (line, slices) = match self.format {
            DataFormat::Feature => (
                u64::from(MEMORY_ATOMIC_SIZE) * width,
                u64::from(self.dims.channel.div_ceil(MEMORY_ATOMIC_SIZE)),
            ),
            DataFormat::Pixel => (width, u64::from(self.dims.channel)),
        };
        let surface = height * line;
        let size = surface * slices;
        if size > u64::from(u32::MAX) {
            return Err(NnaError::invalid_geometry(format!(
                "{what} {} needs {size} bytes, beyond 32-bit addressing",
                self.dims
            )));
        }
        if self.format == DataFormat::Feature
            && (u64::from(self.line_stride) != line || u64::from(self.surface_stride) != surface)
        {
            return Err(NnaError::invalid_geometry(format!(
                "{what} strides {}/{} do not match feature layout {line}/{surface}",
                self.line_stride, self.surface_stride
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_strides_follow_atomic_size() {
        let c = DataCube::feature(0x4000_0000, CubeDims::new(32, 32, 3));
        assert_eq!(c.line_stride, 256);
        assert_eq!(c.surface_stride, 32 * 256);
        assert!(c.in_memory());
        c.validate("input").unwrap();
    }

    #[test]
    fn flying_cube_is_not_in_memory() {
        assert!(!DataCube::flying(CubeDims::new(8, 8, 16)).in_memory());
    }

    #[test]
    fn zero_dimension_rejected() {
        let err = DataCube::feature(0x1000, CubeDims::new(0, 4, 4))
            .validate("input")
            .unwrap_err();
        assert!(err.to_string().contains("input width is zero"), "{err}");
    }

    #[test]
    fn tampered_stride_rejected() {
        let mut c = DataCube::feature(0x1000, CubeDims::new(4, 4, 8));
        c.line_stride = 4;
        assert!(c.validate("output").is_err());
    }

    #[test]
    fn pixel_strides_are_planar() {
        let c = DataCube::pixel(0x1000, CubeDims::new(10, 5, 3));
        assert_eq!(c.line_stride, 10);
        assert_eq!(c.surface_stride, 50);
        assert_eq!(c.format.to_string(), "pixel");
    }

    #[test]
    fn extent_limit_is_inclusive() {
        DataCube::feature(0x1000, CubeDims::new(8192, 1, 8))
            .validate("input")
            .unwrap();
        let err = DataCube::feature(0x1000, CubeDims::new(8193, 1, 8))
            .validate("input")
            .unwrap_err();
        assert!(err.to_string().contains("exceeds 8192"), "{err}");
    }

    #[test]
    fn cube_beyond_4gib_rejected_without_wrapping() {
        let c = DataCube::feature(0x1000, CubeDims::new(8192, 8192, 8192));
        assert_eq!(c.line_stride, 65536);
        assert_eq!(c.size, u32::MAX);
        let err = c.validate("input").unwrap_err();
        assert!(err.to_string().contains("32-bit addressing"), "{err}");

        // a flying cube has no memory footprint to check
        DataCube::flying(CubeDims::new(8192, 8192, 8192))
            .validate("input")
            .unwrap();
    }
}
