/// Pixel formats of source frame data.
///
/// Both variants are planar YUV 4:2:0; they differ only in the order of the
/// chroma planes within a packed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, plane order Y, U (Cb), V (Cr).
    Yuv420Planar,
    /// Planar YUV 4:2:0, plane order Y, V (Cr), U (Cb).
    Yv12,
    /// Semi-planar YUV 4:2:0 (interleaved chroma). Recognized but not
    /// presentable; the display subsystem has no mapping for it here.
    Nv12,
}

/// Buffer formats understood by the display subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SurfaceFormat {
    /// Planar YUV 4:2:0 with Cr before Cb and a 16-byte aligned chroma stride.
    Yv12,
    Rgb565,
    Rgba8888,
    /// Format chosen by the compositor; used for surfaces the producer never
    /// writes through software.
    Opaque,
}

/// Pixel dimensions of a frame or surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    /// Round both dimensions up to even values, as required by 4:2:0 chroma
    /// subsampling.
    pub fn aligned_even(self) -> Size {
        Size {
            width: (self.width + 1) & !1,
            height: (self.height + 1) & !1,
        }
    }
}

/// An axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// A rectangle covering `size` with its origin at (0, 0).
    pub fn from_size(size: Size) -> Rect {
        Rect {
            left: 0,
            top: 0,
            right: size.width as i32,
            bottom: size.height as i32,
        }
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top).max(0) as u32
    }
}

/// Main display parameters as reported by the compositor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayMode {
    pub size: Size,
    pub refresh_rate: f32,
}

/// Configuration for opening a presentation session.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub pixel_format: PixelFormat,
    pub size: Size,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_even_rounds_up() {
        let s = Size {
            width: 239,
            height: 321,
        };
        assert_eq!(
            s.aligned_even(),
            Size {
                width: 240,
                height: 322
            }
        );
        assert_eq!(
            Size {
                width: 240,
                height: 320
            }
            .aligned_even(),
            Size {
                width: 240,
                height: 320
            }
        );
    }

    #[test]
    fn rect_from_size() {
        let r = Rect::from_size(Size {
            width: 240,
            height: 320,
        });
        assert_eq!((r.left, r.top, r.right, r.bottom), (0, 0, 240, 320));
        assert_eq!(r.width(), 240);
        assert_eq!(r.height(), 320);
    }
}
