use crate::foundation::error::{ToonsyncError, ToonsyncResult};

/// Absolute 0-based frame index in output timeline space.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// An opaque raster frame as straight RGBA8 pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a frame filled with a single color.
    pub fn new(width: u32, height: u32, fill: [u8; 4]) -> ToonsyncResult<Self> {
        let len = rgba_len(width, height)?;
        let mut data = Vec::with_capacity(len);
        for _ in 0..(len / 4) {
            data.extend_from_slice(&fill);
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Wrap an existing RGBA8 buffer, checking its length.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> ToonsyncResult<Self> {
        if data.len() != rgba_len(width, height)? {
            return Err(ToonsyncError::validation(format!(
                "frame buffer length {} does not match {}x{} rgba8",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_rgba_image(img: image::RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }

    pub fn to_rgba_image(&self) -> ToonsyncResult<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| ToonsyncError::evaluation("frame buffer does not match its dimensions"))
    }

    /// Drop the alpha channel.
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() / 4 * 3);
        for px in self.data.chunks_exact(4) {
            out.extend_from_slice(&px[..3]);
        }
        out
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.index(x, y);
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = self.index(x, y);
        self.data[i..i + 4].copy_from_slice(&rgba);
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }
}

pub(crate) fn rgba_len(width: u32, height: u32) -> ToonsyncResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| ToonsyncError::validation("frame buffer size overflow"))
}

/// Integer pixel coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PointI {
    pub x: i32,
    pub y: i32,
}

impl PointI {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Clamp into `[0, width) x [0, height)`.
    pub fn clamp_to(self, width: u32, height: u32) -> Self {
        let max_x = (width as i32 - 1).max(0);
        let max_y = (height as i32 - 1).max(0);
        Self {
            x: self.x.clamp(0, max_x),
            y: self.y.clamp(0, max_y),
        }
    }
}

/// Axis-aligned face rectangle in pixel space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceBox {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(self) -> i64 {
        i64::from(self.width.max(0)) * i64::from(self.height.max(0))
    }

    pub fn right(self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(self) -> i32 {
        self.y + self.height
    }

    /// Intersect with the image rectangle. May return an empty box.
    pub fn clamp_to(self, width: u32, height: u32) -> Self {
        let x0 = self.x.clamp(0, width as i32);
        let y0 = self.y.clamp(0, height as i32);
        let x1 = self.right().clamp(0, width as i32);
        let y1 = self.bottom().clamp(0, height as i32);
        Self::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
    }

    /// Grow by `margin` of the size on every side.
    pub fn expand(self, margin: f64) -> Self {
        let dx = (f64::from(self.width) * margin) as i32;
        let dy = (f64::from(self.height) * margin) as i32;
        Self::new(
            self.x - dx,
            self.y - dy,
            self.width + 2 * dx,
            self.height + 2 * dy,
        )
    }

    pub fn is_empty(self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_new_fills_every_pixel() {
        let f = Frame::new(3, 2, [1, 2, 3, 255]).unwrap();
        assert_eq!(f.data.len(), 3 * 2 * 4);
        assert!(f.data.chunks_exact(4).all(|px| px == [1, 2, 3, 255]));
    }

    #[test]
    fn from_raw_rejects_bad_length() {
        assert!(Frame::from_raw(2, 2, vec![0; 15]).is_err());
        assert!(Frame::from_raw(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn rgb_bytes_drop_alpha() {
        let f = Frame::from_raw(1, 2, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(f.to_rgb_bytes(), vec![1, 2, 3, 5, 6, 7]);
    }

    #[test]
    fn point_clamp_stays_inside() {
        let p = PointI::new(-4, 900).clamp_to(640, 480);
        assert_eq!(p, PointI::new(0, 479));
    }

    #[test]
    fn face_box_clamp_and_expand() {
        let b = FaceBox::new(10, 10, 100, 50).expand(0.2);
        assert_eq!(b, FaceBox::new(-10, 0, 140, 70));
        let c = b.clamp_to(120, 60);
        assert_eq!(c, FaceBox::new(0, 0, 120, 60));
        assert!(FaceBox::new(200, 200, 10, 10).clamp_to(100, 100).is_empty());
    }
}
