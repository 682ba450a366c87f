use serde::{Deserialize, Serialize};

/// Single-channel raster handed to the classifier. Each byte is ink
/// coverage, 0 being empty paper.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Bitmap {
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn ink_count(&self) -> usize {
        self.data.iter().filter(|&&v| v > 0).count()
    }
}

/// Pixel store behind a sketch surface
pub trait Canvas {
    /// Paint a round-capped segment; `from == to` paints a dot.
    fn paint(&mut self, from: (f32, f32), to: (f32, f32), radius: f32);
    fn erase(&mut self);
    /// Copy a `size × size` square whose top-left is (`left`, `top`).
    /// Anything outside the canvas reads as empty.
    fn crop(&self, left: i64, top: i64, size: u32) -> Bitmap;
    /// `(width, height)` in pixels
    fn dimensions(&self) -> (u32, u32);
}

/// In-memory canvas
#[derive(Clone, Debug)]
pub struct RasterCanvas {
    pixels: Bitmap,
}

impl RasterCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: Bitmap::blank(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width
    }

    pub fn height(&self) -> u32 {
        self.pixels.height
    }

    pub fn pixels(&self) -> &Bitmap {
        &self.pixels
    }

    fn stamp(&mut self, cx: f32, cy: f32, radius: f32) {
        let r = radius.max(0.5);
        let x0 = (cx - r).floor().max(0.0) as i64;
        let y0 = (cy - r).floor().max(0.0) as i64;
        let x1 = ((cx + r).ceil() as i64).min(self.pixels.width as i64 - 1);
        let y1 = ((cy + r).ceil() as i64).min(self.pixels.height as i64 - 1);

        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                if dx * dx + dy * dy <= r * r {
                    let idx = y as usize * self.pixels.width as usize + x as usize;
                    self.pixels.data[idx] = u8::MAX;
                }
            }
        }
    }
}

impl Canvas for RasterCanvas {
    fn paint(&mut self, from: (f32, f32), to: (f32, f32), radius: f32) {
        let (dx, dy) = (to.0 - from.0, to.1 - from.1);
        let length = (dx * dx + dy * dy).sqrt();
        // one stamp per half radius keeps the segment solid
        let step = (radius.max(0.5) / 2.0).max(0.25);
        let steps = (length / step).ceil().max(1.0) as usize;

        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            self.stamp(from.0 + dx * t, from.1 + dy * t, radius);
        }
    }

    fn erase(&mut self) {
        self.pixels.data.fill(0);
    }

    fn crop(&self, left: i64, top: i64, size: u32) -> Bitmap {
        let mut out = Bitmap::blank(size, size);
        for row in 0..size as i64 {
            let sy = top + row;
            if sy < 0 || sy >= self.pixels.height as i64 {
                continue;
            }
            for col in 0..size as i64 {
                let sx = left + col;
                if sx < 0 || sx >= self.pixels.width as i64 {
                    continue;
                }
                out.data[(row * size as i64 + col) as usize] =
                    self.pixels.get(sx as u32, sy as u32);
            }
        }
        out
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }
}
