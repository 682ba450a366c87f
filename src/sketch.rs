use crate::raster::{Bitmap, Canvas};

/// What the classification loop needs from whatever holds the drawing
pub trait Sketch {
    /// Report whether ink was added since the previous call, then forget it.
    fn consume_dirty(&mut self) -> bool;
    fn snapshot(&self) -> Option<Bitmap>;
    fn clear(&mut self);
}

/// Axis-aligned extent of everything drawn since the last clear
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum BoundingBox {
    #[default]
    Empty,
    Bounds { x1: f32, y1: f32, x2: f32, y2: f32 },
}

impl BoundingBox {
    pub fn is_empty(&self) -> bool {
        matches!(self, BoundingBox::Empty)
    }

    pub fn include(&mut self, x: f32, y: f32) {
        *self = match *self {
            BoundingBox::Empty => BoundingBox::Bounds {
                x1: x,
                y1: y,
                x2: x,
                y2: y,
            },
            BoundingBox::Bounds { x1, y1, x2, y2 } => BoundingBox::Bounds {
                x1: x1.min(x),
                y1: y1.min(y),
                x2: x2.max(x),
                y2: y2.max(y),
            },
        };
    }

    pub fn width(&self) -> f32 {
        match self {
            BoundingBox::Empty => 0.0,
            BoundingBox::Bounds { x1, x2, .. } => x2 - x1,
        }
    }

    pub fn height(&self) -> f32 {
        match self {
            BoundingBox::Empty => 0.0,
            BoundingBox::Bounds { y1, y2, .. } => y2 - y1,
        }
    }
}

/// Square area of the canvas that a snapshot copies
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRegion {
    pub left: i64,
    pub top: i64,
    pub size: u32,
}

#[derive(Debug)]
pub struct SketchSurface<C: Canvas> {
    canvas: C,
    bounds: BoundingBox,
    dirty: bool,
    padding: f32,
    last_point: Option<(f32, f32)>,
}

impl<C: Canvas> SketchSurface<C> {
    pub fn new(canvas: C, padding: u32) -> Self {
        Self {
            canvas,
            bounds: BoundingBox::Empty,
            dirty: false,
            padding: padding as f32,
            last_point: None,
        }
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn begin_stroke(&mut self, x: f32, y: f32, brush_radius: f32) {
        self.last_point = None;
        self.on_stroke_point(x, y, brush_radius);
    }

    pub fn on_stroke_point(&mut self, x: f32, y: f32, brush_radius: f32) {
        self.bounds.include(x - brush_radius, y - brush_radius);
        self.bounds.include(x + brush_radius, y + brush_radius);

        let from = self.last_point.unwrap_or((x, y));
        self.canvas.paint(from, (x, y), brush_radius);
        self.last_point = Some((x, y));
        self.dirty = true;
    }

    pub fn end_stroke(&mut self) {
        self.last_point = None;
    }

    /// Square, padded region around the ink, centred on the shorter axis.
    /// The box is clipped to the canvas first, since ink only lands there.
    pub fn crop_region(&self) -> Option<CropRegion> {
        let BoundingBox::Bounds { x1, y1, x2, y2 } = self.bounds else {
            return None;
        };
        let (canvas_w, canvas_h) = self.canvas.dimensions();
        let (canvas_w, canvas_h) = (canvas_w as f32, canvas_h as f32);
        let (x1, x2) = (x1.clamp(0.0, canvas_w), x2.clamp(0.0, canvas_w));
        let (y1, y2) = (y1.clamp(0.0, canvas_h), y2.clamp(0.0, canvas_h));

        let (width, height) = (x2 - x1, y2 - y1);
        let size = width.max(height) + 2.0 * self.padding;

        let mut left = x1 - self.padding;
        let mut top = y1 - self.padding;
        if width < height {
            left = (left - (height - width) / 2.0).max(0.0);
        } else if height < width {
            top = (top - (width - height) / 2.0).max(0.0);
        }

        Some(CropRegion {
            left: left.floor() as i64,
            top: top.floor() as i64,
            size: size.ceil() as u32,
        })
    }
}

impl<C: Canvas> Sketch for SketchSurface<C> {
    fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn snapshot(&self) -> Option<Bitmap> {
        let region = self.crop_region()?;
        Some(self.canvas.crop(region.left, region.top, region.size))
    }

    fn clear(&mut self) {
        self.canvas.erase();
        self.bounds = BoundingBox::Empty;
        self.dirty = false;
        self.last_point = None;
    }
}
