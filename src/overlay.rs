//! Bounding-box and label overlay.
//!
//! Rendering is a pure function of `(frame, faces)` onto a [`Canvas`]. Label
//! chips sit 22 px above the box; for boxes near the top edge they land
//! partly or fully off-canvas. That is kept as is, not clamped.

use image::{Rgba, RgbaImage};

use crate::model::{BBox, Face};

/// 2D drawing surface, shaped after an HTML canvas context.
pub trait Canvas {
    /// Replace the whole surface with `frame`, resizing to its dimensions.
    fn draw_image(&mut self, frame: &RgbaImage);

    fn stroke_rect(&mut self, rect: BBox, color: Rgba<u8>, line_width: f32);

    fn fill_rect(&mut self, rect: BBox, color: Rgba<u8>);

    /// Draw `text` with its baseline starting at `(x, y)`.
    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Rgba<u8>);

    /// Advance width of `text` in pixels.
    fn measure_text(&self, text: &str) -> f32;
}

#[derive(Debug, Clone, Copy)]
pub struct OverlayStyle {
    pub line_width: f32,
    pub stroke: Rgba<u8>,
    pub chip_fill: Rgba<u8>,
    pub text: Rgba<u8>,
    pub chip_height: f32,
    /// Distance from the box top to the chip top.
    pub chip_offset: f32,
    pub chip_padding: f32,
    pub text_inset: f32,
    /// Distance from the box top up to the text baseline.
    pub baseline_offset: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            line_width: 3.0,
            stroke: Rgba([255, 255, 255, 255]),
            chip_fill: Rgba([0, 0, 0, 128]),
            text: Rgba([255, 255, 255, 255]),
            chip_height: 20.0,
            chip_offset: 22.0,
            chip_padding: 10.0,
            text_inset: 5.0,
            baseline_offset: 7.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OverlayRenderer {
    style: OverlayStyle,
}

impl OverlayRenderer {
    #[must_use]
    pub fn new(style: OverlayStyle) -> Self {
        Self { style }
    }

    #[must_use]
    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Redraw `frame`, then a box and a label chip per face.
    pub fn render<K: Canvas + ?Sized>(&self, canvas: &mut K, frame: &RgbaImage, faces: &[Face]) {
        let s = &self.style;
        canvas.draw_image(frame);
        for face in faces {
            let b = face.bbox;
            canvas.stroke_rect(b, s.stroke, s.line_width);

            let label = face.top_emotion.as_str();
            let chip_width = canvas.measure_text(label) + s.chip_padding;
            canvas.fill_rect(
                BBox::new(b.x, b.y - s.chip_offset, chip_width, s.chip_height),
                s.chip_fill,
            );
            canvas.fill_text(label, b.x + s.text_inset, b.y - s.baseline_offset, s.text);
        }
    }
}

/// A piece of text placed on a [`RasterCanvas`].
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub color: Rgba<u8>,
}

/// Canvas backed by an RGBA raster.
///
/// Shapes are painted into the image. Glyphs are not rasterized here; text is
/// measured with a fixed advance and kept as [`TextRun`]s for the presenting
/// layer to draw with its own font stack.
#[derive(Debug, Clone)]
pub struct RasterCanvas {
    image: RgbaImage,
    text_runs: Vec<TextRun>,
    glyph_advance: f32,
}

impl Default for RasterCanvas {
    fn default() -> Self {
        Self {
            image: RgbaImage::new(0, 0),
            text_runs: Vec::new(),
            // 16 px sans-serif averages about half an em per glyph
            glyph_advance: 8.0,
        }
    }
}

impl RasterCanvas {
    #[must_use]
    pub fn with_glyph_advance(mut self, advance: f32) -> Self {
        self.glyph_advance = advance;
        self
    }

    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    #[must_use]
    pub fn text_runs(&self) -> &[TextRun] {
        &self.text_runs
    }

    /// Paint `color` over the pixels of `rect` that fall inside the image.
    fn blend_region(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, color: Rgba<u8>) {
        let (w, h) = self.image.dimensions();
        let clip = |v: f32, max: u32| -> u32 { v.round().clamp(0.0, max as f32) as u32 };
        let (cx0, cx1) = (clip(x0, w), clip(x1, w));
        let (cy0, cy1) = (clip(y0, h), clip(y1, h));
        for y in cy0..cy1 {
            for x in cx0..cx1 {
                let pixel = self.image.get_pixel_mut(x, y);
                *pixel = source_over(*pixel, color);
            }
        }
    }
}

/// Porter-Duff source-over of `src` onto `dst`, non-premultiplied.
///
/// An opaque destination stays opaque.
fn source_over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = f32::from(src[3]) / 255.0;
    let da = f32::from(dst[3]) / 255.0;
    let dst_weight = da * (1.0 - sa);
    let out_alpha = sa + dst_weight;
    if out_alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |s: u8, d: u8| {
        let v = (f32::from(s) * sa + f32::from(d) * dst_weight) / out_alpha;
        v.round().clamp(0.0, 255.0) as u8
    };
    let alpha = if dst[3] == u8::MAX {
        u8::MAX
    } else {
        (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(src[0], dst[0]),
        channel(src[1], dst[1]),
        channel(src[2], dst[2]),
        alpha,
    ])
}

impl Canvas for RasterCanvas {
    fn draw_image(&mut self, frame: &RgbaImage) {
        self.image.clone_from(frame);
        self.text_runs.clear();
    }

    fn stroke_rect(&mut self, rect: BBox, color: Rgba<u8>, line_width: f32) {
        // Stroke centered on the path, like a canvas context.
        let half = line_width / 2.0;
        let (left, top) = (rect.x, rect.y);
        let (right, bottom) = (rect.x + rect.width, rect.y + rect.height);
        self.blend_region(left - half, top - half, right + half, top + half, color);
        self.blend_region(left - half, bottom - half, right + half, bottom + half, color);
        self.blend_region(left - half, top + half, left + half, bottom - half, color);
        self.blend_region(right - half, top + half, right + half, bottom - half, color);
    }

    fn fill_rect(&mut self, rect: BBox, color: Rgba<u8>) {
        self.blend_region(rect.x, rect.y, rect.x + rect.width, rect.y + rect.height, color);
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Rgba<u8>) {
        self.text_runs.push(TextRun {
            text: text.to_string(),
            x,
            y,
            color,
        });
    }

    fn measure_text(&self, text: &str) -> f32 {
        text.chars().count() as f32 * self.glyph_advance
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Image { width: u32, height: u32 },
    StrokeRect { rect: BBox, color: Rgba<u8>, line_width: f32 },
    FillRect { rect: BBox, color: Rgba<u8> },
    FillText { text: String, x: f32, y: f32, color: Rgba<u8> },
}

/// Canvas that records draw calls, for UIs that replay them natively.
#[derive(Debug, Clone)]
pub struct DrawList {
    commands: Vec<DrawCommand>,
    glyph_advance: f32,
}

impl Default for DrawList {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            glyph_advance: 8.0,
        }
    }
}

impl DrawList {
    #[must_use]
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }
}

impl Canvas for DrawList {
    fn draw_image(&mut self, frame: &RgbaImage) {
        self.commands.clear();
        self.commands.push(DrawCommand::Image {
            width: frame.width(),
            height: frame.height(),
        });
    }

    fn stroke_rect(&mut self, rect: BBox, color: Rgba<u8>, line_width: f32) {
        self.commands.push(DrawCommand::StrokeRect {
            rect,
            color,
            line_width,
        });
    }

    fn fill_rect(&mut self, rect: BBox, color: Rgba<u8>) {
        self.commands.push(DrawCommand::FillRect { rect, color });
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Rgba<u8>) {
        self.commands.push(DrawCommand::FillText {
            text: text.to_string(),
            x,
            y,
            color,
        });
    }

    fn measure_text(&self, text: &str) -> f32 {
        text.chars().count() as f32 * self.glyph_advance
    }
}
