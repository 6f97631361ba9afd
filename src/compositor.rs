// Marker compositor: burns the start arrow and numbered markers into the source raster.
// Works at native resolution; all sizes scale with max(width, height).

use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_polygon_mut};
use imageproc::point::Point;
use imageproc::rect::Rect;
use tracing::debug;

use crate::error::EngineError;
use crate::types::*;

/// Start arrow outline in units of the arrow size: tip, right corner, inner notch, left corner.
const ARROW_SHAPE: [(f32, f32); 4] = [(0.0, -1.0), (0.6, 0.6), (0.0, 0.2), (-0.6, 0.6)];

/// Seven-segment masks for digits 0-9, bits a..g = 0..6.
const DIGIT_SEGMENTS: [u8; 10] = [
    0b011_1111, // 0: a b c d e f
    0b000_0110, // 1: b c
    0b101_1011, // 2: a b d e g
    0b100_1111, // 3: a b c d g
    0b110_0110, // 4: b c f g
    0b110_1101, // 5: a c d f g
    0b111_1101, // 6: a c d e f g
    0b000_0111, // 7: a b c
    0b111_1111, // 8
    0b110_1111, // 9: a b c d f g
];

/// Where one marker lands on the raster. `number` is the list position + 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerPlacement {
    pub number: usize,
    pub center: (f32, f32),
    pub radius: f32,
}

/// Renders annotations into rasters and encodes them for upload.
///
/// Marker numbers are drawn as filled seven-segment glyphs, so no font asset is needed.
pub struct Compositor {
    settings: CompositorSettings,
}

impl Compositor {
    pub fn new(settings: CompositorSettings) -> Self {
        Compositor { settings }
    }

    /// Marker circles in draw order. Numbering comes from list order, never from `Marker::id`.
    pub fn marker_placements(
        &self,
        width: u32,
        height: u32,
        markers: &[Marker],
    ) -> Vec<MarkerPlacement> {
        let radius = scale_base(width, height) * self.settings.marker_radius_ratio;
        markers
            .iter()
            .enumerate()
            .map(|(index, marker)| MarkerPlacement {
                number: index + 1,
                center: marker.position().to_pixels(width, height),
                radius,
            })
            .collect()
    }

    /// Copy of `source` with the start arrow and markers drawn in.
    pub fn composite(
        &self,
        source: &DynamicImage,
        markers: &[Marker],
        start: Option<&StartConfig>,
    ) -> Result<RgbImage, EngineError> {
        let (width, height) = (source.width(), source.height());
        if width == 0 || height == 0 {
            return Err(EngineError::SurfaceUnavailable { width, height });
        }

        let mut canvas = source.to_rgb8();
        let base = scale_base(width, height);

        if let Some(start) = start {
            self.draw_start_arrow(&mut canvas, start, base);
        }

        let outline = self.settings.marker_radius_ratio * self.settings.marker_outline_ratio * base;
        let glyph_height = base * self.settings.number_height_ratio;
        for placement in self.marker_placements(width, height, markers) {
            let (cx, cy) = placement.center;
            let center = (cx.round() as i32, cy.round() as i32);
            let outer = (placement.radius + outline / 2.0).round().max(1.0) as i32;
            let inner = (placement.radius - outline / 2.0).round().max(1.0) as i32;

            draw_filled_circle_mut(&mut canvas, center, outer, Rgb(self.settings.marker_outline));
            draw_filled_circle_mut(&mut canvas, center, inner, Rgb(self.settings.marker_fill));
            draw_number(
                &mut canvas,
                placement.number,
                placement.center,
                glyph_height,
                Rgb(self.settings.number_color),
            );
        }

        debug!(
            width,
            height,
            markers = markers.len(),
            start = start.is_some(),
            "composited annotations"
        );
        Ok(canvas)
    }

    /// Decode `bytes` and composite. Undecodable input is an error, never a blank image.
    pub fn composite_bytes(
        &self,
        bytes: &[u8],
        markers: &[Marker],
        start: Option<&StartConfig>,
    ) -> Result<RgbImage, EngineError> {
        let source = decode_oriented(bytes)?;
        self.composite(&source, markers, start)
    }

    pub fn encode_jpeg(&self, image: &RgbImage) -> Result<Vec<u8>, EngineError> {
        let mut bytes = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, self.settings.jpeg_quality);
        encoder
            .encode_image(image)
            .map_err(|e| EngineError::Encode(e.to_string()))?;
        Ok(bytes)
    }

    /// Full pipeline: decode, composite, JPEG-encode, wrap as a data URI.
    pub fn composite_to_data_uri(
        &self,
        bytes: &[u8],
        markers: &[Marker],
        start: Option<&StartConfig>,
    ) -> Result<String, EngineError> {
        let composited = self.composite_bytes(bytes, markers, start)?;
        let jpeg = self.encode_jpeg(&composited)?;
        Ok(to_data_uri("image/jpeg", &jpeg))
    }

    fn draw_start_arrow(&self, canvas: &mut RgbImage, start: &StartConfig, base: f32) {
        let (sx, sy) = PercentCoord::new(start.x, start.y).to_pixels(canvas.width(), canvas.height());
        let size = base * self.settings.arrow_size_ratio;
        let (sin, cos) = start.angle.to_radians().sin_cos();

        // Stroke is centred on the outline, half outside and half over the fill.
        let half_stroke = self.settings.arrow_outline_ratio / 2.0;
        let shape = |scale: f32| -> Vec<(f32, f32)> {
            ARROW_SHAPE
                .iter()
                .map(|&(x, y)| {
                    let (x, y) = (x * size * scale, y * size * scale);
                    (sx + x * cos - y * sin, sy + x * sin + y * cos)
                })
                .collect()
        };

        fill_polygon(canvas, &shape(1.0 + half_stroke), Rgb(self.settings.arrow_outline));
        fill_polygon(canvas, &shape(1.0 - half_stroke), Rgb(self.settings.arrow_fill));
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Compositor::new(CompositorSettings::default())
    }
}

/// Decode with the EXIF orientation applied, so the raster matches what the browser displayed.
fn decode_oriented(bytes: &[u8]) -> Result<DynamicImage, EngineError> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| EngineError::ImageDecode(e.to_string()))?
        .into_decoder()
        .map_err(|e| EngineError::ImageDecode(e.to_string()))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut image =
        DynamicImage::from_decoder(decoder).map_err(|e| EngineError::ImageDecode(e.to_string()))?;
    image.apply_orientation(orientation);
    Ok(image)
}

fn scale_base(width: u32, height: u32) -> f32 {
    width.max(height) as f32
}

/// Fill a polygon given in float pixels. Degenerate shapes (too small to
/// resolve at this resolution) are skipped.
fn fill_polygon(canvas: &mut RgbImage, points: &[(f32, f32)], color: Rgb<u8>) {
    let mut poly: Vec<Point<i32>> = Vec::with_capacity(points.len());
    for &(x, y) in points {
        let p = Point::new(x.round() as i32, y.round() as i32);
        if poly.last() != Some(&p) {
            poly.push(p);
        }
    }
    while poly.len() > 1 && poly.first() == poly.last() {
        poly.pop();
    }
    if poly.len() >= 3 {
        draw_polygon_mut(canvas, &poly, color);
    }
}

/// Draw `number` as bold seven-segment digits centred on `center`.
fn draw_number(
    canvas: &mut RgbImage,
    number: usize,
    center: (f32, f32),
    glyph_height: f32,
    color: Rgb<u8>,
) {
    let digits: Vec<usize> = number
        .to_string()
        .bytes()
        .map(|b| (b - b'0') as usize)
        .collect();

    let h = glyph_height.max(5.0);
    let w = h * 0.6;
    let t = (h * 0.18).max(1.0);
    let gap = t;
    let total_width = digits.len() as f32 * w + (digits.len() as f32 - 1.0) * gap;

    let mut left = center.0 - total_width / 2.0;
    let top = center.1 - h / 2.0;
    for digit in digits {
        draw_digit(canvas, digit, left, top, w, h, t, color);
        left += w + gap;
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_digit(
    canvas: &mut RgbImage,
    digit: usize,
    left: f32,
    top: f32,
    w: f32,
    h: f32,
    t: f32,
    color: Rgb<u8>,
) {
    let half = h / 2.0;
    // (x, y, width, height) relative to the glyph's top-left, segments a..g.
    let segments = [
        (0.0, 0.0, w, t),
        (w - t, 0.0, t, half),
        (w - t, half, t, half),
        (0.0, h - t, w, t),
        (0.0, half, t, half),
        (0.0, 0.0, t, half),
        (0.0, (h - t) / 2.0, w, t),
    ];

    let mask = DIGIT_SEGMENTS[digit % 10];
    for (bit, &(x, y, sw, sh)) in segments.iter().enumerate() {
        if mask & (1 << bit) == 0 {
            continue;
        }
        let rect = Rect::at((left + x).round() as i32, (top + y).round() as i32)
            .of_size(sw.round().max(1.0) as u32, sh.round().max(1.0) as u32);
        draw_filled_rect_mut(canvas, rect, color);
    }
}

/// `data:<mime>;base64,<payload>`
pub fn to_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(bytes))
}

/// Raw base64 payload of a data URI. Strings without a header pass through.
pub fn strip_data_uri(uri: &str) -> &str {
    match uri.split_once(',') {
        Some((header, payload)) if header.starts_with("data:") => payload,
        _ => uri,
    }
}
