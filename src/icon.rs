//! Icon compositing: base image plus an optional corner badge.
//!
//! [`Icon`] owns an RGBA canvas and badge metadata. Rendering always copies
//! the canvas before drawing, so the unbadged base stays intact for reuse
//! across redraws. The badge itself is rasterized from generated SVG (a
//! filled circle with centered text), which keeps color handling to standard
//! CSS color strings.

use std::io::Cursor;
use std::sync::{Arc, OnceLock};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage, imageops};
use palette::{Hsl, IntoColor, Srgb};
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{Options, Tree, fontdb};
use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::settings::ImageEffect;

/// The default height and width of an icon (icons are square).
pub const ICON_SIZE: u32 = 144;
/// The default radius of the badge circle.
pub const DEFAULT_BADGE_RADIUS: u32 = 25;
/// The amount of padding between the icon edge and the badge.
pub const BADGE_PADDING: u32 = 10;

const DEFAULT_BADGE_COLOR: &str = "red";
const DEFAULT_TEXT_COLOR: &str = "white";
const DEFAULT_FONT_SIZE: u32 = 32;
const DEFAULT_FONT_FAMILY: &str = "Helvetica, Arial, sans-serif";

// ============================================================================
// BadgePosition
// ============================================================================

/// The corner of the icon where a badge is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BadgePosition {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
}

// ============================================================================
// BadgeOptions
// ============================================================================

/// Options for drawing the badge on the icon; only a value is required.
///
/// Every other field falls back to a default when absent: red fill, white
/// text, top-right corner, radius [`DEFAULT_BADGE_RADIUS`], 32px text in a
/// Helvetica stack.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BadgeOptions {
    /// The text displayed inside the badge.
    pub value: String,
    /// Badge fill color (CSS color string).
    pub color: Option<String>,
    /// Text color (CSS color string).
    pub text_color: Option<String>,
    /// Corner where the badge is drawn.
    pub position: Option<BadgePosition>,
    /// Radius of the badge circle.
    pub radius: Option<u32>,
    /// Font size for the badge text.
    pub font_size: Option<u32>,
    /// Font family for the badge text.
    pub font_family: Option<String>,
}

impl BadgeOptions {
    /// Creates badge options with the given value and all defaults.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }
}

/// Computes the center of a badge circle for the given corner.
///
/// Left/top corners measure `padding + radius` in from their edges;
/// right/bottom corners measure the same distance back from the far edges.
pub fn badge_center(position: BadgePosition, radius: u32, width: u32, height: u32) -> (u32, u32) {
    let near = BADGE_PADDING + radius;
    let x = match position {
        BadgePosition::TopLeft | BadgePosition::BottomLeft => near,
        BadgePosition::TopRight | BadgePosition::BottomRight => {
            width.saturating_sub(BADGE_PADDING + radius)
        }
    };
    let y = match position {
        BadgePosition::TopLeft | BadgePosition::TopRight => near,
        BadgePosition::BottomLeft | BadgePosition::BottomRight => {
            height.saturating_sub(BADGE_PADDING + radius)
        }
    };
    (x, y)
}

// ============================================================================
// Icon
// ============================================================================

/// Composes an action icon from a base image, an optional whole-image
/// effect, and an optional corner badge.
///
/// # Example
///
/// ```no_run
/// use deckwatch::{BadgeOptions, Icon, ImageEffect};
///
/// # async fn compose() -> Result<(), deckwatch::RenderError> {
/// let mut icon = Icon::new();
/// icon.add_image("images/status.png", 0, 0, Some(144), Some(144), ImageEffect::None)
///     .await?;
/// icon.set_badge(BadgeOptions::new("5"));
/// let data_uri = icon.render_data_uri()?;
/// # Ok(())
/// # }
/// ```
pub struct Icon {
    /// The base canvas. Never mutated by rendering.
    canvas: RgbaImage,
    /// Options for the optional corner badge.
    badge: Option<BadgeOptions>,
    /// Whole-image effect applied to rendered output.
    effect: ImageEffect,
}

impl Default for Icon {
    fn default() -> Self {
        Self::new()
    }
}

impl Icon {
    /// Creates an empty transparent icon at the default size.
    pub fn new() -> Self {
        Self::with_size(ICON_SIZE, ICON_SIZE)
    }

    /// Creates an empty transparent icon with the given dimensions.
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::new(width, height),
            badge: None,
            effect: ImageEffect::None,
        }
    }

    /// Returns the canvas dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.canvas.width(), self.canvas.height())
    }

    /// Loads an image and draws it onto the canvas at `(x, y)`.
    ///
    /// `source` is either a `data:` URI with a base64 payload or a
    /// filesystem path. When `width`/`height` are given the image is resized
    /// to exactly those dimensions first. The `effect` is stored and applied
    /// to rendered output, leaving the canvas itself untouched.
    ///
    /// The returned future must complete before any further compositing;
    /// one base image per icon.
    pub async fn add_image(
        &mut self,
        source: &str,
        x: i32,
        y: i32,
        width: Option<u32>,
        height: Option<u32>,
        effect: ImageEffect,
    ) -> Result<&mut Self, RenderError> {
        let bytes = load_image_bytes(source).await?;
        let mut img = image::load_from_memory(&bytes)?.to_rgba8();

        let target_w = width.unwrap_or(img.width());
        let target_h = height.unwrap_or(img.height());
        if (target_w, target_h) != (img.width(), img.height()) {
            img = imageops::resize(&img, target_w, target_h, imageops::FilterType::Triangle);
        }

        composite_over(&mut self.canvas, &img, x, y);
        self.effect = effect;
        Ok(self)
    }

    /// Sets parameters to use when drawing a badge. Metadata only; no
    /// rendering happens until [`render`](Self::render).
    pub fn set_badge(&mut self, options: BadgeOptions) -> &mut Self {
        self.badge = Some(options);
        self
    }

    /// Removes the current badge.
    pub fn clear_badge(&mut self) -> &mut Self {
        self.badge = None;
        self
    }

    /// Returns the current badge options, if any.
    pub fn badge(&self) -> Option<&BadgeOptions> {
        self.badge.as_ref()
    }

    /// Renders a bitmap of the icon.
    ///
    /// The canvas is copied first, the whole-image effect is applied to the
    /// copy, and the badge is drawn on top. The badge is skipped entirely
    /// when its value is empty or literally `"0"`.
    pub fn render(&self) -> RgbaImage {
        let mut out = self.canvas.clone();

        if self.effect == ImageEffect::Desaturate {
            desaturate(&mut out);
        }

        if let Some(badge) = &self.badge
            && !badge.value.is_empty()
            && badge.value != "0"
        {
            draw_badge(&mut out, badge);
        }

        out
    }

    /// Renders the icon and encodes it as a PNG data URI.
    pub fn render_data_uri(&self) -> Result<String, RenderError> {
        let rendered = self.render();
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(rendered).write_to(&mut buf, ImageFormat::Png)?;
        Ok(format!(
            "data:image/png;base64,{}",
            STANDARD.encode(buf.into_inner())
        ))
    }
}

// ============================================================================
// Image Loading
// ============================================================================

/// Reads raw image bytes from a `data:` URI or a filesystem path.
async fn load_image_bytes(source: &str) -> Result<Vec<u8>, RenderError> {
    if let Some(rest) = source.strip_prefix("data:") {
        let (header, payload) = rest.split_once(',').ok_or(RenderError::InvalidDataUri)?;
        if !header.ends_with(";base64") {
            return Err(RenderError::InvalidDataUri);
        }
        Ok(STANDARD.decode(payload.trim())?)
    } else {
        Ok(tokio::fs::read(source).await?)
    }
}

// ============================================================================
// Badge Drawing
// ============================================================================

/// Draws a badge onto the canvas.
fn draw_badge(canvas: &mut RgbaImage, options: &BadgeOptions) {
    let radius = options.radius.unwrap_or(DEFAULT_BADGE_RADIUS);
    let position = options.position.unwrap_or_default();
    let (cx, cy) = badge_center(position, radius, canvas.width(), canvas.height());

    let color = options.color.as_deref().unwrap_or(DEFAULT_BADGE_COLOR);
    let text_color = options.text_color.as_deref().unwrap_or(DEFAULT_TEXT_COLOR);
    let font_size = options.font_size.unwrap_or(DEFAULT_FONT_SIZE);
    let font_family = options.font_family.as_deref().unwrap_or(DEFAULT_FONT_FAMILY);

    let svg = format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            r#"<circle cx="{cx}" cy="{cy}" r="{r}" fill="{color}"/>"#,
            r#"<text x="{cx}" y="{cy}" fill="{text_color}" font-size="{size}" font-family="{family}" "#,
            r#"text-anchor="middle" dominant-baseline="central">{value}</text>"#,
            r#"</svg>"#
        ),
        w = canvas.width(),
        h = canvas.height(),
        cx = cx,
        cy = cy,
        r = radius,
        color = xml_escape(color),
        text_color = xml_escape(text_color),
        size = font_size,
        family = xml_escape(font_family),
        value = xml_escape(&options.value),
    );

    if let Some(overlay) = rasterize_svg(&svg, canvas.width(), canvas.height()) {
        composite_over(canvas, &overlay, 0, 0);
    }
}

/// Escapes text for embedding in an SVG document.
fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Returns the shared font database used for badge text.
fn shared_fontdb() -> Arc<fontdb::Database> {
    static FONTDB: OnceLock<Arc<fontdb::Database>> = OnceLock::new();
    FONTDB
        .get_or_init(|| {
            let mut db = fontdb::Database::new();
            db.load_system_fonts();
            Arc::new(db)
        })
        .clone()
}

/// Rasterizes an SVG string onto a transparent `width` x `height` surface.
///
/// Returns `None` if the SVG cannot be parsed or the surface cannot be
/// allocated.
fn rasterize_svg(svg: &str, width: u32, height: u32) -> Option<RgbaImage> {
    let mut opts = Options::default();
    opts.fontdb = shared_fontdb();
    let tree = Tree::from_str(svg, &opts).ok()?;

    let mut pixmap = Pixmap::new(width, height)?;
    resvg::render(&tree, Transform::identity(), &mut pixmap.as_mut());

    Some(pixmap_to_rgba_image(&pixmap))
}

/// Converts a tiny_skia Pixmap to an image::RgbaImage.
fn pixmap_to_rgba_image(pixmap: &Pixmap) -> RgbaImage {
    let width = pixmap.width();
    let height = pixmap.height();
    let mut img = RgbaImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let pixel = pixmap.pixel(x, y).unwrap();
            // tiny_skia uses premultiplied alpha, we need to unpremultiply
            let (r, g, b, a) =
                unpremultiply(pixel.red(), pixel.green(), pixel.blue(), pixel.alpha());
            img.put_pixel(x, y, Rgba([r, g, b, a]));
        }
    }

    img
}

/// Unpremultiplies a premultiplied alpha pixel.
fn unpremultiply(r: u8, g: u8, b: u8, a: u8) -> (u8, u8, u8, u8) {
    if a == 0 {
        (0, 0, 0, 0)
    } else {
        let a_f = a as f32 / 255.0;
        (
            (r as f32 / a_f).round().min(255.0) as u8,
            (g as f32 / a_f).round().min(255.0) as u8,
            (b as f32 / a_f).round().min(255.0) as u8,
            a,
        )
    }
}

// ============================================================================
// Compositing
// ============================================================================

/// Composites a source image onto a destination image at the specified
/// position, using standard alpha blending (source over destination).
fn composite_over(dest: &mut RgbaImage, src: &RgbaImage, x: i32, y: i32) {
    let dest_width = dest.width() as i32;
    let dest_height = dest.height() as i32;

    for sy in 0..src.height() {
        for sx in 0..src.width() {
            let dx = x + sx as i32;
            let dy = y + sy as i32;

            // Skip if outside destination bounds
            if dx < 0 || dy < 0 || dx >= dest_width || dy >= dest_height {
                continue;
            }

            let src_pixel = src.get_pixel(sx, sy);
            let dst_pixel = dest.get_pixel(dx as u32, dy as u32);

            let blended = alpha_blend(*src_pixel, *dst_pixel);
            dest.put_pixel(dx as u32, dy as u32, blended);
        }
    }
}

/// Alpha blends two RGBA pixels (source over destination).
fn alpha_blend(src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;

    let out_a = sa + da * (1.0 - sa);

    if out_a == 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend = |s: u8, d: u8| -> u8 {
        let sf = s as f32 / 255.0;
        let df = d as f32 / 255.0;
        let out = (sf * sa + df * da * (1.0 - sa)) / out_a;
        (out * 255.0).round() as u8
    };

    Rgba([
        blend(src[0], dst[0]),
        blend(src[1], dst[1]),
        blend(src[2], dst[2]),
        (out_a * 255.0).round() as u8,
    ])
}

// ============================================================================
// Effects
// ============================================================================

/// Desaturates an image in place, preserving lightness and alpha.
fn desaturate(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        if a == 0 {
            continue; // Skip fully transparent pixels
        }

        let rgb = Srgb::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
        let mut hsl: Hsl = rgb.into_color();
        hsl.saturation = 0.0;
        let gray: Srgb = hsl.into_color();

        pixel.0 = [
            (gray.red * 255.0).round() as u8,
            (gray.green * 255.0).round() as u8,
            (gray.blue * 255.0).round() as u8,
            a,
        ];
    }
}

// ============================================================================
// Tests
// ============================================================================
