use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, RgbaImage};
use resvg::render;
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::Pixmap;
use usvg::{Options, Tree, fontdb};

use crate::settings::OverlaySettings;

use super::BBoxPx;

const LINE_X: f32 = 10.0;
const FIRST_BASELINE: f32 = 30.0;
const MAX_LINE_CHARS: usize = 160;

#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub text_color: String,
    pub box_color: String,
    pub font_size: f32,
    pub font_family: String,
}

impl OverlayStyle {
    pub fn from_settings(settings: &OverlaySettings) -> Self {
        Self {
            text_color: settings.text_color.clone(),
            box_color: settings.box_color.clone(),
            font_size: settings.font_size,
            font_family: settings.font_family.clone(),
        }
    }
}

/// Draws caption lines and token boxes on top of camera frames.
///
/// The font database is built once and shared across frames.
#[derive(Clone)]
pub struct OverlayRenderer {
    style: OverlayStyle,
    fontdb: Arc<fontdb::Database>,
}

impl OverlayRenderer {
    pub fn new(settings: &OverlaySettings) -> Result<Self> {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        if let Some(path) = settings.font_path.as_deref() {
            db.load_font_file(path)
                .with_context(|| format!("failed to load overlay font: {}", path.display()))?;
        }
        Ok(Self::with_fontdb(OverlayStyle::from_settings(settings), db))
    }

    pub fn with_fontdb(style: OverlayStyle, db: fontdb::Database) -> Self {
        Self {
            style,
            fontdb: Arc::new(db),
        }
    }

    /// Composites the overlay onto `frame` and returns the result as PNG bytes.
    pub fn render_png(
        &self,
        frame: &DynamicImage,
        lines: &[String],
        boxes: &[BBoxPx],
    ) -> Result<Vec<u8>> {
        let mut canvas = frame.to_rgba8();
        let (width, height) = canvas.dimensions();
        let svg = overlay_svg(width, height, lines, boxes, &self.style);
        let layer = self.rasterize(&svg)?;
        image::imageops::overlay(&mut canvas, &layer, 0, 0);

        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(canvas)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .with_context(|| "failed to encode overlay frame")?;
        Ok(bytes)
    }

    fn rasterize(&self, svg: &str) -> Result<RgbaImage> {
        let options = Options {
            fontdb: self.fontdb.clone(),
            ..Options::default()
        };
        let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse overlay SVG")?;
        let size = tree.size().to_int_size();
        let mut pixmap = Pixmap::new(size.width(), size.height())
            .ok_or_else(|| anyhow!("empty SVG size"))?;
        render(
            &tree,
            tiny_skia::Transform::identity(),
            &mut pixmap.as_mut(),
        );

        // tiny-skia stores premultiplied alpha; image expects straight alpha
        let mut data = Vec::with_capacity(pixmap.data().len());
        for pixel in pixmap.pixels() {
            let color = pixel.demultiply();
            data.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
        }
        RgbaImage::from_raw(size.width(), size.height(), data)
            .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))
    }
}

/// Builds a transparent SVG layer of `width`x`height` with one outlined
/// rectangle per box and the caption lines stacked from the top-left corner.
fn overlay_svg(
    width: u32,
    height: u32,
    lines: &[String],
    boxes: &[BBoxPx],
    style: &OverlayStyle,
) -> String {
    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    for bbox in boxes {
        svg.push_str(&format!(
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" stroke="{color}" stroke-width="2"/>"#,
            x = bbox.x,
            y = bbox.y,
            w = bbox.w,
            h = bbox.h,
            color = escape_xml(&style.box_color)
        ));
    }
    let line_height = style.font_size * 1.5;
    for (idx, line) in lines.iter().enumerate() {
        let y = FIRST_BASELINE + idx as f32 * line_height;
        svg.push_str(&format!(
            r##"<text x="{x}" y="{y:.1}" font-family="{family}" font-size="{size:.1}" fill="{fill}" stroke="#000000" stroke-width="3" paint-order="stroke">{text}</text>"##,
            x = LINE_X,
            y = y,
            family = escape_xml(&style.font_family),
            size = style.font_size,
            fill = escape_xml(&style.text_color),
            text = escape_xml(&clip_line(line))
        ));
    }
    svg.push_str("</svg>");
    svg
}

fn clip_line(line: &str) -> String {
    let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_LINE_CHARS {
        return collapsed;
    }
    let mut clipped = collapsed.chars().take(MAX_LINE_CHARS).collect::<String>();
    clipped.push('…');
    clipped
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
