use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ab_glyph::{Font, FontVec, Glyph, PxScale, ScaleFont, point};
use anyhow::{Context, Result, anyhow};
use spr_cache::{Atom, get_atom};
use tiny_skia::{Color, Pixmap, PremultipliedColorU8};
use tracing::{debug, info};

use crate::layout::TextSize;

/// Fonts tried when none is configured. Hangul coverage first.
pub const FALLBACK_FONTS: &[&str] = &[
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/nanum/NanumGothic.ttf",
    "/System/Library/Fonts/AppleSDGothicNeo.ttc",
    "C:\\Windows\\Fonts\\malgun.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
];

pub fn load_font(path: &Path) -> Result<FontVec> {
    let bytes = std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
    let font = FontVec::try_from_vec(bytes)
        .map_err(|e| anyhow!("invalid font {}: {e}", path.display()))?;
    info!(path = %path.display(), "font loaded");
    Ok(font)
}

/// Loads `configured`, or the first available fallback font.
pub fn find_font(configured: Option<&Path>) -> Result<FontVec> {
    if let Some(path) = configured {
        return load_font(path);
    }
    let path = FALLBACK_FONTS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
        .ok_or_else(|| anyhow!("no usable font found; set font_path or SPR_FONT"))?;
    load_font(&path)
}

/// Advance width of `text` at `size_px`.
pub fn measure_text(font: &FontVec, text: &str, size_px: f32) -> f32 {
    let sf = font.as_scaled(PxScale::from(size_px));
    let mut width = 0.0;
    let mut prev = None;
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(p) = prev {
            width += sf.kern(p, id);
        }
        width += sf.h_advance(id);
        prev = Some(id);
    }
    width
}

/// Rasterizes one line of text into a tightly cropped, premultiplied pixmap.
pub fn render_text_pixmap(text: &str, font_size: f32, font: &FontVec, color: Color) -> Option<Pixmap> {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }

    let outlined: Vec<_> = glyphs
        .into_iter()
        .filter_map(|g| font.outline_glyph(g))
        .collect();
    let (min_x, min_y, max_x, max_y) = outlined.iter().map(|o| o.px_bounds()).fold(
        (f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        |(x0, y0, x1, y1), b| (x0.min(b.min.x), y0.min(b.min.y), x1.max(b.max.x), y1.max(b.max.y)),
    );
    if outlined.is_empty() {
        return None;
    }

    let w = (max_x.ceil() - min_x.floor()).max(1.0) as u32;
    let h = (max_y.ceil() - min_y.floor()).max(1.0) as u32;
    let mut pm = Pixmap::new(w, h)?;

    let stride = w as usize;
    let dst = pm.pixels_mut();
    let cu = color.to_color_u8();

    for out in &outlined {
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x - min_x).floor() as i32;
            let iy = (y as f32 + b.min.y - min_y).floor() as i32;
            if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            let a = (cov * cu.alpha() as f32 / 255.0).clamp(0.0, 1.0);
            let sa = (a * 255.0) as u8;
            let inv = 1.0 - a;
            let bg = dst[i];
            let r = ((cu.red() as f32 * a) as u8).saturating_add((bg.red() as f32 * inv) as u8);
            let g = ((cu.green() as f32 * a) as u8).saturating_add((bg.green() as f32 * inv) as u8);
            let bl = ((cu.blue() as f32 * a) as u8).saturating_add((bg.blue() as f32 * inv) as u8);
            let al = sa.saturating_add((bg.alpha() as f32 * inv) as u8);
            if let Some(px) = PremultipliedColorU8::from_rgba(r.min(al), g.min(al), bl.min(al), al) {
                dst[i] = px;
            }
        });
    }

    Some(pm)
}

/// Rendered lines keyed by intern id and size.
pub struct TextCache {
    font: FontVec,
    base_px: f32,
    color: Color,
    map: HashMap<(Atom, TextSize), Arc<Pixmap>>,
}

impl TextCache {
    pub fn new(font: FontVec, base_px: f32) -> Self {
        Self {
            font,
            base_px,
            color: Color::WHITE,
            map: HashMap::new(),
        }
    }

    pub fn font(&self) -> &FontVec {
        &self.font
    }

    pub fn base_px(&self) -> f32 {
        self.base_px
    }

    pub fn measure(&self, text: &str, size: TextSize) -> f32 {
        measure_text(&self.font, text, size.px(self.base_px))
    }

    /// `None` for unknown ids and texts without visible glyphs.
    pub fn get_or_render(&mut self, intern_id: usize, size: TextSize) -> Option<Arc<Pixmap>> {
        let atom = get_atom(intern_id)?;
        let key = (atom, size);
        if let Some(p) = self.map.get(&key) {
            return Some(Arc::clone(p));
        }
        let pm = Arc::new(render_text_pixmap(
            key.0.as_ref(),
            size.px(self.base_px),
            &self.font,
            self.color,
        )?);
        debug!(text = %key.0, ?size, w = pm.width(), h = pm.height(), "text rasterized");
        self.map.insert(key, Arc::clone(&pm));
        Some(pm)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
