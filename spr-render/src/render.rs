use std::sync::Arc;
use std::time::Duration;

use ab_glyph::FontVec;
use anyhow::{Result, ensure};
use spr_cache::{intern_all, intern_text, text_count};
use spr_experiment::Screen;
use spr_timing::Timer;
use tiny_skia::{Color, Pixmap, Rect};
use tracing::trace;

use crate::layout::{Layout, TextItem, TextSize};
use crate::text::TextCache;

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    pub clear: Duration,
    pub draw: Duration,
    pub copy: Duration,
    pub total: Duration,
    pub dirty_count: usize,
}

pub trait Renderer {
    fn clear_dirty(&mut self, dirty: &[Rect]);
    fn blit_text_by_intern_id(&mut self, intern_id: usize, size: TextSize, pos: (f32, f32));
}

/// Draws screens into an offscreen canvas and copies changed rectangles
/// into the window's frame buffer.
pub struct SkiaRenderer {
    width: u32,
    height: u32,

    text_cache: TextCache,

    canvas: Pixmap,
    dirty_regions: Vec<Rect>,
    first_frame: bool,
    clear_buffer: Vec<u8>,
}

fn opaque_black(width: u32, height: u32) -> Vec<u8> {
    [0u8, 0, 0, 255]
        .into_iter()
        .cycle()
        .take((width * height * 4) as usize)
        .collect()
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32, font: FontVec, base_px: f32) -> Result<Self> {
        let mut canvas = Pixmap::new(width, height)
            .ok_or_else(|| anyhow::anyhow!("invalid canvas size {width}x{height}"))?;
        canvas.fill(Color::BLACK);

        Ok(Self {
            width,
            height,
            text_cache: TextCache::new(font, base_px),
            canvas,
            dirty_regions: Vec::with_capacity(16),
            first_frame: true,
            clear_buffer: opaque_black(width, height),
        })
    }

    pub fn resize(&mut self, new_width: u32, new_height: u32) -> Result<()> {
        let mut canvas = Pixmap::new(new_width, new_height)
            .ok_or_else(|| anyhow::anyhow!("invalid canvas size {new_width}x{new_height}"))?;
        canvas.fill(Color::BLACK);
        self.canvas = canvas;
        self.width = new_width;
        self.height = new_height;
        self.clear_buffer = opaque_black(new_width, new_height);
        self.dirty_regions.clear();
        self.first_frame = true;
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Rasterizes texts ahead of their first display. Returns how many are
    /// now cached.
    pub fn prewarm<S: AsRef<str>>(&mut self, texts: &[S], size: TextSize) -> usize {
        intern_all(texts)
            .into_iter()
            .filter(|&id| self.text_cache.get_or_render(id, size).is_some())
            .count()
    }

    pub fn cached_texts(&self) -> usize {
        self.text_cache.len()
    }

    pub fn layout(&self, screen: &Screen<'_>, notice: Option<&str>) -> Vec<TextItem> {
        let cache = &self.text_cache;
        Layout::new(self.width, self.height, cache.base_px(), |s: &str, size: TextSize| {
            cache.measure(s, size)
        })
        .items(screen, notice)
    }

    fn clear_dirty_rects(&mut self, dirty: &[Rect]) {
        let stride = self.width as usize * 4;
        let canvas_data = self.canvas.data_mut();

        for rect in dirty {
            let Some((x0, y0, x1, y1)) = clamp_rect(rect, self.width, self.height) else {
                continue;
            };
            let row_len = (x1 - x0) * 4;
            for y in y0..y1 {
                let off = y * stride + x0 * 4;
                canvas_data[off..off + row_len]
                    .copy_from_slice(&self.clear_buffer[off..off + row_len]);
            }
        }
    }

    fn copy_dirty_region(&self, dirty: &Rect, frame_buffer: &mut [u8]) {
        let Some((x0, y0, x1, y1)) = clamp_rect(dirty, self.width, self.height) else {
            return;
        };
        let bytes = (x1 - x0) * 4;
        let row_bytes = self.width as usize * 4;
        let canvas_data = self.canvas.data();

        for row in y0..y1 {
            let off = row * row_bytes + x0 * 4;
            frame_buffer[off..off + bytes].copy_from_slice(&canvas_data[off..off + bytes]);
        }
    }

    fn coalesce_dirty(rects: &mut Vec<Rect>) {
        rects.sort_by(|a, b| a.y().total_cmp(&b.y()).then(a.x().total_cmp(&b.x())));
        let mut out: Vec<Rect> = Vec::with_capacity(rects.len());
        for r in rects.drain(..) {
            if let Some(last) = out.last_mut() {
                let same_row =
                    (r.y() - last.y()).abs() < 1.0 && (r.height() - last.height()).abs() < 1.0;
                let touching = r.x() <= last.x() + last.width() + 1.0;
                if same_row && touching {
                    let nx = last.x().min(r.x());
                    let nx2 = (last.x() + last.width()).max(r.x() + r.width());
                    if let Some(merged) = Rect::from_xywh(nx, last.y(), nx2 - nx, last.height()) {
                        *last = merged;
                        continue;
                    }
                }
            }
            out.push(r);
        }
        *rects = out;
    }

    fn blit_pixmap(&mut self, pixmap: &Pixmap, pos: (f32, f32)) {
        let w = pixmap.width() as i32;
        let h = pixmap.height() as i32;
        let x0 = (pos.0 - w as f32 * 0.5).floor() as i32;
        let y0 = (pos.1 - h as f32 * 0.5).floor() as i32;

        let dst_x = x0.max(0);
        let dst_y = y0.max(0);
        let dst_x_end = (x0 + w).min(self.width as i32);
        let dst_y_end = (y0 + h).min(self.height as i32);
        if dst_x_end <= dst_x || dst_y_end <= dst_y {
            return;
        }
        let (dst_x, dst_y) = (dst_x as usize, dst_y as usize);
        let copy_w = dst_x_end as usize - dst_x;
        let copy_h = dst_y_end as usize - dst_y;
        let src_x = (dst_x as i32 - x0) as usize;
        let src_y = (dst_y as i32 - y0) as usize;

        let src = pixmap.data();
        let src_stride = pixmap.width() as usize;
        let dst_stride = self.width as usize;
        let dst = self.canvas.data_mut();

        for row in 0..copy_h {
            for col in 0..copy_w {
                let s = ((src_y + row) * src_stride + src_x + col) * 4;
                let d = ((dst_y + row) * dst_stride + dst_x + col) * 4;
                let inv = 255 - src[s + 3] as u32;
                if inv == 255 {
                    continue;
                }
                for c in 0..4 {
                    dst[d + c] = (src[s + c] as u32 + (dst[d + c] as u32 * inv + 127) / 255) as u8;
                }
            }
        }

        if let Some(rect) =
            Rect::from_xywh(dst_x as f32, dst_y as f32, copy_w as f32, copy_h as f32)
        {
            self.dirty_regions.push(rect);
        }
    }

    fn draw_items(&mut self, items: &[TextItem]) {
        for item in items {
            let id = intern_text(&item.text);
            self.blit_text_by_intern_id(id, item.size, item.pos);
        }
    }

    /// Draws `screen` and copies the changed area into `frame_buffer`.
    pub fn render_frame<T: Timer>(
        &mut self,
        screen: &Screen<'_>,
        notice: Option<&str>,
        frame_buffer: &mut [u8],
        timer: &mut T,
    ) -> Result<FrameStats> {
        ensure!(
            frame_buffer.len() == self.clear_buffer.len(),
            "frame buffer is {} bytes, canvas is {}",
            frame_buffer.len(),
            self.clear_buffer.len()
        );
        if self.first_frame {
            self.first_frame = false;
            self.canvas.fill(Color::BLACK);
            frame_buffer.copy_from_slice(&self.clear_buffer);
            self.dirty_regions.clear();
        }

        let old_dirty = std::mem::take(&mut self.dirty_regions);

        let t = timer.now();
        self.clear_dirty_rects(&old_dirty);
        let clear = timer.elapsed(t);

        let t = timer.now();
        let items = self.layout(screen, notice);
        self.draw_items(&items);
        let draw = timer.elapsed(t);

        let mut present = old_dirty;
        present.extend_from_slice(&self.dirty_regions);
        Self::coalesce_dirty(&mut present);

        let t = timer.now();
        for rect in &present {
            self.copy_dirty_region(rect, frame_buffer);
        }
        let copy = timer.elapsed(t);

        let total = clear + draw + copy;
        timer.record_frame(total);
        trace!(?clear, ?draw, ?copy, rects = present.len(), "frame rendered");

        Ok(FrameStats {
            clear,
            draw,
            copy,
            total,
            dirty_count: self.dirty_regions.len(),
        })
    }
}

fn clamp_rect(rect: &Rect, width: u32, height: u32) -> Option<(usize, usize, usize, usize)> {
    let x0 = rect.x().floor().clamp(0.0, width as f32) as usize;
    let y0 = rect.y().floor().clamp(0.0, height as f32) as usize;
    let x1 = (rect.x() + rect.width()).ceil().clamp(0.0, width as f32) as usize;
    let y1 = (rect.y() + rect.height()).ceil().clamp(0.0, height as f32) as usize;
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
}

impl Renderer for SkiaRenderer {
    fn clear_dirty(&mut self, dirty: &[Rect]) {
        self.clear_dirty_rects(dirty);
    }

    fn blit_text_by_intern_id(&mut self, intern_id: usize, size: TextSize, pos: (f32, f32)) {
        if intern_id >= text_count() {
            return;
        }
        let Some(pixmap) = self.text_cache.get_or_render(intern_id, size) else {
            return;
        };
        self.blit_pixmap(Arc::as_ref(&pixmap), pos);
    }
}
