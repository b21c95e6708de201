pub mod layout;
pub mod render;
pub mod text;

pub use layout::{Layout, TextItem, TextSize, wrap_words};
pub use render::{FrameStats, Renderer, SkiaRenderer};
pub use text::{TextCache, find_font, load_font, measure_text, render_text_pixmap};
