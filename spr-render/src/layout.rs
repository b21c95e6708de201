//! Placement of screen texts, independent of any font or canvas.

use spr_experiment::Screen;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextSize {
    Small,
    Body,
    Large,
}

impl TextSize {
    /// Pixel size for a base (region) font size.
    pub fn px(self, base: f32) -> f32 {
        match self {
            Self::Small => (base * 0.55).round(),
            Self::Body => (base * 0.7).round(),
            Self::Large => base.round(),
        }
    }
}

/// One line of text centred on `pos`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub text: String,
    pub size: TextSize,
    pub pos: (f32, f32),
}

impl TextItem {
    fn new(text: impl Into<String>, size: TextSize, pos: (f32, f32)) -> Self {
        Self {
            text: text.into(),
            size,
            pos,
        }
    }
}

/// Greedy word wrap. A word wider than `max_width` gets a line of its own.
pub fn wrap_words<F>(text: &str, max_width: f32, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            if line.is_empty() {
                line.push_str(word);
                continue;
            }
            let candidate = format!("{line} {word}");
            if measure(&candidate) <= max_width {
                line = candidate;
            } else {
                lines.push(std::mem::replace(&mut line, word.to_string()));
            }
        }
        lines.push(line);
    }
    lines
}

pub struct Layout<F> {
    pub width: f32,
    pub height: f32,
    pub line_height: f32,
    pub measure: F,
}

impl<F> Layout<F>
where
    F: Fn(&str, TextSize) -> f32,
{
    pub fn new(width: u32, height: u32, base_px: f32, measure: F) -> Self {
        Self {
            width: width as f32,
            height: height as f32,
            line_height: TextSize::Body.px(base_px) * 1.5,
            measure,
        }
    }

    fn center(&self) -> (f32, f32) {
        (self.width * 0.5, self.height * 0.5)
    }

    fn block(&self, text: &str, size: TextSize, top: f32, out: &mut Vec<TextItem>) -> f32 {
        let max_width = self.width * 0.8;
        let mut y = top;
        for line in wrap_words(text, max_width, |s| (self.measure)(s, size)) {
            if !line.is_empty() {
                out.push(TextItem::new(line, size, (self.width * 0.5, y)));
            }
            y += self.line_height;
        }
        y
    }

    /// Texts to draw for `screen`. A `notice` replaces the empty final screen.
    pub fn items(&self, screen: &Screen<'_>, notice: Option<&str>) -> Vec<TextItem> {
        let (cx, cy) = self.center();
        let footer = self.height - self.line_height * 2.0;
        let mut out = Vec::new();
        match screen {
            Screen::Region {
                text,
                instruction,
                progress,
            } => {
                out.push(TextItem::new(*text, TextSize::Large, (cx, cy)));
                self.block(instruction, TextSize::Small, footer, &mut out);
                if let Some((current, total)) = progress {
                    out.push(TextItem::new(
                        format!("{current} / {total}"),
                        TextSize::Small,
                        (self.width - 80.0, 40.0),
                    ));
                }
            }
            Screen::Rating {
                question,
                stimulus,
                scale,
            } => {
                let below = self.block(stimulus, TextSize::Large, cy - 2.0 * self.line_height, &mut out);
                let below = self.block(question, TextSize::Body, below + self.line_height * 0.5, &mut out);
                let labels: Vec<String> = (1..=*scale).map(|d| d.to_string()).collect();
                out.push(TextItem::new(
                    labels.join("     "),
                    TextSize::Body,
                    (cx, below + self.line_height),
                ));
            }
            Screen::Message { title, body, hint } => {
                let below = self.block(title, TextSize::Large, self.height * 0.25, &mut out);
                self.block(body, TextSize::Body, below + self.line_height, &mut out);
                self.block(hint, TextSize::Small, footer, &mut out);
            }
            Screen::Passage { title, body } => {
                let below = self.block(title, TextSize::Large, self.height * 0.12, &mut out);
                self.block(body, TextSize::Body, below + self.line_height * 0.5, &mut out);
            }
            Screen::Recall {
                title,
                body,
                prompt,
                text,
                ready,
                ready_hint,
            } => {
                let below = self.block(title, TextSize::Large, self.height * 0.12, &mut out);
                let below = self.block(body, TextSize::Body, below + self.line_height * 0.5, &mut out);
                let below = self.block(prompt, TextSize::Body, below + self.line_height * 0.5, &mut out);
                let entry = format!("{text}_");
                self.block(&entry, TextSize::Body, below + self.line_height * 0.5, &mut out);
                if *ready {
                    self.block(ready_hint, TextSize::Small, footer, &mut out);
                }
            }
            Screen::Finished => {
                if let Some(notice) = notice {
                    self.block(notice, TextSize::Body, cy - self.line_height, &mut out);
                }
            }
            Screen::Blank => {}
        }
        out
    }
}
