//! Text rendering engine.
//!
//! Produces plain-text rules, banners and horizontal bar charts for
//! applications that narrate results through the log sink.

pub struct TextRenderer {
    width: usize,
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self::new(72)
    }
}

impl TextRenderer {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(16),
        }
    }

    pub fn rule(&self) -> String {
        "-".repeat(self.width)
    }

    /// A title over an underline of matching length.
    pub fn banner(&self, title: &str) -> Vec<String> {
        vec![title.to_string(), "-".repeat(title.chars().count())]
    }

    /// Horizontal bar chart, one labelled row per entry, scaled to the
    /// renderer width.
    pub fn bar_chart(&self, rows: &[(&str, f64)]) -> Vec<String> {
        let label_width = rows
            .iter()
            .map(|(label, _)| label.chars().count())
            .max()
            .unwrap_or(0);
        let peak = rows.iter().map(|(_, value)| *value).fold(0.0_f64, f64::max);
        let bar_space = self.width.saturating_sub(label_width + 12).max(8);
        rows.iter()
            .map(|(label, value)| {
                let filled = if peak > 0.0 {
                    ((value / peak) * bar_space as f64).round() as usize
                } else {
                    0
                };
                format!(
                    "{label:<label_width$} |{bar:<bar_space$}| {value:.2}",
                    bar = "#".repeat(filled.min(bar_space)),
                )
            })
            .collect()
    }

    pub fn dismiss(&mut self) {}
}
