//! Message body rendering.
//!
//! Message text is opaque to the stream layer; a [`Renderer`] turns it into
//! display markup. Rendering is best-effort: [`render_or_raw`] falls back to
//! the raw text on any failure so content is never lost.

use pulldown_cmark::{html, Options, Parser};
use thiserror::Error;
use tracing::warn;

use crate::config::RenderConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("content of {size} bytes exceeds render limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
}

/// Converts message text into display markup.
pub trait Renderer: Send {
    fn render(&self, text: &str) -> Result<String, RenderError>;
}

/// Markdown to HTML with tables and strikethrough enabled.
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    max_bytes: usize,
    options: Options,
}

impl MarkdownRenderer {
    pub fn new(max_bytes: usize) -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        MarkdownRenderer { max_bytes, options }
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new(RenderConfig::default().max_bytes)
    }
}

impl Renderer for MarkdownRenderer {
    fn render(&self, text: &str) -> Result<String, RenderError> {
        if text.len() > self.max_bytes {
            return Err(RenderError::TooLarge {
                size: text.len(),
                limit: self.max_bytes,
            });
        }
        let parser = Parser::new_ext(text, self.options);
        let mut out = String::with_capacity(text.len() * 3 / 2);
        html::push_html(&mut out, parser);
        Ok(out)
    }
}

/// Shows text verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainRenderer;

impl Renderer for PlainRenderer {
    fn render(&self, text: &str) -> Result<String, RenderError> {
        Ok(text.to_string())
    }
}

/// Build the renderer selected by configuration.
pub fn from_config(config: &RenderConfig) -> Box<dyn Renderer> {
    if config.markdown {
        Box::new(MarkdownRenderer::new(config.max_bytes))
    } else {
        Box::new(PlainRenderer)
    }
}

/// Render `text`, or return it unchanged if the renderer fails.
pub fn render_or_raw(renderer: &dyn Renderer, text: &str) -> String {
    match renderer.render(text) {
        Ok(markup) => markup,
        Err(e) => {
            warn!(error = %e, "rendering failed, showing raw text");
            text.to_string()
        }
    }
}
