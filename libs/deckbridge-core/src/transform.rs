//! Markup transformation from notes-store markdown to flashcard HTML.
//!
//! Rewriting happens on raw markdown, before rendering, so the renderer never
//! sees the block-reference syntax it would otherwise mangle:
//!
//! 1. relative asset paths become absolute URLs on the notes backend
//! 2. block references `((id 'label'))` become deep links
//! 3. inline attribute lists `{: …}` are dropped
//! 4. the result is rendered to HTML and math spans get MathJax delimiters

use pulldown_cmark::{html, Options, Parser};
use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::types::FlashcardRecord;

static ASSET_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\((assets/[\w-]*\d{14}-[0-9a-zA-Z]{7}\.\w+)\)").expect("asset regex")
});

static BLOCK_REF_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\\?\(\((\d{14}-[0-9a-zA-Z]{7}) ['"]([^'"]+)['"]\)\)"#).expect("block ref regex")
});

static IAL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{:[^}]*"\}"#).expect("ial regex"));

static INLINE_MATH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<span class="math math-inline">(.*?)</span>"#).expect("inline math regex")
});

static DISPLAY_MATH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<span class="math math-display">(.*?)</span>"#).expect("display math regex")
});

/// Renders markdown into the flashcard backend's rich text.
pub trait MarkupRenderer: Send + Sync {
    fn render(&self, markup: &str) -> String;
}

/// CommonMark renderer with the extensions the notes store emits.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonMarkRenderer;

impl MarkupRenderer for CommonMarkRenderer {
    fn render(&self, markup: &str) -> String {
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_MATH;
        let parser = Parser::new_ext(markup, options);
        let mut output = String::with_capacity(markup.len() * 3 / 2);
        html::push_html(&mut output, parser);
        output
    }
}

/// Settings for link rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOptions {
    /// Base address of the notes backend, e.g. `http://127.0.0.1:6806`.
    pub asset_base_url: String,
    /// Scheme of block deep links, e.g. `siyuan` for `siyuan://blocks/<id>`.
    pub link_scheme: String,
}

/// Markdown to flashcard HTML pipeline.
pub struct Transformer<R = CommonMarkRenderer> {
    options: TransformOptions,
    renderer: R,
}

impl Transformer<CommonMarkRenderer> {
    pub fn new(options: TransformOptions) -> Self {
        Self::with_renderer(options, CommonMarkRenderer)
    }
}

impl<R: MarkupRenderer> Transformer<R> {
    pub fn with_renderer(mut options: TransformOptions, renderer: R) -> Self {
        options.asset_base_url = options.asset_base_url.trim_end_matches('/').to_string();
        Self { options, renderer }
    }

    /// Rewrite asset paths, block references and attribute lists in raw
    /// markdown, without rendering.
    pub fn rewrite(&self, markup: &str) -> String {
        let with_assets = ASSET_REGEX.replace_all(markup, |caps: &Captures| {
            format!("({}/{})", self.options.asset_base_url, &caps[1])
        });

        let with_links = BLOCK_REF_REGEX.replace_all(&with_assets, |caps: &Captures| {
            let whole = &caps[0];
            if whole.starts_with('\\') {
                return whole.to_string();
            }
            format!(
                "[{}]({}://blocks/{}?focus=1)",
                &caps[2], self.options.link_scheme, &caps[1]
            )
        });

        IAL_REGEX.replace_all(&with_links, "").into_owned()
    }

    /// Full pipeline: rewrite, render, then convert math spans.
    pub fn transform(&self, markup: &str) -> String {
        let rendered = self.renderer.render(&self.rewrite(markup));
        let inline = INLINE_MATH_REGEX.replace_all(&rendered, r"\(${1}\)");
        DISPLAY_MATH_REGEX
            .replace_all(&inline, r"\[${1}\]")
            .into_owned()
    }

    /// Replace a record's front and back markup with rendered HTML.
    pub fn transform_record(&self, record: &mut FlashcardRecord) {
        record.front = self.transform(&record.front);
        record.back = self.transform(&record.back);
    }
}
