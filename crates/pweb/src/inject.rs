//! Builders for `<style>` and `<script>` fragments injected into HTML pages.
//!
//! Fragments are plain strings. They are prepended to the page as bytes, no
//! HTML parsing is involved.

use std::fmt::{Display, Write as _};

/// A `<style>` element.
///
/// ```
/// use pweb::inject::StyleBlock;
///
/// let html = StyleBlock::new()
///     .rule("body", [("background", "pink")], false)
///     .hide("#ads")
///     .html();
/// assert!(html.starts_with("<style>"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleBlock {
    css: String,
}

impl StyleBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append CSS text as is.
    pub fn raw(mut self, css: &str) -> Self {
        self.css.push_str(css);
        self
    }

    /// Append `selector { prop: value; ... }`, optionally marking every
    /// declaration `!important`.
    pub fn rule<I, K, V>(mut self, selector: &str, props: I, important: bool) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Display,
        V: Display,
    {
        let suffix = if important { " !important" } else { "" };
        let _ = write!(self.css, "\n{selector}{{");
        for (key, value) in props {
            let _ = write!(self.css, "{key}:{value}{suffix};");
        }
        self.css.push_str("}\n");
        self
    }

    /// Collapse and hide every element matching `selector`.
    pub fn hide(self, selector: &str) -> Self {
        self.rule(
            selector,
            [
                ("opacity", "0"),
                ("display", "none"),
                ("height", "0px"),
                ("width", "0px"),
            ],
            true,
        )
    }

    pub fn html(&self) -> String {
        format!("<style>{}</style>", self.css)
    }
}

/// A `<script>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptBlock {
    code: String,
    module: bool,
    iife: bool,
}

impl ScriptBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(mut self, code: &str) -> Self {
        self.code.push_str(code);
        self
    }

    /// Emit `<script type="module">`.
    pub fn module(mut self, module: bool) -> Self {
        self.module = module;
        self
    }

    /// Wrap the code in `((window) => { ... })(window);`.
    pub fn iife(mut self, iife: bool) -> Self {
        self.iife = iife;
        self
    }

    pub fn html(&self) -> String {
        let open = if self.module {
            r#"<script type="module">"#
        } else {
            "<script>"
        };
        if self.iife {
            format!("{open}((window)=>{{\n{}\n}})(window);</script>", self.code)
        } else {
            format!("{open}{}</script>", self.code)
        }
    }
}
