//! Minimal XML writer for ClickHouse configuration files

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::settings::{Setting, Settings};

/// Root element of every generated file
pub const ROOT_ELEMENT: &str = "yandex";

const INDENT: &str = "    ";

/// Escape XML special characters
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// Indenting element writer
#[derive(Debug, Default)]
pub struct XmlWriter {
    buf: String,
    depth: usize,
}

impl XmlWriter {
    /// Start a document with the `<yandex>` root open
    pub fn document() -> Self {
        let mut w = Self::default();
        w.open(ROOT_ELEMENT);
        w
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.buf.push_str(INDENT);
        }
    }

    /// Open an element
    pub fn open(&mut self, tag: &str) -> &mut Self {
        self.indent();
        let _ = writeln!(self.buf, "<{tag}>");
        self.depth += 1;
        self
    }

    /// Open an element with one attribute
    pub fn open_with(&mut self, tag: &str, attr: &str, value: &str) -> &mut Self {
        self.indent();
        let _ = writeln!(self.buf, "<{tag} {attr}=\"{}\">", escape(value));
        self.depth += 1;
        self
    }

    /// Close an element
    pub fn close(&mut self, tag: &str) -> &mut Self {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        let _ = writeln!(self.buf, "</{tag}>");
        self
    }

    /// Write `<tag>value</tag>`
    pub fn element(&mut self, tag: &str, value: impl std::fmt::Display) -> &mut Self {
        self.indent();
        let _ = writeln!(self.buf, "<{tag}>{}</{tag}>", escape(&value.to_string()));
        self
    }

    /// Write settings as nested elements
    pub fn settings(&mut self, settings: &Settings) -> &mut Self {
        let mut root = Node::default();
        for (path, setting) in settings.iter() {
            root.insert(path.split('/'), setting);
        }
        root.write_children(self);
        self
    }

    /// Close the root and return the document
    pub fn finish(mut self) -> String {
        self.depth = 1;
        self.close(ROOT_ELEMENT);
        self.buf
    }
}

/// Path tree built from `/`-separated settings keys
#[derive(Default)]
struct Node<'a> {
    value: Option<&'a Setting>,
    children: BTreeMap<&'a str, Node<'a>>,
}

impl<'a> Node<'a> {
    fn insert(&mut self, mut segments: impl Iterator<Item = &'a str>, setting: &'a Setting) {
        match segments.next() {
            Some(segment) => self
                .children
                .entry(segment)
                .or_default()
                .insert(segments, setting),
            None => self.value = Some(setting),
        }
    }

    fn write_children(&self, w: &mut XmlWriter) {
        for (tag, child) in &self.children {
            child.write(tag, w);
        }
    }

    fn write(&self, tag: &str, w: &mut XmlWriter) {
        match self.value {
            Some(Setting::Scalar(value)) if self.children.is_empty() => {
                w.element(tag, value);
            }
            Some(Setting::Vector(values)) if self.children.is_empty() => {
                for value in values {
                    w.element(tag, value);
                }
            }
            _ => {
                w.open(tag);
                self.write_children(w);
                w.close(tag);
            }
        }
    }
}
