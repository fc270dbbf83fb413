//! Template splitting: one source file into fence, markup, script and style.

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::ops::Range;
use thiserror::Error;

lazy_static! {
    static ref FENCE_LINE_RE: Regex = Regex::new(r"(?m)^[ \t]*---[ \t]*\r?$").unwrap();
    static ref SCRIPT_RE: Regex = Regex::new(r"(?is)<script\s*>(.*?)</script\s*>").unwrap();
    static ref STYLE_RE: Regex = Regex::new(r"(?is)<style\s*>(.*?)</style\s*>").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    Fence,
    Script,
    Style,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Block::Fence => write!(f, "fence (---)"),
            Block::Script => write!(f, "<script>"),
            Block::Style => write!(f, "<style>"),
        }
    }
}

/// A source may hold at most one block of each kind.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("only one {block} block is allowed per template (second one at byte {offset})")]
pub struct FormatError {
    pub block: Block,
    pub offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segments {
    pub fence: String,
    pub markup: String,
    pub script: String,
    pub style: String,
}

impl Segments {
    /// Reassembles a source text that splits back into these segments.
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        if !self.fence.is_empty() {
            out.push_str("---\n");
            out.push_str(&self.fence);
            if !self.fence.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("---\n");
        }
        out.push_str(&self.markup);
        if !self.script.is_empty() {
            out.push_str("<script>");
            out.push_str(&self.script);
            out.push_str("</script>");
        }
        if !self.style.is_empty() {
            out.push_str("<style>");
            out.push_str(&self.style);
            out.push_str("</style>");
        }
        out
    }
}

pub fn split(source: &str) -> Result<Segments, FormatError> {
    let mut segments = Segments::default();
    let mut removed: Vec<Range<usize>> = Vec::new();

    // Fence: the first two delimiter lines; a third opens a second fence.
    let delimiters: Vec<Range<usize>> = FENCE_LINE_RE.find_iter(source).map(|m| m.range()).collect();
    if delimiters.len() >= 4 {
        return Err(FormatError {
            block: Block::Fence,
            offset: delimiters[2].start,
        });
    }
    let fence_range = if delimiters.len() >= 2 {
        let open = &delimiters[0];
        let close = &delimiters[1];
        let body_start = line_end(source, open.end);
        segments.fence = source[body_start..close.start].to_string();
        let range = open.start..line_end(source, close.end);
        removed.push(range.clone());
        Some(range)
    } else {
        None
    };

    let outside_fence = |r: &Range<usize>| match &fence_range {
        Some(f) => r.end <= f.start || r.start >= f.end,
        None => true,
    };

    for (block, re) in [(Block::Script, &*SCRIPT_RE), (Block::Style, &*STYLE_RE)] {
        let found: Vec<regex::Captures> = re
            .captures_iter(source)
            .filter(|caps| outside_fence(&caps.get(0).map_or(0..0, |m| m.range())))
            .collect();
        if let Some(second) = found.get(1) {
            return Err(FormatError {
                block,
                offset: second.get(0).map_or(0, |m| m.start()),
            });
        }
        if let Some(caps) = found.first() {
            let body = caps.get(1).map_or("", |m| m.as_str()).to_string();
            match block {
                Block::Script => segments.script = body,
                _ => segments.style = body,
            }
            if let Some(whole) = caps.get(0) {
                removed.push(whole.range());
            }
        }
    }

    removed.sort_by_key(|r| r.start);
    let mut markup = String::with_capacity(source.len());
    let mut last = 0;
    for range in removed {
        if range.start < last {
            continue;
        }
        markup.push_str(&source[last..range.start]);
        last = range.end;
    }
    markup.push_str(&source[last..]);
    segments.markup = markup;

    Ok(segments)
}

/// Index just past the newline ending the line that contains `pos`.
fn line_end(source: &str, pos: usize) -> usize {
    match source[pos..].find('\n') {
        Some(rel) => pos + rel + 1,
        None => source.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARD: &str = "---\nprop name = \"Sam\";\n---\n<p>Hi {name}</p>\n<script>let x = 1;</script>\n<style>p { color: red; }</style>\n";

    #[test]
    fn test_split_all_blocks() {
        let seg = split(CARD).unwrap();
        assert_eq!(seg.fence, "prop name = \"Sam\";\n");
        assert_eq!(seg.markup, "<p>Hi {name}</p>\n\n\n");
        assert_eq!(seg.script, "let x = 1;");
        assert_eq!(seg.style, "p { color: red; }");
    }

    #[test]
    fn test_no_blocks_is_all_markup() {
        let seg = split("<div>plain</div>").unwrap();
        assert_eq!(seg.markup, "<div>plain</div>");
        assert!(seg.fence.is_empty());
        assert!(seg.script.is_empty());
    }

    #[test]
    fn test_script_with_attributes_stays_in_markup() {
        let src = "<script src=\"/app.js\"></script><p>x</p>";
        let seg = split(src).unwrap();
        assert_eq!(seg.markup, src);
        assert!(seg.script.is_empty());
    }

    #[test]
    fn test_second_style_is_rejected() {
        let src = "<style>a{}</style><p></p><style>b{}</style>";
        let err = split(src).unwrap_err();
        assert_eq!(err.block, Block::Style);
        assert_eq!(err.offset, 25);
    }

    #[test]
    fn test_second_fence_is_rejected() {
        let src = "---\na\n---\n<p></p>\n---\nb\n---\n";
        let err = split(src).unwrap_err();
        assert_eq!(err.block, Block::Fence);
        assert_eq!(err.offset, 18);
    }

    #[test]
    fn test_dashes_inside_text_are_not_a_fence() {
        let seg = split("<p>a --- b</p>").unwrap();
        assert_eq!(seg.markup, "<p>a --- b</p>");
    }

    #[test]
    fn test_segments_round_trip() {
        let seg = split(CARD).unwrap();
        assert_eq!(split(&seg.to_source()).unwrap(), seg);
    }
}
