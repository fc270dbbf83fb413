//! Interpolation markers: `{expr}` runs inside markup text and attributes.

use tracing::debug;

use crate::evaluator::Evaluator;
use crate::value::Bindings;

/// Find the end of a balanced brace expression, handling strings and template literals.
/// `start` must point at the opening `{`. Returns the byte index after the
/// closing brace, or None if unbalanced.
pub fn find_balanced_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = start;
    let mut in_string: Option<u8> = None;
    let mut in_template = false;
    let mut template_depth = 0usize;

    while i < bytes.len() {
        let c = bytes[i];

        if c == b'\\' && i + 1 < bytes.len() {
            i += 2;
            continue;
        }

        if let Some(quote) = in_string {
            if c == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }

        if in_template {
            if c == b'`' && template_depth == 0 {
                in_template = false;
            } else if c == b'$' && bytes.get(i + 1) == Some(&b'{') {
                template_depth += 1;
                i += 2;
                continue;
            } else if c == b'}' && template_depth > 0 {
                template_depth -= 1;
            }
            i += 1;
            continue;
        }

        match c {
            b'"' | b'\'' => in_string = Some(c),
            b'`' => in_template = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

/// Private-use stand-ins for braces inside rendered data. Later passes see
/// no markers in them; `unshield` restores the braces in final output.
const SHIELDED_OPEN: char = '\u{E000}';
const SHIELDED_CLOSE: char = '\u{E001}';

/// Rendered data with its braces replaced by stand-ins.
pub fn shield(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '{' => SHIELDED_OPEN,
            '}' => SHIELDED_CLOSE,
            c => c,
        })
        .collect()
}

pub fn unshield(text: &str) -> String {
    text.replace(SHIELDED_OPEN, "{").replace(SHIELDED_CLOSE, "}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker<'a> {
    pub start: usize,
    pub end: usize,
    pub expr: &'a str,
}

/// All balanced `{…}` markers in `text`, left to right. An unbalanced `{`
/// is plain text.
pub fn markers(text: &str) -> Vec<Marker<'_>> {
    let mut found = Vec::new();
    let mut i = 0;
    while let Some(rel) = text[i..].find('{') {
        let start = i + rel;
        match find_balanced_end(text, start) {
            Some(end) => {
                found.push(Marker {
                    start,
                    end,
                    expr: &text[start + 1..end - 1],
                });
                i = end;
            }
            None => i = start + 1,
        }
    }
    found
}

pub fn has_markers(text: &str) -> bool {
    text.contains('{') && text.contains('}') && !markers(text).is_empty()
}

/// Rewrites each marker with `f`; a `None` keeps the marker verbatim.
pub fn replace_markers<F>(text: &str, mut f: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for marker in markers(text) {
        out.push_str(&text[last..marker.start]);
        match f(marker.expr) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(&text[marker.start..marker.end]),
        }
        last = marker.end;
    }
    out.push_str(&text[last..]);
    out
}

/// Static render of a text: each marker becomes its evaluated display
/// value, shielded, or nothing when evaluation fails.
pub fn interpolate(text: &str, bindings: &Bindings, evaluator: &dyn Evaluator) -> String {
    replace_markers(text, |expr| {
        Some(match evaluator.evaluate(expr, bindings) {
            Ok(value) => shield(&value.to_display()),
            Err(e) => {
                debug!(expr, error = %e, "interpolation degraded to empty text");
                String::new()
            }
        })
    })
}

/// Client-side template literal for a text containing markers:
/// `Hi {name}` becomes `` `Hi ${name}` ``, double quotes turned single so
/// the result nests inside a double-quoted attribute. Shielded braces stay
/// literal.
pub fn live_template(text: &str) -> String {
    let template = text
        .replace('{', "${")
        .replace('"', "'")
        .replace(SHIELDED_OPEN, "\\{")
        .replace(SHIELDED_CLOSE, "\\}");
    format!("`{}`", template)
}
