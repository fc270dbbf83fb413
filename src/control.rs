//! Control-tree builder.
//!
//! Turns component markup into a directive tree with one left-to-right scan.
//! Open `{if}`/`{for}` blocks live on an explicit frame stack; only the
//! output tree is recursive. Recognized at each position, in order:
//!
//! ```text
//! {if COND}  {for let X of EXPR}  {else if COND}  {else}  {/if}  {/for}
//! <Name prop={expr} />           <='path/{expr}.html' prop={expr} />
//! ```
//!
//! Everything else is collected into text runs, braces included; text
//! interpolation is handled later by the isolation engine.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::braces::find_balanced_end;
use crate::value::Value;

lazy_static! {
    static ref FOR_HEAD_RE: Regex =
        Regex::new(r"(?s)^\s*(?:let|const|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s+(?:of|in)\s+(.+?)\s*$")
            .unwrap();
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} at byte {offset}")]
pub struct StructuralError {
    pub offset: usize,
    pub message: String,
}

impl StructuralError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Ordered `name → raw expression` pairs of a component call.
pub type Props = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq)]
pub struct ElseIf {
    pub condition: String,
    pub children: Vec<Directive>,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Text {
        content: String,
        offset: usize,
    },
    If {
        condition: String,
        children: Vec<Directive>,
        else_ifs: Vec<ElseIf>,
        else_branch: Option<Vec<Directive>>,
        offset: usize,
    },
    For {
        binding: String,
        collection: String,
        children: Vec<Directive>,
        offset: usize,
    },
    StaticComponent {
        name: String,
        props: Props,
        offset: usize,
    },
    DynamicComponent {
        path: String,
        props: Props,
        offset: usize,
    },
}

impl Directive {
    pub fn offset(&self) -> usize {
        match self {
            Directive::Text { offset, .. }
            | Directive::If { offset, .. }
            | Directive::For { offset, .. }
            | Directive::StaticComponent { offset, .. }
            | Directive::DynamicComponent { offset, .. } => *offset,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRAME STACK
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq)]
enum Branch {
    Then,
    ElseIf,
    Else,
}

#[derive(Debug)]
enum Frame {
    If {
        condition: String,
        children: Vec<Directive>,
        else_ifs: Vec<ElseIf>,
        else_branch: Option<Vec<Directive>>,
        open: Branch,
        offset: usize,
    },
    For {
        binding: String,
        collection: String,
        children: Vec<Directive>,
        offset: usize,
    },
}

impl Frame {
    /// The child list new directives are appended to.
    fn target(&mut self) -> &mut Vec<Directive> {
        match self {
            Frame::For { children, .. } => children,
            Frame::If {
                children,
                else_ifs,
                else_branch,
                open,
                ..
            } => match open {
                Branch::Then => children,
                Branch::ElseIf => match else_ifs.last_mut() {
                    Some(branch) => &mut branch.children,
                    None => children,
                },
                Branch::Else => else_branch.get_or_insert_with(Vec::new),
            },
        }
    }

    fn into_directive(self) -> Directive {
        match self {
            Frame::If {
                condition,
                children,
                else_ifs,
                else_branch,
                offset,
                ..
            } => Directive::If {
                condition,
                children,
                else_ifs,
                else_branch,
                offset,
            },
            Frame::For {
                binding,
                collection,
                children,
                offset,
            } => Directive::For {
                binding,
                collection,
                children,
                offset,
            },
        }
    }

    fn describe(&self) -> String {
        match self {
            Frame::If { offset, .. } => format!("{{if}} opened at byte {}", offset),
            Frame::For { offset, .. } => format!("{{for}} opened at byte {}", offset),
        }
    }

    fn offset(&self) -> usize {
        match self {
            Frame::If { offset, .. } | Frame::For { offset, .. } => *offset,
        }
    }
}

struct Builder {
    root: Vec<Directive>,
    stack: Vec<Frame>,
}

impl Builder {
    fn push(&mut self, directive: Directive) {
        match self.stack.last_mut() {
            Some(frame) => frame.target().push(directive),
            None => self.root.push(directive),
        }
    }

    fn close(&mut self) {
        if let Some(frame) = self.stack.pop() {
            let directive = frame.into_directive();
            self.push(directive);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCANNER
// ═══════════════════════════════════════════════════════════════════════════════

const IF_OPEN: &[u8] = b"{if ";
const FOR_OPEN: &[u8] = b"{for ";
const ELSE_IF: &[u8] = b"{else if ";
const ELSE: &[u8] = b"{else}";
const IF_CLOSE: &[u8] = b"{/if}";
const FOR_CLOSE: &[u8] = b"{/for}";
const DYNAMIC_OPEN: &[u8] = b"<=";

fn starts_directive(bytes: &[u8], i: usize) -> bool {
    let rest = &bytes[i..];
    rest.starts_with(IF_OPEN)
        || rest.starts_with(FOR_OPEN)
        || rest.starts_with(ELSE_IF)
        || rest.starts_with(ELSE)
        || rest.starts_with(IF_CLOSE)
        || rest.starts_with(FOR_CLOSE)
        || is_component_start(bytes, i)
        || rest.starts_with(DYNAMIC_OPEN)
}

fn is_component_start(bytes: &[u8], i: usize) -> bool {
    bytes[i] == b'<' && bytes.get(i + 1).is_some_and(|c| c.is_ascii_uppercase())
}

/// Head contents of `{keyword ...}` starting at `start`.
fn head<'m>(
    markup: &'m str,
    start: usize,
    keyword_len: usize,
    what: &str,
) -> Result<(&'m str, usize), StructuralError> {
    let end = find_balanced_end(markup, start)
        .ok_or_else(|| StructuralError::new(start, format!("{} is missing its closing '}}'", what)))?;
    Ok((markup[start + keyword_len..end - 1].trim(), end))
}

pub fn build(markup: &str) -> Result<Vec<Directive>, StructuralError> {
    let bytes = markup.as_bytes();
    let mut builder = Builder {
        root: Vec::new(),
        stack: Vec::new(),
    };
    let mut i = 0;

    while i < bytes.len() {
        let rest = &bytes[i..];

        if rest.starts_with(IF_OPEN) {
            let (condition, end) = head(markup, i, IF_OPEN.len(), "{if}")?;
            builder.stack.push(Frame::If {
                condition: condition.to_string(),
                children: Vec::new(),
                else_ifs: Vec::new(),
                else_branch: None,
                open: Branch::Then,
                offset: i,
            });
            i = end;
        } else if rest.starts_with(FOR_OPEN) {
            let (head_text, end) = head(markup, i, FOR_OPEN.len(), "{for}")?;
            let caps = FOR_HEAD_RE.captures(head_text).ok_or_else(|| {
                StructuralError::new(
                    i,
                    format!("malformed loop head '{{{}}}', expected {{for let NAME of EXPR}}", head_text),
                )
            })?;
            builder.stack.push(Frame::For {
                binding: caps[1].to_string(),
                collection: caps[2].to_string(),
                children: Vec::new(),
                offset: i,
            });
            i = end;
        } else if rest.starts_with(ELSE_IF) {
            let (condition, end) = head(markup, i, ELSE_IF.len(), "{else if}")?;
            match builder.stack.last_mut() {
                Some(Frame::If { open, else_ifs, .. }) => {
                    if *open == Branch::Else {
                        return Err(StructuralError::new(i, "{else if} after {else}"));
                    }
                    else_ifs.push(ElseIf {
                        condition: condition.to_string(),
                        children: Vec::new(),
                        offset: i,
                    });
                    *open = Branch::ElseIf;
                }
                _ => return Err(StructuralError::new(i, "{else if} outside an open {if}")),
            }
            i = end;
        } else if rest.starts_with(ELSE) {
            match builder.stack.last_mut() {
                Some(Frame::If {
                    open, else_branch, ..
                }) => {
                    if *open == Branch::Else {
                        return Err(StructuralError::new(i, "second {else} in one {if}"));
                    }
                    *else_branch = Some(Vec::new());
                    *open = Branch::Else;
                }
                _ => return Err(StructuralError::new(i, "{else} outside an open {if}")),
            }
            i += ELSE.len();
        } else if rest.starts_with(IF_CLOSE) {
            match builder.stack.last() {
                Some(Frame::If { .. }) => builder.close(),
                Some(other) => {
                    return Err(StructuralError::new(
                        i,
                        format!("{{/if}} while {} is still open", other.describe()),
                    ))
                }
                None => {
                    return Err(StructuralError::new(i, "closing {/if} without opening {if}"))
                }
            }
            i += IF_CLOSE.len();
        } else if rest.starts_with(FOR_CLOSE) {
            match builder.stack.last() {
                Some(Frame::For { .. }) => builder.close(),
                Some(other) => {
                    return Err(StructuralError::new(
                        i,
                        format!("{{/for}} while {} is still open", other.describe()),
                    ))
                }
                None => {
                    return Err(StructuralError::new(i, "closing {/for} without opening {for}"))
                }
            }
            i += FOR_CLOSE.len();
        } else if is_component_start(bytes, i) {
            let end = tag_end(markup, i).ok_or_else(|| {
                StructuralError::new(i, "component tag is missing its closing '/>'")
            })?;
            let name_end = markup[i + 1..]
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
                .map_or(end, |rel| i + 1 + rel);
            let name = &markup[i + 1..name_end];
            let props = parse_props(&markup[name_end..end - 2], name_end);
            builder.push(Directive::StaticComponent {
                name: name.to_string(),
                props,
                offset: i,
            });
            i = end;
        } else if rest.starts_with(DYNAMIC_OPEN) {
            let end = tag_end(markup, i).ok_or_else(|| {
                StructuralError::new(i, "dynamic component is missing its closing '/>'")
            })?;
            let inner = &markup[i + 2..end - 2];
            let lead = inner.len() - inner.trim_start().len();
            let inner = inner.trim_start();
            let quote = inner
                .chars()
                .next()
                .filter(|c| *c == '\'' || *c == '"')
                .ok_or_else(|| {
                    StructuralError::new(i, "dynamic component path must be quoted")
                })?;
            let close = inner[1..].find(quote).ok_or_else(|| {
                StructuralError::new(i, "dynamic component path is missing its closing quote")
            })?;
            let path = &inner[1..1 + close];
            let props_start = i + 2 + lead + close + 2;
            let props = parse_props(&inner[close + 2..], props_start);
            builder.push(Directive::DynamicComponent {
                path: path.to_string(),
                props,
                offset: i,
            });
            i = end;
        } else {
            let start = i;
            while i < bytes.len() && (i == start || !starts_directive(bytes, i)) {
                // Interpolation markers are opaque; `<=` inside one is an operator.
                i = if bytes[i] == b'{' {
                    find_balanced_end(markup, i).unwrap_or(i + 1)
                } else {
                    i + 1
                };
            }
            builder.push(Directive::Text {
                content: markup[start..i].to_string(),
                offset: start,
            });
        }
    }

    if let Some(frame) = builder.stack.last() {
        return Err(StructuralError::new(
            frame.offset(),
            format!("unclosed {}", frame.describe()),
        ));
    }

    Ok(builder.root)
}

/// Index after the `/>` closing a component tag starting at `start`. Braced
/// expressions and quoted strings are skipped.
fn tag_end(markup: &str, start: usize) -> Option<usize> {
    let bytes = markup.as_bytes();
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => i = find_balanced_end(markup, i)?,
            q @ (b'"' | b'\'') => {
                let rel = markup[i + 1..].find(q as char)?;
                i += rel + 2;
            }
            b'/' if bytes.get(i + 1) == Some(&b'>') => return Some(i + 2),
            _ => i += 1,
        }
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROP LISTS
// ═══════════════════════════════════════════════════════════════════════════════

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn set_prop(props: &mut Props, name: String, expr: String) {
    match props.iter_mut().find(|(n, _)| *n == name) {
        Some(existing) => existing.1 = expr,
        None => props.push((name, expr)),
    }
}

/// Tokenizes `{name}`, `name={expr}` and `name="text"` props. `base` is the
/// byte offset of `text` in the markup, for warnings.
pub fn parse_props(text: &str, base: usize) -> Props {
    let bytes = text.as_bytes();
    let mut props = Props::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if bytes[i] == b'{' {
            let Some(end) = find_balanced_end(text, i) else {
                warn!(offset = base + i, "unbalanced prop token skipped");
                break;
            };
            let name = text[i + 1..end - 1].trim();
            if is_identifier(name) {
                set_prop(&mut props, name.to_string(), name.to_string());
            } else {
                warn!(offset = base + i, token = name, "shorthand prop is not an identifier");
            }
            i = end;
            continue;
        }

        let name_start = i;
        while i < bytes.len()
            && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'_' | b'$' | b'-'))
        {
            i += 1;
        }
        let name = &text[name_start..i];
        if name.is_empty() {
            warn!(offset = base + i, "unexpected character in prop list skipped");
            i += text[i..].chars().next().map_or(1, char::len_utf8);
            continue;
        }

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            warn!(offset = base + name_start, prop = name, "prop without a value skipped");
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        match bytes.get(i) {
            Some(b'{') => match find_balanced_end(text, i) {
                Some(end) => {
                    let expr = text[i + 1..end - 1].trim().to_string();
                    set_prop(&mut props, name.to_string(), expr);
                    i = end;
                }
                None => {
                    warn!(offset = base + i, prop = name, "unbalanced prop expression skipped");
                    break;
                }
            },
            Some(&q) if q == b'"' || q == b'\'' => match text[i + 1..].find(q as char) {
                Some(rel) => {
                    let literal = Value::from(&text[i + 1..i + 1 + rel]).to_literal();
                    set_prop(&mut props, name.to_string(), literal);
                    i += rel + 2;
                }
                None => {
                    warn!(offset = base + i, prop = name, "unterminated prop string skipped");
                    break;
                }
            },
            _ => {
                warn!(offset = base + name_start, prop = name, "malformed prop value skipped");
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
            }
        }
    }
    props
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str, offset: usize) -> Directive {
        Directive::Text {
            content: s.to_string(),
            offset,
        }
    }

    #[test]
    fn test_plain_text_is_one_run() {
        let tree = build("<p>Hi {name}</p>").unwrap();
        assert_eq!(tree, vec![text("<p>Hi {name}</p>", 0)]);
    }

    #[test]
    fn test_marker_with_comparison_is_text() {
        let tree = build("<p>{n <= 1 ? 'one' : 'many'}</p>").unwrap();
        assert_eq!(tree, vec![text("<p>{n <= 1 ? 'one' : 'many'}</p>", 0)]);

        let tree = build("{a < B}{if a}x{/if}").unwrap();
        assert_eq!(tree[0], text("{a < B}", 0));
        assert!(matches!(tree[1], Directive::If { offset: 7, .. }));
    }

    #[test]
    fn test_if_else_chain() {
        let tree = build("{if a}A{else if b}B{else if c}C{else}D{/if}").unwrap();
        let Directive::If {
            condition,
            children,
            else_ifs,
            else_branch,
            ..
        } = &tree[0]
        else {
            panic!("expected if");
        };
        assert_eq!(condition, "a");
        assert_eq!(children, &vec![text("A", 6)]);
        assert_eq!(else_ifs.len(), 2);
        assert_eq!(else_ifs[0].condition, "b");
        assert_eq!(else_ifs[1].condition, "c");
        assert_eq!(else_ifs[1].children, vec![text("C", 30)]);
        assert_eq!(else_branch, &Some(vec![text("D", 37)]));
    }

    #[test]
    fn test_condition_with_braces() {
        let tree = build("{if obj == {a: 1}.a}x{/if}").unwrap();
        let Directive::If { condition, .. } = &tree[0] else {
            panic!("expected if");
        };
        assert_eq!(condition, "obj == {a: 1}.a");
    }

    #[test]
    fn test_nested_for_in_if() {
        let tree = build("{if show}<ul>{for let a of animals}<li>{a}</li>{/for}</ul>{/if}").unwrap();
        let Directive::If { children, .. } = &tree[0] else {
            panic!("expected if");
        };
        assert_eq!(children.len(), 3);
        let Directive::For {
            binding,
            collection,
            children,
            ..
        } = &children[1]
        else {
            panic!("expected for");
        };
        assert_eq!(binding, "a");
        assert_eq!(collection, "animals");
        assert_eq!(children[0], text("<li>{a}</li>", 35));
    }

    #[test]
    fn test_malformed_for_head() {
        let err = build("{for a in list}x{/for}").unwrap_err();
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn test_close_without_open() {
        let err = build("text{/if}").unwrap_err();
        assert_eq!(err.offset, 4);
        assert!(err.message.contains("without opening"));
    }

    #[test]
    fn test_mismatched_close() {
        let err = build("{for let x of xs}{/if}").unwrap_err();
        assert_eq!(err.offset, 17);
    }

    #[test]
    fn test_unclosed_reports_opening_offset() {
        let err = build("<p>{if a}never closed").unwrap_err();
        assert_eq!(err.offset, 3);
        assert!(err.to_string().contains("unclosed"));
    }

    #[test]
    fn test_else_outside_if() {
        assert!(build("{else}").is_err());
        assert!(build("{for let x of xs}{else}{/for}").is_err());
        assert!(build("{if a}{else}{else if b}{/if}").is_err());
    }

    #[test]
    fn test_static_component_props() {
        let tree = build("<Card {name} age={person.age + 1} title=\"Hello\" />").unwrap();
        assert_eq!(
            tree,
            vec![Directive::StaticComponent {
                name: "Card".to_string(),
                props: vec![
                    ("name".to_string(), "name".to_string()),
                    ("age".to_string(), "person.age + 1".to_string()),
                    ("title".to_string(), "\"Hello\"".to_string()),
                ],
                offset: 0,
            }]
        );
    }

    #[test]
    fn test_component_prop_may_contain_slash_gt() {
        let tree = build("<Link label={\"a/>b\"} />rest").unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[1], text("rest", 23));
    }

    #[test]
    fn test_component_without_close() {
        let err = build("<Card name={x}>").unwrap_err();
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn test_dynamic_component() {
        let tree = build("<='/components/{kind}.html' {item} />").unwrap();
        assert_eq!(
            tree,
            vec![Directive::DynamicComponent {
                path: "/components/{kind}.html".to_string(),
                props: vec![("item".to_string(), "item".to_string())],
                offset: 0,
            }]
        );
    }

    #[test]
    fn test_malformed_props_are_skipped() {
        let props = parse_props(" {a + b} good={ok} bare = ", 0);
        assert_eq!(props, vec![("good".to_string(), "ok".to_string())]);
    }

    #[test]
    fn test_lowercase_tags_are_text() {
        let tree = build("<div><span/></div>").unwrap();
        assert_eq!(tree, vec![text("<div><span/></div>", 0)]);
    }
}
