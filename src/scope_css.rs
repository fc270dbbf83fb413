//! Stylesheet scoping.
//!
//! Every selector fragment that names a scoped element (`p`, `.intro`,
//! `#main`) gets that element's scope class appended, so `p { color: red }`
//! becomes `p.plenti-AB12cd { color: red }`. The lexer is lossless: tokens
//! it does not rewrite are copied through byte for byte.
//!
//! Declaration values are scanned the same way as selectors, so a value
//! that spells a scoped tag name (`display: table` with a scoped `<table>`)
//! is rewritten too. Property names, pseudo-class names, attribute
//! selector contents and at-rule preludes are left alone.

use logos::Logos;

use crate::classes::{lookup, ScopedElement, Target};

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum CssToken {
    #[regex(r"[ \t\r\n\f]+")]
    Whitespace,

    #[regex(r"/\*[^*]*\*+(?:[^/*][^*]*\*+)*/")]
    Comment,

    #[regex(r#""([^"\\\n]|\\.)*""#)]
    #[regex(r"'([^'\\\n]|\\.)*'")]
    Str,

    #[regex(r"-?[a-zA-Z_][a-zA-Z0-9_-]*")]
    #[regex(r"--[a-zA-Z0-9_-]*")]
    Ident,

    #[regex(r"\.-?[a-zA-Z_][a-zA-Z0-9_-]*")]
    ClassSelector,

    #[regex(r"#[a-zA-Z0-9_-]+")]
    Hash,

    #[regex(r"@[a-zA-Z-]+")]
    AtKeyword,

    #[regex(r"[0-9]+(?:\.[0-9]+)?[a-zA-Z%]*")]
    #[regex(r"\.[0-9]+[a-zA-Z%]*")]
    Number,

    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
}

/// At-rules whose block holds ordinary rules.
const GROUP_AT_RULES: &[&str] = &["media", "supports", "layer", "container", "document"];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Frame {
    Group,
    Rule,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Prelude,
    Declarations,
}

fn tokenize(source: &str) -> Vec<(Option<CssToken>, &str)> {
    CssToken::lexer(source)
        .spanned()
        .map(|(result, span)| (result.ok(), &source[span]))
        .collect()
}

pub fn scope_css(style: &str, elements: &[ScopedElement]) -> String {
    if elements.is_empty() {
        return style.to_string();
    }
    Rewriter::new(tokenize(style), elements).run()
}

/// Rewrites a bare selector list, e.g. a `querySelector` argument.
pub fn scope_selector(selector: &str, elements: &[ScopedElement]) -> String {
    if elements.is_empty() {
        return selector.to_string();
    }
    Rewriter::new(tokenize(selector), elements).run()
}

struct Rewriter<'s, 'e> {
    tokens: Vec<(Option<CssToken>, &'s str)>,
    elements: &'e [ScopedElement],
    out: String,
}

impl<'s, 'e> Rewriter<'s, 'e> {
    fn new(tokens: Vec<(Option<CssToken>, &'s str)>, elements: &'e [ScopedElement]) -> Self {
        Self {
            tokens,
            elements,
            out: String::new(),
        }
    }

    fn run(mut self) -> String {
        let mut frames: Vec<Frame> = Vec::new();
        let mut mode = Mode::Prelude;
        let mut at_rule: Option<String> = None;
        let mut in_value = false;
        let mut pseudo = false;
        let mut brackets = 0usize;
        let mut parens = 0usize;

        let mut i = 0;
        while i < self.tokens.len() {
            let (token, text) = self.tokens[i];
            let Some(token) = token else {
                self.out.push_str(text);
                i += 1;
                continue;
            };

            let rewritable = at_rule.is_none()
                && brackets == 0
                && match mode {
                    Mode::Prelude => true,
                    Mode::Declarations => in_value && parens == 0,
                };

            match token {
                CssToken::AtKeyword => {
                    at_rule = Some(text[1..].to_ascii_lowercase());
                    self.out.push_str(text);
                }
                CssToken::LBrace => {
                    self.out.push_str(text);
                    match at_rule.take() {
                        Some(name) if GROUP_AT_RULES.contains(&name.as_str()) => {
                            frames.push(Frame::Group);
                            mode = Mode::Prelude;
                        }
                        Some(_) => {
                            // @keyframes, @font-face, @page: copied verbatim.
                            i = self.copy_block(i + 1);
                            continue;
                        }
                        None => {
                            frames.push(Frame::Rule);
                            mode = Mode::Declarations;
                        }
                    }
                    in_value = false;
                    pseudo = false;
                }
                CssToken::RBrace => {
                    self.out.push_str(text);
                    frames.pop();
                    mode = match frames.last() {
                        Some(Frame::Rule) => Mode::Declarations,
                        _ => Mode::Prelude,
                    };
                    in_value = false;
                    at_rule = None;
                }
                CssToken::Semi => {
                    self.out.push_str(text);
                    at_rule = None;
                    in_value = false;
                }
                CssToken::Colon => {
                    self.out.push_str(text);
                    match mode {
                        Mode::Declarations if !in_value && parens == 0 => in_value = true,
                        Mode::Prelude => pseudo = true,
                        _ => {}
                    }
                }
                CssToken::LBracket => {
                    self.out.push_str(text);
                    brackets += 1;
                }
                CssToken::RBracket => {
                    self.out.push_str(text);
                    brackets = brackets.saturating_sub(1);
                }
                CssToken::LParen => {
                    self.out.push_str(text);
                    parens += 1;
                }
                CssToken::RParen => {
                    self.out.push_str(text);
                    parens = parens.saturating_sub(1);
                }
                CssToken::Ident if pseudo => {
                    self.out.push_str(text);
                    pseudo = false;
                }
                CssToken::Ident if rewritable => self.append(i, text, Target::Tag, text),
                CssToken::ClassSelector if rewritable => {
                    self.append(i, text, Target::Class, &text[1..])
                }
                CssToken::Hash if rewritable => self.append(i, text, Target::Id, &text[1..]),
                _ => self.out.push_str(text),
            }
            i += 1;
        }
        self.out
    }

    /// Writes `text`, then `.scope_class` if `name` matches an element and the
    /// next token is not already that class.
    fn append(&mut self, i: usize, text: &str, target: Target, name: &str) {
        self.out.push_str(text);
        let Some(class) = lookup(self.elements, target, name) else {
            return;
        };
        let scoped = match self.tokens.get(i + 1) {
            Some((Some(CssToken::ClassSelector), next)) => next[1..] == *class,
            _ => false,
        };
        if !scoped {
            self.out.push('.');
            self.out.push_str(class);
        }
    }

    /// Copies tokens up to and including the `}` closing the block opened
    /// just before `start`; returns the index after it.
    fn copy_block(&mut self, start: usize) -> usize {
        let mut depth = 1usize;
        let mut i = start;
        while i < self.tokens.len() {
            let (token, text) = self.tokens[i];
            self.out.push_str(text);
            i += 1;
            match token {
                Some(CssToken::LBrace) => depth += 1,
                Some(CssToken::RBrace) => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
        i
    }
}
