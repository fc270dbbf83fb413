//! Fence processing.
//!
//! The fence is the `---` block at the top of a component. It declares the
//! component's props (`prop name = default;`), imports child components and
//! computes local variables. This module turns it into:
//!
//! - a runnable script (`prop` declarations rewritten into `let`),
//! - the bindings that script produces,
//! - the imports, resolved against the component's directory,
//! - the "fence logic": the same code on one line for client embedding.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{BindingPattern, Statement};
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::evaluator::Evaluator;
use crate::loader::resolve_path;
use crate::value::Bindings;

lazy_static! {
    static ref IMPORT_RE: Regex =
        Regex::new(r#"import\s+([A-Za-z_$][A-Za-z0-9_$]*)\s+from\s*["']([^"']+)["']\s*;?"#)
            .unwrap();
    static ref PROP_RE: Regex =
        Regex::new(r"\bprop\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*(?:=\s*(.*?))?\s*;").unwrap();
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct FenceOutput {
    /// Script the evaluator ran.
    pub code: String,
    pub bindings: Bindings,
    pub imports: Vec<Import>,
    /// Single-line fence code (imports and props removed) for `x-data`.
    pub fence_logic: String,
    /// Names of the props the fence declares.
    pub props: Vec<String>,
}

impl FenceOutput {
    pub fn import(&self, name: &str) -> Option<&Import> {
        self.imports.iter().find(|i| i.name == name)
    }
}

pub fn process(
    fence: &str,
    props: &Bindings,
    component_path: &Path,
    evaluator: &dyn Evaluator,
) -> FenceOutput {
    let base_dir = component_path.parent().unwrap_or_else(|| Path::new(""));

    let mut imports = Vec::new();
    for caps in IMPORT_RE.captures_iter(fence) {
        imports.push(Import {
            name: caps[1].to_string(),
            path: resolve_path(base_dir, &caps[2]),
        });
    }
    let without_imports = IMPORT_RE.replace_all(fence, "");

    let mut declared_props = Vec::new();
    let code = PROP_RE
        .replace_all(&without_imports, |caps: &Captures| {
            let name = &caps[1];
            declared_props.push(name.to_string());
            match (props.get(name), caps.get(2)) {
                (Some(value), _) => format!("let {} = {};", name, value.to_literal()),
                (None, Some(default)) => format!("let {} = {};", name, default.as_str()),
                (None, None) => format!("let {};", name),
            }
        })
        .into_owned();
    let logic_source = PROP_RE.replace_all(&without_imports, "");

    let (mut names, parsed) = scan_declarations(&code);
    let mut bindings = props.clone();
    if !parsed {
        for prop in &declared_props {
            if !names.contains(prop) {
                names.push(prop.clone());
            }
        }
        warn!(
            component = %component_path.display(),
            declared = names.len(),
            "fence has syntax errors; declared names bound to null"
        );
        for name in &names {
            bindings.insert(name.clone(), Default::default());
        }
    } else if !names.is_empty() {
        match evaluator.run_and_collect(&names, &code) {
            Ok(values) => bindings.extend(values),
            Err(e) => {
                warn!(
                    component = %component_path.display(),
                    error = %e,
                    "fence evaluation failed; declared names bound to null"
                );
                for name in &names {
                    bindings.insert(name.clone(), Default::default());
                }
            }
        }
    }

    debug!(
        component = %component_path.display(),
        imports = imports.len(),
        declared = names.len(),
        "fence processed"
    );

    FenceOutput {
        code,
        bindings,
        imports,
        fence_logic: make_attr_str(&logic_source),
        props: declared_props,
    }
}

/// Top-level `let`/`const`/`var` names, destructured names included.
pub fn declared_names(code: &str) -> Vec<String> {
    scan_declarations(code).0
}

/// Declared names the parser recovered, and whether `code` parsed cleanly.
fn scan_declarations(code: &str) -> (Vec<String>, bool) {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    let ret = Parser::new(&allocator, code, source_type).parse();
    let parsed = ret.errors.is_empty();

    let mut names = Vec::new();
    for stmt in &ret.program.body {
        if let Statement::VariableDeclaration(decl) = stmt {
            for declarator in &decl.declarations {
                collect_binding_names(&declarator.id, &mut names);
            }
        }
    }
    (names, parsed)
}

fn collect_binding_names(pattern: &BindingPattern<'_>, names: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_binding_names(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for p in arr.elements.iter().flatten() {
                collect_binding_names(p, names);
            }
            if let Some(rest) = &arr.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        _ => {}
    }
}

/// Puts code on one line so it can sit inside a double-quoted attribute as
/// a template literal: comments stripped, `'` escaped, `"` turned into `'`,
/// backticks escaped.
pub fn make_attr_str(code: &str) -> String {
    let stripped = strip_comments(code);
    let one_line = stripped
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    one_line
        .replace('\'', "\\'")
        .replace('"', "'")
        .replace('`', "\\`")
}

fn strip_comments(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    let mut out = String::with_capacity(code.len());
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(&next) = chars.get(i + 1) {
                    out.push(next);
                    i += 1;
                }
            } else if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match (c, chars.get(i + 1)) {
            ('/', Some('/')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
                out.push(' ');
            }
            ('"' | '\'' | '`', _) => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}
