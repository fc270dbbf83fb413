//! Live-binding attributes for an Alpine-style client runtime.
//!
//! The page root carries its bindings in `x-data`. A component root that
//! received props carries an `x-data` with the component's fence logic and
//! an `x-init` that recomputes each prop from the parent element's data, so
//! `x-text`/`:attr` bindings inside the component stay live.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::SourceType;
use std::collections::HashSet;

use crate::control::Props;
use crate::fence::make_attr_str;
use crate::value::{Bindings, Value};

lazy_static! {
    /// Names the client resolves globally; never rebound to parent data.
    static ref CLIENT_GLOBALS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("Math");
        s.insert("JSON");
        s.insert("Date");
        s.insert("String");
        s.insert("Number");
        s.insert("Boolean");
        s.insert("Array");
        s.insert("Object");
        s.insert("undefined");
        s.insert("NaN");
        s.insert("Infinity");
        s.insert("parseInt");
        s.insert("parseFloat");
        s.insert("window");
        s.insert("document");
        s.insert("console");
        s.insert("Alpine");
        s
    };
}

const PARENT_DATA: &str = "Alpine.$data($el.parentElement)";

/// `x-data` value for the page root.
pub fn root_data(bindings: &Bindings) -> String {
    make_attr_str(&Value::Map(bindings.clone()).to_literal())
}

/// `(x-data, x-init)` for a component root called with `props`.
pub fn component_getters(props: &Props, fence_logic: &str) -> (String, String) {
    let params: Vec<&str> = props.iter().map(|(name, _)| name.as_str()).collect();
    let args: Vec<String> = props
        .iter()
        .map(|(_, expr)| make_attr_str(&rebind_to_parent(expr)))
        .collect();

    let mut x_data = format!("{{_fence: `{}`, ", fence_logic);
    for name in &params {
        x_data.push_str(name);
        x_data.push_str(": undefined, ");
    }
    x_data.push('}');

    let params_str = params.join(", ");
    let args_str = args.join(", ");
    let init: Vec<String> = params
        .iter()
        .map(|name| {
            let compute = format!(
                "{} = new Function('{}', `${{_fence}}; return {};`)({})",
                name, params_str, name, args_str
            );
            format!("{}, $watch('{}', () => {})", compute, PARENT_DATA, compute)
        })
        .collect();

    (x_data, init.join(", "))
}

/// Rewrites every free identifier of `expr` into a read of the parent
/// element's data: `user.name` -> `Alpine.$data($el.parentElement).user.name`.
/// Unparseable expressions are returned unchanged.
pub fn rebind_to_parent(expr: &str) -> String {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    let Ok(parsed) = Parser::new(&allocator, expr, source_type).parse_expression() else {
        return expr.to_string();
    };

    let mut collector = FreeReferences::default();
    collector.visit_expression(&parsed);

    let mut spans: Vec<FreeRef> = collector
        .references
        .into_iter()
        .filter(|r| !collector.bound.contains(&r.name) && !CLIENT_GLOBALS.contains(r.name.as_str()))
        .collect();
    spans.sort_by(|a, b| b.start.cmp(&a.start));

    let mut out = expr.to_string();
    for r in spans {
        let read = format!("{}.{}", PARENT_DATA, r.name);
        let replacement = if r.shorthand {
            format!("{}: {}", r.name, read)
        } else {
            read
        };
        out.replace_range(r.start as usize..r.end as usize, &replacement);
    }
    out
}

struct FreeRef {
    start: u32,
    end: u32,
    name: String,
    /// `{a}` object shorthand; the key must survive the rewrite.
    shorthand: bool,
}

#[derive(Default)]
struct FreeReferences {
    references: Vec<FreeRef>,
    bound: HashSet<String>,
}

impl<'a> Visit<'a> for FreeReferences {
    fn visit_identifier_reference(&mut self, ident: &oxc_ast::ast::IdentifierReference<'a>) {
        self.references.push(FreeRef {
            start: ident.span.start,
            end: ident.span.end,
            name: ident.name.to_string(),
            shorthand: false,
        });
    }

    fn visit_binding_identifier(&mut self, ident: &oxc_ast::ast::BindingIdentifier<'a>) {
        self.bound.insert(ident.name.to_string());
    }

    fn visit_object_property(&mut self, prop: &oxc_ast::ast::ObjectProperty<'a>) {
        if prop.shorthand {
            if let oxc_ast::ast::PropertyKey::StaticIdentifier(id) = &prop.key {
                self.references.push(FreeRef {
                    start: prop.span.start,
                    end: prop.span.end,
                    name: id.name.to_string(),
                    shorthand: true,
                });
                return;
            }
        }
        oxc_ast_visit::walk::walk_object_property(self, prop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebind_member_chain() {
        assert_eq!(
            rebind_to_parent("user.name"),
            "Alpine.$data($el.parentElement).user.name"
        );
    }

    #[test]
    fn test_rebind_skips_globals_and_params() {
        assert_eq!(
            rebind_to_parent("items.map(x => Math.max(x, limit))"),
            "Alpine.$data($el.parentElement).items.map(x => Math.max(x, Alpine.$data($el.parentElement).limit))"
        );
    }

    #[test]
    fn test_rebind_shorthand_keeps_key() {
        assert_eq!(
            rebind_to_parent("{a}"),
            "{a: Alpine.$data($el.parentElement).a}"
        );
    }

    #[test]
    fn test_root_data_is_attribute_safe() {
        let mut bindings = Bindings::new();
        bindings.insert("name".to_string(), Value::from("Sam"));
        bindings.insert("age".to_string(), Value::Int(3));
        assert_eq!(root_data(&bindings), "{age: 3, name: 'Sam'}");
    }

    #[test]
    fn test_component_getters() {
        let props = vec![("title".to_string(), "page.title".to_string())];
        let (x_data, x_init) = component_getters(&props, "let upper = title;");
        assert_eq!(x_data, "{_fence: `let upper = title;`, title: undefined, }");
        let compute = "title = new Function('title', `${_fence}; return title;`)(Alpine.$data($el.parentElement).page.title)";
        assert_eq!(
            x_init,
            format!("{}, $watch('Alpine.$data($el.parentElement)', () => {})", compute, compute)
        );
    }
}
