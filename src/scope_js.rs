//! Script scoping.
//!
//! Two rewrites, collected as span replacements over the oxc AST and applied
//! back to front so the rest of the source is untouched:
//!
//! - top-level `let`/`const` names get a per-instance suffix
//!   (`count` -> `count_plenti_Xy12ab`) so sibling instances of one
//!   component do not collide once all scripts share one bundle;
//! - string arguments of `querySelector`/`querySelectorAll` get the
//!   instance's scope classes, matching the rewritten stylesheet.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, AssignmentTargetPropertyIdentifier, BindingPattern, CallExpression, Expression,
    ObjectProperty, PropertyKey, Statement, VariableDeclarationKind,
};
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::SourceType;
use std::collections::HashMap;
use tracing::warn;

use crate::classes::ScopedElement;
use crate::scope_css::scope_selector;

const QUERY_METHODS: &[&str] = &["querySelector", "querySelectorAll"];

pub fn scope_js(script: &str, elements: &[ScopedElement], marker: &str, token: &str) -> String {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    let ret = Parser::new(&allocator, script, source_type).parse();
    if !ret.errors.is_empty() {
        warn!(errors = ret.errors.len(), "script does not parse; left unscoped");
        return script.to_string();
    }

    let mut renames = HashMap::new();
    for stmt in &ret.program.body {
        let Statement::VariableDeclaration(decl) = stmt else {
            continue;
        };
        if decl.kind == VariableDeclarationKind::Var {
            continue;
        }
        for declarator in &decl.declarations {
            collect_lexical_names(&declarator.id, &mut renames, marker, token);
        }
    }

    let mut collector = ScriptScoper {
        source: script,
        renames,
        elements,
        replacements: Vec::new(),
    };
    collector.visit_program(&ret.program);

    apply_replacements(script, collector.replacements)
}

fn collect_lexical_names(
    pattern: &BindingPattern<'_>,
    renames: &mut HashMap<String, String>,
    marker: &str,
    token: &str,
) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => {
            let name = id.name.to_string();
            if !name.contains(marker) {
                let renamed = format!("{}{}{}", name, marker, token);
                renames.insert(name, renamed);
            }
        }
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_lexical_names(&prop.value, renames, marker, token);
            }
            if let Some(rest) = &obj.rest {
                collect_lexical_names(&rest.argument, renames, marker, token);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for elem in arr.elements.iter().flatten() {
                collect_lexical_names(elem, renames, marker, token);
            }
            if let Some(rest) = &arr.rest {
                collect_lexical_names(&rest.argument, renames, marker, token);
            }
        }
        _ => {}
    }
}

struct ScriptScoper<'s, 'e> {
    source: &'s str,
    renames: HashMap<String, String>,
    elements: &'e [ScopedElement],
    replacements: Vec<(u32, u32, String)>,
}

impl<'a, 's, 'e> Visit<'a> for ScriptScoper<'s, 'e> {
    fn visit_identifier_reference(&mut self, ident: &oxc_ast::ast::IdentifierReference<'a>) {
        if let Some(new_name) = self.renames.get(ident.name.as_str()) {
            self.replacements
                .push((ident.span.start, ident.span.end, new_name.clone()));
        }
    }

    fn visit_binding_identifier(&mut self, ident: &oxc_ast::ast::BindingIdentifier<'a>) {
        if let Some(new_name) = self.renames.get(ident.name.as_str()) {
            self.replacements
                .push((ident.span.start, ident.span.end, new_name.clone()));
        }
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        // `{count}` must keep its key: `{count: count_plenti_X}`.
        if prop.shorthand {
            if let PropertyKey::StaticIdentifier(id) = &prop.key {
                if let Some(new_name) = self.renames.get(id.name.as_str()) {
                    let replacement = format!("{}: {}", id.name, new_name);
                    self.replacements
                        .push((prop.span.start, prop.span.end, replacement));
                    return;
                }
            }
        }
        oxc_ast_visit::walk::walk_object_property(self, prop);
    }

    fn visit_binding_property(&mut self, prop: &oxc_ast::ast::BindingProperty<'a>) {
        if prop.shorthand {
            if let PropertyKey::StaticIdentifier(id) = &prop.key {
                if let Some(new_name) = self.renames.get(id.name.as_str()) {
                    let replacement = format!("{}: {}", id.name, new_name);
                    self.replacements
                        .push((prop.span.start, prop.span.end, replacement));
                    return;
                }
            }
        }
        oxc_ast_visit::walk::walk_binding_property(self, prop);
    }

    fn visit_assignment_target_property_identifier(
        &mut self,
        prop: &AssignmentTargetPropertyIdentifier<'a>,
    ) {
        // `({count} = obj)` reads `obj.count`; the key stays.
        if let Some(new_name) = self.renames.get(prop.binding.name.as_str()) {
            let replacement = format!("{}: {}", prop.binding.name, new_name);
            self.replacements
                .push((prop.binding.span.start, prop.binding.span.end, replacement));
            if let Some(init) = &prop.init {
                self.visit_expression(init);
            }
            return;
        }
        oxc_ast_visit::walk::walk_assignment_target_property_identifier(self, prop);
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Expression::StaticMemberExpression(member) = &call.callee {
            if QUERY_METHODS.contains(&member.property.name.as_str()) {
                if let Some(Argument::StringLiteral(lit)) = call.arguments.first() {
                    let quote = self
                        .source
                        .get(lit.span.start as usize..lit.span.start as usize + 1)
                        .unwrap_or("\"");
                    let scoped = scope_selector(lit.value.as_str(), self.elements);
                    if scoped != lit.value.as_str() {
                        self.replacements.push((
                            lit.span.start,
                            lit.span.end,
                            format!("{}{}{}", quote, scoped, quote),
                        ));
                    }
                }
            }
        }
        oxc_ast_visit::walk::walk_call_expression(self, call);
    }
}

/// Applies `(start, end, text)` replacements; overlapping ones are dropped.
fn apply_replacements(source: &str, mut replacements: Vec<(u32, u32, String)>) -> String {
    replacements.sort_by(|a, b| b.0.cmp(&a.0));
    let mut out = source.to_string();
    let mut floor = u32::MAX;
    for (start, end, text) in replacements {
        if end > floor {
            continue;
        }
        out.replace_range(start as usize..end as usize, &text);
        floor = start;
    }
    out
}
