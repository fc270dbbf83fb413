//! Markup isolation.
//!
//! Walks rendered markup in document order and gives every element a scope
//! class, reusing one class per element signature inside an instance:
//!
//! 1. an existing generated class on the element,
//! 2. the class of a registered element with the same `id`,
//! 3. the class of one sharing an author class,
//! 4. the class of one with the same tag,
//! 5. otherwise a fresh class from the generator.
//!
//! An existing generated class outranks the id so that isolating
//! already-isolated markup leaves it unchanged.
//!
//! The registry it returns is what `scope_css` and `scope_js` match
//! selectors against. Interpolation markers left in text and attributes are
//! rendered statically here, with live-binding attributes beside them when
//! client bindings are enabled.

use std::collections::HashSet;
use tracing::debug;

use crate::braces::{has_markers, interpolate, live_template, unshield};
use crate::classes::{lookup, ClassGenerator, ScopedElement, Target};
use crate::client;
use crate::dom::{Attr, Dom, NodeId};
use crate::evaluator::Evaluator;
use crate::value::Bindings;

/// Document metadata: attributes are still interpolated, but no class.
const METADATA_ELEMENTS: &[&str] = &["head", "meta", "link", "title", "base", "script", "style"];

/// Elements whose text is code, never interpolated.
const CODE_ELEMENTS: &[&str] = &["script", "style"];

pub struct IsolationContext<'a> {
    pub bindings: &'a Bindings,
    pub evaluator: &'a dyn Evaluator,
    /// Classes issued to nested component instances; their subtrees were
    /// isolated when those instances rendered.
    pub nested: &'a HashSet<String>,
    pub client_bindings: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Isolated {
    pub markup: String,
    pub elements: Vec<ScopedElement>,
}

/// Isolates a page. Markup containing `<html` is parsed as a document;
/// anything else stays a fragment.
pub fn isolate_page(
    markup: &str,
    ctx: &IsolationContext<'_>,
    generator: &mut ClassGenerator,
) -> Isolated {
    let mut dom = if markup.to_ascii_lowercase().contains("<html") {
        Dom::parse_document(markup)
    } else {
        Dom::parse_fragment(markup)
    };
    let elements = walk(&mut dom, ctx, generator);

    if ctx.client_bindings && !ctx.bindings.is_empty() {
        if let Some(html) = dom.find_element("html") {
            dom.set_attr(html, "x-data", client::root_data(ctx.bindings));
        }
    }

    debug!(elements = elements.len(), "page isolated");
    Isolated {
        markup: unshield(&dom.serialize()),
        elements,
    }
}

/// Isolates one component instance's markup. `getters` is the
/// `(x-data, x-init)` pair placed on each of the instance's root elements.
/// Braces in rendered data stay shielded until the page is isolated.
pub fn isolate_component(
    markup: &str,
    ctx: &IsolationContext<'_>,
    generator: &mut ClassGenerator,
    getters: Option<&(String, String)>,
) -> Isolated {
    let mut dom = Dom::parse_fragment(markup);
    let elements = walk(&mut dom, ctx, generator);

    if let Some((x_data, x_init)) = getters {
        let roots: Vec<NodeId> = dom.roots().to_vec();
        for root in roots {
            if dom.tag(root).is_none() || is_nested(&dom, root, ctx, generator) {
                continue;
            }
            dom.set_attr(root, "x-data", x_data.clone());
            dom.set_attr(root, "x-init", x_init.clone());
        }
    }

    Isolated {
        markup: dom.serialize(),
        elements,
    }
}

fn walk(dom: &mut Dom, ctx: &IsolationContext<'_>, generator: &mut ClassGenerator) -> Vec<ScopedElement> {
    let mut elements = Vec::new();
    let mut stack: Vec<NodeId> = dom.roots().iter().rev().copied().collect();

    while let Some(id) = stack.pop() {
        if dom.tag(id).is_some() {
            if !scope_element(dom, id, ctx, generator, &mut elements) {
                continue;
            }
        } else if dom.text(id).is_some() {
            bind_text(dom, id, ctx);
        }
        stack.extend(dom.children(id).iter().rev().copied());
    }
    elements
}

/// Assigns the element its scope class. Returns `false` when the element
/// belongs to a nested instance and its subtree must be left alone.
fn scope_element(
    dom: &mut Dom,
    id: NodeId,
    ctx: &IsolationContext<'_>,
    generator: &mut ClassGenerator,
    elements: &mut Vec<ScopedElement>,
) -> bool {
    if is_nested(dom, id, ctx, generator) {
        return false;
    }
    bind_attributes(dom, id, ctx);

    let tag = dom.tag(id).unwrap_or_default().to_string();
    if METADATA_ELEMENTS.contains(&tag.as_str()) {
        return true;
    }

    let class_attr = dom.attr(id, "class").map(str::to_string);
    let all: Vec<String> = class_attr
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let existing = all.iter().find(|c| generator.is_scope_class(c)).cloned();
    let classes: Vec<String> = all
        .into_iter()
        .filter(|c| !generator.is_scope_class(c))
        .collect();
    let element_id = dom
        .attr(id, "id")
        .map(str::to_string)
        .filter(|s| !s.is_empty());

    let scope_class = match existing {
        Some(class) => class,
        None => {
            let class = resolve_identity(elements, &tag, element_id.as_deref(), &classes)
                .unwrap_or_else(|| generator.class());
            let value = match class_attr.as_deref().map(str::trim) {
                Some(current) if !current.is_empty() => format!("{} {}", current, class),
                _ => class.clone(),
            };
            dom.set_attr(id, "class", value);
            class
        }
    };

    let entry = ScopedElement {
        tag,
        id: element_id,
        classes,
        scope_class,
    };
    if !elements.contains(&entry) {
        elements.push(entry);
    }
    true
}

fn resolve_identity(
    elements: &[ScopedElement],
    tag: &str,
    id: Option<&str>,
    classes: &[String],
) -> Option<String> {
    id.and_then(|id| lookup(elements, Target::Id, id))
        .or_else(|| {
            classes
                .iter()
                .find_map(|c| lookup(elements, Target::Class, c))
        })
        .or_else(|| lookup(elements, Target::Tag, tag))
        .map(str::to_string)
}

fn is_nested(dom: &Dom, id: NodeId, ctx: &IsolationContext<'_>, generator: &ClassGenerator) -> bool {
    dom.attr(id, "class").is_some_and(|value| {
        value
            .split_whitespace()
            .any(|c| generator.is_scope_class(c) && ctx.nested.contains(c))
    })
}

fn is_binding_attr(name: &str) -> bool {
    name.starts_with("x-") || name.starts_with(':') || name.starts_with('@')
}

fn bind_attributes(dom: &mut Dom, id: NodeId, ctx: &IsolationContext<'_>) {
    let attrs: Vec<Attr> = dom.attrs(id).to_vec();
    for attr in attrs {
        if is_binding_attr(&attr.name) || !has_markers(&attr.value) {
            continue;
        }
        if ctx.client_bindings {
            let live = format!(":{}", attr.name);
            if dom.attr(id, &live).is_none() {
                dom.set_attr(id, &live, live_template(&attr.value));
            }
        }
        dom.set_attr(
            id,
            &attr.name,
            interpolate(&attr.value, ctx.bindings, ctx.evaluator),
        );
    }
}

fn bind_text(dom: &mut Dom, id: NodeId, ctx: &IsolationContext<'_>) {
    let Some(text) = dom.text(id) else {
        return;
    };
    if !has_markers(text) {
        return;
    }
    let parent = dom.parent(id);
    if parent
        .and_then(|p| dom.tag(p))
        .is_some_and(|t| CODE_ELEMENTS.contains(&t))
    {
        return;
    }

    let text = text.to_string();
    if ctx.client_bindings {
        if let Some(p) = parent {
            if dom.attr(p, "x-text").is_none() {
                dom.set_attr(p, "x-text", live_template(&text));
            }
        }
    }
    dom.set_text(id, interpolate(&text, ctx.bindings, ctx.evaluator));
}
