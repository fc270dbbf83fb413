//! Page assembly: flattens the scope stack into the page's script and style.

use tracing::debug;

use crate::classes::{ClassGenerator, ScopedElement};
use crate::options::RenderOptions;
use crate::scope_css::scope_css;
use crate::scope_js::scope_js;

/// One rendered component instance: the elements it scoped plus its raw
/// style and script blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeStackEntry {
    pub elements: Vec<ScopedElement>,
    pub style: String,
    pub script: String,
}

/// Scopes every entry's blocks against that entry's own elements and joins
/// them in stack order. Returns `(script, style)`.
pub fn assemble(
    stack: &[ScopeStackEntry],
    generator: &mut ClassGenerator,
    options: &RenderOptions,
) -> (String, String) {
    let mut scripts = Vec::new();
    let mut styles = Vec::new();

    for entry in stack {
        if !entry.script.trim().is_empty() {
            let token = generator.token();
            scripts.push(scope_js(
                &entry.script,
                &entry.elements,
                &options.script_marker,
                &token,
            ));
        }
        if !entry.style.trim().is_empty() {
            styles.push(scope_css(&entry.style, &entry.elements));
        }
    }

    debug!(
        entries = stack.len(),
        scripts = scripts.len(),
        styles = styles.len(),
        "page assembled"
    );
    (scripts.join("\n"), styles.join("\n"))
}
