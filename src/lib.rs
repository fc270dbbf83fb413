//! # Plenti Compiler
//!
//! Compiles component templates into static HTML with per-instance style and
//! script isolation.
//!
//! ## Template Anatomy
//!
//! ```text
//! ---
//! import Card from "./card.html";
//! prop title = "Home";
//! let items = ["a", "b"];
//! ---
//! <h1>{title}</h1>
//! {for let item of items}<Card label={item} />{/for}
//! <script>let open = false;</script>
//! <style>h1 { margin: 0; }</style>
//! ```
//!
//! ## Pipeline Invariants
//!
//! 1. **Blocks**: at most one fence, one `<script>` and one `<style>` per
//!    template. A second one is a fatal `FormatConstraint` error.
//!
//! 2. **Structure is strict**: unbalanced or misplaced `{if}`/`{for}`
//!    directives and unknown component names abort the page.
//!
//! 3. **Data is lenient**: an expression that fails to evaluate is logged
//!    and degrades (false condition, empty loop, empty text, default prop).
//!
//! 4. **One scope class per element signature per instance**: elements of
//!    one component instance sharing an id, class or tag share a class;
//!    a second instance of the same component never shares classes with
//!    the first.
//!
//! 5. **Scope stack order**: children are pushed before their parent, the
//!    page root last. Styles and scripts are emitted in that order.

#[cfg(feature = "napi")]
mod bridge;

mod assemble;
mod braces;
mod classes;
mod client;
mod control;
mod dom;
mod error;
mod evaluator;
mod fence;
mod loader;
mod options;
mod render;
mod scope_css;
mod scope_html;
mod scope_js;
mod split;
mod value;

#[cfg(test)]
mod render_tests;

#[cfg(feature = "napi")]
pub use bridge::{default_options_native, render_native};

pub use assemble::{assemble, ScopeStackEntry};
pub use classes::{ClassGenerator, ScopedElement};
pub use control::{build, Directive, ElseIf, Props, StructuralError};
pub use error::{CompileError, CompileResult, Diagnostic};
pub use evaluator::{EvalError, EvalResult, Evaluator, ScriptEvaluator};
pub use fence::{FenceOutput, Import};
pub use loader::{FsLoader, LoadError, Loader, MemoryLoader};
pub use options::RenderOptions;
pub use render::{render, Compiler, PageOutput};
pub use scope_css::{scope_css, scope_selector};
pub use scope_html::{isolate_component, isolate_page, Isolated, IsolationContext};
pub use scope_js::scope_js;
pub use split::{split, Block, FormatError, Segments};
pub use value::{Bindings, Value};
