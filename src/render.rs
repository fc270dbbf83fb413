//! Render driver.
//!
//! Runs one page through the pipeline: split → fence → control tree →
//! evaluation, recursing into child components depth first. Every rendered
//! component instance is isolated as it returns and pushes one entry onto
//! the scope stack; the page itself is isolated last and its entry closes
//! the stack before assembly.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

use crate::assemble::{assemble, ScopeStackEntry};
use crate::braces::{interpolate, replace_markers, shield, unshield};
use crate::classes::ClassGenerator;
use crate::client;
use crate::control::{self, Directive, Props};
use crate::error::{CompileError, CompileResult};
use crate::evaluator::{referenced_names, Evaluator, ScriptEvaluator};
use crate::fence::{self, FenceOutput};
use crate::loader::{resolve_path, FsLoader, Loader};
use crate::options::RenderOptions;
use crate::scope_html::{isolate_component, isolate_page, IsolationContext};
use crate::split::split;
use crate::value::{Bindings, Value};

/// The rendered page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOutput {
    pub markup: String,
    pub script: String,
    pub style: String,
    /// The page fence in its single-line client form.
    pub fence_logic: String,
}

/// Renders `path` from the working directory with the default evaluator.
pub fn render(path: impl AsRef<Path>, props: &Bindings) -> CompileResult<PageOutput> {
    Compiler::new(FsLoader::new(".")).render(path, props)
}

pub struct Compiler {
    loader: Box<dyn Loader>,
    evaluator: Box<dyn Evaluator>,
    options: RenderOptions,
}

/// A component rendered but not yet isolated.
struct Rendered {
    markup: String,
    script: String,
    style: String,
    fence_logic: String,
    bindings: Bindings,
}

/// Per-component state shared by the directives of one template.
struct Frame<'f> {
    path: &'f Path,
    fence: &'f FenceOutput,
    depth: usize,
}

type Stack = Vec<ScopeStackEntry>;

impl Compiler {
    pub fn new(loader: impl Loader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            evaluator: Box::new(ScriptEvaluator::new()),
            options: RenderOptions::default(),
        }
    }

    pub fn with_evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Box::new(evaluator);
        self
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn render(&self, path: impl AsRef<Path>, props: &Bindings) -> CompileResult<PageOutput> {
        let path = resolve_path(Path::new(""), &path.as_ref().to_string_lossy());
        let source = self
            .loader
            .load(&path)
            .map_err(|source| CompileError::Load {
                path: path.clone(),
                source,
            })?;

        let mut generator = ClassGenerator::new(&self.options);
        let (page, mut stack) = self.render_source(&path, &source, props, Vec::new(), &mut generator, 0)?;

        let nested = issued_classes(&stack);
        let ctx = IsolationContext {
            bindings: &page.bindings,
            evaluator: self.evaluator.as_ref(),
            nested: &nested,
            client_bindings: self.options.client_bindings,
        };
        let isolated = isolate_page(&page.markup, &ctx, &mut generator);
        stack.push(ScopeStackEntry {
            elements: isolated.elements,
            style: page.style,
            script: page.script,
        });

        let (script, style) = assemble(&stack, &mut generator, &self.options);
        debug!(page = %path.display(), instances = stack.len(), "page rendered");

        Ok(PageOutput {
            markup: isolated.markup,
            script,
            style,
            fence_logic: page.fence_logic,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // COMPONENT PIPELINE
    // ═══════════════════════════════════════════════════════════════════════════════

    fn render_source(
        &self,
        path: &Path,
        source: &str,
        props: &Bindings,
        stack: Stack,
        generator: &mut ClassGenerator,
        depth: usize,
    ) -> CompileResult<(Rendered, Stack)> {
        let segments = split(source).map_err(|source| CompileError::FormatConstraint {
            path: path.to_path_buf(),
            source,
        })?;
        let fence = fence::process(&segments.fence, props, path, self.evaluator.as_ref());
        debug!(component = %path.display(), code = fence.code.as_str(), "fence evaluated");
        for name in props.keys().filter(|name| !fence.props.contains(*name)) {
            debug!(
                component = %path.display(),
                prop = name.as_str(),
                "prop passed but not declared by the component"
            );
        }
        let tree = control::build(&segments.markup).map_err(|source| CompileError::Structural {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            component = %path.display(),
            depth,
            directives = tree.len(),
            "component parsed"
        );

        let frame = Frame {
            path,
            fence: &fence,
            depth,
        };
        let mut markup = String::new();
        let stack = self.eval_directives(&tree, &fence.bindings, &frame, &[], stack, generator, &mut markup)?;

        Ok((
            Rendered {
                markup,
                script: segments.script,
                style: segments.style,
                fence_logic: fence.fence_logic.clone(),
                bindings: fence.bindings,
            },
            stack,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_directives(
        &self,
        directives: &[Directive],
        bindings: &Bindings,
        frame: &Frame<'_>,
        loop_vars: &[String],
        mut stack: Stack,
        generator: &mut ClassGenerator,
        out: &mut String,
    ) -> CompileResult<Stack> {
        for directive in directives {
            let offset = directive.offset();
            stack = match directive {
                Directive::Text { content, .. } => {
                    if loop_vars.is_empty() {
                        out.push_str(content);
                    } else {
                        out.push_str(&self.substitute_loop_vars(content, bindings, loop_vars));
                    }
                    stack
                }
                Directive::If {
                    condition,
                    children,
                    else_ifs,
                    else_branch,
                    ..
                } => {
                    let branch = if self.condition(condition, offset, bindings, frame) {
                        Some(children)
                    } else {
                        else_ifs
                            .iter()
                            .find(|b| self.condition(&b.condition, b.offset, bindings, frame))
                            .map(|b| &b.children)
                            .or(else_branch.as_ref())
                    };
                    match branch {
                        Some(children) => self.eval_directives(children, bindings, frame, loop_vars, stack, generator, out)?,
                        None => stack,
                    }
                }
                Directive::For {
                    binding,
                    collection,
                    children,
                    ..
                } => {
                    let items = match self.evaluator.evaluate(collection, bindings) {
                        Ok(value) => match value.as_homogeneous_list() {
                            Some(items) => items.to_vec(),
                            None => {
                                warn!(
                                    component = %frame.path.display(),
                                    offset,
                                    collection = collection.as_str(),
                                    "loop collection is not a homogeneous list; no iterations"
                                );
                                Vec::new()
                            }
                        },
                        Err(e) => {
                            warn!(
                                component = %frame.path.display(),
                                offset,
                                collection = collection.as_str(),
                                error = %e,
                                "loop collection failed to evaluate; no iterations"
                            );
                            Vec::new()
                        }
                    };

                    let mut inner_vars = loop_vars.to_vec();
                    inner_vars.push(binding.clone());
                    for item in items {
                        let mut scope = bindings.clone();
                        scope.insert(binding.clone(), item);
                        stack = self.eval_directives(children, &scope, frame, &inner_vars, stack, generator, out)?;
                    }
                    stack
                }
                Directive::StaticComponent { name, props, .. } => {
                    let Some(import) = frame.fence.import(name) else {
                        return Err(CompileError::Resolution {
                            path: frame.path.to_path_buf(),
                            target: name.clone(),
                            offset,
                            reason: format!("no import named '{}'", name),
                        });
                    };
                    let target = import.path.clone();
                    self.render_component(&target, props, offset, bindings, frame, loop_vars, stack, generator, out)?
                }
                Directive::DynamicComponent { path, props, .. } => {
                    let interpolated = unshield(&interpolate(path, bindings, self.evaluator.as_ref()));
                    let base_dir = frame.path.parent().unwrap_or_else(|| Path::new(""));
                    let target = resolve_path(base_dir, &interpolated);
                    self.render_component(&target, props, offset, bindings, frame, loop_vars, stack, generator, out)?
                }
            };
        }
        Ok(stack)
    }

    fn condition(&self, condition: &str, offset: usize, bindings: &Bindings, frame: &Frame<'_>) -> bool {
        match self.evaluator.evaluate(condition, bindings) {
            Ok(value) => value.is_true(),
            Err(e) => {
                warn!(
                    component = %frame.path.display(),
                    offset,
                    condition,
                    error = %e,
                    "condition failed to evaluate; treated as false"
                );
                false
            }
        }
    }

    /// Inside a loop body, markers that read a loop variable are rendered
    /// now; the client has no loop scope to resolve them later. Values are
    /// shielded so isolation never reads data as a marker.
    fn substitute_loop_vars(&self, text: &str, bindings: &Bindings, loop_vars: &[String]) -> String {
        replace_markers(text, |expr| {
            let names = referenced_names(expr)?;
            if !loop_vars.iter().any(|v| names.contains(v)) {
                return None;
            }
            Some(
                self.evaluator
                    .evaluate(expr, bindings)
                    .map(|value| shield(&value.to_display()))
                    .unwrap_or_default(),
            )
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn render_component(
        &self,
        target: &Path,
        call_props: &Props,
        offset: usize,
        bindings: &Bindings,
        frame: &Frame<'_>,
        loop_vars: &[String],
        stack: Stack,
        generator: &mut ClassGenerator,
        out: &mut String,
    ) -> CompileResult<Stack> {
        if frame.depth + 1 > self.options.max_depth {
            return Err(CompileError::RecursionLimit {
                path: target.to_path_buf(),
                depth: self.options.max_depth,
            });
        }

        let source = self
            .loader
            .load(target)
            .map_err(|e| CompileError::Resolution {
                path: frame.path.to_path_buf(),
                target: target.display().to_string(),
                offset,
                reason: e.to_string(),
            })?;

        let mut props = Bindings::new();
        let mut client_props = Props::new();
        for (name, expr) in call_props {
            match self.evaluator.evaluate(expr, bindings) {
                Ok(value) => {
                    client_props.push((name.clone(), client_expression(expr, &value, loop_vars)));
                    props.insert(name.clone(), value);
                }
                Err(e) => {
                    warn!(
                        component = %frame.path.display(),
                        target = %target.display(),
                        prop = name.as_str(),
                        expr = expr.as_str(),
                        error = %e,
                        "prop failed to evaluate; callee default applies"
                    );
                }
            }
        }

        let first_entry = stack.len();
        let (rendered, mut stack) = self.render_source(target, &source, &props, stack, generator, frame.depth + 1)?;

        let nested = issued_classes(&stack[first_entry..]);
        let getters = (self.options.client_bindings && !client_props.is_empty())
            .then(|| client::component_getters(&client_props, &rendered.fence_logic));
        let ctx = IsolationContext {
            bindings: &rendered.bindings,
            evaluator: self.evaluator.as_ref(),
            nested: &nested,
            client_bindings: self.options.client_bindings,
        };
        let isolated = isolate_component(&rendered.markup, &ctx, generator, getters.as_ref());

        stack.push(ScopeStackEntry {
            elements: isolated.elements,
            style: rendered.style,
            script: rendered.script,
        });
        out.push_str(&isolated.markup);
        Ok(stack)
    }
}

/// Prop expression as the client should recompute it. Expressions that read
/// a loop variable are frozen to their value.
fn client_expression(expr: &str, value: &Value, loop_vars: &[String]) -> String {
    let reads_loop_var = referenced_names(expr)
        .is_some_and(|names| loop_vars.iter().any(|v| names.contains(v)));
    if reads_loop_var {
        value.to_literal()
    } else {
        expr.to_string()
    }
}

fn issued_classes(entries: &[ScopeStackEntry]) -> HashSet<String> {
    entries
        .iter()
        .flat_map(|entry| entry.elements.iter().map(|e| e.scope_class.clone()))
        .collect()
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

