//! End-to-end render tests.
//!
//! Pages are served from a `MemoryLoader` and rendered with a seeded class
//! generator, so output is reproducible between runs.

#[cfg(test)]
mod tests {
    use crate::error::{ERR_DEPTH, ERR_FORMAT, ERR_RESOLVE, ERR_STRUCTURE};
    use crate::evaluator::{EvalResult, Evaluator};
    use crate::loader::MemoryLoader;
    use crate::options::RenderOptions;
    use crate::render::{render, Compiler, PageOutput};
    use crate::value::{Bindings, Value};
    use crate::CompileError;
    use regex::Regex;

    fn compiler(loader: MemoryLoader) -> Compiler {
        Compiler::new(loader).with_options(RenderOptions::seeded(7))
    }

    fn render_page(loader: MemoryLoader, props: &Bindings) -> PageOutput {
        compiler(loader).render("views/home.html", props).unwrap()
    }

    /// Scope class of every `<tag>` in document order.
    fn scope_classes(markup: &str, tag: &str) -> Vec<String> {
        let re = Regex::new(&format!(r#"<{}\b[^>]*?\bclass="([^"]*)""#, tag)).unwrap();
        re.captures_iter(markup)
            .filter_map(|caps| {
                caps[1]
                    .split_whitespace()
                    .find(|c| c.starts_with("plenti-"))
                    .map(str::to_string)
            })
            .collect()
    }

    fn props(pairs: &[(&str, Value)]) -> Bindings {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // SCENARIOS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_prop_default_renders_with_live_text() {
        let loader = MemoryLoader::new().with(
            "views/home.html",
            "---\nprop name = \"Sam\";\n---\n<p>Hi {name}</p>",
        );
        let out = render_page(loader, &Bindings::new());
        let re = Regex::new(r#"<p class="plenti-[A-Za-z0-9]{6}" x-text="`Hi \$\{name\}`">Hi Sam</p>"#).unwrap();
        assert!(re.is_match(&out.markup), "{}", out.markup);
    }

    #[test]
    fn test_else_branch_when_condition_false() {
        let loader = MemoryLoader::new().with(
            "views/home.html",
            "{if age >= 18}Adult{else}Minor{/if}",
        );
        let out = render_page(loader, &props(&[("age", Value::Int(17))]));
        assert_eq!(out.markup.trim(), "Minor");
    }

    #[test]
    fn test_loop_items_share_class_per_instance() {
        let loader = MemoryLoader::new()
            .with(
                "views/home.html",
                "---\nimport List from \"./list.html\";\n---\n<List animals={[\"cat\", \"dog\"]} /><List animals={[\"emu\"]} />",
            )
            .with(
                "views/list.html",
                "---\nprop animals;\n---\n<ul>{for let a of animals}<li>{a}</li>{/for}</ul>",
            );
        let out = render_page(loader, &Bindings::new());

        assert!(out.markup.contains(">cat</li>"));
        assert!(out.markup.contains(">dog</li>"));
        assert!(out.markup.contains(">emu</li>"));
        let li = scope_classes(&out.markup, "li");
        assert_eq!(li.len(), 3);
        assert_eq!(li[0], li[1]);
        assert_ne!(li[1], li[2]);
    }

    #[test]
    fn test_style_scoped_to_existing_class() {
        let loader = MemoryLoader::new().with(
            "views/home.html",
            "<p class=\"plenti-AB12CD\">x</p>\n<style>p { color: red; }</style>",
        );
        let out = render_page(loader, &Bindings::new());
        assert_eq!(out.style, "p.plenti-AB12CD { color: red; }");
        assert!(out.markup.contains("<p class=\"plenti-AB12CD\">x</p>"));
    }

    #[test]
    fn test_sibling_instances_are_independent() {
        let loader = MemoryLoader::new()
            .with(
                "views/home.html",
                "---\nimport Card from \"./card.html\";\n---\n<div><Card name={\"A\"} /><Card name={\"B\"} /></div>",
            )
            .with(
                "views/card.html",
                "---\nprop name;\n---\n<p>{name}</p>\n<style>p { color: red; }</style>\n<script>let clicks = 0;</script>",
            );
        let out = render_page(loader, &Bindings::new());

        assert!(out.markup.contains(">A</p>"));
        assert!(out.markup.contains(">B</p>"));
        let p = scope_classes(&out.markup, "p");
        assert_eq!(p.len(), 2);
        assert_ne!(p[0], p[1]);
        let div = scope_classes(&out.markup, "div");
        assert_eq!(div.len(), 1);
        assert!(!p.contains(&div[0]));

        assert_eq!(
            out.style,
            format!("p.{} {{ color: red; }}\np.{} {{ color: red; }}", p[0], p[1])
        );
        let scripts: Vec<&str> = out.script.lines().collect();
        assert_eq!(scripts.len(), 2);
        assert_ne!(scripts[0], scripts[1]);
        assert!(scripts.iter().all(|s| s.starts_with("let clicks_plenti_")));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // CONTROL FLOW
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_if_chain_runs_one_branch() {
        let source = "{if n == 1}one{else if n == 2}two{else if n > 1}many{else}none{/if}";
        for (n, expected) in [(1, "one"), (2, "two"), (5, "many"), (0, "none")] {
            let loader = MemoryLoader::new().with("views/home.html", source);
            let out = render_page(loader, &props(&[("n", Value::Int(n))]));
            assert_eq!(out.markup.trim(), expected);
        }
    }

    #[test]
    fn test_non_boolean_condition_is_false() {
        let loader = MemoryLoader::new().with("views/home.html", "{if items}some{else}none{/if}");
        let out = render_page(loader, &props(&[("items", Value::Int(3))]));
        assert_eq!(out.markup.trim(), "none");
    }

    #[test]
    fn test_failed_condition_is_false() {
        let loader = MemoryLoader::new().with("views/home.html", "{if missing.flag}yes{else}no{/if}");
        let out = render_page(loader, &Bindings::new());
        assert_eq!(out.markup.trim(), "no");
    }

    #[test]
    fn test_mixed_list_yields_no_iterations() {
        let loader = MemoryLoader::new().with(
            "views/home.html",
            "---\nlet xs = [1, \"two\"];\n---\n<ul>{for let x of xs}<li>{x}</li>{/for}</ul>",
        );
        let out = render_page(loader, &Bindings::new());
        assert!(!out.markup.contains("<li"));
    }

    #[test]
    fn test_loop_variable_does_not_leak() {
        let loader = MemoryLoader::new().with(
            "views/home.html",
            "---\nlet xs = [\"a\", \"b\"];\n---\n<ul>{for let x of xs}<li>{x}</li>{/for}</ul><p>[{x}]</p>",
        );
        let out = render_page(loader, &Bindings::new());
        assert!(out.markup.contains(">a</li>"));
        assert!(out.markup.contains(">b</li>"));
        assert!(out.markup.contains(">[]</p>"));
    }

    #[test]
    fn test_loop_data_with_braces_is_not_evaluated() {
        let loader = MemoryLoader::new().with(
            "views/home.html",
            "---\nlet secret = \"S3CRET\";\nlet xs = [\"{secret}\"];\n---\n<ul>{for let x of xs}<li>{x}</li>{/for}</ul>",
        );
        let out = render_page(loader, &Bindings::new());
        assert!(out.markup.contains(">{secret}</li>"), "{}", out.markup);
        assert!(!out.markup.contains("S3CRET"));
        assert!(!out.markup.contains("x-text"));
    }

    #[test]
    fn test_comparison_inside_marker() {
        let loader = MemoryLoader::new().with(
            "views/home.html",
            "<p>{n <= 1 ? 'one' : 'many'}</p>",
        );
        let out = render_page(loader, &props(&[("n", Value::Int(1))]));
        assert!(out.markup.contains(">one</p>"), "{}", out.markup);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // COMPONENTS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_failed_prop_falls_back_to_default() {
        let loader = MemoryLoader::new()
            .with(
                "views/home.html",
                "---\nimport Card from \"./card.html\";\n---\n<Card name={user.name} />",
            )
            .with("views/card.html", "---\nprop name = \"anon\";\n---\n<b>{name}</b>");
        let out = render_page(loader, &Bindings::new());
        assert!(out.markup.contains(">anon</b>"), "{}", out.markup);
    }

    #[test]
    fn test_string_and_shorthand_props() {
        let loader = MemoryLoader::new()
            .with(
                "views/home.html",
                "---\nimport Tag from \"./parts/tag.html\";\nlet color = \"red\";\n---\n<Tag label=\"new\" {color} />",
            )
            .with(
                "views/parts/tag.html",
                "---\nprop label;\nprop color;\n---\n<em>{label}-{color}</em>",
            );
        let out = render_page(loader, &Bindings::new());
        assert!(out.markup.contains(">new-red</em>"), "{}", out.markup);
    }

    #[test]
    fn test_dynamic_component_path() {
        let loader = MemoryLoader::new()
            .with(
                "views/home.html",
                "---\nlet kind = \"hero\";\n---\n<='./parts/{kind}.html' title={\"Hi\"} />",
            )
            .with("views/parts/hero.html", "---\nprop title;\n---\n<h1>{title}</h1>");
        let out = render_page(loader, &Bindings::new());
        assert!(out.markup.contains(">Hi</h1>"), "{}", out.markup);
    }

    #[test]
    fn test_component_root_gets_getters() {
        let loader = MemoryLoader::new()
            .with(
                "views/home.html",
                "---\nimport Card from \"./card.html\";\nlet user = {name: \"Ada\"};\n---\n<Card name={user.name} />",
            )
            .with("views/card.html", "---\nprop name;\n---\n<p>{name}</p>");
        let out = render_page(loader, &Bindings::new());
        assert!(out.markup.contains("x-data=\"{_fence: ``, name: undefined, }\""));
        assert!(out.markup.contains("Alpine.$data($el.parentElement).user.name"));
    }

    #[test]
    fn test_document_page_root_data() {
        let loader = MemoryLoader::new().with(
            "views/home.html",
            "---\nprop title = \"Home\";\n---\n<!DOCTYPE html><html><head><title>{title}</title></head><body><h1>{title}</h1></body></html>",
        );
        let out = render_page(loader, &Bindings::new());
        assert!(out.markup.starts_with("<!DOCTYPE html><html "));
        assert!(out.markup.contains("x-data=\"{title: 'Home'}\""));
        assert!(out.markup.contains("<title x-text=\"`${title}`\">Home</title>"));
    }

    #[test]
    fn test_client_bindings_can_be_disabled() {
        let loader = MemoryLoader::new().with(
            "views/home.html",
            "---\nprop name = \"Sam\";\n---\n<a href=\"/u/{name}\">{name}</a>",
        );
        let options = RenderOptions {
            client_bindings: false,
            ..RenderOptions::seeded(1)
        };
        let out = Compiler::new(loader)
            .with_options(options)
            .render("views/home.html", &Bindings::new())
            .unwrap();
        assert!(out.markup.contains("href=\"/u/Sam\""));
        assert!(!out.markup.contains("x-text"));
        assert!(!out.markup.contains(":href"));
    }

    #[test]
    fn test_seeded_renders_are_identical() {
        let make = || {
            MemoryLoader::new()
                .with(
                    "views/home.html",
                    "---\nimport Card from \"./card.html\";\n---\n<Card name={\"A\"} /><Card name={\"B\"} />",
                )
                .with("views/card.html", "---\nprop name;\n---\n<p>{name}</p>")
        };
        assert_eq!(
            render_page(make(), &Bindings::new()),
            render_page(make(), &Bindings::new())
        );
    }

    #[test]
    fn test_fence_logic_exposed() {
        let loader = MemoryLoader::new().with(
            "views/home.html",
            "---\nprop a = 1;\n// note\nlet b = \"x\";\n---\n<p>{b}</p>",
        );
        let out = render_page(loader, &Bindings::new());
        assert_eq!(out.fence_logic, "let b = 'x';");
    }

    #[test]
    fn test_component_text_data_is_not_evaluated_by_parent() {
        let loader = MemoryLoader::new()
            .with(
                "views/home.html",
                "---\nimport Label from \"./label.html\";\nlet x = \"LEAK\";\n---\n<div><Label name={\"{x}\"} /></div>",
            )
            .with("views/label.html", "---\nprop name;\n---\n{name}");
        let out = render_page(loader, &Bindings::new());
        assert!(out.markup.contains("{x}"), "{}", out.markup);
        assert!(!out.markup.contains("LEAK"));
    }

    #[test]
    fn test_options_are_kept() {
        let loader = MemoryLoader::new().with("views/home.html", "<p>x</p>");
        let compiler = compiler(loader);
        assert_eq!(compiler.options().seed, Some(7));
        assert_eq!(compiler.options().max_depth, RenderOptions::default().max_depth);
    }

    struct FixedEvaluator(Value);

    impl Evaluator for FixedEvaluator {
        fn evaluate(&self, _code: &str, _bindings: &Bindings) -> EvalResult<Value> {
            Ok(self.0.clone())
        }

        fn run_and_collect(&self, declarations: &[String], _code: &str) -> EvalResult<Bindings> {
            Ok(declarations
                .iter()
                .map(|name| (name.clone(), self.0.clone()))
                .collect())
        }
    }

    #[test]
    fn test_evaluator_is_injectable() {
        let loader = MemoryLoader::new().with("views/home.html", "{if anything at all}yes{/if}");
        let out = Compiler::new(loader)
            .with_evaluator(FixedEvaluator(Value::Bool(true)))
            .with_options(RenderOptions::seeded(2))
            .render("views/home.html", &Bindings::new())
            .unwrap();
        assert_eq!(out.markup.trim(), "yes");
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // FATAL ERRORS
    // ═══════════════════════════════════════════════════════════════════════════════

    fn render_err(loader: MemoryLoader) -> CompileError {
        compiler(loader)
            .render("views/home.html", &Bindings::new())
            .unwrap_err()
    }

    #[test]
    fn test_unknown_component_is_resolution_error() {
        let err = render_err(MemoryLoader::new().with("views/home.html", "<p>x</p><Missing />"));
        assert_eq!(err.code(), ERR_RESOLVE);
        assert_eq!(err.offset(), Some(8));
        assert!(err.to_string().contains("Missing"));
    }

    #[test]
    fn test_missing_component_file_is_resolution_error() {
        let err = render_err(MemoryLoader::new().with(
            "views/home.html",
            "---\nimport Card from \"./nope.html\";\n---\n<Card />",
        ));
        assert!(matches!(err, CompileError::Resolution { .. }));
        assert!(err.to_string().contains("views/nope.html"));
    }

    #[test]
    fn test_unclosed_if_is_structural_error() {
        let err = render_err(MemoryLoader::new().with("views/home.html", "{if true}open"));
        assert_eq!(err.code(), ERR_STRUCTURE);
        assert_eq!(err.offset(), Some(0));
    }

    #[test]
    fn test_second_style_block_is_format_error() {
        let err = render_err(MemoryLoader::new().with(
            "views/home.html",
            "<style>a{}</style><p>x</p><style>b{}</style>",
        ));
        assert_eq!(err.code(), ERR_FORMAT);
    }

    #[test]
    fn test_errors_in_children_abort_the_page() {
        let err = render_err(
            MemoryLoader::new()
                .with(
                    "views/home.html",
                    "---\nimport Card from \"./card.html\";\n---\n<Card />",
                )
                .with("views/card.html", "{for x in}{/for}"),
        );
        assert_eq!(err.code(), ERR_STRUCTURE);
        assert_eq!(err.path().to_string_lossy(), "views/card.html");
    }

    #[test]
    fn test_self_inclusion_hits_depth_limit() {
        let loader = MemoryLoader::new().with(
            "views/home.html",
            "---\nimport Home from \"./home.html\";\n---\n<p>x</p><Home />",
        );
        let options = RenderOptions {
            max_depth: 3,
            ..RenderOptions::seeded(1)
        };
        let err = Compiler::new(loader)
            .with_options(options)
            .render("views/home.html", &Bindings::new())
            .unwrap_err();
        assert_eq!(err.code(), ERR_DEPTH);
    }

    #[test]
    fn test_missing_page_is_load_error() {
        let err = render("views/definitely-not-here.html", &Bindings::new()).unwrap_err();
        assert!(matches!(err, CompileError::Load { .. }));
        assert_eq!(err.code(), ERR_RESOLVE);
    }
}
