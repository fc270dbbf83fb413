//! Node bridge.
//!
//! Exposes the compiler to a JS bundler. Props and options travel as JSON;
//! a failed render comes back as the error's JSON diagnostic.

use napi_derive::napi;

use crate::loader::FsLoader;
use crate::options::RenderOptions;
use crate::render::Compiler;
use crate::value::Bindings;

#[napi]
pub fn render_native(
    path: String,
    props: Option<serde_json::Value>,
    options: Option<serde_json::Value>,
) -> napi::Result<serde_json::Value> {
    let props: Bindings = match props {
        Some(json) => serde_json::from_value(json).map_err(|e| napi::Error::from_reason(e.to_string()))?,
        None => Bindings::new(),
    };
    let options: RenderOptions = match options {
        Some(json) => serde_json::from_value(json).map_err(|e| napi::Error::from_reason(e.to_string()))?,
        None => RenderOptions::default(),
    };

    let compiler = Compiler::new(FsLoader::new(".")).with_options(options);
    let output = compiler.render(&path, &props).map_err(|e| {
        let diagnostic = serde_json::to_string(&e.to_diagnostic()).unwrap_or_else(|_| e.to_string());
        napi::Error::from_reason(diagnostic)
    })?;
    serde_json::to_value(output).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[napi]
pub fn default_options_native() -> napi::Result<serde_json::Value> {
    serde_json::to_value(RenderOptions::default()).map_err(|e| napi::Error::from_reason(e.to_string()))
}
