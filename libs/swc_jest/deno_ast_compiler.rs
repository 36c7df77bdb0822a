// Copyright 2018-2026 the Deno authors. MIT license.

use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use deno_ast::MediaType;
use deno_ast::ModuleSpecifier;
use deno_ast::ParseParams;
use deno_ast::SourceMapOption;
use deno_error::JsError;
use serde_json::Value;
use thiserror::Error;

use crate::commonjs::rewrite_to_commonjs;
use crate::compiler::Compiler;
use crate::compiler::TransformedSource;
use crate::options::SwcOptions;

/// Keep in sync with the `deno_ast` pin in the workspace Cargo.toml.
pub const DENO_AST_VERSION: &str = "0.53.2";

const SOURCE_MAP_PREFIX: &str =
  "//# sourceMappingURL=data:application/json;base64,";

#[derive(Debug, Error, JsError)]
pub enum DenoAstCompilerError {
  #[class(type)]
  #[error(
    "Module type '{0}' is not supported. Only \"es6\" and \"commonjs\" \
     output can be emitted."
  )]
  UnsupportedModuleType(String),
  #[class(type)]
  #[error(
    "Target '{0}' is not supported. The deno_ast compiler emits es2015 or \
     newer syntax."
  )]
  UnsupportedTarget(String),
  #[class(type)]
  #[error(
    "The deno_ast compiler cannot run swc plugins: {}",
    .0.join(", ")
  )]
  UnsupportedPlugins(Vec<String>),
  #[class(type)]
  #[error("Expected an absolute filename, got '{0}'.")]
  InvalidFilename(String),
  #[class(generic)]
  #[error(transparent)]
  Parse(#[from] deno_ast::ParseDiagnostic),
  #[class(generic)]
  #[error(transparent)]
  Transpile(#[from] deno_ast::TranspileError),
  #[class(generic)]
  #[error("Failed to rewrite the emitted source map.")]
  SourceMap(#[source] serde_json::Error),
  #[class(generic)]
  #[error(transparent)]
  Join(#[from] tokio::task::JoinError),
}

/// Compiles with `deno_ast`, the swc based transpiler Deno emits with.
///
/// Only the options that map onto `deno_ast` are honored: `module.type`
/// (`es6` or `commonjs`), `sourceMaps`, `inlineSourcesContent`,
/// `jsc.transform.legacyDecorator` and `jsc.transform.decoratorMetadata`.
/// Syntax is never lowered, so `es3` and `es5` targets are rejected, and
/// configured plugins are an error because none can be run.
#[derive(Debug, Default)]
pub struct DenoAstCompiler;

impl DenoAstCompiler {
  pub fn new() -> Self {
    Self
  }
}

#[async_trait::async_trait(?Send)]
impl Compiler for DenoAstCompiler {
  type Error = DenoAstCompilerError;

  fn version(&self) -> &str {
    DENO_AST_VERSION
  }

  fn supports_plugins(&self) -> bool {
    false
  }

  fn transform_sync(
    &self,
    source: &str,
    options: &SwcOptions,
  ) -> Result<TransformedSource, Self::Error> {
    let request = TranspileRequest::new(source, options)?;
    request.transpile()
  }

  async fn transform(
    &self,
    source: &str,
    options: &SwcOptions,
  ) -> Result<TransformedSource, Self::Error> {
    let request = TranspileRequest::new(source, options)?;
    tokio::task::spawn_blocking(move || request.transpile()).await?
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputModule {
  Es6,
  CommonJs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceMapMode {
  None,
  Inline,
  Separate,
}

/// Everything needed to transpile one file, owned so it can move to the
/// blocking pool.
struct TranspileRequest {
  specifier: ModuleSpecifier,
  media_type: MediaType,
  text: Arc<str>,
  output_module: OutputModule,
  hoist_jest_calls: bool,
  source_map: SourceMapMode,
  inline_sources: bool,
  decorators: deno_ast::DecoratorsTranspileOption,
}

impl TranspileRequest {
  fn new(
    source: &str,
    options: &SwcOptions,
  ) -> Result<Self, DenoAstCompilerError> {
    let plugins = options.plugins().map(Vec::as_slice).unwrap_or_default();
    if !plugins.is_empty() {
      return Err(DenoAstCompilerError::UnsupportedPlugins(
        plugins.iter().map(plugin_name).collect(),
      ));
    }

    let target = options
      .get(&["jsc", "target"])
      .and_then(|value| value.as_str())
      .unwrap_or_default();
    if target.eq_ignore_ascii_case("es3") || target.eq_ignore_ascii_case("es5")
    {
      return Err(DenoAstCompilerError::UnsupportedTarget(target.to_string()));
    }

    let output_module = match options
      .get(&["module", "type"])
      .and_then(|value| value.as_str())
      .unwrap_or("es6")
    {
      "es6" => OutputModule::Es6,
      "commonjs" => OutputModule::CommonJs,
      other => {
        return Err(DenoAstCompilerError::UnsupportedModuleType(
          other.to_string(),
        ));
      }
    };
    let hoist_jest_calls = options
      .get(&["jsc", "transform", "hidden", "jest"])
      .and_then(|value| value.as_bool())
      .unwrap_or(false);

    let filename = options
      .get(&["filename"])
      .and_then(|value| value.as_str())
      .unwrap_or_default();
    let path = Path::new(filename);
    let specifier = if path.is_absolute() {
      ModuleSpecifier::from_file_path(path).ok()
    } else {
      None
    }
    .ok_or_else(|| {
      DenoAstCompilerError::InvalidFilename(filename.to_string())
    })?;

    let source_map = match options.get(&["sourceMaps"]) {
      Some(Value::String(mode)) if mode == "inline" => SourceMapMode::Inline,
      Some(Value::String(mode)) if mode == "both" => SourceMapMode::Separate,
      Some(Value::Bool(true)) => SourceMapMode::Separate,
      _ => SourceMapMode::None,
    };
    let inline_sources = options
      .get(&["inlineSourcesContent"])
      .and_then(|value| value.as_bool())
      .unwrap_or(true);

    let legacy_decorator = options
      .get(&["jsc", "transform", "legacyDecorator"])
      .and_then(|value| value.as_bool())
      .unwrap_or(false);
    let decorators = if legacy_decorator {
      deno_ast::DecoratorsTranspileOption::LegacyTypeScript {
        emit_metadata: options
          .get(&["jsc", "transform", "decoratorMetadata"])
          .and_then(|value| value.as_bool())
          .unwrap_or(false),
      }
    } else {
      deno_ast::DecoratorsTranspileOption::Ecma
    };

    Ok(Self {
      media_type: MediaType::from_path(path),
      specifier,
      text: source.into(),
      output_module,
      hoist_jest_calls,
      source_map,
      inline_sources,
      decorators,
    })
  }

  fn transpile(self) -> Result<TransformedSource, DenoAstCompilerError> {
    // the CommonJS rewrite shifts lines, so its map is inlined afterwards
    let emitted_map = match (self.source_map, self.output_module) {
      (SourceMapMode::None, _) => SourceMapOption::None,
      (SourceMapMode::Inline, OutputModule::Es6) => SourceMapOption::Inline,
      (SourceMapMode::Inline, OutputModule::CommonJs)
      | (SourceMapMode::Separate, _) => SourceMapOption::Separate,
    };
    let parsed = deno_ast::parse_module(ParseParams {
      specifier: self.specifier.clone(),
      text: self.text,
      media_type: self.media_type,
      capture_tokens: false,
      scope_analysis: false,
      maybe_syntax: None,
    })?;
    let emitted = parsed
      .transpile(
        &deno_ast::TranspileOptions {
          imports_not_used_as_values:
            deno_ast::ImportsNotUsedAsValues::Remove,
          decorators: self.decorators,
          ..Default::default()
        },
        &deno_ast::TranspileModuleOptions::default(),
        &deno_ast::EmitOptions {
          source_map: emitted_map,
          inline_sources: self.inline_sources,
          ..Default::default()
        },
      )?
      .into_source();
    if self.output_module == OutputModule::Es6 {
      return Ok(TransformedSource {
        code: emitted.text,
        map: emitted.source_map,
      });
    }

    let es_module = deno_ast::parse_module(ParseParams {
      specifier: self.specifier,
      text: code_without_source_map(emitted.text).into(),
      media_type: MediaType::JavaScript,
      capture_tokens: false,
      scope_analysis: false,
      maybe_syntax: None,
    })?;
    let commonjs = rewrite_to_commonjs(&es_module, self.hoist_jest_calls);
    let map = emitted
      .source_map
      .map(|map| shift_source_map(&map, commonjs.prepended_lines))
      .transpose()?;
    let mut code = commonjs.text;
    match (self.source_map, map) {
      (SourceMapMode::Inline, Some(map)) => {
        if !code.ends_with('\n') {
          code.push('\n');
        }
        code.push_str(SOURCE_MAP_PREFIX);
        code.push_str(&BASE64_STANDARD.encode(map));
        Ok(TransformedSource { code, map: None })
      }
      (_, map) => Ok(TransformedSource { code, map }),
    }
  }
}

fn plugin_name(plugin: &Value) -> String {
  match plugin.as_array().and_then(|entry| entry.first()) {
    Some(Value::String(name)) => name.clone(),
    _ => plugin.to_string(),
  }
}

fn code_without_source_map(mut code: String) -> String {
  if let Some(index) = code.rfind("//# sourceMappingURL=") {
    code.truncate(index);
  }
  code
}

/// Moves every mapping down by `lines` generated lines.
fn shift_source_map(
  map: &str,
  lines: usize,
) -> Result<String, DenoAstCompilerError> {
  let mut map: Value =
    serde_json::from_str(map).map_err(DenoAstCompilerError::SourceMap)?;
  if let Some(Value::String(mappings)) = map.get_mut("mappings") {
    mappings.insert_str(0, &";".repeat(lines));
  }
  serde_json::to_string(&map).map_err(DenoAstCompilerError::SourceMap)
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use serde_json::json;

  use super::*;

  fn swc_options(value: Value) -> SwcOptions {
    match value {
      Value::Object(map) => SwcOptions::new(map),
      _ => unreachable!(),
    }
  }

  fn filename() -> String {
    if cfg!(windows) {
      "C:\\project\\src\\mod.ts".to_string()
    } else {
      "/project/src/mod.ts".to_string()
    }
  }

  #[test]
  fn strips_types_with_inline_map() {
    let compiler = DenoAstCompiler::new();
    let options = swc_options(json!({
      "filename": filename(),
      "module": { "type": "es6" },
      "sourceMaps": "inline",
    }));
    let output = compiler
      .transform_sync("export const a: number = 1;\n", &options)
      .unwrap();
    assert!(output.code.contains("export const a = 1;"));
    assert!(
      output
        .code
        .contains("//# sourceMappingURL=data:application/json;base64,")
    );
    assert_eq!(output.map, None);
  }

  #[test]
  fn separate_map_when_requested() {
    let compiler = DenoAstCompiler::new();
    let options = swc_options(json!({
      "filename": filename(),
      "sourceMaps": true,
    }));
    let output = compiler
      .transform_sync("const b: string = 'b';\n", &options)
      .unwrap();
    assert!(output.map.is_some());
  }

  #[test]
  fn emits_commonjs() {
    let compiler = DenoAstCompiler::new();
    let options = swc_options(json!({
      "filename": filename(),
      "module": { "type": "commonjs" },
      "sourceMaps": "inline",
      "jsc": { "transform": { "hidden": { "jest": true } } },
    }));
    let output = compiler
      .transform_sync(
        concat!(
          "import { load } from './load.ts';\n",
          "jest.mock('./load.ts');\n",
          "export const a: number = load();\n",
        ),
        &options,
      )
      .unwrap();
    let lines = output.code.lines().collect::<Vec<_>>();
    assert_eq!(lines[0], "\"use strict\";");
    assert_eq!(
      lines[1],
      "Object.defineProperty(exports, \"__esModule\", { value: true });"
    );
    assert_eq!(lines[2], "jest.mock('./load.ts');");
    assert!(
      output
        .code
        .contains("const _cjs_import_0 = require('./load.ts');")
    );
    assert!(output.code.contains("const a = load(); exports.a = a;"));
    assert!(!output.code.contains("import "));
    assert!(!output.code.contains("export "));
    let comment = output
      .code
      .lines()
      .last()
      .and_then(|line| line.strip_prefix(SOURCE_MAP_PREFIX))
      .unwrap();
    let map = BASE64_STANDARD.decode(comment).unwrap();
    let map: Value = serde_json::from_slice(&map).unwrap();
    assert!(map["mappings"].as_str().unwrap().starts_with(";;;"));
    assert_eq!(output.map, None);
  }

  #[test]
  fn commonjs_separate_map_is_shifted() {
    let compiler = DenoAstCompiler::new();
    let source = "export const a: number = 1;\n";
    let es6 = compiler
      .transform_sync(
        source,
        &swc_options(json!({ "filename": filename(), "sourceMaps": true })),
      )
      .unwrap();
    let commonjs = compiler
      .transform_sync(
        source,
        &swc_options(json!({
          "filename": filename(),
          "module": { "type": "commonjs" },
          "sourceMaps": true,
        })),
      )
      .unwrap();
    let mappings = |map: Option<String>| {
      let map: Value = serde_json::from_str(&map.unwrap()).unwrap();
      map["mappings"].as_str().unwrap().to_string()
    };
    // "use strict" and the __esModule marker
    assert_eq!(
      mappings(commonjs.map),
      format!(";;{}", mappings(es6.map))
    );
  }

  #[test]
  fn rejects_other_module_types() {
    let compiler = DenoAstCompiler::new();
    let options = swc_options(json!({
      "filename": filename(),
      "module": { "type": "amd" },
    }));
    let err = compiler.transform_sync("", &options).unwrap_err();
    assert!(matches!(
      err,
      DenoAstCompilerError::UnsupportedModuleType(ref module_type)
        if module_type == "amd"
    ));
  }

  #[test]
  fn rejects_plugins() {
    let compiler = DenoAstCompiler::new();
    assert!(!compiler.supports_plugins());
    let options = swc_options(json!({
      "filename": filename(),
      "jsc": {
        "experimental": {
          "plugins": [["swc-plugin-coverage-instrument", {}], "other"]
        }
      },
    }));
    let err = compiler.transform_sync("", &options).unwrap_err();
    assert_eq!(
      err.to_string(),
      "The deno_ast compiler cannot run swc plugins: \
       swc-plugin-coverage-instrument, \"other\""
    );
  }

  #[test]
  fn rejects_targets_it_cannot_lower_to() {
    let compiler = DenoAstCompiler::new();
    let options = swc_options(json!({
      "filename": filename(),
      "jsc": { "target": "es5" },
    }));
    let err = compiler.transform_sync("", &options).unwrap_err();
    assert!(matches!(
      err,
      DenoAstCompilerError::UnsupportedTarget(ref target) if target == "es5"
    ));
    let options = swc_options(json!({
      "filename": filename(),
      "jsc": { "target": "es2015" },
    }));
    assert!(compiler.transform_sync("", &options).is_ok());
  }

  #[test]
  fn rejects_relative_filenames() {
    let compiler = DenoAstCompiler::new();
    let options = swc_options(json!({ "filename": "src/mod.ts" }));
    let err = compiler.transform_sync("", &options).unwrap_err();
    assert_eq!(
      err.to_string(),
      "Expected an absolute filename, got 'src/mod.ts'."
    );
  }

  #[test]
  fn syntax_errors_propagate() {
    let compiler = DenoAstCompiler::new();
    let options = swc_options(json!({ "filename": filename() }));
    let err = compiler.transform_sync("const = ;", &options).unwrap_err();
    assert!(matches!(err, DenoAstCompilerError::Parse(_)));
  }

  #[tokio::test]
  async fn transforms_on_blocking_pool() {
    let compiler = DenoAstCompiler::new();
    let options = swc_options(json!({
      "filename": filename(),
      "module": { "type": "es6" },
      "sourceMaps": "inline",
    }));
    let output = compiler
      .transform("export function f(x: number) { return x; }\n", &options)
      .await
      .unwrap();
    assert!(output.code.contains("export function f(x) {"));
  }
}
