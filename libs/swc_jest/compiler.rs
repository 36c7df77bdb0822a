// Copyright 2018-2026 the Deno authors. MIT license.

use crate::options::SwcOptions;

/// Output of a single compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedSource {
  pub code: String,
  /// A separate source map, when one was requested. Inline maps are part of
  /// `code`.
  pub map: Option<String>,
}

/// The compiler the transformer delegates to. `options` carry the final swc
/// options for one file, including `filename` and `module.type`.
#[async_trait::async_trait(?Send)]
pub trait Compiler {
  type Error: std::error::Error + 'static;

  /// Version string that is part of every cache key.
  fn version(&self) -> &str;

  /// Whether entries of `jsc.experimental.plugins` are run. Coverage
  /// instrumentation is a plugin, so it needs this.
  fn supports_plugins(&self) -> bool;

  fn transform_sync(
    &self,
    source: &str,
    options: &SwcOptions,
  ) -> Result<TransformedSource, Self::Error>;

  async fn transform(
    &self,
    source: &str,
    options: &SwcOptions,
  ) -> Result<TransformedSource, Self::Error>;
}
