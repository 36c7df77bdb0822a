// Copyright 2018-2026 the Deno authors. MIT license.

#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]

//! A Jest transformer that compiles test sources with swc style options.
//!
//! The host test runner creates one [`SwcJestTransformer`] per project and
//! drives it through the [`Transformer`] trait. Options are resolved once, at
//! construction, from the caller's options or the project's `.swcrc`.

mod cache_key;
#[cfg(feature = "deno_ast")]
mod commonjs;
mod compiler;
#[cfg(feature = "deno_ast")]
mod deno_ast_compiler;
mod instrument;
mod options;
mod swcrc;
mod target;

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use deno_error::JsError;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use sys_traits::EnvCurrentDir;
use sys_traits::EnvVar;
use sys_traits::FsRead;
use thiserror::Error;

pub use cache_key::CacheKeyFileError;
pub use cache_key::CacheKeyFunction;
pub use cache_key::DEFAULT_CACHE_KEY_LENGTH;
pub use cache_key::derive_cache_key;
pub use compiler::Compiler;
pub use compiler::TransformedSource;
#[cfg(feature = "deno_ast")]
pub use deno_ast_compiler::DENO_AST_VERSION;
#[cfg(feature = "deno_ast")]
pub use deno_ast_compiler::DenoAstCompiler;
#[cfg(feature = "deno_ast")]
pub use deno_ast_compiler::DenoAstCompilerError;
pub use instrument::COVERAGE_PLUGIN_NAME;
pub use instrument::CustomCoverageInstrumentation;
pub use instrument::ExperimentalOptions;
pub use instrument::InstrumentLogOptions;
pub use instrument::InstrumentOptions;
pub use instrument::insert_instrumentation_options;
pub use options::ResolveOptionsError;
pub use options::SwcOptions;
pub use options::resolve_swc_options;
pub use options::set_path;
pub use swcrc::ConfigLoadError;
pub use swcrc::ConfigParseError;
pub use swcrc::SWCRC_FILE_NAME;
pub use swcrc::load_swcrc;
pub use swcrc::parse_swcrc;
pub use target::VersionParseError;
pub use target::target_for_major_version;
pub use target::target_for_runtime_version;

pub const SWC_JEST_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The process state option resolution and cache keys depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformerEnv {
  pub cwd: PathBuf,
  /// Version of the host runtime, for example `v18.12.1`.
  pub runtime_version: String,
  pub node_env: Option<String>,
  pub babel_env: Option<String>,
}

impl TransformerEnv {
  pub fn from_sys(
    sys: &(impl EnvCurrentDir + EnvVar),
    runtime_version: impl Into<String>,
  ) -> std::io::Result<Self> {
    Ok(Self {
      cwd: sys.env_current_dir()?,
      runtime_version: runtime_version.into(),
      node_env: sys.env_var("NODE_ENV").ok(),
      babel_env: sys.env_var("BABEL_ENV").ok(),
    })
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectConfig {
  pub root_dir: Option<PathBuf>,
}

/// Per file options the host passes along with each call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOptions {
  /// The host is collecting coverage for this file.
  pub instrument: bool,
  /// The host can load ES modules directly.
  pub supports_static_esm: bool,
  pub config: ProjectConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleType {
  Es6,
  CommonJs,
}

impl ModuleType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ModuleType::Es6 => "es6",
      ModuleType::CommonJs => "commonjs",
    }
  }
}

/// The contract between a test runner and a source transformer.
#[async_trait::async_trait(?Send)]
pub trait Transformer {
  type Error;

  /// Whether the transformer instruments for coverage itself, in which case
  /// the host must not instrument its output again.
  fn can_instrument(&self) -> bool;

  fn process(
    &self,
    source: &str,
    filename: &Path,
    options: &TransformOptions,
  ) -> Result<TransformedSource, Self::Error>;

  async fn process_async(
    &self,
    source: &str,
    filename: &Path,
    options: &TransformOptions,
  ) -> Result<TransformedSource, Self::Error>;

  fn get_cache_key(
    &self,
    source: &str,
    filename: &Path,
    options: &TransformOptions,
  ) -> String;
}

#[derive(Debug, Error, JsError)]
pub enum CreateTransformerError {
  #[class(inherit)]
  #[error("Failed resolving the current directory.")]
  CurrentDir {
    #[source]
    #[inherit]
    source: std::io::Error,
  },
  #[class(type)]
  #[error("Invalid \"experimental\" transformer options.")]
  Experimental {
    #[source]
    source: serde_json::Error,
  },
  #[class(type)]
  #[error(
    "Coverage instrumentation is enabled, but compiler {compiler_version} \
     cannot run the \"{}\" plugin.",
    COVERAGE_PLUGIN_NAME
  )]
  InstrumentationUnsupported { compiler_version: String },
  #[class(inherit)]
  #[error(transparent)]
  ResolveOptions(#[from] ResolveOptionsError),
  #[class(inherit)]
  #[error(transparent)]
  CacheKey(#[from] CacheKeyFileError),
}

pub struct SwcJestTransformer<TCompiler: Compiler> {
  compiler: TCompiler,
  options: Arc<SwcOptions>,
  can_instrument: bool,
  instrument_options: Option<InstrumentOptions>,
  cache_key_fn: CacheKeyFunction,
}

impl<TCompiler: Compiler> std::fmt::Debug for SwcJestTransformer<TCompiler> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SwcJestTransformer")
      .field("compiler_version", &self.compiler.version())
      .field("options", &self.options)
      .field("can_instrument", &self.can_instrument)
      .finish()
  }
}

impl<TCompiler: Compiler> SwcJestTransformer<TCompiler> {
  /// Resolves the options every file will be compiled with. `caller_options`
  /// are the options the transformer was configured with; when empty, the
  /// `.swcrc` in `env.cwd` is used instead.
  pub fn new(
    sys: &impl FsRead,
    env: &TransformerEnv,
    compiler: TCompiler,
    caller_options: &Map<String, Value>,
  ) -> Result<Self, CreateTransformerError> {
    let experimental = ExperimentalOptions::from_caller_options(caller_options)
      .map_err(|source| CreateTransformerError::Experimental { source })?;
    if experimental.can_instrument() && !compiler.supports_plugins() {
      return Err(CreateTransformerError::InstrumentationUnsupported {
        compiler_version: compiler.version().to_string(),
      });
    }
    let options = resolve_swc_options(sys, env, caller_options)?;
    let options_json = options.to_json_string();
    let cache_key_fn = CacheKeyFunction::new(
      sys,
      env,
      &[],
      &[compiler.version(), SWC_JEST_VERSION, options_json.as_str()],
    )?;
    Ok(Self {
      compiler,
      options: Arc::new(options),
      can_instrument: experimental.can_instrument(),
      instrument_options: experimental.instrument_options().cloned(),
      cache_key_fn,
    })
  }

  /// The resolved options shared by every file.
  pub fn swc_options(&self) -> &Arc<SwcOptions> {
    &self.options
  }

  pub fn compiler(&self) -> &TCompiler {
    &self.compiler
  }

  fn options_for_file(
    &self,
    filename: &Path,
    module_type: ModuleType,
    transform_options: &TransformOptions,
  ) -> SwcOptions {
    let mut options = insert_instrumentation_options(
      transform_options,
      self.can_instrument,
      &self.options,
      self.instrument_options.as_ref(),
    )
    .into_owned();
    options.set(&["module", "type"], json!(module_type.as_str()));
    options.set(&["filename"], json!(filename.to_string_lossy()));
    options
  }
}

#[async_trait::async_trait(?Send)]
impl<TCompiler: Compiler> Transformer for SwcJestTransformer<TCompiler> {
  type Error = TCompiler::Error;

  fn can_instrument(&self) -> bool {
    self.can_instrument
  }

  fn process(
    &self,
    source: &str,
    filename: &Path,
    options: &TransformOptions,
  ) -> Result<TransformedSource, Self::Error> {
    let module_type = if options.supports_static_esm {
      ModuleType::Es6
    } else {
      ModuleType::CommonJs
    };
    let swc_options = self.options_for_file(filename, module_type, options);
    self.compiler.transform_sync(source, &swc_options)
  }

  async fn process_async(
    &self,
    source: &str,
    filename: &Path,
    options: &TransformOptions,
  ) -> Result<TransformedSource, Self::Error> {
    let swc_options = self.options_for_file(filename, ModuleType::Es6, options);
    self.compiler.transform(source, &swc_options).await
  }

  fn get_cache_key(
    &self,
    source: &str,
    filename: &Path,
    options: &TransformOptions,
  ) -> String {
    let base_cache_key =
      self.cache_key_fn.get_cache_key(source, filename, options);
    derive_cache_key(&base_cache_key, options.supports_static_esm)
  }
}

/// Creates a transformer for the current process with the `deno_ast`
/// compiler.
#[cfg(feature = "deno_ast")]
pub fn create_transformer(
  caller_options: &Map<String, Value>,
  runtime_version: &str,
) -> Result<SwcJestTransformer<DenoAstCompiler>, CreateTransformerError> {
  let sys = sys_traits::impls::RealSys;
  let env = TransformerEnv::from_sys(&sys, runtime_version)
    .map_err(|source| CreateTransformerError::CurrentDir { source })?;
  SwcJestTransformer::new(&sys, &env, DenoAstCompiler::new(), caller_options)
}
