// Copyright 2018-2026 the Deno authors. MIT license.

use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use deno_error::JsError;
use serde_json::json;
use sha1::Sha1;
use sha2::Digest;
use sha2::Sha256;
use sys_traits::FsRead;
use thiserror::Error;

use crate::TransformOptions;
use crate::TransformerEnv;

pub const DEFAULT_CACHE_KEY_LENGTH: usize = 32;

#[derive(Debug, Error, JsError)]
#[class(inherit)]
#[error("Failed reading cache key dependency '{}'.", .path.display())]
pub struct CacheKeyFileError {
  pub path: PathBuf,
  #[source]
  #[inherit]
  pub source: std::io::Error,
}

/// Generic per-file cache key: a global part computed once from the
/// environment, some caller supplied values and the contents of some files,
/// combined per call with the source text, its path relative to the project
/// root and whether coverage is being collected.
#[derive(Debug, Clone)]
pub struct CacheKeyFunction {
  global_cache_key: String,
  length: usize,
}

impl CacheKeyFunction {
  pub fn new(
    sys: &impl FsRead,
    env: &TransformerEnv,
    files: &[PathBuf],
    values: &[&str],
  ) -> Result<Self, CacheKeyFileError> {
    Self::with_length(sys, env, files, values, DEFAULT_CACHE_KEY_LENGTH)
  }

  pub fn with_length(
    sys: &impl FsRead,
    env: &TransformerEnv,
    files: &[PathBuf],
    values: &[&str],
    length: usize,
  ) -> Result<Self, CacheKeyFileError> {
    let mut hasher = Sha256::new();
    let env_chunks = [env.node_env.as_deref(), env.babel_env.as_deref()];
    for chunk in env_chunks {
      hasher.update(b"\0");
      hasher.update(chunk.unwrap_or_default().as_bytes());
    }
    for value in values {
      hasher.update(b"\0");
      hasher.update(value.as_bytes());
    }
    for path in files {
      let bytes = sys.fs_read(path).map_err(|source| CacheKeyFileError {
        path: path.clone(),
        source,
      })?;
      hasher.update(b"\0");
      hasher.update(&bytes);
    }
    Ok(Self {
      global_cache_key: truncated_hex(hasher.finalize().as_slice(), length),
      length,
    })
  }

  pub fn get_cache_key(
    &self,
    source: &str,
    filename: &Path,
    options: &TransformOptions,
  ) -> String {
    let relative_filename = options
      .config
      .root_dir
      .as_deref()
      .map(|root_dir| relative_path(root_dir, filename))
      .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(self.global_cache_key.as_bytes());
    hasher.update(b"\0");
    hasher.update(source.as_bytes());
    hasher.update(b"\0");
    hasher.update(relative_filename.to_string_lossy().as_bytes());
    hasher.update(b"\0");
    hasher.update(if options.instrument { "instrument" } else { "" });
    truncated_hex(hasher.finalize().as_slice(), self.length)
  }
}

/// Keys the base cache key by whether the host can load ES modules, since
/// that decides the module type handed to the compiler.
pub fn derive_cache_key(
  base_cache_key: &str,
  supports_static_esm: bool,
) -> String {
  let mut hasher = Sha1::new();
  hasher.update(base_cache_key.as_bytes());
  hasher.update(b"\0");
  hasher.update(
    json!({ "supportsStaticESM": supports_static_esm })
      .to_string()
      .as_bytes(),
  );
  faster_hex::hex_string(hasher.finalize().as_slice())
}

fn truncated_hex(digest: &[u8], length: usize) -> String {
  let mut hex = faster_hex::hex_string(digest);
  hex.truncate(length);
  hex
}

/// Path of `to` relative to `from`, walking up with `..` where needed.
fn relative_path(from: &Path, to: &Path) -> PathBuf {
  let from_components = from
    .components()
    .filter(|c| *c != Component::CurDir)
    .collect::<Vec<_>>();
  let to_components = to
    .components()
    .filter(|c| *c != Component::CurDir)
    .collect::<Vec<_>>();
  let common = from_components
    .iter()
    .zip(&to_components)
    .take_while(|(a, b)| a == b)
    .count();
  let mut relative = PathBuf::new();
  for _ in common..from_components.len() {
    relative.push("..");
  }
  for component in &to_components[common..] {
    relative.push(component);
  }
  relative
}
