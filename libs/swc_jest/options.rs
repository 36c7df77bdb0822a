// Copyright 2018-2026 the Deno authors. MIT license.

use std::borrow::Cow;

use deno_error::JsError;
use deno_path_util::normalize_path;
use serde::Serialize;
use serde::Serializer;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use sys_traits::FsRead;
use thiserror::Error;

use crate::TransformerEnv;
use crate::swcrc::ConfigLoadError;
use crate::swcrc::load_swcrc;
use crate::target::VersionParseError;
use crate::target::target_for_runtime_version;

/// Key of the adapter's own settings. It is never handed to the compiler.
pub const EXPERIMENTAL_KEY: &str = "experimental";

/// A set of swc options. The root is always an object.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SwcOptions(pub Map<String, Value>);

impl SwcOptions {
  pub fn new(options: Map<String, Value>) -> Self {
    Self(options)
  }

  /// Gets the value at a dotted path such as `["jsc", "target"]`.
  pub fn get(&self, path: &[&str]) -> Option<&Value> {
    let (first, rest) = path.split_first()?;
    rest
      .iter()
      .try_fold(self.0.get(*first)?, |value, key| value.get(*key))
  }

  /// Sets the value at a dotted path, creating intermediate objects and
  /// replacing any non-object value found along the way.
  pub fn set(&mut self, path: &[&str], value: Value) {
    set_path(&mut self.0, path, value);
  }

  /// The entries of `jsc.experimental.plugins`, if it is an array.
  pub fn plugins(&self) -> Option<&Vec<Value>> {
    self.get(&["jsc", "experimental", "plugins"])?.as_array()
  }

  pub fn to_json_string(&self) -> String {
    Value::Object(self.0.clone()).to_string()
  }
}

impl Serialize for SwcOptions {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    Serialize::serialize(&self.0, serializer)
  }
}

pub fn set_path(map: &mut Map<String, Value>, path: &[&str], value: Value) {
  match path {
    [] => {}
    [key] => {
      map.insert(key.to_string(), value);
    }
    [key, rest @ ..] => {
      let entry = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
      match entry {
        Value::Object(child) => set_path(child, rest, value),
        other => {
          let mut child = Map::new();
          set_path(&mut child, rest, value);
          *other = Value::Object(child);
        }
      }
    }
  }
}

/// Whether a config value counts as set: `null`, `false`, `0` and the
/// empty string do not.
fn is_set(value: Option<&Value>) -> bool {
  match value {
    None | Some(Value::Null) => false,
    Some(Value::Bool(value)) => *value,
    Some(Value::String(value)) => !value.is_empty(),
    Some(Value::Number(value)) => value.as_f64().is_some_and(|n| n != 0.0),
    Some(Value::Array(_) | Value::Object(_)) => true,
  }
}

#[derive(Debug, Error, JsError)]
pub enum ResolveOptionsError {
  #[class(inherit)]
  #[error(transparent)]
  ConfigLoad(#[from] ConfigLoadError),
  #[class(inherit)]
  #[error(transparent)]
  VersionParse(#[from] VersionParseError),
}

/// Builds the swc options every file is compiled with.
///
/// Non-empty `caller_options` are used as is; otherwise the `.swcrc` in the
/// environment's working directory is loaded. The result always has a
/// target (unless `env` is configured), inline source maps unless another
/// mode was chosen, the hidden jest marker, and an absolute `jsc.baseUrl`.
pub fn resolve_swc_options(
  sys: &impl FsRead,
  env: &TransformerEnv,
  caller_options: &Map<String, Value>,
) -> Result<SwcOptions, ResolveOptionsError> {
  let mut options = if caller_options.is_empty() {
    load_swcrc(sys, &env.cwd)?
  } else {
    caller_options.clone()
  };
  options.remove(EXPERIMENTAL_KEY);
  let mut options = SwcOptions::new(options);

  if !is_set(options.get(&["env"])) && !is_set(options.get(&["jsc", "target"]))
  {
    let target = target_for_runtime_version(&env.runtime_version)?;
    log::debug!(
      "Defaulting jsc.target to {} for runtime {}.",
      target,
      env.runtime_version
    );
    options.set(&["jsc", "target"], json!(target));
  }

  options.set(&["jsc", "transform", "hidden", "jest"], Value::Bool(true));

  if !is_set(options.get(&["sourceMaps"])) {
    options.set(&["sourceMaps"], json!("inline"));
  }

  let maybe_base_url = options
    .get(&["jsc", "baseUrl"])
    .and_then(|value| value.as_str())
    .filter(|value| !value.is_empty())
    .map(|value| value.to_string());
  if let Some(base_url) = maybe_base_url {
    let base_url = normalize_path(Cow::Owned(env.cwd.join(base_url)));
    options.set(&["jsc", "baseUrl"], json!(base_url.to_string_lossy()));
  }

  log::debug!("Resolved swc options: {}", options.to_json_string());
  Ok(options)
}
