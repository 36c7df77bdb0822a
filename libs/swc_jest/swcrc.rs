// Copyright 2018-2026 the Deno authors. MIT license.

use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use deno_error::JsError;
use serde_json::Map;
use serde_json::Value;
use sys_traits::FsRead;
use thiserror::Error;

pub const SWCRC_FILE_NAME: &str = ".swcrc";

#[derive(Debug, Clone, Error, JsError, PartialEq, Eq)]
#[class(generic)]
#[error("Error parsing {}: {}", .path.display(), .errors.join(", "))]
pub struct ConfigParseError {
  pub path: PathBuf,
  pub errors: Vec<String>,
}

#[derive(Debug, Error, JsError)]
pub enum ConfigLoadError {
  #[class(inherit)]
  #[error("Failed reading '{}'.", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    #[inherit]
    source: std::io::Error,
  },
  #[class(inherit)]
  #[error(transparent)]
  Parse(#[from] ConfigParseError),
}

/// Loads the `.swcrc` found in `cwd`. A missing file is an empty config.
pub fn load_swcrc(
  sys: &impl FsRead,
  cwd: &Path,
) -> Result<Map<String, Value>, ConfigLoadError> {
  let path = cwd.join(SWCRC_FILE_NAME);
  match sys.fs_read_to_string(&path) {
    Ok(text) => {
      log::debug!("Loading swc options from '{}'.", path.display());
      Ok(parse_swcrc(&path, &text)?)
    }
    Err(err) if err.kind() == ErrorKind::NotFound => {
      log::debug!("No {} found in '{}'.", SWCRC_FILE_NAME, cwd.display());
      Ok(Map::new())
    }
    Err(err) => Err(ConfigLoadError::Io { path, source: err }),
  }
}

/// Parses the JSONC text of an `.swcrc` file. Comments and trailing commas
/// are accepted, anything else that is not an object is an error.
pub fn parse_swcrc(
  path: &Path,
  text: &str,
) -> Result<Map<String, Value>, ConfigParseError> {
  let mut errors = Vec::new();
  match jsonc_parser::parse_to_serde_value(text, &Default::default()) {
    Ok(None) => {}
    Ok(Some(Value::Object(options))) => return Ok(options),
    Ok(Some(_)) => {
      errors.push("the root value must be an object".to_string());
    }
    Err(err) => errors.push(err.to_string()),
  }
  if errors.is_empty() {
    Ok(Map::new())
  } else {
    Err(ConfigParseError {
      path: path.to_path_buf(),
      errors,
    })
  }
}
