// Copyright 2018-2026 the Deno authors. MIT license.

use deno_error::JsError;
use thiserror::Error;

/// Minimum runtime major version paired with the newest `jsc.target` that
/// version fully supports, ordered from the highest threshold down.
const RUNTIME_TARGET_DEFAULTS: &[(u32, &str)] = &[
  (18, "es2023"),
  (17, "es2022"),
  (15, "es2021"),
  (14, "es2020"),
  (13, "es2019"),
];

const FALLBACK_TARGET: &str = "es2018";

#[derive(Debug, Clone, Error, JsError, PartialEq, Eq)]
#[class(type)]
#[error("Could not parse the major version from runtime version '{version}'.")]
pub struct VersionParseError {
  pub version: String,
}

pub fn parse_major_version(version: &str) -> Result<u32, VersionParseError> {
  lazy_regex::regex_captures!(r"^v?(\d+)", version)
    .and_then(|(_, major)| major.parse::<u32>().ok())
    .ok_or_else(|| VersionParseError {
      version: version.to_string(),
    })
}

/// Picks the default `jsc.target` for a host runtime version string such
/// as `v18.12.1`.
pub fn target_for_runtime_version(
  version: &str,
) -> Result<&'static str, VersionParseError> {
  let major = parse_major_version(version)?;
  Ok(target_for_major_version(major))
}

pub fn target_for_major_version(major: u32) -> &'static str {
  RUNTIME_TARGET_DEFAULTS
    .iter()
    .find(|(min_version, _)| *min_version <= major)
    .map(|(_, target)| *target)
    .unwrap_or(FALLBACK_TARGET)
}
