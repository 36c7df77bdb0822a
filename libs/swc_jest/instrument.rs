// Copyright 2018-2026 the Deno authors. MIT license.

use std::borrow::Cow;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::TransformOptions;
use crate::options::EXPERIMENTAL_KEY;
use crate::options::SwcOptions;

pub const COVERAGE_PLUGIN_NAME: &str = "swc-plugin-coverage-instrument";

/// The caller's `experimental` options bag.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentalOptions {
  #[serde(default)]
  pub custom_coverage_instrumentation: Option<CustomCoverageInstrumentation>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomCoverageInstrumentation {
  #[serde(default)]
  pub enabled: bool,
  #[serde(flatten)]
  pub instrument_options: InstrumentOptions,
}

/// Configuration handed to the coverage plugin.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentOptions {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub coverage_variable: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub compact: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub report_logic: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub ignore_class_methods: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub instrument_log: Option<InstrumentLogOptions>,
  /// Plugin options without a typed field, passed through as given.
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentLogOptions {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub level: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub enable_trace: Option<bool>,
}

impl ExperimentalOptions {
  /// Reads the `experimental` field of the caller's options.
  pub fn from_caller_options(
    caller_options: &Map<String, Value>,
  ) -> Result<Self, serde_json::Error> {
    match caller_options.get(EXPERIMENTAL_KEY) {
      Some(value) if !value.is_null() => {
        serde_json::from_value(value.clone())
      }
      _ => Ok(Self::default()),
    }
  }

  /// Whether the adapter inserts the coverage plugin itself.
  pub fn can_instrument(&self) -> bool {
    self
      .custom_coverage_instrumentation
      .as_ref()
      .is_some_and(|c| c.enabled)
  }

  pub fn instrument_options(&self) -> Option<&InstrumentOptions> {
    self
      .custom_coverage_instrumentation
      .as_ref()
      .map(|c| &c.instrument_options)
  }
}

fn has_coverage_plugin(options: &SwcOptions) -> bool {
  options.plugins().is_some_and(|plugins| {
    plugins.iter().any(|plugin| {
      plugin.get(0).and_then(|name| name.as_str()) == Some(COVERAGE_PLUGIN_NAME)
    })
  })
}

/// Appends the coverage plugin to `jsc.experimental.plugins` when the host
/// collects coverage and the adapter was configured to instrument. Options
/// that already list the plugin are returned untouched.
pub fn insert_instrumentation_options<'a>(
  transform_options: &TransformOptions,
  can_instrument: bool,
  options: &'a SwcOptions,
  instrument_options: Option<&InstrumentOptions>,
) -> Cow<'a, SwcOptions> {
  if !transform_options.instrument || !can_instrument {
    return Cow::Borrowed(options);
  }
  if has_coverage_plugin(options) {
    return Cow::Borrowed(options);
  }

  let plugin_config = instrument_options
    .map(|o| json!(o))
    .unwrap_or_else(|| json!({}));
  let mut plugins = options.plugins().cloned().unwrap_or_default();
  plugins.push(json!([COVERAGE_PLUGIN_NAME, plugin_config]));

  let mut instrumented = options.clone();
  instrumented.set(
    &["jsc", "experimental", "plugins"],
    Value::Array(plugins),
  );
  Cow::Owned(instrumented)
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn swc_options(value: Value) -> SwcOptions {
    match value {
      Value::Object(map) => SwcOptions::new(map),
      _ => unreachable!(),
    }
  }

  fn transform_options(instrument: bool) -> TransformOptions {
    TransformOptions {
      instrument,
      ..Default::default()
    }
  }

  fn count_coverage_plugins(options: &SwcOptions) -> usize {
    options
      .plugins()
      .map(|plugins| {
        plugins
          .iter()
          .filter(|p| p.get(0) == Some(&json!(COVERAGE_PLUGIN_NAME)))
          .count()
      })
      .unwrap_or(0)
  }

  #[test]
  fn parses_experimental_options() {
    let caller = json!({
      "jsc": {},
      "experimental": {
        "customCoverageInstrumentation": {
          "enabled": true,
          "coverageVariable": "__cov__",
          "compact": false,
          "ignoreClassMethods": ["render"],
          "instrumentLog": { "level": "trace", "enableTrace": true }
        }
      }
    });
    let experimental =
      ExperimentalOptions::from_caller_options(caller.as_object().unwrap())
        .unwrap();
    assert!(experimental.can_instrument());
    assert_eq!(
      json!(experimental.instrument_options().unwrap()),
      json!({
        "coverageVariable": "__cov__",
        "compact": false,
        "ignoreClassMethods": ["render"],
        "instrumentLog": { "level": "trace", "enableTrace": true }
      })
    );
  }

  #[test]
  fn unknown_instrument_options_reach_the_plugin() {
    let caller = json!({
      "experimental": {
        "customCoverageInstrumentation": {
          "enabled": true,
          "compact": true,
          "unstableInlineSourceMap": true,
          "exclude": ["**/fixtures/**"]
        }
      }
    });
    let experimental =
      ExperimentalOptions::from_caller_options(caller.as_object().unwrap())
        .unwrap();
    let instrument_options = experimental.instrument_options().unwrap();
    assert_eq!(instrument_options.compact, Some(true));
    assert_eq!(
      Value::Object(instrument_options.extra.clone()),
      json!({
        "unstableInlineSourceMap": true,
        "exclude": ["**/fixtures/**"]
      })
    );

    let options = swc_options(json!({ "jsc": {} }));
    let result = insert_instrumentation_options(
      &transform_options(true),
      experimental.can_instrument(),
      &options,
      Some(instrument_options),
    );
    assert_eq!(
      result.plugins(),
      Some(&vec![json!([
        COVERAGE_PLUGIN_NAME,
        {
          "compact": true,
          "unstableInlineSourceMap": true,
          "exclude": ["**/fixtures/**"]
        }
      ])])
    );
  }

  #[test]
  fn missing_experimental_cannot_instrument() {
    let experimental =
      ExperimentalOptions::from_caller_options(&Map::new()).unwrap();
    assert!(!experimental.can_instrument());
    assert_eq!(experimental.instrument_options(), None);

    let caller = json!({
      "experimental": { "customCoverageInstrumentation": {} }
    });
    let experimental =
      ExperimentalOptions::from_caller_options(caller.as_object().unwrap())
        .unwrap();
    assert!(!experimental.can_instrument());
  }

  #[test]
  fn malformed_experimental_is_error() {
    let caller = json!({
      "experimental": { "customCoverageInstrumentation": { "enabled": "yes" } }
    });
    assert!(
      ExperimentalOptions::from_caller_options(caller.as_object().unwrap())
        .is_err()
    );
  }

  #[test]
  fn skips_when_host_does_not_instrument() {
    let options = swc_options(json!({ "jsc": {} }));
    let result = insert_instrumentation_options(
      &transform_options(false),
      true,
      &options,
      None,
    );
    assert!(matches!(result, Cow::Borrowed(_)));
    assert_eq!(count_coverage_plugins(&result), 0);
  }

  #[test]
  fn skips_when_adapter_cannot_instrument() {
    let options = swc_options(json!({ "jsc": {} }));
    let result = insert_instrumentation_options(
      &transform_options(true),
      false,
      &options,
      None,
    );
    assert_eq!(count_coverage_plugins(&result), 0);
  }

  #[test]
  fn appends_plugin_after_existing_ones() {
    let options = swc_options(json!({
      "jsc": { "experimental": { "plugins": [["other-plugin", {}]] } }
    }));
    let instrument_options = InstrumentOptions {
      coverage_variable: Some("__coverage__".to_string()),
      ..Default::default()
    };
    let result = insert_instrumentation_options(
      &transform_options(true),
      true,
      &options,
      Some(&instrument_options),
    );
    assert_eq!(
      result.get(&["jsc", "experimental", "plugins"]),
      Some(&json!([
        ["other-plugin", {}],
        [COVERAGE_PLUGIN_NAME, { "coverageVariable": "__coverage__" }]
      ]))
    );
    // the shared options are left alone
    assert_eq!(options.plugins().map(|p| p.len()), Some(1));
  }

  #[test]
  fn inserts_at_most_once() {
    let options = swc_options(json!({ "jsc": { "target": "es2023" } }));
    let once = insert_instrumentation_options(
      &transform_options(true),
      true,
      &options,
      None,
    );
    assert_eq!(
      once.plugins(),
      Some(&vec![json!([COVERAGE_PLUGIN_NAME, {}])])
    );
    let twice = insert_instrumentation_options(
      &transform_options(true),
      true,
      &once,
      None,
    );
    assert_eq!(count_coverage_plugins(&twice), 1);
    assert_eq!(twice.get(&["jsc", "target"]), Some(&json!("es2023")));
  }
}
