//! Log output settings shared by hosts and the telemetry bootstrap.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// `tracing` target carrying plugin lifecycle transitions.
pub const LIFECYCLE_TARGET: &str = "tether::lifecycle";

/// Level at which lifecycle transitions are kept when the configured filter
/// does not mention [`LIFECYCLE_TARGET`].
pub const LIFECYCLE_LEVEL: &str = "info";

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened to the top level.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Extends `filter` so lifecycle transitions stay visible.
///
/// A host running at `warn` still records plugin starts, restarts, and
/// stops. A filter that names [`LIFECYCLE_TARGET`] itself is returned
/// unchanged, so `tether::lifecycle=off` silences them.
#[must_use]
pub fn effective_log_filter(filter: &str) -> String {
    let trimmed = filter.trim().trim_end_matches(',');
    let names_lifecycle = trimmed
        .split(',')
        .any(|directive| directive.trim().starts_with(LIFECYCLE_TARGET));
    if names_lifecycle {
        return trimmed.to_owned();
    }
    let lifecycle = format!("{LIFECYCLE_TARGET}={LIFECYCLE_LEVEL}");
    if trimmed.is_empty() {
        lifecycle
    } else {
        format!("{trimmed},{lifecycle}")
    }
}
