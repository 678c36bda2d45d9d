//! Playback settings and the settings-form submission rules.

use serde::{Deserialize, Serialize};

use crate::error::{SettingsError, SettingsField};
use crate::validation::{
    validate_post_number_text, validate_speed_multiplier, validate_thread_url,
    validate_timestamp_text,
};

/// Where playback is anchored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum StartAnchor {
    /// 0-based response index (or explicit response-number annotation).
    Index(usize),
    /// Timestamp text in either accepted shape.
    Timestamp(String),
    /// Post number text, `No.<digits>` or bare digits.
    No(String),
}

impl StartAnchor {
    pub fn mode(&self) -> StartMode {
        match self {
            StartAnchor::Index(_) => StartMode::Index,
            StartAnchor::Timestamp(_) => StartMode::Timestamp,
            StartAnchor::No(_) => StartMode::No,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StartMode {
    #[default]
    Index,
    Timestamp,
    No,
}

/// How the status display behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum UiMode {
    /// Show status briefly after each change.
    AutoHide,
    /// Keep status visible.
    #[default]
    Persistent,
}

/// Validated user configuration. Immutable once playback starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSettings {
    pub start: StartAnchor,
    pub speed_multiplier: f64,
    pub additional_thread_urls: Vec<String>,
    pub ui_mode: UiMode,
}

impl Default for ThreadSettings {
    fn default() -> Self {
        Self {
            start: StartAnchor::Index(0),
            speed_multiplier: 1.0,
            additional_thread_urls: Vec::new(),
            ui_mode: UiMode::default(),
        }
    }
}

/// Raw settings-form values, before validation.
#[derive(Debug, Clone, Default)]
pub struct SettingsInput {
    pub start_mode: StartMode,
    pub start_value: String,
    pub speed: String,
    /// Newline-separated; blank lines are ignored.
    pub additional_urls: String,
    pub ui_mode: UiMode,
}

impl SettingsInput {
    /// Validate the submission, naming the first offending field.
    pub fn parse(&self) -> Result<ThreadSettings, SettingsError> {
        let speed_raw: f64 = self.speed.trim().parse().unwrap_or(f64::NAN);
        let speed_multiplier =
            validate_speed_multiplier(speed_raw).map_err(|e| SettingsError {
                field: SettingsField::SpeedMultiplier,
                message: e.message,
            })?;

        let value = self.start_value.trim();
        let start = match self.start_mode {
            StartMode::Index => value.parse::<usize>().map(StartAnchor::Index).map_err(|_| {
                start_error("response index must be an integer of 0 or more")
            })?,
            StartMode::Timestamp if value.is_empty() => {
                return Err(start_error("enter a timestamp"));
            }
            StartMode::Timestamp => validate_timestamp_text(value)
                .map(StartAnchor::Timestamp)
                .map_err(|e| start_error(&e.message))?,
            StartMode::No if value.is_empty() => {
                return Err(start_error("enter a post number"));
            }
            StartMode::No => {
                validate_post_number_text(value).map_err(|e| start_error(&e.message))?;
                StartAnchor::No(value.to_string())
            }
        };

        let additional_thread_urls = self
            .additional_urls
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                validate_thread_url(line).map_err(|e| SettingsError {
                    field: SettingsField::Urls,
                    message: format!("{}: {line}", e.message),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ThreadSettings {
            start,
            speed_multiplier,
            additional_thread_urls,
            ui_mode: self.ui_mode,
        })
    }
}

fn start_error(message: &str) -> SettingsError {
    SettingsError {
        field: SettingsField::StartValue,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(mode: StartMode, value: &str) -> SettingsInput {
        SettingsInput {
            start_mode: mode,
            start_value: value.to_string(),
            speed: "1.0".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn index_mode_parses_integer() {
        let settings = input(StartMode::Index, " 3 ").parse().unwrap();
        assert_eq!(settings.start, StartAnchor::Index(3));
        assert_eq!(settings.speed_multiplier, 1.0);
    }

    #[test]
    fn index_mode_rejects_negative_and_fraction() {
        for bad in ["-1", "1.5", "abc", ""] {
            let err = input(StartMode::Index, bad).parse().unwrap_err();
            assert_eq!(err.field, SettingsField::StartValue, "input: {bad}");
        }
    }

    #[test]
    fn timestamp_and_no_require_values() {
        assert_eq!(
            input(StartMode::Timestamp, "  ").parse().unwrap_err().field,
            SettingsField::StartValue
        );
        assert_eq!(
            input(StartMode::No, "").parse().unwrap_err().field,
            SettingsField::StartValue
        );
        assert_eq!(
            input(StartMode::No, "No.5").parse().unwrap().start,
            StartAnchor::No("No.5".to_string())
        );
    }

    #[test]
    fn malformed_anchor_text_is_rejected() {
        let err = input(StartMode::Timestamp, "yesterday").parse().unwrap_err();
        assert_eq!(err.field, SettingsField::StartValue);
        assert!(err.message.contains("timestamp must look like"));

        let err = input(StartMode::No, "No.abc").parse().unwrap_err();
        assert_eq!(err.field, SettingsField::StartValue);
        assert!(err.message.contains("post number must look like"));

        assert_eq!(
            input(StartMode::Timestamp, "2024/11/02 12:00:00").parse().unwrap().start,
            StartAnchor::Timestamp("2024/11/02 12:00:00".to_string())
        );
    }

    #[test]
    fn huge_speed_is_accepted() {
        let mut raw = input(StartMode::Index, "0");
        raw.speed = "1e15".to_string();
        assert_eq!(raw.parse().unwrap().speed_multiplier, 1e15);
    }

    #[test]
    fn speed_is_validated_first() {
        let mut raw = input(StartMode::Index, "x");
        raw.speed = "0".to_string();
        assert_eq!(raw.parse().unwrap_err().field, SettingsField::SpeedMultiplier);
        raw.speed = "fast".to_string();
        assert_eq!(raw.parse().unwrap_err().field, SettingsField::SpeedMultiplier);
    }

    #[test]
    fn url_lines_are_trimmed_and_checked() {
        let mut raw = input(StartMode::Index, "0");
        raw.additional_urls =
            "https://a.example/res/1.htm\r\n\n  http://b.example/res/2.htm  \n".to_string();
        let settings = raw.parse().unwrap();
        assert_eq!(settings.additional_thread_urls.len(), 2);

        raw.additional_urls = "https://a.example/1\nftp://nope".to_string();
        let err = raw.parse().unwrap_err();
        assert_eq!(err.field, SettingsField::Urls);
        assert!(err.message.contains("ftp://nope"));
    }

    #[test]
    fn start_mode_tags() {
        assert_eq!(StartAnchor::Timestamp("x".into()).mode(), StartMode::Timestamp);
        assert_eq!(StartAnchor::Index(0).mode(), StartMode::Index);
    }
}
