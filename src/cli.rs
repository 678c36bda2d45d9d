use std::path::PathBuf;

use clap::Parser;

use crate::settings::{SettingsInput, StartMode, UiMode};

#[derive(Parser, Debug)]
#[command(name = "futaba-replay")]
#[command(version)]
#[command(about = "Replay an imageboard thread, following posts at the pace they were written")]
pub struct Args {
    /// Thread page to replay: an http(s) URL or a saved HTML file
    pub source: String,

    /// How --start is interpreted
    #[arg(long, value_enum, default_value = "index")]
    pub start_mode: StartMode,

    /// Start anchor: response index, timestamp (24/11/02(土)12:00:00) or post number
    #[arg(long, default_value = "0")]
    pub start: String,

    /// Playback speed multiplier (0.1 to 10)
    #[arg(long, default_value = "1.0")]
    pub speed: String,

    /// Extra thread URL to merge in before playback (repeatable)
    #[arg(long = "merge", value_name = "URL")]
    pub merge: Vec<String>,

    /// Status display mode
    #[arg(long, value_enum, default_value = "persistent")]
    pub ui_mode: UiMode,

    /// TOML config file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Start playing immediately instead of waiting for the pause key
    #[arg(long)]
    pub autoplay: bool,

    /// Print status updates as JSON lines instead of text
    #[arg(long)]
    pub json_status: bool,
}

impl Args {
    /// Raw form values, validated by [`SettingsInput::parse`].
    pub fn settings_input(&self) -> SettingsInput {
        SettingsInput {
            start_mode: self.start_mode,
            start_value: self.start.clone(),
            speed: self.speed.clone(),
            additional_urls: self.merge.join("\n"),
            ui_mode: self.ui_mode,
        }
    }

    pub fn is_remote(&self) -> bool {
        let lower = self.source.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}
