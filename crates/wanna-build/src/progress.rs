//! ビルド・プッシュ中のスピナー表示

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICK: Duration = Duration::from_millis(120);

pub struct Progress {
    bar: ProgressBar,
}

impl Progress {
    pub fn start(message: impl Into<String>) -> Self {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);
        bar.enable_steady_tick(TICK);
        bar.set_message(message.into());
        Self { bar }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    pub fn succeed(&self, message: impl Into<String>) {
        self.bar
            .finish_with_message(format!("{} {}", "✓".green(), message.into()));
    }

    /// 失敗時はスピナーを残したまま止める
    pub fn fail(&self, error: impl Into<String>) {
        self.bar
            .abandon_with_message(format!("{} {}", "✗".red(), error.into()));
    }
}
