/*
 * Copyright (c) 2022 McSib
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::time::Duration;

use console::{Term, style};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

pub(crate) mod link;

/// Banner printed at the top of the menu.
pub(crate) const BANNER: &str = r"
  ___           _              ___   __
 |_ _|_ __   __| | _____  __  / _ \ / _|
  | || '_ \ / _` |/ _ \ \/ / | | | | |_
  | || | | | (_| |  __/>  <  | |_| |  _|
 |___|_| |_|\__,_|\___/_/\_\  \___/|_|
";

/// Template for downloads whose size is known up front.
const SIZED_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks {msg}";

/// Template for downloads without a usable `Content-Length`.
const UNSIZED_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {bytes} {msg}";

/// A builder that helps in making a new [ProgressStyle] for use.
pub(crate) struct ProgressStyleBuilder {
    /// The [ProgressStyle] being built.
    progress_style: ProgressStyle,
}

impl ProgressStyleBuilder {
    /// Sets the template of the progress style, falling back to a plain bar if it does not parse.
    ///
    /// # Arguments
    ///
    /// * `msg_template`: The template to use.
    pub(crate) fn template(mut self, msg_template: &str) -> Self {
        match self.progress_style.clone().template(msg_template) {
            Ok(style) => self.progress_style = style,
            Err(err) => {
                warn!("Template error with '{}': {}. Using default bar.", msg_template, err);
                self.progress_style = ProgressStyle::default_bar();
            }
        }
        self
    }

    /// Sets the progress style chars.
    pub(crate) fn progress_chars(mut self, chars: &str) -> Self {
        self.progress_style = self.progress_style.progress_chars(chars);
        self
    }

    pub(crate) fn build(self) -> ProgressStyle {
        self.progress_style
    }
}

impl Default for ProgressStyleBuilder {
    fn default() -> Self {
        Self {
            progress_style: ProgressStyle::default_bar(),
        }
    }
}

/// A builder that helps in initializing and configuring a new [ProgressBar] for use.
pub(crate) struct ProgressBarBuilder {
    /// The [ProgressBar] to build.
    progress_bar: ProgressBar,
}

impl ProgressBarBuilder {
    /// Creates a bar with a known length.
    pub(crate) fn new(len: u64) -> Self {
        Self {
            progress_bar: ProgressBar::new(len),
        }
    }

    /// Creates a spinner for work of unknown length.
    pub(crate) fn spinner() -> Self {
        Self {
            progress_bar: ProgressBar::new_spinner(),
        }
    }

    /// Sets the style of the progress bar to the style given.
    pub(crate) fn style(self, progress_style: ProgressStyle) -> Self {
        self.progress_bar.set_style(progress_style);
        self
    }

    /// Sets the draw target (output) of the progress bar to the target given.
    pub(crate) fn draw_target(self, target: ProgressDrawTarget) -> Self {
        self.progress_bar.set_draw_target(target);
        self
    }

    /// Sets the steady tick's duration to the given duration.
    pub(crate) fn steady_tick(self, duration: Duration) -> Self {
        self.progress_bar.enable_steady_tick(duration);
        self
    }

    /// Sets the message shown after the bar.
    pub(crate) fn message(self, msg: String) -> Self {
        self.progress_bar.set_message(msg);
        self
    }

    /// Returns the newly built progress bar.
    pub(crate) fn build(self) -> ProgressBar {
        self.progress_bar
    }
}

/// Builds the per-file progress bar.
///
/// A determinate bar counting chunks when `expected_chunks` is known, otherwise a spinner
/// counting bytes. Hidden bars draw nothing, which keeps test output clean.
pub(crate) fn file_progress_bar(expected_chunks: Option<u64>, label: String, visible: bool) -> ProgressBar {
    let target = if visible {
        ProgressDrawTarget::stderr_with_hz(5)
    } else {
        ProgressDrawTarget::hidden()
    };

    let builder = match expected_chunks {
        Some(len) => ProgressBarBuilder::new(len).style(
            ProgressStyleBuilder::default()
                .template(SIZED_TEMPLATE)
                .progress_chars("#>-")
                .build(),
        ),
        None => ProgressBarBuilder::spinner()
            .style(ProgressStyleBuilder::default().template(UNSIZED_TEMPLATE).build()),
    };

    let builder = builder.draw_target(target).message(label);
    if visible {
        builder.steady_tick(Duration::from_millis(200)).build()
    } else {
        builder.build()
    }
}

/// Clears the terminal. Falls back to a few blank lines when stdout is not a terminal.
pub(crate) fn clear_screen() {
    let term = Term::stdout();
    if term.clear_screen().is_err() {
        println!("\n\n\n");
    }
}

/// Prints the banner in the accent color.
pub(crate) fn print_banner() {
    println!("{}", style(BANNER).cyan().bold());
}

/// Clears the screen and re-prints the banner so it stays on top.
pub(crate) fn clear_below_banner() {
    clear_screen();
    print_banner();
}
