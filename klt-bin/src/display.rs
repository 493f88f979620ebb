// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A module for a fancy output for "klt-bin".

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use termcolor::Color;
use termcolor::ColorChoice;
use termcolor::ColorSpec;
use termcolor::StandardStream;
use termcolor::WriteColor;

const CRATE_VERSION: &str = match option_env!("CARGO_PKG_VERSION") {
    Some(v) => v,
    None => "unknown",
};
const DEFAULT_CONFIG_NAME: &str = "[default]";
const UNKNOWN_CONFIG_NAME: &str = "[unknown]";
const UNKNOWN_NAME: &str = "[unknown]";
const NO_OUTPUT_NAME: &str = "[none]";

fn file_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || UNKNOWN_NAME.to_owned(),
        |s| s.to_string_lossy().to_string(),
    )
}

pub struct IoArgs {
    config_path: Option<PathBuf>,
    input_path: PathBuf,
    output_paths: Vec<PathBuf>,
}

impl IoArgs {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>, R: AsRef<Path>>(
        config_path: &Option<P>,
        input_path: Q,
        output_paths: &[Option<R>],
    ) -> Self {
        Self {
            config_path: config_path.as_ref().map(|x| x.as_ref().to_path_buf()),
            input_path: input_path.as_ref().to_path_buf(),
            output_paths: output_paths
                .iter()
                .flatten()
                .map(|p| p.as_ref().to_path_buf())
                .collect(),
        }
    }

    pub fn output_names(&self) -> String {
        if self.output_paths.is_empty() {
            return NO_OUTPUT_NAME.to_owned();
        }
        self.output_paths
            .iter()
            .map(|p| file_name(p))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn input_name(&self) -> String {
        file_name(&self.input_path)
    }

    pub fn config_name(&self) -> String {
        self.config_path.as_ref().map_or_else(
            || DEFAULT_CONFIG_NAME.to_owned(),
            |p| {
                p.file_stem().map_or_else(
                    || UNKNOWN_CONFIG_NAME.to_owned(),
                    |n| n.to_string_lossy().to_string(),
                )
            },
        )
    }
}

pub enum Progress {
    Started,
    Done {
        analysis_time: Duration,
        window_count: usize,
        failed_windows: usize,
    },
}

fn terminal_output() -> Arc<termcolor::StandardStream> {
    Arc::new(StandardStream::stderr(ColorChoice::Auto))
}

/// Show the initial banner.
pub fn show_banner() -> Result<(), std::io::Error> {
    let termout = terminal_output();
    let mut termout = termout.lock();
    termout.set_color(ColorSpec::new().set_bold(true))?;
    write!(termout, "\n{:>10} ", "klt")?;
    termout.reset()?;
    writeln!(
        termout,
        "(engine v{}, CLI v{})",
        klt::constant::build_info::CRATE_VERSION,
        CRATE_VERSION
    )
}

pub fn show_progress(io: &IoArgs, progress: &Progress) -> Result<(), std::io::Error> {
    let termout = terminal_output();
    let mut termout = termout.lock();
    match *progress {
        Progress::Started => {
            termout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true))?;
            write!(termout, "{:>10} ", "Analyzing")?;
            termout.reset()?;
            writeln!(
                termout,
                "{} => {} [{}]",
                io.input_name(),
                io.output_names(),
                io.config_name()
            )
        }
        Progress::Done {
            analysis_time,
            window_count,
            failed_windows,
        } => {
            let color = if failed_windows == 0 {
                Color::Green
            } else {
                Color::Yellow
            };
            termout.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
            write!(termout, "{:>10} ", "Analyzed")?;
            termout.reset()?;
            writeln!(
                termout,
                "{} windows ({} failed) in {:.3} secs",
                window_count,
                failed_windows,
                analysis_time.as_secs_f32()
            )?;
            writeln!(termout)
        }
    }
}
