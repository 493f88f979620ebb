// Copyright 2022 Google LLC
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

// Note that clippy attributes should be in sync with those declared in "lib.rs"
#![warn(clippy::all, clippy::nursery, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::multiple_crate_versions,
    clippy::must_use_candidate
)]
// Some from restriction lint-group
#![warn(
    clippy::clone_on_ref_ptr,
    clippy::create_dir,
    clippy::dbg_macro,
    clippy::empty_structs_with_brackets,
    clippy::exit,
    clippy::if_then_some_else_none,
    clippy::impl_trait_in_params,
    clippy::let_underscore_must_use,
    clippy::lossy_float_literal,
    clippy::multiple_inherent_impl,
    clippy::print_stdout,
    clippy::rc_buffer,
    clippy::rc_mutex,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::separated_literal_suffix,
    clippy::str_to_string,
    clippy::string_add,
    clippy::string_to_string,
    clippy::try_err,
    clippy::unnecessary_self_imports,
    clippy::wildcard_enum_match_arm
)]

use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::time::Instant;

use clap::Parser;
use log::info;
#[cfg(feature = "pprof")]
use pprof::protos::Message;

use klt::config;
use klt::constant::MAX_OVERLAP;
use klt::constant::MIN_ACM_ORDER;
use klt::constant::MIN_INPUT_LEN;
use klt::engine::WindowOutput;
use klt::error::Verify;

mod display;
mod source;

use display::Progress;
use source::RawFileSource;

/// Truncated KLT analyzer for complex signals.
///
/// The input file must contain interleaved little-endian `f32` pairs (real,
/// imaginary). Every output file is written as raw little-endian values
/// concatenated over the windows.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path for the input signal file.
    source: String,
    /// If set, load config from the specified file.
    #[clap(short, long)]
    config: Option<String>,
    /// If set, dump the config used to the specified path.
    #[clap(long)]
    dump_config: Option<String>,
    /// Path for the weighted basis (`acm_order * num_eig` complex values per window).
    #[clap(long)]
    basis: Option<String>,
    /// Path for the projection coefficients (`num_eig` complex values per window).
    #[clap(long)]
    coefs: Option<String>,
    /// Path for the eigenvalues (`num_eig` real values per window).
    #[clap(long)]
    eigenvalues: Option<String>,
    /// Apply the HFT90D flat-top window before the analysis.
    #[clap(long)]
    window: bool,
    /// Divide the eigenvalues of each window by the largest one.
    #[clap(long)]
    normalize: bool,
    /// Number of samples in a window.
    #[clap(long)]
    input_len: Option<usize>,
    /// Order of the auto-correlation matrix.
    #[clap(long)]
    acm_order: Option<usize>,
    /// Number of eigenpairs retained.
    #[clap(long)]
    num_eig: Option<usize>,
    /// Fraction of a window shared with the next window.
    #[clap(long)]
    overlap: Option<f32>,
    /// If set, dump profiler output to the specified path.
    #[cfg(feature = "pprof")]
    #[clap(long)]
    pprof_output: Option<String>,
}

/// Exit codes of the analyzer process.
enum ExitCode {
    #[allow(dead_code)]
    Normal = 0,
    InvalidConfig = -1,
}

/// Overrides `config` with command-line arguments.
///
/// Sizes are clamped into their valid ranges whenever one of them is given
/// on the command line.
fn apply_args(args: &Args, config: &mut config::Analyzer) {
    if args.window {
        config.klt.window = config::Window::Hft90d;
    }
    if args.normalize {
        config.klt.normalize_eigenvalues = true;
    }
    if let Some(overlap) = args.overlap {
        config.overlap = if overlap.is_nan() {
            0.0
        } else {
            overlap.clamp(0.0, MAX_OVERLAP)
        };
    }
    if args.input_len.is_none() && args.acm_order.is_none() && args.num_eig.is_none() {
        return;
    }
    let klt = &mut config.klt;
    klt.input_len = args.input_len.unwrap_or(klt.input_len).max(MIN_INPUT_LEN);
    klt.acm_order = args
        .acm_order
        .unwrap_or(klt.acm_order)
        .clamp(MIN_ACM_ORDER, klt.input_len);
    klt.num_eig = args.num_eig.unwrap_or(klt.num_eig).clamp(1, klt.acm_order);
}

/// Optional output file.
struct OutputFile(Option<BufWriter<File>>);

impl OutputFile {
    #[allow(clippy::expect_used)]
    fn create(path: &Option<String>) -> Self {
        Self(
            path.as_ref()
                .map(|p| BufWriter::new(File::create(p).expect("Failed to create a file."))),
        )
    }

    #[allow(clippy::expect_used)]
    fn write_with<F>(&mut self, f: F)
    where
        F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
    {
        if let Some(w) = self.0.as_mut() {
            f(w).expect("File write failed.");
        }
    }

    #[allow(clippy::expect_used)]
    fn finish(self) {
        if let Some(mut w) = self.0 {
            w.flush().expect("File write failed.");
        }
    }
}

fn log_build_constants() {
    info!(
        target: "klt-bin::build_info::jsonl",
        "{{ version: \"{}\", cli_version: \"{}\" }}",
        klt::constant::build_info::CRATE_VERSION,
        env!("CARGO_PKG_VERSION"),
    );
}

#[allow(clippy::let_underscore_must_use, clippy::expect_used)]
fn main_body(args: Args) -> Result<(), i32> {
    let io_info = display::IoArgs::new(
        &args.config,
        &args.source,
        &[
            args.basis.as_ref(),
            args.coefs.as_ref(),
            args.eigenvalues.as_ref(),
        ],
    );
    let _ = display::show_banner();
    log_build_constants();
    let mut analyzer_config = args
        .config
        .as_ref()
        .map_or_else(config::Analyzer::default, |path| {
            let conf_str = std::fs::read_to_string(path).expect("Config file read error.");
            toml::from_str(&conf_str).expect("Config file syntax error.")
        });
    apply_args(&args, &mut analyzer_config);
    if let Err(e) = analyzer_config.verify() {
        eprintln!("Error: {}", e.within("analyzer_config"));
        return Err(ExitCode::InvalidConfig as i32);
    }

    if let Some(path) = &args.dump_config {
        let mut file = File::create(path).expect("Failed to create a file.");
        file.write_all(
            toml::to_string(&analyzer_config)
                .expect("Config serialization failed.")
                .as_bytes(),
        )
        .expect("File write failed.");
    }

    let _ = display::show_progress(&io_info, &Progress::Started);

    let source = RawFileSource::from_path(&args.source).expect("Failed to load input source.");
    let mut basis_out = OutputFile::create(&args.basis);
    let mut coefs_out = OutputFile::create(&args.coefs);
    let mut eigenvalues_out = OutputFile::create(&args.eigenvalues);
    let mut failed_windows = 0usize;
    let analysis_start = Instant::now();

    let window_count = klt::analyze(&analyzer_config, source, |out: WindowOutput| {
        if out.status.is_err() {
            failed_windows += 1;
        }
        basis_out.write_with(|w| out.write_basis(w));
        coefs_out.write_with(|w| out.write_coefficients(w));
        eigenvalues_out.write_with(|w| out.write_eigenvalues(w));
    })
    .expect("Analysis error.");
    basis_out.finish();
    coefs_out.finish();
    eigenvalues_out.finish();

    let _ = display::show_progress(
        &io_info,
        &Progress::Done {
            analysis_time: analysis_start.elapsed(),
            window_count,
            failed_windows,
        },
    );
    Ok(())
}

#[cfg(feature = "pprof")]
fn run_with_profiler_if_requested<F>(args: Args, body: F) -> Result<(), i32>
where
    F: FnOnce(Args) -> Result<(), i32>,
{
    if let Some(ref profiler_out) = args.pprof_output {
        let profiler_out = profiler_out.clone();
        let guard = pprof::ProfilerGuardBuilder::default()
            .frequency(1000)
            .blocklist(&["libc", "libgcc", "pthread", "vdso"])
            .build()
            .unwrap();
        let result = body(args);
        if let Ok(report) = guard.report().build() {
            let mut file = File::create(&profiler_out).unwrap();
            let profile = report.pprof().unwrap();

            let mut content = Vec::new();
            profile.write_to_vec(&mut content).unwrap();
            file.write_all(&content).unwrap();
        };
        result
    } else {
        body(args)
    }
}

#[cfg(not(feature = "pprof"))]
#[inline]
fn run_with_profiler_if_requested<F>(args: Args, body: F) -> Result<(), i32>
where
    F: FnOnce(Args) -> Result<(), i32>,
{
    body(args)
}

#[allow(clippy::expect_used)]
fn main() -> Result<(), i32> {
    env_logger::Builder::from_env("KLT_LOG")
        .format_timestamp(None)
        .init();
    run_with_profiler_if_requested(Args::parse(), main_body)
}
