use std::env;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use chm2docset_core::assemble::{BuildReport, BundleAssembler};
use chm2docset_core::config::{BundleConfig, ConfigOverrides, DEFAULT_OUT_DIR, DEFAULT_PLATFORM};
use chm2docset_core::extract::CommandExtractor;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "chm2docset",
    version,
    about = "Convert a compiled HTML help archive (.chm) into a Dash/Zeal docset"
)]
struct Cli {
    #[arg(
        long,
        value_name = "FAMILY",
        default_value = DEFAULT_PLATFORM,
        help = "DocSet platform family"
    )]
    platform: String,
    #[arg(
        long,
        value_name = "PATH",
        default_value = DEFAULT_OUT_DIR,
        help = "Output directory, or a path ending in .docset to use as the bundle root"
    )]
    out: PathBuf,
    #[arg(
        long,
        value_name = "PATH",
        help = "Extraction program (default: $CHM2DOCSET_EXTRACTOR or extract_chmLib)"
    )]
    extractor: Option<PathBuf>,
    #[arg(long, help = "Print the build report as JSON")]
    json: bool,
    #[arg(long, help = "Print resolved configuration and paths before building")]
    diagnostics: bool,
    #[arg(short, long, help = "Log pipeline stages to stderr")]
    verbose: bool,
    #[arg(value_name = "INPUT")]
    source: PathBuf,
}

/// Flags that are also accepted with a single leading dash (`-platform mac`).
const SINGLE_DASH_LONG_FLAGS: [&str; 2] = ["platform", "out"];

fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_args(env::args_os()));
    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = BundleConfig::resolve(
        cli.source,
        &ConfigOverrides {
            platform: Some(cli.platform),
            out_dir: Some(cli.out),
            extractor: cli.extractor,
        },
    );
    if cli.diagnostics {
        println!("[diagnostics]\n{}\n", config.diagnostics());
    }

    let extractor = CommandExtractor::new(config.extractor.clone());
    let mut assembler = BundleAssembler::new(config, extractor);
    let report = assembler.run()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Rewrite `-platform`/`-out` (and `-out=PATH`) to their `--` spelling.
///
/// Arguments after `--` are passed through untouched.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut out = Vec::new();
    let mut positional_only = false;
    for arg in args {
        if positional_only {
            out.push(arg);
            continue;
        }
        let rewritten = arg.to_str().and_then(|value| {
            let flag = value.strip_prefix('-')?;
            if flag.starts_with('-') {
                return None;
            }
            let name = flag.split_once('=').map_or(flag, |(name, _)| name);
            SINGLE_DASH_LONG_FLAGS
                .contains(&name)
                .then(|| OsString::from(format!("-{value}")))
        });
        if arg == "--" {
            positional_only = true;
        }
        out.push(rewritten.unwrap_or(arg));
    }
    out
}

fn print_report(report: &BuildReport) {
    println!("docset build");
    println!("bundle_path: {}", report.bundle_path);
    println!("content_path: {}", report.content_path);
    println!("database_path: {}", report.database_path);
    println!("manifest_path: {}", report.manifest_path);
    println!("bundle_identifier: {}", report.bundle_identifier);
    println!("display_name: {}", report.display_name);
    println!(
        "platform_family: {}",
        if report.platform_family.is_empty() {
            "<empty>"
        } else {
            report.platform_family.as_str()
        }
    );
    println!("index.html_files: {}", report.index.html_files);
    println!("index.inserted_records: {}", report.index.inserted_records);
    println!("index.duplicate_records: {}", report.index.duplicate_records);
    println!("index.untitled_files: {}", report.index.untitled_files);
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
