use clap::{CommandFactory, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;

use xunpack_core::actions::Action;
use xunpack_core::config::{
    load_config, load_config_from, progress_from_config, security_limits_from_config,
};
use xunpack_core::orchestrator::{Orchestrator, Request};
use xunpack_core::resolver::BuiltinResolver;

#[derive(Parser)]
#[command(name = "xunpack")]
#[command(about = "Detect, list, test and extract archives")]
#[command(version)]
struct Cli {
    /// Archive to process
    file: Option<PathBuf>,

    /// Output directory for extraction
    #[arg(short, long, value_name = "DIRECTORY")]
    output: Option<PathBuf>,

    /// Extract the archive (default action)
    #[arg(short = 'x', long)]
    extract: bool,

    /// List archive contents
    #[arg(short, long)]
    list: bool,

    /// Test archive integrity
    #[arg(short, long)]
    test: bool,

    /// Do not render the progress line
    #[arg(long)]
    no_progress: bool,

    /// Output the result as JSON
    #[arg(long)]
    json: bool,

    /// Config file (default: ~/.config/xunpack/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let Some(input) = cli.file.clone() else {
        eprintln!("Error: No input file specified");
        eprintln!();
        let _ = Cli::command().write_help(&mut io::stderr());
        std::process::exit(1);
    };

    if let Err(e) = run(&cli, input) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli, input: PathBuf) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    };
    tracing::debug!(?config, "configuration loaded");
    let resolver = BuiltinResolver::new(security_limits_from_config(&config.security));
    let progress = progress_from_config(&config.progress);

    let bar = (config.progress.enabled && !cli.no_progress).then(progress_bar);
    if let Some(bar) = &bar {
        let bar = bar.clone();
        progress.set_callback(move |snapshot| bar.set_message(snapshot.render_line()));
    }

    let request = Request::new(input, Action::from_flags(cli.list, cli.test, cli.extract))
        .with_output_dir(cli.output.clone())
        .with_temp_root(config.test.temp_root.clone());

    let mut orchestrator = Orchestrator::new(&resolver, &progress);
    let result = if cli.json {
        orchestrator.run(&request, &mut io::sink())
    } else {
        let mut out = SuspendingWriter {
            inner: io::stdout().lock(),
            bar: bar.as_ref(),
        };
        orchestrator.run(&request, &mut out)
    };

    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    let report = result?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

/// Single in-place status line on stderr, fed by the progress callback.
fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        bar.set_style(style);
    }
    bar
}

/// Stdout writer that hides the progress line while informational text is printed.
struct SuspendingWriter<'a, W: Write> {
    inner: W,
    bar: Option<&'a ProgressBar>,
}

impl<W: Write> Write for SuspendingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let inner = &mut self.inner;
        match self.bar {
            Some(bar) => bar.suspend(|| inner.write(buf)),
            None => inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
