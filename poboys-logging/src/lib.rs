//! Tracing subscriber setup shared by the poboys binaries.
//!
//! Behaviour is driven entirely by environment variables so that the same
//! binary can log human-readable output on a developer machine and JSON into
//! a rolling file on a server:
//!
//! | Variable        | Values                       | Default              |
//! |-----------------|------------------------------|----------------------|
//! | `LOG_LEVEL`     | any `EnvFilter` directive    | `info`               |
//! | `LOG_FORMAT`    | `human`, `json`              | `human`              |
//! | `LOG_OUTPUT`    | `console`, `file`, `both`    | `console`            |
//! | `LOG_FILE_PATH` | path of the rolling log file | `/tmp/poboys.log`    |
//!
//! `RUST_LOG` takes precedence over `LOG_LEVEL` when it is set.

use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::Directive, fmt::MakeWriter, prelude::*, registry, EnvFilter};

const DEFAULT_LOG_FILE: &str = "/tmp/poboys.log";

/// Where formatted events are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
    /// Anything unrecognised: install the filter but no formatter.
    Silent,
}

impl LogOutput {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "console" => LogOutput::Console,
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            _ => LogOutput::Silent,
        }
    }

    fn console(self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }

    fn file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

/// Logging settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
    pub output: LogOutput,
    pub file_path: PathBuf,
}

impl LogSettings {
    /// Read `LOG_LEVEL`, `LOG_FORMAT`, `LOG_OUTPUT` and `LOG_FILE_PATH`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let json = lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json"));
        let output = LogOutput::parse(&lookup("LOG_OUTPUT").unwrap_or_else(|| "console".into()));
        let file_path = lookup("LOG_FILE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));

        Self {
            level,
            json,
            output,
            file_path,
        }
    }

    /// Directory and file name handed to the daily rolling appender.
    fn file_parts(&self) -> (&Path, &Path) {
        let dir = self
            .file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = self
            .file_path
            .file_name()
            .map(Path::new)
            .unwrap_or_else(|| Path::new("poboys.log"));
        (dir, name)
    }
}

// Writes every buffer to both sinks; succeeds if either one does.
struct Tee<A, B> {
    a: A,
    b: B,
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res_a = self.a.write(buf);
        let res_b = self.b.write(buf);
        res_a.or(res_b)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.a.flush()?;
        self.b.flush()
    }
}

#[derive(Clone)]
struct MakeTee<A, B> {
    make_a: A,
    make_b: B,
}

impl<'a, A, B> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a>,
    B: MakeWriter<'a>,
{
    type Writer = Tee<A::Writer, B::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            a: self.make_a.make_writer(),
            b: self.make_b.make_writer(),
        }
    }
}

fn env_filter(level: &str) -> EnvFilter {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    ["tokio=warn", "hyper=warn", "aws_smithy_runtime=warn", "aws_config=warn"]
        .iter()
        .filter_map(|d| d.parse::<Directive>().ok())
        .fold(filter, |f, directive| f.add_directive(directive))
}

/// Initialise the global subscriber from the environment.
///
/// The returned guard flushes the file writer on drop, so `main` must keep it
/// alive for as long as it logs.
pub fn init_subscriber() -> Option<WorkerGuard> {
    init_with(&LogSettings::from_env())
}

/// Initialise the global subscriber from explicit settings.
pub fn init_with(settings: &LogSettings) -> Option<WorkerGuard> {
    let subscriber = registry().with(env_filter(&settings.level));
    let (dir, name) = settings.file_parts();

    macro_rules! finish {
        ($writer:expr) => {{
            let layer = tracing_subscriber::fmt::layer().with_writer($writer);
            if settings.json {
                subscriber.with(layer.json()).init();
            } else {
                subscriber.with(layer.compact()).init();
            }
        }};
    }

    match (settings.output.console(), settings.output.file()) {
        (true, true) => {
            let (non_blocking, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
            finish!(MakeTee {
                make_a: std::io::stdout,
                make_b: non_blocking,
            });
            Some(guard)
        }
        (true, false) => {
            finish!(std::io::stdout);
            None
        }
        (false, true) => {
            let (non_blocking, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
            finish!(non_blocking);
            Some(guard)
        }
        (false, false) => {
            subscriber.init();
            None
        }
    }
}
