//! wheelhouse: run data-parallel jobs on a local unit pool.
//!
//! Subcommands:
//! - `run`: submit an arbitrary operator over a JSON array
//! - `map`: element-wise expression over a JSON array
//! - `parse-json` / `stringify-json`: JSON helpers executed on a unit
//! - `config`: print the resolved pool configuration
//!
//! Results go to stdout as JSON; logs go to stderr.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use wheelhouse_compute::{Runtime, TaskRequest};
use wheelhouse_core::config::load_dotenv;
use wheelhouse_core::{DataType, Expr, Operator, PoolConfig, SortOrder};

// ── CLI ─────────────────────────────────────────────────────────────

/// Data-parallel task runner over a pool of execution units.
#[derive(Parser, Debug)]
#[command(name = "wheelhouse", version, about)]
struct Cli {
    /// Path to a pool config TOML file.
    #[arg(long, global = true, env = "WHEELHOUSE_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit one task and print its settled output.
    Run {
        /// Operator as JSON, e.g. '{"op":"reduce","reducer":"sum"}'.
        #[arg(long)]
        operator: String,

        /// JSON array input file, or `-` for stdin.
        #[arg(long)]
        input: Option<String>,

        #[arg(long, default_value_t = 1)]
        threads: usize,

        /// Merge per-range outputs into one array.
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        aggregate: bool,

        /// Element type tag (int8, uint8, ..., float64, na).
        #[arg(long)]
        data_type: Option<String>,

        /// Sort order tag (asc, desc, ascAlpha, descAlpha, none).
        #[arg(long)]
        sort: Option<String>,

        /// Memoize the result for identical submissions.
        #[arg(long)]
        memoize: bool,

        /// Auxiliary params as JSON.
        #[arg(long)]
        params: Option<String>,
    },

    /// Evaluate an expression for every element.
    Map {
        /// Expression as JSON, e.g. '{"mul":["x",{"const":2.0}]}'.
        #[arg(long)]
        expr: String,

        #[arg(long)]
        input: String,

        #[arg(long, default_value_t = 1)]
        threads: usize,

        #[arg(long)]
        data_type: Option<String>,
    },

    /// Parse a file as JSON.
    ParseJson { file: PathBuf },

    /// Re-serialize a JSON file compactly.
    StringifyJson { file: PathBuf },

    /// Print the resolved configuration.
    Config,
}

// ── helpers ─────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<PoolConfig> {
    match path {
        Some(p) => PoolConfig::from_file(p)
            .with_context(|| format!("failed to load config from {}", p.display())),
        None => Ok(PoolConfig::from_env()),
    }
}

fn read_source(source: &str) -> Result<String> {
    if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("failed to read {}", source))
    }
}

fn read_input(source: &str) -> Result<Vec<Value>> {
    match serde_json::from_str(&read_source(source)?).context("input is not valid JSON")? {
        Value::Array(items) => Ok(items),
        other => bail!("input must be a JSON array, got {}", json_kind(&other)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn data_type_arg(tag: Option<&str>) -> Result<Option<DataType>> {
    Ok(match tag {
        Some(t) => DataType::parse_tag(t)?,
        None => None,
    })
}

fn sort_arg(tag: Option<&str>) -> Result<Option<SortOrder>> {
    Ok(match tag {
        Some(t) => SortOrder::parse_tag(t)?,
        None => None,
    })
}

/// `run` options other than the input source.
struct RunArgs<'a> {
    operator: &'a str,
    threads: usize,
    aggregate: bool,
    data_type: Option<&'a str>,
    sort: Option<&'a str>,
    memoize: bool,
    params: Option<&'a str>,
}

impl RunArgs<'_> {
    fn request(&self) -> Result<TaskRequest> {
        let operator: Operator =
            serde_json::from_str(self.operator).context("operator is not valid JSON")?;
        let mut request = TaskRequest::new(operator)
            .threads(self.threads)
            .aggregate(self.aggregate);
        // Without the flag the pool's `memoize` setting decides.
        if self.memoize {
            request = request.cacheable(true);
        }
        if let Some(p) = self.params {
            request = request.params(serde_json::from_str(p).context("params are not valid JSON")?);
        }
        request.data_type = data_type_arg(self.data_type)?;
        request.sort = sort_arg(self.sort)?;
        Ok(request)
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let level = if cli.verbose || config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Command::Config = cli.command {
        println!("{}", serde_json::to_string_pretty(&config.summary())?);
        return Ok(());
    }

    config.log_summary();
    let runtime = Runtime::start(config)?;

    let output = match cli.command {
        Command::Run {
            operator,
            input,
            threads,
            aggregate,
            data_type,
            sort,
            memoize,
            params,
        } => {
            let mut request = RunArgs {
                operator: &operator,
                threads,
                aggregate,
                data_type: data_type.as_deref(),
                sort: sort.as_deref(),
                memoize,
                params: params.as_deref(),
            }
            .request()?;
            if let Some(source) = input {
                request = request.input(read_input(&source)?);
            }

            info!(op = request.operator.name(), len = request.input_len(), threads, "Submitting task");
            serde_json::to_value(runtime.submit(request)?.await?)?
        }
        Command::Map {
            expr,
            input,
            threads,
            data_type,
        } => {
            let expr: Expr = serde_json::from_str(&expr).context("expression is not valid JSON")?;
            let output = runtime
                .map(read_input(&input)?, expr, threads, data_type_arg(data_type.as_deref())?)
                .await?;
            serde_json::to_value(output)?
        }
        Command::ParseJson { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            runtime.parse_json(&text).await?
        }
        Command::StringifyJson { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let value: Value = serde_json::from_str(&text).context("file is not valid JSON")?;
            Value::String(runtime.stringify_json(&value).await?)
        }
        Command::Config => runtime.config().summary(),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    let snapshot = runtime.snapshot().await?;
    info!(
        tasks = snapshot.metrics.tasks_submitted,
        units_spawned = snapshot.metrics.units_spawned,
        "Done"
    );
    runtime.shutdown().await;
    Ok(())
}
