use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mathcheck::limit::{check_limit_against, LimitError};
use mathcheck::policy::ConfigError;
use mathcheck::utils::span::parse_error_snippet;
use mathcheck::{
	check_integral_final, check_limit, check_step, normalize_with, verify_sequence, CheckPolicy, LimitPoint, ParseError,
	RequestError, StepResult, TaskView,
};

/// Проверка пошаговых решений: пределы, интегралы, уравнения.
#[derive(Parser)]
#[command(name = "mathcheck", version)]
struct Cli {
	/// Политика проверки в формате TOML.
	#[arg(long, global = true, value_name = "FILE")]
	config: Option<PathBuf>,
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Каноническая форма выражения.
	Normalize { expr: String },
	/// Равносильны ли два соседних шага.
	Step { prev: String, curr: String },
	/// Предел выражения.
	Limit {
		expr: String,
		#[arg(long, default_value = "x")]
		var: String,
		#[arg(long, default_value = "oo", allow_hyphen_values = true)]
		point: String,
		#[arg(long, allow_hyphen_values = true)]
		expected: Option<String>,
	},
	/// Является ли ответ первообразной подынтегральной функции.
	Integral {
		answer: String,
		integrand: String,
		#[arg(long, default_value = "x")]
		var: String,
	},
	/// Проверка решения целиком из JSON `{ "task": {...}, "steps": [...], "boundary": n }`.
	Verify { request: PathBuf },
}

#[derive(Deserialize)]
struct VerifyInput {
	task: TaskView,
	steps: Vec<String>,
	#[serde(default)]
	boundary: Option<usize>,
}

#[derive(Debug, Error)]
enum CliError {
	#[error(transparent)]
	Config(#[from] ConfigError),
	#[error("cannot read `{path}`: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("invalid request: {0}")]
	Json(#[from] serde_json::Error),
	#[error(transparent)]
	Request(#[from] RequestError),
	#[error(transparent)]
	Limit(#[from] LimitError),
	#[error(transparent)]
	Parse(#[from] ParseError),
}

fn init_logging() {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.init();
}

fn verdict<T>(result: &StepResult<T>) -> bool {
	match result {
		Ok(_) => {
			println!("{}", "верно".green().bold());
			true
		},
		Err(failure) => {
			println!("{} [{}] {}", "неверно".red().bold(), failure.kind, failure.hint);
			false
		},
	}
}

fn run(cli: Cli) -> Result<bool, CliError> {
	let policy = match &cli.config {
		Some(path) => CheckPolicy::load(path)?,
		None => CheckPolicy::default(),
	};

	match cli.command {
		Command::Normalize { expr } => {
			println!("{}", normalize_with(&expr, &policy)?);
			Ok(true)
		},
		Command::Step { prev, curr } => Ok(verdict(&check_step(&prev, &curr, &policy))),
		Command::Limit { expr, var, point, expected } => {
			let point = LimitPoint::parse(&point, &policy)?;
			let result = match expected {
				Some(expected) => check_limit_against(&expr, &var, &point, &expected, &policy),
				None => check_limit(&expr, &var, &point, &policy),
			};
			if let Ok(value) = &result {
				println!("lim {} -> {} = {}", var, point, value.to_string().bold());
			}
			Ok(verdict(&result))
		},
		Command::Integral { answer, integrand, var } => {
			Ok(verdict(&check_integral_final(&answer, &integrand, &var, &policy)))
		},
		Command::Verify { request } => {
			let text = std::fs::read_to_string(&request).map_err(|source| CliError::Io {
				path: request.clone(),
				source,
			})?;
			let input: VerifyInput = serde_json::from_str(&text)?;
			let verification = verify_sequence(&input.task, &input.steps, input.boundary, &policy)?;
			println!("{}", serde_json::to_string_pretty(&verification)?);

			let message = verification.message();
			if verification.is_correct() {
				eprintln!("{}", message.green());
			} else {
				eprintln!("{}", message.red());
			}
			Ok(verification.is_correct())
		},
	}
}

fn main() -> ExitCode {
	init_logging();

	match run(Cli::parse()) {
		Ok(true) => ExitCode::SUCCESS,
		Ok(false) => ExitCode::from(1),
		Err(CliError::Parse(err)) => {
			eprintln!("{}", parse_error_snippet(&err, true));
			ExitCode::from(2)
		},
		Err(err) => {
			eprintln!("{} {}", "error:".red().bold(), err);
			ExitCode::from(2)
		},
	}
}
