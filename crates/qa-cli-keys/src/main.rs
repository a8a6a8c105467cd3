// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `qa-keys`: operator tool for QA Studio encryption keys.
//!
//! Exit codes: 0 success, 1 rotation incomplete, 2 configuration or startup
//! failure.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use qa_server_config::{
	load_config, load_config_with_file, load_encryption_keys, ConfigSource, EnvSource, LogFormat,
	LoggingConfig, ServerConfig, ENCRYPTION_KEY_ENV,
};
use qa_server_db::{apply_schema, create_pool, EncryptedColumn, SqliteEncryptedRecordStore};
use qa_server_secrets::{
	KeyMaterial, KeyRotationJob, RotationOptions, RotationReport, SecretCipher,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const EXIT_INCOMPLETE: u8 = 1;
const EXIT_STARTUP: u8 = 2;

/// QA Studio encryption key management
#[derive(Parser, Debug)]
#[command(name = "qa-keys", version, about, long_about = None)]
struct Args {
	/// Path to a TOML config file (default: /etc/qa-studio/server.toml)
	#[arg(short, long, global = true)]
	config: Option<PathBuf>,

	/// Log filter (overrides QA_STUDIO_LOG_LEVEL and config)
	#[arg(short, long, global = true)]
	log_level: Option<String>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Re-encrypt every stored secret under the current key version
	Rotate {
		/// Decrypt everything but write nothing
		#[arg(long)]
		dry_run: bool,

		/// Records processed concurrently
		#[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
		concurrency: u16,

		/// Limit to one column (repeatable), e.g. integrations.webhook_url
		#[arg(long = "column", value_parser = parse_column)]
		columns: Vec<EncryptedColumn>,
	},

	/// Check that every stored secret decrypts, and report key version usage
	Verify,

	/// Print a fresh random key and the environment line that installs it
	GenerateKey {
		/// Key version to label the key with (default: one above the highest configured)
		#[arg(long)]
		version: Option<u32>,
	},
}

fn parse_column(value: &str) -> Result<EncryptedColumn, String> {
	value.parse().map_err(|e: qa_server_db::DbError| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
	let args = Args::parse();

	init_tracing(args.log_level.as_deref());

	let options = match args.command {
		Command::GenerateKey { version } => return generate_key(version),
		Command::Rotate {
			dry_run,
			concurrency,
			columns,
		} => RotationOptions {
			dry_run,
			concurrency: usize::from(concurrency),
			columns: if columns.is_empty() {
				EncryptedColumn::ALL.to_vec()
			} else {
				columns
			},
		},
		Command::Verify => RotationOptions {
			dry_run: true,
			..Default::default()
		},
	};

	let config = match load(args.config.as_ref()) {
		Ok(config) => config,
		Err(e) => {
			eprintln!("error: {e:#}");
			return ExitCode::from(EXIT_STARTUP);
		}
	};

	match rotate(&config, options).await {
		Ok(report) => {
			print_report(&report);
			match report.into_result() {
				Ok(_) => ExitCode::SUCCESS,
				Err(e) => {
					eprintln!("error: {e}");
					ExitCode::from(EXIT_INCOMPLETE)
				}
			}
		}
		Err(e) => {
			eprintln!("error: {e:#}");
			ExitCode::from(EXIT_STARTUP)
		}
	}
}

fn load(path: Option<&PathBuf>) -> anyhow::Result<ServerConfig> {
	let config = match path {
		Some(path) => load_config_with_file(path),
		None => load_config(),
	}
	.context("failed to load configuration")?;
	Ok(config)
}

/// Logging is configured from the environment alone so that warnings raised
/// while loading the full configuration are visible.
fn init_tracing(level_override: Option<&str>) {
	let logging = EnvSource
		.load()
		.ok()
		.and_then(|layer| layer.logging)
		.map(|layer| layer.finalize())
		.unwrap_or_else(LoggingConfig::default);

	let filter = match level_override {
		Some(level) => EnvFilter::new(level),
		None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level)),
	};

	match logging.format {
		LogFormat::Json => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().json().with_writer(std::io::stderr))
				.init();
		}
		LogFormat::Compact => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().compact().with_writer(std::io::stderr))
				.init();
		}
		LogFormat::Pretty => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().with_writer(std::io::stderr))
				.init();
		}
	}
}

async fn rotate(config: &ServerConfig, options: RotationOptions) -> anyhow::Result<RotationReport> {
	let cipher =
		SecretCipher::from_config(&config.encryption).context("failed to build key registry")?;

	tracing::info!(
		database = %config.database.url,
		key_version = cipher.current_version().get(),
		fingerprint = %cipher.registry().current_key().fingerprint(),
		"opening database"
	);
	let pool = create_pool(&config.database.url)
		.await
		.context("failed to open database")?;
	apply_schema(&pool).await.context("failed to apply schema")?;

	let store = Arc::new(SqliteEncryptedRecordStore::new(pool));
	let report = KeyRotationJob::new(cipher, store, options).run().await?;
	Ok(report)
}

fn print_report(report: &RotationReport) {
	let mode = if report.dry_run { "verify" } else { "rotate" };
	println!(
		"{mode}: target {} | {} records, {} ok, {} failed",
		report.target_version,
		report.total,
		report.succeeded(),
		report.failed()
	);
	for (version, count) in &report.source_versions {
		println!("  {version}: {count}");
	}
	if report.legacy_records > 0 {
		println!("  legacy (unversioned, read as v1): {}", report.legacy_records);
	}
	for failure in &report.failures {
		eprintln!("failed: {failure}");
	}
}

fn generate_key(version: Option<u32>) -> ExitCode {
	let version = match version {
		Some(0) => {
			eprintln!("error: key versions start at 1");
			return ExitCode::from(EXIT_STARTUP);
		}
		Some(version) => version,
		None => next_version(),
	};

	let key = KeyMaterial::generate();
	println!("{ENCRYPTION_KEY_ENV}_V{version}={}", key.to_hex().expose());
	eprintln!(
		"fingerprint {}; set {ENCRYPTION_KEY_ENV}_VERSION={version} once every instance has the key",
		key.fingerprint()
	);
	ExitCode::SUCCESS
}

fn next_version() -> u32 {
	load_encryption_keys()
		.ok()
		.and_then(|keys| keys.keys().next_back().copied())
		.map_or(1, |highest| highest.saturating_add(1))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rotate_parses_repeated_columns() {
		let args = Args::try_parse_from([
			"qa-keys",
			"rotate",
			"--dry-run",
			"--concurrency",
			"4",
			"--column",
			"integrations.webhook_url",
			"--column",
			"user_two_factor.totp_secret",
		])
		.unwrap();

		match args.command {
			Command::Rotate {
				dry_run,
				concurrency,
				columns,
			} => {
				assert!(dry_run);
				assert_eq!(concurrency, 4);
				assert_eq!(
					columns,
					vec![
						EncryptedColumn::IntegrationWebhookUrl,
						EncryptedColumn::TwoFactorTotpSecret
					]
				);
			}
			other => panic!("unexpected command {other:?}"),
		}
	}

	#[test]
	fn unknown_column_is_rejected() {
		assert!(Args::try_parse_from(["qa-keys", "rotate", "--column", "users.password"]).is_err());
	}

	#[test]
	fn zero_concurrency_is_rejected() {
		assert!(Args::try_parse_from(["qa-keys", "rotate", "--concurrency", "0"]).is_err());
	}

	#[test]
	fn generate_key_accepts_version() {
		let args = Args::try_parse_from(["qa-keys", "generate-key", "--version", "3"]).unwrap();
		assert!(matches!(
			args.command,
			Command::GenerateKey { version: Some(3) }
		));
	}

	#[test]
	fn config_flag_is_global() {
		let args = Args::try_parse_from(["qa-keys", "verify", "--config", "/tmp/qa.toml"]).unwrap();
		assert_eq!(args.config, Some(PathBuf::from("/tmp/qa.toml")));
	}
}
