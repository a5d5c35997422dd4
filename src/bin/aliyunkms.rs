#![allow(clippy::print_stdout)]

use std::process::ExitCode;

use aliyunkms::kms::{EncryptionContext, MasterKeyBuilder, MasterKeyRecord};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(author, version, about = "Wrap SOPS data keys with Alibaba Cloud KMS", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a base64 data key from stdin and print one record per ARN
    Encrypt {
        /// Comma-separated KMS key ARNs
        #[arg(long)]
        arn: String,

        /// Encryption context entry, repeatable
        #[arg(long = "context", value_name = "KEY=VALUE", value_parser = parse_context_entry)]
        context: Vec<(String, String)>,
    },

    /// Read a record from stdin and print the base64 data key
    Decrypt,

    /// Read records from stdin and report which keys need rotation
    CheckRotation,
}

fn parse_context_entry(entry: &str) -> Result<(String, String), String> {
    entry
        .split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", entry))
}

async fn read_stdin() -> std::io::Result<String> {
    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;
    Ok(input)
}

fn records_from(value: Value) -> aliyunkms::Result<Vec<MasterKeyRecord>> {
    match value {
        Value::Array(items) => items.into_iter().map(MasterKeyRecord::try_from).collect(),
        other => Ok(vec![MasterKeyRecord::try_from(other)?]),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match cli.command {
        Commands::Encrypt { arn, context } => {
            let input = Zeroizing::new(read_stdin().await?);
            let data_key = Zeroizing::new(STANDARD.decode(input.trim())?);

            let context: EncryptionContext = context.into_iter().collect();
            let mut keys = MasterKeyBuilder::new()
                .with_context(context)
                .build_from_arn_string(&arn);
            if keys.is_empty() {
                return Err("no KMS key ARN given".into());
            }

            let mut records = Vec::with_capacity(keys.len());
            for key in &mut keys {
                key.encrypt(&data_key).await?;
                records.push(key.to_record());
            }

            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Decrypt => {
            let value: Value = serde_json::from_str(&read_stdin().await?)?;
            let mut last_error = None;

            for record in records_from(value)? {
                let key = MasterKeyBuilder::new().build_from_record(record);
                match key.decrypt().await {
                    Ok(data_key) => {
                        let data_key = Zeroizing::new(data_key);
                        println!("{}", STANDARD.encode(data_key.as_slice()));
                        return Ok(ExitCode::SUCCESS);
                    }
                    Err(e) => {
                        log::warn!("failed to decrypt with {}: {}", key, e);
                        last_error = Some(e);
                    }
                }
            }

            return Err(match last_error {
                Some(e) => e.into(),
                None => "no master key record given".into(),
            });
        }
        Commands::CheckRotation => {
            let value: Value = serde_json::from_str(&read_stdin().await?)?;
            let builder = MasterKeyBuilder::new();
            let mut rotate = false;

            for record in records_from(value)? {
                let key = builder.build_from_record(record);
                let needs_rotation = key.needs_rotation();
                rotate |= needs_rotation;
                println!(
                    "{}\t{}\t{}",
                    key,
                    key.creation_date().to_rfc3339(),
                    if needs_rotation { "rotate" } else { "ok" }
                );
            }

            if rotate {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
