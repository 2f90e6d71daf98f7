// src/main.rs

//! Command-line entry point: sends one command to the CFE and prints the result.

use anyhow::{Result, anyhow};
use bifrost::config::Config;
use bifrost::{CfeClientManager, EngineType, GetOptions, OperationEvent};
use serde_json::Value;
use std::env;
use std::str::FromStr;
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;

const USAGE: &str =
    "Usage: bifrost [--config /path/to/bifrost.toml] [--engine <type>] <command> <json-payload>";

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    // Define version information.
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().skip(1).collect();

    if args.contains(&"--version".to_string()) {
        println!("Bifrost version {VERSION}");
        return Ok(());
    }

    // Split flags from positional arguments.
    let mut config_path = "bifrost.toml".to_string();
    let mut engine_arg: Option<String> = None;
    let mut positional = Vec::new();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                config_path = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config flag requires a value"))?;
            }
            "--engine" => {
                engine_arg = Some(
                    iter.next()
                        .ok_or_else(|| anyhow!("--engine flag requires a value"))?,
                );
            }
            _ => positional.push(arg),
        }
    }

    let [command, payload_text] = positional.as_slice() else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };

    // Load the configuration. The client cannot run without one.
    let config = match Config::from_file(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level. Logs go to stderr; stdout carries the result.
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .with_writer(std::io::stderr)
        .compact()
        .with_ansi(true)
        .init();

    let engine_type = match engine_arg {
        Some(name) => EngineType::from_str(&name)
            .map_err(|_| anyhow!("Unknown engine type '{name}'"))?,
        None => EngineType::for_command(command).ok_or_else(|| {
            anyhow!("Cannot infer the engine for command '{command}'; pass --engine")
        })?,
    };

    let payload: Value = serde_json::from_str(payload_text)
        .map_err(|e| anyhow!("Payload is not valid JSON: {e}"))?;

    let manager = CfeClientManager::from_config(&config);
    let client = manager
        .get(
            engine_type,
            GetOptions::on_new_connection(move |_| info!("Connected to the {engine_type} engine.")),
        )
        .await?;

    let operation = client.send(command, &payload);
    info!("Sent '{command}' as request {}.", operation.request_id());

    let outcome = tokio::select! {
        outcome = operation.into_result(|event| match event {
            OperationEvent::Progress(value) => eprintln!("progress: {:.0}%", value * 100.0),
            OperationEvent::IntermediateResult(payload) => {
                eprintln!("intermediate result: {payload}")
            }
            _ => {}
        }) => outcome,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, closing connections.");
            manager.close_all().await;
            std::process::exit(130);
        }
    };

    manager.close_all().await;

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            error!("Request failed: {}", e);
            Err(e.into())
        }
    }
}
