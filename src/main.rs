//! XJP Task Runner - 远程任务执行引擎
//!
//! Usage:
//! - Sequential: `xjp-task-runner --hosts hosts.yaml --tasks tasks.yaml`
//! - Parallel: `xjp-task-runner --hosts hosts.yaml --tasks tasks.yaml --parallel`
//! - JSON events: `xjp-task-runner --hosts hosts.yaml --tasks tasks.yaml --json`

use std::path::PathBuf;

use anyhow::{bail, Context};
use xjp_task_runner::config::{self, EngineConfig};
use xjp_task_runner::domain::{ExecutionPolicy, Severity};
use xjp_task_runner::Engine;

/// 命令行参数
#[derive(Debug, Default)]
struct CliArgs {
    hosts: Option<PathBuf>,
    tasks: Option<PathBuf>,
    parallel: bool,
    json: bool,
    command_timeout: Option<u64>,
    connect_timeout: Option<u64>,
}

/// 解析命令行参数
fn parse_args() -> anyhow::Result<CliArgs> {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--hosts" if i + 1 < args.len() => {
                cli.hosts = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--tasks" if i + 1 < args.len() => {
                cli.tasks = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--command-timeout" if i + 1 < args.len() => {
                cli.command_timeout = Some(
                    args[i + 1]
                        .parse()
                        .with_context(|| format!("Invalid --command-timeout: {}", args[i + 1]))?,
                );
                i += 2;
            }
            "--connect-timeout" if i + 1 < args.len() => {
                cli.connect_timeout = Some(
                    args[i + 1]
                        .parse()
                        .with_context(|| format!("Invalid --connect-timeout: {}", args[i + 1]))?,
                );
                i += 2;
            }
            "--parallel" => {
                cli.parallel = true;
                i += 1;
            }
            "--json" => {
                cli.json = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("xjp-task-runner {}", config::env::constants::VERSION);
                std::process::exit(0);
            }
            other => bail!("Unknown argument: {}", other),
        }
    }

    Ok(cli)
}

fn print_help() {
    println!("XJP Task Runner - 远程任务执行引擎");
    println!();
    println!("USAGE:");
    println!("    xjp-task-runner --hosts <FILE> --tasks <FILE> [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --hosts <FILE>              Host inventory (YAML)");
    println!("    --tasks <FILE>              Task list (YAML)");
    println!("    --parallel                  Run every task on all hosts at once");
    println!("    --json                      Print events as JSON lines");
    println!("    --command-timeout <SECS>    Per-task timeout, 0 disables");
    println!("    --connect-timeout <SECS>    SSH connect and auth timeout");
    println!("    -V, --version               Print version");
    println!("    -h, --help                  Print help information");
    println!();
    println!("ENVIRONMENT:");
    println!("    TASK_RUNNER_CONNECT_TIMEOUT_SECS, TASK_RUNNER_COMMAND_TIMEOUT_SECS,");
    println!("    TASK_RUNNER_PARALLEL, RUST_LOG");
}

async fn run(cli: CliArgs) -> anyhow::Result<bool> {
    let hosts_path = cli.hosts.context("--hosts is required")?;
    let tasks_path = cli.tasks.context("--tasks is required")?;

    let hosts = config::load_hosts(&hosts_path)?;
    let tasks = config::load_tasks(&tasks_path)?;

    let mut engine_config = EngineConfig::from_env();
    if let Some(secs) = cli.command_timeout {
        engine_config = engine_config.with_command_timeout_secs(secs);
    }
    if let Some(secs) = cli.connect_timeout {
        engine_config = engine_config.with_connect_timeout_secs(secs);
    }
    let policy = if cli.parallel {
        ExecutionPolicy::Parallel
    } else {
        engine_config.default_policy
    };

    tracing::info!(
        hosts = hosts.len(),
        tasks = tasks.len(),
        policy = policy.as_str(),
        "Inventory loaded"
    );

    let engine = Engine::with_ssh(engine_config);
    let mut handle = engine.execute(hosts, tasks, policy)?;

    let cancel_token = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            cancel_token.cancel();
        }
    });

    let mut clean = true;
    while let Some(event) = handle.events.recv().await {
        if event.severity == Severity::Error {
            clean = false;
        }
        if event.is_terminal() {
            break;
        }
        if cli.json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!("{}", event.render_plain());
        }
    }

    match handle.wait().await {
        Some(stats) => {
            eprintln!("Run completed on {}", stats);
            Ok(clean && stats.is_clean())
        }
        None => Ok(false),
    }
}

fn main() {
    xjp_task_runner::init_tracing("warn");

    let cli = match parse_args() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            eprintln!("Run with --help for usage");
            std::process::exit(2);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create runtime: {}", e);
            std::process::exit(1);
        }
    };

    match rt.block_on(run(cli)) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
