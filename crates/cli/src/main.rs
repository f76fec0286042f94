// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `qm` binary: one-shot CLI or long-lived daemon.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod cli;
mod exit_error;

use clap::Parser;
use std::path::PathBuf;

use cli::Args;
use exit_error::ExitError;
use qm_agent::config::default_vardir;
use qm_agent::logger::{init as init_logger, LoggerOptions};
use qm_agent::{Agent, Config};

fn main() {
    let args = Args::parse();
    match run(args) {
        Ok(()) => {}
        Err(error) => {
            if !error.message.is_empty() {
                eprintln!("{error}");
            }
            std::process::exit(error.code);
        }
    }
}

fn run(args: Args) -> Result<(), ExitError> {
    // Terminal paths that need no configuration
    if args.list_tasks {
        return list_tasks(&args);
    }
    if args.list_categories {
        return list_categories(&args);
    }

    let config = build_config(&args)?;

    if args.setup {
        return setup(&config);
    }

    // Re-exec as a detached child and leave the foreground
    if config.daemon && !config.no_fork {
        let pid = qm_agent::daemon::spawn_detached()
            .map_err(|e| ExitError::new(1, format!("can't fork daemon: {e}")))?;
        println!("{} Agent daemonized (pid {pid})", qm_agent::PROVIDER);
        return Ok(());
    }

    let _log_guard = init_logger(&LoggerOptions {
        backends: config.logger.clone(),
        logfile: config.logfile.clone(),
        maxsize_mb: config.logfile_maxsize,
        facility: config.logfacility.clone(),
        color: config.color,
        debug: config.debug,
    });

    if let Some(pidfile) = &config.pidfile {
        if config.daemon {
            if let Err(e) = qm_agent::daemon::write_pidfile(pidfile) {
                tracing::error!("can't write pidfile {}: {e}", pidfile.display());
            }
        }
    }

    ensure_path_env();

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| ExitError::new(1, format!("can't start runtime: {e}")))?;
    runtime.block_on(run_agent(config))
}

async fn run_agent(config: Config) -> Result<(), ExitError> {
    let set_forcerun = config.set_forcerun;
    let mut agent =
        Agent::init(config).map_err(|e| ExitError::new(1, e.to_string()))?;

    if set_forcerun {
        // State was persisted during init; nothing to run
        return Ok(());
    }

    let token = agent.terminate_token();
    let signals = tokio::spawn(qm_agent::daemon::watch_signals(token.clone()));
    let shutdown = {
        let token = token.clone();
        let terminate = agent.terminate_token();
        tokio::spawn(async move {
            token.cancelled().await;
            terminate.cancel();
        })
    };

    let result = agent.run().await;
    signals.abort();
    shutdown.abort();

    result.map_err(|e| ExitError::new(1, e.to_string()))?;
    if token.is_cancelled() {
        // A terminal signal interrupted the run
        return Err(ExitError::new(1, String::new()));
    }
    Ok(())
}

fn build_config(args: &Args) -> Result<Config, ExitError> {
    let mut config = Config::default();

    let backend = match &args.conf_file {
        // conf-file forces the file backend
        Some(_) => "file".to_string(),
        None => args.config.clone().unwrap_or_else(|| "file".to_string()),
    };
    config.config_backend = backend.clone();
    config.conf_file = args.conf_file.as_ref().map(PathBuf::from);

    let conf_file = config.conf_file.clone();
    config
        .load_backend(&backend, conf_file.as_deref())
        .map_err(|e| ExitError::new(1, e.to_string()))?;

    for (key, value) in args.overrides() {
        config.set_from_cli(&key, &value);
    }
    config.set_forcerun = args.set_forcerun;

    config.check().map_err(|e| ExitError::new(1, e.to_string()))?;
    Ok(config)
}

fn list_tasks(args: &Args) -> Result<(), ExitError> {
    let disabled: Vec<String> = args
        .no_task
        .iter()
        .flat_map(|t| t.split(','))
        .map(|t| t.trim().to_lowercase())
        .collect();
    for task in qm_tasks::available_tasks() {
        let marker = if disabled.contains(&task.name.to_string()) {
            " (disabled)"
        } else {
            ""
        };
        println!("{} (v{}){marker}", task.name, task.version);
    }
    Ok(())
}

fn list_categories(args: &Args) -> Result<(), ExitError> {
    let disabled: Vec<String> = args
        .no_category
        .iter()
        .flat_map(|c| c.split(','))
        .map(|c| c.trim().to_lowercase())
        .collect();
    for category in qm_tasks::ModuleRegistry::builtin().categories() {
        let marker = if disabled.contains(&category.to_string()) {
            " (disabled)"
        } else {
            ""
        };
        println!("{category}{marker}");
    }
    Ok(())
}

fn setup(config: &Config) -> Result<(), ExitError> {
    println!("{} Agent v{}", qm_agent::PROVIDER, qm_agent::VERSION);
    println!(
        "vardir: {}",
        config.vardir.clone().unwrap_or_else(default_vardir).display()
    );
    println!(
        "conf-file: {}",
        config
            .conf_file
            .clone()
            .unwrap_or_else(qm_agent::config::default_conf_file)
            .display()
    );
    match &config.logfile {
        Some(logfile) => println!("logfile: {}", logfile.display()),
        None => println!("logger: {}", config.logger.join(",")),
    }
    Ok(())
}

/// Child processes need a sane PATH and a stable locale.
fn ensure_path_env() {
    if std::env::var_os("PATH").map(|p| p.is_empty()).unwrap_or(true) {
        let path = "/sbin:/usr/sbin:/usr/local/sbin:/bin:/usr/bin:/usr/local/bin";
        std::env::set_var("PATH", path);
        tracing::debug!("PATH is not set, using {path} as default");
    }
    std::env::set_var("LC_ALL", "C");
    std::env::set_var("LANG", "C");
}
