//! Command-line front end for the QMX thread and plugin registries.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use qmx_core::Settings;
use qmx_plugins::PluginRegistry;
use qmx_threads::{Disposal, ThreadGroupRegistry};

const RENDEZVOUS_GROUP: &str = "rendezvous";

/// QMX - thread groups and dynamic plugins.
#[derive(Parser, Debug)]
#[command(name = "qmx")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Load plugins from a directory and list them by module.
    Plugins {
        /// Plugin directory to scan.
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Module to register before loading (repeatable).
        #[arg(short, long = "module")]
        modules: Vec<String>,
        /// Skip system initialization.
        #[arg(long)]
        no_init: bool,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Show hardware concurrency.
    Cores,
    /// Meet N worker threads at a barrier.
    Rendezvous {
        /// Number of worker threads.
        #[arg(short, long, default_value_t = 4)]
        workers: usize,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings.apply_env()?;
    if args.verbose {
        settings.logging.level = "debug".to_string();
    }
    qmx_core::logging::init(&settings.logging)?;

    match args.command {
        Command::Plugins {
            dir,
            modules,
            no_init,
            json,
        } => run_plugins(&settings, dir, modules, !no_init, json),
        Command::Cores => {
            show_cores();
            Ok(())
        }
        Command::Rendezvous { workers } => run_rendezvous(&settings, workers),
    }
}

/// Register modules, auto-load a directory and print every plugin.
fn run_plugins(
    settings: &Settings,
    dir: Option<PathBuf>,
    extra_modules: Vec<String>,
    initialize: bool,
    json: bool,
) -> Result<()> {
    let dir = dir
        .or_else(|| settings.plugins.directory.clone())
        .context("No plugin directory given; use --dir or set plugins.directory")?;

    let mut modules = settings.plugins.modules.clone();
    for module in extra_modules {
        if !modules.contains(&module) {
            modules.push(module);
        }
    }

    let registry = PluginRegistry::new();
    for module in &modules {
        registry.register_module(module)?;
    }

    let loaded = registry
        .auto_load(&dir)
        .with_context(|| format!("Failed to load plugins from {}", dir.display()))?;
    tracing::debug!(count = loaded.len(), "Plugins loaded");

    if initialize && settings.plugins.initialize {
        registry.initialize()?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&plugins_json(&registry)?)?);
    } else {
        print_plugins(&registry)?;
    }
    Ok(())
}

fn plugins_json(registry: &PluginRegistry) -> Result<serde_json::Value> {
    let mut modules = serde_json::Map::new();
    for module in registry.module_ids() {
        let mut plugins = Vec::new();
        for (id, version) in registry.plugin_list(&module)? {
            plugins.push(serde_json::json!({
                "id": id,
                "version": version.to_string(),
                "state": format!("{:?}", registry.plugin_state(&module, &id)?),
                "meta": registry.plugin_meta(&module, &id)?,
            }));
        }
        modules.insert(module, serde_json::Value::Array(plugins));
    }

    Ok(serde_json::json!({
        "initialized": registry.is_initialized(),
        "modules": modules,
    }))
}

fn print_plugins(registry: &PluginRegistry) -> Result<()> {
    for module in registry.module_ids() {
        let plugins = registry.plugin_list(&module)?;
        println!("{} ({} plugins)", module, plugins.len());
        for (id, version) in plugins {
            println!("  {} {}", id, version);
            for (key, value) in registry.plugin_meta(&module, &id)? {
                println!("    {}: {}", key, value);
            }
        }
    }
    Ok(())
}

fn show_cores() {
    println!("logical cores:  {}", qmx_threads::logical_core_count());
    println!("physical cores: {}", qmx_threads::physical_core_count());
}

/// Spawn `workers` threads that all meet at one barrier, then join them.
fn run_rendezvous(settings: &Settings, workers: usize) -> Result<()> {
    anyhow::ensure!(workers > 0, "--workers must be at least 1");

    let registry = Arc::new(ThreadGroupRegistry::new());
    registry.create_group(RENDEZVOUS_GROUP)?;
    registry.set_barrier_size(RENDEZVOUS_GROUP, workers)?;

    let arrived = Arc::new(AtomicUsize::new(0));
    for i in 0..workers {
        let group = registry.clone();
        let arrived = arrived.clone();
        registry.create_thread(
            RENDEZVOUS_GROUP,
            &format!("worker-{}", i),
            move || -> qmx_threads::Result<()> {
                group.wait(RENDEZVOUS_GROUP)?;
                arrived.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )?;
    }

    let timeout = settings.threads.join_timeout();
    if !registry.try_join_all(RENDEZVOUS_GROUP, timeout)? {
        registry.destroy_group(RENDEZVOUS_GROUP, true, Disposal::Interrupt)?;
        anyhow::bail!("Workers did not finish within {:?}", timeout);
    }

    println!(
        "{} of {} workers passed the barrier",
        arrived.load(Ordering::SeqCst),
        workers
    );
    registry.destroy_group(RENDEZVOUS_GROUP, true, Disposal::Detach)?;
    Ok(())
}
