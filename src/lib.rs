// src/lib.rs

pub mod builtin;
pub mod cli;
pub mod config;
pub mod dag;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod model;
pub mod process;
pub mod server;
pub mod service;
pub mod store;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::builtin::Catalog;
use crate::cli::{BlueprintArgs, CliArgs, Command};
use crate::config::{ConfigFile, default_config_path, load_and_validate};
use crate::dag::{Graph, TemplateContext, build_graph};
use crate::dispatch::{Dispatcher, DispatcherHandle};
use crate::model::{Blueprint, Judgement, Program};
use crate::process::ProcessManager;
use crate::server::AppState;
use crate::service::{JudgementService, TaskService};
use crate::store::{MemoryStore, Repositories, fixtures};

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_config(args.config.as_deref())?;

    match args.command {
        Command::Check(bp) => check(&bp),
        Command::Run(bp) => run_once(&cfg, &bp).await,
        Command::Serve { bind } => serve(cfg, bind).await,
    }
}

/// An explicit path must exist; the default path is optional.
fn load_config(path: Option<&Path>) -> Result<ConfigFile> {
    match path {
        Some(path) => load_and_validate(path)
            .with_context(|| format!("loading config from {:?}", path)),
        None => {
            let default = default_config_path();
            if default.exists() {
                load_and_validate(&default)
                    .with_context(|| format!("loading config from {:?}", default))
            } else {
                debug!("no config file; using defaults");
                Ok(ConfigFile::default())
            }
        }
    }
}

/// The engine's long-lived parts, wired over one store.
struct Engine {
    repos: Repositories,
    manager: ProcessManager,
    dispatcher: DispatcherHandle,
}

fn start_engine(cfg: &ConfigFile, store: Arc<MemoryStore>) -> Engine {
    let repos = Repositories::memory(store);
    let manager = ProcessManager::new(Catalog::standard(&repos), cfg.manager);
    let dispatcher = Dispatcher::spawn(repos.clone(), manager.clone(), cfg.dispatcher_options());
    Engine {
        repos,
        manager,
        dispatcher,
    }
}

fn read_blueprint(bp: &BlueprintArgs) -> Result<(Blueprint, Vec<Program>)> {
    let blueprint = fixtures::load_blueprint(1, &bp.blueprint, None)?;
    let programs = match &bp.programs {
        Some(path) => fixtures::load_programs(path)?,
        None => Vec::new(),
    };
    Ok((blueprint, programs))
}

fn check(bp: &BlueprintArgs) -> Result<()> {
    let (blueprint, programs) = read_blueprint(bp)?;
    let judgement = Judgement::new(0, blueprint.id, bp.judgement_args()?);
    let ctx = TemplateContext::for_judgement(&judgement, None, None);

    let graph = build_graph(&blueprint.definition, &ctx, &programs)
        .with_context(|| format!("checking blueprint {:?}", bp.blueprint))?;
    print_graph(&blueprint, &graph);
    Ok(())
}

fn print_graph(blueprint: &Blueprint, graph: &Graph) {
    println!("judgedag check: {}", blueprint.title);
    println!();

    println!("blocks ({}):", graph.len());
    for block in graph.blocks() {
        println!("  - #{} {}", block.id, block.kind);
        if !block.inputs.is_empty() {
            println!("      inputs: {:?}", block.inputs);
        }
        if block.output_arity() > 0 {
            println!("      outputs: {:?}", block.outputs);
        }
        if !block.properties.is_empty() {
            println!("      properties: {}", serde_json::Value::Object(block.properties.clone()));
        }
    }

    println!();
    println!("links ({}):", graph.links().count());
    for link in graph.links() {
        println!(
            "  - #{}: {}[{}] -> {}[{}]",
            link.id, link.source.block, link.source.slot, link.target.block, link.target.slot
        );
    }
}

async fn run_once(cfg: &ConfigFile, bp: &BlueprintArgs) -> Result<()> {
    let (blueprint, programs) = read_blueprint(bp)?;

    let store = Arc::new(MemoryStore::new());
    for program in programs {
        store.insert_program(program);
    }
    let blueprint_id = blueprint.id;
    store.insert_blueprint(blueprint);

    let engine = start_engine(cfg, store);
    let judgement = engine.repos.judgements.create(blueprint_id, bp.judgement_args()?)?;
    let mut finished = engine.dispatcher.subscribe();

    let outcome = match engine.dispatcher.submit(judgement.id).await {
        Ok(()) => loop {
            let j = finished.recv().await.context("dispatcher stopped mid-run")?;
            if j.id == judgement.id {
                break j;
            }
        },
        Err(err) => {
            warn!(judgement_id = judgement.id, error = %err, "judgement did not start");
            engine
                .repos
                .judgements
                .get(judgement.id)?
                .ok_or_else(|| anyhow!("judgement {} vanished", judgement.id))?
        }
    };

    if !engine.manager.is_empty() {
        warn!(queued = engine.manager.len(), "tasks left for actuators that never came");
    }
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn serve(cfg: ConfigFile, bind: Option<std::net::SocketAddr>) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    fixtures::seed(&store, &cfg.store)?;

    let engine = start_engine(&cfg, store);
    let restored = engine
        .dispatcher
        .restore_pending(engine.repos.judgements.as_ref())
        .await?;
    info!(restored, "pending judgements resubmitted");

    let state = AppState::new(
        TaskService::new(engine.manager.clone()),
        JudgementService::new(engine.repos.clone(), engine.dispatcher.clone()),
    );
    let addr = bind.unwrap_or(cfg.bind);

    tokio::select! {
        res = server::serve(addr, state) => res,
        res = tokio::signal::ctrl_c() => {
            res.context("listening for Ctrl+C")?;
            info!("shutdown requested");
            Ok(())
        }
    }
}
