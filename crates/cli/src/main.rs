//! `revflow` -- operator tool for the moderated revision store.
//!
//! # Environment variables
//!
//! | Variable           | Required | Default | Description                          |
//! |--------------------|----------|---------|--------------------------------------|
//! | `DATABASE_URL`     | yes      | --      | Postgres connection string           |
//! | `REVFLOW_REGISTRY` | no       | --      | Registry file when `--registry` is not given |
//!
//! Workflow settings (`BRANCH_LIMIT`, group ids, snapshot format) are read by
//! `WorkflowConfig::from_env`.

mod args;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use revflow_core::config::WorkflowConfig;
use revflow_core::registry::Registry;
use revflow_core::roles::Actor;
use revflow_core::status::ModerationStatus;
use revflow_db::service::WorkflowService;

use args::{Cli, Commands, Decision};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "revflow_cli=info,revflow_db=info,revflow_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;
    let pool = revflow_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    revflow_db::health_check(&pool)
        .await
        .context("Database health check failed")?;

    // Migrations run before any record type is known.
    let registry = match cli.command {
        Commands::Migrate => Registry::default(),
        _ => load_registry(cli.registry)?,
    };
    let config = WorkflowConfig::from_env()?;
    tracing::debug!(
        record_types = registry.record_types().count(),
        branch_limit = config.branch_limit,
        "Workflow configured",
    );
    let service = WorkflowService::new(pool, Arc::new(registry), config);

    let output = execute(&service, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn execute(service: &WorkflowService, command: Commands) -> anyhow::Result<Value> {
    let output = match command {
        Commands::Migrate => {
            revflow_db::run_migrations(service.pool())
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Database migrations applied");
            json!({ "migrated": true })
        }
        Commands::Pending => serde_json::to_value(service.pending_versions().await?)?,
        Commands::Deleted { record_type } => {
            serde_json::to_value(service.deleted_versions(&record_type).await?)?
        }
        Commands::History {
            record_type,
            record_id,
        } => serde_json::to_value(service.history(&record_type, &record_id).await?)?,
        Commands::Moderate {
            version_id,
            decision,
            actor,
            groups,
        } => {
            let status = match decision {
                Decision::Approve => ModerationStatus::Approved,
                Decision::Reject => ModerationStatus::Rejected,
            };
            let actor = groups
                .into_iter()
                .fold(Actor::new(actor), |actor, group| actor.with_group(group));
            serde_json::to_value(service.change_status(version_id, status, &actor).await?)?
        }
        Commands::Revert {
            revision_id,
            previous,
            purge,
        } => serde_json::to_value(service.revert(revision_id, previous, purge).await?)?,
        Commands::CheckTree => json!({ "revisions": service.check_tree().await? }),
    };
    Ok(output)
}

fn load_registry(path: Option<String>) -> anyhow::Result<Registry> {
    let path = match path {
        Some(path) => path,
        None => std::env::var("REVFLOW_REGISTRY")
            .context("Pass --registry or set REVFLOW_REGISTRY")?,
    };
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read registry file {path}"))?;
    Ok(Registry::from_json(&json)?)
}
