use crate::cli::commands::{Commands, OrderDirection, RegistryOptions};
use crate::config::RegistryConfig;
use crate::registry::BootstrapState;
use crate::service::RegistryService;
use crate::services::{DefaultNamingStrategy, JsonServiceStore, RegisteredService, ServiceSource};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Resolve configuration from the config file, environment and `--root`
pub fn resolve_config(options: &RegistryOptions) -> Result<RegistryConfig> {
    let mut config = RegistryConfig::load(options.config.as_deref())?;
    if let Some(root) = &options.root {
        let rooted = RegistryConfig::rooted_at(root);
        config.version_control = rooted.version_control;
    }
    Ok(config)
}

/// Registry that existed before version control, used to seed master
fn existing_registry(config: &RegistryConfig) -> Box<dyn ServiceSource> {
    match &config.registry.source_dir {
        Some(dir) => {
            debug!("Seeding source: {:?}", dir);
            Box::new(JsonServiceStore::new(dir, Arc::new(DefaultNamingStrategy)))
        }
        None => Box::new(Vec::<RegisteredService>::new()),
    }
}

pub async fn handle_command(options: &RegistryOptions, command: Commands) -> Result<()> {
    let config = resolve_config(options)?;
    let existing = existing_registry(&config);
    let service = RegistryService::bootstrap(config, existing).await?;

    if service.factory().state() == BootstrapState::Degraded {
        bail!(
            "Version control is unavailable, see the log for why {:?} could not be used",
            service.factory().repositories().master_path()
        );
    }

    let session = options.session();
    let principal = options.principal();
    info!("Running as {} in session {}", principal, session);

    match command {
        Commands::Bootstrap => {
            println!(
                "Master repository ready at {}",
                service.factory().repositories().master_path().display()
            );
        }
        Commands::List { domain, format } => {
            let services = match domain {
                Some(domain) => service.list_domain(&session, &principal, &domain).await?,
                None => service.list(&session, &principal).await?,
            };
            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&services)?),
                _ => print_table(&services),
            }
        }
        Commands::Domains => {
            for domain in service.domains(&session, &principal).await? {
                println!("{}", domain);
            }
        }
        Commands::Show { id } => {
            let found = service.find(&session, &principal, id).await?;
            println!("{}", serde_json::to_string_pretty(&found)?);
        }
        Commands::Save { file } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let definition: RegisteredService = serde_json::from_str(&content)
                .with_context(|| format!("{} is not a service definition", file.display()))?;
            let id = definition.id;
            service.save(&session, &principal, definition).await?;
            println!("Saved service {}", id);
        }
        Commands::Delete { id } => {
            let removed = service.delete(&session, &principal, id).await?;
            println!("Deleted service {} ({})", removed.id, removed.name);
        }
        Commands::Publish { message } => {
            match service.publish(&session, &principal, &message).await? {
                Some(oid) => println!("Published {}", oid),
                None => println!("Nothing to publish"),
            }
        }
        Commands::Status => {
            let changes = service.changes(&session, &principal).await?;
            if changes.is_empty() {
                println!("No changes");
            }
            for change in changes {
                let name = change
                    .service
                    .map(|s| format!("{} ({})", s.name, s.id))
                    .unwrap_or_default();
                println!("{:<9} {:<40} {}", format!("{:?}", change.status), change.file, name);
            }
        }
        Commands::History { id } => {
            for commit in service.history(&session, &principal, id).await? {
                println!(
                    "{} {} {:<16} {}",
                    &commit.id[..8.min(commit.id.len())],
                    commit.time.format("%Y-%m-%d %H:%M:%S"),
                    commit.author,
                    commit.message
                );
            }
        }
        Commands::Revert { id } => {
            service.revert(&session, &principal, id).await?;
            println!("Reverted service {}", id);
        }
        Commands::Reorder { id, direction } => {
            if service
                .reorder(&session, &principal, id, direction.into())
                .await?
            {
                println!("Moved service {}", id);
            } else {
                let end = match direction {
                    OrderDirection::Up => "top",
                    OrderDirection::Down => "bottom",
                };
                println!("Service {} is already at the {}", id, end);
            }
        }
    }

    service.end_session(&session).await?;
    Ok(())
}

fn print_table(services: &[RegisteredService]) {
    println!("{:>6} {:>5}  {:<30} SERVICE", "ID", "ORDER", "NAME");
    for service in services {
        println!(
            "{:>6} {:>5}  {:<30} {}",
            service.id, service.evaluation_order, service.name, service.service_id
        );
    }
}
