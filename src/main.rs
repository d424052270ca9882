// ABOUTME: Entry point for the anodos CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use std::env;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

use anodos::artifacts::{
    ArtifactRegistryOps, BollardArtifactRegistry, CommandBuilder, RegistryAuth,
};
use anodos::config::{self, Config};
use anodos::environments::EnvironmentRegistry;
use anodos::error::{Error, Result};
use anodos::health::{HealthGate, HyperProbe};
use anodos::instances::HttpInstanceGroup;
use anodos::output::{Output, OutputMode};
use anodos::release::{Coordinator, PromoteError, TriggerEvent};
use anodos::routing::{HttpRouting, TrafficSwitch};
use anodos::secrets::{LayeredSecretStore, SecretStore};
use anodos::types::{ArtifactTag, CommitRef, EnvId};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let mut output = Output::new(mode);

    if let Err(e) = run(cli, &mut output).await {
        output.error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli, output: &mut Output) -> Result<()> {
    match cli.command {
        Commands::Init { repository, force } => {
            let cwd = env::current_dir()?;
            config::init_config(&cwd, repository.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Promote {
            git_ref,
            commit,
            env,
            tag,
        } => {
            let config = discover_config()?;
            let commit = CommitRef::parse(&commit)
                .map_err(|e| Error::InvalidArgument(format!("commit: {e}")))?;

            let mut trigger = TriggerEvent::new(&git_ref, commit);
            if let Some(env) = env {
                trigger = trigger.with_env(parse_env(&env)?);
            }
            if let Some(tag) = tag {
                trigger = trigger.with_tag(parse_tag(&tag)?);
            }

            output.start_timer();
            let stack = Stack::connect(&config)?;
            let coordinator = stack.coordinator(&config);

            output.progress(&format!("Promoting {} ...", trigger.git_ref));
            let report = coordinator.handle_trigger(trigger).await?;
            output.report(
                &report,
                &format!(
                    "Promoted {} to {} (attempt {}, live: {})",
                    report.attempt.tag, report.attempt.env, report.attempt.id, report.live
                ),
            );
            Ok(())
        }
        Commands::Rollback { env, tag } => {
            let config = discover_config()?;
            let env = parse_env(&env)?;
            let tag = tag.map(|t| parse_tag(&t)).transpose()?;

            output.start_timer();
            let stack = Stack::connect(&config)?;
            let coordinator = stack.coordinator(&config);

            output.progress(&format!("Rolling back {env} ..."));
            let report = coordinator.force_rollback(env, tag).await?;
            output.report(
                &report,
                &format!(
                    "Rolled {} back to {} (attempt {})",
                    report.attempt.env, report.attempt.tag, report.attempt.id
                ),
            );
            Ok(())
        }
        Commands::Status { env } => {
            let config = discover_config()?;
            let registry =
                EnvironmentRegistry::open(&config.state_dir(), config.routing.initial_active)?;

            let targets = match env {
                Some(env) => vec![parse_env(&env)?],
                None => EnvId::ALL.to_vec(),
            };

            for env in targets {
                let status = registry.status(env);
                output.payload(&status, |s| {
                    let tag = s
                        .current_tag
                        .as_ref()
                        .map(|t| t.as_str())
                        .unwrap_or("-");
                    let lock = s
                        .locked_by
                        .as_ref()
                        .map(|l| format!("locked by {} (pid {})", l.holder, l.pid))
                        .unwrap_or_else(|| "unlocked".to_string());
                    let live = if s.live { " [live]" } else { "" };
                    let state = s
                        .last_attempt
                        .as_ref()
                        .map(|a| a.state.to_string())
                        .unwrap_or_else(|| "no deployments".to_string());
                    println!("{:<8}{} {:<32} {}  last attempt: {}", s.env, live, tag, lock, state);
                });
            }
            Ok(())
        }
        Commands::Tags { prefix, limit } => {
            let config = discover_config()?;
            let auth = resolve_auth(&config)?;
            let artifacts = BollardArtifactRegistry::connect(&config.registry.repository, auth)?;

            let mut entries = artifacts
                .list_tags(&prefix)
                .await
                .map_err(Error::Artifact)?;
            entries.truncate(limit);

            for entry in entries {
                output.payload(&entry, |e| {
                    let digest = e
                        .digest
                        .as_ref()
                        .map(|d| d.as_str())
                        .unwrap_or("-");
                    let created = e
                        .created_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string());
                    println!("{:<40} {:<20} {}", e.tag, created, digest);
                });
            }
            Ok(())
        }
    }
}

fn discover_config() -> Result<Config> {
    let cwd = env::current_dir()?;
    Config::discover(&cwd)
}

fn parse_env(input: &str) -> Result<EnvId> {
    EnvId::from_str(input)
        .map_err(|_| Error::Promote(PromoteError::UnknownEnvironment(input.to_string())))
}

fn parse_tag(input: &str) -> Result<ArtifactTag> {
    ArtifactTag::parse(input)
        .map_err(|e| Error::Promote(PromoteError::UnknownTag(format!("{input}: {e}"))))
}

fn resolve_auth(config: &Config) -> Result<Option<RegistryAuth>> {
    let secrets = LayeredSecretStore::standard(&config.state_dir())?;

    let username = config
        .registry
        .username_key
        .as_deref()
        .map(|key| secrets.get(key))
        .transpose()?
        .flatten();
    let password = config
        .registry
        .password_key
        .as_deref()
        .map(|key| secrets.get(key))
        .transpose()?
        .flatten();

    match (username, password) {
        (Some(username), Some(password)) => Ok(Some(RegistryAuth {
            username,
            password,
            server: None,
        })),
        _ => {
            tracing::debug!("registry credentials not resolved; pushing unauthenticated");
            Ok(None)
        }
    }
}

/// The concrete collaborator set the CLI wires the coordinator with.
struct Stack {
    registry: EnvironmentRegistry,
    builder: CommandBuilder,
    artifacts: BollardArtifactRegistry,
    instances: HttpInstanceGroup,
    gate: HealthGate<HyperProbe>,
    switch: TrafficSwitch<HttpRouting>,
}

impl Stack {
    fn connect(config: &Config) -> Result<Self> {
        let auth = resolve_auth(config)?;
        Ok(Self {
            registry: EnvironmentRegistry::open(
                &config.state_dir(),
                config.routing.initial_active,
            )?,
            builder: CommandBuilder::new(config.build.clone()),
            artifacts: BollardArtifactRegistry::connect(&config.registry.repository, auth)?,
            instances: HttpInstanceGroup::from_config(&config.environments),
            gate: HealthGate::new(HyperProbe::new()),
            switch: TrafficSwitch::new(
                HttpRouting::new(
                    &config.routing.control_endpoint,
                    config.routing.atomic_rebind,
                ),
                &config.routing.alias,
            ),
        })
    }

    fn coordinator<'a>(
        &'a self,
        config: &'a Config,
    ) -> Coordinator<
        'a,
        CommandBuilder,
        BollardArtifactRegistry,
        HttpInstanceGroup,
        HyperProbe,
        HttpRouting,
    > {
        Coordinator::new(
            config,
            &self.registry,
            &self.builder,
            &self.artifacts,
            &self.instances,
            &self.gate,
            &self.switch,
        )
    }
}
