use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context as _};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dominos_core::{Explainer, GenericError, NarrativeExplainer, SimulationConfig};
use figment::{
    providers::{Env, Format as _, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "DOMINOS_";

const fn default_listen_address() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 8080))
}

#[derive(Parser)]
#[command(about, version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Runs a single simulation, writing each incident to standard output as a line of JSON.
    Run(RunArgs),

    /// Serves simulations over HTTP, streaming incidents as Server-Sent Events.
    Serve(ServeArgs),

    /// Prints the reverse dependency index of the given services as JSON.
    Topology(TopologyArgs),
}

#[derive(Args)]
pub struct SourceArgs {
    /// Path to the service definitions, in JSON or YAML.
    #[arg(long, short = 's')]
    pub services: PathBuf,

    /// Path to a YAML configuration file.
    ///
    /// Settings from the file override the built-in defaults, and are themselves overridden by `DOMINOS_`-prefixed
    /// environment variables and command-line flags.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Fixed seed for glitch decisions, making the run reproducible.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of ticks to run.
    #[arg(long)]
    pub max_ticks: Option<usize>,

    /// Explainer used to narrate incidents.
    #[arg(long, value_enum)]
    pub explainer: Option<ExplainerKind>,
}

#[derive(Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Address to listen on.
    #[arg(long, short = 'l')]
    pub listen: Option<SocketAddr>,

    /// Explainer used to narrate incidents.
    #[arg(long, value_enum)]
    pub explainer: Option<ExplainerKind>,
}

#[derive(Args)]
pub struct TopologyArgs {
    /// Path to the service definitions, in JSON or YAML.
    #[arg(long, short = 's')]
    pub services: PathBuf,
}

/// How incidents are narrated.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ExplainerKind {
    /// No narration: incidents carry a placeholder explanation.
    Disabled,

    /// Local, templated narration.
    #[default]
    Narrative,
}

impl ExplainerKind {
    pub fn build(self) -> Option<Arc<dyn Explainer>> {
        match self {
            Self::Disabled => None,
            Self::Narrative => Some(Arc::new(NarrativeExplainer)),
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Config {
    /// Simulation settings.
    #[serde(flatten)]
    pub simulation: SimulationConfig,

    /// Address the HTTP server listens on.
    ///
    /// Defaults to `0.0.0.0:8080`.
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,

    /// Explainer used to narrate incidents.
    ///
    /// Defaults to `narrative`.
    #[serde(default)]
    pub explainer: ExplainerKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            listen_address: default_listen_address(),
            explainer: ExplainerKind::default(),
        }
    }
}

/// Command-line settings that take precedence over every other configuration source.
#[derive(Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ticks: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_address: Option<SocketAddr>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub explainer: Option<ExplainerKind>,
}

impl Config {
    /// Loads the configuration, layering the built-in defaults, the optional YAML file at `path`, `DOMINOS_`-prefixed
    /// environment variables, and finally `overrides`.
    ///
    /// # Errors
    ///
    /// If `path` does not exist, if any source holds invalid settings, or if the resulting simulation settings fail
    /// validation, an error is returned.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Self, GenericError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if let Some(path) = path {
            if !path.is_file() {
                bail!("Configuration file '{}' does not exist.", path.display());
            }
            figment = figment.merge(Yaml::file(path));
        }

        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(overrides))
            .extract()
            .context("Failed to load configuration.")?;

        config
            .simulation
            .validate()
            .context("Invalid simulation configuration.")?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write as _, time::Duration};

    use figment::Jail;

    use super::*;

    #[test]
    fn defaults() {
        Jail::expect_with(|_| {
            let config = Config::load(None, Overrides::default()).expect("defaults should load");
            assert_eq!(config, Config::default());
            assert_eq!(config.listen_address.port(), 8080);
            assert_eq!(config.simulation.max_ticks, 15);
            Ok(())
        });
    }

    #[test]
    fn layering_order() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "dominos.yaml",
                "max_ticks: 5\nseed: 1\ntick_interval_ms: 250\nexplainer: disabled\n",
            )?;
            jail.set_env("DOMINOS_SEED", "2");
            jail.set_env("DOMINOS_GRACE_PERIOD_MS", "1500");

            let overrides = Overrides {
                max_ticks: Some(9),
                ..Default::default()
            };
            let config = Config::load(Some(Path::new("dominos.yaml")), overrides).expect("config should load");

            assert_eq!(config.simulation.max_ticks, 9);
            assert_eq!(config.simulation.seed, Some(2));
            assert_eq!(config.simulation.tick_interval, Duration::from_millis(250));
            assert_eq!(config.simulation.grace_period, Duration::from_millis(1500));
            assert_eq!(config.explainer, ExplainerKind::Disabled);
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = Config::load(Some(Path::new("/definitely/not/here.yaml")), Overrides::default());
        assert!(result.is_err());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("should create temp file");
        writeln!(file, "glitch_threshold: 1.5").expect("should write temp file");

        let error = Config::load(Some(file.path()), Overrides::default()).expect_err("should be rejected");
        assert!(format!("{:?}", error).contains("glitch threshold"));
    }
}
