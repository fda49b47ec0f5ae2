use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::configuration::{
    EvictedConfig, PerfConfig, RestartConfig, SecretConfig, Settings, TerminatingConfig, CONFIG_ENV,
};
use crate::ops::secret::Direction;

#[derive(Parser, Debug)]
#[command(name = "ktoolhu")]
#[command(about = "Bulk maintenance operations for Kubernetes clusters", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Absolute path to the kubeconfig file
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Target namespace [default: ktoolhu]
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,

    /// Log filter, e.g. `debug` or `ktoolhu=trace` (RUST_LOG takes priority)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Configuration file
    #[arg(long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or update configmaps multiple times to create load.
    ///
    /// Useful to check the speed of the API server or to trigger etcd
    /// compaction and defragmentation.
    PerfConfigmaps(PerfArgs),

    /// Restart all workloads in the namespace or in the whole cluster
    RestartAll(RestartArgs),

    /// List or remediate terminating namespaces.
    ///
    /// NOTE: with --delete this removes finalizers from objects left in the
    /// namespace. That is not how finalizers are meant to work; their
    /// cleanup is skipped.
    TerminatingNs(TerminatingArgs),

    /// List or delete evicted pods
    EvictedPods(EvictedArgs),

    /// Encode or decode a secret from stdin to stdout (yaml or json)
    Secret(SecretArgs),
}

#[derive(Args, Debug, Default)]
pub struct PerfArgs {
    /// Number of configmaps to create [default: 10]
    #[arg(long)]
    pub create: Option<usize>,

    /// Number of updates cycling over the created configmaps [default: 1000]
    #[arg(long)]
    pub update: Option<usize>,

    /// Maximum number of requests in flight [default: 1]
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Payload padding in bytes [default: 1000]
    #[arg(short, long)]
    pub size: Option<usize>,
}

#[derive(Args, Debug, Default)]
pub struct RestartArgs {
    /// Restart workloads in every namespace
    #[arg(short = 'A', long)]
    pub all_namespaces: bool,
}

#[derive(Args, Debug, Default)]
pub struct TerminatingArgs {
    /// Remove finalizers from objects blocking namespace deletion
    #[arg(long)]
    pub delete: bool,

    /// Do not ask for confirmation
    #[arg(short = 'y', long = "yes")]
    pub assume_yes: bool,
}

#[derive(Args, Debug, Default)]
pub struct EvictedArgs {
    /// Delete the evicted pods
    #[arg(long)]
    pub delete: bool,
}

#[derive(Args, Debug, Default)]
pub struct SecretArgs {
    /// Base64-encode every value of `data`
    #[arg(long, conflicts_with = "decode")]
    pub encode: bool,

    /// Base64-decode every value of `data`
    #[arg(long)]
    pub decode: bool,
}

impl Cli {
    /// Override configured settings with the global flags.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(path) = &self.kubeconfig {
            settings.kube.kubeconfig = Some(path.clone());
        }
        if let Some(context) = &self.context {
            settings.kube.context = Some(context.clone());
        }
        if let Some(namespace) = &self.namespace {
            settings.namespace = namespace.clone();
        }
        if let Some(level) = &self.log_level {
            settings.log_level = level.clone();
        }
    }
}

impl PerfArgs {
    pub fn resolve(&self, settings: &Settings) -> PerfConfig {
        PerfConfig {
            namespace: settings.namespace.clone(),
            create: self.create.unwrap_or(settings.perf.create),
            update: self.update.unwrap_or(settings.perf.update),
            parallel: self.parallel.unwrap_or(settings.perf.parallel),
            size: self.size.unwrap_or(settings.perf.size),
        }
    }
}

impl RestartArgs {
    pub fn resolve(&self, settings: &Settings) -> RestartConfig {
        RestartConfig {
            namespace: Some(settings.namespace.clone()).filter(|ns| !self.all_namespaces && !ns.is_empty()),
        }
    }
}

impl TerminatingArgs {
    pub fn resolve(&self) -> TerminatingConfig {
        TerminatingConfig {
            delete: self.delete,
            assume_yes: self.assume_yes,
        }
    }
}

impl EvictedArgs {
    pub fn resolve(&self) -> EvictedConfig {
        EvictedConfig { delete: self.delete }
    }
}

impl SecretArgs {
    pub fn resolve(&self) -> SecretConfig {
        let direction = match (self.encode, self.decode) {
            (true, _) => Some(Direction::Encode),
            (_, true) => Some(Direction::Decode),
            _ => None,
        };
        SecretConfig { direction }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ktoolhu").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn perf_flags_override_settings() {
        let cli = parse(&["perf-configmaps", "-p", "4", "--create", "3", "-n", "load"]);
        let mut settings = Settings::default();
        cli.apply_to(&mut settings);

        let Command::PerfConfigmaps(args) = &cli.command else {
            panic!("unexpected command {:?}", cli.command);
        };
        let config = args.resolve(&settings);
        assert_eq!(config.namespace, "load");
        assert_eq!(config.create, 3);
        assert_eq!(config.update, 1000);
        assert_eq!(config.parallel, 4);
        assert_eq!(config.size, 1000);
    }

    #[test]
    fn restart_scope() {
        let settings = Settings::default();

        let cli = parse(&["restart-all"]);
        assert_matches!(&cli.command, Command::RestartAll(args) if args.resolve(&settings).namespace.as_deref() == Some("ktoolhu"));

        let cli = parse(&["restart-all", "-A"]);
        assert_matches!(&cli.command, Command::RestartAll(args) if args.resolve(&settings).namespace.is_none());

        let cli = parse(&["restart-all", "-n", ""]);
        let mut settings = Settings::default();
        cli.apply_to(&mut settings);
        assert_matches!(&cli.command, Command::RestartAll(args) if args.resolve(&settings).namespace.is_none());
    }

    #[test]
    fn terminating_flags() {
        let cli = parse(&["terminating-ns", "--delete", "-y"]);
        assert_matches!(
            &cli.command,
            Command::TerminatingNs(args) if args.resolve() == TerminatingConfig { delete: true, assume_yes: true }
        );
    }

    #[test]
    fn secret_direction() {
        let direction = |args: &[&str]| match parse(args).command {
            Command::Secret(args) => args.resolve().direction,
            other => panic!("unexpected command {other:?}"),
        };
        assert_eq!(direction(&["secret"]), None);
        assert_eq!(direction(&["secret", "--encode"]), Some(Direction::Encode));
        assert_eq!(direction(&["secret", "--decode"]), Some(Direction::Decode));
        assert!(Cli::try_parse_from(["ktoolhu", "secret", "--encode", "--decode"]).is_err());
    }

    #[test]
    fn global_flags_reach_kube_settings() {
        let cli = parse(&["evicted-pods", "--delete", "--context", "staging", "--kubeconfig", "/tmp/kc"]);
        let mut settings = Settings::default();
        cli.apply_to(&mut settings);

        assert_eq!(settings.kube.context.as_deref(), Some("staging"));
        assert_eq!(settings.kube.kubeconfig, Some(PathBuf::from("/tmp/kc")));
        assert_matches!(&cli.command, Command::EvictedPods(args) if args.delete);
    }
}
