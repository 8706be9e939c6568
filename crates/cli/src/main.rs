use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use stratum_accumulator::Accumulator;
use stratum_config::TransformerConfig;
use stratum_core::{FsLoader, K8sValidator, Loader, Validator};
use stratum_plugins::{PluginConfig, PluginLoader};
use stratum_resource::{ResourceCollection, ResourceFactory};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "stratumctl", version, about = "Stratum: layered configuration builds")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Yaml)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Yaml, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the kustomization in DIR and print the result
    Build {
        /// Directory holding a kustomization file
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Allow exec plugins found under the plugin root
        #[arg(long = "enable-exec-plugins", action = ArgAction::SetTrue)]
        enable_exec_plugins: bool,
        /// Plugin root (default: $XDG_CONFIG_HOME/stratum/plugin)
        #[arg(long = "plugin-root", env = "STRATUM_PLUGIN_ROOT")]
        plugin_root: Option<PathBuf>,
    },
    /// Print the built-in transformer config
    Defaults,
}

fn init_tracing() {
    let env = std::env::var("STRATUM_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn metrics_listener(addr: &str) -> Option<SocketAddr> {
    addr.trim().parse().ok()
}

fn init_metrics() {
    let Ok(addr) = std::env::var("STRATUM_METRICS_ADDR") else { return };
    let Some(sock) = metrics_listener(&addr) else {
        warn!(addr = %addr, "invalid STRATUM_METRICS_ADDR; expected host:port");
        return;
    };
    match metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(sock).install() {
        Ok(()) => info!(addr = %sock, "Prometheus metrics exporter listening"),
        Err(e) => warn!(error = %e, "failed to install metrics exporter"),
    }
}

fn plugin_config(enable_exec_plugins: bool, plugin_root: Option<PathBuf>) -> PluginConfig {
    let mut pc = PluginConfig::from_env();
    pc.exec_enabled |= enable_exec_plugins;
    if let Some(root) = plugin_root {
        pc.root = root;
    }
    pc
}

fn render(c: &ResourceCollection, output: Output) -> Result<String> {
    Ok(match output {
        Output::Yaml => c.as_yaml()?,
        Output::Json => {
            let docs: Vec<_> = c.iter().map(|r| r.body()).collect();
            serde_json::to_string_pretty(&docs)?
        }
    })
}

fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { dir, enable_exec_plugins, plugin_root } => {
            let pc = plugin_config(enable_exec_plugins, plugin_root);
            info!(dir = %dir.display(), plugin_root = %pc.root.display(), exec = pc.exec_enabled, "build invoked");
            let validator: Arc<dyn Validator> = Arc::new(K8sValidator::new());
            let plugins = PluginLoader::new(pc, ResourceFactory::new(validator.clone()));
            let loader: Arc<dyn Loader> = Arc::new(FsLoader::new(&dir));
            let out = Accumulator::new(plugins, validator)
                .build(loader)
                .with_context(|| format!("building {}", dir.display()))?;
            print!("{}", render(&out, cli.output)?);
        }
        Commands::Defaults => {
            let cfg = TransformerConfig::defaults()?;
            match cli.output {
                Output::Yaml => print!("{}", cfg.to_yaml()?),
                Output::Json => println!("{}", serde_json::to_string_pretty(&cfg)?),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stratum_resource::Resource;

    #[test]
    fn cli_parses_build_flags() {
        let cli = Cli::parse_from(["stratumctl", "-o", "json", "build", "overlays/prod", "--enable-exec-plugins", "--plugin-root", "/p"]);
        assert_eq!(cli.output, Output::Json);
        match cli.command {
            Commands::Build { dir, enable_exec_plugins, plugin_root } => {
                assert_eq!(dir, PathBuf::from("overlays/prod"));
                assert!(enable_exec_plugins);
                assert_eq!(plugin_root, Some(PathBuf::from("/p")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn explicit_plugin_root_wins() {
        let pc = plugin_config(true, Some(PathBuf::from("/opt/plugins")));
        assert_eq!(pc.root, PathBuf::from("/opt/plugins"));
        assert!(pc.exec_enabled);
    }

    #[test]
    fn metrics_listener_needs_host_and_port() {
        assert_eq!(metrics_listener("127.0.0.1:9464"), Some(SocketAddr::from(([127, 0, 0, 1], 9464))));
        assert_eq!(metrics_listener(" [::1]:9000 ").map(|s| s.port()), Some(9000));
        assert_eq!(metrics_listener("localhost"), None);
        assert_eq!(metrics_listener(""), None);
    }

    #[test]
    fn json_output_is_an_array_of_objects() {
        let r = Resource::new(json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "a"}})).unwrap();
        let c = ResourceCollection::from_resources([r]).unwrap();
        let v: serde_json::Value = serde_json::from_str(&render(&c, Output::Json).unwrap()).unwrap();
        assert_eq!(v[0]["metadata"]["name"], "a");
    }
}
