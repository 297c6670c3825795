//! Main application entry point for the sync fabric node
//!
//! Provides CLI interface, configuration loading, and node startup with the
//! module lifecycle manager and broker-backed cache coherency.

use clap::{Arg, Command};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nexus_broker::{BrokerTransport, InMemoryBroker};
use nexus_core::{CoreContext, ModuleManager, NullHostRuntime, Stores};
use nexus_core::modules::{
    ChatModule, HeartbeatModule, PermissionModule, PreferencesModule, ProfileModule, SyncModule,
};
use nexus_types::parse_duration;

// ============================================================================
// Configuration
// ============================================================================

/// Application configuration loaded from TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Node identity and heartbeat settings
    pub node: NodeSettings,
    /// Cache coherency timer settings
    pub sync: SyncSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Node name announced on heartbeat channels
    pub name: String,
    /// Player capacity reported in status packets
    pub max_players: u32,
    /// Heartbeat publish interval, e.g. "5s"
    pub heartbeat_interval: String,
    /// Window after which a silent peer is dropped from the topology
    pub stale_after: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Leaderboard cache refresh interval, e.g. "5m"
    pub leaderboard_refresh: String,
    /// Timed-role expiry sweep interval
    pub role_expiry_sweep: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter
    pub level: String,
    /// JSON formatting
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings {
                name: "node-1".to_string(),
                max_players: 100,
                heartbeat_interval: "5s".to_string(),
                stale_after: "30s".to_string(),
            },
            sync: SyncSettings {
                leaderboard_refresh: "5m".to_string(),
                role_expiry_sweep: "1m".to_string(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Create default config file
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    fn duration(field: &str, value: &str) -> Result<Duration, String> {
        let ms = parse_duration(value).map_err(|e| format!("invalid {field}: {e}"))?;
        Ok(Duration::from_millis(ms))
    }

    pub fn heartbeat_interval(&self) -> Result<Duration, String> {
        Self::duration("node.heartbeat_interval", &self.node.heartbeat_interval)
    }

    pub fn stale_after(&self) -> Result<Duration, String> {
        Self::duration("node.stale_after", &self.node.stale_after)
    }

    pub fn leaderboard_refresh(&self) -> Result<Duration, String> {
        Self::duration("sync.leaderboard_refresh", &self.sync.leaderboard_refresh)
    }

    pub fn role_expiry_sweep(&self) -> Result<Duration, String> {
        Self::duration("sync.role_expiry_sweep", &self.sync.role_expiry_sweep)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.node.name.is_empty() {
            return Err("Node name cannot be empty".to_string());
        }

        if self.node.max_players == 0 {
            return Err("node.max_players must be at least 1".to_string());
        }

        self.heartbeat_interval()?;
        self.stale_after()?;
        self.leaderboard_refresh()?;
        self.role_expiry_sweep()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level, valid_levels
            ));
        }

        Ok(())
    }
}

// ============================================================================
// CLI Interface
// ============================================================================

/// Command line arguments
#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub node_name: Option<String>,
    pub log_level: Option<String>,
    pub json_logs: bool,
}

impl CliArgs {
    /// Parse command line arguments
    pub fn parse() -> Self {
        let matches = Command::new("Nexus Sync Fabric")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Cross-node synchronization fabric for game server fleets")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("config.toml"),
            )
            .arg(
                Arg::new("node")
                    .short('n')
                    .long("node")
                    .value_name("NAME")
                    .help("Node name announced to the fleet"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .get_matches();

        Self {
            config_path: PathBuf::from(
                matches
                    .get_one::<String>("config")
                    .cloned()
                    .unwrap_or_else(|| "config.toml".to_string()),
            ),
            node_name: matches.get_one::<String>("node").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

/// Initialize logging system
fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if json_format || config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .init();
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

// ============================================================================
// Signal Handling
// ============================================================================

/// Setup graceful shutdown signal handling
async fn setup_signal_handlers() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("📡 Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("📡 Received SIGTERM");
            }
        }
    }

    #[cfg(windows)]
    {
        signal::ctrl_c().await?;
        info!("📡 Received Ctrl+C");
    }

    Ok(())
}

// ============================================================================
// Application
// ============================================================================

/// Main application struct owning the context and module manager
pub struct Application {
    config: AppConfig,
    ctx: Arc<CoreContext>,
    manager: ModuleManager,
}

impl Application {
    /// Create new application: load config, apply CLI overrides, build the
    /// context and register the standard module set
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        // Load configuration first (before logging setup)
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        // Apply CLI overrides
        if let Some(node_name) = args.node_name {
            config.node.name = node_name;
        }

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        // Validate configuration
        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {}", e).into());
        }

        setup_logging(&config.logging, args.json_logs)?;
        display_banner();

        // Single-process transport and in-memory store; production drivers
        // plug in behind the same traits.
        let transport: Arc<dyn BrokerTransport> = Arc::new(InMemoryBroker::new());
        let ctx = CoreContext::new(
            config.node.name.clone(),
            transport,
            Stores::in_memory(),
            Arc::new(NullHostRuntime),
        );

        let mut manager = ModuleManager::new();
        manager.register(Box::new(ProfileModule));
        manager.register(Box::new(PermissionModule {
            expiry_sweep_interval: config.role_expiry_sweep()?,
        }));
        manager.register(Box::new(PreferencesModule));
        manager.register(Box::new(SyncModule {
            leaderboard_interval: config.leaderboard_refresh()?,
        }));
        manager.register(Box::new(ChatModule));
        manager.register(Box::new(HeartbeatModule {
            interval: config.heartbeat_interval()?,
            stale_after: config.stale_after()?,
            max_players: config.node.max_players,
        }));

        info!(
            "📂 Config: {} | Node: {}",
            args.config_path.display(),
            config.node.name
        );

        Ok(Self {
            config,
            ctx,
            manager,
        })
    }

    /// Run the application until a shutdown signal arrives
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Nexus node '{}'", self.config.node.name);
        info!("📋 Configuration Summary:");
        info!("  💓 Heartbeat interval: {}", self.config.node.heartbeat_interval);
        info!("  🕸️ Stale peer window: {}", self.config.node.stale_after);
        info!("  🏆 Leaderboard refresh: {}", self.config.sync.leaderboard_refresh);
        info!("  👥 Max players: {}", self.config.node.max_players);

        self.manager.enable_all(&self.ctx).await;

        let enabled = self.manager.enabled_modules();
        info!("✅ Nexus node is now running!");
        info!("🧩 Modules enabled: {}", enabled.join(", "));
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        setup_signal_handlers().await?;

        info!("🛑 Shutdown signal received, initiating graceful shutdown...");
        self.manager.disable_all(&self.ctx).await;
        self.ctx.shutdown();

        info!("✅ Nexus node shutdown complete");
        Ok(())
    }
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Create and run application
    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start application: {:?}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Utilities and Helpers
// ============================================================================

/// Display startup banner using proper logging
fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║             🌐 NEXUS FABRIC 🌐           ║");
    info!("║                 v{}                   ║", version);
    info!("║                                          ║");
    info!("║  Cross-Node Sync for Game Fleets         ║");
    info!("║                                          ║");
    info!("║  🧩 Priority-Ordered Modules             ║");
    info!("║  📦 Typed Service Registry               ║");
    info!("║  📡 Broker Cache Coherency               ║");
    info!("║  💓 Heartbeat Topology                   ║");
    info!("║                                          ║");
    info!("╚══════════════════════════════════════════╝");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());

        assert_eq!(
            config.heartbeat_interval().unwrap(),
            Duration::from_secs(5)
        );
        assert_eq!(
            config.leaderboard_refresh().unwrap(),
            Duration::from_secs(300)
        );
    }

    #[tokio::test]
    async fn test_config_validation() {
        let mut config = AppConfig::default();

        // Empty node name
        config.node.name = String::new();
        assert!(config.validate().is_err());

        // Unparseable interval
        config.node.name = "node-1".to_string();
        config.node.heartbeat_interval = "soon".to_string();
        assert!(config.validate().is_err());

        // Invalid log level
        config.node.heartbeat_interval = "5s".to_string();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        // First load writes the defaults.
        let created = AppConfig::load_from_file(&path).await.expect("create");
        assert!(path.exists());
        assert_eq!(created.node.name, "node-1");

        // Second load reads them back.
        let loaded = AppConfig::load_from_file(&path).await.expect("reload");
        assert_eq!(loaded.node.max_players, created.node.max_players);
        assert_eq!(loaded.sync.role_expiry_sweep, "1m");
    }

    #[test]
    fn test_cli_defaults() {
        let args = CliArgs {
            config_path: PathBuf::from("test.toml"),
            node_name: Some("lobby-3".to_string()),
            log_level: Some("debug".to_string()),
            json_logs: true,
        };

        assert_eq!(args.config_path, PathBuf::from("test.toml"));
        assert_eq!(args.node_name, Some("lobby-3".to_string()));
        assert!(args.json_logs);
    }
}
