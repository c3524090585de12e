use chrono::NaiveTime;
use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::chat::channels::DEFAULT_MAX_CHANNEL_HISTORY;
use crate::dm::conversations::DEFAULT_MAX_CONVERSATION_HISTORY;

/// Command-line layer. Every field is optional and only serialized when
/// given, so unset flags never mask the TOML file or the environment.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "linkup-server", version, about = "linkup presence and messaging server")]
pub struct Cli {
    /// Port to listen on [default: 5000]
    #[arg(long, env = "LINKUP_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long, env = "LINKUP_BIND_ADDRESS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./linkup.toml")]
    #[serde(skip)]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,

    /// JSON file holding the user directory (owned by the registration service)
    /// [default: ./data/users.json]
    #[arg(long, env = "LINKUP_USERS_FILE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users_file: Option<String>,
}

/// Effective server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    #[serde(default)]
    pub json_logs: bool,
    pub users_file: String,

    /// Channel and conversation limits ([chat] section)
    #[serde(default)]
    pub chat: ChatConfig,

    /// Daily match scheduling ([matching] section)
    #[serde(default)]
    pub matching: MatchingConfig,

    /// Compatibility analyzer ([analyzer] section)
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
}

/// History bounds for channels and conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Messages retained per channel (default: 100)
    #[serde(default = "default_max_channel_history")]
    pub max_channel_history: usize,

    /// Messages retained per private conversation (default: 50)
    #[serde(default = "default_max_conversation_history")]
    pub max_conversation_history: usize,

    /// Channel messages sent to a connection when it joins (default: 50)
    #[serde(default = "default_snapshot_history")]
    pub snapshot_history: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_channel_history: DEFAULT_MAX_CHANNEL_HISTORY,
            max_conversation_history: DEFAULT_MAX_CONVERSATION_HISTORY,
            snapshot_history: 50,
        }
    }
}

fn default_max_channel_history() -> usize {
    DEFAULT_MAX_CHANNEL_HISTORY
}

fn default_max_conversation_history() -> usize {
    DEFAULT_MAX_CONVERSATION_HISTORY
}

fn default_snapshot_history() -> usize {
    50
}

/// Configuration for the daily match sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Whether the background scheduler runs at all (default: true)
    #[serde(default = "default_matching_enabled")]
    pub enabled: bool,

    /// Local wall-clock time of the daily sweep, "HH:MM" (default: "09:00")
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// Seconds between schedule checks (default: 3600 = 1 hour)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: default_schedule(),
            tick_interval_secs: 3600,
        }
    }
}

impl MatchingConfig {
    pub fn schedule_time(&self) -> Result<NaiveTime, chrono::ParseError> {
        parse_schedule(&self.schedule)
    }
}

fn default_matching_enabled() -> bool {
    true
}

fn default_schedule() -> String {
    "09:00".to_string()
}

fn default_tick_interval() -> u64 {
    3600
}

/// Parse an "HH:MM" schedule time.
pub fn parse_schedule(value: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
}

/// Configuration for the remote compatibility analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// API key; when empty the offline keyword analyzer is used
    #[serde(default)]
    pub api_key: String,

    /// Base URL of an OpenAI-compatible API (default: "https://api.openai.com/v1")
    #[serde(default = "default_analyzer_base_url")]
    pub base_url: String,

    /// Model name (default: "gpt-3.5-turbo")
    #[serde(default = "default_analyzer_model")]
    pub model: String,

    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_analyzer_timeout")]
    pub timeout_secs: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_analyzer_base_url(),
            model: default_analyzer_model(),
            timeout_secs: 30,
        }
    }
}

fn default_analyzer_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_analyzer_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_analyzer_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            users_file: "./data/users.json".to_string(),
            chat: ChatConfig::default(),
            matching: MatchingConfig::default(),
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (LINKUP_*) < CLI args
    pub fn load(cli: &Cli) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("LINKUP_").split("__"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# linkup server configuration
# Place this file at ./linkup.toml or specify with --config <path>
# All settings can be overridden via environment variables (LINKUP_PORT,
# LINKUP_MATCHING__SCHEDULE, ...) or CLI flags (--port, etc.)

# Server port (default: 5000)
# port = 5000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# User directory written by the registration service
# users_file = "./data/users.json"

# ---- Chat ----
# [chat]
# max_channel_history = 100       # messages kept per channel
# max_conversation_history = 50   # messages kept per private conversation
# snapshot_history = 50           # channel messages sent on join

# ---- Daily Match ----
# [matching]
# enabled = true
# schedule = "09:00"              # local time of the daily sweep
# tick_interval_secs = 3600       # how often the schedule is checked

# ---- Compatibility Analyzer ----
# [analyzer]
# api_key = ""                    # empty: offline keyword matching
# base_url = "https://api.openai.com/v1"
# model = "gpt-3.5-turbo"
# timeout_secs = 30
"#
    .to_string()
}
