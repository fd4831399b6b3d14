//! Command line, environment, and config file handling.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::Parser;
use mcpwa::platforms::{DEFAULT_BUNDLE_ID, DEFAULT_PROCESS_NAME};
use mcpwa::{AutomationConfig, AutomationError, ChatFilter, PollConfig, TargetApp};
use thiserror::Error;

use crate::errors::ToolError;
use crate::transport::{TransportKind, DEFAULT_SOCKET_PATH};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid filter alias '{0}': expected WORD=FILTER")]
    InvalidAlias(String),

    #[error("invalid automation settings: {0}")]
    Invalid(#[from] AutomationError),
}

/// Gateway exposing the WhatsApp desktop client as line-protocol tools.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcpwa-agent", version, about, long_about = None)]
pub struct Cli {
    /// Transport carrying the protocol: `stdio` or `socket`.
    #[arg(short, long, env = "MCPWA_TRANSPORT", default_value = "stdio")]
    pub transport: TransportKind,

    /// Listen address of the socket transport.
    #[arg(long, env = "MCPWA_SOCKET_PATH", default_value = DEFAULT_SOCKET_PATH)]
    pub socket_path: PathBuf,

    /// Bundle identifier of the client to automate.
    #[arg(long, env = "MCPWA_BUNDLE_ID", default_value = DEFAULT_BUNDLE_ID)]
    pub bundle_id: String,

    /// Process name of the client to automate.
    #[arg(long, env = "MCPWA_PROCESS_NAME", default_value = DEFAULT_PROCESS_NAME)]
    pub process_name: String,

    /// Log filter (e.g. `debug`, `mcpwa=trace`). Falls back to RUST_LOG, then MCPWA_LOG_LEVEL.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Also write a daily rolling log file here. Without a value, the platform's local data
    /// directory is used.
    #[arg(long, env = "MCPWA_LOG_DIR", num_args = 0..=1, value_name = "DIR")]
    pub log_dir: Option<Option<PathBuf>>,

    /// JSON file with automation timing settings. Flags below override it.
    #[arg(short, long, env = "MCPWA_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Extra word accepted as a chat filter, e.g. `--filter-alias people=all`. Repeatable.
    #[arg(long = "filter-alias", value_name = "WORD=FILTER")]
    pub filter_aliases: Vec<String>,

    #[command(flatten)]
    pub timing: TimingArgs,
}

/// Overrides for the automation retry and timing constants.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct TimingArgs {
    #[arg(long, env = "MCPWA_FILTER_ATTEMPTS")]
    pub filter_attempts: Option<u32>,
    #[arg(long, env = "MCPWA_FILTER_INTERVAL_MS")]
    pub filter_interval_ms: Option<u64>,

    #[arg(long, env = "MCPWA_OPEN_CHAT_ATTEMPTS")]
    pub open_chat_attempts: Option<u32>,
    #[arg(long, env = "MCPWA_OPEN_CHAT_INTERVAL_MS")]
    pub open_chat_interval_ms: Option<u64>,

    #[arg(long, env = "MCPWA_SEARCH_POPULATE_ATTEMPTS")]
    pub search_populate_attempts: Option<u32>,
    #[arg(long, env = "MCPWA_SEARCH_POPULATE_INTERVAL_MS")]
    pub search_populate_interval_ms: Option<u64>,

    #[arg(long, env = "MCPWA_SEARCH_CLEAR_ATTEMPTS")]
    pub search_clear_attempts: Option<u32>,
    #[arg(long, env = "MCPWA_SEARCH_CLEAR_INTERVAL_MS")]
    pub search_clear_interval_ms: Option<u64>,

    #[arg(long, env = "MCPWA_SEND_VERIFY_ATTEMPTS")]
    pub send_verify_attempts: Option<u32>,
    #[arg(long, env = "MCPWA_SEND_VERIFY_INTERVAL_MS")]
    pub send_verify_interval_ms: Option<u64>,

    #[arg(long, env = "MCPWA_TAB_ATTEMPTS")]
    pub tab_attempts: Option<u32>,
    #[arg(long, env = "MCPWA_TAB_INTERVAL_MS")]
    pub tab_interval_ms: Option<u64>,

    /// Pause after synthetic input before reading the UI again.
    #[arg(long, env = "MCPWA_SETTLE_DELAY_MS")]
    pub settle_delay_ms: Option<u64>,

    /// Depth bound for element lookups.
    #[arg(long, env = "MCPWA_MAX_SEARCH_DEPTH")]
    pub max_search_depth: Option<usize>,

    /// Number of newest messages inspected when verifying a send.
    #[arg(long, env = "MCPWA_SEND_VERIFY_WINDOW")]
    pub send_verify_window: Option<usize>,
}

fn override_poll(poll: &mut PollConfig, attempts: Option<u32>, interval_ms: Option<u64>) {
    if let Some(attempts) = attempts {
        poll.attempts = attempts;
    }
    if let Some(interval_ms) = interval_ms {
        poll.interval_ms = interval_ms;
    }
}

impl TimingArgs {
    pub fn apply(&self, config: &mut AutomationConfig) {
        override_poll(
            &mut config.filter,
            self.filter_attempts,
            self.filter_interval_ms,
        );
        override_poll(
            &mut config.open_chat,
            self.open_chat_attempts,
            self.open_chat_interval_ms,
        );
        override_poll(
            &mut config.search_populate,
            self.search_populate_attempts,
            self.search_populate_interval_ms,
        );
        override_poll(
            &mut config.search_clear,
            self.search_clear_attempts,
            self.search_clear_interval_ms,
        );
        override_poll(
            &mut config.send_verify,
            self.send_verify_attempts,
            self.send_verify_interval_ms,
        );
        override_poll(
            &mut config.tab_navigation,
            self.tab_attempts,
            self.tab_interval_ms,
        );
        if let Some(ms) = self.settle_delay_ms {
            config.settle_delay_ms = ms;
        }
        if let Some(depth) = self.max_search_depth {
            config.max_search_depth = depth;
        }
        if let Some(window) = self.send_verify_window {
            config.send_verify_window = window;
        }
    }
}

impl Cli {
    pub fn target_app(&self) -> TargetApp {
        TargetApp {
            bundle_id: self.bundle_id.clone(),
            process_name: self.process_name.clone(),
        }
    }

    /// Defaults, then the config file, then flags.
    pub fn automation_config(&self) -> Result<AutomationConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_automation_config(path)?,
            None => AutomationConfig::default(),
        };
        self.timing.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn vocabulary(&self) -> Result<FilterVocabulary, ConfigError> {
        let mut vocabulary = FilterVocabulary::default();
        for spec in &self.filter_aliases {
            let (word, filter) = parse_alias(spec)?;
            vocabulary.add_alias(&word, filter);
        }
        Ok(vocabulary)
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        match &self.log_dir {
            Some(Some(dir)) => Some(dir.clone()),
            Some(None) => Some(default_log_dir()),
            None => None,
        }
    }
}

pub fn load_automation_config(path: &Path) -> Result<AutomationConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("mcpwa")
        .join("logs")
}

fn parse_alias(spec: &str) -> Result<(String, ChatFilter), ConfigError> {
    let Some((word, filter)) = spec.split_once('=') else {
        return Err(ConfigError::InvalidAlias(spec.to_string()));
    };
    if word.trim().is_empty() {
        return Err(ConfigError::InvalidAlias(spec.to_string()));
    }
    let filter = filter
        .parse::<ChatFilter>()
        .map_err(|_| ConfigError::InvalidAlias(spec.to_string()))?;
    Ok((word.to_string(), filter))
}

/// Words accepted for the chat filter parameter, matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterVocabulary {
    words: BTreeMap<String, ChatFilter>,
}

impl Default for FilterVocabulary {
    fn default() -> Self {
        let mut vocabulary = Self {
            words: BTreeMap::new(),
        };
        for filter in ChatFilter::ALL {
            vocabulary.add_alias(filter.as_str(), filter);
        }
        vocabulary.add_alias("favourites", ChatFilter::Favorites);
        vocabulary.add_alias("favorite", ChatFilter::Favorites);
        vocabulary.add_alias("favourite", ChatFilter::Favorites);
        vocabulary.add_alias("group", ChatFilter::Groups);
        vocabulary
    }
}

impl FilterVocabulary {
    pub fn add_alias(&mut self, word: &str, filter: ChatFilter) {
        self.words.insert(word.trim().to_lowercase(), filter);
    }

    /// Resolve a filter word. A missing word means [`ChatFilter::All`].
    pub fn resolve(&self, word: Option<&str>) -> Result<ChatFilter, ToolError> {
        let Some(word) = word.map(str::trim).filter(|w| !w.is_empty()) else {
            return Ok(ChatFilter::All);
        };
        self.words
            .get(&word.to_lowercase())
            .copied()
            .ok_or_else(|| {
                ToolError::invalid_params(format!(
                    "unknown chat filter '{word}' (accepted: {})",
                    self.words.keys().cloned().collect::<Vec<_>>().join(", ")
                ))
            })
    }

    pub fn word_for(&self, filter: ChatFilter) -> &'static str {
        filter.as_str()
    }
}
