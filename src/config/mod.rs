//! Configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then environment variables (the deployment host sets `ACCESS_TOKEN`,
//! `PHONE_NUMBER_ID`, `VERIFY_TOKEN`, ... directly), then CLI overrides.

use crate::clock::{HOUR_MS, MINUTE_MS, Millis};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Keys read as comma-separated lists when they come from the environment.
const LIST_KEYS: &[&str] = &["nudge_templates", "nudge_thresholds_hours"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- Listener ---
    pub port: u16,
    pub bind_address: String,

    // --- WhatsApp Cloud API ---
    pub access_token: String,
    pub phone_number_id: String,
    pub verify_token: String,
    pub graph_base_url: String,
    pub graph_api_version: String,

    // --- LLM ---
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub transcription_model: String,

    // --- CRM ---
    pub systeme_secret: Option<String>,
    pub leads_file: Option<PathBuf>,

    // --- Program ---
    pub program_delay_min_minutes: u64,
    pub program_delay_max_minutes: u64,
    pub program_template: String,
    pub program_image_url: Option<String>,

    // --- Conversation ---
    pub reply_fallback_template: String,
    pub welcome_enabled: bool,
    pub welcome_template: String,
    pub history_max_turns: usize,
    pub history_keep_turns: usize,

    // --- Nudges ---
    pub nudge_templates: Vec<String>,
    pub nudge_thresholds_hours: Vec<u64>,
    pub nudge_min_spacing_hours: u64,

    // --- Templates & numbers ---
    pub template_language: String,
    pub template_default_name: String,
    pub default_country_code: String,

    // --- Runtime ---
    pub sweep_interval_secs: u64,
    pub http_timeout_secs: u64,
    pub log_format: LogFormat,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// One rung of the re-engagement ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NudgeStage {
    pub template: String,
    /// Silence since the last inbound message before this stage fires.
    pub after_ms: Millis,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 10000,
            bind_address: "0.0.0.0".to_string(),
            access_token: String::new(),
            phone_number_id: String::new(),
            verify_token: String::new(),
            graph_base_url: "https://graph.facebook.com".to_string(),
            graph_api_version: "v24.0".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com".to_string(),
            openai_model: "gpt-4.1-mini".to_string(),
            transcription_model: "whisper-1".to_string(),
            systeme_secret: None,
            leads_file: None,
            program_delay_min_minutes: 120,
            program_delay_max_minutes: 240,
            program_template: "programme_pret".to_string(),
            program_image_url: None,
            reply_fallback_template: "reprise_conversation".to_string(),
            welcome_enabled: true,
            welcome_template: "bienvenue_fitmouv".to_string(),
            history_max_turns: 30,
            history_keep_turns: 12,
            nudge_templates: vec![
                "relance_24h".to_string(),
                "relance_72h".to_string(),
                "relance_7j".to_string(),
            ],
            nudge_thresholds_hours: vec![24, 72, 168],
            nudge_min_spacing_hours: 24,
            template_language: "fr".to_string(),
            template_default_name: "toi".to_string(),
            default_country_code: "33".to_string(),
            sweep_interval_secs: 60,
            http_timeout_secs: 60,
            log_format: LogFormat::Pretty,
            log_dir: None,
        }
    }
}

/// Overrides coming from the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub bind_address: Option<String>,
    pub leads_file: Option<PathBuf>,
}

impl Config {
    /// Load, merge and validate against the process environment.
    ///
    /// `file` is required to exist when given; otherwise
    /// `~/.config/fitmouv/config.toml` is read if present.
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        Self::load_with_env(file, overrides, std::env::vars().collect())
    }

    /// Same as [`load`](Self::load) with an explicit environment.
    ///
    /// Values stay strings until deserialization, so a `VERIFY_TOKEN` of
    /// `0123` keeps its leading zero while `PORT=8080` still becomes a `u16`.
    pub fn load_with_env(
        file: Option<&Path>,
        overrides: &Overrides,
        mut env: HashMap<String, String>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();

        match file {
            Some(path) => {
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(path) = default_config_path() {
                    builder = builder.add_source(config::File::from(path).required(false));
                }
            }
        }

        let mut lists = Vec::new();
        for key in LIST_KEYS {
            if let Some(raw) = take_env(&mut env, key) {
                let items: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect();
                lists.push((*key, items));
            }
        }

        builder = builder.add_source(config::Environment::default().source(Some(env)));
        for (key, items) in lists {
            builder = builder
                .set_override(key, items)
                .map_err(|e| Error::Config(e.to_string()))?;
        }

        builder = builder
            .set_override_option("port", overrides.port.map(i64::from))
            .and_then(|b| b.set_override_option("bind_address", overrides.bind_address.clone()))
            .and_then(|b| {
                b.set_override_option(
                    "leads_file",
                    overrides
                        .leads_file
                        .as_ref()
                        .map(|p| p.to_string_lossy().into_owned()),
                )
            })
            .map_err(|e| Error::Config(e.to_string()))?;

        let cfg: Config = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("ACCESS_TOKEN", &self.access_token),
            ("PHONE_NUMBER_ID", &self.phone_number_id),
            ("VERIFY_TOKEN", &self.verify_token),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{} is required", name)));
            }
        }

        if self.program_delay_min_minutes > self.program_delay_max_minutes {
            return Err(Error::Config(format!(
                "PROGRAM_DELAY_MIN_MINUTES ({}) exceeds PROGRAM_DELAY_MAX_MINUTES ({})",
                self.program_delay_min_minutes, self.program_delay_max_minutes
            )));
        }

        if self.nudge_templates.len() != self.nudge_thresholds_hours.len() {
            return Err(Error::Config(format!(
                "NUDGE_TEMPLATES has {} entries but NUDGE_THRESHOLDS_HOURS has {}",
                self.nudge_templates.len(),
                self.nudge_thresholds_hours.len()
            )));
        }

        if self
            .nudge_thresholds_hours
            .windows(2)
            .any(|pair| pair[0] >= pair[1])
        {
            return Err(Error::Config(
                "NUDGE_THRESHOLDS_HOURS must be strictly increasing".to_string(),
            ));
        }

        if self.history_keep_turns >= self.history_max_turns {
            return Err(Error::Config(
                "HISTORY_KEEP_TURNS must be lower than HISTORY_MAX_TURNS".to_string(),
            ));
        }

        if self.sweep_interval_secs == 0 {
            return Err(Error::Config("SWEEP_INTERVAL_SECS must be positive".to_string()));
        }

        Ok(())
    }

    /// Inclusive bounds of the program delay, in milliseconds.
    pub fn program_delay_range_ms(&self) -> (Millis, Millis) {
        (
            self.program_delay_min_minutes as Millis * MINUTE_MS,
            self.program_delay_max_minutes as Millis * MINUTE_MS,
        )
    }

    pub fn nudge_ladder(&self) -> Vec<NudgeStage> {
        self.nudge_templates
            .iter()
            .zip(&self.nudge_thresholds_hours)
            .map(|(template, hours)| NudgeStage {
                template: template.clone(),
                after_ms: *hours as Millis * HOUR_MS,
            })
            .collect()
    }

    pub fn nudge_min_spacing_ms(&self) -> Millis {
        self.nudge_min_spacing_hours as Millis * HOUR_MS
    }

    /// Base URL for Graph API calls, e.g. `https://graph.facebook.com/v24.0`.
    pub fn graph_api_url(&self) -> String {
        format!(
            "{}/{}",
            self.graph_base_url.trim_end_matches('/'),
            self.graph_api_version
        )
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Remove `key` from `env`, matching the variable name case-insensitively.
fn take_env(env: &mut HashMap<String, String>, key: &str) -> Option<String> {
    let name = env.keys().find(|name| name.eq_ignore_ascii_case(key))?.clone();
    env.remove(&name)
}

/// `~/.config/fitmouv/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fitmouv").join("config.toml"))
}
