//! Session configuration and the guard rails applied before start-up.
//!
//! # Design
//! - Options load from JSON or `REEL_*` environment variables; unset fields take defaults.
//! - `normalize` clamps or resets unusable values and records a warning for each change.
//! - Warnings are logged by the controller when the session starts.

use std::path::PathBuf;
use std::str::FromStr;

use reel_core::EngineParams;
use serde::{Deserialize, Serialize};

use crate::buffer::DEFAULT_LOOK_AHEAD;
use crate::error::{SessionError, SessionResult};

/// Default readiness threshold for DHT peer discovery.
pub const DEFAULT_MIN_DHT_NODES: u32 = 10;
/// Largest look-ahead accepted before clamping.
pub const MAX_LOOK_AHEAD: usize = 1024;
/// Download directory used when none is configured.
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

const DOWNLOAD_DIR_ENV: &str = "REEL_DOWNLOAD_DIR";
const LOOK_AHEAD_ENV: &str = "REEL_LOOK_AHEAD";
const MIN_DHT_NODES_ENV: &str = "REEL_MIN_DHT_NODES";
const LISTEN_PORT_ENV: &str = "REEL_ENGINE_LISTEN_PORT";
const ENABLE_DHT_ENV: &str = "REEL_ENGINE_ENABLE_DHT";

/// Configuration for a streaming session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionOptions {
    /// Destination directory for transfers.
    pub download_dir: PathBuf,
    /// Pieces held at top priority ahead of playback.
    pub look_ahead: usize,
    /// DHT nodes required before a descriptor is resolved.
    pub min_dht_nodes: u32,
    /// Parameters passed to the engine on start.
    pub engine: EngineParams,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            look_ahead: DEFAULT_LOOK_AHEAD,
            min_dht_nodes: DEFAULT_MIN_DHT_NODES,
            engine: EngineParams::default(),
        }
    }
}

/// Options after guard rails, plus a description of every adjustment.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSessionOptions {
    /// Options the session runs with.
    pub options: SessionOptions,
    /// Adjustments applied to the requested options.
    pub warnings: Vec<String>,
}

impl SessionOptions {
    /// Parse options from a JSON document; missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ConfigParse`] when the document is malformed.
    pub fn from_json(raw: &str) -> SessionResult<Self> {
        serde_json::from_str(raw).map_err(|source| SessionError::ConfigParse { source })
    }

    /// Read options from `REEL_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] when a variable is set but cannot be parsed.
    pub fn from_env() -> SessionResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SessionResult<Self> {
        let mut options = Self::default();
        if let Some(dir) = lookup(DOWNLOAD_DIR_ENV) {
            options.download_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(LOOK_AHEAD_ENV) {
            options.look_ahead = parse_field("look_ahead", &raw)?;
        }
        if let Some(raw) = lookup(MIN_DHT_NODES_ENV) {
            options.min_dht_nodes = parse_field("min_dht_nodes", &raw)?;
        }
        if let Some(raw) = lookup(LISTEN_PORT_ENV) {
            options.engine.listen_port = Some(parse_field("engine.listen_port", &raw)?);
        }
        if let Some(raw) = lookup(ENABLE_DHT_ENV) {
            options.engine.enable_dht = parse_flag("engine.enable_dht", &raw)?;
        }
        Ok(options)
    }

    /// Apply guard rails, returning the effective options and a warning per adjustment.
    #[must_use]
    pub fn normalize(self) -> EffectiveSessionOptions {
        let mut options = self;
        let mut warnings = Vec::new();

        if options.look_ahead == 0 {
            warnings.push(format!(
                "look_ahead 0 would prioritise nothing; using {DEFAULT_LOOK_AHEAD}"
            ));
            options.look_ahead = DEFAULT_LOOK_AHEAD;
        } else if options.look_ahead > MAX_LOOK_AHEAD {
            warnings.push(format!(
                "look_ahead {} exceeds {MAX_LOOK_AHEAD}; clamping",
                options.look_ahead
            ));
            options.look_ahead = MAX_LOOK_AHEAD;
        }

        if options.engine.listen_port == Some(0) {
            warnings.push("listen_port 0 is invalid; leaving the engine default".to_string());
            options.engine.listen_port = None;
        }

        if !options.engine.enable_dht && options.min_dht_nodes > 0 {
            warnings.push(format!(
                "dht is disabled; min_dht_nodes {} cannot be reached, resolving immediately",
                options.min_dht_nodes
            ));
            options.min_dht_nodes = 0;
        }

        if options.download_dir.as_os_str().is_empty() {
            warnings.push(format!(
                "download_dir is empty; using {DEFAULT_DOWNLOAD_DIR}"
            ));
            options.download_dir = PathBuf::from(DEFAULT_DOWNLOAD_DIR);
        }

        EffectiveSessionOptions { options, warnings }
    }
}

fn parse_field<T: FromStr>(field: &'static str, raw: &str) -> SessionResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| SessionError::InvalidConfig {
            field,
            value: raw.to_string(),
            reason: "not a valid number",
        })
}

fn parse_flag(field: &'static str, raw: &str) -> SessionResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SessionError::InvalidConfig {
            field,
            value: raw.to_string(),
            reason: "not a boolean flag",
        }),
    }
}
