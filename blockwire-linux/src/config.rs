//! Load config from file and environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use blockwire_core::{
    BlockDescriptor, BlockKind, ExtensionDefinition, Menu, Registries, Value,
    EXTENSION_DEFAULT_ADDRESS,
};
use serde::Deserialize;
use tracing::warn;

/// Daemon configuration. File: ~/.config/blockwire/config.toml or /etc/blockwire/config.toml.
/// Env overrides: BLOCKWIRE_ADDRESS, BLOCKWIRE_PORT.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Extension name (default "blockwire").
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Listen address (default 0.0.0.0).
    #[serde(default = "default_address")]
    pub address: String,
    /// First listen port (default 55080). 0 lets the OS pick.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Services created together; more than one forms a group on consecutive ports.
    #[serde(default = "default_replicas")]
    pub replicas: usize,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub blocks: Vec<BlockConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// One `[[blocks]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockConfig {
    pub kind: BlockKind,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub arguments: Vec<Value>,
    /// Arrays are strict item lists, tables map tokens to values.
    #[serde(default)]
    pub menus: BTreeMap<String, serde_json::Value>,
}

fn default_name() -> String {
    "blockwire".to_string()
}
fn default_address() -> String {
    EXTENSION_DEFAULT_ADDRESS.to_string()
}
fn default_port() -> u16 {
    55080
}
fn default_replicas() -> usize {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            description: None,
            address: default_address(),
            port: default_port(),
            replicas: default_replicas(),
            log_format: LogFormat::default(),
            blocks: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(text)?;
        if config.replicas == 0 {
            anyhow::bail!("replicas must be at least 1");
        }
        Ok(config)
    }

    /// Apply environment overrides. Unparseable values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(s) = lookup("BLOCKWIRE_ADDRESS") {
            self.address = s;
        }
        if let Some(s) = lookup("BLOCKWIRE_PORT") {
            match s.parse::<u16>() {
                Ok(p) => self.port = p,
                Err(_) => warn!(value = %s, "ignoring BLOCKWIRE_PORT"),
            }
        }
    }

    /// Register the configured blocks as an extension definition named after the config.
    pub fn definition(&self, registries: &Registries) -> anyhow::Result<Arc<ExtensionDefinition>> {
        let definition =
            ExtensionDefinition::new(registries, &self.name, self.description.as_deref())?;
        for block in &self.blocks {
            let mut builder =
                BlockDescriptor::builder(block.kind, &block.name).arguments(block.arguments.clone());
            if let Some(d) = &block.description {
                builder = builder.description(d);
            }
            if let Some(v) = &block.default {
                builder = builder.default_value(v.clone());
            }
            for (name, json) in &block.menus {
                builder = builder.menu(name, Menu::from_json(name, json)?);
            }
            definition
                .add(builder)
                .with_context(|| format!("block {:?}", block.name))?;
        }
        Ok(definition)
    }
}

/// Load config: the explicit path, else the first existing default path, else defaults;
/// then env vars.
pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let file = match path {
        Some(p) => Some(p.to_path_buf()),
        None => config_paths().into_iter().find(|p| p.exists()),
    };
    let mut c = match file {
        Some(p) => {
            let text = std::fs::read_to_string(&p)
                .with_context(|| format!("reading {}", p.display()))?;
            Config::from_toml(&text).with_context(|| format!("parsing {}", p.display()))?
        }
        None => Config::default(),
    };
    c.apply_env(|k| std::env::var(k).ok());
    Ok(c)
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/blockwire/config.toml"));
    }
    out.push(PathBuf::from("/etc/blockwire/config.toml"));
    out
}
