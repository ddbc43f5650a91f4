//! Application-level configuration loading: the prompt library and the mascot palette.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TRIVIA_PARTY_CONFIG_PATH";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    prompts: Vec<String>,
    mascots: Vec<String>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the built-in library.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        prompts = app_config.prompts.len(),
                        mascots = app_config.mascots.len(),
                        "loaded prompt library from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Build a configuration from explicit lists; empty lists fall back to the built-in ones.
    pub fn new(prompts: Vec<String>, mascots: Vec<String>) -> Self {
        RawConfig { prompts, mascots }.into()
    }

    /// Prompt library used when a session does not bring its own.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Mascot palette, in assignment order.
    pub fn mascots(&self) -> &[String] {
        &self.mascots
    }

    /// Return the first mascot not already listed in `used`.
    pub fn first_unused_mascot(&self, used: &[&str]) -> Option<&str> {
        self.mascots
            .iter()
            .map(String::as_str)
            .find(|candidate| !used.contains(candidate))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            prompts: default_prompts(),
            mascots: default_mascots(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    prompts: Vec<String>,
    #[serde(default)]
    mascots: Vec<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let clean = |entries: Vec<String>| -> Vec<String> {
            entries
                .into_iter()
                .map(|entry| entry.trim().to_string())
                .filter(|entry| !entry.is_empty())
                .collect()
        };

        let prompts = clean(value.prompts);
        let mascots = clean(value.mascots);
        Self {
            prompts: if prompts.is_empty() {
                default_prompts()
            } else {
                prompts
            },
            mascots: if mascots.is_empty() {
                default_mascots()
            } else {
                mascots
            },
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn default_prompts() -> Vec<String> {
    [
        "The worst thing to hear from your pilot",
        "A terrible name for a pet goldfish",
        "The real reason dinosaurs went extinct",
        "What the office printer is secretly thinking",
        "A rejected flavor of ice cream",
        "The least helpful thing to say at a funeral",
        "A slogan for a very honest used car dealer",
        "What your houseplants gossip about",
        "The worst superpower to have at a wedding",
        "A new Olympic sport nobody asked for",
        "The title of a self-help book written by a cat",
        "Something you should never say to a dentist",
        "The most disappointing prize in a cereal box",
        "A bad excuse for being late to your own party",
        "What aliens would review on a travel site",
        "The secret ingredient in grandma's famous soup",
        "A museum exhibit that would clear the room",
        "The worst thing to find in your sandwich",
        "A motivational quote from a tired sloth",
        "The next big social media trend",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_mascots() -> Vec<String> {
    [
        "fox", "owl", "otter", "panda", "koala", "tiger", "penguin", "hedgehog", "octopus",
        "llama", "raccoon", "walrus",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
