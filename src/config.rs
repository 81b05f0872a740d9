use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::error::{ConfigError, FallbackError};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_PROVIDER_URL: &str =
    "https://api-inference.huggingface.co/models/mistralai/Mixtral-8x7B-Instruct-v0.1";
const DEFAULT_MODEL: &str = "mistralai/Mixtral-8x7B-Instruct-v0.1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Request/response dialect of the completion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// `{"inputs": prompt}` in, `generated_text` out.
    HfInference,
    /// Chat-completions message array in, `choices[0].message.content` out.
    ChatCompletions,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hf" | "huggingface" => Ok(Self::HfInference),
            "openai" | "chat" => Ok(Self::ChatCompletions),
            _ => Err(ConfigError::Invalid {
                key: "PROVIDER_KIND",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

/// Names used in every visitor-facing text.
#[derive(Debug, Clone)]
pub struct Persona {
    pub assistant_name: String,
    pub operator_name: String,
    pub owner_name: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            assistant_name: "AI Nik".to_string(),
            operator_name: "Nik".to_string(),
            owner_name: "Nikhil Singh".to_string(),
        }
    }
}

impl Persona {
    pub fn owner_first_name(&self) -> &str {
        self.owner_name
            .split_whitespace()
            .next()
            .unwrap_or(&self.owner_name)
    }

    pub fn speak(&self, text: &str) -> String {
        format!("{}: {}", self.assistant_name, text)
    }

    pub fn greeting(&self) -> String {
        self.speak(&format!(
            "Hello! I'm {}'s personal AI assistant. What would you like to know?",
            self.owner_first_name()
        ))
    }

    /// Visitor-safe text for a failed fallback call. Provider detail never
    /// leaks through.
    pub fn failure(&self, err: &FallbackError) -> String {
        if err.is_provider_error() {
            self.speak("I'm currently having trouble answering. Please try again soon.")
        } else {
            self.speak("Something went wrong processing your request.")
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    pub provider: ProviderConfig,
    pub persona: Persona,
    pub profile_path: Option<PathBuf>,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };
        let timeout_secs = match get("PROVIDER_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "PROVIDER_TIMEOUT_SECS",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_TIMEOUT_SECS,
        };
        let kind = match get("PROVIDER_KIND") {
            Some(raw) => raw.parse()?,
            None => ProviderKind::HfInference,
        };

        let defaults = Persona::default();
        let persona = Persona {
            assistant_name: get("ASSISTANT_NAME").unwrap_or(defaults.assistant_name),
            operator_name: get("OPERATOR_NAME").unwrap_or(defaults.operator_name),
            owner_name: get("OWNER_NAME").unwrap_or(defaults.owner_name),
        };

        Ok(Self {
            port,
            provider: ProviderConfig {
                endpoint: get("PROVIDER_URL").unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_string()),
                kind,
                model: get("PROVIDER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                api_key: get("PROVIDER_API_KEY").or_else(|| get("HF_API_KEY")),
                timeout: Duration::from_secs(timeout_secs),
            },
            persona,
            profile_path: get("PROFILE_PATH").map(PathBuf::from),
        })
    }
}
