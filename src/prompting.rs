use std::{path::Path, sync::Arc};

use minijinja::{context, Environment};

use crate::config::Persona;
use crate::error::ConfigError;

const FALLBACK_PROMPT_TEMPLATE: &str = include_str!("prompts/fallback_prompt.j2");
const BUILTIN_PROFILE: &str = include_str!("prompts/profile.txt");

/// Longest visitor message, in characters, copied into a prompt.
pub const MAX_GUEST_CHARS: usize = 1_000;

/// Immutable profile text and persona names for prompt building. Shared
/// for the life of the process.
#[derive(Debug, Clone)]
pub struct FallbackContext {
    profile: Arc<str>,
    assistant_name: Arc<str>,
    owner_name: Arc<str>,
}

impl FallbackContext {
    pub fn new(profile: &str, persona: &Persona) -> Self {
        Self {
            profile: Arc::from(profile.trim()),
            assistant_name: Arc::from(persona.assistant_name.as_str()),
            owner_name: Arc::from(persona.owner_name.as_str()),
        }
    }

    pub fn builtin(persona: &Persona) -> Self {
        Self::new(BUILTIN_PROFILE, persona)
    }

    /// Loads the profile from `path`, or the built-in one when unset.
    pub fn load(path: Option<&Path>, persona: &Persona) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::builtin(persona));
        };
        let profile = std::fs::read_to_string(path).map_err(|source| ConfigError::Profile {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::new(&profile, persona))
    }

    pub fn assistant_name(&self) -> &str {
        &self.assistant_name
    }

    pub fn render_prompt(&self, guest_message: &str) -> String {
        let guest_message = bounded(guest_message.trim(), MAX_GUEST_CHARS);

        let mut env = Environment::new();
        if env
            .add_template("fallback_prompt", FALLBACK_PROMPT_TEMPLATE)
            .is_err()
        {
            return self.fallback_prompt(guest_message);
        }

        let Ok(template) = env.get_template("fallback_prompt") else {
            return self.fallback_prompt(guest_message);
        };

        template
            .render(context! {
                assistant_name => self.assistant_name.as_ref(),
                owner_name => self.owner_name.as_ref(),
                profile => self.profile.as_ref(),
                guest_message => guest_message,
            })
            .unwrap_or_else(|_| self.fallback_prompt(guest_message))
    }

    fn fallback_prompt(&self, guest_message: &str) -> String {
        format!(
            "You are {assistant}, a personal portfolio assistant for {owner}. \
             Answer the following using ONLY the data below:\n\n{profile}\n\nGuest: {guest_message}\n{assistant}:",
            assistant = self.assistant_name,
            owner = self.owner_name,
            profile = self.profile,
        )
    }
}

fn bounded(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
