use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Process-unique connection id. Ids are never reused, so an id doubles as
/// the generation of whichever slot it occupies.
pub type ConnId = usize;

/// Admin to server: operator started typing.
pub const ADMIN_TYPING_IN: &str = "__typing__";
/// Server to user: operator is typing.
pub const ADMIN_TYPING_OUT: &str = "__admin_typing__";
/// Server to user: the assistant is composing a reply.
pub const AI_TYPING: &str = "__ai_typing__";
/// Server to admin: `type` of the visitor typing notice.
pub const USER_TYPING: &str = "__user_typing__";

pub const GREETINGS: [&str; 3] = ["hi", "hello", "hey"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// Frames a visitor may send. Anything that does not decode into one of
/// these is dropped as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Identity {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        location: Option<String>,
        #[serde(default)]
        ip: Option<String>,
    },
    Typing {},
    Chat {
        message: String,
    },
}

impl InboundFrame {
    pub fn decode(raw: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserTypingNotice<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: &'a str,
}

impl<'a> UserTypingNotice<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            kind: USER_TYPING,
            name,
        }
    }
}
