use crate::types::ADMIN_TYPING_IN;

/// What an operator frame means. Frames shaped `__name__` are reserved for
/// control signals and are never shown to the visitor as chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminFrame<'a> {
    Typing,
    Control(&'a str),
    Chat(&'a str),
    Empty,
}

impl<'a> AdminFrame<'a> {
    pub fn classify(raw: &'a str) -> Self {
        let text = raw.trim();
        if text == ADMIN_TYPING_IN {
            return Self::Typing;
        }
        if is_control_frame(text) {
            return Self::Control(text);
        }
        if text.is_empty() {
            Self::Empty
        } else {
            Self::Chat(text)
        }
    }
}

pub fn is_control_frame(raw: &str) -> bool {
    raw.len() > 4 && raw.starts_with("__") && raw.ends_with("__")
}

pub fn format_operator_message(operator: &str, text: &str) -> String {
    format!("{operator}: {text}")
}
