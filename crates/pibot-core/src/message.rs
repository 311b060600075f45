/// Who sent an inbound message. Supplied by the transport, immutable per message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub id: i64,
    pub display_name: String,
}

impl CallerIdentity {
    pub fn new(id: i64, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub caller: CallerIdentity,
    pub text: String,
}

impl InboundMessage {
    pub fn new(chat_id: i64, caller: CallerIdentity, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            caller,
            text: text.into(),
        }
    }

    /// Private chats carry the caller id as chat id.
    pub fn direct(caller: CallerIdentity, text: impl Into<String>) -> Self {
        Self::new(caller.id, caller, text)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextFormat {
    #[default]
    Plain,
    Html,
}

/// Reply keyboard: rows of button labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<String>>,
}

impl Keyboard {
    pub fn from_rows(rows: &[&[&str]]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|row| row.iter().map(|label| (*label).to_string()).collect())
                .collect(),
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.rows.iter().flatten().any(|button| button == label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeyboardAction {
    #[default]
    Keep,
    Show(Keyboard),
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub format: TextFormat,
    pub keyboard: KeyboardAction,
}

impl OutgoingMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::Plain,
            keyboard: KeyboardAction::Keep,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::Html,
            keyboard: KeyboardAction::Keep,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = KeyboardAction::Show(keyboard);
        self
    }
}
