//! Serde types for the parts of the Bot API the bot touches. Unknown fields
//! are ignored.

use pibot_core::{Keyboard, KeyboardAction};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub description: Option<String>,
    pub result: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl User {
    /// "First Last", falling back to the username, then the numeric id.
    pub fn display_name(&self) -> String {
        let full = match &self.last_name {
            Some(last) if !last.trim().is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        };
        let full = full.trim().to_string();
        if !full.is_empty() {
            return full;
        }
        match &self.username {
            Some(username) if !username.is_empty() => format!("@{username}"),
            _ => self.id.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyboardButton {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyKeyboardMarkup {
    pub keyboard: Vec<Vec<KeyboardButton>>,
    pub resize_keyboard: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyKeyboardRemove {
    pub remove_keyboard: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReplyMarkup {
    Keyboard(ReplyKeyboardMarkup),
    Remove(ReplyKeyboardRemove),
}

impl From<&Keyboard> for ReplyKeyboardMarkup {
    fn from(keyboard: &Keyboard) -> Self {
        Self {
            keyboard: keyboard
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|label| KeyboardButton {
                            text: label.clone(),
                        })
                        .collect()
                })
                .collect(),
            resize_keyboard: true,
        }
    }
}

/// `Keep` leaves whatever keyboard the client currently shows.
pub fn reply_markup(action: &KeyboardAction) -> Option<ReplyMarkup> {
    match action {
        KeyboardAction::Keep => None,
        KeyboardAction::Show(keyboard) => Some(ReplyMarkup::Keyboard(keyboard.into())),
        KeyboardAction::Remove => Some(ReplyMarkup::Remove(ReplyKeyboardRemove {
            remove_keyboard: true,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_update_with_text_message() {
        let json = r#"{
            "update_id": 77,
            "message": {
                "message_id": 5,
                "from": {"id": 4242, "is_bot": false, "first_name": "Ana", "last_name": "Pi"},
                "chat": {"id": 4242, "type": "private"},
                "date": 1700000000,
                "text": "/status"
            }
        }"#;
        let update: Update = serde_json::from_str(json).expect("update");
        let message = update.message.expect("message");
        assert_eq!(message.text.as_deref(), Some("/status"));
        assert_eq!(message.from.expect("from").display_name(), "Ana Pi");
    }

    #[test]
    fn updates_without_message_are_tolerated() {
        let json = r#"{"update_id": 78, "edited_message": {"message_id": 1}}"#;
        let update: Update = serde_json::from_str(json).expect("update");
        assert!(update.message.is_none());
    }

    #[test]
    fn display_name_fallbacks() {
        let mut user = User {
            id: 9,
            is_bot: false,
            first_name: String::new(),
            last_name: None,
            username: Some("stranger".to_string()),
        };
        assert_eq!(user.display_name(), "@stranger");
        user.username = None;
        assert_eq!(user.display_name(), "9");
    }

    #[test]
    fn keyboard_actions_serialize_to_reply_markup() {
        let keyboard = Keyboard::from_rows(&[&["📊 Status", "📜 Logs"], &["💻 PC"]]);
        let shown = reply_markup(&KeyboardAction::Show(keyboard)).expect("markup");
        let json = serde_json::to_value(&shown).expect("json");
        assert_eq!(json["keyboard"][0][1]["text"], "📜 Logs");
        assert_eq!(json["resize_keyboard"], true);

        let removed = reply_markup(&KeyboardAction::Remove).expect("markup");
        assert_eq!(
            serde_json::to_value(&removed).expect("json"),
            serde_json::json!({"remove_keyboard": true})
        );
        assert!(reply_markup(&KeyboardAction::Keep).is_none());
    }

    #[test]
    fn deserialize_api_error() {
        let json = r#"{"ok": false, "description": "Unauthorized"}"#;
        let resp: ApiResponse<Vec<Update>> = serde_json::from_str(json).expect("resp");
        assert!(!resp.ok);
        assert_eq!(resp.description.as_deref(), Some("Unauthorized"));
    }
}
