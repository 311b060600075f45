//! Reply keyboard labels. Navigation is stateless: every label maps straight
//! to the screen or command it names.

use crate::message::Keyboard;

pub const STATUS: &str = "📊 Status";
pub const DISK_TEMP: &str = "🧊 Disk temp";
pub const UPDATE_SITE: &str = "🌐 Update site";
pub const LOGS: &str = "📜 Logs";
pub const PC: &str = "💻 PC";
pub const WAKE_PC: &str = "⚡ Wake PC";
pub const SHUTDOWN_PC: &str = "⏻ Shutdown PC";
pub const MAIN_MENU: &str = "🏠 Menu";
pub const BACK: &str = "⬅️ Back";

pub const CONFIRM_YES: &str = "✅ Yes";
pub const CONFIRM_NO: &str = "❌ No";

pub fn main_keyboard() -> Keyboard {
    Keyboard::from_rows(&[&[STATUS, DISK_TEMP], &[PC, UPDATE_SITE], &[LOGS]])
}

pub fn pc_keyboard() -> Keyboard {
    Keyboard::from_rows(&[&[WAKE_PC, SHUTDOWN_PC], &[BACK]])
}

pub fn confirm_keyboard() -> Keyboard {
    Keyboard::from_rows(&[&[CONFIRM_YES, CONFIRM_NO]])
}
