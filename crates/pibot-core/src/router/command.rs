use crate::menu;

/// Everything the owner can ask for, parsed from a slash command or an exact
/// button label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Status,
    DiskTemp,
    UpdateSite,
    CommitForce(String),
    PcMenu,
    Wake,
    ShutdownPc,
    Shell(String),
    Logs,
    ClearLogs,
    Download(String),
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(command) = Self::from_label(text) {
            return Some(command);
        }
        let rest = text.strip_prefix('/')?;
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        // Group chats address commands as /cmd@botname.
        let name = head.split('@').next().unwrap_or(head);
        let command = match name {
            "start" | "menu" => Self::Start,
            "help" => Self::Help,
            "status" => Self::Status,
            "disk_temp" => Self::DiskTemp,
            "update_site" => Self::UpdateSite,
            "commit_force" => Self::CommitForce(args.to_string()),
            "pc" => Self::PcMenu,
            "wake" => Self::Wake,
            "shutdown_pc" => Self::ShutdownPc,
            "sh" => Self::Shell(args.to_string()),
            "logs" => Self::Logs,
            "clear_logs" => Self::ClearLogs,
            "download" => Self::Download(args.to_string()),
            _ => return None,
        };
        Some(command)
    }

    fn from_label(text: &str) -> Option<Self> {
        let command = match text {
            menu::MAIN_MENU | menu::BACK => Self::Start,
            menu::STATUS => Self::Status,
            menu::DISK_TEMP => Self::DiskTemp,
            menu::UPDATE_SITE => Self::UpdateSite,
            menu::PC => Self::PcMenu,
            menu::WAKE_PC => Self::Wake,
            menu::SHUTDOWN_PC => Self::ShutdownPc,
            menu::LOGS => Self::Logs,
            _ => return None,
        };
        Some(command)
    }

    /// Stable name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Status => "status",
            Self::DiskTemp => "disk_temp",
            Self::UpdateSite => "update_site",
            Self::CommitForce(_) => "commit_force",
            Self::PcMenu => "pc",
            Self::Wake => "wake",
            Self::ShutdownPc => "shutdown_pc",
            Self::Shell(_) => "sh",
            Self::Logs => "logs",
            Self::ClearLogs => "clear_logs",
            Self::Download(_) => "download",
        }
    }
}
