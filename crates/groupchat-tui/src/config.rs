use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use groupchat_core::session::ADMIN_SESSION_TOKEN;

#[derive(Debug, Parser)]
#[command(name = "groupchat", about = "Terminal client for project group chats")]
pub struct ChatConfig {
    /// Backend URL
    #[arg(long, env = "GROUPCHAT_SERVER_URL", default_value = "http://localhost:8000")]
    pub server_url: String,

    /// Bearer token from the identity provider
    #[arg(long, env = "GROUPCHAT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Sign in as the local administrator
    #[arg(long, conflicts_with = "token")]
    pub admin: bool,

    /// Group to open; defaults to the user's own group
    #[arg(long, env = "GROUPCHAT_GROUP")]
    pub group: Option<String>,

    /// Refresh interval in seconds
    #[arg(long, env = "GROUPCHAT_POLL_INTERVAL", default_value = "3")]
    pub poll_interval: u64,

    /// Per-request timeout in seconds
    #[arg(long, env = "GROUPCHAT_TIMEOUT", default_value = "10")]
    pub timeout: u64,

    /// Where downloaded attachments are saved
    #[arg(long, env = "GROUPCHAT_DOWNLOAD_DIR")]
    pub download_dir: Option<PathBuf>,

    /// Write logs here (the terminal is in raw mode, so logs are dropped otherwise)
    #[arg(long, env = "GROUPCHAT_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl ChatConfig {
    /// Token to sign in with, or `None` if neither `--token` nor `--admin` was given.
    pub fn bearer_token(&self) -> Option<&str> {
        if self.admin {
            Some(ADMIN_SESSION_TOKEN)
        } else {
            self.token.as_deref().filter(|t| !t.is_empty())
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
