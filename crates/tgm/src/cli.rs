//! Command-line arguments (clap derive).

use clap::{Args, Parser, Subcommand};

/// Manage the Telegram groups of your user account.
#[derive(Parser, Debug)]
#[command(name = "tgm")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in with your phone number (code + optional 2FA password)
    Login,

    /// Run the HTTP API
    Serve(ServeArgs),

    /// List, leave and export groups
    #[command(subcommand)]
    Groups(GroupsCommand),

    /// Work with every dialog, not only groups
    #[command(subcommand)]
    Chats(ChatsCommand),

    /// Forward messages with "Forwarded from" attribution
    Forward(ForwardArgs),

    /// Copy messages as new ones, without attribution
    Copy(CopyArgs),

    /// Download media sorted into per-type folders
    #[command(subcommand)]
    Media(MediaCommand),

    /// Interactive menu
    Menu,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind (defaults to API_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (defaults to API_PORT)
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Subcommand, Debug)]
pub enum GroupsCommand {
    /// List your groups and save them to groups_list.json
    List,

    /// Leave one group
    Leave {
        /// Group ID
        #[arg(allow_negative_numbers = true)]
        id: i64,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Leave several groups
    LeaveMany {
        /// Group IDs
        #[arg(required = true, num_args = 1.., allow_negative_numbers = true)]
        ids: Vec<i64>,

        /// Ask before each group instead of once for the batch
        #[arg(long)]
        confirm_each: bool,
    },

    /// Export metadata, messages, media and participants of a group
    Export(ExportArgs),
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Group ID
    #[arg(allow_negative_numbers = true)]
    pub id: i64,

    /// Skip media downloads
    #[arg(long)]
    pub no_media: bool,

    /// Do not write messages.json
    #[arg(long)]
    pub no_messages: bool,

    /// Export at most this many recent messages
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum ChatsCommand {
    /// Save every dialog to chat_list.json
    Export,
}

#[derive(Args, Debug)]
pub struct ForwardArgs {
    /// Source chat ID
    #[arg(allow_negative_numbers = true)]
    pub source: i64,

    /// Destination chat ID
    #[arg(allow_negative_numbers = true)]
    pub destination: i64,

    /// Forward exactly these message IDs
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub ids: Vec<i32>,

    /// How many recent messages to forward
    #[arg(long)]
    pub limit: Option<usize>,

    /// Only forward messages containing this text (case-insensitive)
    #[arg(long)]
    pub filter: Option<String>,
}

#[derive(Args, Debug)]
pub struct CopyArgs {
    /// Source chat ID
    #[arg(allow_negative_numbers = true)]
    pub source: i64,

    /// Destination chat ID
    #[arg(allow_negative_numbers = true)]
    pub destination: i64,

    /// How many recent messages to copy
    #[arg(long)]
    pub limit: Option<usize>,

    /// Send captions only, without media
    #[arg(long)]
    pub no_media: bool,
}

#[derive(Subcommand, Debug)]
pub enum MediaCommand {
    /// Download the media of one or more chats
    Download(MediaArgs),
}

#[derive(Args, Debug)]
pub struct MediaArgs {
    /// Chat IDs
    #[arg(required = true, num_args = 1.., allow_negative_numbers = true)]
    pub ids: Vec<i64>,

    /// Recent messages scanned per chat (defaults to DEFAULT_LIMIT_PER_CHAT)
    #[arg(long)]
    pub limit: Option<usize>,
}
