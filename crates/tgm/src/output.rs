//! Terminal output: group table, progress bars (indicatif) and prompts
//! (dialoguer).

use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use dialoguer::{Confirm, Input, Password};
use indicatif::{ProgressBar, ProgressStyle};

use tgm_core::{
    domain::{GroupRecord, LoginState},
    export::ExportStats,
    groups::{GroupsSummary, LeaveSummary},
    media::MediaDownloadSummary,
    ports::{Authenticator, Confirmer, Progress, ProgressSink},
};

const TITLE_WIDTH: usize = 40;

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

pub fn groups_table(groups: &[GroupRecord]) -> String {
    let rule = "=".repeat(84);
    let mut out = format!(
        "{rule}\n{:<4} {:<40} {:<16} {:<10} {:<12}\n{rule}\n",
        "#", "Title", "ID", "Members", "Type"
    );
    for (i, g) in groups.iter().enumerate() {
        let mut kind = g.kind.as_str().to_string();
        if g.is_forum {
            kind.push_str(" (forum)");
        }
        out.push_str(&format!(
            "{:<4} {:<40} {:<16} {:<10} {:<12}\n",
            i + 1,
            truncate(&g.title, TITLE_WIDTH),
            g.id,
            g.participants_count,
            kind
        ));
    }
    out.push_str(&rule);
    out
}

pub fn print_groups(groups: &[GroupRecord], summary: &GroupsSummary) {
    if groups.is_empty() {
        println!("No groups found");
        return;
    }
    println!("{}", groups_table(groups));
    println!(
        "{} groups: {} supergroups, {} groups, {} forums; creator of {}, admin of {}",
        summary.total,
        summary.supergroups,
        summary.groups,
        summary.forums,
        summary.creator,
        summary.admin
    );
}

pub fn print_leave_summary(summary: &LeaveSummary) {
    if summary.cancelled {
        println!("Cancelled");
    } else {
        println!("Left {} groups, {} failed", summary.successful, summary.failed);
    }
}

pub fn print_export_stats(stats: &ExportStats) {
    println!("Exported '{}'", stats.group_name);
    println!("  messages: {}", stats.messages_exported);
    println!("  media:    {}", stats.media_downloaded);
    println!("  saved to: {}", stats.export_directory);
}

pub fn media_report(summary: &MediaDownloadSummary) -> String {
    let mut out = String::new();
    for chat in &summary.chats {
        out.push_str(&format!(
            "'{}': {} files from {} messages ({} failed, {} skipped)\n  saved to: {}\n",
            chat.chat_name,
            chat.downloaded,
            chat.messages_processed,
            chat.failed,
            chat.skipped,
            chat.directory
        ));
        for (topic, n) in &chat.topics {
            out.push_str(&format!("    topic '{topic}': {n} files\n"));
        }
    }
    out.push_str(&format!(
        "{} chats downloaded, {} failed",
        summary.success, summary.failed
    ));
    out
}

/// Progress bar for long exports.
#[derive(Default)]
pub struct IndicatifProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressSink for IndicatifProgress {
    fn update(&self, progress: Progress) {
        let mut bar = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        match progress {
            Progress::Started { label, total } => {
                let pb = match total {
                    Some(total) => ProgressBar::new(total),
                    None => ProgressBar::new_spinner(),
                };
                if let Ok(style) =
                    ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({elapsed})")
                {
                    pb.set_style(style.progress_chars("=> "));
                }
                pb.set_message(label);
                *bar = Some(pb);
            }
            Progress::Advanced { done } => {
                if let Some(pb) = bar.as_ref() {
                    pb.set_position(done);
                }
            }
            Progress::Finished => {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
            }
        }
    }
}

/// Blocking dialoguer prompt run off the async runtime.
pub async fn prompt<T, F>(f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> dialoguer::Result<T> + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f)
        .await
        .context("prompt task failed")??)
}

/// Asks on the terminal; any prompt error counts as "no".
pub struct TerminalConfirmer;

#[async_trait]
impl Confirmer for TerminalConfirmer {
    async fn confirm(&self, prompt_text: &str) -> bool {
        let text = prompt_text.to_string();
        prompt(move || Confirm::new().with_prompt(text).default(false).interact())
            .await
            .unwrap_or(false)
    }
}

pub async fn ask_line(label: &str) -> anyhow::Result<String> {
    let label = label.to_string();
    prompt(move || {
        Input::<String>::new()
            .with_prompt(label)
            .allow_empty(true)
            .interact_text()
    })
    .await
    .map(|s| s.trim().to_string())
}

pub async fn ask_yes_no(label: &str, default: bool) -> anyhow::Result<bool> {
    let label = label.to_string();
    prompt(move || Confirm::new().with_prompt(label).default(default).interact()).await
}

/// Drive the phone-code login on the terminal until the session is
/// authorized.
pub async fn interactive_login(auth: &dyn Authenticator) -> anyhow::Result<()> {
    if auth.is_authorized().await? {
        println!("Already logged in");
        return Ok(());
    }

    let phone = ask_line("Phone number (international format)").await?;
    let mut state = auth.start_login(&phone).await?;
    loop {
        state = match state {
            LoginState::Authorized => break,
            LoginState::CodeSent => {
                let code = ask_line("Login code").await?;
                match auth.complete_login(Some(&code), None).await {
                    Ok(next) => next,
                    Err(e) => {
                        println!("{e}");
                        LoginState::CodeSent
                    }
                }
            }
            LoginState::PasswordRequired => {
                let password = prompt(|| Password::new().with_prompt("2FA password").interact()).await?;
                auth.complete_login(None, Some(&password)).await?
            }
            LoginState::NotStarted => anyhow::bail!("login was not started"),
        };
    }
    println!("Logged in");
    Ok(())
}
