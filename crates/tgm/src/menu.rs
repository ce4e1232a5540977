//! Interactive menu (dialoguer).

use dialoguer::Select;

use tgm_core::{
    domain::{ChatId, GroupRecord},
    export::ExportOptions,
    groups::LeaveOutcome,
    selection::parse_selection,
    transfer::{CopyRequest, ForwardRequest},
};

use crate::{
    commands::App,
    output::{self, ask_line, ask_yes_no, prompt, IndicatifProgress, TerminalConfirmer},
};

const ITEMS: [&str; 8] = [
    "List my groups",
    "Leave a group",
    "Leave several groups",
    "Export a group's full content",
    "Download media of groups",
    "Forward messages between chats",
    "Copy messages between chats",
    "Quit",
];

pub async fn run(app: &App) -> anyhow::Result<()> {
    let mut groups: Vec<GroupRecord> = Vec::new();
    loop {
        let choice = prompt(|| {
            Select::new()
                .with_prompt("Main menu")
                .items(&ITEMS)
                .default(0)
                .interact()
        })
        .await?;

        let res = match choice {
            0 => list(app, &mut groups).await,
            1 => leave_one(app, &mut groups).await,
            2 => leave_many(app, &mut groups).await,
            3 => export(app, &mut groups).await,
            4 => download_media(app, &mut groups).await,
            5 => forward(app).await,
            6 => copy(app).await,
            _ => break,
        };
        if let Err(e) = res {
            tracing::error!("Menu action failed: {e:#}");
            println!("Error: {e:#}");
        }
    }
    println!("Bye!");
    Ok(())
}

async fn list(app: &App, groups: &mut Vec<GroupRecord>) -> anyhow::Result<()> {
    let listing = app.manager.list_groups().await?;
    output::print_groups(&listing.groups, &listing.summary);
    *groups = listing.groups;
    Ok(())
}

/// The cached group list, fetched first when empty.
async fn known_groups<'a>(
    app: &App,
    groups: &'a mut Vec<GroupRecord>,
) -> anyhow::Result<&'a [GroupRecord]> {
    if groups.is_empty() {
        println!("Listing groups first...");
        list(app, groups).await?;
    }
    Ok(groups.as_slice())
}

/// The user typed `c` or nothing.
fn cancelled(input: &str) -> bool {
    input.is_empty() || input.eq_ignore_ascii_case("c")
}

async fn pick_one(app: &App, groups: &mut Vec<GroupRecord>, label: &str) -> anyhow::Result<Option<GroupRecord>> {
    let known = known_groups(app, groups).await?;
    if known.is_empty() {
        return Ok(None);
    }
    let input = ask_line(&format!("{label} (or 'c' to cancel)")).await?;
    if cancelled(&input) {
        return Ok(None);
    }
    let picked = parse_selection(&input, known.len())?;
    match picked.as_slice() {
        [n] => Ok(Some(known[n - 1].clone())),
        _ => anyhow::bail!("pick a single group"),
    }
}

async fn leave_one(app: &App, groups: &mut Vec<GroupRecord>) -> anyhow::Result<()> {
    let Some(group) = pick_one(app, groups, "Number of the group to leave").await? else {
        return Ok(());
    };
    let outcome = app
        .manager
        .leave_group(ChatId(group.id), true, &TerminalConfirmer)
        .await?;
    if let LeaveOutcome::Left { title } = outcome {
        println!("Left '{title}'");
        groups.retain(|g| g.id != group.id);
    } else {
        println!("Cancelled");
    }
    Ok(())
}

async fn leave_many(app: &App, groups: &mut Vec<GroupRecord>) -> anyhow::Result<()> {
    let known = known_groups(app, groups).await?;
    if known.is_empty() {
        return Ok(());
    }
    println!("Accepted formats: 1 | 1,3,5 | 1-5 | 1,3-5,8");
    let input = ask_line("Group numbers (or 'c' to cancel)").await?;
    if cancelled(&input) {
        return Ok(());
    }
    let picked: Vec<GroupRecord> = parse_selection(&input, known.len())?
        .into_iter()
        .map(|n| known[n - 1].clone())
        .collect();

    println!("Selected groups ({}):", picked.len());
    for g in &picked {
        println!("  - {}", g.title);
    }
    let ids: Vec<ChatId> = picked.iter().map(|g| ChatId(g.id)).collect();
    let summary = app
        .manager
        .leave_multiple(&ids, false, &TerminalConfirmer)
        .await?;
    output::print_leave_summary(&summary);
    if summary.successful > 0 {
        // The list is stale now.
        groups.clear();
    }
    Ok(())
}

async fn export(app: &App, groups: &mut Vec<GroupRecord>) -> anyhow::Result<()> {
    let Some(group) = pick_one(app, groups, "Number of the group to export").await? else {
        return Ok(());
    };
    let include_media = ask_yes_no("Include media?", true).await?;
    let include_messages = ask_yes_no("Include message texts?", true).await?;
    let limit = ask_line("Message limit (Enter for all)").await?;
    let limit = if limit.is_empty() {
        None
    } else {
        Some(limit.parse::<usize>()?)
    };

    let stats = app
        .manager
        .export_group_content(
            ExportOptions {
                group_id: ChatId(group.id),
                include_media,
                include_messages,
                limit,
            },
            &IndicatifProgress::default(),
        )
        .await?;
    output::print_export_stats(&stats);
    Ok(())
}

async fn download_media(app: &App, groups: &mut Vec<GroupRecord>) -> anyhow::Result<()> {
    let known = known_groups(app, groups).await?;
    if known.is_empty() {
        return Ok(());
    }
    let input = ask_line("Group numbers (or 'c' to cancel)").await?;
    if cancelled(&input) {
        return Ok(());
    }
    let ids: Vec<ChatId> = parse_selection(&input, known.len())?
        .into_iter()
        .map(|n| ChatId(known[n - 1].id))
        .collect();
    let limit = ask_limit("Messages to scan per group (Enter for default)").await?;
    let summary = app
        .manager
        .download_media(&ids, limit, &IndicatifProgress::default())
        .await?;
    println!("{}", output::media_report(&summary));
    Ok(())
}

async fn chat_pair() -> anyhow::Result<(ChatId, ChatId)> {
    let source = ask_line("Source chat ID").await?.parse::<i64>()?;
    let destination = ask_line("Destination chat ID").await?.parse::<i64>()?;
    Ok((ChatId(source), ChatId(destination)))
}

async fn ask_limit(label: &str) -> anyhow::Result<Option<usize>> {
    let raw = ask_line(label).await?;
    Ok(if raw.is_empty() { None } else { Some(raw.parse()?) })
}

async fn forward(app: &App) -> anyhow::Result<()> {
    let (source, destination) = chat_pair().await?;
    let limit = ask_limit("How many messages to forward? (default 100)").await?;
    let filter = ask_line("Filter by text (Enter for none)").await?;
    let n = app
        .manager
        .forward_conversation(ForwardRequest {
            limit,
            filter_text: Some(filter).filter(|f| !f.is_empty()),
            ..ForwardRequest::new(source, destination)
        })
        .await?;
    println!("Forwarded {n} messages");
    Ok(())
}

async fn copy(app: &App) -> anyhow::Result<()> {
    let (source, destination) = chat_pair().await?;
    let limit = ask_limit("How many messages to copy? (default 100)").await?;
    let copy_media = ask_yes_no("Copy media too?", true).await?;
    let n = app
        .manager
        .copy_conversation(CopyRequest {
            source,
            destination,
            limit,
            copy_media,
        })
        .await?;
    println!("Copied {n} messages");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_inputs() {
        assert!(cancelled(""));
        assert!(cancelled("c"));
        assert!(cancelled("C"));
        assert!(!cancelled("1"));
    }
}
