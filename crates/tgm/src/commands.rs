use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use tgm_api::AppState;
use tgm_core::{
    config::Config,
    domain::{ChatId, MessageId},
    export::ExportOptions,
    groups::LeaveOutcome,
    ports::{Authenticator, TelegramClient},
    storage::ExportStore,
    throttle::{RateLimiter, ThrottledClient},
    transfer::{CopyRequest, ForwardRequest},
    GroupManager,
};
use tgm_mtproto::MtprotoSession;

use crate::{
    cli::{
        ChatsCommand, Command, CopyArgs, ExportArgs, ForwardArgs, GroupsCommand, MediaArgs,
        MediaCommand, ServeArgs,
    },
    menu,
    output::{self, IndicatifProgress, TerminalConfirmer},
};

/// Connected session plus the manager built over it.
pub struct App {
    pub cfg: Config,
    pub session: Arc<MtprotoSession>,
    pub manager: Arc<GroupManager>,
}

impl App {
    pub async fn connect(cfg: Config) -> anyhow::Result<Self> {
        let session = Arc::new(MtprotoSession::connect(&cfg.telegram).await?);
        let limiter = Arc::new(RateLimiter::new(cfg.rate_limit));
        let client: Arc<dyn TelegramClient> =
            Arc::new(ThrottledClient::new(session.clone(), limiter));
        let manager = Arc::new(GroupManager::new(
            client,
            ExportStore::new(&cfg.exports_dir),
            cfg.manager_options(),
        ));
        Ok(Self {
            cfg,
            session,
            manager,
        })
    }

    async fn require_login(&self) -> anyhow::Result<()> {
        if !self.session.is_authorized().await? {
            anyhow::bail!("not logged in; run `tgm login` first");
        }
        Ok(())
    }
}

pub async fn run(app: &App, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Login => output::interactive_login(app.session.as_ref()).await,
        Command::Serve(args) => serve(app, args).await,
        Command::Menu => {
            output::interactive_login(app.session.as_ref()).await?;
            menu::run(app).await
        }
        Command::Groups(cmd) => {
            app.require_login().await?;
            groups(app, cmd).await
        }
        Command::Chats(ChatsCommand::Export) => {
            app.require_login().await?;
            let chats = app.manager.export_chat_list().await?;
            println!(
                "Exported {} chats to {}",
                chats.len(),
                app.manager.store().chat_list_path().display()
            );
            Ok(())
        }
        Command::Forward(args) => {
            app.require_login().await?;
            forward(app, args).await
        }
        Command::Copy(args) => {
            app.require_login().await?;
            copy(app, args).await
        }
        Command::Media(MediaCommand::Download(args)) => {
            app.require_login().await?;
            download_media(app, args).await
        }
    }
}

async fn groups(app: &App, cmd: GroupsCommand) -> anyhow::Result<()> {
    match cmd {
        GroupsCommand::List => {
            let listing = app.manager.list_groups().await?;
            output::print_groups(&listing.groups, &listing.summary);
        }
        GroupsCommand::Leave { id, yes } => {
            let outcome = app
                .manager
                .leave_group(ChatId(id), !yes, &TerminalConfirmer)
                .await?;
            match outcome {
                LeaveOutcome::Left { title } => println!("Left '{title}'"),
                LeaveOutcome::Cancelled => println!("Cancelled"),
            }
        }
        GroupsCommand::LeaveMany { ids, confirm_each } => {
            let ids: Vec<ChatId> = ids.into_iter().map(ChatId).collect();
            let summary = app
                .manager
                .leave_multiple(&ids, confirm_each, &TerminalConfirmer)
                .await?;
            output::print_leave_summary(&summary);
        }
        GroupsCommand::Export(args) => export(app, args).await?,
    }
    Ok(())
}

async fn export(app: &App, args: ExportArgs) -> anyhow::Result<()> {
    let opts = ExportOptions {
        group_id: ChatId(args.id),
        include_media: !args.no_media,
        include_messages: !args.no_messages,
        limit: args.limit,
    };
    let stats = app
        .manager
        .export_group_content(opts, &IndicatifProgress::default())
        .await?;
    output::print_export_stats(&stats);
    Ok(())
}

async fn forward(app: &App, args: ForwardArgs) -> anyhow::Result<()> {
    let n = app
        .manager
        .forward_conversation(ForwardRequest {
            message_ids: Some(args.ids.into_iter().map(MessageId).collect()),
            limit: args.limit,
            filter_text: args.filter,
            ..ForwardRequest::new(ChatId(args.source), ChatId(args.destination))
        })
        .await?;
    println!("Forwarded {n} messages");
    Ok(())
}

async fn copy(app: &App, args: CopyArgs) -> anyhow::Result<()> {
    let n = app
        .manager
        .copy_conversation(CopyRequest {
            source: ChatId(args.source),
            destination: ChatId(args.destination),
            limit: args.limit,
            copy_media: !args.no_media,
        })
        .await?;
    println!("Copied {n} messages");
    Ok(())
}

async fn download_media(app: &App, args: MediaArgs) -> anyhow::Result<()> {
    let ids: Vec<ChatId> = args.ids.into_iter().map(ChatId).collect();
    let summary = app
        .manager
        .download_media(&ids, args.limit, &IndicatifProgress::default())
        .await?;
    println!("{}", output::media_report(&summary));
    Ok(())
}

async fn serve(app: &App, args: ServeArgs) -> anyhow::Result<()> {
    let host = args.host.unwrap_or_else(|| app.cfg.api_host.clone());
    let port = args.port.unwrap_or(app.cfg.api_port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Ctrl-C received, shutting down");
                on_signal.cancel();
            }
            Err(e) => tracing::warn!("Cannot listen for Ctrl-C: {e}"),
        }
    });

    let state = AppState {
        manager: app.manager.clone(),
        auth: app.session.clone(),
    };
    tgm_api::serve(addr, state, shutdown).await?;
    Ok(())
}
