//! Telegram user-account adapter (grammers / MTProto).
//!
//! Implements the `tgm-core` [`TelegramClient`] and [`Authenticator`] ports.
//! The Bot API cannot list dialogs, read history or leave groups on behalf of
//! a user, so this adapter speaks MTProto directly.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::Context;
use async_trait::async_trait;
use grammers_client::{
    types::{Chat, Downloadable, LoginToken, Media, Message, PackedChat, PasswordToken},
    Client, Config, InitParams, InputMessage, SignInError,
};
use grammers_session::Session;
use grammers_tl_types as tl;
use tokio::sync::Mutex;

use tgm_core::{
    config::TelegramCredentials,
    domain::{ChatId, ChatInfo, ForumTopic, HistoryMessage, LoginState, MessageId, Participant},
    errors::Error,
    ports::{Authenticator, TelegramClient},
    Result,
};

mod convert;

use convert::{
    chat_info, forum_topics, history_message, lookup_keys, map_invocation, media_info, peer_key,
    PeerKey,
};

/// Where a phone-code login currently stands.
enum LoginFlow {
    Idle,
    AwaitingCode(LoginToken),
    AwaitingPassword(PasswordToken),
}

pub struct MtprotoSession {
    client: Client,
    session_file: PathBuf,
    /// Dialogs seen so far, by peer namespace and bare id. Access hashes come
    /// from here.
    chats: Mutex<HashMap<PeerKey, Chat>>,
    login: Mutex<LoginFlow>,
}

impl MtprotoSession {
    /// Connect with the session stored at `creds.session_file` (created when
    /// missing).
    pub async fn connect(creds: &TelegramCredentials) -> anyhow::Result<Self> {
        let session = Session::load_file_or_create(&creds.session_file).with_context(|| {
            format!(
                "failed to open session file {}",
                creds.session_file.display()
            )
        })?;
        let client = Client::connect(Config {
            session,
            api_id: creds.api_id,
            api_hash: creds.api_hash.clone(),
            params: InitParams::default(),
        })
        .await
        .context("failed to connect to Telegram")?;
        tracing::info!("Connected to Telegram");

        Ok(Self {
            client,
            session_file: creds.session_file.clone(),
            chats: Mutex::new(HashMap::new()),
            login: Mutex::new(LoginFlow::Idle),
        })
    }

    fn save_session(&self) -> Result<()> {
        self.client.session().save_to_file(&self.session_file)?;
        tracing::debug!("Session saved to '{}'", self.session_file.display());
        Ok(())
    }

    async fn scan_dialogs(&self, limit: usize) -> Result<Vec<Chat>> {
        let mut dialogs = self.client.iter_dialogs();
        let mut out = Vec::new();
        while out.len() < limit {
            match dialogs.next().await.map_err(|e| map_invocation(e, None))? {
                Some(dialog) => out.push(dialog.chat().clone()),
                None => break,
            }
        }

        let mut cache = self.chats.lock().await;
        for chat in &out {
            cache.insert(peer_key(chat), chat.clone());
        }
        tracing::debug!("Scanned {} dialogs ({} cached)", out.len(), cache.len());
        Ok(out)
    }

    /// Look a chat up in the cache, rescanning the dialogs once on a miss.
    async fn chat(&self, id: ChatId) -> Result<Chat> {
        let keys = lookup_keys(id)?;
        if let Some(chat) = self.cached(&keys).await {
            return Ok(chat);
        }
        self.scan_dialogs(usize::MAX).await?;
        self.cached(&keys)
            .await
            .ok_or(Error::ChatNotFound(id.bare()?.0))
    }

    async fn cached(&self, keys: &[PeerKey]) -> Option<Chat> {
        let cache = self.chats.lock().await;
        keys.iter().find_map(|k| cache.get(k).cloned())
    }

    async fn packed(&self, id: ChatId) -> Result<PackedChat> {
        Ok(self.chat(id).await?.pack())
    }

    async fn message(&self, chat: ChatId, id: MessageId) -> Result<Option<Message>> {
        let packed = self.packed(chat).await?;
        let mut found = self
            .client
            .get_messages_by_id(packed, &[id.0])
            .await
            .map_err(|e| map_invocation(e, Some(chat)))?;
        Ok(found.pop().flatten())
    }

    async fn sign_in(&self, token: LoginToken, code: &str, password: Option<&str>) -> Result<LoginFlow> {
        match self.client.sign_in(&token, code).await {
            Ok(user) => {
                tracing::info!("Signed in as {}", user.first_name());
                Ok(LoginFlow::Idle)
            }
            Err(SignInError::PasswordRequired(pw_token)) => match password {
                Some(pw) => self.check_password(pw_token, pw).await,
                None => Ok(LoginFlow::AwaitingPassword(pw_token)),
            },
            Err(SignInError::InvalidCode) => {
                // The token stays valid; let the caller try another code.
                *self.login.lock().await = LoginFlow::AwaitingCode(token);
                Err(Error::InvalidInput("invalid login code".to_string()))
            }
            Err(e) => Err(Error::External(format!("sign in failed: {e}"))),
        }
    }

    async fn check_password(&self, token: PasswordToken, password: &str) -> Result<LoginFlow> {
        match self.client.check_password(token, password).await {
            Ok(user) => {
                tracing::info!("Signed in as {} (2FA)", user.first_name());
                Ok(LoginFlow::Idle)
            }
            Err(SignInError::InvalidPassword) => Err(Error::InvalidInput(
                "invalid password; start the login again".to_string(),
            )),
            Err(e) => Err(Error::External(format!("password check failed: {e}"))),
        }
    }
}

#[async_trait]
impl TelegramClient for MtprotoSession {
    async fn list_dialogs(&self, limit: usize) -> Result<Vec<ChatInfo>> {
        let chats = self.scan_dialogs(limit).await?;
        Ok(chats.iter().map(chat_info).collect())
    }

    async fn resolve_chat(&self, chat: ChatId) -> Result<ChatInfo> {
        Ok(chat_info(&self.chat(chat).await?))
    }

    async fn leave_chat(&self, chat: &ChatInfo) -> Result<()> {
        let peer = self.chat(chat.id).await?;
        self.client
            .delete_dialog(peer.pack())
            .await
            .map_err(|e| map_invocation(e, Some(chat.id)))?;
        self.chats.lock().await.remove(&peer_key(&peer));
        Ok(())
    }

    async fn message_count(&self, chat: ChatId) -> Result<Option<u64>> {
        let packed = self.packed(chat).await?;
        let total = self
            .client
            .iter_messages(packed)
            .total()
            .await
            .map_err(|e| map_invocation(e, Some(chat)))?;
        Ok(Some(total as u64))
    }

    async fn fetch_history(
        &self,
        chat: ChatId,
        offset: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>> {
        let packed = self.packed(chat).await?;
        let mut iter = self.client.iter_messages(packed).limit(limit);
        if let Some(offset) = offset {
            iter = iter.offset_id(offset.0);
        }
        let mut out = Vec::with_capacity(limit.min(100));
        while let Some(m) = iter.next().await.map_err(|e| map_invocation(e, Some(chat)))? {
            out.push(history_message(&m));
        }
        Ok(out)
    }

    async fn download_media(
        &self,
        chat: ChatId,
        message: MessageId,
        dest_stem: &Path,
    ) -> Result<Option<PathBuf>> {
        let Some(media) = self.message(chat, message).await?.and_then(|m| m.media()) else {
            return Ok(None);
        };
        let Some(info) = media_info(&media) else {
            return Ok(None);
        };
        let path = PathBuf::from(format!(
            "{}{}",
            dest_stem.display(),
            info.extension.as_deref().unwrap_or("")
        ));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.client
            .download_media(&Downloadable::Media(media), &path)
            .await?;
        Ok(Some(path))
    }

    async fn participants(&self, chat: ChatId) -> Result<Vec<Participant>> {
        let packed = self.packed(chat).await?;
        let mut iter = self.client.iter_participants(packed);
        let mut out = Vec::new();
        while let Some(p) = iter.next().await.map_err(|e| map_invocation(e, Some(chat)))? {
            let user = &p.user;
            out.push(Participant {
                id: user.id(),
                username: user.username().map(str::to_string),
                first_name: Some(user.first_name().to_string()).filter(|s| !s.is_empty()),
                last_name: user.last_name().map(str::to_string),
                is_bot: user.is_bot(),
            });
        }
        Ok(out)
    }

    async fn forum_topics(&self, chat: ChatId) -> Result<Vec<ForumTopic>> {
        let peer = self.chat(chat).await?;
        if !chat_info(&peer).is_forum {
            return Ok(Vec::new());
        }
        let Some(channel) = peer.pack().try_to_input_channel() else {
            return Ok(Vec::new());
        };
        let topics = self
            .client
            .invoke(&tl::functions::channels::GetForumTopics {
                channel,
                q: None,
                offset_date: 0,
                offset_id: 0,
                offset_topic: 0,
                limit: 100,
            })
            .await
            .map_err(|e| map_invocation(e, Some(chat)))?;
        Ok(forum_topics(topics))
    }

    async fn forward_messages(
        &self,
        source: ChatId,
        destination: ChatId,
        ids: &[MessageId],
    ) -> Result<usize> {
        let src = self.packed(source).await?;
        let dst = self.packed(destination).await?;
        let raw: Vec<i32> = ids.iter().map(|m| m.0).collect();
        let sent = self
            .client
            .forward_messages(dst, &raw, src)
            .await
            .map_err(|e| map_invocation(e, Some(destination)))?;
        Ok(sent.iter().filter(|m| m.is_some()).count())
    }

    async fn send_text(&self, destination: ChatId, text: &str) -> Result<()> {
        let dst = self.packed(destination).await?;
        self.client
            .send_message(dst, InputMessage::text(text))
            .await
            .map_err(|e| map_invocation(e, Some(destination)))?;
        Ok(())
    }

    async fn send_media_copy(
        &self,
        source: ChatId,
        message: MessageId,
        destination: ChatId,
        caption: &str,
    ) -> Result<()> {
        let media: Option<Media> = self.message(source, message).await?.and_then(|m| m.media());
        let dst = self.packed(destination).await?;
        let input = match &media {
            Some(media) => InputMessage::text(caption).copy_media(media),
            None if !caption.trim().is_empty() => InputMessage::text(caption),
            None => return Ok(()),
        };
        self.client
            .send_message(dst, input)
            .await
            .map_err(|e| map_invocation(e, Some(destination)))?;
        Ok(())
    }
}

#[async_trait]
impl Authenticator for MtprotoSession {
    async fn is_authorized(&self) -> Result<bool> {
        self.client
            .is_authorized()
            .await
            .map_err(|e| map_invocation(e, None))
    }

    async fn start_login(&self, phone: &str) -> Result<LoginState> {
        if self.is_authorized().await? {
            return Ok(LoginState::Authorized);
        }
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(Error::InvalidInput("phone is required".to_string()));
        }
        let token = self
            .client
            .request_login_code(phone)
            .await
            .map_err(|e| Error::External(format!("could not request a login code: {e}")))?;
        *self.login.lock().await = LoginFlow::AwaitingCode(token);
        tracing::info!("Login code requested");
        Ok(LoginState::CodeSent)
    }

    async fn complete_login(
        &self,
        code: Option<&str>,
        password: Option<&str>,
    ) -> Result<LoginState> {
        let flow = std::mem::replace(&mut *self.login.lock().await, LoginFlow::Idle);
        let next = match flow {
            LoginFlow::Idle => {
                return Ok(if self.is_authorized().await? {
                    LoginState::Authorized
                } else {
                    LoginState::NotStarted
                });
            }
            LoginFlow::AwaitingCode(token) => match code.map(str::trim).filter(|c| !c.is_empty()) {
                Some(code) => self.sign_in(token, code, password).await?,
                None => LoginFlow::AwaitingCode(token),
            },
            LoginFlow::AwaitingPassword(token) => match password {
                Some(pw) => self.check_password(token, pw).await?,
                None => LoginFlow::AwaitingPassword(token),
            },
        };

        let state = match &next {
            LoginFlow::Idle => {
                self.save_session()?;
                LoginState::Authorized
            }
            LoginFlow::AwaitingCode(_) => LoginState::CodeSent,
            LoginFlow::AwaitingPassword(_) => LoginState::PasswordRequired,
        };
        *self.login.lock().await = next;
        Ok(state)
    }
}
