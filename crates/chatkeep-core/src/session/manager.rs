//! Session struct: the active conversation and its binding to storage.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::config::{CredentialStore, Credentials, Settings};
use crate::context::{ConversationLog, ConversationStore, ConversationSummary};
use crate::error::ChatError;
use crate::llm::{CompletionRequest, LlmClient, Message, OpenAIClient, RetryPolicy, RetryingInvoker};

use super::events::{SessionEvent, SessionState};
use super::title::{sanitize_title, TitleSynthesizer};

/// The single active conversation.
///
/// Owns the in-memory log and the title it is bound to, if any. Every turn
/// is persisted before [`send_user_message`](Self::send_user_message)
/// returns, so there is no separate close or flush step.
pub struct Session {
    log: ConversationLog,
    bound_title: Option<String>,
    store: ConversationStore,
    invoker: RetryingInvoker,
    titles: TitleSynthesizer,
    credentials: Credentials,
    credential_store: Option<CredentialStore>,
    model: String,
    system_prompt: String,
    events: Option<UnboundedSender<SessionEvent>>,
}

impl Session {
    /// Assemble a session around an existing client and store.
    ///
    /// `credentials` must be the handle `client` reads its key from, so that
    /// [`update_credentials`](Self::update_credentials) reaches later calls.
    pub fn new(
        client: Arc<dyn LlmClient>,
        credentials: Credentials,
        store: ConversationStore,
        settings: &Settings,
    ) -> Self {
        let invoker = RetryingInvoker::new(
            Arc::clone(&client),
            RetryPolicy::from_settings(&settings.retry),
        )
        .with_failure_message(settings.retry.failure_message.clone());

        Self {
            log: ConversationLog::new(),
            bound_title: None,
            store,
            invoker,
            titles: TitleSynthesizer::from_settings(client, settings),
            credentials,
            credential_store: None,
            model: settings.llm.model.clone(),
            system_prompt: settings.conversation.system_prompt.clone(),
            events: None,
        }
    }

    /// Wire up the OpenAI client, the on-disk store and stored credentials
    /// from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, ChatError> {
        let credential_store = CredentialStore::new();
        let credentials = credential_store.resolve(settings)?;
        let client = OpenAIClient::from_settings(settings, credentials.clone())?;
        let store = ConversationStore::with_dir(settings.conversations_dir())?
            .with_rename_policy(settings.conversation.rename_policy);

        Ok(Self::new(Arc::new(client), credentials, store, settings)
            .with_credential_store(credential_store))
    }

    /// Persist key updates through `store`.
    pub fn with_credential_store(mut self, store: CredentialStore) -> Self {
        self.credential_store = Some(store);
        self
    }

    pub fn with_events(mut self, events: UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn bound_title(&self) -> Option<&str> {
        self.bound_title.as_deref()
    }

    pub fn state(&self) -> SessionState {
        match self.bound_title {
            Some(ref title) => SessionState::Bound(title.clone()),
            None if self.log.has_user_turn() => SessionState::Unbound,
            None => SessionState::Empty,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Titles for the navigation list.
    pub fn conversations(&self) -> Result<BTreeSet<String>, ChatError> {
        self.report(self.store.list())
    }

    pub fn conversation_summaries(&self) -> Result<Vec<ConversationSummary>, ChatError> {
        self.report(self.store.list_summaries())
    }

    /// Begin an unsaved conversation holding only the system message.
    pub fn start_new(&mut self) {
        self.log = ConversationLog::with_system_prompt(self.system_prompt.clone());
        self.bound_title = None;
    }

    /// Replace the session with a stored conversation and bind to it. On
    /// failure the current session is left as it was.
    pub fn load_existing(&mut self, title: &str) -> Result<(), ChatError> {
        let log = self.report(self.store.load(title))?;
        self.log = log;
        self.bound_title = Some(title.to_string());
        info!(title, messages = self.log.len(), "Loaded conversation");
        Ok(())
    }

    /// Run one user turn: append, ask the model, append the reply, persist.
    ///
    /// Returns `Ok(None)` without touching anything when `text` is empty or
    /// whitespace only.
    /// When every attempt fails the failure sentinel becomes the reply.
    pub async fn send_user_message(&mut self, text: &str) -> Result<Option<String>, ChatError> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        if self.log.is_empty() {
            self.log = ConversationLog::with_system_prompt(self.system_prompt.clone());
        }
        self.append(Message::user(text));

        let request = CompletionRequest::new(self.model.clone(), self.log.messages().to_vec());
        let reply = match self.invoker.invoke(&request).await {
            Ok(completion) => completion.content,
            Err(e) => {
                warn!(error = %e, "Giving up on completion");
                self.emit(SessionEvent::OperationFailed(e.to_string()));
                self.invoker.failure_message().to_string()
            }
        };
        self.append(Message::assistant(reply.clone()));

        let persisted = self.persist_log().await;
        self.report(persisted)?;
        Ok(Some(reply))
    }

    /// Write the log to storage, minting a title first if the session is
    /// not bound yet. Does nothing before the first user turn.
    pub async fn persist(&mut self) -> Result<(), ChatError> {
        let persisted = self.persist_log().await;
        self.report(persisted)
    }

    async fn persist_log(&mut self) -> Result<(), ChatError> {
        if let Some(ref title) = self.bound_title {
            return self.store.save(title, &self.log);
        }

        let Some(first) = self.log.first_user_message() else {
            return Ok(());
        };
        let first = first.content.clone();

        let raw = self.titles.synthesize(&first).await?;
        let title = self.unique_title(&sanitize_title(&raw, &first, self.titles.max_length()));

        self.store.save(&title, &self.log)?;
        info!(title = %title, "Assigned conversation title");
        self.bound_title = Some(title.clone());
        self.emit(SessionEvent::TitleAssigned(title));
        self.emit_list_changed();
        Ok(())
    }

    /// Rename the bound conversation and stay bound to it.
    pub fn rename(&mut self, new_title: &str) -> Result<(), ChatError> {
        let old_title = self.report(self.bound_title.clone().ok_or(ChatError::NoActiveConversation))?;
        self.rename_conversation(&old_title, new_title)
    }

    /// Delete the bound conversation and reset to a blank session.
    pub fn delete(&mut self) -> Result<(), ChatError> {
        let title = self.report(self.bound_title.clone().ok_or(ChatError::NoActiveConversation))?;
        self.delete_conversation(&title)
    }

    /// Rename any stored conversation. The session follows when it is bound
    /// to `old_title`.
    pub fn rename_conversation(&mut self, old_title: &str, new_title: &str) -> Result<(), ChatError> {
        self.report(self.store.rename(old_title, new_title))?;
        if self.bound_title.as_deref() == Some(old_title) {
            self.bound_title = Some(new_title.to_string());
        } else if self.bound_title.as_deref() == Some(new_title) {
            // The bound record was overwritten by another conversation.
            self.reset();
        }
        self.emit_list_changed();
        Ok(())
    }

    /// Delete any stored conversation. The session is reset when it is
    /// bound to `title`.
    pub fn delete_conversation(&mut self, title: &str) -> Result<(), ChatError> {
        self.report(self.store.delete(title))?;
        if self.bound_title.as_deref() == Some(title) {
            self.reset();
        }
        self.emit_list_changed();
        Ok(())
    }

    /// Store a new API key and use it for every later request.
    pub fn update_credentials(&mut self, api_key: &str) -> Result<(), ChatError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return self.report(Err(ChatError::Config("API key is empty".into())));
        }
        if let Some(ref store) = self.credential_store {
            self.report(store.save(api_key))?;
        }
        self.credentials.set(api_key);
        info!("API key updated");
        Ok(())
    }

    fn reset(&mut self) {
        self.bound_title = None;
        self.log.clear();
    }

    fn unique_title(&self, base: &str) -> String {
        if !self.store.exists(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{} ({})", base, n))
            .find(|candidate| !self.store.exists(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    fn append(&mut self, message: Message) {
        self.emit(SessionEvent::MessageAppended {
            role: message.role,
            content: message.content.clone(),
        });
        self.log.push(message);
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event);
        }
    }

    fn emit_list_changed(&self) {
        match self.store.list() {
            Ok(titles) => self.emit(SessionEvent::ConversationListChanged(
                titles.into_iter().collect(),
            )),
            Err(e) => self.emit(SessionEvent::OperationFailed(e.to_string())),
        }
    }

    /// Forward failures to subscribers before handing them to the caller.
    fn report<T>(&self, result: Result<T, ChatError>) -> Result<T, ChatError> {
        if let Err(ref e) = result {
            self.emit(SessionEvent::OperationFailed(e.to_string()));
        }
        result
    }
}
