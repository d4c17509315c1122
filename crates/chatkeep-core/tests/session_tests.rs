use chatkeep_core::*;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

/// Mock LLM that answers from a queue and records every request it sees.
/// An `Err` entry simulates a failed remote call; an empty queue fails too.
struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    fn new(replies: Vec<Result<&str, &str>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(String::from).map_err(String::from))
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ChatError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(Completion::text(text)),
            Some(Err(e)) => Err(ChatError::Llm(e)),
            None => Err(ChatError::Llm("no scripted reply".into())),
        }
    }
}

struct Fixture {
    _dir: TempDir,
    llm: Arc<ScriptedLlm>,
    session: Session,
    events: UnboundedReceiver<SessionEvent>,
}

fn fixture_with(replies: Vec<Result<&str, &str>>, policy: RenamePolicy) -> Fixture {
    let dir = TempDir::new().unwrap();
    let settings = Settings::default();
    let store = ConversationStore::with_dir(dir.path().join("conversations"))
        .unwrap()
        .with_rename_policy(policy);
    let llm = ScriptedLlm::new(replies);
    let (tx, rx) = unbounded_channel();
    let session = Session::new(llm.clone(), Credentials::default(), store, &settings).with_events(tx);
    Fixture {
        _dir: dir,
        llm,
        session,
        events: rx,
    }
}

fn fixture(replies: Vec<Result<&str, &str>>) -> Fixture {
    fixture_with(replies, RenamePolicy::Overwrite)
}

fn drain(rx: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn bound_log(system: &str, user: &str, assistant: &str) -> ConversationLog {
    let mut log = ConversationLog::with_system_prompt(system);
    log.add_user_message(user);
    log.add_assistant_message(assistant);
    log
}

// ========================================================================
// Sending messages
// ========================================================================

#[tokio::test(start_paused = true)]
async fn test_first_exchange_binds_session_to_synthesized_title() {
    let mut f = fixture(vec![Ok("Hi there"), Ok("  \"Friendly Greeting\"  ")]);
    f.session.start_new();
    assert_eq!(f.session.state(), SessionState::Empty);

    let reply = f.session.send_user_message("Hello").await.unwrap();
    assert_eq!(reply.as_deref(), Some("Hi there"));

    let expected = bound_log("You are a helpful assistant.", "Hello", "Hi there");
    assert_eq!(f.session.log(), &expected);
    assert_eq!(f.session.bound_title(), Some("Friendly Greeting"));
    assert_eq!(
        f.session.state(),
        SessionState::Bound("Friendly Greeting".into())
    );
    assert_eq!(f.session.store().load("Friendly Greeting").unwrap(), expected);

    let requests = f.llm.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].messages, expected.messages()[..2].to_vec());
    assert_eq!(requests[0].model, "gpt-4o-mini");
    assert_eq!(requests[1].max_tokens, Some(10));
    assert!(requests[1].messages[1].content.ends_with("first query: Hello"));
}

#[tokio::test(start_paused = true)]
async fn test_events_follow_the_turn() {
    let mut f = fixture(vec![Ok("Hi there"), Ok("Greeting")]);
    f.session.start_new();
    f.session.send_user_message("Hello").await.unwrap();

    let events = drain(&mut f.events);
    assert_eq!(
        events,
        vec![
            SessionEvent::MessageAppended {
                role: Role::User,
                content: "Hello".into()
            },
            SessionEvent::MessageAppended {
                role: Role::Assistant,
                content: "Hi there".into()
            },
            SessionEvent::TitleAssigned("Greeting".into()),
            SessionEvent::ConversationListChanged(vec!["Greeting".into()]),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_bound_session_saves_without_new_title_request() {
    let mut f = fixture(vec![Ok("one"), Ok("Topic"), Ok("two")]);
    f.session.start_new();
    f.session.send_user_message("first").await.unwrap();
    f.session.send_user_message("second").await.unwrap();

    assert_eq!(f.llm.requests().len(), 3);
    assert_eq!(f.session.bound_title(), Some("Topic"));
    let stored = f.session.store().load("Topic").unwrap();
    assert_eq!(stored.len(), 5);
    assert_eq!(stored.last_message().unwrap().content, "two");
    assert_eq!(f.session.store().list().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_message_changes_nothing() {
    let mut f = fixture(vec![Ok("Hi"), Ok("Title")]);
    f.session.start_new();
    let before = f.session.log().clone();

    assert_eq!(f.session.send_user_message("").await.unwrap(), None);
    assert_eq!(f.session.send_user_message("   ").await.unwrap(), None);

    assert_eq!(f.session.log(), &before);
    assert!(f.llm.requests().is_empty());
    assert!(f.session.store().list().unwrap().is_empty());
    assert!(drain(&mut f.events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_send_on_blank_session_seeds_system_message() {
    let mut f = fixture(vec![Ok("Hi"), Ok("Title")]);
    assert!(f.session.log().is_empty());

    f.session.send_user_message("Hello").await.unwrap();

    assert_eq!(f.session.log().messages()[0], Message::system("You are a helpful assistant."));
    assert!(f.session.log().is_well_formed());
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_store_sentinel_reply() {
    let mut f = fixture(vec![
        Err("429"),
        Err("429"),
        Err("429"),
        Err("429"),
        Err("429"),
        Ok("Rate Limits"),
    ]);
    f.session.start_new();

    let start = tokio::time::Instant::now();
    let reply = f.session.send_user_message("Hello").await.unwrap();

    assert_eq!(start.elapsed(), Duration::from_secs(31));
    let sentinel = "Failed to get a response due to rate limit errors.";
    assert_eq!(reply.as_deref(), Some(sentinel));
    assert_eq!(f.session.log().last_message().unwrap(), &Message::assistant(sentinel));
    assert_eq!(f.llm.requests().len(), 6);
    assert_eq!(f.session.bound_title(), Some("Rate Limits"));

    let events = drain(&mut f.events);
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::OperationFailed(reason) if reason.contains("5 attempts"))));
}

#[tokio::test(start_paused = true)]
async fn test_title_failure_propagates_and_leaves_session_unbound() {
    let mut f = fixture(vec![Ok("Hi there"), Err("title service down"), Ok("Later Title")]);
    f.session.start_new();

    let err = f.session.send_user_message("Hello").await.unwrap_err();
    assert!(matches!(err, ChatError::Llm(ref m) if m.contains("title service down")));
    assert_eq!(f.session.state(), SessionState::Unbound);
    assert_eq!(f.session.log().len(), 3);
    assert!(f.session.store().list().unwrap().is_empty());

    // Title synthesis is not retried; the next persist tries again.
    assert_eq!(f.llm.requests().len(), 2);
    f.session.persist().await.unwrap();
    assert_eq!(f.session.bound_title(), Some("Later Title"));
}

#[tokio::test(start_paused = true)]
async fn test_synthesized_title_is_sanitized_and_deduplicated() {
    let mut f = fixture(vec![Ok("a"), Ok("Notes/Ideas"), Ok("b"), Ok("Notes/Ideas")]);
    f.session.start_new();
    f.session.send_user_message("one").await.unwrap();
    assert_eq!(f.session.bound_title(), Some("Notes Ideas"));

    f.session.start_new();
    f.session.send_user_message("two").await.unwrap();
    assert_eq!(f.session.bound_title(), Some("Notes Ideas (2)"));

    let titles: Vec<String> = f.session.conversations().unwrap().into_iter().collect();
    assert_eq!(titles, vec!["Notes Ideas".to_string(), "Notes Ideas (2)".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_persist_before_first_user_turn_is_noop() {
    let mut f = fixture(vec![]);
    f.session.start_new();

    f.session.persist().await.unwrap();

    assert!(f.llm.requests().is_empty());
    assert!(f.session.store().list().unwrap().is_empty());
    assert_eq!(f.session.bound_title(), None);
}

// ========================================================================
// Loading, renaming, deleting
// ========================================================================

#[tokio::test(start_paused = true)]
async fn test_load_existing_binds_and_continues_conversation() {
    let mut f = fixture(vec![Ok("Sure")]);
    let stored = bound_log("sys", "Hello", "Hi");
    f.session.store().save("Saved", &stored).unwrap();

    f.session.load_existing("Saved").unwrap();
    assert_eq!(f.session.log(), &stored);
    assert_eq!(f.session.state(), SessionState::Bound("Saved".into()));

    f.session.send_user_message("More please").await.unwrap();
    let reloaded = f.session.store().load("Saved").unwrap();
    assert_eq!(reloaded.len(), 5);
    assert_eq!(f.llm.requests().len(), 1);
}

#[test]
fn test_load_missing_leaves_session_untouched() {
    let mut f = fixture(vec![]);
    f.session.start_new();
    let before = f.session.log().clone();

    let err = f.session.load_existing("Nope").unwrap_err();

    assert!(matches!(err, ChatError::NotFound(_)));
    assert_eq!(f.session.log(), &before);
    assert_eq!(f.session.bound_title(), None);
    assert!(matches!(
        drain(&mut f.events).as_slice(),
        [SessionEvent::OperationFailed(_)]
    ));
}

#[test]
fn test_rename_bound_session() {
    let mut f = fixture(vec![]);
    let log = bound_log("sys", "Hello", "Hi");
    f.session.store().save("Before", &log).unwrap();
    f.session.load_existing("Before").unwrap();

    f.session.rename("After").unwrap();

    assert_eq!(f.session.bound_title(), Some("After"));
    assert_eq!(f.session.store().load("After").unwrap(), log);
    assert!(matches!(f.session.store().load("Before"), Err(ChatError::NotFound(_))));
    assert_eq!(
        drain(&mut f.events),
        vec![SessionEvent::ConversationListChanged(vec!["After".into()])]
    );
}

#[test]
fn test_rename_onto_existing_title_overwrites() {
    let mut f = fixture(vec![]);
    let mine = bound_log("sys", "mine", "ok");
    f.session.store().save("Mine", &mine).unwrap();
    f.session.store().save("X", &bound_log("sys", "theirs", "ok")).unwrap();
    f.session.load_existing("Mine").unwrap();

    f.session.rename("X").unwrap();

    assert_eq!(f.session.store().load("X").unwrap(), mine);
    assert!(matches!(f.session.store().load("Mine"), Err(ChatError::NotFound(_))));
    assert_eq!(f.session.bound_title(), Some("X"));
}

#[test]
fn test_rename_onto_existing_title_rejected_when_strict() {
    let mut f = fixture_with(vec![], RenamePolicy::Reject);
    let theirs = bound_log("sys", "theirs", "ok");
    f.session.store().save("Mine", &bound_log("sys", "mine", "ok")).unwrap();
    f.session.store().save("X", &theirs).unwrap();
    f.session.load_existing("Mine").unwrap();

    let err = f.session.rename("X").unwrap_err();

    assert!(matches!(err, ChatError::AlreadyExists(_)));
    assert_eq!(f.session.bound_title(), Some("Mine"));
    assert_eq!(f.session.store().load("X").unwrap(), theirs);
}

#[test]
fn test_delete_bound_session_resets_to_empty() {
    let mut f = fixture(vec![]);
    f.session.store().save("Gone", &bound_log("sys", "a", "b")).unwrap();
    f.session.load_existing("Gone").unwrap();

    f.session.delete().unwrap();

    assert_eq!(f.session.state(), SessionState::Empty);
    assert!(f.session.log().is_empty());
    assert!(matches!(f.session.store().load("Gone"), Err(ChatError::NotFound(_))));
    assert_eq!(
        drain(&mut f.events),
        vec![SessionEvent::ConversationListChanged(vec![])]
    );
}

#[test]
fn test_rename_and_delete_need_a_bound_session() {
    let mut f = fixture(vec![]);
    f.session.start_new();

    assert!(matches!(f.session.rename("X"), Err(ChatError::NoActiveConversation)));
    assert!(matches!(f.session.delete(), Err(ChatError::NoActiveConversation)));
}

#[test]
fn test_delete_other_conversation_keeps_session() {
    let mut f = fixture(vec![]);
    let active = bound_log("sys", "active", "ok");
    f.session.store().save("Active", &active).unwrap();
    f.session.store().save("Other", &bound_log("sys", "other", "ok")).unwrap();
    f.session.load_existing("Active").unwrap();

    f.session.delete_conversation("Other").unwrap();

    assert_eq!(f.session.bound_title(), Some("Active"));
    assert_eq!(f.session.log(), &active);
    assert_eq!(f.session.conversations().unwrap().len(), 1);
}

#[test]
fn test_renaming_bound_title_from_navigation_list_follows() {
    let mut f = fixture(vec![]);
    f.session.store().save("Active", &bound_log("sys", "a", "b")).unwrap();
    f.session.load_existing("Active").unwrap();

    f.session.rename_conversation("Active", "Renamed").unwrap();

    assert_eq!(f.session.bound_title(), Some("Renamed"));
}

// ========================================================================
// Credentials
// ========================================================================

#[test]
fn test_update_credentials_persists_and_applies() {
    let dir = TempDir::new().unwrap();
    let credential_store = CredentialStore::at(dir.path().join("credentials.toml"));
    let credentials = Credentials::default();
    let client_view = credentials.clone();

    let mut f = fixture(vec![]);
    f.session = Session::new(
        f.llm.clone(),
        credentials,
        ConversationStore::with_dir(dir.path().join("c")).unwrap(),
        &Settings::default(),
    )
    .with_credential_store(credential_store.clone());

    f.session.update_credentials("  sk-updated  ").unwrap();

    assert_eq!(client_view.api_key().as_deref(), Some("sk-updated"));
    assert_eq!(credential_store.load().unwrap().as_deref(), Some("sk-updated"));
    assert!(matches!(
        f.session.update_credentials(" "),
        Err(ChatError::Config(_))
    ));
    assert_eq!(client_view.api_key().as_deref(), Some("sk-updated"));
}

#[test]
fn test_update_credentials_reaches_openai_client() {
    let dir = TempDir::new().unwrap();
    let credentials = Credentials::default();
    let client = Arc::new(OpenAIClient::new(credentials.clone()));
    let mut session = Session::new(
        client.clone(),
        credentials,
        ConversationStore::with_dir(dir.path().join("c")).unwrap(),
        &Settings::default(),
    );

    assert!(client.credentials().api_key().is_none());
    session.update_credentials("sk-new").unwrap();

    assert_eq!(client.credentials().api_key().as_deref(), Some("sk-new"));
    assert!(session.credentials().is_configured());
}
