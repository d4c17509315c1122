use anyhow::{Context, Result};
use chatkeep_core::{ConversationLog, RenamePolicy, Role, Session, SessionEvent, Settings};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

#[derive(Parser, Debug)]
#[command(name = "chatkeep")]
#[command(about = "Chatkeep - persistent conversations with a chat-completion model")]
#[command(version)]
pub struct Cli {
    /// Model to use for replies
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Directory holding conversation records
    #[arg(long, global = true)]
    pub conversations_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// List stored conversations, most recent first
    List,
    /// Print a stored conversation
    Show { title: String },
    /// Send a message, continuing a conversation or starting a new one
    Send {
        message: String,
        /// Title of the conversation to continue
        #[arg(short, long)]
        conversation: Option<String>,
    },
    /// Rename a stored conversation
    Rename {
        old: String,
        new: String,
        /// Refuse to replace an existing conversation
        #[arg(long)]
        strict: bool,
    },
    /// Delete a stored conversation
    Delete { title: String },
    /// Store the API key used for every later request
    SetKey { key: String },
}

impl Cli {
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(ref model) = self.model {
            settings.llm.model = model.clone();
        }
        if let Some(ref dir) = self.conversations_dir {
            settings.conversation.directory = Some(dir.clone());
        }
        if let Command::Rename { strict: true, .. } = self.command {
            settings.conversation.rename_policy = RenamePolicy::Reject;
        }
    }
}

/// Render a log the way the terminal shows it: one labelled block per
/// message, system prompt omitted.
pub fn render_log(log: &ConversationLog) -> String {
    log.messages()
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let label = match m.role {
                Role::User => "you",
                Role::Assistant => "assistant",
                Role::System => "system",
            };
            format!("[{}]\n{}\n", label, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn report_events(events: &mut UnboundedReceiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::TitleAssigned(title) => eprintln!("Saved as \"{}\"", title),
            SessionEvent::OperationFailed(reason) => eprintln!("warning: {}", reason),
            SessionEvent::MessageAppended { .. } | SessionEvent::ConversationListChanged(_) => {}
        }
    }
}

pub async fn run(cli: Cli, settings: Settings) -> Result<()> {
    tracing::debug!(dir = %settings.conversations_dir().display(), "Opening conversation store");
    let (tx, mut events) = unbounded_channel();
    let mut session = Session::from_settings(&settings)
        .context("Failed to open conversation storage")?
        .with_events(tx);

    match cli.command {
        Command::List => {
            for summary in session.conversation_summaries()? {
                println!(
                    "{}  {}",
                    summary.modified.format("%Y-%m-%d %H:%M"),
                    summary.title
                );
            }
        }
        Command::Show { title } => {
            session.load_existing(&title)?;
            print!("{}", render_log(session.log()));
        }
        Command::Send {
            message,
            conversation,
        } => {
            match conversation {
                Some(title) => session.load_existing(&title)?,
                None => session.start_new(),
            }
            if !session.credentials().is_configured() {
                anyhow::bail!(
                    "No API key configured. Run `chatkeep set-key <key>` or set {}.",
                    settings.llm.api_key_env
                );
            }
            let reply = session.send_user_message(&message).await;
            report_events(&mut events);
            if let Some(reply) = reply? {
                println!("{}", reply);
            }
        }
        Command::Rename { old, new, .. } => {
            session.rename_conversation(&old, &new)?;
            println!("Renamed \"{}\" to \"{}\"", old, new);
        }
        Command::Delete { title } => {
            session.delete_conversation(&title)?;
            println!("Deleted \"{}\"", title);
        }
        Command::SetKey { key } => {
            session.update_credentials(&key)?;
            println!("API key updated");
        }
    }

    Ok(())
}
