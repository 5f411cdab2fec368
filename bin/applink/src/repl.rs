//! Line-oriented studio.
//!
//! Plain lines generate until a generation completes; after that they
//! modify the current code immediately. Lines starting with `~` are queued and only sent once
//! typing pauses, so a burst of them collapses into the last one.

use anyhow::Context as _;
use applink_core::{CodeService, SessionSnapshot, Studio, SubmitOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

const HELP: &str = "\
  <text>         generate, or modify the current code
  ~<text>        queue a modification (sent after a pause)
  :model <name>  switch model
  :show          print the current code
  :save [id]     save the current code
  :cancel        drop a queued modification
  :status        print the session state
  :quit          leave";

#[derive(Debug, PartialEq, Eq)]
pub enum Line<'a> {
    Prompt(&'a str),
    Queue(&'a str),
    Model(&'a str),
    Show,
    Save(Option<&'a str>),
    Cancel,
    Status,
    Help,
    Quit,
    Blank,
    Unknown(&'a str),
}

pub fn parse_line(line: &str) -> Line<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Line::Blank;
    }
    if let Some(rest) = line.strip_prefix('~') {
        return Line::Queue(rest.trim());
    }
    let Some(command) = line.strip_prefix(':') else {
        return Line::Prompt(line);
    };
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
        None => (command, None),
    };
    match (name, arg) {
        ("model", Some(model)) => Line::Model(model),
        ("show", None) => Line::Show,
        ("save", id) => Line::Save(id),
        ("cancel", None) => Line::Cancel,
        ("status", None) => Line::Status,
        ("help" | "h", None) => Line::Help,
        ("quit" | "q" | "exit", None) => Line::Quit,
        _ => Line::Unknown(line),
    }
}

fn report(snapshot: &SessionSnapshot) {
    if let Some(error) = &snapshot.error {
        eprintln!("error: {error}");
        return;
    }
    println!("{}", snapshot.code);
    eprintln!("[{}] {} bytes", snapshot.status, snapshot.code.len());
}

pub async fn run<S: CodeService>(studio: &Studio<S>) -> anyhow::Result<()> {
    eprintln!("applink studio, model {}. :help for commands", studio.snapshot().model);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("cannot read stdin")? {
        match parse_line(&line) {
            Line::Blank => {}
            Line::Quit => break,
            Line::Help => eprintln!("{HELP}"),
            Line::Prompt(prompt) if studio.next_prompt_generates() => {
                match studio.generate(prompt).await {
                    Ok(snapshot) => report(&snapshot),
                    Err(e) => eprintln!("error: {e}"),
                }
            }
            Line::Prompt(prompt) => {
                match studio.submit_modification(prompt).await {
                    SubmitOutcome::Started => {
                        report(&studio.settled().await);
                        studio.clear_error();
                    }
                    SubmitOutcome::Ignored(reason) => eprintln!("ignored: {reason}"),
                }
            }
            Line::Queue(prompt) => studio.queue_modification(prompt),
            Line::Model(model) => {
                studio.set_model(model);
                eprintln!("model set to {model}");
            }
            Line::Show => report(&studio.snapshot()),
            Line::Save(id) => {
                let saved = match id {
                    Some(id) => studio.save_as(id).await,
                    None => studio.save().await,
                };
                match saved {
                    Ok(response) => eprintln!("saved {}", response.data.id),
                    Err(e) => eprintln!("error: {e}"),
                }
            }
            Line::Cancel => studio.cancel_pending(),
            Line::Status => {
                let snapshot = studio.snapshot();
                eprintln!(
                    "status {} | model {} | id {} | modifying {}",
                    snapshot.status,
                    snapshot.model,
                    snapshot.code_id.as_deref().unwrap_or("-"),
                    snapshot.modifying
                );
            }
            Line::Unknown(text) => {
                warn!(line = text, "unknown studio command");
                eprintln!("unknown command {text:?}; :help lists commands");
            }
        }
    }
    Ok(())
}
