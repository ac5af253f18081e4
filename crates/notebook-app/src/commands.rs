//! Input line → command.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text: prompt the current session
    Send(String),
    Files,
    Attach(String),
    Toggle(String),
    Preview(String),
    Context,
    New,
    Sessions,
    Switch(String),
    /// Close the named session, or the current one
    Close(Option<String>),
    History,
    Load(String),
    /// Show models, or select one
    Model(Option<String>),
    Cancel,
    Open(PathBuf),
    Help,
    Quit,
    Empty,
    Unknown(String),
    /// A command that needs an argument was given none
    MissingArgument(&'static str),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Send(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim().to_string()).filter(|a| !a.is_empty())),
            None => (rest, None),
        };
        match name {
            "files" | "ls" => Command::Files,
            "attach" | "add" => required(arg, Command::Attach, "/attach <n|path>"),
            "toggle" => required(arg, Command::Toggle, "/toggle <n|path>"),
            "preview" | "cat" => required(arg, Command::Preview, "/preview <n|path>"),
            "context" | "ctx" => Command::Context,
            "new" => Command::New,
            "sessions" => Command::Sessions,
            "switch" => required(arg, Command::Switch, "/switch <n|id>"),
            "close" => Command::Close(arg),
            "history" => Command::History,
            "load" => required(arg, Command::Load, "/load <n>"),
            "model" => Command::Model(arg),
            "cancel" | "stop" => Command::Cancel,
            "open" => required(arg, |a| Command::Open(PathBuf::from(a)), "/open <dir>"),
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        }
    }
}

fn required(
    arg: Option<String>,
    make: impl FnOnce(String) -> Command,
    usage: &'static str,
) -> Command {
    match arg {
        Some(arg) => make(arg),
        None => Command::MissingArgument(usage),
    }
}

pub const HELP: &str = "\
Commands:
  <text>              ask the current session (creates one if needed)
  /files              list workspace documents
  /attach <n|path>    add a document to the context
  /toggle <n|path>    add or remove an unsent document
  /preview <n|path>   show a document (and attach it)
  /context            show attached documents (✓ = already sent)
  /new                start a new session
  /sessions           list open sessions
  /switch <n|id>      switch to an open session
  /close [n|id]       close a session (default: current)
  /history            list saved sessions
  /load <n>           resume a saved session
  /model [id]         show or select the model
  /cancel             stop the running prompt
  /open <dir>         switch to another workspace
  /quit               exit";
