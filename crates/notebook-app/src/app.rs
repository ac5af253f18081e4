//! Main application: wires the adapters together and dispatches commands.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use futures::{pin_mut, select, FutureExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};

use notebook_core::event_bus::EventBus;
use notebook_core::lifecycle::SessionManager;
use notebook_core::ports::{AgentPort, FilesPort};
use notebook_core::store::NotebookState;
use notebook_platform::acp::{find_cli, AcpAgent};
use notebook_platform::history::{open_history, WorkspaceHistory};
use notebook_platform::workspace::{WorkspaceFiles, WorkspaceRoot};
use notebook_types::{
    config::NotebookConfig,
    file::FileEntry,
    message::{Message, Role},
    model::ModelId,
    session::HistoryRecord,
};

use crate::commands::{Command, HELP};
use crate::stub::StubAgent;

pub struct NotebookApp {
    config: NotebookConfig,
    root: WorkspaceRoot,
    history: Rc<WorkspaceHistory>,
    bus: EventBus,
    manager: Rc<SessionManager>,
    /// Last `/files` listing, for numeric references
    files: RefCell<Vec<FileEntry>>,
    /// Last `/history` listing
    saved: RefCell<Vec<HistoryRecord>>,
}

impl NotebookApp {
    pub async fn new(config: NotebookConfig, workspace: PathBuf) -> Self {
        let root = WorkspaceRoot::new(workspace);
        let bus = EventBus::new();

        let files: Rc<dyn FilesPort> = Rc::new(WorkspaceFiles::new(
            root.clone(),
            config.workspace.clone(),
        ));

        let agent: Rc<dyn AgentPort> = match find_cli(&config.agent).await {
            Ok(cli_path) => {
                log::info!("Agent CLI: {}", cli_path);
                Rc::new(AcpAgent::new(
                    config.agent.clone(),
                    cli_path,
                    root.clone(),
                    files.clone(),
                    bus.clone(),
                ))
            }
            Err(e) => {
                log::warn!("{} Using stub agent.", e);
                println!("⚠ {} Replies come from a stub agent.", e.detail());
                Rc::new(StubAgent::new(bus.clone()))
            }
        };

        let backend = open_history(&root.history_dir(&config.history.dir_name)).await;
        let history = Rc::new(WorkspaceHistory::new(backend));
        let state = NotebookState::shared(config.default_model);
        let manager = Rc::new(SessionManager::new(
            state,
            agent,
            files,
            history.clone(),
            bus.clone(),
        ));

        Self {
            config,
            root,
            history,
            bus,
            manager,
            files: RefCell::new(Vec::new()),
            saved: RefCell::new(Vec::new()),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        println!("kiro-notebook · workspace {}", self.root.path().display());
        println!("Type /help for commands.");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            match Command::parse(&line) {
                Command::Quit => break,
                command => self.dispatch(command).await,
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&self) {
        let ids: Vec<String> = self
            .manager
            .state()
            .borrow()
            .sessions()
            .iter()
            .map(|s| s.id.clone())
            .collect();
        for id in ids {
            self.manager.close(&id).await;
        }
        log::info!("kiro-notebook stopped");
    }

    async fn dispatch(&self, command: Command) {
        match command {
            Command::Send(text) => self.dispatch_message(text),
            Command::Files => self.show_files().await,
            Command::Attach(arg) => {
                let path = self.resolve_file(&arg);
                self.manager.attach(&path);
                println!("Attached {}", path);
            }
            Command::Toggle(arg) => {
                let path = self.resolve_file(&arg);
                let was_attached = self.manager.state().borrow().context.is_attached(&path);
                if !self.manager.toggle_context(&path) {
                    println!("{} was already sent to this session and stays attached", path);
                } else if was_attached {
                    println!("Detached {}", path);
                } else {
                    println!("Attached {}", path);
                }
            }
            Command::Preview(arg) => {
                let path = self.resolve_file(&arg);
                println!("── {} ──", path);
                println!("{}", self.manager.preview(&path).await);
            }
            Command::Context => self.show_context(),
            Command::New => match self.manager.start_new().await {
                Ok(id) => println!("Started {}", self.label_of(&id)),
                Err(e) => println!("{}", Message::notice(&e).content),
            },
            Command::Sessions => self.show_sessions(),
            Command::Switch(arg) => {
                let id = self.resolve_session(&arg);
                match self.manager.switch_to(&id) {
                    Ok(()) => self.show_transcript(),
                    Err(e) => println!("{}", Message::notice(&e).content),
                }
            }
            Command::Close(arg) => {
                let id = match arg {
                    Some(arg) => Some(self.resolve_session(&arg)),
                    None => self.manager.current_id(),
                };
                match id {
                    Some(id) => {
                        self.manager.close(&id).await;
                        match self.manager.current_id() {
                            Some(current) => println!("Closed. Now on {}", self.label_of(&current)),
                            None => println!("Closed. No open session."),
                        }
                    }
                    None => println!("No session to close"),
                }
            }
            Command::History => self.show_history().await,
            Command::Load(arg) => {
                let record = arg
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| self.saved.borrow().get(n.wrapping_sub(1)).cloned());
                match record {
                    Some(record) => match self.manager.load_from_history(&record).await {
                        Ok(_) => self.show_transcript(),
                        Err(e) => println!("{}", Message::notice(&e).content),
                    },
                    None => println!("No saved session {} (run /history first)", arg),
                }
            }
            Command::Model(None) => {
                let current = self.manager.state().borrow().model;
                for model in ModelId::all() {
                    let marker = if *model == current { "*" } else { " " };
                    println!(" {} {:<20} {}", marker, model.as_str(), model);
                }
            }
            Command::Model(Some(arg)) => match arg.parse::<ModelId>() {
                Ok(model) => {
                    self.manager.change_model(model).await;
                    println!("Model: {}", model);
                }
                Err(e) => println!("{}", e),
            },
            Command::Cancel => {
                if let Err(e) = self.manager.cancel().await {
                    println!("{}", e);
                }
            }
            Command::Open(dir) => self.open_workspace(dir).await,
            Command::Help => println!("{}", HELP),
            Command::MissingArgument(usage) => println!("Usage: {}", usage),
            Command::Unknown(name) => println!("Unknown command /{} (try /help)", name),
            Command::Empty | Command::Quit => {}
        }
    }

    /// Stream the reply to the terminal while the prompt runs in the
    /// background, so `/cancel` and other commands stay available.
    fn dispatch_message(&self, text: String) {
        let manager = self.manager.clone();
        let bus = self.bus.clone();

        tokio::task::spawn_local(async move {
            let prompt = match manager.prepare_prompt(&text).await {
                Ok(prompt) => prompt,
                Err(e) => {
                    println!("{}", Message::notice(&e).content);
                    return;
                }
            };
            let mut chunks = bus.subscribe_chunks(prompt.session_id()).fuse();
            let mut status = bus.subscribe_status(prompt.session_id()).fuse();
            let send = manager.run_prompt(prompt).fuse();
            pin_mut!(send);

            let mut streamed = false;
            let result = loop {
                select! {
                    chunk = chunks.next() => {
                        if let Some(chunk) = chunk {
                            streamed = true;
                            print_inline(&chunk.text);
                        }
                    }
                    update = status.next() => {
                        if let Some(text) = update.and_then(|u| u.update.indicator()) {
                            if !text.is_empty() {
                                println!("\n  [{}]", text);
                            }
                        }
                    }
                    result = send => break result,
                }
            };
            while let Some(chunk) = chunks.get_mut().try_next_event() {
                streamed = true;
                print_inline(&chunk.text);
            }

            match result {
                Ok(_) if streamed => println!(),
                Ok(text) => println!("{}", text),
                Err(e) => println!("\n{}", Message::notice(&e).content),
            }
        });
    }

    async fn open_workspace(&self, dir: PathBuf) {
        let dir = match dir.canonicalize() {
            Ok(dir) if dir.is_dir() => dir,
            Ok(dir) => return println!("Not a directory: {}", dir.display()),
            Err(e) => return println!("Invalid path {}: {}", dir.display(), e),
        };
        if let Err(e) = self.manager.open_workspace() {
            return println!("{}", e);
        }
        self.root.set(&dir);
        let backend = open_history(&self.root.history_dir(&self.config.history.dir_name)).await;
        self.history.replace_backend(backend);
        self.files.borrow_mut().clear();
        self.saved.borrow_mut().clear();
        println!("Workspace: {}", dir.display());
    }

    // ─── Views ───────────────────────────────────────────────

    async fn show_files(&self) {
        match self.manager.list_files().await {
            Ok(files) => {
                let state = self.manager.state().borrow();
                for (i, file) in files.iter().enumerate() {
                    println!(
                        "{:>3} {} {}",
                        i + 1,
                        context_marker(state.context.is_attached(&file.path), state.context.is_sent(&file.path)),
                        file.name
                    );
                }
                if files.is_empty() {
                    println!("No supported documents in {}", self.root.path().display());
                }
                drop(state);
                *self.files.borrow_mut() = files;
            }
            Err(e) => println!("{}", e),
        }
    }

    fn show_context(&self) {
        let state = self.manager.state().borrow();
        if state.context.is_empty() {
            return println!("No documents attached");
        }
        for path in state.context.attached() {
            println!("  {} {}", context_marker(true, state.context.is_sent(&path)), path);
        }
    }

    fn show_sessions(&self) {
        let state = self.manager.state().borrow();
        if state.sessions().is_empty() {
            return println!("No open sessions");
        }
        for (i, session) in state.sessions().iter().enumerate() {
            let marker = if state.is_current(&session.id) { "*" } else { " " };
            println!("{:>3} {} {}", i + 1, marker, session.label);
        }
    }

    async fn show_history(&self) {
        match self.manager.list_history().await {
            Ok(records) => {
                for (i, record) in records.iter().enumerate() {
                    println!("{:>3}  {}  ({} messages)", i + 1, record.label, record.messages.len());
                }
                if records.is_empty() {
                    println!("No saved sessions");
                }
                *self.saved.borrow_mut() = records;
            }
            Err(e) => println!("{}", e),
        }
    }

    fn show_transcript(&self) {
        let state = self.manager.state().borrow();
        if let Some(id) = state.current_id() {
            let label = state.session(id).map(|s| s.label.as_str()).unwrap_or(id);
            println!("── {} ──", label);
        }
        for message in &state.transcript {
            let who = match message.role {
                Role::User => "you",
                Role::Assistant => "agent",
            };
            println!("{}> {}", who, message.content);
        }
    }

    // ─── Argument resolution ─────────────────────────────────

    /// `n` refers to the last `/files` listing; anything else is a path.
    fn resolve_file(&self, arg: &str) -> String {
        arg.parse::<usize>()
            .ok()
            .and_then(|n| self.files.borrow().get(n.wrapping_sub(1)).map(|f| f.path.clone()))
            .unwrap_or_else(|| arg.to_string())
    }

    /// `n` refers to `/sessions` order; anything else is a session id.
    fn resolve_session(&self, arg: &str) -> String {
        let state = self.manager.state().borrow();
        arg.parse::<usize>()
            .ok()
            .and_then(|n| state.sessions().get(n.wrapping_sub(1)).map(|s| s.id.clone()))
            .unwrap_or_else(|| arg.to_string())
    }

    fn label_of(&self, session_id: &str) -> String {
        self.manager
            .state()
            .borrow()
            .session(session_id)
            .map(|s| s.label.clone())
            .unwrap_or_else(|| session_id.to_string())
    }
}

/// `✓` sent, `+` attached, blank otherwise
pub fn context_marker(attached: bool, sent: bool) -> &'static str {
    match (attached, sent) {
        (_, true) => "✓",
        (true, false) => "+",
        _ => " ",
    }
}

fn print_inline(text: &str) {
    use std::io::Write;
    print!("{}", text);
    let _ = std::io::stdout().flush();
}
