#[cfg(test)]
mod tests {
    use crate::acp::protocol::*;
    use crate::acp::{compose_prompt, find_cli, stale_lock_path, AcpConnection};
    use crate::history::{
        history_file_name, open_history, DirHistory, MemoryHistory, WorkspaceHistory,
    };
    use crate::workspace::{extract_docx, read_text, scan, WorkspaceFiles, WorkspaceRoot};
    use notebook_core::event_bus::EventBus;
    use notebook_core::ports::{FilesPort, HistoryPort};
    use notebook_types::config::{AgentConfig, WorkspaceConfig};
    use notebook_types::event::StatusUpdate;
    use notebook_types::file::FileEntry;
    use notebook_types::message::Message;
    use notebook_types::session::HistoryRecord;
    use notebook_types::{NotebookError, Result};

    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::json;
    use std::collections::HashMap;
    use std::path::Path;
    use std::rc::Rc;
    use std::time::Duration;

    struct FixedFiles(HashMap<&'static str, &'static str>);

    #[async_trait(?Send)]
    impl FilesPort for FixedFiles {
        async fn list_files(&self) -> Result<Vec<FileEntry>> {
            Ok(self.0.keys().map(|p| FileEntry::file(*p)).collect())
        }

        async fn read_file_content(&self, path: &str) -> Result<String> {
            self.0
                .get(path)
                .map(|c| c.to_string())
                .ok_or_else(|| NotebookError::Read("Failed to read file: No such file".to_string()))
        }
    }

    fn fixed_files() -> FixedFiles {
        let mut files = HashMap::new();
        files.insert("/ws/a.txt", "alpha");
        files.insert("/ws/docs/b.md", "# Beta");
        files.insert("/ws/long.txt", "0123456789");
        FixedFiles(files)
    }

    // ─── Prompt Composition Tests ────────────────────────────

    #[tokio::test]
    async fn test_prompt_without_context_is_plain() {
        let prompt = compose_prompt(&fixed_files(), "What is this?", &[], 50_000).await;
        assert_eq!(prompt, "What is this?");
    }

    #[tokio::test]
    async fn test_prompt_inlines_context_files() {
        let paths = vec!["/ws/a.txt".to_string(), "/ws/docs/b.md".to_string()];
        let prompt = compose_prompt(&fixed_files(), "Compare them", &paths, 50_000).await;
        assert_eq!(
            prompt,
            "Here are the documents for context:\n\n\
             --- a.txt ---\nalpha\n\n\
             --- b.md ---\n# Beta\n\n\
             ---\n\nUser question: Compare them"
        );
    }

    #[tokio::test]
    async fn test_prompt_truncates_long_files() {
        let paths = vec!["/ws/long.txt".to_string()];
        let prompt = compose_prompt(&fixed_files(), "q", &paths, 4).await;
        assert!(prompt.contains("--- long.txt ---\n0123...\n[truncated]\n\n"));
    }

    #[tokio::test]
    async fn test_prompt_inlines_read_errors() {
        let paths = vec!["/ws/gone.txt".to_string()];
        let prompt = compose_prompt(&fixed_files(), "q", &paths, 100).await;
        assert!(prompt.contains("--- gone.txt ---\n[Error reading: Failed to read file: No such file]\n\n"));
        assert!(prompt.ends_with("User question: q"));
    }

    // ─── Protocol Tests ──────────────────────────────────────

    #[test]
    fn test_parse_message_chunk() {
        let update = json!({
            "sessionUpdate": "agent_message_chunk",
            "content": { "type": "text", "text": "Hel" }
        });
        assert_eq!(parse_update(&update), Some(SessionUpdate::Chunk("Hel".to_string())));
    }

    #[test]
    fn test_parse_tool_events() {
        let call = json!({ "sessionUpdate": "tool_call", "title": "Reading a.pdf", "status": "pending" });
        assert_eq!(
            parse_update(&call),
            Some(SessionUpdate::Status(StatusUpdate::ToolCall {
                title: Some("Reading a.pdf".to_string()),
                status: Some("pending".to_string()),
            }))
        );

        let done = json!({ "sessionUpdate": "tool_call_update", "status": "completed" });
        let Some(SessionUpdate::Status(update)) = parse_update(&done) else {
            panic!("expected a status update");
        };
        assert_eq!(update.indicator(), Some(String::new()));
    }

    #[test]
    fn test_parse_ignores_other_updates() {
        assert_eq!(parse_update(&json!({ "sessionUpdate": "agent_thought_chunk" })), None);
        assert_eq!(parse_update(&json!({ "sessionUpdate": "agent_message_chunk" })), None);
        assert_eq!(parse_update(&json!({})), None);
    }

    #[test]
    fn test_notification_from_line() {
        let line = r#"{"jsonrpc":"2.0","method":"session/update","params":{"sessionId":"s1","update":{"sessionUpdate":"agent_message_chunk","content":{"type":"text","text":"lo"}}}}"#;
        let msg = JsonRpcMessage::parse(line).unwrap();
        assert!(!msg.answers(0));
        assert_eq!(msg.session_update(), Some(SessionUpdate::Chunk("lo".to_string())));
    }

    #[test]
    fn test_response_matching_and_errors() {
        let ok = JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":3,"result":{"sessionId":"abc"}}"#).unwrap();
        assert!(ok.answers(3));
        assert!(!ok.answers(4));
        assert_eq!(ok.into_result().unwrap()["sessionId"], "abc");

        let err = JsonRpcMessage::parse(
            r#"{"jsonrpc":"2.0","id":5,"error":{"code":-32603,"message":"Internal error","data":"Session abc is active in another process"}}"#,
        )
        .unwrap();
        let err = err.into_result().unwrap_err();
        assert!(is_lock_conflict(&err));
        assert!(err.to_string().starts_with("ACP error: Internal error"));

        assert!(JsonRpcMessage::parse("").is_none());
        assert!(JsonRpcMessage::parse("Starting agent...").is_none());
    }

    #[test]
    fn test_request_serialization() {
        let req = JsonRpcRequest::new(7, "session/cancel", json!({ "sessionId": "s1" }));
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 7);
        assert_eq!(value["params"]["sessionId"], "s1");
    }

    #[test]
    fn test_stale_lock_path() {
        let path = stale_lock_path(Path::new("/home/me"), "abc-123");
        assert_eq!(path, Path::new("/home/me/.kiro/sessions/cli/abc-123.lock"));
    }

    #[tokio::test]
    async fn test_find_cli_honours_configured_path() {
        let config = AgentConfig {
            cli_path: Some("/definitely/not/here/kiro-cli".to_string()),
            ..AgentConfig::default()
        };
        assert!(matches!(find_cli(&config).await, Err(NotebookError::Config(_))));

        let dir = tempfile::tempdir().unwrap();
        let cli = dir.path().join("kiro-cli");
        std::fs::write(&cli, "").unwrap();
        let config = AgentConfig {
            cli_path: Some(cli.display().to_string()),
            ..AgentConfig::default()
        };
        assert_eq!(find_cli(&config).await.unwrap(), cli.display().to_string());
    }

    // ─── ACP Connection Tests ────────────────────────────────

    /// Shell helpers shared by the scripted agents: `id_of` pulls the
    /// request id out of a line, `chunk` streams one message chunk.
    #[cfg(unix)]
    const AGENT_PRELUDE: &str = r#"
id_of() { printf '%s\n' "$1" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p'; }
chunk() { printf '{"jsonrpc":"2.0","method":"session/update","params":{"sessionId":"%s","update":{"sessionUpdate":"agent_message_chunk","content":{"type":"text","text":"%s"}}}}\n' "$1" "$2"; }
"#;

    /// Streams "Hel" on a prompt and holds it open until a model change
    /// arrives; answers the model change, then finishes the prompt.
    #[cfg(unix)]
    const INTERLEAVED_AGENT: &str = r#"
while IFS= read -r line; do
  id=$(id_of "$line")
  case "$line" in
    *'"session/prompt"'*)
      prompt_id=$id
      chunk s1 Hel
      ;;
    *'"session/set_model"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id"
      chunk s1 lo
      printf '{"jsonrpc":"2.0","id":%s,"result":{"stopReason":"end_turn"}}\n' "$prompt_id"
      ;;
  esac
done
"#;

    /// A well-behaved agent: noise on startup, resume refused, fresh
    /// sessions named after the process id, prompts echoed back.
    #[cfg(unix)]
    const SESSION_AGENT: &str = r#"
sid="s$$"
while IFS= read -r line; do
  id=$(id_of "$line")
  case "$line" in
    *'"initialize"'*)
      echo 'Starting agent...'
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":1}}\n' "$id"
      ;;
    *'"session/load"'*)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32603,"message":"Internal error","data":"Session not found"}}\n' "$id"
      ;;
    *'"session/new"'*)
      chunk "$sid" replayed
      printf '{"jsonrpc":"2.0","id":%s,"result":{"sessionId":"%s"}}\n' "$id" "$sid"
      ;;
    *'"session/prompt"'*)
      chunk "$sid" Sure
      printf '{"jsonrpc":"2.0","id":%s,"result":{"stopReason":"end_turn"}}\n' "$id"
      ;;
  esac
done
"#;

    #[cfg(unix)]
    fn write_agent(dir: &Path, body: &str) -> String {
        let path = dir.join("agent.sh");
        std::fs::write(&path, format!("{}{}", AGENT_PRELUDE, body)).unwrap();
        path.display().to_string()
    }

    #[cfg(unix)]
    fn scripted_connection(dir: &Path, body: &str, bus: EventBus) -> AcpConnection {
        AcpConnection::spawn("sh", &[write_agent(dir, body)], bus).unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_model_change_answered_while_prompt_streams() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let conn = scripted_connection(dir.path(), INTERLEAVED_AGENT, bus.clone());
        let mut chunks = bus.subscribe_chunks("s1");

        let prompt = conn.prompt("s1", "hi");
        let change_model = async {
            let first = chunks.next().await.unwrap();
            assert_eq!(first.text, "Hel");
            conn.set_model("s1", "claude-sonnet-4.5").await
        };
        let (prompt, model) = tokio::time::timeout(
            Duration::from_secs(10),
            async { futures::join!(prompt, change_model) },
        )
        .await
        .expect("set_model must resolve while the prompt holds stdout");

        assert_eq!(model, Ok(()));
        assert_eq!(prompt.unwrap(), "Hello");
        assert_eq!(chunks.try_next_event().map(|c| c.text), Some("lo".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_prompt_keeps_partial_text_when_agent_exits() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let conn = scripted_connection(dir.path(), "read -r line\nchunk s1 Par\nexit 0\n", bus.clone());
        let mut chunks = bus.subscribe_chunks("s1");

        assert_eq!(conn.prompt("s1", "hi").await.unwrap(), "Par");
        assert_eq!(chunks.try_next_event().map(|c| c.text), Some("Par".to_string()));
        assert!(conn.set_model("s1", "auto").await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_prompt_fails_when_agent_exits_silently() {
        let dir = tempfile::tempdir().unwrap();
        let conn = scripted_connection(dir.path(), "read -r line\nexit 0\n", EventBus::new());
        assert_eq!(
            conn.prompt("s1", "hi").await,
            Err(NotebookError::Prompt("ACP process closed".to_string()))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_calls_skip_noise_and_surface_errors() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let conn = scripted_connection(dir.path(), SESSION_AGENT, bus.clone());

        let init = conn.initialize(&AgentConfig::default()).await.unwrap();
        assert_eq!(init["protocolVersion"], 1);

        let err = conn.load_session("s0", "/ws").await.unwrap_err();
        assert_eq!(err, NotebookError::Rpc("Internal error: \"Session not found\"".to_string()));
        assert!(!is_lock_conflict(&err));

        let id = conn.new_session("/ws").await.unwrap();
        assert!(id.starts_with('s'));

        // The chunk replayed during session/new is not part of the reply
        let mut chunks = bus.subscribe_chunks(&id);
        assert_eq!(conn.prompt(&id, "hi").await.unwrap(), "Sure");
        assert_eq!(chunks.try_next_event().map(|c| c.text), Some("Sure".to_string()));
        assert_eq!(chunks.try_next_event(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_acp_agent_sessions_end_to_end() {
        use crate::acp::AcpAgent;
        use notebook_core::ports::AgentPort;

        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let config = AgentConfig {
            args: vec![write_agent(dir.path(), SESSION_AGENT)],
            ..AgentConfig::default()
        };
        let agent = AcpAgent::new(
            config,
            "sh",
            WorkspaceRoot::new(dir.path()),
            Rc::new(fixed_files()),
            bus.clone(),
        );

        let id = agent.create_session().await.unwrap();
        let mut chunks = bus.subscribe_chunks(&id);
        let reply = agent
            .send_prompt(&id, "Summarize", &["/ws/a.txt".to_string()])
            .await
            .unwrap();
        assert_eq!(reply, "Sure");
        assert_eq!(chunks.try_next_event().map(|c| c.text), Some("Sure".to_string()));

        // Resume refused: a fresh session replaces it
        let resumed = agent.load_session("gone-1").await.unwrap();
        assert_ne!(resumed, "gone-1");
        assert_eq!(agent.session_count(), 2);
        assert_eq!(agent.load_session(&id).await.unwrap(), id);

        agent.close_session(&id).await.unwrap();
        assert_eq!(agent.session_count(), 1);
        assert!(matches!(
            agent.send_prompt(&id, "again", &[]).await,
            Err(NotebookError::UnknownSession(_))
        ));
    }

    // ─── History Tests ───────────────────────────────────────

    fn record(id: &str) -> HistoryRecord {
        HistoryRecord::new(
            id,
            format!("label {}", id),
            vec![Message::user("q"), Message::assistant("a")],
            vec!["/ws/a.txt".to_string()],
        )
    }

    #[tokio::test]
    async fn test_dir_history_writes_one_file_per_session() {
        let dir = tempfile::tempdir().unwrap();
        let history = DirHistory::open(dir.path().join(".kiro-notebook")).await.unwrap();
        history.save_history(&record("abc-1")).await.unwrap();

        let raw = std::fs::read(history.dir().join("abc-1.json")).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["sessionId"], "abc-1");
        assert_eq!(json["contextFiles"][0], "/ws/a.txt");
        assert_eq!(json["messages"][1]["role"], "assistant");
        assert!(!json["updatedAt"].as_str().unwrap().is_empty());

        let mut second = record("abc-1");
        second.messages.push(Message::user("again"));
        history.save_history(&second).await.unwrap();

        let loaded = history.load_history().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].messages, second.messages);
    }

    #[tokio::test]
    async fn test_dir_history_newest_first_and_skips_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        for (id, at) in [
            ("old", "2025-01-01T10:00:00+08:00"),
            ("new", "2025-03-01T10:00:00+08:00"),
            ("mid", "2025-02-01T10:00:00+08:00"),
        ] {
            let mut r = record(id);
            r.updated_at = at.to_string();
            std::fs::write(
                dir.path().join(history_file_name(id).unwrap()),
                serde_json::to_vec(&r).unwrap(),
            )
            .unwrap();
        }
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::create_dir(dir.path().join("nested.json")).unwrap();

        let history = DirHistory::open(dir.path()).await.unwrap();
        let ids: Vec<String> = history
            .load_history()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_history_rejects_unsafe_ids() {
        let dir = tempfile::tempdir().unwrap();
        let on_disk = DirHistory::open(dir.path()).await.unwrap();
        let result = on_disk.save_history(&record("../../etc/passwd")).await;
        assert!(matches!(result, Err(NotebookError::InvalidSessionId(_))));

        let in_memory = MemoryHistory::new();
        let result = in_memory.save_history(&record("a/b")).await;
        assert!(matches!(result, Err(NotebookError::InvalidSessionId(_))));
        assert!(in_memory.load_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_history_replaces_and_orders() {
        let history = MemoryHistory::new();
        history.save_history(&record("first")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        history.save_history(&record("second")).await.unwrap();

        let mut updated = record("first");
        updated.label = "renamed".to_string();
        tokio::time::sleep(Duration::from_millis(5)).await;
        history.save_history(&updated).await.unwrap();

        let loaded = history.load_history().await.unwrap();
        let ids: Vec<&str> = loaded.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert_eq!(loaded[0].label, "renamed");
    }

    #[tokio::test]
    async fn test_open_history_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let history = open_history(&dir.path().join(".kiro-notebook")).await;
        history.save_history(&record("kept")).await.unwrap();
        assert!(dir.path().join(".kiro-notebook/kept.json").exists());

        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a dir").unwrap();
        let history = open_history(&blocker.join("history")).await;
        history.save_history(&record("volatile")).await.unwrap();
        assert_eq!(history.load_history().await.unwrap()[0].session_id, "volatile");
        assert!(!blocker.join("history").exists());
    }

    #[tokio::test]
    async fn test_workspace_history_follows_replaced_backend() {
        let history = WorkspaceHistory::new(Rc::new(MemoryHistory::new()));
        history.save_history(&record("first")).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        history.replace_backend(open_history(dir.path()).await);
        assert!(history.load_history().await.unwrap().is_empty());
        history.save_history(&record("second")).await.unwrap();
        assert!(dir.path().join("second.json").exists());
    }

    // ─── Workspace Tests ─────────────────────────────────────

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_scan_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "b.md", "b");
        write(root, "A.txt", "a");
        write(root, "main.rs", "fn main() {}");
        write(root, ".secret.md", "hidden");
        write(root, ".kiro-notebook/s1.json", "{}");
        write(root, "docs/C.PDF", "%PDF");
        write(root, "x/y/z.html", "<p>");
        write(root, "x/y/z/too-deep.md", "deep");

        let names: Vec<String> = scan(root, &WorkspaceConfig::default())
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["A.txt", "b.md", "C.PDF", "z.html"]);

        let files = WorkspaceFiles::new(WorkspaceRoot::new(root), WorkspaceConfig::default());
        let listed = files.list_files().await.unwrap();
        assert_eq!(listed[2].extension, "pdf");
        assert!(listed.iter().all(|f| !f.is_dir));
    }

    #[tokio::test]
    async fn test_list_files_missing_workspace() {
        let files = WorkspaceFiles::new(
            WorkspaceRoot::new("/definitely/not/a/workspace"),
            WorkspaceConfig::default(),
        );
        assert!(matches!(files.list_files().await, Err(NotebookError::Read(_))));
    }

    #[tokio::test]
    async fn test_read_text_formats() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notes.md", "# Notes");
        write(dir.path(), "paper.pdf", "%PDF-1.7 truncated");
        write(dir.path(), "main.rs", "fn main() {}");

        let md = dir.path().join("notes.md").display().to_string();
        assert_eq!(read_text(&md).await.unwrap(), "# Notes");

        let pdf = dir.path().join("paper.pdf").display().to_string();
        let err = read_text(&pdf).await.unwrap_err();
        assert!(err.detail().starts_with("Failed to parse PDF"), "{}", err);

        let rs = dir.path().join("main.rs").display().to_string();
        assert_eq!(
            read_text(&rs).await,
            Err(NotebookError::Read("Unsupported file type: rs".to_string()))
        );

        let missing = dir.path().join("missing.txt").display().to_string();
        let err = read_text(&missing).await.unwrap_err();
        assert!(err.detail().starts_with("Failed to read file:"));

        let missing = dir.path().join("missing.docx").display().to_string();
        let err = read_text(&missing).await.unwrap_err();
        assert!(err.detail().starts_with("Failed to read DOCX:"));
    }

    #[tokio::test]
    async fn test_read_docx_paragraphs() {
        use docx_rs::{Docx, Paragraph, Run};

        let mut packed = std::io::Cursor::new(Vec::new());
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Chapter one")))
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text("Intro"))
                    .add_run(Run::new().add_text("duction")),
            )
            .build()
            .pack(&mut packed)
            .unwrap();
        let bytes = packed.into_inner();

        let text = extract_docx(&bytes).unwrap();
        let lines: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(lines, vec!["Chapter one", "Introduction"]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.docx");
        std::fs::write(&path, &bytes).unwrap();
        assert_eq!(read_text(&path.display().to_string()).await.unwrap(), text);

        assert!(extract_docx(b"not a zip").unwrap_err().detail().starts_with("Failed to parse DOCX"));
    }

    #[test]
    fn test_workspace_root_switch() {
        let root = WorkspaceRoot::new("/ws/one");
        let shared = root.clone();
        shared.set("/ws/two");
        assert_eq!(root.path(), Path::new("/ws/two"));
        assert_eq!(root.history_dir(".kiro-notebook"), Path::new("/ws/two/.kiro-notebook"));
    }
}
