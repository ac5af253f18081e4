use std::path::Path;

use notebook_core::ports::FilesPort;

const CONTEXT_HEADER: &str = "Here are the documents for context:\n\n";
const QUESTION_HEADER: &str = "---\n\nUser question: ";
const TRUNCATED_MARKER: &str = "...\n[truncated]";

/// Build the prompt text: each context file inlined under its file name,
/// followed by the user's message. Without context files the message is
/// sent as is.
pub async fn compose_prompt(
    files: &dyn FilesPort,
    text: &str,
    context_paths: &[String],
    max_chars: usize,
) -> String {
    let mut prompt = String::new();
    if !context_paths.is_empty() {
        prompt.push_str(CONTEXT_HEADER);
        for path in context_paths {
            let name = Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.clone());
            match files.read_file_content(path).await {
                Ok(content) => {
                    let content = truncate_chars(&content, max_chars);
                    prompt.push_str(&format!("--- {} ---\n{}\n\n", name, content));
                }
                Err(e) => {
                    log::warn!("Context file {} unreadable: {}", path, e);
                    prompt.push_str(&format!("--- {} ---\n[Error reading: {}]\n\n", name, e.detail()));
                }
            }
        }
        prompt.push_str(QUESTION_HEADER);
    }
    prompt.push_str(text);
    prompt
}

fn truncate_chars(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &content[..cut], TRUNCATED_MARKER),
        None => content.to_string(),
    }
}
