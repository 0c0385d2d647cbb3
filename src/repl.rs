use anyhow::Result;
use async_trait::async_trait;
use mcp_agent::McpAgent;
use mcp_client::McpClient;
use rustyline::error::ReadlineError;
use rustyline::{Config as RlConfig, DefaultEditor};
use std::io::Write;
use tracing::warn;

const BANNER: &str = r#"
===== Interactive MCP Chat =====
Type 'exit' or 'quit' to end the conversation
Type 'clear' to clear conversation history
==================================
"#;

/// One conversational turn against the model, plus history control.
#[async_trait]
pub trait TurnRunner {
    async fn run_turn(&mut self, input: &str) -> Result<String>;
    fn clear_history(&mut self);
}

/// Tool-server sessions that must be torn down when the chat ends.
#[async_trait]
pub trait SessionManager {
    async fn has_open_sessions(&self) -> bool;
    async fn close_all(&self) -> Result<()>;
}

#[async_trait]
impl TurnRunner for McpAgent {
    async fn run_turn(&mut self, input: &str) -> Result<String> {
        Ok(self.run(input).await?)
    }

    fn clear_history(&mut self) {
        self.clear_conversation_history();
    }
}

#[async_trait]
impl SessionManager for McpClient {
    async fn has_open_sessions(&self) -> bool {
        self.has_sessions().await
    }

    async fn close_all(&self) -> Result<()> {
        self.close_all_sessions().await?;
        Ok(())
    }
}

enum Command<'a> {
    Exit,
    Clear,
    Say(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit") {
            Command::Exit
        } else if trimmed.eq_ignore_ascii_case("clear") {
            Command::Clear
        } else {
            Command::Say(line)
        }
    }
}

enum Turn {
    Continue,
    Quit,
}

/// Run the interactive chat, then tear down any open tool-server sessions.
///
/// Teardown runs whether the loop ended on an exit command or on a failure
/// escaping it, and only when at least one session is open.
pub async fn run<A, S>(mut agent: A, sessions: &S) -> Result<()>
where
    A: TurnRunner,
    S: SessionManager,
{
    let result = interactive_loop(&mut agent).await;
    close_open_sessions(sessions).await;
    result
}

/// Line-edited chat loop on the terminal.
async fn interactive_loop<A>(agent: &mut A) -> Result<()>
where
    A: TurnRunner,
{
    println!("{}", BANNER);

    let rl_config = RlConfig::builder().auto_add_history(true).build();
    let mut rl = DefaultEditor::with_config(rl_config)?;
    let mut out = std::io::stdout();

    loop {
        match rl.readline("\nYou: ") {
            Ok(line) => {
                if let Turn::Quit = dispatch(agent, &line, &mut out).await? {
                    return Ok(());
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Ending conversation...");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Act on one input line. `Turn::Quit` ends the loop.
async fn dispatch<A, W>(agent: &mut A, entry: &str, out: &mut W) -> Result<Turn>
where
    A: TurnRunner,
    W: Write,
{
    match Command::parse(entry) {
        Command::Exit => {
            writeln!(out, "Ending conversation...")?;
            return Ok(Turn::Quit);
        }
        Command::Clear => {
            agent.clear_history();
            writeln!(out, "Conversation history cleared.")?;
        }
        Command::Say(text) => {
            write!(out, "\nAssistant: ")?;
            out.flush()?;
            match agent.run_turn(text).await {
                Ok(response) => writeln!(out, "{}", response)?,
                Err(e) => writeln!(out, "\nError: {}", e)?,
            }
        }
    }
    Ok(Turn::Continue)
}

/// Tear down any open tool-server sessions. Failures are logged, not raised.
async fn close_open_sessions<S>(sessions: &S)
where
    S: SessionManager,
{
    if sessions.has_open_sessions().await {
        if let Err(e) = sessions.close_all().await {
            warn!("Failed to close tool-server sessions: {}", e);
        }
    }
}

/// Scenario harness mirroring `run`: the same dispatch and teardown, driven
/// by an in-memory reader and writer instead of the line editor.
#[cfg(test)]
async fn run_session<A, S, R, W>(
    agent: &mut A,
    sessions: &S,
    input: &mut R,
    out: &mut W,
) -> Result<()>
where
    A: TurnRunner,
    S: SessionManager,
    R: std::io::BufRead,
    W: Write,
{
    let result = chat_loop(agent, input, out).await;
    close_open_sessions(sessions).await;
    result
}

#[cfg(test)]
async fn chat_loop<A, R, W>(agent: &mut A, input: &mut R, out: &mut W) -> Result<()>
where
    A: TurnRunner,
    R: std::io::BufRead,
    W: Write,
{
    writeln!(out, "{}", BANNER)?;

    let mut line = String::new();
    loop {
        write!(out, "\nYou: ")?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            // End of input behaves like an exit command.
            writeln!(out, "Ending conversation...")?;
            return Ok(());
        }
        let entry = line.trim_end_matches(['\r', '\n']);

        if let Turn::Quit = dispatch(agent, entry, out).await? {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct ScriptedRunner {
        responses: VecDeque<Result<String>>,
        turns: Vec<String>,
        clears: usize,
    }

    impl ScriptedRunner {
        fn with_responses(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: responses.into_iter().collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl TurnRunner for ScriptedRunner {
        async fn run_turn(&mut self, input: &str) -> Result<String> {
            self.turns.push(input.to_string());
            self.responses.pop_front().unwrap_or(Ok("ok".to_string()))
        }

        fn clear_history(&mut self) {
            self.clears += 1;
        }
    }

    #[derive(Default)]
    struct MockSessions {
        open: AtomicBool,
        closes: AtomicUsize,
        fail_close: bool,
    }

    impl MockSessions {
        fn with_open_sessions() -> Self {
            Self {
                open: AtomicBool::new(true),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl SessionManager for MockSessions {
        async fn has_open_sessions(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        async fn close_all(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.open.store(false, Ordering::SeqCst);
            if self.fail_close {
                return Err(anyhow!("close failed"));
            }
            Ok(())
        }
    }

    struct FailingReader;

    impl std::io::Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "stdin closed unexpectedly",
            ))
        }
    }

    impl std::io::BufRead for FailingReader {
        fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
            Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "stdin closed unexpectedly",
            ))
        }

        fn consume(&mut self, _amt: usize) {}
    }

    async fn drive(
        agent: &mut ScriptedRunner,
        sessions: &MockSessions,
        script: &str,
    ) -> (String, Result<()>) {
        let mut input = Cursor::new(script.as_bytes().to_vec());
        let mut out = Vec::new();
        let result = run_session(agent, sessions, &mut input, &mut out).await;
        (String::from_utf8(out).unwrap(), result)
    }

    #[test]
    fn test_command_parsing() {
        assert!(matches!(Command::parse("exit"), Command::Exit));
        assert!(matches!(Command::parse("QUIT"), Command::Exit));
        assert!(matches!(Command::parse("  Exit  "), Command::Exit));
        assert!(matches!(Command::parse("Clear"), Command::Clear));
        assert!(matches!(Command::parse(""), Command::Say("")));
        assert!(matches!(Command::parse("   "), Command::Say("   ")));
        assert!(matches!(Command::parse("hello"), Command::Say("hello")));
        assert!(matches!(
            Command::parse("exit the building"),
            Command::Say("exit the building")
        ));
    }

    #[tokio::test]
    async fn test_exit_and_quit_end_the_loop() {
        for script in ["exit\n", "QUIT\n", "  quit  \n"] {
            let mut agent = ScriptedRunner::default();
            let sessions = MockSessions::with_open_sessions();
            let (output, result) = drive(&mut agent, &sessions, script).await;

            assert!(result.is_ok());
            assert!(output.contains("Ending conversation..."));
            assert!(agent.turns.is_empty());
            assert_eq!(sessions.closes.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_clear_then_exit() {
        let mut agent = ScriptedRunner::default();
        let sessions = MockSessions::with_open_sessions();
        let (output, result) = drive(&mut agent, &sessions, "clear\nexit\n").await;

        assert!(result.is_ok());
        let cleared = output.find("Conversation history cleared.").unwrap();
        let ended = output.find("Ending conversation...").unwrap();
        assert!(cleared < ended);
        assert_eq!(agent.clears, 1);
        assert!(agent.turns.is_empty());
        assert_eq!(sessions.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_turn_prints_assistant_response() {
        let mut agent = ScriptedRunner::with_responses(vec![Ok("Sunny".to_string())]);
        let sessions = MockSessions::with_open_sessions();
        let (output, result) =
            drive(&mut agent, &sessions, "What's the weather?\nquit\n").await;

        assert!(result.is_ok());
        let answered = output.find("\nAssistant: Sunny\n").unwrap();
        let ended = output.find("Ending conversation...").unwrap();
        assert!(answered < ended);
        assert_eq!(agent.turns, vec!["What's the weather?".to_string()]);
        assert_eq!(sessions.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_raw_input_reaches_the_agent() {
        let mut agent = ScriptedRunner::default();
        let sessions = MockSessions::default();
        let (_, result) = drive(&mut agent, &sessions, "  spaces matter  \nexit\n").await;

        assert!(result.is_ok());
        assert_eq!(agent.turns, vec!["  spaces matter  ".to_string()]);
    }

    #[tokio::test]
    async fn test_blank_line_is_forwarded_to_the_agent() {
        let mut agent = ScriptedRunner::default();
        let sessions = MockSessions::default();
        let (output, result) = drive(&mut agent, &sessions, "\nexit\n").await;

        assert!(result.is_ok());
        assert_eq!(agent.turns, vec![String::new()]);
        assert!(output.contains("\nAssistant: ok"));
    }

    #[tokio::test]
    async fn test_turn_error_is_printed_and_loop_continues() {
        let mut agent = ScriptedRunner::with_responses(vec![
            Err(anyhow!("model unavailable")),
            Ok("recovered".to_string()),
        ]);
        let sessions = MockSessions::with_open_sessions();
        let (output, result) = drive(&mut agent, &sessions, "first\nsecond\nexit\n").await;

        assert!(result.is_ok());
        assert!(output.contains("\nError: model unavailable"));
        assert!(output.contains("recovered"));
        assert_eq!(agent.turns.len(), 2);
        assert_eq!(sessions.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_teardown_skipped_without_open_sessions() {
        let mut agent = ScriptedRunner::default();
        let sessions = MockSessions::default();
        let (output, result) = drive(&mut agent, &sessions, "quit\n").await;

        assert!(result.is_ok());
        assert!(output.contains("Ending conversation..."));
        assert_eq!(sessions.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_eof_ends_the_session_with_cleanup() {
        let mut agent = ScriptedRunner::default();
        let sessions = MockSessions::with_open_sessions();
        let (output, result) = drive(&mut agent, &sessions, "hello\n").await;

        assert!(result.is_ok());
        assert!(output.contains("Ending conversation..."));
        assert_eq!(agent.turns, vec!["hello".to_string()]);
        assert_eq!(sessions.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_read_failure_still_closes_sessions() {
        let mut agent = ScriptedRunner::default();
        let sessions = MockSessions::with_open_sessions();
        let mut input = FailingReader;
        let mut out = Vec::new();
        let result = run_session(&mut agent, &sessions, &mut input, &mut out).await;

        assert!(result.is_err());
        assert_eq!(sessions.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_teardown_failure_does_not_mask_a_clean_exit() {
        let mut agent = ScriptedRunner::default();
        let sessions = MockSessions {
            open: AtomicBool::new(true),
            fail_close: true,
            ..Default::default()
        };
        let (_, result) = drive(&mut agent, &sessions, "exit\n").await;

        assert!(result.is_ok());
        assert_eq!(sessions.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_banner_opens_the_session() {
        let mut agent = ScriptedRunner::default();
        let sessions = MockSessions::default();
        let (output, _) = drive(&mut agent, &sessions, "exit\n").await;

        assert!(output.starts_with("\n===== Interactive MCP Chat =====\n"));
        assert!(output.contains("Type 'exit' or 'quit' to end the conversation"));
        assert!(output.contains("Type 'clear' to clear conversation history"));
    }
}
