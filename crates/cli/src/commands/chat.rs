use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::commands::{load_config, runtime, CommandResult};
use echelon_core::config::{AppConfig, LoadOptions};
use echelon_core::domain::message::{InboundEvent, OutboundMessage};
use echelon_db::repositories::{
    SqlConversationRepository, SqlEmployeeRepository, SqlLeaveApplicationRepository,
};
use echelon_db::{connect_from_config, migrations};
use echelon_whatsapp::{
    replies, ConversationStore, Delivery, EmployeeLookup, EventPump, IntentRouter,
    RecordingGateway, RouterSettings,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChatSummary {
    pub messages: usize,
    pub replies: usize,
}

/// One terminal line as the bot would receive it.
#[derive(Debug, PartialEq, Eq)]
enum ChatLine {
    Event(InboundEvent),
    Quit,
    Skip,
}

fn parse_line(sender: &str, line: &str) -> ChatLine {
    let line = line.trim();
    if line.is_empty() {
        return ChatLine::Skip;
    }
    if line == "/quit" {
        return ChatLine::Quit;
    }
    match line.strip_prefix("/button ") {
        Some(button_id) => ChatLine::Event(InboundEvent::button(sender, button_id.trim())),
        None => ChatLine::Event(InboundEvent::text(sender, line)),
    }
}

/// Reads lines from `input` until EOF or `/quit`, writing each bot reply to `output`.
/// With `show_payload`, each reply is followed by its Cloud API request body.
pub async fn run_session<R, W>(
    config: &AppConfig,
    sender: &str,
    show_payload: bool,
    input: R,
    output: &mut W,
) -> Result<ChatSummary>
where
    R: BufRead,
    W: Write,
{
    let pool = connect_from_config(&config.database).await.context("database connection")?;
    migrations::run_pending(&pool).await.context("database migrations")?;

    let conversations = Arc::new(SqlConversationRepository::new(pool.clone()));
    let store = ConversationStore::new(conversations)
        .with_session_timeout(config.flow.session_timeout());
    let lookup = EmployeeLookup::with_suffix_len(
        Arc::new(SqlEmployeeRepository::new(pool.clone())),
        config.lookup.sender_suffix_len,
    );
    let router = IntentRouter::new(
        store,
        lookup,
        Arc::new(SqlLeaveApplicationRepository::new(pool.clone())),
        RouterSettings::from_config(config),
    );
    let gateway = RecordingGateway::default();
    let pump = EventPump::new(Arc::new(router), Arc::new(gateway.clone()));

    let mut summary = ChatSummary::default();
    for line in input.lines() {
        let line = line.context("reading chat input")?;
        let event = match parse_line(sender, &line) {
            ChatLine::Event(event) => event,
            ChatLine::Quit => break,
            ChatLine::Skip => continue,
        };

        summary.messages += 1;
        match pump.process(event).await {
            Delivery::Sent => {
                for message in gateway.take_sent() {
                    write_reply(output, &message, show_payload)?;
                    summary.replies += 1;
                }
            }
            Delivery::Ignored => writeln!(output, "(duplicate ignored)")?,
            Delivery::RouteFailed(failure) => writeln!(
                output,
                "(no reply: {} ref {})",
                failure.user_message(),
                failure.correlation_id()
            )?,
            Delivery::SendFailed(failure) => writeln!(
                output,
                "(reply not delivered: {failure} ref {})",
                failure.correlation_id()
            )?,
        }
        output.flush()?;
    }

    pool.close().await;
    Ok(summary)
}

fn write_reply<W: Write>(
    output: &mut W,
    message: &OutboundMessage,
    show_payload: bool,
) -> io::Result<()> {
    for line in message.text.lines() {
        writeln!(output, "bot> {line}")?;
    }
    for button in message.buttons.as_deref().unwrap_or_default() {
        writeln!(output, "     [{}] {}", button.id, button.label)?;
    }
    if show_payload {
        writeln!(output, "wire> {}", replies::cloud_api_payload(message))?;
    }
    Ok(())
}

pub fn run(options: LoadOptions, sender: &str, show_payload: bool) -> CommandResult {
    let config = match load_config("chat", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("chat") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let session = run_session(&config, sender, show_payload, stdin.lock(), &mut stdout);
    match runtime.block_on(session) {
        Ok(summary) => CommandResult::success(
            "chat",
            format!(
                "session ended after {} messages and {} replies",
                summary.messages, summary.replies
            ),
        ),
        Err(error) => CommandResult::failure("chat", "chat_session", format!("{error:#}"), 4),
    }
}

#[cfg(test)]
mod tests {
    use echelon_core::domain::conversation::SenderId;
    use echelon_core::domain::message::{InboundEvent, OutboundMessage};

    use super::{parse_line, write_reply, ChatLine};

    #[test]
    fn button_lines_become_button_events() {
        assert_eq!(
            parse_line("263771234567", "/button Apply"),
            ChatLine::Event(InboundEvent::button("263771234567", "Apply"))
        );
        assert_eq!(
            parse_line("263771234567", "  start 24 January 2025 "),
            ChatLine::Event(InboundEvent::text("263771234567", "start 24 January 2025"))
        );
    }

    #[test]
    fn blank_and_quit_lines_are_control() {
        assert_eq!(parse_line("X", "   "), ChatLine::Skip);
        assert_eq!(parse_line("X", "/quit"), ChatLine::Quit);
    }

    #[test]
    fn payload_lines_follow_the_reply_when_requested() {
        let message = OutboundMessage {
            recipient: SenderId::new("263771234567"),
            text: "Your leave balance is 10 days.".to_owned(),
            buttons: None,
        };

        let mut plain = Vec::new();
        write_reply(&mut plain, &message, false).expect("write");
        let plain = String::from_utf8(plain).expect("utf8");
        assert_eq!(plain, "bot> Your leave balance is 10 days.\n");

        let mut wired = Vec::new();
        write_reply(&mut wired, &message, true).expect("write");
        let wired = String::from_utf8(wired).expect("utf8");
        let payload = wired
            .lines()
            .find_map(|line| line.strip_prefix("wire> "))
            .expect("payload line");
        let payload: serde_json::Value = serde_json::from_str(payload).expect("json payload");
        assert_eq!(payload["type"], "text");
        assert_eq!(payload["to"], "263771234567");
        assert_eq!(payload["text"]["body"], "Your leave balance is 10 days.");
    }
}
