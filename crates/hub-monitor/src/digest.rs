//! Summary text: backend prompts and the deterministic degraded digest.
//!
//! All functions take messages in chronological order.

use std::collections::HashMap;
use std::fmt::Write;

use hub_store::MessageRow;

pub const DEGRADED_HEADER: &str = "**Topic Summary (degraded)**";
pub const NO_ACTIVITY: &str = "No activity to summarize.";

/// Why a summary was written without the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DegradedReason {
    NoBackend,
    BackendFailed(&'static str),
}

pub fn full_history_prompt(messages: &[MessageRow]) -> String {
    let mut prompt = String::from("Here is a recent conversation from a message board topic:\n\n");
    write_transcript(&mut prompt, messages);
    prompt.push_str("\nPlease provide a concise summary covering:\n");
    prompt.push_str("1. What was discussed?\n");
    prompt.push_str("2. Current status or consensus\n");
    prompt.push_str("3. Next steps or action items\n\n");
    prompt.push_str("Format the response with clear sections and bullet points.");
    prompt
}

pub fn incremental_prompt(previous: &str, messages: &[MessageRow]) -> String {
    let mut prompt = String::from("You are maintaining a summary of a message board conversation.\n\n");
    prompt.push_str("** Previous Summary **\n");
    prompt.push_str(previous);
    prompt.push_str("\n\n** New Messages **\n");
    write_transcript(&mut prompt, messages);
    prompt.push_str("\n** Task **\n");
    prompt.push_str("Update the summary to incorporate the new messages. ");
    prompt.push_str("Keep the structure and important information of the previous summary ");
    prompt.push_str("and add new decisions or action items. Keep it concise and well organized.");
    prompt
}

fn write_transcript(out: &mut String, messages: &[MessageRow]) {
    for (i, msg) in messages.iter().enumerate() {
        let _ = writeln!(out, "[{}] {}: {}", i + 1, msg.sender, msg.content);
    }
}

/// Wrap backend output with a header naming the backend.
pub fn backend_summary(backend: &str, text: &str) -> String {
    format!("**Topic Summary ({backend})**\n\n{}", text.trim())
}

/// Message count and per-sender tally. Senders are listed by count, then
/// name, so the same input always yields the same text.
pub fn degraded_digest(messages: &[MessageRow], reason: DegradedReason) -> String {
    let mut tally: HashMap<&str, usize> = HashMap::new();
    for msg in messages {
        *tally.entry(msg.sender.as_str()).or_default() += 1;
    }
    let mut senders: Vec<(&str, usize)> = tally.into_iter().collect();
    senders.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut out = format!("{DEGRADED_HEADER}\n\n");
    let _ = writeln!(out, "Activity: {} messages", messages.len());
    if !senders.is_empty() {
        out.push_str("Participants:\n");
        for (sender, count) in senders {
            let noun = if count == 1 { "message" } else { "messages" };
            let _ = writeln!(out, "  - {sender}: {count} {noun}");
        }
    }
    out.push('\n');
    match reason {
        DegradedReason::NoBackend => out.push_str(
            "[Summarization backend not configured. Set HUB_MASTER_API_KEY or GEMINI_API_KEY to enable full summaries.]",
        ),
        DegradedReason::BackendFailed(kind) => {
            let _ = write!(out, "[Summarization backend failed ({kind}); counts only.]");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::ids::{MessageId, TopicId};

    fn msg(id: i64, sender: &str, content: &str) -> MessageRow {
        MessageRow {
            id: MessageId::from_raw(id),
            topic_id: TopicId::from_raw(1),
            sender: sender.into(),
            content: content.into(),
            created_at: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn digest_tallies_senders_deterministically() {
        let messages = vec![
            msg(1, "bob", "a"),
            msg(2, "alice", "b"),
            msg(3, "carol", "c"),
            msg(4, "alice", "d"),
            msg(5, "bob", "e"),
            msg(6, "alice", "f"),
        ];
        let digest = degraded_digest(&messages, DegradedReason::NoBackend);
        assert!(digest.starts_with(DEGRADED_HEADER));
        assert!(digest.contains("Activity: 6 messages"));
        let alice = digest.find("alice: 3 messages").unwrap();
        let bob = digest.find("bob: 2 messages").unwrap();
        let carol = digest.find("carol: 1 message").unwrap();
        assert!(alice < bob && bob < carol);
        assert_eq!(digest, degraded_digest(&messages, DegradedReason::NoBackend));
    }

    #[test]
    fn digest_names_failure_kind() {
        let digest = degraded_digest(&[msg(1, "a", "x")], DegradedReason::BackendFailed("timeout"));
        assert!(digest.contains("failed (timeout)"));
    }

    #[test]
    fn empty_digest() {
        let digest = degraded_digest(&[], DegradedReason::NoBackend);
        assert!(digest.contains("Activity: 0 messages"));
        assert!(!digest.contains("Participants"));
    }

    #[test]
    fn prompts_number_messages_in_order() {
        let messages = vec![msg(7, "alice", "first"), msg(9, "bob", "second")];
        let full = full_history_prompt(&messages);
        assert!(full.contains("[1] alice: first\n[2] bob: second\n"));
        assert!(full.contains("Next steps"));

        let inc = incremental_prompt("old summary", &messages[1..]);
        assert!(inc.contains("** Previous Summary **\nold summary"));
        assert!(inc.contains("[1] bob: second"));
        assert!(!inc.contains("alice"));
    }

    #[test]
    fn backend_header() {
        let text = backend_summary("gemini", "  body\n");
        assert_eq!(text, "**Topic Summary (gemini)**\n\nbody");
        assert!(!text.starts_with(DEGRADED_HEADER));
    }
}
