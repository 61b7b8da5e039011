//! Discussion reconstruction: merge the newest memories with the
//! still-unsummarized chat tail into one chronologically ordered view.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::memory_db::MemoryDatabase;

/// One message of the reconstructed view. Memories render as assistant
/// messages with `memory: true`, stamped with the timestamp of the last chat
/// row they cover so they sort correctly against the raw tail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionMessage {
    pub id: i64,
    pub role: String,
    pub persona: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub memory: bool,
}

/// Rebuild the user's visible conversation: the most recent `memory_limit`
/// memories in chronological order, then every unsummarized non-system row
/// with a timestamp strictly after the newest memory's anchor. The cutoff
/// keeps a row from appearing both inside a summary and verbatim in the tail.
pub fn reconstruct_discussion(
    db: &MemoryDatabase,
    user_id: i64,
    memory_limit: usize,
) -> anyhow::Result<Vec<DiscussionMessage>> {
    let mut memories = db.memories.recent_memories(user_id, memory_limit)?;
    memories.reverse();

    let cutoff = memories.last().map(|m| m.last_entry_at);
    let tail = db.chat_log.unsummarized_display_tail(user_id, cutoff)?;

    let mut messages = Vec::with_capacity(memories.len() + tail.len());
    for memory in memories {
        messages.push(DiscussionMessage {
            id: memory.id,
            role: "assistant".to_string(),
            persona: "memory".to_string(),
            content: memory.content,
            timestamp: memory.last_entry_at,
            memory: true,
        });
    }
    for entry in tail {
        messages.push(DiscussionMessage {
            id: entry.id,
            role: entry.role,
            persona: entry.persona,
            content: entry.content,
            timestamp: entry.timestamp,
            memory: false,
        });
    }

    debug!("Reconstructed {} messages for user {}", messages.len(), user_id);
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_db::NewMemory;
    use crate::memory_db::chat_log_store::{ROLE_ASSISTANT, ROLE_SYSTEM, ROLE_USER};
    use chrono::Duration;

    fn seed(db: &MemoryDatabase) -> i64 {
        db.users.create_user("alice", "pw").unwrap().id
    }

    #[test]
    fn empty_history_reconstructs_to_nothing() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        let user_id = seed(&db);
        assert!(reconstruct_discussion(&db, user_id, 10).unwrap().is_empty());
    }

    #[test]
    fn memories_precede_the_tail_in_chronological_order() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        let user_id = seed(&db);
        let base = Utc::now() - Duration::hours(2);

        // Two summarized windows, then a raw tail.
        for w in 0..2i64 {
            let mut last = 0;
            let mut last_ts = base;
            for i in 0..4i64 {
                let ts = base + Duration::minutes(w * 10 + i);
                let role = if i % 2 == 0 { ROLE_USER } else { ROLE_ASSISTANT };
                last = db.chat_log.append(user_id, "Pixel", role, &format!("w{} m{}", w, i), ts).unwrap();
                last_ts = ts;
            }
            db.persist_window(&NewMemory {
                user_id,
                first_chat_log_id: last - 3,
                last_chat_log_id: last,
                content: format!("window {}", w),
                keywords: vec![],
                last_entry_at: last_ts,
            })
            .unwrap();
        }
        db.chat_log
            .append(user_id, "Pixel", ROLE_USER, "fresh", base + Duration::minutes(30))
            .unwrap();
        db.chat_log
            .append(user_id, "Pixel", ROLE_SYSTEM, "hidden", base + Duration::minutes(31))
            .unwrap();

        let view = reconstruct_discussion(&db, user_id, 10).unwrap();
        assert_eq!(view.len(), 3);
        assert!(view[0].memory && view[1].memory && !view[2].memory);
        assert_eq!(view[0].content, "window 0");
        assert_eq!(view[1].content, "window 1");
        assert_eq!(view[2].content, "fresh");
        assert!(view.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(view.iter().all(|m| m.role != ROLE_SYSTEM));
    }

    #[test]
    fn tail_rows_at_or_before_the_anchor_are_suppressed() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        let user_id = seed(&db);
        let base = Utc::now() - Duration::hours(1);

        let a = db.chat_log.append(user_id, "Pixel", ROLE_USER, "covered", base).unwrap();
        let b = db
            .chat_log
            .append(user_id, "Pixel", ROLE_ASSISTANT, "also covered", base + Duration::minutes(1))
            .unwrap();
        // A stale row sharing the anchor timestamp but never summarized: the
        // strict cutoff keeps it out rather than risking duplication.
        db.chat_log
            .append(user_id, "Pixel", ROLE_USER, "stale", base + Duration::minutes(1))
            .unwrap();
        db.chat_log
            .append(user_id, "Pixel", ROLE_USER, "new", base + Duration::minutes(2))
            .unwrap();

        db.persist_window(&NewMemory {
            user_id,
            first_chat_log_id: a,
            last_chat_log_id: b,
            content: "the summary".to_string(),
            keywords: vec![],
            last_entry_at: base + Duration::minutes(1),
        })
        .unwrap();

        let view = reconstruct_discussion(&db, user_id, 10).unwrap();
        let contents: Vec<&str> = view.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["the summary", "new"]);
    }

    #[test]
    fn memory_limit_keeps_only_the_newest_windows() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        let user_id = seed(&db);
        let base = Utc::now() - Duration::hours(1);

        for w in 0..4i64 {
            let ts = base + Duration::minutes(w);
            let id = db.chat_log.append(user_id, "Pixel", ROLE_USER, "x", ts).unwrap();
            db.persist_window(&NewMemory {
                user_id,
                first_chat_log_id: id,
                last_chat_log_id: id,
                content: format!("window {}", w),
                keywords: vec![],
                last_entry_at: ts,
            })
            .unwrap();
        }

        let view = reconstruct_discussion(&db, user_id, 2).unwrap();
        let contents: Vec<&str> = view.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["window 2", "window 3"]);
    }
}
