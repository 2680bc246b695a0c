use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::models::{Chat, ChatDraft, ChatSummary};

// ── Key/value state ──────────────────────────────────────────────────────────

/// Application-owned state keyed by string: live sessions, memoized problems.
pub trait KeyValueStore<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;
    fn put(&self, key: &str, value: V);
    fn evict(&self, key: &str) -> Option<V>;
    /// Apply `apply` to the stored value under the store's lock and return the
    /// updated copy. Missing keys are left missing.
    fn update(&self, key: &str, apply: &mut dyn FnMut(&mut V)) -> Option<V>;
}

pub struct MemoryStore<V> {
    entries: RwLock<HashMap<String, V>>,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync> KeyValueStore<V> for MemoryStore<V> {
    fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn put(&self, key: &str, value: V) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value);
    }

    fn evict(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key)
    }

    fn update(&self, key: &str, apply: &mut dyn FnMut(&mut V)) -> Option<V> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let value = entries.get_mut(key)?;
        apply(value);
        Some(value.clone())
    }
}

// ── Chat persistence ─────────────────────────────────────────────────────────

pub trait ChatStore: Send + Sync {
    /// Insert or update the chat for this problem on the draft's calendar day.
    /// Returns the chat id.
    fn save(&self, draft: ChatDraft) -> String;
    /// Most recently updated first.
    fn recent(&self, limit: usize) -> Vec<Chat>;
    fn get(&self, id: &str) -> Option<Chat>;
    fn delete(&self, id: &str) -> bool;
}

#[derive(Default)]
pub struct MemoryChatStore {
    chats: RwLock<HashMap<String, Chat>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatStore for MemoryChatStore {
    fn save(&self, draft: ChatDraft) -> String {
        let mut chats = self.chats.write().unwrap_or_else(PoisonError::into_inner);

        let day = draft.timestamp.date_naive();
        let existing = chats
            .values()
            .find(|c| c.problem_url == draft.problem_url && c.timestamp.date_naive() == day)
            .map(|c| c.id.clone());

        let id = existing
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let chat = Chat {
            id: id.clone(),
            problem_url: draft.problem_url,
            problem_title: draft.problem.title.clone(),
            difficulty: draft.problem.difficulty.clone(),
            timestamp: draft.timestamp,
            last_updated: draft.timestamp,
            proficiency: draft.proficiency,
            summary: ChatSummary::from_messages(&draft.messages),
            messages: draft.messages,
            problem: draft.problem,
        };
        chats.insert(id.clone(), chat);

        if existing.is_some() {
            tracing::debug!(chat_id = %id, "chat updated");
        } else {
            tracing::debug!(chat_id = %id, "chat created");
        }
        id
    }

    fn recent(&self, limit: usize) -> Vec<Chat> {
        let chats = self.chats.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<Chat> = chats.values().cloned().collect();
        list.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        list.truncate(limit);
        list
    }

    fn get(&self, id: &str) -> Option<Chat> {
        let chats = self.chats.read().unwrap_or_else(PoisonError::into_inner);
        chats.get(id).cloned()
    }

    fn delete(&self, id: &str) -> bool {
        let mut chats = self.chats.write().unwrap_or_else(PoisonError::into_inner);
        chats.remove(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Local, TimeZone};

    use super::*;
    use crate::models::{ChatMessage, NormalizedDescription, Problem, Proficiency};

    fn problem(slug: &str) -> Problem {
        Problem {
            question_id: "1".into(),
            url: format!("https://leetcode.com/problems/{}/", slug),
            title_slug: slug.into(),
            title: slug.replace('-', " "),
            difficulty: "Easy".into(),
            topic_tags: Vec::new(),
            description: NormalizedDescription::default(),
            examples: Vec::new(),
            similar_questions: Vec::new(),
            raw_html: String::new(),
        }
    }

    fn draft(slug: &str, at: DateTime<Local>, messages: Vec<ChatMessage>) -> ChatDraft {
        let problem = problem(slug);
        ChatDraft {
            timestamp: at,
            problem_url: problem.url.clone(),
            proficiency: Proficiency::Intermediate,
            messages,
            problem,
        }
    }

    fn noon(day: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn memory_store_get_put_evict() {
        let store: MemoryStore<String> = MemoryStore::new();
        assert_eq!(store.get("k"), None);

        store.put("k", "v1".to_string());
        store.put("k", "v2".to_string());
        assert_eq!(store.get("k").as_deref(), Some("v2"));

        assert_eq!(store.evict("k").as_deref(), Some("v2"));
        assert_eq!(store.get("k"), None);
        assert_eq!(store.evict("k"), None);
    }

    #[test]
    fn memory_store_update_applies_in_place() {
        let store: MemoryStore<Vec<u32>> = MemoryStore::new();
        assert_eq!(store.update("k", &mut |v: &mut Vec<u32>| v.push(1)), None);
        assert_eq!(store.get("k"), None);

        store.put("k", vec![0]);
        assert_eq!(store.update("k", &mut |v: &mut Vec<u32>| v.push(1)), Some(vec![0, 1]));
        store.update("k", &mut |v: &mut Vec<u32>| v.push(2));
        assert_eq!(store.get("k"), Some(vec![0, 1, 2]));
    }

    #[test]
    fn same_problem_same_day_updates_in_place() {
        let store = MemoryChatStore::new();
        let first = store.save(draft("two-sum", noon(1), vec![ChatMessage::assistant("Hi")]));
        let second = store.save(draft(
            "two-sum",
            noon(1) + Duration::hours(3),
            vec![
                ChatMessage::assistant("Hi"),
                ChatMessage::user("hint?"),
                ChatMessage::assistant("Think hash map."),
            ],
        ));

        assert_eq!(first, second);
        assert_eq!(store.recent(10).len(), 1);
        let chat = store.get(&first).unwrap();
        assert_eq!(chat.messages.len(), 3);
        assert_eq!(chat.summary.question_count, 1);
        assert_eq!(chat.problem_title, "two sum");
    }

    #[test]
    fn next_day_or_other_problem_creates_new_chat() {
        let store = MemoryChatStore::new();
        let a = store.save(draft("two-sum", noon(1), Vec::new()));
        let b = store.save(draft("two-sum", noon(2), Vec::new()));
        let c = store.save(draft("3sum", noon(2), Vec::new()));

        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(store.recent(10).len(), 3);
    }

    #[test]
    fn recent_orders_by_last_update_and_limits() {
        let store = MemoryChatStore::new();
        let old = store.save(draft("a", noon(1), Vec::new()));
        let newest = store.save(draft("b", noon(3), Vec::new()));
        let middle = store.save(draft("c", noon(2), Vec::new()));

        let ids: Vec<String> = store.recent(10).into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![newest.clone(), middle, old]);

        let top: Vec<String> = store.recent(1).into_iter().map(|c| c.id).collect();
        assert_eq!(top, vec![newest]);
    }

    #[test]
    fn delete_removes_chat() {
        let store = MemoryChatStore::new();
        let id = store.save(draft("two-sum", noon(1), Vec::new()));

        assert!(store.delete(&id));
        assert!(store.get(&id).is_none());
        assert!(!store.delete(&id));
    }
}
