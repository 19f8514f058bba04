use std::collections::HashSet;

use gemcrust_common::Sender;
use tracing::debug;

/// Set of senders permitted to use the bot.
///
/// An empty list allows everyone. Entries match a username (with or without
/// a leading `@`) or the numeric user id.
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    entries: HashSet<String>,
}

impl Allowlist {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('@').to_string())
            .filter(|e| !e.is_empty())
            .collect();
        Self { entries }
    }

    pub fn is_open(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn permits(&self, sender: &Sender) -> bool {
        if self.is_open() {
            return true;
        }
        let by_name = sender
            .username
            .as_deref()
            .is_some_and(|name| self.entries.contains(name));
        let allowed = by_name || self.entries.contains(&sender.user_id.to_string());
        if !allowed {
            debug!(user_id = sender.user_id, "sender not on allow-list");
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(id: u64, name: Option<&str>) -> Sender {
        Sender::new(id, name, "Someone")
    }

    #[test]
    fn empty_list_allows_everyone() {
        let list = Allowlist::new(Vec::<String>::new());
        assert!(list.is_open());
        assert!(list.permits(&sender(1, None)));
    }

    #[test]
    fn blank_entries_are_ignored() {
        let list = Allowlist::new(["", "   "]);
        assert!(list.is_open());
    }

    #[test]
    fn matches_username_exactly() {
        let list = Allowlist::new(["alice"]);
        assert!(list.permits(&sender(1, Some("alice"))));
        assert!(!list.permits(&sender(2, Some("alicex"))));
        assert!(!list.permits(&sender(3, Some("Alice"))));
        assert!(!list.permits(&sender(4, None)));
    }

    #[test]
    fn at_prefix_is_stripped() {
        let list = Allowlist::new(["@bob"]);
        assert!(list.permits(&sender(9, Some("bob"))));
    }

    #[test]
    fn matches_numeric_id() {
        let list = Allowlist::new(["123456"]);
        assert!(list.permits(&sender(123456, None)));
        assert!(!list.permits(&sender(654321, Some("123456x"))));
    }
}
