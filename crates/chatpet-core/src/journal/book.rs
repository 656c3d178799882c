//! Sled tree of journal entries, keyed `journal/{user_key}/{created_at_ms}-{entry_id}`.

use super::JournalEntry;
use crate::error::JournalError;

const TREE_NAME: &str = "journal_entries";

/// Append-only journal storage. Keys sort by creation time within a user.
#[derive(Clone)]
pub struct JournalBook {
    tree: sled::Tree,
}

impl JournalBook {
    pub(crate) fn open(db: &sled::Db) -> Result<Self, sled::Error> {
        Ok(Self {
            tree: db.open_tree(TREE_NAME)?,
        })
    }

    fn prefix(user_key: &str) -> String {
        format!("journal/{}/", user_key)
    }

    fn key(entry: &JournalEntry) -> String {
        format!(
            "{}{:013}-{}",
            Self::prefix(&entry.user_key),
            entry.created_at_ms.max(0),
            entry.entry_id
        )
    }

    pub fn append(&self, entry: &JournalEntry) -> Result<(), JournalError> {
        let bytes = serde_json::to_vec(entry)?;
        self.tree.insert(Self::key(entry).as_bytes(), bytes)?;
        tracing::info!(
            target: "chatpet::journal",
            user_key = %entry.user_key,
            entry_id = %entry.entry_id,
            action = "INSERT",
            "Journal entry saved for '{}'",
            entry.user_key
        );
        Ok(())
    }

    /// All entries for `user_key`, newest first. Unreadable records are skipped.
    pub fn entries(&self, user_key: &str) -> Result<Vec<JournalEntry>, JournalError> {
        let mut out = Vec::new();
        for item in self.tree.scan_prefix(Self::prefix(user_key)).rev() {
            let (key, value) = item?;
            match serde_json::from_slice::<JournalEntry>(&value) {
                Ok(entry) => out.push(entry),
                Err(e) => tracing::warn!(
                    target: "chatpet::journal",
                    key = %String::from_utf8_lossy(&key),
                    error = %e,
                    "Skipping unreadable journal entry"
                ),
            }
        }
        Ok(out)
    }

    /// Text of the newest readable entry, or "" when there is none.
    pub fn latest_text(&self, user_key: &str) -> Result<String, JournalError> {
        Ok(self
            .entries(user_key)?
            .into_iter()
            .next()
            .map(|e| e.text)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::SledProfileStore;
    use uuid::Uuid;

    fn entry(user_key: &str, at: i64, text: &str) -> JournalEntry {
        JournalEntry {
            entry_id: Uuid::new_v4(),
            user_key: user_key.to_string(),
            date: "March 03, 2025".to_string(),
            time: "09:15 PM".to_string(),
            text: text.to_string(),
            created_at_ms: at,
        }
    }

    #[test]
    fn entries_come_back_newest_first_per_user() {
        let dir = tempfile::tempdir().unwrap();
        let book = SledProfileStore::open_path(dir.path()).unwrap().journal_book().unwrap();
        book.append(&entry("al", 2_000, "second")).unwrap();
        book.append(&entry("al", 1_000, "first")).unwrap();
        book.append(&entry("alice", 3_000, "someone else")).unwrap();

        let texts: Vec<String> = book.entries("al").unwrap().into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["second", "first"]);
        assert_eq!(book.latest_text("al").unwrap(), "second");
        assert_eq!(book.entries("alice").unwrap().len(), 1);
    }

    #[test]
    fn empty_book_has_no_latest_text() {
        let dir = tempfile::tempdir().unwrap();
        let book = SledProfileStore::open_path(dir.path()).unwrap().journal_book().unwrap();
        assert!(book.entries("nobody").unwrap().is_empty());
        assert_eq!(book.latest_text("nobody").unwrap(), "");
    }

    #[test]
    fn unreadable_record_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let book = SledProfileStore::open_path(dir.path()).unwrap().journal_book().unwrap();
        book.append(&entry("u", 1_000, "kept")).unwrap();
        book.tree
            .insert("journal/u/0000000002000-garbage".as_bytes(), b"{oops".as_slice())
            .unwrap();

        assert_eq!(book.latest_text("u").unwrap(), "kept");
    }
}
