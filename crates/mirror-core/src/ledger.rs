//! Identity ledger: item id → filename of the attachment last materialized for it.
//!
//! Stored as a flat text table inside the export directory (`.zotero` by
//! default), one `id filename` line per entry, sorted by id so diffs stay
//! deterministic. The ledger is read once per run and replaced wholesale.

use crate::fs::{FileSystem, FsError};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger line {line} is malformed ({reason}): {content:?}")]
    Corrupt {
        line: usize,
        content: String,
        reason: &'static str,
    },

    #[error("Ledger is not valid UTF-8")]
    NotUtf8,

    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Persisted mapping from item id to filename (relative to the export directory).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: BTreeMap<String, String>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, file_name: impl Into<String>) {
        self.entries.insert(id.into(), file_name.into());
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlay `other` on top of this ledger; entries in `other` win.
    pub fn merge(&mut self, other: Ledger) {
        self.entries.extend(other.entries);
    }

    /// Parse the on-disk text form. Blank lines are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = BTreeMap::new();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            let corrupt = |reason| LedgerError::Corrupt {
                line: index + 1,
                content: raw.to_string(),
                reason,
            };

            let mut parts = line.split_whitespace();
            let (Some(id), Some(file_name), None) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(corrupt("expected `<id> <filename>`"));
            };

            if entries.insert(id.to_string(), file_name.to_string()).is_some() {
                return Err(corrupt("duplicate id"));
            }
        }

        Ok(Self { entries })
    }

    /// Serialize to the on-disk text form (sorted by id, trailing newline).
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for (id, file_name) in &self.entries {
            text.push_str(id);
            text.push(' ');
            text.push_str(file_name);
            text.push('\n');
        }
        text
    }
}

impl FromIterator<(String, String)> for Ledger {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Load the ledger at `path`.
///
/// A missing file is an empty ledger; an empty file is created in its place so
/// the path is always there to be staged.
pub async fn load<F: FileSystem>(fs: &F, path: &str) -> Result<Ledger> {
    if !fs.exists(path).await? {
        tracing::info!("No ledger at {}, starting empty", path);
        fs.write(path, b"").await?;
        return Ok(Ledger::new());
    }

    let bytes = fs.read(path).await?;
    let text = String::from_utf8(bytes).map_err(|_| LedgerError::NotUtf8)?;
    let ledger = Ledger::parse(&text)?;
    tracing::debug!("Loaded ledger with {} entries from {}", ledger.len(), path);
    Ok(ledger)
}

/// Overwrite the ledger at `path`.
pub async fn save<F: FileSystem>(fs: &F, path: &str, ledger: &Ledger) -> Result<()> {
    fs.write(path, ledger.to_text().as_bytes()).await?;
    tracing::debug!("Saved ledger with {} entries to {}", ledger.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;

    fn sample() -> Ledger {
        let mut ledger = Ledger::new();
        ledger.insert("ZZZ999", "jones19-later.pdf");
        ledger.insert("ABC123", "smith21-a-study-of-things.pdf");
        ledger
    }

    #[test]
    fn test_to_text_sorted_by_id() {
        assert_eq!(
            sample().to_text(),
            "ABC123 smith21-a-study-of-things.pdf\nZZZ999 jones19-later.pdf\n"
        );
    }

    #[test]
    fn test_parse_round_trip() {
        let ledger = sample();
        assert_eq!(Ledger::parse(&ledger.to_text()).unwrap(), ledger);
        assert_eq!(Ledger::parse("").unwrap(), Ledger::new());
    }

    #[test]
    fn test_parse_accepts_any_whitespace_and_blank_lines() {
        let text = "ABC123\tsmith21-a.pdf\n\n  ZZZ999   jones19-b.pdf  \n";
        let ledger = Ledger::parse(text).unwrap();
        assert_eq!(ledger.get("ABC123"), Some("smith21-a.pdf"));
        assert_eq!(ledger.get("ZZZ999"), Some("jones19-b.pdf"));
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        let err = Ledger::parse("ABC123 a.pdf\nBROKEN\n").unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { line: 2, .. }));

        let err = Ledger::parse("ABC123 a.pdf extra\n").unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { line: 1, .. }));
    }

    #[test]
    fn test_parse_rejects_duplicate_ids() {
        let err = Ledger::parse("ABC123 a.pdf\nABC123 b.pdf\n").unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { line: 2, reason: "duplicate id", .. }));
    }

    #[test]
    fn test_merge_other_wins() {
        let mut base = sample();
        let mut update = Ledger::new();
        update.insert("ABC123", "smith21-renamed.pdf");
        update.insert("NEW000", "doe22-new.pdf");

        base.merge(update);

        assert_eq!(base.len(), 3);
        assert_eq!(base.get("ABC123"), Some("smith21-renamed.pdf"));
        assert_eq!(base.get("ZZZ999"), Some("jones19-later.pdf"));
        assert_eq!(base.get("NEW000"), Some("doe22-new.pdf"));
    }

    #[tokio::test]
    async fn test_load_missing_creates_empty_file() {
        let fs = InMemoryFs::new();

        let ledger = load(&fs, "papers/.zotero").await.unwrap();

        assert!(ledger.is_empty());
        assert!(fs.exists("papers/.zotero").await.unwrap());
        assert_eq!(fs.read("papers/.zotero").await.unwrap(), b"");
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let fs = InMemoryFs::new();
        save(&fs, "papers/.zotero", &sample()).await.unwrap();

        let loaded = load(&fs, "papers/.zotero").await.unwrap();
        assert_eq!(loaded, sample());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_fails() {
        let fs = InMemoryFs::new();
        fs.write("papers/.zotero", b"only-one-token\n").await.unwrap();

        let err = load(&fs, "papers/.zotero").await.unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { .. }));
    }
}
