//! Remote item snapshot as seen by the naming engine.

/// Sentinel surname used when an item lists no authors.
pub const NO_AUTHOR: &str = "noauthor";

/// A creator entry on a remote item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creator {
    /// Role, e.g. "author", "editor"
    pub creator_type: String,
    /// Two-field form
    pub last_name: Option<String>,
    /// Single-field form (institutions, mononyms)
    pub name: Option<String>,
}

impl Creator {
    pub fn author(last_name: impl Into<String>) -> Self {
        Self {
            creator_type: "author".to_string(),
            last_name: Some(last_name.into()),
            name: None,
        }
    }

    /// Surname for naming purposes: `last_name`, else the single-field `name`.
    pub fn surname(&self) -> Option<&str> {
        self.last_name.as_deref().or(self.name.as_deref())
    }

    pub fn is_author(&self) -> bool {
        self.creator_type == "author"
    }
}

/// Immutable snapshot of one top-level item of the remote collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    /// Stable identifier (tail of the attachment resource URL)
    pub id: String,
    pub creators: Vec<Creator>,
    /// Free-form publication date, e.g. "2021-05-01" or "05/2021"
    pub date: Option<String>,
    pub title: String,
    pub has_pdf: bool,
}

impl RemoteItem {
    /// Surnames of creators whose role is "author", in listed order.
    ///
    /// Author entries without any name are skipped.
    pub fn author_surnames(&self) -> Vec<&str> {
        self.creators
            .iter()
            .filter(|c| c.is_author())
            .filter_map(|c| {
                let surname = c.surname();
                if surname.is_none() {
                    tracing::debug!("Item {} has an author without a name", self.id);
                }
                surname
            })
            .collect()
    }

    /// First author surname, or the `noauthor` sentinel.
    pub fn first_author(&self) -> &str {
        self.author_surnames().first().copied().unwrap_or(NO_AUTHOR)
    }
}
