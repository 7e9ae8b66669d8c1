//! Canonical target filenames for remote items.
//!
//! `{surname}{yy}-{title}.pdf`, e.g. `smith21-a-study-of-things.pdf`.
//! Collisions between items are not resolved here; see [`crate::reconcile`].

use crate::item::RemoteItem;
use crate::layout::{split_extension, ExportLayout, TRACKED_EXTENSION};
use crate::normalize::normalize;

/// Two-character year from a free-form date string.
///
/// `a/b/2021` → last `/` token, `2021-05-01` → first `-` token, otherwise the
/// whole string; tokens longer than two characters keep their last two.
pub fn extract_year(date: &str) -> String {
    let token = if date.contains('/') {
        date.rsplit('/').next().unwrap_or_default()
    } else if date.contains('-') {
        date.split('-').next().unwrap_or_default()
    } else {
        date
    };

    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 2 {
        chars[chars.len() - 2..].iter().collect()
    } else {
        token.to_string()
    }
}

/// Canonical filename for an item (no directory).
pub fn derive_file_name(item: &RemoteItem) -> String {
    let surname = normalize(item.first_author());
    let year = match item.date.as_deref() {
        Some(date) => extract_year(date),
        None => {
            tracing::debug!("Item {} has no date", item.id);
            String::new()
        }
    };
    let title = normalize(&item.title);

    format!("{}{}-{}{}", surname, year, title, TRACKED_EXTENSION)
}

/// Canonical path of an item inside the export directory.
pub fn derive_path(item: &RemoteItem, layout: &ExportLayout) -> String {
    layout.file_path(&derive_file_name(item))
}

/// `stem.ext` → `stem.{n}.ext`
pub fn numbered_name(file_name: &str, n: usize) -> String {
    let (stem, ext) = split_extension(file_name);
    format!("{}.{}{}", stem, n, ext)
}
