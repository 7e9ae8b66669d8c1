//! Reconciliation: decide what to do with every item and every local file.
//!
//! Inputs are plain snapshots (remote items, the ledger from the previous run,
//! the tracked files currently in the export directory); the output is an
//! action list and the ledger the run should end with. Nothing here touches
//! the filesystem, see [`crate::apply`] for executing the moves.
//!
//! Rules:
//! - every item with a PDF gets a unique target name (first id keeps the plain
//!   name, later claimants get `stem.{n}.pdf`)
//! - an item whose ledger file still exists is renamed in place (or left alone
//!   if the name is unchanged) instead of downloaded again
//! - every other item with a PDF is fetched
//! - every tracked file nobody claims is quarantined, never deleted

use crate::item::RemoteItem;
use crate::ledger::Ledger;
use crate::naming::{derive_file_name, numbered_name};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// One step of a reconciliation plan. File names are relative to the export directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Download the item's attachment to `file_name` (overwrites an existing file)
    Fetch { item_id: String, file_name: String },
    /// Move an already-downloaded attachment to its new canonical name
    Rename {
        item_id: String,
        from: String,
        to: String,
    },
    /// Move an unclaimed file into the quarantine subdirectory
    Quarantine { file_name: String },
    /// File is already where it should be
    Noop { item_id: String, file_name: String },
}

impl Action {
    pub fn is_noop(&self) -> bool {
        matches!(self, Action::Noop { .. })
    }
}

/// Counts per action kind, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub fetched: usize,
    pub renamed: usize,
    pub quarantined: usize,
    pub unchanged: usize,
}

/// Result of [`reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Per-item actions in id order, followed by quarantines in name order
    pub actions: Vec<Action>,
    /// Ledger to persist once the actions have been applied
    pub ledger: Ledger,
}

impl Reconciliation {
    /// True if any action other than `Noop` is planned.
    pub fn has_changes(&self) -> bool {
        self.actions.iter().any(|a| !a.is_noop())
    }

    pub fn report(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for action in &self.actions {
            match action {
                Action::Fetch { .. } => report.fetched += 1,
                Action::Rename { .. } => report.renamed += 1,
                Action::Quarantine { .. } => report.quarantined += 1,
                Action::Noop { .. } => report.unchanged += 1,
            }
        }
        report
    }

    pub fn fetches(&self) -> impl Iterator<Item = (&str, &str)> {
        self.actions.iter().filter_map(|a| match a {
            Action::Fetch { item_id, file_name } => Some((item_id.as_str(), file_name.as_str())),
            _ => None,
        })
    }
}

/// Assign a unique target filename to every item with a PDF attachment.
///
/// Items are visited in id order. The first item deriving a given name keeps
/// it; each later one gets the smallest free `stem.{n}.pdf`, avoiding both
/// plain names and earlier assignments.
pub fn assign_targets(items: &BTreeMap<String, RemoteItem>) -> BTreeMap<String, String> {
    let derived: Vec<(&str, String)> = items
        .iter()
        .filter(|(_, item)| item.has_pdf)
        .map(|(id, item)| (id.as_str(), derive_file_name(item)))
        .collect();

    let mut taken: HashSet<String> = derived.iter().map(|(_, name)| name.clone()).collect();
    let mut plain_owner: HashSet<&str> = HashSet::new();
    let mut targets = BTreeMap::new();

    for (id, name) in &derived {
        if plain_owner.insert(name.as_str()) {
            targets.insert(id.to_string(), name.clone());
            continue;
        }

        let mut n = 1;
        let mut candidate = numbered_name(name, n);
        while taken.contains(&candidate) {
            n += 1;
            candidate = numbered_name(name, n);
        }
        tracing::warn!(
            "Item {} collides on {}, using {} instead",
            id,
            name,
            candidate
        );
        taken.insert(candidate.clone());
        targets.insert(id.to_string(), candidate);
    }

    targets
}

/// Compute the actions that bring `existing` in line with `items`, and the new ledger.
///
/// `existing` holds the tracked filenames currently in the export directory.
pub fn reconcile(
    items: &BTreeMap<String, RemoteItem>,
    ledger: &Ledger,
    existing: &BTreeSet<String>,
) -> Reconciliation {
    let targets = assign_targets(items);

    let mut actions = Vec::with_capacity(targets.len());
    // Existing files accounted for by an item (kept, renamed away or overwritten)
    let mut claimed: HashSet<&str> = HashSet::new();

    // Resolve items through the ledger first so a recorded file is always
    // claimed by its own item before another item's fetch can overwrite it.
    let mut resolved: BTreeMap<&str, Action> = BTreeMap::new();
    for (id, target) in &targets {
        let Some(recorded) = ledger.get(id) else {
            continue;
        };
        if !existing.contains(recorded) {
            tracing::debug!("Ledger file {} for {} is gone, fetching again", recorded, id);
            continue;
        }
        if !claimed.insert(recorded) {
            tracing::warn!("Ledger file {} is recorded for more than one item", recorded);
            continue;
        }

        let action = if recorded == target.as_str() {
            Action::Noop {
                item_id: id.clone(),
                file_name: target.clone(),
            }
        } else {
            Action::Rename {
                item_id: id.clone(),
                from: recorded.to_string(),
                to: target.clone(),
            }
        };
        resolved.insert(id.as_str(), action);
    }

    for (id, target) in &targets {
        match resolved.remove(id.as_str()) {
            Some(action) => actions.push(action),
            None => {
                claimed.insert(target.as_str());
                actions.push(Action::Fetch {
                    item_id: id.clone(),
                    file_name: target.clone(),
                });
            }
        }
    }

    // Anything nobody claimed moves out of the way, including a stray file
    // sitting on a rename target; apply() quarantines before renaming.
    for file_name in existing {
        if !claimed.contains(file_name.as_str()) {
            actions.push(Action::Quarantine {
                file_name: file_name.clone(),
            });
        }
    }

    let ledger = targets.into_iter().collect();

    Reconciliation { actions, ledger }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Creator;

    fn item(id: &str, author: &str, date: &str, title: &str) -> RemoteItem {
        RemoteItem {
            id: id.to_string(),
            creators: vec![Creator::author(author)],
            date: Some(date.to_string()),
            title: title.to_string(),
            has_pdf: true,
        }
    }

    fn items(list: Vec<RemoteItem>) -> BTreeMap<String, RemoteItem> {
        list.into_iter().map(|i| (i.id.clone(), i)).collect()
    }

    fn files(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn ledger(entries: &[(&str, &str)]) -> Ledger {
        entries
            .iter()
            .map(|(id, name)| (id.to_string(), name.to_string()))
            .collect()
    }

    fn smith() -> RemoteItem {
        item("ABC123", "Smith", "2021-05-01", "A Study: Of Things!")
    }

    const SMITH_PDF: &str = "smith21-a-study-of-things.pdf";

    #[test]
    fn test_new_item_is_fetched() {
        let result = reconcile(&items(vec![smith()]), &Ledger::new(), &BTreeSet::new());

        assert_eq!(
            result.actions,
            vec![Action::Fetch {
                item_id: "ABC123".into(),
                file_name: SMITH_PDF.into()
            }]
        );
        assert_eq!(result.ledger, ledger(&[("ABC123", SMITH_PDF)]));
    }

    #[test]
    fn test_unchanged_item_is_noop() {
        let previous = ledger(&[("ABC123", SMITH_PDF)]);
        let result = reconcile(&items(vec![smith()]), &previous, &files(&[SMITH_PDF]));

        assert_eq!(
            result.actions,
            vec![Action::Noop {
                item_id: "ABC123".into(),
                file_name: SMITH_PDF.into()
            }]
        );
        assert!(!result.has_changes());
        assert_eq!(result.ledger, previous);
    }

    #[test]
    fn test_title_correction_renames_instead_of_fetching() {
        let previous = ledger(&[("ABC123", "smith21-a-study-of-thngs.pdf")]);
        let result = reconcile(
            &items(vec![smith()]),
            &previous,
            &files(&["smith21-a-study-of-thngs.pdf"]),
        );

        assert_eq!(
            result.actions,
            vec![Action::Rename {
                item_id: "ABC123".into(),
                from: "smith21-a-study-of-thngs.pdf".into(),
                to: SMITH_PDF.into()
            }]
        );
        assert_eq!(result.ledger, ledger(&[("ABC123", SMITH_PDF)]));
    }

    #[test]
    fn test_stale_ledger_entry_fetches_again() {
        let previous = ledger(&[("ABC123", SMITH_PDF)]);
        let result = reconcile(&items(vec![smith()]), &previous, &BTreeSet::new());

        assert_eq!(result.report().fetched, 1);
        assert_eq!(result.report().renamed, 0);
    }

    #[test]
    fn test_removed_item_is_quarantined() {
        let previous = ledger(&[("ABC123", SMITH_PDF)]);
        let result = reconcile(&BTreeMap::new(), &previous, &files(&[SMITH_PDF]));

        assert_eq!(
            result.actions,
            vec![Action::Quarantine {
                file_name: SMITH_PDF.into()
            }]
        );
        assert!(result.ledger.is_empty());
    }

    #[test]
    fn test_item_losing_its_pdf_is_dropped_and_quarantined() {
        let mut no_pdf = smith();
        no_pdf.has_pdf = false;
        let previous = ledger(&[("ABC123", SMITH_PDF)]);

        let result = reconcile(&items(vec![no_pdf]), &previous, &files(&[SMITH_PDF]));

        assert_eq!(result.report().quarantined, 1);
        assert!(result.ledger.is_empty());
    }

    #[test]
    fn test_untracked_stray_file_is_quarantined() {
        let previous = ledger(&[("ABC123", SMITH_PDF)]);
        let result = reconcile(
            &items(vec![smith()]),
            &previous,
            &files(&[SMITH_PDF, "manually-added.pdf"]),
        );

        assert_eq!(result.report().unchanged, 1);
        assert!(result.actions.contains(&Action::Quarantine {
            file_name: "manually-added.pdf".into()
        }));
    }

    #[test]
    fn test_fetch_target_that_already_exists_is_not_quarantined() {
        // Lost ledger: the file on disk is simply overwritten by the fetch
        let result = reconcile(&items(vec![smith()]), &Ledger::new(), &files(&[SMITH_PDF]));

        assert_eq!(
            result.actions,
            vec![Action::Fetch {
                item_id: "ABC123".into(),
                file_name: SMITH_PDF.into()
            }]
        );
    }

    #[test]
    fn test_rename_onto_stray_file_quarantines_stray_first() {
        let previous = ledger(&[("ABC123", "old-name.pdf")]);
        let result = reconcile(
            &items(vec![smith()]),
            &previous,
            &files(&["old-name.pdf", SMITH_PDF]),
        );

        assert!(result.actions.contains(&Action::Rename {
            item_id: "ABC123".into(),
            from: "old-name.pdf".into(),
            to: SMITH_PDF.into()
        }));
        assert!(result.actions.contains(&Action::Quarantine {
            file_name: SMITH_PDF.into()
        }));
    }

    #[test]
    fn test_swapped_names_are_two_renames() {
        let a = item("AAA", "Alpha", "2020", "One");
        let b = item("BBB", "Beta", "2020", "Two");
        // Previous run had the names the other way around
        let previous = ledger(&[("AAA", "beta20-two.pdf"), ("BBB", "alpha20-one.pdf")]);

        let result = reconcile(
            &items(vec![a, b]),
            &previous,
            &files(&["alpha20-one.pdf", "beta20-two.pdf"]),
        );

        assert_eq!(result.report().renamed, 2);
        assert_eq!(result.report().quarantined, 0);
    }

    #[test]
    fn test_rename_source_reused_as_fetch_target() {
        let renamed = item("AAA", "Alpha", "2020", "New Title");
        let newcomer = item("BBB", "Alpha", "2020", "Old Title");
        let previous = ledger(&[("AAA", "alpha20-old-title.pdf")]);

        let result = reconcile(
            &items(vec![renamed, newcomer]),
            &previous,
            &files(&["alpha20-old-title.pdf"]),
        );

        assert_eq!(
            result.actions,
            vec![
                Action::Rename {
                    item_id: "AAA".into(),
                    from: "alpha20-old-title.pdf".into(),
                    to: "alpha20-new-title.pdf".into()
                },
                Action::Fetch {
                    item_id: "BBB".into(),
                    file_name: "alpha20-old-title.pdf".into()
                },
            ]
        );
    }

    #[test]
    fn test_duplicate_ledger_paths_claimed_once() {
        let a = item("AAA", "Alpha", "2020", "One");
        let b = item("BBB", "Beta", "2020", "Two");
        let previous = ledger(&[("AAA", "shared.pdf"), ("BBB", "shared.pdf")]);

        let result = reconcile(&items(vec![a, b]), &previous, &files(&["shared.pdf"]));

        let report = result.report();
        assert_eq!(report.renamed, 1);
        assert_eq!(report.fetched, 1);
        assert_eq!(report.quarantined, 0);
    }

    #[test]
    fn test_colliding_names_are_disambiguated_in_id_order() {
        let first = item("AAA", "Smith", "2021", "Same");
        let second = item("BBB", "Smith", "2021", "Same");
        let third = item("CCC", "Smith", "2021", "Same");

        let targets = assign_targets(&items(vec![third, second, first]));

        assert_eq!(targets["AAA"], "smith21-same.pdf");
        assert_eq!(targets["BBB"], "smith21-same.1.pdf");
        assert_eq!(targets["CCC"], "smith21-same.2.pdf");
    }

    #[test]
    fn test_targets_are_unique() {
        let list: Vec<RemoteItem> = (0..20)
            .map(|i| item(&format!("ID{:02}", i), "Smith", "2021", &format!("T{}", i % 3)))
            .collect();

        let targets = assign_targets(&items(list));
        let unique: HashSet<&String> = targets.values().collect();

        assert_eq!(targets.len(), 20);
        assert_eq!(unique.len(), 20);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let list = items(vec![
            smith(),
            item("DEF456", "Jones", "05/2019", "Later Work"),
            item("GHI789", "Jones", "2019", "Later Work"),
        ]);
        let existing = files(&["stray.pdf"]);

        let first = reconcile(&list, &Ledger::new(), &existing);

        // Simulate applying the plan: targets exist, stray moved away
        let after: BTreeSet<String> = first.ledger.iter().map(|(_, f)| f.to_string()).collect();
        let second = reconcile(&list, &first.ledger, &after);

        assert!(second.actions.iter().all(Action::is_noop));
        assert_eq!(second.ledger, first.ledger);
    }

    #[test]
    fn test_no_existing_file_is_lost() {
        let list = items(vec![
            item("AAA", "Alpha", "2020", "One"),
            item("BBB", "Beta", "2020", "Two"),
            item("CCC", "Gamma", "2020", "Three"),
        ]);
        let previous = ledger(&[
            ("AAA", "alpha20-one.pdf"),
            ("BBB", "beta-old.pdf"),
            ("ZZZ", "removed.pdf"),
        ]);
        let existing = files(&["alpha20-one.pdf", "beta-old.pdf", "removed.pdf", "stray.pdf"]);

        let result = reconcile(&list, &previous, &existing);

        for file in &existing {
            let kept = result.actions.iter().any(|a| match a {
                Action::Noop { file_name, .. } => file_name == file,
                Action::Rename { from, .. } => from == file,
                Action::Quarantine { file_name } => file_name == file,
                Action::Fetch { .. } => false,
            });
            assert!(kept, "{} is neither kept, renamed nor quarantined", file);
        }
    }

    #[test]
    fn test_ledger_with_odd_whitespace_titles_parses_back() {
        let list = items(vec![
            item("ABC123", "Smith", "2021", "Part\u{0B}Two"),
            item("DEF456", "Jones", "2020", "Part\u{0C}Three\0"),
        ]);

        let result = reconcile(&list, &Ledger::new(), &BTreeSet::new());
        let parsed = Ledger::parse(&result.ledger.to_text()).unwrap();

        assert_eq!(parsed, result.ledger);
        assert_eq!(parsed.get("ABC123"), Some("smith21-part-two.pdf"));
        assert_eq!(parsed.get("DEF456"), Some("jones20-part-three.pdf"));
    }
}
