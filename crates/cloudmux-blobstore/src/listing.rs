// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-process listing engine
//!
//! Stores that keep their own index (the in-memory and filesystem stores)
//! hand every blob entry to [`apply_listing`], which filters by prefix, rolls
//! names up at the delimiter, skips up to the marker and cuts a page.

use crate::domain::{PageSet, StorageMetadata};
use crate::options::ListContainerOptions;

/// Common prefix of `name` below `prefix`, if `name` continues past a delimiter
///
/// The returned prefix keeps the trailing delimiter (`photos/2024/`), like the
/// common prefixes returned by remote providers.
pub fn common_prefix<'a>(name: &'a str, prefix: &str, delimiter: &str) -> Option<&'a str> {
    let rest = name.strip_prefix(prefix)?;
    let idx = rest.find(delimiter)?;
    Some(&name[..prefix.len() + idx + delimiter.len()])
}

/// Cut one page out of a set of blob entries
///
/// `entries` need not be sorted. The resulting page is ordered by name, holds
/// at most `options.page_size()` items and carries a `next_marker` iff more
/// entries follow.
pub fn apply_listing<I>(entries: I, options: &ListContainerOptions) -> PageSet<StorageMetadata>
where
    I: IntoIterator<Item = StorageMetadata>,
{
    let prefix = options.prefix_str();
    let delimiter = options.effective_delimiter();
    let marker = options.marker.as_deref();
    let limit = options.page_size();

    let mut candidates: Vec<StorageMetadata> = entries
        .into_iter()
        .filter(|entry| entry.name.starts_with(prefix))
        .collect();
    candidates.sort_by(|a, b| a.name.cmp(&b.name));

    let mut items: Vec<StorageMetadata> = Vec::new();
    let mut truncated = false;

    for entry in candidates {
        let rolled_up = delimiter
            .and_then(|d| common_prefix(&entry.name, prefix, d))
            .map(str::to_string);
        let output_name = rolled_up.as_deref().unwrap_or(&entry.name);

        if marker.is_some_and(|m| output_name <= m) {
            continue;
        }
        if items.last().is_some_and(|last| last.name == output_name) {
            continue;
        }
        if items.len() == limit {
            truncated = true;
            break;
        }

        match rolled_up {
            Some(dir) => items.push(StorageMetadata::relative_path(dir)),
            None => items.push(entry),
        }
    }

    let next_marker = if truncated {
        items.last().map(|last| last.name.clone())
    } else {
        None
    };
    PageSet::new(items, next_marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StorageType;

    fn entries(names: &[&str]) -> Vec<StorageMetadata> {
        names.iter().map(|n| StorageMetadata::blob(*n, 1)).collect()
    }

    fn names(page: &PageSet<StorageMetadata>) -> Vec<&str> {
        page.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_common_prefix() {
        assert_eq!(common_prefix("a/b/c", "", "/"), Some("a/"));
        assert_eq!(common_prefix("a/b/c", "a/", "/"), Some("a/b/"));
        assert_eq!(common_prefix("a/b", "a/", "/"), None);
        assert_eq!(common_prefix("x/b", "a/", "/"), None);
    }

    #[test]
    fn test_top_level_rolls_up() {
        let page = apply_listing(
            entries(&["z.txt", "dir/a", "dir/b", "dir/sub/c", "a.txt"]),
            &ListContainerOptions::new(),
        );
        assert_eq!(names(&page), vec!["a.txt", "dir/", "z.txt"]);
        assert_eq!(page.items[1].kind, StorageType::RelativePath);
        assert!(page.is_complete());
    }

    #[test]
    fn test_in_directory() {
        let page = apply_listing(
            entries(&["dir/a", "dir/b", "dir/sub/c", "other"]),
            &ListContainerOptions::new().in_directory("dir"),
        );
        assert_eq!(names(&page), vec!["dir/a", "dir/b", "dir/sub/"]);
    }

    #[test]
    fn test_recursive() {
        let page = apply_listing(
            entries(&["dir/sub/c", "dir/a", "b"]),
            &ListContainerOptions::new().recursive(),
        );
        assert_eq!(names(&page), vec!["b", "dir/a", "dir/sub/c"]);
    }

    #[test]
    fn test_pages_follow_markers() {
        let all = entries(&["a", "b", "c", "d", "e"]);
        let options = ListContainerOptions::new().max_results(2);

        let first = apply_listing(all.clone(), &options);
        assert_eq!(names(&first), vec!["a", "b"]);
        assert_eq!(first.next_marker.as_deref(), Some("b"));

        let second = apply_listing(all.clone(), &options.clone().after_marker("b"));
        assert_eq!(names(&second), vec!["c", "d"]);

        let third = apply_listing(all, &options.after_marker("d"));
        assert_eq!(names(&third), vec!["e"]);
        assert!(third.is_complete());
    }

    #[test]
    fn test_exact_page_has_no_marker() {
        let page = apply_listing(entries(&["a", "b"]), &ListContainerOptions::new().max_results(2));
        assert_eq!(page.len(), 2);
        assert!(page.is_complete());
    }

    #[test]
    fn test_marker_on_common_prefix_skips_its_members() {
        let all = entries(&["a", "dir/1", "dir/2", "z"]);
        let options = ListContainerOptions::new().max_results(2);

        let first = apply_listing(all.clone(), &options);
        assert_eq!(names(&first), vec!["a", "dir/"]);

        let second = apply_listing(all, &options.after_marker("dir/"));
        assert_eq!(names(&second), vec!["z"]);
        assert!(second.is_complete());
    }
}
