use anyhow::Result;

use crate::pages::{Page, PageStore};

/// Pre-order walk of the tree rooted at `root_id`.
///
/// `visit(page, depth, is_root)` runs for every live default-language page, the
/// root first and each page before its children; siblings come in sorting order.
/// Returns the visited uids in visitation order. A root id <= 0 (after taking the
/// absolute value) visits nothing.
pub fn walk_page_tree<F>(pages: &dyn PageStore, root_id: i64, mut visit: F) -> Result<Vec<i64>>
where
    F: FnMut(&Page, usize, bool) -> Result<()>,
{
    let root_id = root_id.checked_abs().unwrap_or(0);
    let mut visited = Vec::new();
    if root_id <= 0 {
        return Ok(visited);
    }

    if let Some(root) = pages.fetch_by_uid(root_id)? {
        visit(&root, 0, true)?;
        visited.push(root.uid);
        walk_children(pages, root.uid, 1, &mut visit, &mut visited)?;
    }
    Ok(visited)
}

fn walk_children<F>(
    pages: &dyn PageStore,
    pid: i64,
    depth: usize,
    visit: &mut F,
    visited: &mut Vec<i64>,
) -> Result<()>
where
    F: FnMut(&Page, usize, bool) -> Result<()>,
{
    for child in pages.fetch_children(pid)? {
        visit(&child, depth, false)?;
        visited.push(child.uid);
        walk_children(pages, child.uid, depth + 1, visit, visited)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::walk_page_tree;
    use crate::pages::Page;
    use crate::pages::tests::{memory_store, row};

    fn sorted(uid: i64, pid: i64, sorting: i64) -> Page {
        Page {
            sorting,
            ..Page::new(uid, pid, &format!("Page {uid}"))
        }
    }

    fn fixture() -> crate::pages::SqlitePageStore {
        let mut deleted = row(sorted(7, 1, 5));
        deleted.deleted = true;
        let mut translated = row(sorted(8, 2, 1));
        translated.sys_language_uid = 2;
        let mut below_deleted = row(sorted(9, 7, 1));
        below_deleted.page.title = "Unreachable".to_string();
        memory_store(&[
            row(sorted(1, 0, 0)),
            row(sorted(2, 1, 20)),
            row(sorted(3, 1, 10)),
            row(sorted(4, 2, 1)),
            row(sorted(5, 4, 1)),
            row(sorted(6, 3, 1)),
            deleted,
            translated,
            below_deleted,
        ])
    }

    #[test]
    fn visits_pre_order_with_sibling_sorting() {
        let store = fixture();
        let mut calls = Vec::new();
        let visited = walk_page_tree(&store, 1, |page, depth, is_root| {
            calls.push((page.uid, depth, is_root));
            Ok(())
        })
        .expect("walk");

        assert_eq!(visited, vec![1, 3, 6, 2, 4, 5]);
        assert_eq!(
            calls,
            vec![
                (1, 0, true),
                (3, 1, false),
                (6, 2, false),
                (2, 1, false),
                (4, 2, false),
                (5, 3, false),
            ]
        );
    }

    #[test]
    fn parent_is_always_visited_before_child() {
        let store = fixture();
        let mut parents = HashMap::new();
        let visited = walk_page_tree(&store, 1, |page, _, _| {
            parents.insert(page.uid, page.pid);
            Ok(())
        })
        .expect("walk");

        for (position, uid) in visited.iter().enumerate() {
            let pid = parents[uid];
            if let Some(parent_position) = visited.iter().position(|candidate| *candidate == pid) {
                assert!(parent_position < position);
            } else {
                assert_eq!(*uid, 1);
            }
        }
    }

    #[test]
    fn subtree_root_is_visited_at_depth_zero() {
        let store = fixture();
        let mut depths = Vec::new();
        let visited = walk_page_tree(&store, 2, |page, depth, is_root| {
            depths.push((page.uid, depth, is_root));
            Ok(())
        })
        .expect("walk");
        assert_eq!(visited, vec![2, 4, 5]);
        assert_eq!(depths, vec![(2, 0, true), (4, 1, false), (5, 2, false)]);
    }

    #[test]
    fn negative_root_is_normalized_and_non_positive_visits_nothing() {
        let store = fixture();
        let visited = walk_page_tree(&store, -2, |_, _, _| Ok(())).expect("walk");
        assert_eq!(visited, vec![2, 4, 5]);

        let mut called = false;
        let visited = walk_page_tree(&store, 0, |_, _, _| {
            called = true;
            Ok(())
        })
        .expect("walk");
        assert!(visited.is_empty());
        assert!(!called);
    }

    #[test]
    fn missing_or_deleted_root_visits_nothing() {
        let store = fixture();
        assert!(walk_page_tree(&store, 7, |_, _, _| Ok(())).expect("walk").is_empty());
        assert!(walk_page_tree(&store, 99, |_, _, _| Ok(())).expect("walk").is_empty());
    }

    #[test]
    fn visitor_error_stops_the_walk() {
        let store = fixture();
        let mut seen = Vec::new();
        let err = walk_page_tree(&store, 1, |page, _, _| {
            seen.push(page.uid);
            if page.uid == 6 {
                anyhow::bail!("boom at {}", page.uid);
            }
            Ok(())
        })
        .expect_err("must fail");
        assert!(err.to_string().contains("boom at 6"));
        assert_eq!(seen, vec![1, 3, 6]);
    }
}
