//! Parsers for `git branch` listings.

use super::REMOTE;

/// Parses `git branch` output into `(name, is_current)` pairs.
///
/// The current branch is marked with `* `; branches checked out in another
/// worktree with `+ `. Pseudo entries such as `(HEAD detached at 1a2b3c4)`
/// are skipped.
pub(crate) fn parse_local_branches(output: &str) -> Vec<(String, bool)> {
    output
        .lines()
        .filter_map(|line| {
            let (is_current, name) = match line.trim_start() {
                l if l.starts_with("* ") => (true, &l[2..]),
                l if l.starts_with("+ ") => (false, &l[2..]),
                l => (false, l),
            };
            let name = name.trim();
            if name.is_empty() || name.starts_with('(') {
                return None;
            }
            Some((name.to_string(), is_current))
        })
        .collect()
}

/// Parses `git branch --remotes` output into branch names on [`REMOTE`].
///
/// `origin/feature/login` maps to `feature/login`. Symbolic entries
/// (`origin/HEAD -> origin/master`) and other remotes are skipped.
pub(crate) fn parse_remote_branches(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.contains(" -> "))
        .filter_map(|line| line.strip_prefix(REMOTE)?.strip_prefix('/'))
        .filter(|name| !name.is_empty() && *name != "HEAD")
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn local_listing_marks_current_branch() {
        let output = "  develop\n* master\n  feature/login\n";
        assert_eq!(
            parse_local_branches(output),
            vec![
                ("develop".to_string(), false),
                ("master".to_string(), true),
                ("feature/login".to_string(), false),
            ]
        );
    }

    #[test]
    fn local_listing_skips_detached_head() {
        let output = "* (HEAD detached at 1a2b3c4)\n  master\n";
        assert_eq!(
            parse_local_branches(output),
            vec![("master".to_string(), false)]
        );
    }

    #[test]
    fn local_listing_handles_worktree_marker_and_blank_lines() {
        let output = "+ other\n\n  master\n";
        assert_eq!(
            parse_local_branches(output),
            vec![("other".to_string(), false), ("master".to_string(), false)]
        );
    }

    #[test]
    fn remote_listing_skips_symbolic_head() {
        let output = "  origin/HEAD -> origin/master\n  origin/master\n  origin/release/1.0\n";
        assert_eq!(
            parse_remote_branches(output),
            vec!["master".to_string(), "release/1.0".to_string()]
        );
    }

    #[test]
    fn remote_listing_ignores_other_remotes() {
        let output = "  origin/master\n  upstream/master\n  originals/x\n";
        assert_eq!(parse_remote_branches(output), vec!["master".to_string()]);
    }

    #[test]
    fn empty_listings_yield_nothing() {
        assert!(parse_local_branches("").is_empty());
        assert!(parse_remote_branches("").is_empty());
    }

    fn arb_branch_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9._-]{0,12}(/[a-z0-9._-]{1,12}){0,2}"
    }

    proptest! {
        /// Any listing git could print parses back to the same names, with
        /// the current marker on the right entry.
        #[test]
        fn local_listing_roundtrips(
            names in prop::collection::btree_set(arb_branch_name(), 0..8),
            current in any::<prop::sample::Index>(),
        ) {
            let names: Vec<String> = names.into_iter().collect();
            let current = (!names.is_empty()).then(|| current.index(names.len()));

            let output: String = names
                .iter()
                .enumerate()
                .map(|(i, n)| {
                    let marker = if Some(i) == current { "* " } else { "  " };
                    format!("{marker}{n}\n")
                })
                .collect();

            let parsed = parse_local_branches(&output);
            prop_assert_eq!(parsed.len(), names.len());
            for (i, (name, is_current)) in parsed.iter().enumerate() {
                prop_assert_eq!(name, &names[i]);
                prop_assert_eq!(*is_current, Some(i) == current);
            }
        }

        #[test]
        fn remote_listing_strips_exactly_the_remote_prefix(
            names in prop::collection::vec(arb_branch_name(), 0..8),
        ) {
            let output: String = names.iter().map(|n| format!("  origin/{n}\n")).collect();
            prop_assert_eq!(parse_remote_branches(&output), names);
        }
    }
}
