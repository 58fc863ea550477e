//! Segment-level diff of two slugs.
//!
//! Both paths are split on `/` and aligned through their longest common
//! subsequence. Every segment ends up in exactly one token: removed from the
//! old path, common to both, or added by the new path.

use colored::Colorize;
use maud::{Markup, html};

pub const SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffToken {
    Removed(String),
    Common(String),
    Added(String),
}

impl DiffToken {
    pub fn segment(&self) -> &str {
        match self {
            Self::Removed(segment) | Self::Common(segment) | Self::Added(segment) => segment,
        }
    }
}

/// Diff two slugs. Absent values count as the empty string.
pub fn diff(old_path: Option<&str>, new_path: Option<&str>) -> Vec<DiffToken> {
    let old = old_path.unwrap_or_default().split(SEPARATOR).collect::<Vec<_>>();
    let new = new_path.unwrap_or_default().split(SEPARATOR).collect::<Vec<_>>();
    diff_segments(&old, &new)
}

pub fn diff_segments(old: &[&str], new: &[&str]) -> Vec<DiffToken> {
    let lcs = longest_common_subsequence(old, new);
    let mut tokens = Vec::with_capacity(old.len() + new.len());
    let (mut i, mut j) = (0usize, 0usize);

    for common in &lcs {
        while i < old.len() && old[i] != *common {
            tokens.push(DiffToken::Removed(old[i].to_string()));
            i += 1;
        }
        while j < new.len() && new[j] != *common {
            tokens.push(DiffToken::Added(new[j].to_string()));
            j += 1;
        }
        tokens.push(DiffToken::Common((*common).to_string()));
        i += 1;
        j += 1;
    }

    tokens.extend(old.iter().skip(i).map(|s| DiffToken::Removed((*s).to_string())));
    tokens.extend(new.iter().skip(j).map(|s| DiffToken::Added((*s).to_string())));
    tokens
}

/// One LCS of `old` and `new`. On ties the backtrack moves up, so the
/// mismatch is charged to the old path first.
pub fn longest_common_subsequence<'a>(old: &[&'a str], new: &[&str]) -> Vec<&'a str> {
    let (m, n) = (old.len(), new.len());
    let mut table = vec![vec![0usize; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            table[i][j] = if old[i - 1] == new[j - 1] {
                table[i - 1][j - 1] + 1
            } else {
                table[i - 1][j].max(table[i][j - 1])
            };
        }
    }

    let mut out = Vec::with_capacity(table[m][n]);
    let (mut i, mut j) = (m, n);
    while i > 0 && j > 0 {
        if old[i - 1] == new[j - 1] {
            out.push(old[i - 1]);
            i -= 1;
            j -= 1;
        } else if table[i - 1][j] >= table[i][j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }
    out.reverse();
    out
}

/// Tokens up to the last one that renders text, so the joined output never
/// ends in a separator.
fn trimmed(tokens: &[DiffToken]) -> &[DiffToken] {
    let end = tokens
        .iter()
        .rposition(|token| !matches!(token, DiffToken::Common(segment) if segment.is_empty()))
        .map_or(0, |index| index + 1);
    &tokens[..end]
}

/// Join the token segments back into a path, with no markup.
pub fn render_plain(tokens: &[DiffToken]) -> String {
    trimmed(tokens)
        .iter()
        .map(DiffToken::segment)
        .collect::<Vec<_>>()
        .join("/")
}

/// Inline HTML: removed segments red, added segments green, all escaped.
pub fn render_html(tokens: &[DiffToken]) -> Markup {
    html! {
        @for (index, token) in trimmed(tokens).iter().enumerate() {
            @if index > 0 { "/" }
            @match token {
                DiffToken::Removed(segment) => { span style="color:red;" { (segment) } }
                DiffToken::Added(segment) => { span style="color:green;" { (segment) } }
                DiffToken::Common(segment) => { (segment) }
            }
        }
    }
}

/// Terminal rendering with ANSI colors.
pub fn render_ansi(tokens: &[DiffToken]) -> String {
    trimmed(tokens)
        .iter()
        .map(|token| match token {
            DiffToken::Removed(segment) => segment.red().strikethrough().to_string(),
            DiffToken::Added(segment) => segment.green().to_string(),
            DiffToken::Common(segment) => segment.clone(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::{
        DiffToken, diff, diff_segments, longest_common_subsequence, render_ansi, render_html,
        render_plain,
    };

    fn removed(s: &str) -> DiffToken {
        DiffToken::Removed(s.to_string())
    }
    fn common(s: &str) -> DiffToken {
        DiffToken::Common(s.to_string())
    }
    fn added(s: &str) -> DiffToken {
        DiffToken::Added(s.to_string())
    }

    fn sides(tokens: &[DiffToken]) -> (Vec<&str>, Vec<&str>) {
        let old = tokens
            .iter()
            .filter(|t| !matches!(t, DiffToken::Added(_)))
            .map(DiffToken::segment)
            .collect();
        let new = tokens
            .iter()
            .filter(|t| !matches!(t, DiffToken::Removed(_)))
            .map(DiffToken::segment)
            .collect();
        (old, new)
    }

    #[test]
    fn changed_leaf_segment() {
        let tokens = diff_segments(&["shop", "red-shoes"], &["shop", "blue-shoes"]);
        assert_eq!(
            tokens,
            vec![common("shop"), removed("red-shoes"), added("blue-shoes")]
        );
        assert_eq!(
            render_html(&tokens).into_string(),
            "shop/<span style=\"color:red;\">red-shoes</span>/<span style=\"color:green;\">blue-shoes</span>"
        );
    }

    #[test]
    fn identical_paths_are_all_common() {
        let tokens = diff(Some("/about/team"), Some("/about/team"));
        assert!(tokens.iter().all(|t| matches!(t, DiffToken::Common(_))));
        assert_eq!(render_plain(&tokens), "/about/team");
    }

    #[test]
    fn empty_sides_remove_or_add_everything() {
        let tokens = diff_segments(&["a", "b"], &[]);
        assert_eq!(tokens, vec![removed("a"), removed("b")]);

        let tokens = diff_segments(&[], &["x", "y"]);
        assert_eq!(tokens, vec![added("x"), added("y")]);

        let tokens = diff(None, Some("news"));
        assert_eq!(tokens, vec![removed(""), added("news")]);
    }

    #[test]
    fn leading_slash_stays_common() {
        let tokens = diff(Some("/about/old-name"), Some("/about/new-name"));
        assert_eq!(
            tokens,
            vec![common(""), common("about"), removed("old-name"), added("new-name")]
        );
    }

    #[test]
    fn tokens_partition_both_sides() {
        let cases: [(&[&str], &[&str]); 4] = [
            (&["a", "b", "c", "d"], &["b", "x", "d", "a"]),
            (&["x", "y"], &["y", "x"]),
            (&["a", "a", "b"], &["a", "b", "b"]),
            (&["en", "shop", "shoes", "red"], &["shop", "en", "red", "shoes"]),
        ];
        for (old, new) in cases {
            let tokens = diff_segments(old, new);
            let (old_side, new_side) = sides(&tokens);
            assert_eq!(old_side, old.to_vec());
            assert_eq!(new_side, new.to_vec());

            let common_count = tokens
                .iter()
                .filter(|t| matches!(t, DiffToken::Common(_)))
                .count();
            assert_eq!(common_count, longest_common_subsequence(old, new).len());
        }
    }

    #[test]
    fn backtrack_prefers_up_on_ties() {
        // Both "x" and "y" are LCS of length one; the tie at the corner moves up.
        assert_eq!(longest_common_subsequence(&["x", "y"], &["y", "x"]), vec!["x"]);
        assert_eq!(
            longest_common_subsequence(&["a", "b", "c", "d"], &["b", "x", "d", "a"]),
            vec!["b", "d"]
        );
    }

    #[test]
    fn trailing_separator_is_trimmed() {
        let tokens = diff(Some("/about/"), Some("/about/team/"));
        assert_eq!(
            tokens,
            vec![common(""), common("about"), added("team"), common("")]
        );
        assert_eq!(render_plain(&tokens), "/about/team");
        assert_eq!(
            render_html(&tokens).into_string(),
            "/about/<span style=\"color:green;\">team</span>"
        );

        colored::control::set_override(false);
        assert_eq!(render_ansi(&diff(Some("/about/"), Some("/about/"))), "/about");
        assert_eq!(render_plain(&diff(Some("/"), Some("/"))), "");
    }

    #[test]
    fn html_escapes_segments() {
        let tokens = diff_segments(&["<b>"], &["a&b"]);
        assert_eq!(
            render_html(&tokens).into_string(),
            "<span style=\"color:red;\">&lt;b&gt;</span>/<span style=\"color:green;\">a&amp;b</span>"
        );
    }

    #[test]
    fn ansi_rendering_keeps_segments() {
        colored::control::set_override(false);
        let tokens = diff_segments(&["shop", "red"], &["shop", "blue"]);
        assert_eq!(render_ansi(&tokens), "shop/red/blue");
    }
}
