//! Whois body cleanup.
//!
//! Many whois servers print the same legal banner at the top and the bottom of
//! a response. [`clean`] finds the longest run of lines that appears twice and
//! drops the second copy, without needing a per-server parser.
//!
//! Only one pass is made: if a body contains several distinct duplicated
//! blocks, only the longest is removed.

/// Runs of this many identical consecutive lines (or more) are treated as a
/// duplicated block.
const MIN_DUPLICATE_RUN: usize = 4;

/// Bodies shorter than this cannot hold two non-overlapping duplicate runs.
const MIN_LINES: usize = 2 * MIN_DUPLICATE_RUN;

/// Trims whitespace and removes the second copy of the longest repeated block
/// of lines. Line endings in the output are always `\n`. Never fails; blank
/// input gives an empty string.
pub fn clean(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    if lines.len() < MIN_LINES {
        return lines.join("\n").trim().to_string();
    }

    let (start, end) = longest_repeated_run(&lines);
    if end - start < MIN_DUPLICATE_RUN {
        return lines.join("\n").trim().to_string();
    }

    let kept: Vec<&str> = lines
        .iter()
        .enumerate()
        .filter(|(i, _)| *i < start || *i >= end)
        .map(|(_, line)| *line)
        .collect();

    kept.join("\n").trim().to_string()
}

/// Returns `[start, end)` of the second occurrence of the longest run of
/// consecutive lines that also appears earlier in `lines`.
///
/// `run[i][j]` is the length of the common run ending at lines `i - 1` and
/// `j - 1` (with `i < j`); only the previous row is needed, so two rows are
/// kept instead of the full O(n²) table.
fn longest_repeated_run(lines: &[&str]) -> (usize, usize) {
    let n = lines.len();
    let mut prev = vec![0usize; n + 1];
    let mut cur = vec![0usize; n + 1];

    let mut longest = 0;
    let mut longest_end = 0;

    for i in 1..=n {
        cur.fill(0);
        for j in (i + 1)..=n {
            if lines[i - 1] == lines[j - 1] {
                cur[j] = prev[j - 1] + 1;
                if cur[j] > longest {
                    longest = cur[j];
                    longest_end = j;
                }
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    (longest_end - longest, longest_end)
}
