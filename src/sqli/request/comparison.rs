//! Page comparison utilities

use std::collections::HashMap;

/// Differing middles longer than this are compared line by line
const LCS_LIMIT: usize = 5000;

/// Above this many DP cells the comparison leaves the async worker
const INLINE_CELLS: usize = 250_000;

/// Similarity ratio in `[0, 1]` between two pages, in characters
pub fn page_ratio(page1: &str, page2: &str) -> f64 {
    if page1 == page2 {
        return 1.0;
    }
    if page1.is_empty() || page2.is_empty() {
        return 0.0;
    }

    let chars1: Vec<char> = page1.chars().collect();
    let chars2: Vec<char> = page2.chars().collect();
    let (len1, len2) = (chars1.len(), chars2.len());

    let len_ratio = len1.min(len2) as f64 / len1.max(len2) as f64;

    // Very different lengths are different pages
    if len_ratio < 0.5 {
        return len_ratio;
    }

    let common = common_length(&chars1, &chars2);
    (2.0 * common as f64) / (len1 + len2) as f64
}

/// [`page_ratio`] that runs large comparisons on the blocking pool
pub async fn similarity(page1: &str, page2: &str) -> f64 {
    if page1.len().saturating_mul(page2.len()) <= INLINE_CELLS {
        return page_ratio(page1, page2);
    }
    let (a, b) = (page1.to_owned(), page2.to_owned());
    tokio::task::spawn_blocking(move || page_ratio(&a, &b))
        .await
        .unwrap_or(0.0)
}

/// Shared prefix and suffix, plus the LCS of what differs in between
fn common_length(chars1: &[char], chars2: &[char]) -> usize {
    let prefix = chars1
        .iter()
        .zip(chars2)
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = chars1.len().min(chars2.len()) - prefix;
    let suffix = chars1
        .iter()
        .rev()
        .zip(chars2.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let middle1 = &chars1[prefix..chars1.len() - suffix];
    let middle2 = &chars2[prefix..chars2.len() - suffix];

    let middle = if middle1.len() > LCS_LIMIT || middle2.len() > LCS_LIMIT {
        common_lines(middle1, middle2)
    } else {
        longest_common_subsequence_length(middle1, middle2)
    };
    prefix + suffix + middle
}

fn longest_common_subsequence_length(chars1: &[char], chars2: &[char]) -> usize {
    let n = chars2.len();
    let mut prev = vec![0usize; n + 1];
    let mut curr = vec![0usize; n + 1];

    for c1 in chars1 {
        for j in 1..=n {
            curr[j] = if *c1 == chars2[j - 1] {
                prev[j - 1] + 1
            } else {
                prev[j].max(curr[j - 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
        curr.fill(0);
    }

    prev[n]
}

/// Characters in lines both sides share, independent of where they sit
fn common_lines(chars1: &[char], chars2: &[char]) -> usize {
    let mut available: HashMap<&[char], usize> = HashMap::new();
    for line in chars2.split(|c| *c == '\n') {
        *available.entry(line).or_default() += 1;
    }

    let mut common = 0;
    for line in chars1.split(|c| *c == '\n') {
        if let Some(count) = available.get_mut(line).filter(|count| **count > 0) {
            *count -= 1;
            common += line.len() + 1;
        }
    }
    common.min(chars1.len()).min(chars2.len())
}
