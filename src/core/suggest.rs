//! Nearest-name suggestions attached to hard failures.

const MAX_SUGGESTIONS: usize = 5;

/// Rank `candidates` by closeness to `query`: substring hits first, then by
/// case-insensitive edit distance. Candidates further than half the query
/// length away are dropped.
pub fn nearest_names<'a, I>(query: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let needle = simple(query).to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let threshold = (needle.chars().count() / 2).max(2);

    let mut scored: Vec<(usize, usize, &str)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let hay = simple(candidate).to_lowercase();
            if hay == needle && candidate == query {
                return None;
            }
            if hay.contains(&needle) || (!hay.is_empty() && needle.contains(&hay)) {
                return Some((0, hay.len().abs_diff(needle.len()), candidate));
            }
            let distance = levenshtein_distance(&hay, &needle);
            (distance <= threshold).then_some((1, distance, candidate))
        })
        .collect();

    scored.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));

    let mut out: Vec<String> = Vec::new();
    for (_, _, candidate) in scored {
        if !out.iter().any(|c| c == candidate) {
            out.push(candidate.to_string());
        }
        if out.len() == MAX_SUGGESTIONS {
            break;
        }
    }
    out
}

fn simple(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Calculate Levenshtein distance between two strings
fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let v1: Vec<char> = s1.chars().collect();
    let v2: Vec<char> = s2.chars().collect();

    let mut previous: Vec<usize> = (0..=v2.len()).collect();
    let mut current = vec![0; v2.len() + 1];

    for i in 1..=v1.len() {
        current[0] = i;
        for j in 1..=v2.len() {
            let cost = if v1[i - 1] == v2[j - 1] { 0 } else { 1 };
            current[j] = (previous[j] + 1)
                .min(current[j - 1] + 1)
                .min(previous[j - 1] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[v2.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("same", "same"), 0);
    }

    #[test]
    fn test_suggests_close_names_first() {
        let candidates = [
            "com.shop.OrderService",
            "com.shop.OrderRepository",
            "com.shop.UserService",
            "com.shop.Invoice",
        ];
        let suggestions = nearest_names("OrderServce", candidates);
        assert_eq!(suggestions.first().map(String::as_str), Some("com.shop.OrderService"));
        assert!(!suggestions.iter().any(|s| s == "com.shop.Invoice"));
    }

    #[test]
    fn test_substring_matches_are_suggested() {
        let suggestions = nearest_names("Order", ["com.shop.OrderService", "com.shop.Cart"]);
        assert_eq!(suggestions, vec!["com.shop.OrderService"]);
    }
}
