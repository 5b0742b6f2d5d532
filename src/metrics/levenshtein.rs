pub fn indel_distance(left: &str, right: &str) -> usize {
    let left = left.chars().collect::<Vec<char>>();
    let right = right.chars().collect::<Vec<char>>();
    left.len() + right.len() - 2 * longest_common_subsequence(&left, &right)
}

/// Normalized similarity in `[0, 1]`: `1 - indel / (len_a + len_b)`.
pub fn ratio(left: &str, right: &str) -> f64 {
    let total = left.chars().count() + right.chars().count();
    if total == 0 {
        return 1.0;
    }
    1.0 - indel_distance(left, right) as f64 / total as f64
}

fn longest_common_subsequence(left: &[char], right: &[char]) -> usize {
    if left.is_empty() || right.is_empty() {
        return 0;
    }

    let mut previous = vec![0usize; right.len() + 1];
    let mut current = vec![0usize; right.len() + 1];

    for left_char in left {
        for (index, right_char) in right.iter().enumerate() {
            current[index + 1] = if left_char == right_char {
                previous[index] + 1
            } else {
                current[index].max(previous[index + 1])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[right.len()]
}
