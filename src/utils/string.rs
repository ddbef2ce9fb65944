/// Returns true if `src` begins with `prefix`, comparing both with their lowercase forms.
/// An empty `prefix` matches everything.
pub fn starts_with_ignore_case(src: &str, prefix: &str) -> bool {
    let mut chars = src.chars().flat_map(char::to_lowercase);
    prefix
        .chars()
        .flat_map(char::to_lowercase)
        .all(|c| chars.next() == Some(c))
}
