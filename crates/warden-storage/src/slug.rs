/// Lowercase, collapse anything that isn't alphanumeric into a single
/// dash, trim leading/trailing dashes, and cap at 50 characters.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_dash = false;
    for ch in text.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash && !out.is_empty() {
            out.push('-');
            last_was_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out.truncate(50);
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "entry".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugifies_punctuation_and_case() {
        assert_eq!(slugify("Take Out The Trash!"), "take-out-the-trash");
    }

    #[test]
    fn collapses_runs_of_separators() {
        assert_eq!(slugify("a   b---c"), "a-b-c");
    }

    #[test]
    fn truncates_to_fifty_chars() {
        let long = "x".repeat(80);
        assert_eq!(slugify(&long).len(), 50);
    }

    #[test]
    fn empty_input_gets_placeholder() {
        assert_eq!(slugify("   !!! "), "entry");
    }
}
