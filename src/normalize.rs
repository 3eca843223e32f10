/// Canonical token form of a header or column name.
///
/// Lower-cases and trims, drops everything outside `[a-z0-9_\s-]`, then
/// collapses each run of whitespace/hyphens into a single underscore.
/// `"B. First-Name "` becomes `"b_first_name"`.
pub fn normalize(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let mut token = String::with_capacity(lowered.len());
    let mut in_separator = false;

    for c in lowered.chars() {
        if c.is_ascii_whitespace() || c == '-' {
            if !in_separator {
                token.push('_');
                in_separator = true;
            }
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            token.push(c);
            in_separator = false;
        }
        // anything else is dropped without ending a separator run
    }

    token
}

#[cfg(test)]
mod tests {
    use super::normalize;
    use proptest::prelude::*;

    #[test]
    fn lowercases_and_underscores() {
        assert_eq!(normalize("First Name"), "first_name");
        assert_eq!(normalize("  Last   Name  "), "last_name");
        assert_eq!(normalize("extension-name"), "extension_name");
    }

    #[test]
    fn strips_punctuation() {
        assert_eq!(normalize("B. First Name"), "b_first_name");
        assert_eq!(normalize("City/Municipality"), "citymunicipality");
        assert_eq!(normalize("Contact No."), "contact_no");
    }

    #[test]
    fn separators_split_by_dropped_chars_collapse() {
        assert_eq!(normalize("a - . - b"), "a_b");
    }

    #[test]
    fn degenerate_input_normalizes_to_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("???"), "");
        assert_eq!(normalize("名前"), "");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(input in any::<String>()) {
            let once = normalize(&input);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn output_alphabet_is_restricted(input in "[ -~]{0,40}") {
            let token = normalize(&input);
            prop_assert!(token.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
        }
    }
}
