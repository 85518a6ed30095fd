//! Property-based tests for scaffold-testkit
//!
//! These exercise the file patching contracts against real temp files:
//! every operation either rewrites the file as requested or leaves it
//! byte-for-byte untouched.

use std::fs;
use tempfile::TempDir;

use scaffold_testkit::{
    prepend_to_file, replace_in_file, replace_regex_in_file, uncomment_code, PatchError,
};

use proptest::prelude::*;

fn file_with(content: &str) -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("test.txt");
    fs::write(&file_path, content).unwrap();
    (temp_dir, file_path)
}

// ============================================================================
// Property 1: Literal replace
// ============================================================================

proptest! {
    /// Every occurrence of a present target is replaced and none remain
    #[test]
    fn prop_literal_replace_removes_all_occurrences(
        prefix in "[a-z]{0,10}",
        suffix in "[a-z]{0,10}",
        count in 1usize..10
    ) {
        let text = format!("{}{}{}", prefix, "FOO".repeat(count), suffix);
        let (_dir, file_path) = file_with(&text);
        let expected = text.matches("FOO").count();

        replace_in_file(&file_path, "FOO", "bar").unwrap();

        let output = fs::read_to_string(&file_path).unwrap();
        prop_assert!(!output.contains("FOO"));
        prop_assert_eq!(output, text.replace("FOO", "bar"));
        prop_assert!(expected >= count);
    }

    /// An absent target fails and leaves the file byte-identical
    #[test]
    fn prop_literal_replace_absent_target_is_noop(
        text in "[a-z \n]{0,200}",
        target in "[A-Z]{1,5}"
    ) {
        let (_dir, file_path) = file_with(&text);

        let err = replace_in_file(&file_path, &target, "x").unwrap_err();

        let is_not_found = matches!(err, PatchError::TargetNotFound { .. });
        prop_assert!(is_not_found);
        prop_assert_eq!(fs::read(&file_path).unwrap(), text.into_bytes());
    }
}

// ============================================================================
// Property 2: Regex replace
// ============================================================================

proptest! {
    /// A pattern that matches nothing fails and leaves the file untouched
    #[test]
    fn prop_regex_no_match_is_noop(
        text in "[a-z \n]{0,200}",
        digits in "[0-9]{1,4}"
    ) {
        let (_dir, file_path) = file_with(&text);

        let err = replace_regex_in_file(&file_path, &digits, "N").unwrap_err();

        prop_assert!(err.is_not_found());
        prop_assert_eq!(fs::read_to_string(&file_path).unwrap(), text);
    }

    /// A matching pattern with a differing replacement is applied
    #[test]
    fn prop_regex_match_is_applied(
        prefix in "[a-z]{0,20}",
        version in 0u32..1000
    ) {
        let text = format!("{}\nversion: v{}\n", prefix, version);
        let (_dir, file_path) = file_with(&text);

        replace_regex_in_file(&file_path, r"version: v(\d+)", "version: release-$1").unwrap();

        let output = fs::read_to_string(&file_path).unwrap();
        prop_assert_eq!(output, format!("{}\nversion: release-{}\n", prefix, version));
    }
}

// ============================================================================
// Property 3: Uncomment
// ============================================================================

proptest! {
    /// Content around the uncommented block is preserved exactly
    #[test]
    fn prop_uncomment_preserves_surroundings(
        before in "[a-z \n]{0,50}",
        after in "[a-z \n]{0,50}",
        lines in prop::collection::vec("[a-z]{1,10}", 1..6)
    ) {
        let block: String = lines.iter().map(|l| format!("// {}\n", l)).collect();
        let uncommented: String = lines.iter().map(|l| format!("{}\n", l)).collect();
        let text = format!("{}{}{}", before, block, after);
        let (_dir, file_path) = file_with(&text);

        uncomment_code(&file_path, &block, "// ").unwrap();

        let output = fs::read_to_string(&file_path).unwrap();
        prop_assert_eq!(output, format!("{}{}{}", before, uncommented, after));
    }
}

// ============================================================================
// Property 4: Prepend
// ============================================================================

proptest! {
    /// Prepend puts the line first and keeps the rest unchanged
    #[test]
    fn prop_prepend_keeps_content(
        text in "[a-z: \n]{0,200}",
        line in "[a-z]{1,10}: [a-z]{1,10}\n"
    ) {
        let (_dir, file_path) = file_with(&text);

        prepend_to_file(&file_path, &line).unwrap();

        let output = fs::read_to_string(&file_path).unwrap();
        prop_assert_eq!(output, format!("{}{}", line, text));
    }
}

// ============================================================================
// Examples from the documented contracts
// ============================================================================

#[test]
fn uncomment_example_block() {
    let (_dir, file_path) = file_with("x\n// line1\n// line2\ny\n");

    uncomment_code(&file_path, "// line1\n// line2\n", "// ").unwrap();

    assert_eq!(fs::read_to_string(&file_path).unwrap(), "x\nline1\nline2\ny\n");
}

#[test]
fn uncomment_missing_block_leaves_file() {
    let (_dir, file_path) = file_with("x\ny\n");

    let err = uncomment_code(&file_path, "// line1\n", "// ").unwrap_err();

    assert!(matches!(err, PatchError::UncommentTargetNotFound { .. }));
    assert_eq!(fs::read_to_string(&file_path).unwrap(), "x\ny\n");
}

#[test]
fn prepend_multigroup_example() {
    let (_dir, file_path) = file_with("domain: example.com\n");

    prepend_to_file(&file_path, "multigroup: true\n").unwrap();

    assert_eq!(
        fs::read_to_string(&file_path).unwrap(),
        "multigroup: true\ndomain: example.com\n"
    );
}

/// Prepend is not idempotent: a second call duplicates the line.
#[test]
fn prepend_twice_is_not_idempotent() {
    let (_dir, file_path) = file_with("domain: example.com\n");

    prepend_to_file(&file_path, "multigroup: true\n").unwrap();
    prepend_to_file(&file_path, "multigroup: true\n").unwrap();

    let output = fs::read_to_string(&file_path).unwrap();
    assert_eq!(output.matches("multigroup: true\n").count(), 2);
}
