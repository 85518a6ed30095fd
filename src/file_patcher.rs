//! Verified text patching of scaffolded project files
//!
//! Every operation reads the whole file as raw bytes, computes the new
//! content in memory, and only then writes it back atomically (temp file next
//! to the real file, fsync, rename). If the target is not located, nothing is
//! written. Content is never required to be valid UTF-8.
//!
//! Mode policy differs per operation: literal replace, regex replace and
//! prepend keep the original permission bits; uncomment always writes `0644`.

use std::fs::{self, Permissions};
use std::io::Write;
use std::path::{Path, PathBuf};

use memchr::memmem;
use regex::bytes::Regex;
use tempfile::NamedTempFile;

use crate::error::PatchError;

/// Mode applied to files rewritten by [`uncomment_code`].
pub const UNCOMMENT_FILE_MODE: u32 = 0o644;

/// What to locate in a file and how to rewrite it.
#[derive(Debug, Clone)]
pub enum Patch {
    /// Replace every occurrence of `old` with `new`
    Literal { old: String, new: String },
    /// Replace every match of `pattern`; `replacement` may use `$1` / `${name}`
    Regex { pattern: Regex, replacement: String },
    /// Strip `prefix` from each line of the verbatim block `target`
    Uncomment { target: String, prefix: String },
    /// Insert `line` at the very start of the file
    Prepend { line: String },
}

/// How the rewritten file's permission bits are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Keep the mode the file had when it was read
    Preserve,
    /// Always write with this mode (unix only)
    Fixed(u32),
}

/// Result of computing a patch without writing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchPreview {
    pub path: PathBuf,
    pub original: Vec<u8>,
    pub patched: Vec<u8>,
}

impl Patch {
    pub fn literal(old: impl Into<String>, new: impl Into<String>) -> Self {
        Patch::Literal {
            old: old.into(),
            new: new.into(),
        }
    }

    /// Compile `pattern` into a regex patch.
    ///
    /// Fails with [`PatchError::InvalidPattern`] before any file is touched.
    pub fn regex(pattern: &str, replacement: impl Into<String>) -> Result<Self, PatchError> {
        let compiled = Regex::new(pattern).map_err(|source| PatchError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Patch::Regex {
            pattern: compiled,
            replacement: replacement.into(),
        })
    }

    pub fn uncomment(target: impl Into<String>, prefix: impl Into<String>) -> Self {
        Patch::Uncomment {
            target: target.into(),
            prefix: prefix.into(),
        }
    }

    pub fn prepend(line: impl Into<String>) -> Self {
        Patch::Prepend { line: line.into() }
    }

    pub fn write_mode(&self) -> WriteMode {
        match self {
            Patch::Uncomment { .. } => WriteMode::Fixed(UNCOMMENT_FILE_MODE),
            Patch::Literal { .. } | Patch::Regex { .. } | Patch::Prepend { .. } => {
                WriteMode::Preserve
            }
        }
    }

    /// Checks that need no file content (empty targets).
    fn check(&self) -> Result<(), PatchError> {
        match self {
            Patch::Literal { old, .. } if old.is_empty() => Err(PatchError::EmptyTarget),
            Patch::Uncomment { target, .. } if target.is_empty() => Err(PatchError::EmptyTarget),
            _ => Ok(()),
        }
    }

    /// Apply the patch to `content` in memory.
    ///
    /// `path` is only used to label errors.
    pub fn apply_to(&self, path: &Path, content: &[u8]) -> Result<Vec<u8>, PatchError> {
        self.check()?;
        match self {
            Patch::Literal { old, new } => {
                let finder = memmem::Finder::new(old.as_bytes());
                let mut out = Vec::with_capacity(content.len());
                let mut last = 0;
                for idx in finder.find_iter(content) {
                    out.extend_from_slice(&content[last..idx]);
                    out.extend_from_slice(new.as_bytes());
                    last = idx + old.len();
                }
                if last == 0 {
                    return Err(PatchError::TargetNotFound {
                        path: path.to_path_buf(),
                        target: old.clone(),
                    });
                }
                out.extend_from_slice(&content[last..]);
                Ok(out)
            }
            Patch::Regex {
                pattern,
                replacement,
            } => {
                let replaced = pattern.replace_all(content, replacement.as_bytes());
                // A substitution that reproduces its match is indistinguishable
                // from no match at all; both are reported as not found.
                if replaced[..] == content[..] {
                    return Err(PatchError::NoEffectiveChange {
                        path: path.to_path_buf(),
                        pattern: pattern.as_str().to_string(),
                    });
                }
                Ok(replaced.into_owned())
            }
            Patch::Uncomment { target, prefix } => {
                let Some(idx) = memmem::find(content, target.as_bytes()) else {
                    return Err(PatchError::UncommentTargetNotFound {
                        path: path.to_path_buf(),
                        target: target.clone(),
                    });
                };
                let mut out = Vec::with_capacity(content.len());
                out.extend_from_slice(&content[..idx]);
                out.extend(strip_line_prefixes(target.as_bytes(), prefix.as_bytes()));
                out.extend_from_slice(&content[idx + target.len()..]);
                Ok(out)
            }
            Patch::Prepend { line } => {
                let mut out = Vec::with_capacity(line.len() + content.len());
                out.extend_from_slice(line.as_bytes());
                out.extend_from_slice(content);
                Ok(out)
            }
        }
    }
}

/// Remove a single leading `prefix` from every line of `block`.
///
/// Line terminators are kept as they were, so a block without a trailing
/// newline does not gain one.
pub fn strip_line_prefixes(block: &[u8], prefix: &[u8]) -> Vec<u8> {
    block
        .split_inclusive(|&b| b == b'\n')
        .flat_map(|line| line.strip_prefix(prefix).unwrap_or(line))
        .copied()
        .collect()
}

/// Read `path` and compute the result of `patch` without writing anything.
pub fn preview_patch(path: &Path, patch: &Patch) -> Result<PatchPreview, PatchError> {
    patch.check()?;
    let original = fs::read(path).map_err(|e| PatchError::io(path, e))?;
    let patched = patch.apply_to(path, &original)?;
    Ok(PatchPreview {
        path: path.to_path_buf(),
        original,
        patched,
    })
}

/// Apply `patch` to the file at `path`.
///
/// A symlinked `path` is followed; the file it points to is rewritten and the
/// link stays in place. On error the file is left exactly as it was.
pub fn apply_patch(path: &Path, patch: &Patch) -> Result<(), PatchError> {
    patch.check()?;
    let target = fs::canonicalize(path).map_err(|e| PatchError::io(path, e))?;
    let metadata = fs::metadata(&target).map_err(|e| PatchError::io(path, e))?;
    let original = fs::read(&target).map_err(|e| PatchError::io(path, e))?;
    let patched = patch.apply_to(path, &original)?;

    let permissions = match patch.write_mode() {
        WriteMode::Preserve => metadata.permissions(),
        WriteMode::Fixed(mode) => fixed_permissions(metadata.permissions(), mode),
    };
    atomic_write(path, &target, &patched, permissions)
}

/// Replace all instances of `old` with `new` in the file at `path`.
pub fn replace_in_file(path: impl AsRef<Path>, old: &str, new: &str) -> Result<(), PatchError> {
    apply_patch(path.as_ref(), &Patch::literal(old, new))
}

/// Replace every match of `pattern` with `replacement` in the file at `path`.
///
/// Fails when the substitution leaves the content unchanged.
pub fn replace_regex_in_file(
    path: impl AsRef<Path>,
    pattern: &str,
    replacement: &str,
) -> Result<(), PatchError> {
    let patch = Patch::regex(pattern, replacement)?;
    apply_patch(path.as_ref(), &patch)
}

/// Find the verbatim block `target` and remove `prefix` from the start of each of its lines.
pub fn uncomment_code(
    path: impl AsRef<Path>,
    target: &str,
    prefix: &str,
) -> Result<(), PatchError> {
    apply_patch(path.as_ref(), &Patch::uncomment(target, prefix))
}

/// Insert `line` before the current content of the file at `path`.
///
/// Not idempotent: calling twice inserts the line twice.
pub fn prepend_to_file(path: impl AsRef<Path>, line: &str) -> Result<(), PatchError> {
    apply_patch(path.as_ref(), &Patch::prepend(line))
}

#[cfg(unix)]
fn fixed_permissions(_current: Permissions, mode: u32) -> Permissions {
    use std::os::unix::fs::PermissionsExt;
    Permissions::from_mode(mode)
}

#[cfg(not(unix))]
fn fixed_permissions(current: Permissions, _mode: u32) -> Permissions {
    current
}

/// Write `content` over `target` through a temp file in its directory.
///
/// `path` is what the caller asked for and only labels errors.
fn atomic_write(
    path: &Path,
    target: &Path,
    content: &[u8],
    permissions: Permissions,
) -> Result<(), PatchError> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| PatchError::io(path, e))?;
    temp.write_all(content).map_err(|e| PatchError::io(path, e))?;
    temp.as_file()
        .set_permissions(permissions)
        .map_err(|e| PatchError::io(path, e))?;
    temp.as_file().sync_all().map_err(|e| PatchError::io(path, e))?;
    temp.persist(target).map_err(|e| PatchError::io(path, e.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[cfg(unix)]
    fn mode_of(path: &Path) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[cfg(unix)]
    fn set_mode(path: &Path, mode: u32) {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_replace_in_file_replaces_every_occurrence() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "Makefile", "IMG ?= controller:latest\nIMG2 ?= controller:latest\n");

        replace_in_file(&path, "controller:latest", "quay.io/example/memcached:v0.0.1").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "IMG ?= quay.io/example/memcached:v0.0.1\nIMG2 ?= quay.io/example/memcached:v0.0.1\n"
        );
    }

    #[test]
    fn test_replace_in_file_missing_target_leaves_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", "hello world\n");

        let err = replace_in_file(&path, "goodbye", "x").unwrap_err();
        assert!(matches!(err, PatchError::TargetNotFound { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello world\n");
    }

    #[test]
    fn test_replace_in_file_empty_target_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", "abc");

        let err = replace_in_file(&path, "", "x").unwrap_err();
        assert!(matches!(err, PatchError::EmptyTarget));
        assert_eq!(fs::read_to_string(&path).unwrap(), "abc");
    }

    #[test]
    fn test_replace_in_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.txt");

        let err = replace_in_file(&path, "a", "b").unwrap_err();
        let io = err.io_error().expect("io error");
        assert_eq!(io.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    #[cfg(unix)]
    fn test_replace_in_file_preserves_mode() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "run.sh", "echo old\n");
        set_mode(&path, 0o755);

        replace_in_file(&path, "old", "new").unwrap();

        assert_eq!(mode_of(&path), 0o755);
        assert_eq!(fs::read_to_string(&path).unwrap(), "echo new\n");
    }

    #[test]
    fn test_replace_regex_with_backreference() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "deploy.yaml", "image: controller:latest\nreplicas: 1\n");

        replace_regex_in_file(&path, r"image: (\w+):latest", "image: ${1}:v1").unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "image: controller:v1\nreplicas: 1\n"
        );
    }

    #[test]
    fn test_replace_regex_no_match_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", "alpha beta\n");

        let err = replace_regex_in_file(&path, "gamma", "delta").unwrap_err();
        assert!(matches!(err, PatchError::NoEffectiveChange { .. }));
        assert!(err.is_not_found());
        assert_eq!(fs::read_to_string(&path).unwrap(), "alpha beta\n");
    }

    #[test]
    fn test_replace_regex_identity_substitution_reports_not_found() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", "alpha beta\n");

        // Matches, but rewrites each match to itself.
        let err = replace_regex_in_file(&path, "(alpha)", "$1").unwrap_err();
        assert!(matches!(err, PatchError::NoEffectiveChange { .. }));
    }

    #[test]
    fn test_replace_regex_invalid_pattern_before_io() {
        // The file does not exist: a pattern error must win over the I/O error.
        let err = replace_regex_in_file("/definitely/not/here.txt", "(unclosed", "x").unwrap_err();
        assert!(matches!(err, PatchError::InvalidPattern { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn test_replace_regex_preserves_mode() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", "v1\n");
        set_mode(&path, 0o600);

        replace_regex_in_file(&path, r"v\d", "v2").unwrap();

        assert_eq!(mode_of(&path), 0o600);
    }

    #[test]
    fn test_uncomment_block_in_middle() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "main.go", "x\n// line1\n// line2\ny\n");

        uncomment_code(&path, "// line1\n// line2\n", "// ").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "x\nline1\nline2\ny\n");
    }

    #[test]
    fn test_uncomment_block_at_end_without_trailing_newline() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "kustomization.yaml", "resources:\n#- ../prometheus\n#- ../webhook");

        uncomment_code(&path, "#- ../prometheus\n#- ../webhook", "#").unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "resources:\n- ../prometheus\n- ../webhook"
        );
    }

    #[test]
    fn test_uncomment_only_strips_leading_prefix() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.yaml", "#a: '#b'\n  #c\n");

        uncomment_code(&path, "#a: '#b'\n  #c\n", "#").unwrap();

        // Second line does not start with the prefix and is kept as is.
        assert_eq!(fs::read_to_string(&path).unwrap(), "a: '#b'\n  #c\n");
    }

    #[test]
    fn test_uncomment_only_first_occurrence() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", "#x\n#x\n");

        uncomment_code(&path, "#x\n", "#").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "x\n#x\n");
    }

    #[test]
    fn test_uncomment_missing_block_leaves_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "main.go", "x\n// line1\ny\n");

        let err = uncomment_code(&path, "// line1\n// line2\n", "// ").unwrap_err();
        assert!(matches!(err, PatchError::UncommentTargetNotFound { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "x\n// line1\ny\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_uncomment_writes_fixed_mode() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", "#on\n");
        set_mode(&path, 0o600);

        uncomment_code(&path, "#on\n", "#").unwrap();

        assert_eq!(mode_of(&path), UNCOMMENT_FILE_MODE);
    }

    #[test]
    fn test_prepend_line() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "PROJECT", "domain: example.com\n");

        prepend_to_file(&path, "multigroup: true\n").unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "multigroup: true\ndomain: example.com\n"
        );
    }

    #[test]
    fn test_prepend_twice_duplicates_line() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "PROJECT", "domain: example.com\n");

        prepend_to_file(&path, "multigroup: true\n").unwrap();
        prepend_to_file(&path, "multigroup: true\n").unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "multigroup: true\nmultigroup: true\ndomain: example.com\n"
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_prepend_preserves_mode() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "PROJECT", "domain: example.com\n");
        set_mode(&path, 0o640);

        prepend_to_file(&path, "multigroup: true\n").unwrap();

        assert_eq!(mode_of(&path), 0o640);
    }

    #[test]
    fn test_prepend_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = prepend_to_file(dir.path().join("PROJECT"), "x\n").unwrap_err();
        assert!(matches!(err, PatchError::Io { .. }));
    }

    #[test]
    fn test_preview_does_not_write() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.txt", "foo bar\n");

        let preview = preview_patch(&path, &Patch::literal("foo", "baz")).unwrap();

        assert_eq!(preview.original, b"foo bar\n");
        assert_eq!(preview.patched, b"baz bar\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "foo bar\n");
    }

    #[test]
    fn test_strip_line_prefixes_keeps_terminators() {
        assert_eq!(strip_line_prefixes(b"# a\r\n# b", b"# "), b"a\r\nb");
        assert_eq!(strip_line_prefixes(b"", b"#"), b"");
    }

    #[test]
    fn test_replace_in_non_utf8_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("values.yaml");
        fs::write(&path, b"name: caf\xe9\nimage: controller:latest\n").unwrap();

        replace_in_file(&path, "controller:latest", "quay.io/example/foo:v0.0.1").unwrap();

        assert_eq!(
            fs::read(&path).unwrap(),
            b"name: caf\xe9\nimage: quay.io/example/foo:v0.0.1\n"
        );
    }

    #[test]
    fn test_regex_and_uncomment_on_non_utf8_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("main.go");
        fs::write(&path, b"// \xff\xfe\n//x := 1\nv1\n").unwrap();

        uncomment_code(&path, "//x := 1\n", "//").unwrap();
        replace_regex_in_file(&path, r"v(\d)", "v${1}0").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"// \xff\xfe\nx := 1\nv10\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_patch_writes_through_symlink() {
        let dir = TempDir::new().unwrap();
        let real = write_file(&dir, "real.yaml", "a: old\n");
        let link = dir.path().join("link.yaml");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        set_mode(&real, 0o600);

        replace_in_file(&link, "old", "new").unwrap();

        assert_eq!(fs::read_to_string(&real).unwrap(), "a: new\n");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(mode_of(&real), 0o600);
    }

    #[test]
    fn test_write_modes() {
        assert_eq!(Patch::literal("a", "b").write_mode(), WriteMode::Preserve);
        assert_eq!(Patch::prepend("a").write_mode(), WriteMode::Preserve);
        assert_eq!(
            Patch::uncomment("a", "#").write_mode(),
            WriteMode::Fixed(UNCOMMENT_FILE_MODE)
        );
    }
}
