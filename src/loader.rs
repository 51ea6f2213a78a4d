//! Library Loader: turns definition files into [`Library`] values.
//!
//! Every problem with a single file becomes a [`LoadFailure`] value so that
//! one bad file never stops its siblings from loading.

use crate::models::{is_valid_id, Library, LibraryRecord, Snippet, SnippetRecord};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Extension of library definition files.
pub const LIBRARY_EXTENSION: &str = "json";

/// A file or root that could not be loaded, with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub reason: String,
}

impl LoadFailure {
    pub fn new(path: &Path, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}

/// Outcome of a batch load: everything that parsed plus everything that didn't.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub libraries: Vec<Library>,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn snippet_count(&self) -> usize {
        self.libraries.iter().map(|l| l.snippets.len()).sum()
    }
}

/// Load a single library file.
pub fn load(path: &Path) -> Result<Library, LoadFailure> {
    let bytes = fs::read(path).map_err(|e| LoadFailure::new(path, format!("cannot read file: {}", e)))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| LoadFailure::new(path, format!("file is not valid UTF-8: {}", e)))?;
    parse(&text, Some(path)).map_err(|reason| LoadFailure::new(path, reason))
}

/// Parse library text. `source` is recorded as the library's origin.
pub fn parse(text: &str, source: Option<&Path>) -> Result<Library, String> {
    let record: LibraryRecord = serde_json::from_str(text).map_err(|e| {
        if e.is_data() {
            format!("invalid library: {}", e)
        } else {
            format!("invalid JSON: {}", e)
        }
    })?;

    if record.name.trim().is_empty() {
        return Err("library field `name` must not be blank".to_string());
    }
    if record.snippets.is_empty() {
        return Err("field `snippets` must not be empty".to_string());
    }

    let mut library = Library::new(record.name);
    library.description = record.description;
    library.language = record.language;
    library.file_extensions = record.file_extensions;
    library.version = record.version;
    library.author = record.author;
    library.source_path = source.map(Path::to_path_buf);

    let mut seen = HashSet::new();
    for (index, entry) in record.snippets.into_iter().enumerate() {
        let snippet = to_snippet(entry)
            .map_err(|reason| format!("snippet #{}: {}", index + 1, reason))?;
        if !seen.insert(snippet.id.clone()) {
            return Err(format!("duplicate snippet id '{}'", snippet.id));
        }
        let snippet = library.adopt(snippet);
        library.snippets.push(snippet);
    }

    Ok(library)
}

fn to_snippet(record: SnippetRecord) -> Result<Snippet, String> {
    if !is_valid_id(&record.id) {
        return Err(format!(
            "id '{}' must be a lowercase letter followed by lowercase letters, digits or underscores",
            record.id
        ));
    }
    if record.name.trim().is_empty() {
        return Err(format!("'{}': snippet field `name` must not be blank", record.id));
    }
    if record.content.is_empty() {
        return Err(format!("'{}': field `content` must not be empty", record.id));
    }

    let mut snippet = Snippet::new(record.id, record.name, record.content);
    snippet.description = record.description;
    snippet.category = record.category;
    snippet.tags = record.tags;
    Ok(snippet)
}

/// Recursively find definition files under `root`, in file-name order.
pub fn discover(root: &Path) -> (Vec<PathBuf>, Vec<LoadFailure>) {
    let mut files = Vec::new();
    let mut failures = Vec::new();

    if root.is_file() {
        files.push(root.to_path_buf());
        return (files, failures);
    }

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && is_library_file(entry.path()) {
                    files.push(entry.into_path());
                }
            }
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                failures.push(LoadFailure::new(&path, format!("cannot scan: {}", e)));
            }
        }
    }

    (files, failures)
}

fn is_library_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(LIBRARY_EXTENSION))
}

/// Load every library found under `roots`, collecting failures as values.
pub fn load_all(roots: &[PathBuf]) -> LoadReport {
    let mut report = LoadReport::default();

    for root in roots {
        if !root.exists() {
            warn!(path = %root.display(), "Library root does not exist");
            report
                .failures
                .push(LoadFailure::new(root, "library root does not exist"));
            continue;
        }

        let (files, scan_failures) = discover(root);
        report.failures.extend(scan_failures);

        for file in files {
            match load(&file) {
                Ok(library) => {
                    debug!(
                        library = %library.name,
                        snippets = library.snippets.len(),
                        path = %file.display(),
                        "Loaded library"
                    );
                    report.libraries.push(library);
                }
                Err(failure) => {
                    warn!(path = %failure.path.display(), reason = %failure.reason, "Failed to load library");
                    report.failures.push(failure);
                }
            }
        }
    }

    info!(
        libraries = report.libraries.len(),
        snippets = report.snippet_count(),
        failures = report.failures.len(),
        "Library scan finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_LIBRARY_VERSION;
    use tempfile::TempDir;

    const PYTHON: &str = r#"{
        "name": "Python",
        "language": "python",
        "file_extensions": [".py"],
        "version": 2,
        "snippets": [
            {"id": "for_loop", "name": "For Loop", "content": "for i in range(10):\n\tprint(i)", "category": "Control", "tags": ["loop"]},
            {"id": "main_guard", "name": "Main Guard", "content": "if __name__ == \"__main__\":\n    main()"},
            {"id": "smile", "name": "Smile", "content": "print(\"☺ \\ café\")", "description": "unicode"}
        ]
    }"#;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, text).unwrap();
        path
    }

    fn reason_for(text: &str) -> String {
        parse(text, None).unwrap_err()
    }

    #[test]
    fn parses_full_library() {
        let library = parse(PYTHON, None).unwrap();

        assert_eq!(library.name, "Python");
        assert_eq!(library.version, "2");
        assert_eq!(library.file_extensions, vec![".py"]);
        assert_eq!(library.snippets.len(), 3);
        assert_eq!(library.snippets[0].content, "for i in range(10):\n\tprint(i)");
        assert_eq!(library.snippets[2].content, "print(\"\u{263A} \\ caf\u{e9}\")");
        assert!(library.snippets.iter().all(|s| s.library_name == "Python"));
        assert!(library.snippets.iter().all(|s| s.language == "python"));
    }

    #[test]
    fn optional_fields_default() {
        let library =
            parse(r#"{"name": "Plain", "snippets": [{"id": "a", "name": "A", "content": "x"}]}"#, None).unwrap();

        assert_eq!(library.version, DEFAULT_LIBRARY_VERSION);
        assert_eq!(library.language, "");
        assert!(library.snippets[0].tags.is_empty());
        assert_eq!(library.snippets[0].category, "");
    }

    #[test]
    fn structural_errors_are_reported() {
        assert!(reason_for("{ not json").starts_with("invalid JSON"));
        assert!(reason_for("[]").starts_with("invalid library"));
        assert!(reason_for(r#"{"name": "  ", "snippets": []}"#).contains("must not be blank"));
        assert!(reason_for(r#"{"snippets": []}"#).contains("`name`"));
        assert!(reason_for(r#"{"name": "X"}"#).contains("`snippets`"));
        assert!(reason_for(r#"{"name": "X", "snippets": []}"#).contains("must not be empty"));
        assert!(reason_for(r#"{"name": "X", "snippets": [{"name": "A", "content": "x"}]}"#).contains("`id`"));
        assert!(reason_for(r#"{"name": "X", "snippets": [{"id": "a", "content": "x"}]}"#).contains("`name`"));
        assert!(reason_for(r#"{"name": "X", "snippets": [{"id": "a", "name": "A", "content": ""}]}"#)
            .contains("`content` must not be empty"));
        assert!(reason_for(r#"{"name": "X", "snippets": [{"id": "Bad", "name": "A", "content": "x"}]}"#)
            .contains("lowercase"));
        assert!(reason_for(r#"{"name": "X", "snippets": [{"id": "a", "name": "A", "content": "x", "tags": "t"}]}"#)
            .starts_with("invalid library"));
    }

    #[test]
    fn duplicate_ids_fail() {
        let reason = reason_for(
            r#"{"name": "X", "snippets": [
                {"id": "a", "name": "A", "content": "x"},
                {"id": "a", "name": "B", "content": "y"}
            ]}"#,
        );
        assert_eq!(reason, "duplicate snippet id 'a'");
    }

    #[test]
    fn load_reports_path_of_bad_file() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "bad.json", "{");

        let failure = load(&path).unwrap_err();
        assert_eq!(failure.path, path);
        assert!(failure.to_string().contains("bad.json"));
    }

    #[test]
    fn invalid_utf8_is_a_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("binary.json");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        let failure = load(&path).unwrap_err();
        assert!(failure.reason.contains("UTF-8"));
    }

    #[test]
    fn discovery_is_recursive_and_filters_extensions() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        write(dir.path(), "b.json", PYTHON);
        write(&nested, "a.JSON", PYTHON);
        write(dir.path(), "notes.txt", "ignored");

        let (files, failures) = discover(dir.path());
        assert!(failures.is_empty());
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| is_library_file(f)));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_files_are_loaded() {
        let dir = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        let target = write(elsewhere.path(), "python.json", PYTHON);
        std::os::unix::fs::symlink(&target, dir.path().join("python.json")).unwrap();

        let report = load_all(&[dir.path().to_path_buf()]);
        assert_eq!(report.libraries.len(), 1);
        assert!(report.failures.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_loop_is_a_failure() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "py.json", PYTHON);
        std::os::unix::fs::symlink(dir.path(), dir.path().join("again")).unwrap();

        let report = load_all(&[dir.path().to_path_buf()]);
        assert_eq!(report.libraries.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].reason.starts_with("cannot scan"));
    }

    #[test]
    fn root_may_be_a_single_file() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "only.json", PYTHON);

        let report = load_all(&[path]);
        assert_eq!(report.libraries.len(), 1);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn missing_root_does_not_abort_other_roots() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "py.json", PYTHON);
        let missing = dir.path().join("missing");

        let report = load_all(&[missing.clone(), dir.path().to_path_buf()]);
        assert_eq!(report.libraries.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, missing);
    }

    #[test]
    fn reserialized_library_reloads_identically() {
        let dir = TempDir::new().unwrap();
        let original = load(&write(dir.path(), "py.json", PYTHON)).unwrap();

        let copy_path = write(dir.path(), "copy.json", &original.to_json_pretty().unwrap());
        let reloaded = load(&copy_path).unwrap();

        assert_eq!(reloaded.snippets, original.snippets);
        assert_eq!(reloaded.file_extensions, original.file_extensions);
        assert_eq!(reloaded.version, original.version);
    }
}
