//! The in-memory snippet index.
//!
//! Readers always see one complete generation of libraries: a reload builds
//! the next [`LibrarySet`] in full and only then swaps the shared pointer.

use crate::error::{Result, SnipError};
use crate::loader::{self, LoadFailure};
use crate::models::{slugify, Library, Snippet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// One published generation of loaded libraries.
#[derive(Debug, Default)]
pub struct LibrarySet {
    pub generation: u64,
    pub libraries: Vec<Library>,
}

impl LibrarySet {
    pub fn snippet_count(&self) -> usize {
        self.libraries.iter().map(|l| l.snippets.len()).sum()
    }

    pub fn all_snippets(&self) -> Vec<Snippet> {
        self.libraries
            .iter()
            .flat_map(|l| l.snippets.iter().cloned())
            .collect()
    }

    /// Linear scan in library order, then file order within a library.
    pub fn search(&self, query: &str) -> Vec<Snippet> {
        self.libraries
            .iter()
            .flat_map(|l| l.snippets.iter())
            .filter(|s| s.matches_filter(query))
            .cloned()
            .collect()
    }

    pub fn library(&self, name: &str) -> Option<&Library> {
        self.libraries.iter().find(|l| l.name == name)
    }
}

pub struct LibraryManager {
    roots: RwLock<Vec<PathBuf>>,
    current: RwLock<Arc<LibrarySet>>,
    // Held across scan and publish so generations follow scan order.
    reload_lock: Mutex<()>,
}

impl LibraryManager {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots: RwLock::new(roots),
            current: RwLock::new(Arc::new(LibrarySet::default())),
            reload_lock: Mutex::new(()),
        }
    }

    pub fn roots(&self) -> Vec<PathBuf> {
        self.roots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Point the manager at new roots. Takes effect on the next load.
    pub fn set_roots(&self, roots: Vec<PathBuf>) {
        *self.roots.write().unwrap_or_else(|e| e.into_inner()) = roots;
    }

    /// Scan all roots and publish the result as a new generation.
    /// Per-file problems come back as values; the load itself cannot fail.
    pub fn load_all(&self) -> Vec<LoadFailure> {
        let _reloading = self.reload_lock.lock().unwrap_or_else(|e| e.into_inner());
        let report = loader::load_all(&self.roots());
        self.publish(report.libraries);
        report.failures
    }

    pub fn reload(&self) -> Vec<LoadFailure> {
        info!("Reloading libraries");
        self.load_all()
    }

    fn publish(&self, libraries: Vec<Library>) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        let next = LibrarySet {
            generation: current.generation + 1,
            libraries,
        };
        *current = Arc::new(next);
    }

    /// The currently published generation. Holding it keeps a consistent view
    /// even if a reload publishes a newer one meanwhile.
    pub fn snapshot(&self) -> Arc<LibrarySet> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn search(&self, query: &str) -> Vec<Snippet> {
        self.snapshot().search(query)
    }

    pub fn get_all_snippets(&self) -> Vec<Snippet> {
        self.snapshot().all_snippets()
    }

    pub fn find_snippet(&self, library: &str, id: &str) -> Option<Snippet> {
        self.snapshot()
            .library(library)
            .and_then(|l| l.get(id))
            .cloned()
    }

    pub fn library_for_path(&self, path: &Path) -> Option<Library> {
        self.snapshot()
            .libraries
            .iter()
            .find(|l| l.source_path.as_deref() == Some(path))
            .cloned()
    }

    pub fn libraries_by_language(&self, language: &str) -> Vec<Library> {
        self.snapshot()
            .libraries
            .iter()
            .filter(|l| l.language.eq_ignore_ascii_case(language))
            .cloned()
            .collect()
    }

    /// Sorted distinct languages of code libraries.
    pub fn languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self
            .snapshot()
            .libraries
            .iter()
            .filter(|l| l.is_code())
            .map(|l| l.language.clone())
            .collect();
        languages.sort();
        languages.dedup();
        languages
    }

    /// Add `snippet` to `library_name`, replacing any snippet with the same id.
    /// The owning file is rewritten and the index reloaded.
    pub fn save_snippet(&self, snippet: Snippet, library_name: &str) -> Result<()> {
        validate_snippet(&snippet)?;
        let mut library = self.owned_library(library_name)?;
        let snippet = library.adopt(snippet);

        match library.snippets.iter_mut().find(|s| s.id == snippet.id) {
            Some(existing) => {
                info!(id = %snippet.id, library = %library.name, "Updating snippet");
                *existing = snippet;
            }
            None => {
                info!(id = %snippet.id, library = %library.name, "Adding snippet");
                library.snippets.push(snippet);
            }
        }

        write_library(&library)?;
        self.reload();
        Ok(())
    }

    pub fn delete_snippet(&self, id: &str, library_name: &str) -> Result<()> {
        let mut library = self.owned_library(library_name)?;
        let before = library.snippets.len();
        library.snippets.retain(|s| s.id != id);

        if library.snippets.len() == before {
            return Err(SnipError::SnippetNotFound {
                library: library_name.to_string(),
                id: id.to_string(),
            });
        }
        if library.snippets.is_empty() {
            return Err(SnipError::InvalidSnippet(format!(
                "'{}' is the last snippet of '{}'; a library needs at least one",
                id, library_name
            )));
        }

        info!(id = %id, library = %library_name, "Deleting snippet");
        write_library(&library)?;
        self.reload();
        Ok(())
    }

    /// Create `<first directory root>/<slug>.json` holding `first_snippet`.
    /// Single-file roots are skipped since nothing else under their parent
    /// would be loaded.
    pub fn create_library(
        &self,
        name: &str,
        description: &str,
        first_snippet: Snippet,
    ) -> Result<PathBuf> {
        validate_snippet(&first_snippet)?;
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(SnipError::InvalidSnippet(format!(
                "library name '{}' has no usable characters",
                name
            )));
        }

        let base = self
            .roots()
            .into_iter()
            .find(|root| !root.is_file())
            .ok_or_else(|| {
                SnipError::InvalidConfig("no library directory configured to create libraries in".to_string())
            })?;
        std::fs::create_dir_all(&base)?;

        let path = base.join(format!("{}.{}", slug, loader::LIBRARY_EXTENSION));
        if path.exists() {
            return Err(SnipError::Other(format!(
                "library file already exists: {}",
                path.display()
            )));
        }

        let mut library = Library::new(name);
        library.description = description.to_string();
        library.source_path = Some(path.clone());
        let first_snippet = library.adopt(first_snippet);
        library.snippets.push(first_snippet);

        write_library(&library)?;
        info!(library = %name, path = %path.display(), "Created library");
        self.reload();
        Ok(path)
    }

    fn owned_library(&self, name: &str) -> Result<Library> {
        let library = self
            .snapshot()
            .library(name)
            .cloned()
            .ok_or_else(|| SnipError::LibraryNotFound(name.to_string()))?;
        if library.source_path.is_none() {
            return Err(SnipError::Other(format!("library '{}' has no source file", name)));
        }
        Ok(library)
    }
}

fn validate_snippet(snippet: &Snippet) -> Result<()> {
    if !crate::models::is_valid_id(&snippet.id) {
        return Err(SnipError::InvalidSnippet(format!(
            "id '{}' must be a lowercase letter followed by lowercase letters, digits or underscores",
            snippet.id
        )));
    }
    if snippet.name.trim().is_empty() {
        return Err(SnipError::InvalidSnippet("name must not be blank".to_string()));
    }
    if snippet.content.is_empty() {
        return Err(SnipError::InvalidSnippet("content must not be empty".to_string()));
    }
    Ok(())
}

/// Write through a temp file in the same directory and rename over the
/// target, so a crash mid-write never leaves a truncated library.
fn write_library(library: &Library) -> Result<()> {
    let path = library
        .source_path
        .as_deref()
        .ok_or_else(|| SnipError::Other(format!("library '{}' has no source file", library.name)))?;
    write_atomically(path, &library.to_json_pretty()?)
}

pub(crate) fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents.as_bytes())?;
    file.write_all(b"\n")?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| {
        warn!(path = %path.display(), error = %e, "Failed to replace file");
        SnipError::Io(e.error)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use tempfile::TempDir;

    fn library_json(name: &str, ids: &[&str]) -> String {
        let snippets: Vec<String> = ids
            .iter()
            .map(|id| format!(r#"{{"id": "{id}", "name": "{id} name", "content": "{id} body", "tags": ["{id}_tag"]}}"#))
            .collect();
        format!(r#"{{"name": "{}", "language": "python", "snippets": [{}]}}"#, name, snippets.join(","))
    }

    fn manager_with(files: &[(&str, String)]) -> (TempDir, LibraryManager) {
        let dir = TempDir::new().unwrap();
        for (file, text) in files {
            fs::write(dir.path().join(file), text).unwrap();
        }
        let manager = LibraryManager::new(vec![dir.path().to_path_buf()]);
        manager.load_all();
        (dir, manager)
    }

    #[test]
    fn empty_query_returns_everything() {
        let (_dir, manager) = manager_with(&[
            ("a.json", library_json("A", &["one", "two"])),
            ("b.json", library_json("B", &["three"])),
        ]);

        assert_eq!(manager.search("").len(), 3);
        assert_eq!(manager.get_all_snippets().len(), 3);
    }

    #[test]
    fn search_matches_substrings_case_insensitively() {
        let mut loop_lib = Library::new("Loops");
        let mut by_name = Snippet::new("a", "For Loop", "x");
        by_name.library_name = "Loops".into();
        let mut by_tag = Snippet::new("b", "Iterate", "y");
        by_tag.tags = vec!["loop".into()];
        loop_lib.snippets = vec![by_name, by_tag, Snippet::new("c", "Class", "z")];
        let set = LibrarySet {
            generation: 1,
            libraries: vec![loop_lib],
        };

        let names: Vec<String> = set.search("LOOP").into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["For Loop", "Iterate"]);
        assert!(set.search("nothing here").is_empty());
    }

    #[test]
    fn reload_publishes_new_generation() {
        let (dir, manager) = manager_with(&[("a.json", library_json("A", &["one"]))]);
        let before = manager.snapshot();

        fs::write(dir.path().join("b.json"), library_json("B", &["two"])).unwrap();
        manager.reload();
        let after = manager.snapshot();

        assert_eq!(after.generation, before.generation + 1);
        assert_eq!(before.libraries.len(), 1);
        assert_eq!(after.libraries.len(), 2);
    }

    #[test]
    fn readers_never_see_a_mixed_generation() {
        let (dir, manager) = manager_with(&[
            ("a.json", library_json("A", &["one"])),
            ("b.json", library_json("B", &["two"])),
        ]);
        let manager = Arc::new(manager);
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let manager = Arc::clone(&manager);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    let snapshot = manager.snapshot();
                    let count = snapshot.snippet_count();
                    assert!(count == 2 || count == 4, "saw partial generation with {count}");
                }
            })
        };

        for round in 0..20 {
            let ids: &[&str] = if round % 2 == 0 { &["one", "x"] } else { &["one"] };
            fs::write(dir.path().join("a.json"), library_json("A", ids)).unwrap();
            let ids: &[&str] = if round % 2 == 0 { &["two", "y"] } else { &["two"] };
            fs::write(dir.path().join("b.json"), library_json("B", ids)).unwrap();
            manager.reload();
        }
        done.store(true, Ordering::SeqCst);
        reader.join().unwrap();
    }

    #[test]
    fn lookups_by_path_and_language() {
        let (dir, manager) = manager_with(&[
            ("a.json", library_json("A", &["one"])),
            ("t.json", r#"{"name": "Notes", "language": "text", "snippets": [{"id": "n", "name": "N", "content": "x"}]}"#.to_string()),
        ]);

        let by_path = manager.library_for_path(&dir.path().join("a.json")).unwrap();
        assert_eq!(by_path.name, "A");
        assert_eq!(manager.libraries_by_language("PYTHON").len(), 1);
        assert_eq!(manager.languages(), vec!["python"]);
        assert_eq!(manager.find_snippet("A", "one").unwrap().content, "one body");
    }

    #[test]
    fn save_snippet_updates_then_appends() {
        let (dir, manager) = manager_with(&[("a.json", library_json("A", &["one"]))]);

        let mut edited = Snippet::new("one", "Renamed", "new body");
        edited.tags = vec!["t".into()];
        manager.save_snippet(edited, "A").unwrap();
        manager.save_snippet(Snippet::new("two", "Two", "second"), "A").unwrap();

        let library = manager.library_for_path(&dir.path().join("a.json")).unwrap();
        let names: Vec<&str> = library.snippets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Renamed", "Two"]);
        assert_eq!(library.snippets[1].library_name, "A");
        assert_eq!(library.language, "python");
    }

    #[test]
    fn delete_snippet_keeps_at_least_one() {
        let (_dir, manager) = manager_with(&[("a.json", library_json("A", &["one", "two"]))]);

        manager.delete_snippet("one", "A").unwrap();
        assert!(manager.find_snippet("A", "one").is_none());
        assert!(matches!(
            manager.delete_snippet("two", "A"),
            Err(SnipError::InvalidSnippet(_))
        ));
        assert!(matches!(
            manager.delete_snippet("ghost", "A"),
            Err(SnipError::SnippetNotFound { .. })
        ));
    }

    #[test]
    fn create_library_writes_into_first_root() {
        let (dir, manager) = manager_with(&[]);

        let path = manager
            .create_library("My Snippets", "mine", Snippet::new("hello", "Hello", "hi"))
            .unwrap();
        assert_eq!(path, dir.path().join("my-snippets.json"));
        assert_eq!(manager.find_snippet("My Snippets", "hello").unwrap().content, "hi");

        let again = manager.create_library("My Snippets", "", Snippet::new("x", "X", "y"));
        assert!(again.is_err());
    }

    #[test]
    fn create_library_skips_file_roots() {
        let dir = TempDir::new().unwrap();
        let only = dir.path().join("only.json");
        fs::write(&only, library_json("Only", &["one"])).unwrap();
        let folder = dir.path().join("folder");

        let manager = LibraryManager::new(vec![only.clone()]);
        manager.load_all();
        assert!(matches!(
            manager.create_library("New Lib", "", Snippet::new("a", "A", "x")),
            Err(SnipError::InvalidConfig(_))
        ));
        assert!(!dir.path().join("new-lib.json").exists());

        manager.set_roots(vec![only, folder.clone()]);
        let path = manager
            .create_library("New Lib", "", Snippet::new("a", "A", "x"))
            .unwrap();
        assert_eq!(path, folder.join("new-lib.json"));
        assert!(manager.find_snippet("New Lib", "a").is_some());
        assert!(manager.find_snippet("Only", "one").is_some());
    }

    #[test]
    fn concurrent_reloads_never_publish_an_older_scan() {
        let (dir, manager) = manager_with(&[("a.json", library_json("A", &["one"]))]);
        let manager = Arc::new(manager);
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let manager = Arc::clone(&manager);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut saw_new_file = false;
                let mut last_generation = 0;
                while !done.load(Ordering::SeqCst) {
                    let snapshot = manager.snapshot();
                    assert!(snapshot.generation >= last_generation);
                    last_generation = snapshot.generation;
                    let count = snapshot.snippet_count();
                    assert!(!(saw_new_file && count == 1), "older scan published after a newer one");
                    saw_new_file |= count == 2;
                }
            })
        };

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    for _ in 0..10 {
                        manager.reload();
                    }
                })
            })
            .collect();
        fs::write(dir.path().join("b.json"), library_json("B", &["two"])).unwrap();
        for worker in workers {
            worker.join().unwrap();
        }
        manager.reload();
        done.store(true, Ordering::SeqCst);
        reader.join().unwrap();

        let last = manager.snapshot();
        assert_eq!(last.generation, 42);
        assert_eq!(last.snippet_count(), 2);
    }

    #[test]
    fn unknown_library_is_reported() {
        let (_dir, manager) = manager_with(&[]);
        assert!(matches!(
            manager.save_snippet(Snippet::new("a", "A", "x"), "Nope"),
            Err(SnipError::LibraryNotFound(_))
        ));
    }
}
