use snipkit::config::AppConfig;
use snipkit::{load, load_all, LibraryManager};
use std::fs;
use tempfile::tempdir;

const PYTHON_LIBRARY: &str = r#"{
    "name": "Python",
    "description": "Everyday Python",
    "language": "python",
    "file_extensions": [".py"],
    "snippets": [
        {"id": "for_loop", "name": "For Loop", "content": "for i in range(n):\n\tpass", "tags": ["loop"]},
        {"id": "while_loop", "name": "While", "content": "while cond:\n\tpass", "description": "loop until false"},
        {"id": "main_guard", "name": "Main Guard", "content": "if __name__ == \"__main__\":\n    main()", "category": "Boilerplate"}
    ]
}"#;

#[test]
fn one_good_and_one_broken_file() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("python.json"), PYTHON_LIBRARY).unwrap();
    fs::write(dir.path().join("broken.json"), "{ \"name\": \"Broken\", \"snippets\": [").unwrap();

    let report = load_all(&[dir.path().to_path_buf()]);

    assert_eq!(report.libraries.len(), 1);
    assert_eq!(report.libraries[0].name, "Python");
    assert_eq!(report.libraries[0].snippets.len(), 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, dir.path().join("broken.json"));
}

#[test]
fn missing_root_does_not_stop_other_roots() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("good");
    fs::create_dir(&good).unwrap();
    fs::write(good.join("python.json"), PYTHON_LIBRARY).unwrap();

    let report = load_all(&[dir.path().join("missing"), good]);

    assert_eq!(report.libraries.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].reason.contains("does not exist"));
}

#[test]
fn search_through_the_manager() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("python.json"), PYTHON_LIBRARY).unwrap();

    let manager = LibraryManager::new(vec![dir.path().to_path_buf()]);
    assert!(manager.load_all().is_empty());

    assert_eq!(manager.search("").len(), 3);
    let loops: Vec<String> = manager.search("LOOP").into_iter().map(|s| s.id).collect();
    assert_eq!(loops, vec!["for_loop", "while_loop"]);
    assert!(manager.search("nothing like this").is_empty());
}

#[test]
fn saved_library_reloads_identically() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("python.json");
    fs::write(&path, PYTHON_LIBRARY).unwrap();
    let original = load(&path).unwrap();

    let manager = LibraryManager::new(vec![dir.path().to_path_buf()]);
    manager.load_all();
    let snippet = manager.find_snippet("Python", "main_guard").unwrap();
    manager.save_snippet(snippet, "Python").unwrap();

    let reloaded = load(&path).unwrap();
    assert_eq!(reloaded.snippets, original.snippets);
}

#[test]
fn config_library_paths_drive_loading() {
    let dir = tempdir().unwrap();
    let snippets = dir.path().join("snippets");
    fs::create_dir(&snippets).unwrap();
    fs::write(snippets.join("python.json"), PYTHON_LIBRARY).unwrap();

    let config_path = dir.path().join("config.json");
    let config = AppConfig {
        library_paths: vec![snippets],
        ..AppConfig::default()
    };
    config.save(&config_path).unwrap();

    let loaded = AppConfig::load(&config_path);
    let report = load_all(&loaded.library_roots());
    assert_eq!(report.snippet_count(), 3);
}
