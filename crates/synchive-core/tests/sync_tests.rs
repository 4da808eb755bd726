use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::tempdir;

use synchive_core::hasher::{checksum_file, Checksum, DirKey, UniqueId};
use synchive_core::index_file::{self, INDEX_FILE_NAME};
use synchive_core::scanner::{self, ScanOptions};
use synchive_core::{
    AppConfig, AuditTrail, IndexSource, ProgressReporter, SilentReporter, SyncEngine, SyncIssue,
    Tee,
};

#[derive(Default)]
struct RecordingReporter {
    statuses: Mutex<Vec<String>>,
    actions: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingReporter {
    fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn on_status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
    }

    fn on_processing_file(&self, message: &str) {
        self.actions.lock().unwrap().push(message.to_string());
    }

    fn on_error(&self, issue: &SyncIssue) {
        self.errors.lock().unwrap().push(issue.to_string());
    }
}

struct Fixture {
    _tmp: tempfile::TempDir,
    source: PathBuf,
    dest: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempdir().unwrap();
        let source = tmp.path().join("source");
        let dest = tmp.path().join("dest");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&dest).unwrap();
        Self {
            _tmp: tmp,
            source,
            dest,
        }
    }

    fn write_source(&self, relative: &str, content: &str) {
        write_file(&self.source.join(relative), content);
    }

    fn write_dest(&self, relative: &str, content: &str) {
        write_file(&self.dest.join(relative), content);
    }

    fn engine(&self) -> SyncEngine {
        SyncEngine::new(&self.source, &self.dest).unwrap()
    }
}

fn write_file(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Every regular file below `root`, as `/`-joined relative paths.
fn list_files(root: &Path) -> BTreeSet<String> {
    fn visit(root: &Path, dir: &Path, out: &mut BTreeSet<String>) {
        for entry in fs::read_dir(dir).unwrap().flatten() {
            let path = entry.path();
            if path.is_dir() {
                visit(root, &path, out);
            } else {
                let relative: Vec<String> = path
                    .strip_prefix(root)
                    .unwrap()
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                out.insert(relative.join("/"));
            }
        }
    }
    let mut out = BTreeSet::new();
    visit(root, root, &mut out);
    out
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_first_run_into_empty_destination() {
    let fx = Fixture::new();
    fx.write_source("file1", "A");
    fx.write_source("sub/file2", "B");

    let reporter = RecordingReporter::default();
    let result = fx.engine().run(&reporter).unwrap();

    assert_eq!(result.index_source, IndexSource::FreshScan);
    assert_eq!(result.files_scanned, 2);
    assert_eq!(result.files_added, 2);
    assert_eq!(result.files_archived, 0);
    assert_eq!(result.directories_created, 1);
    assert_eq!(result.errors, 0);
    assert!(reporter.errors().is_empty());

    assert_eq!(
        list_files(&fx.dest),
        set(&["file1", "sub/file2", INDEX_FILE_NAME])
    );
    assert_eq!(
        checksum_file(&fx.dest.join("file1")).unwrap(),
        checksum_file(&fx.source.join("file1")).unwrap()
    );
    assert_eq!(
        checksum_file(&fx.dest.join("sub/file2")).unwrap(),
        Checksum::from_bytes(b"B")
    );

    let content = fs::read_to_string(fx.dest.join(INDEX_FILE_NAME)).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert!(lines[0].starts_with("Synchive "));
    assert!(lines[0].contains(" - root="));
    let expected = vec![
        "~0: ".to_string(),
        format!("{} \"file1\"", Checksum::from_bytes(b"A")),
        "~1: \\sub".to_string(),
        format!("{} \"file2\"", Checksum::from_bytes(b"B")),
    ];
    assert_eq!(lines[1..].to_vec(), expected);

    let actions = reporter.actions();
    assert!(actions.contains(&"Directory \"sub\" Created".to_string()));
    assert!(actions.contains(&"Added \"file1\" to \"root\"".to_string()));
    assert!(actions.contains(&"Added \"file2\" to \"sub\"".to_string()));

    let statuses = reporter.statuses.lock().unwrap();
    assert!(statuses.contains(&"Comparing differences...".to_string()));
    assert_eq!(statuses.last().unwrap(), "Operation completed");
}

#[test]
fn test_destination_file_without_source_is_archived() {
    let fx = Fixture::new();
    fx.write_dest("old.txt", "stale");
    fx.write_source("new.txt", "fresh");

    let reporter = RecordingReporter::default();
    let result = fx.engine().run(&reporter).unwrap();

    assert_eq!(result.files_archived, 1);
    assert_eq!(result.files_added, 1);
    assert!(!fx.dest.join("old.txt").exists());
    assert_eq!(
        fs::read_to_string(fx.dest.join("leftover/old.txt")).unwrap(),
        "stale"
    );

    let persisted = index_file::read_index(&fx.dest.join(INDEX_FILE_NAME)).unwrap();
    let root = persisted.index.get(&DirKey::root()).unwrap();
    assert!(!root.contains(&UniqueId::new(Checksum::from_bytes(b"stale"), "old.txt")));
    assert!(root.contains(&UniqueId::new(Checksum::from_bytes(b"fresh"), "new.txt")));
    assert!(persisted
        .index
        .get(&DirKey::from_segments(["leftover"]))
        .is_none());

    assert!(reporter
        .actions()
        .contains(&"File \"old.txt\" in \"\" not found in source. Moved to \"leftover\"".to_string()));
}

#[test]
fn test_archive_prunes_empty_parents_but_not_root() {
    let fx = Fixture::new();
    fx.write_dest("a/b/gone.txt", "bye");
    fx.write_dest("a/keep/other.txt", "stay");
    fx.write_source("a/keep/other.txt", "stay");

    let result = fx.engine().run(&SilentReporter).unwrap();

    assert_eq!(result.files_archived, 1);
    assert_eq!(result.files_unchanged, 1);
    assert_eq!(result.directories_pruned, 1);
    assert!(!fx.dest.join("a/b").exists());
    assert!(fx.dest.join("a/keep/other.txt").is_file());
    assert!(fx.dest.join("leftover/a/b/gone.txt").is_file());

    // Archiving the only file of the tree leaves the root in place.
    let fx = Fixture::new();
    fx.write_dest("lonely/only.txt", "x");
    let result = fx.engine().run(&SilentReporter).unwrap();
    assert_eq!(result.directories_pruned, 1);
    assert!(fx.dest.is_dir());
    assert!(!fx.dest.join("lonely").exists());
    assert!(fx.dest.join("leftover/lonely/only.txt").is_file());

    let persisted = index_file::read_index(&fx.dest.join(INDEX_FILE_NAME)).unwrap();
    assert!(persisted
        .index
        .get(&DirKey::from_segments(["lonely"]))
        .is_none());
}

#[test]
fn test_second_run_is_idempotent() {
    let fx = Fixture::new();
    fx.write_source("file1", "A");
    fx.write_source("sub/file2", "B");
    fx.write_source("sub/deeper/file3", "C");
    fx.write_dest("obsolete.txt", "D");

    let first = fx.engine().run(&SilentReporter).unwrap();
    assert_eq!(first.files_added, 3);
    assert_eq!(first.files_archived, 1);
    let files_after_first = list_files(&fx.dest);
    let index_after_first = fs::read_to_string(fx.dest.join(INDEX_FILE_NAME)).unwrap();

    let reporter = RecordingReporter::default();
    let second = fx.engine().run(&reporter).unwrap();

    assert!(matches!(second.index_source, IndexSource::Persisted { .. }));
    assert_eq!(second.actions(), 0);
    assert_eq!(second.files_unchanged, 3);
    assert_eq!(second.directories_created, 0);
    assert_eq!(second.directories_pruned, 0);
    assert!(reporter.actions().is_empty());
    assert!(reporter.errors().is_empty());
    assert_eq!(list_files(&fx.dest), files_after_first);
    assert_eq!(
        fs::read_to_string(fx.dest.join(INDEX_FILE_NAME)).unwrap(),
        index_after_first
    );
}

#[test]
fn test_changed_source_file_overwrites_without_archiving_new_copy() {
    let fx = Fixture::new();
    fx.write_source("doc.txt", "version 1");
    fx.engine().run(&SilentReporter).unwrap();

    fx.write_source("doc.txt", "version 2");
    let result = fx.engine().run(&SilentReporter).unwrap();

    assert_eq!(result.files_added, 1);
    assert_eq!(result.files_archived, 0);
    assert_eq!(
        fs::read_to_string(fx.dest.join("doc.txt")).unwrap(),
        "version 2"
    );
    assert!(!fx.dest.join("leftover").exists());

    let persisted = index_file::read_index(&fx.dest.join(INDEX_FILE_NAME)).unwrap();
    let root = persisted.index.get(&DirKey::root()).unwrap();
    assert_eq!(root.len(), 1);
    assert!(root.contains(&UniqueId::new(Checksum::from_bytes(b"version 2"), "doc.txt")));
}

#[test]
fn test_file_removed_from_source_after_first_run() {
    let fx = Fixture::new();
    fx.write_source("keep.txt", "k");
    fx.write_source("photos/2020/img.raw", "raw");
    fx.engine().run(&SilentReporter).unwrap();

    fs::remove_dir_all(fx.source.join("photos")).unwrap();
    let result = fx.engine().run(&SilentReporter).unwrap();

    assert!(matches!(result.index_source, IndexSource::Persisted { .. }));
    assert_eq!(result.files_archived, 1);
    assert_eq!(result.directories_pruned, 2);
    assert_eq!(
        list_files(&fx.dest),
        set(&["keep.txt", "leftover/photos/2020/img.raw", INDEX_FILE_NAME])
    );

    let persisted = index_file::read_index(&fx.dest.join(INDEX_FILE_NAME)).unwrap();
    let keys: Vec<String> = persisted.index.keys().map(ToString::to_string).collect();
    assert_eq!(keys, vec!["~0: "]);
}

#[test]
fn test_identical_files_in_different_directories_share_identifier() {
    let fx = Fixture::new();
    fx.write_source("one/same.txt", "same bytes");
    fx.write_source("two/nested/same.txt", "same bytes");

    let records = scanner::scan_source(&fx.source, &ScanOptions::default(), &SilentReporter)
        .unwrap()
        .files;

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].unique_id(), records[1].unique_id());
    assert_ne!(records[0].dir_key, records[1].dir_key);

    let result = fx.engine().run(&SilentReporter).unwrap();
    assert_eq!(result.files_added, 2);
    assert!(fx.dest.join("one/same.txt").is_file());
    assert!(fx.dest.join("two/nested/same.txt").is_file());
}

#[test]
fn test_missing_index_file_forces_rescan() {
    let fx = Fixture::new();
    fx.write_source("a.txt", "A");
    fx.write_source("sub/b.txt", "B");
    fx.engine().run(&SilentReporter).unwrap();

    fs::remove_file(fx.dest.join(INDEX_FILE_NAME)).unwrap();
    let result = fx.engine().run(&SilentReporter).unwrap();

    assert_eq!(result.index_source, IndexSource::FreshScan);
    assert_eq!(result.actions(), 0);
    assert_eq!(result.files_unchanged, 2);
    assert!(fx.dest.join(INDEX_FILE_NAME).is_file());
}

#[test]
fn test_indexed_file_deleted_from_destination_is_copied_again() {
    let fx = Fixture::new();
    fx.write_source("a.txt", "A");
    fx.engine().run(&SilentReporter).unwrap();

    fs::remove_file(fx.dest.join("a.txt")).unwrap();
    let result = fx.engine().run(&SilentReporter).unwrap();

    assert_eq!(result.files_added, 1);
    assert_eq!(fs::read_to_string(fx.dest.join("a.txt")).unwrap(), "A");
}

#[test]
fn test_destination_as_future_source_skips_reserved_entries() {
    let fx = Fixture::new();
    fx.write_source("a.txt", "A");
    fx.write_dest("old.txt", "old");
    fx.engine().run(&SilentReporter).unwrap();
    assert!(fx.dest.join("leftover/old.txt").is_file());

    let records = scanner::scan_source(&fx.dest, &ScanOptions::default(), &SilentReporter)
        .unwrap()
        .files;
    let names: Vec<&str> = records.iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(names, vec!["a.txt"]);
}

#[test]
fn test_ignore_patterns_apply_to_source() {
    let fx = Fixture::new();
    fx.write_source("keep.txt", "k");
    fx.write_source("build/output.o", "o");
    fx.write_source("notes.tmp", "t");

    let engine = fx
        .engine()
        .with_ignore_patterns(vec!["**/build".to_string(), "**/*.tmp".to_string()]);
    let result = engine.run(&SilentReporter).unwrap();

    assert_eq!(result.files_scanned, 1);
    assert_eq!(list_files(&fx.dest), set(&["keep.txt", INDEX_FILE_NAME]));
}

#[test]
fn test_custom_leftover_folder_and_audit_trail() {
    let fx = Fixture::new();
    fx.write_dest("old.txt", "old");
    fx.write_source("new.txt", "new");

    let config = AppConfig {
        source: Some(fx.source.to_string_lossy().into_owned()),
        destination: Some(fx.dest.to_string_lossy().into_owned()),
        leftover_folder: "attic".to_string(),
        ..AppConfig::default()
    };
    let engine = SyncEngine::from_config(&config).unwrap();
    let audit = AuditTrail::open(engine.destination()).unwrap();
    let recorder = RecordingReporter::default();
    let result = engine.run(&Tee(&recorder, &audit)).unwrap();

    assert_eq!(result.files_archived, 1);
    assert!(fx.dest.join("attic/old.txt").is_file());
    assert!(!fx.dest.join("leftover").exists());

    let trail = fs::read_to_string(audit.path()).unwrap();
    assert!(trail.contains("[ACTION] Added \"new.txt\" to \"root\""));
    assert!(trail.contains("Moved to \"attic\""));
    assert!(trail.contains("[STATUS] Operation completed"));

    // The audit trail itself is never archived or indexed.
    let second = engine.run(&audit).unwrap();
    assert_eq!(second.actions(), 0);
    assert!(fx.dest.join("~auditTrail.txt").is_file());
}

#[test]
fn test_fatal_setup_errors_leave_destination_untouched() {
    let fx = Fixture::new();
    fx.write_dest("old.txt", "old");

    assert!(SyncEngine::new(fx.source.join("missing"), &fx.dest).is_err());
    assert!(SyncEngine::new(&fx.source, fx.dest.join("missing")).is_err());
    assert!(SyncEngine::new(&fx.dest, fx.dest.join("inner")).is_err());
    assert_eq!(list_files(&fx.dest), set(&["old.txt"]));
}

#[cfg(unix)]
#[test]
fn test_unreadable_source_file_is_reported_once() {
    use std::os::unix::fs::PermissionsExt;

    let fx = Fixture::new();
    fx.write_source("ok.txt", "fine");
    fx.write_source("locked.bin", "secret");
    let locked = fx.source.join("locked.bin");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    if fs::read(&locked).is_ok() {
        // Running with privileges that ignore file modes; nothing to simulate.
        return;
    }

    let reporter = RecordingReporter::default();
    let result = fx.engine().run(&reporter).unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    let errors = reporter.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("locked.bin"));
    assert_eq!(result.errors, 1);
    assert_eq!(result.files_added, 1);
    assert!(!fx.dest.join("locked.bin").exists());
    assert!(fx.dest.join("ok.txt").is_file());
}

#[cfg(unix)]
#[test]
fn test_non_utf8_names_are_reported_not_merged() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let fx = Fixture::new();
    fs::write(fx.source.join(OsStr::from_bytes(b"a\xff")), "one").unwrap();
    fs::write(fx.source.join(OsStr::from_bytes(b"a\xfe")), "two").unwrap();
    fx.write_source("plain.txt", "three");

    let reporter = RecordingReporter::default();
    let result = fx.engine().run(&reporter).unwrap();

    assert_eq!(result.files_added, 1);
    assert_eq!(result.errors, 2);
    assert_eq!(reporter.errors().len(), 2);
    assert!(reporter
        .errors()
        .iter()
        .all(|e| e.contains("cannot be stored in the index")));
    assert_eq!(list_files(&fx.dest), set(&["plain.txt", INDEX_FILE_NAME]));

    // Still reported, never silently counted as backed up.
    let second = fx.engine().run(&SilentReporter).unwrap();
    assert_eq!(second.errors, 2);
    assert_eq!(second.files_unchanged, 1);
    assert_eq!(second.actions(), 0);
}

#[cfg(unix)]
#[test]
fn test_names_that_break_index_lines_keep_runs_idempotent() {
    let fx = Fixture::new();
    fx.write_source("a\\b/f.txt", "inside backslash dir");
    fx.write_source("bad\nname", "line break");
    fx.write_source("ok/f.txt", "fine");

    let reporter = RecordingReporter::default();
    let first = fx.engine().run(&reporter).unwrap();
    assert_eq!(first.files_added, 1);
    assert_eq!(first.errors, 2);
    assert!(!fx.dest.join("a\\b").exists());
    assert!(!fx.dest.join("bad\nname").exists());

    let persisted = index_file::read_index(&fx.dest.join(INDEX_FILE_NAME)).unwrap();
    assert_eq!(persisted.skipped_lines, 0);

    let second = fx.engine().run(&SilentReporter).unwrap();
    assert_eq!(second.actions(), 0);
    assert_eq!(second.files_unchanged, 1);
}

#[test]
fn test_leftover_index_temp_file_is_not_archived() {
    let fx = Fixture::new();
    fx.write_source("a.txt", "A");
    fx.write_dest(".~listOfFilesInCRC.txt.999.tmp", "partial");

    let result = fx.engine().run(&SilentReporter).unwrap();

    assert_eq!(result.files_archived, 0);
    assert!(fx.dest.join(".~listOfFilesInCRC.txt.999.tmp").is_file());
    assert!(!fx.dest.join("leftover").exists());
}
