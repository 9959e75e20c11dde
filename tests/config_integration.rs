//! Integration tests for patch lists
//!
//! Loading, validation, and batch application against temp directories.

use anchor_patch::config::{
    apply_edits, load_from_path, load_from_str, ApplicationError, ConfigError, EditMode, Locator,
    PatchResult, ValidationIssue, Verify,
};
use anchor_patch::edit::hash_hex;
use anchor_patch::locator::{CaptureGroup, LocateError, MatchPolicy};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CONTROLLER_PHP: &str = r#"<?php

class ResourceController extends Controller
{
    public function handleResourceDelete($id)
    {
        $resource = Resource::find($id);
        if ($resource) {
            $resource->delete();
        }
    };

    /**
     * Helper function to format file size
     */
    private function formatSize($bytes)
    {
        return $bytes;
    }
}
"#;

const ROUTES_PHP: &str = r#"<?php

Route::get('/admin/settings', [SettingsController::class, 'index']);
Route::post('/admin/settings', [SettingsController::class, 'store']);
"#;

/// Helper to create a temp dir with target files
fn setup_targets() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("ResourceController.php"), CONTROLLER_PHP).unwrap();
    fs::write(dir.path().join("web.php"), ROUTES_PHP).unwrap();
    dir
}

fn write_list(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("edits.toml");
    fs::write(&path, body).unwrap();
    path
}

fn outcomes(
    results: &[(String, Result<PatchResult, ApplicationError>)],
) -> Vec<(&str, Option<&PatchResult>)> {
    results
        .iter()
        .map(|(id, result)| (id.as_str(), result.as_ref().ok()))
        .collect()
}

#[test]
fn test_load_patch_list_basic() {
    let toml = r#"
[meta]
name = "timeline"
description = "Timeline feature"
root = "."

[[edits]]
id = "route"
file = "routes/web.php"
mode = "insert-after"
payload = "\nRoute::post('/admin/timeline', [TimelineController::class, 'store']);"

[edits.locator]
type = "pattern"
regex = "Route::post\\('/admin/settings'.*?\\);"

[[edits]]
id = "cards"
file = "Settings.jsx"
mode = "replace-range"
payload = "<Timeline />\n"

[edits.locator]
type = "lines"
start = 10
end = 14

[[edits]]
id = "import"
file = "Settings.jsx"
mode = "insert-at-line"
payload = "import Timeline from './Timeline';\n"

[edits.locator]
type = "line"
index = 0
"#;

    let list = load_from_str(toml).unwrap();
    assert_eq!(list.meta.name, "timeline");
    assert_eq!(list.meta.description.as_deref(), Some("Timeline feature"));
    assert_eq!(list.meta.root, Some(PathBuf::from(".")));
    assert_eq!(list.edits.len(), 3);
    assert!(list.source_dir.is_none());

    let route = &list.edits[0];
    assert_eq!(route.mode, EditMode::InsertAfter);
    match &route.locator {
        Locator::Pattern {
            dot_matches_newline,
            policy,
            capture,
            ..
        } => {
            assert!(!dot_matches_newline);
            assert_eq!(*policy, MatchPolicy::Unique);
            assert!(capture.is_none());
        }
        other => panic!("expected pattern locator, got {other:?}"),
    }

    match list.edits[1].locator {
        Locator::Lines {
            start,
            end,
            end_inclusive,
        } => {
            assert_eq!((start, end), (10, 14));
            assert!(end_inclusive);
        }
        ref other => panic!("expected lines locator, got {other:?}"),
    }
    assert_eq!(list.edits[2].mode, EditMode::InsertAtLineIndex);
}

#[test]
fn test_load_pattern_options_and_verify() {
    let toml = r#"
[[edits]]
id = "delete-handler"
file = "ResourceController.php"
mode = "replace-match"
payload = "x"

[edits.locator]
type = "pattern"
regex = 'function (?P<name>handle\w+)'
dot_matches_newline = true
case_insensitive = true
capture = "name"
match = "first"

[edits.verify]
method = "hash"
algorithm = "xxh3"
expected = "0x00000000deadbeef"
"#;

    let list = load_from_str(toml).unwrap();
    let edit = &list.edits[0];
    match &edit.locator {
        Locator::Pattern {
            dot_matches_newline,
            case_insensitive,
            capture,
            policy,
            ..
        } => {
            assert!(dot_matches_newline);
            assert!(case_insensitive);
            assert_eq!(capture, &Some(CaptureGroup::Name("name".to_string())));
            assert_eq!(*policy, MatchPolicy::First);
        }
        other => panic!("expected pattern locator, got {other:?}"),
    }
    assert!(matches!(edit.verify, Some(Verify::Hash { .. })));
}

#[test]
fn test_validation_collects_issues() {
    let toml = r#"
[[edits]]
id = "dup"
file = "a.txt"
mode = "insert-after"
payload = "x"
payload_file = "x.txt"

[edits.locator]
type = "pattern"
regex = "("

[[edits]]
id = "dup"
file = "a.txt"
mode = "insert-at-line"

[edits.locator]
type = "lines"
start = 5
end = 2

[edits.verify]
method = "hash"
expected = "not-hex"
"#;

    let err = load_from_str(toml).unwrap_err();
    let ConfigError::Validation { source, .. } = &err else {
        panic!("expected validation error, got {err}");
    };

    let text = err.to_string();
    assert!(text.contains("mutually exclusive"));
    assert!(text.contains("invalid anchor pattern"));
    assert!(text.contains("used more than once"));
    assert!(text.contains("start 5 is after end 2"));
    assert!(text.contains("requires a line locator"));
    assert!(text.contains("invalid hash value"));
    assert!(source
        .issues
        .iter()
        .any(|issue| matches!(issue, ValidationIssue::MissingField { field: "payload", .. })));
}

#[test]
fn test_empty_list_is_rejected() {
    let err = load_from_str("[meta]\nname = \"nothing\"\n").unwrap_err();
    assert!(err.to_string().contains("no edits"));
}

#[test]
fn test_empty_payload_only_allowed_for_replacements() {
    let insert = r#"
[[edits]]
id = "blank"
file = "a.txt"
mode = "insert-before"
payload = ""

[edits.locator]
type = "pattern"
regex = "a"
"#;
    assert!(load_from_str(insert).is_err());

    let delete = insert.replace("insert-before", "replace-match");
    assert!(load_from_str(&delete).is_ok());
}

#[test]
fn test_malformed_toml_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = write_list(dir.path(), "[[edits]\nid = ");

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Toml { path: Some(_), .. }));
    assert!(err.to_string().contains("edits.toml"));
}

#[test]
fn test_batch_applies_across_files() {
    let dir = setup_targets();
    let list_path = write_list(
        dir.path(),
        r#"
[[edits]]
id = "timeline-method"
file = "ResourceController.php"
mode = "insert-before"
payload = """
    public function saveTimeline($items)
    {
        return $items;
    }

"""

[edits.locator]
type = "pattern"
regex = '    /\*\*\s+\* Helper function to format file size'

[[edits]]
id = "timeline-route"
file = "web.php"
mode = "insert-after"
payload = "\nRoute::post('/admin/timeline', [ResourceController::class, 'saveTimeline']);"

[edits.locator]
type = "pattern"
regex = "Route::post\\('/admin/settings'.*?\\);"
"#,
    );

    let list = load_from_path(&list_path).unwrap();
    assert_eq!(list.source_dir.as_deref(), Some(dir.path()));

    let results = apply_edits(&list, None);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, "timeline-method");
    assert_eq!(results[1].0, "timeline-route");
    for (_, result) in &results {
        assert!(matches!(result, Ok(PatchResult::Applied { .. })));
    }

    let controller = fs::read_to_string(dir.path().join("ResourceController.php")).unwrap();
    assert!(controller.contains(
        "    };\n\n    public function saveTimeline($items)\n    {\n        return $items;\n    }\n\n    /**\n     * Helper function to format file size"
    ));

    let routes = fs::read_to_string(dir.path().join("web.php")).unwrap();
    assert!(routes.ends_with(
        "'store']);\nRoute::post('/admin/timeline', [ResourceController::class, 'saveTimeline']);\n"
    ));

    // Second run changes nothing
    let again = apply_edits(&list, None);
    for (_, result) in &again {
        assert!(matches!(result, Ok(PatchResult::AlreadyApplied { .. })));
    }
    assert_eq!(
        fs::read_to_string(dir.path().join("ResourceController.php")).unwrap(),
        controller
    );
}

#[test]
fn test_failed_edit_aborts_whole_batch() {
    let dir = setup_targets();
    let list_path = write_list(
        dir.path(),
        r#"
[[edits]]
id = "route"
file = "web.php"
mode = "insert-after"
payload = "\n// timeline"

[edits.locator]
type = "pattern"
regex = "Route::post.*?\\);"

[[edits]]
id = "missing-anchor"
file = "ResourceController.php"
mode = "insert-after"
payload = "// never"

[edits.locator]
type = "pattern"
regex = "function handleResourceRestore"
"#,
    );

    let list = load_from_path(&list_path).unwrap();
    let results = apply_edits(&list, None);

    assert!(matches!(
        &results[0].1,
        Ok(PatchResult::Aborted { reason, .. }) if reason.contains("batch aborted")
    ));
    assert!(matches!(
        &results[1].1,
        Err(ApplicationError::Locate {
            source: LocateError::AnchorNotFound { .. },
            ..
        })
    ));

    // Neither file was written
    assert_eq!(fs::read_to_string(dir.path().join("web.php")).unwrap(), ROUTES_PHP);
    assert_eq!(
        fs::read_to_string(dir.path().join("ResourceController.php")).unwrap(),
        CONTROLLER_PHP
    );
}

#[test]
fn test_ambiguous_anchor_fails_unless_first() {
    let dir = setup_targets();
    let body = r#"
[[edits]]
id = "route-comment"
file = "web.php"
mode = "insert-before"
payload = "// settings\n"

[edits.locator]
type = "pattern"
regex = "Route::"
"#;

    let list = load_from_path(write_list(dir.path(), body)).unwrap();
    let results = apply_edits(&list, None);
    assert!(matches!(
        &results[0].1,
        Err(ApplicationError::Locate {
            source: LocateError::AmbiguousAnchor { count: 2, .. },
            ..
        })
    ));
    assert_eq!(fs::read_to_string(dir.path().join("web.php")).unwrap(), ROUTES_PHP);

    let first = format!("{body}match = \"first\"\n");
    let list = load_from_path(write_list(dir.path(), &first)).unwrap();
    let results = apply_edits(&list, None);
    assert!(matches!(&results[0].1, Ok(PatchResult::Applied { .. })));
    let routes = fs::read_to_string(dir.path().join("web.php")).unwrap();
    assert!(routes.starts_with("<?php\n\n// settings\nRoute::get"));
}

#[test]
fn test_multiline_anchor_with_dot_matches_newline() {
    let dir = setup_targets();
    let list_path = write_list(
        dir.path(),
        r#"
[[edits]]
id = "after-delete-handler"
file = "ResourceController.php"
mode = "insert-after"
payload = "\n\n    public function handleTimeline() {}"

[edits.locator]
type = "pattern"
regex = 'public function handleResourceDelete\(\$id\).*?\}\s*\};'
dot_matches_newline = true
"#,
    );

    let list = load_from_path(&list_path).unwrap();
    let results = apply_edits(&list, None);
    assert!(matches!(&results[0].1, Ok(PatchResult::Applied { .. })));

    let controller = fs::read_to_string(dir.path().join("ResourceController.php")).unwrap();
    assert!(controller.contains("        }\n    };\n\n    public function handleTimeline() {}\n\n    /**"));
}

#[test]
fn test_edits_to_same_file_see_earlier_edits() {
    let dir = setup_targets();
    let list_path = write_list(
        dir.path(),
        r#"
[[edits]]
id = "marker"
file = "web.php"
mode = "insert-at-line"
payload = "// BEGIN timeline\n"

[edits.locator]
type = "line"
index = 4

[[edits]]
id = "route"
file = "web.php"
mode = "insert-after"
payload = "\nRoute::get('/admin/timeline', [TimelineController::class, 'index']);"

[edits.locator]
type = "pattern"
regex = "// BEGIN timeline"
"#,
    );

    let list = load_from_path(&list_path).unwrap();
    let results = apply_edits(&list, None);
    assert_eq!(
        outcomes(&results)
            .iter()
            .filter(|(_, r)| matches!(r, Some(PatchResult::Applied { .. })))
            .count(),
        2
    );

    let routes = fs::read_to_string(dir.path().join("web.php")).unwrap();
    assert!(routes.ends_with(
        "'store']);\n// BEGIN timeline\nRoute::get('/admin/timeline', [TimelineController::class, 'index']);\n"
    ));
}

#[test]
fn test_payload_file_resolves_against_list_dir() {
    let dir = setup_targets();
    fs::create_dir(dir.path().join("payloads")).unwrap();
    fs::write(
        dir.path().join("payloads/route.php"),
        "\nRoute::delete('/admin/timeline', [TimelineController::class, 'destroy']);",
    )
    .unwrap();
    let list_path = write_list(
        dir.path(),
        r#"
[[edits]]
id = "route"
file = "web.php"
mode = "insert-after"
payload_file = "payloads/route.php"

[edits.locator]
type = "pattern"
regex = "Route::post.*?\\);"
"#,
    );

    let list = load_from_path(&list_path).unwrap();
    let results = apply_edits(&list, None);
    assert!(matches!(&results[0].1, Ok(PatchResult::Applied { .. })));
    assert!(fs::read_to_string(dir.path().join("web.php"))
        .unwrap()
        .contains("Route::delete('/admin/timeline'"));
}

#[test]
fn test_missing_payload_file_fails() {
    let dir = setup_targets();
    let list_path = write_list(
        dir.path(),
        r#"
[[edits]]
id = "route"
file = "web.php"
mode = "insert-after"
payload_file = "payloads/missing.php"

[edits.locator]
type = "pattern"
regex = "Route::post.*?\\);"
"#,
    );

    let list = load_from_path(&list_path).unwrap();
    let results = apply_edits(&list, None);
    assert!(matches!(&results[0].1, Err(ApplicationError::Payload { .. })));
    assert_eq!(fs::read_to_string(dir.path().join("web.php")).unwrap(), ROUTES_PHP);
}

#[test]
fn test_empty_payload_file_is_rejected_for_insertions() {
    let dir = setup_targets();
    fs::write(dir.path().join("empty.php"), "").unwrap();
    let list_path = write_list(
        dir.path(),
        r#"
[[edits]]
id = "route"
file = "web.php"
mode = "insert-after"
payload_file = "empty.php"

[edits.locator]
type = "pattern"
regex = "Route::post.*?\\);"
"#,
    );

    let list = load_from_path(&list_path).unwrap();
    let results = apply_edits(&list, None);
    assert!(matches!(&results[0].1, Err(ApplicationError::Invalid { .. })));
    assert_eq!(fs::read_to_string(dir.path().join("web.php")).unwrap(), ROUTES_PHP);
}

#[test]
fn test_replace_match_typo_does_not_pass_as_applied() {
    let dir = setup_targets();
    let list_path = write_list(
        dir.path(),
        r#"
[[edits]]
id = "format"
file = "ResourceController.php"
mode = "replace-match"
payload = "bytes"

[edits.locator]
type = "pattern"
regex = "function formatBytes"
"#,
    );

    let list = load_from_path(&list_path).unwrap();
    let results = apply_edits(&list, None);
    assert!(matches!(
        &results[0].1,
        Err(ApplicationError::Locate {
            source: LocateError::AnchorNotFound { .. },
            ..
        })
    ));
    assert_eq!(
        fs::read_to_string(dir.path().join("ResourceController.php")).unwrap(),
        CONTROLLER_PHP
    );
}

#[test]
fn test_hash_verify() {
    let dir = setup_targets();
    let anchor = "Route::post('/admin/settings', [SettingsController::class, 'store']);";
    let body = |expected: &str| {
        format!(
            r#"
[[edits]]
id = "route"
file = "web.php"
mode = "insert-after"
payload = "\n// verified"

[edits.locator]
type = "pattern"
regex = "Route::post.*?\\);"

[edits.verify]
method = "hash"
expected = "{expected}"
"#
        )
    };

    let stale = load_from_path(write_list(dir.path(), &body("0x0000000000000001"))).unwrap();
    let results = apply_edits(&stale, None);
    match &results[0].1 {
        Err(ApplicationError::Mismatch { found_hash, .. }) => {
            assert_eq!(found_hash, &hash_hex(anchor));
        }
        other => panic!("expected mismatch, got {other:?}"),
    }
    assert_eq!(fs::read_to_string(dir.path().join("web.php")).unwrap(), ROUTES_PHP);

    let fresh = load_from_path(write_list(dir.path(), &body(&hash_hex(anchor)))).unwrap();
    let results = apply_edits(&fresh, None);
    assert!(matches!(&results[0].1, Ok(PatchResult::Applied { .. })));
}

#[test]
fn test_meta_root_confines_targets() {
    let dir = TempDir::new().unwrap();
    let app = dir.path().join("app");
    fs::create_dir_all(app.join(".git")).unwrap();
    fs::write(app.join(".git/config"), "[core]\n").unwrap();
    fs::write(app.join("web.php"), ROUTES_PHP).unwrap();
    fs::write(dir.path().join("secret.php"), ROUTES_PHP).unwrap();

    let list_path = write_list(
        dir.path(),
        r#"
[meta]
name = "confined"
root = "app"

[[edits]]
id = "inside"
file = "web.php"
mode = "insert-after"
payload = "\n// ok"

[edits.locator]
type = "pattern"
regex = "Route::post.*?\\);"

[[edits]]
id = "escape"
file = "../secret.php"
mode = "insert-after"
payload = "\n// escaped"

[edits.locator]
type = "pattern"
regex = "Route::post.*?\\);"

[[edits]]
id = "git"
file = ".git/config"
mode = "insert-after"
payload = "\n\tbare = true"

[edits.locator]
type = "pattern"
regex = "\\[core\\]"
"#,
    );

    let list = load_from_path(&list_path).unwrap();
    let results = apply_edits(&list, None);

    assert!(matches!(&results[0].1, Ok(PatchResult::Aborted { .. })));
    assert!(matches!(&results[1].1, Err(ApplicationError::Unsafe(_))));
    assert!(matches!(&results[2].1, Err(ApplicationError::Unsafe(_))));

    assert_eq!(fs::read_to_string(app.join("web.php")).unwrap(), ROUTES_PHP);
    assert_eq!(
        fs::read_to_string(dir.path().join("secret.php")).unwrap(),
        ROUTES_PHP
    );
    assert_eq!(
        fs::read_to_string(app.join(".git/config")).unwrap(),
        "[core]\n"
    );
}

#[test]
fn test_root_override_wins_over_meta_root() {
    let dir = setup_targets();
    let other = TempDir::new().unwrap();
    fs::write(other.path().join("web.php"), ROUTES_PHP).unwrap();

    let list_path = write_list(
        dir.path(),
        r#"
[meta]
root = "does-not-exist"

[[edits]]
id = "route"
file = "web.php"
mode = "insert-after"
payload = "\n// override"

[edits.locator]
type = "pattern"
regex = "Route::post.*?\\);"
"#,
    );

    let list = load_from_path(&list_path).unwrap();
    let results = apply_edits(&list, Some(other.path()));
    assert!(matches!(&results[0].1, Ok(PatchResult::Applied { .. })));

    assert!(fs::read_to_string(other.path().join("web.php"))
        .unwrap()
        .contains("// override"));
    assert_eq!(fs::read_to_string(dir.path().join("web.php")).unwrap(), ROUTES_PHP);
}

#[test]
fn test_unusable_root_fails_every_edit() {
    let dir = setup_targets();
    let list_path = write_list(
        dir.path(),
        r#"
[meta]
root = "does-not-exist"

[[edits]]
id = "route"
file = "web.php"
mode = "insert-after"
payload = "\n// never"

[edits.locator]
type = "pattern"
regex = "Route::post.*?\\);"
"#,
    );

    let list = load_from_path(&list_path).unwrap();
    let results = apply_edits(&list, None);
    assert!(matches!(&results[0].1, Err(ApplicationError::Invalid { .. })));
}

#[test]
fn test_replace_range_exclusive_end() {
    let dir = setup_targets();
    let list_path = write_list(
        dir.path(),
        r#"
[[edits]]
id = "routes"
file = "web.php"
mode = "replace-range"
payload = "Route::resource('/admin/settings', SettingsController::class);\n"

[edits.locator]
type = "lines"
start = 2
end = 4
end_inclusive = false
"#,
    );

    let list = load_from_path(&list_path).unwrap();
    let results = apply_edits(&list, None);
    assert!(matches!(&results[0].1, Ok(PatchResult::Applied { .. })));
    assert_eq!(
        fs::read_to_string(dir.path().join("web.php")).unwrap(),
        "<?php\n\nRoute::resource('/admin/settings', SettingsController::class);\n"
    );

    let again = apply_edits(&list, None);
    // Lines 2..4 are gone, so the range no longer exists
    assert!(matches!(&again[0].1, Err(ApplicationError::Range { .. })));
}

#[test]
#[cfg(unix)]
fn test_symlinked_target_inside_root_is_written_through() {
    use std::os::unix::fs::symlink;

    let dir = setup_targets();
    symlink(dir.path().join("web.php"), dir.path().join("routes.php")).unwrap();
    let list_path = write_list(
        dir.path(),
        r#"
[meta]
root = "."

[[edits]]
id = "route"
file = "routes.php"
mode = "insert-after"
payload = "\n// via link"

[edits.locator]
type = "pattern"
regex = "Route::post.*?\\);"
"#,
    );

    let list = load_from_path(&list_path).unwrap();
    let results = apply_edits(&list, None);
    assert!(matches!(&results[0].1, Ok(PatchResult::Applied { .. })));

    let link = dir.path().join("routes.php");
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert!(fs::read_to_string(dir.path().join("web.php"))
        .unwrap()
        .contains("// via link"));
}
