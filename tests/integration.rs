use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn courserag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("courserag");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let docs_dir = root.join("docs");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(
        docs_dir.join("testing.txt"),
        "Course Title: Intro to Testing\nCourse Link: https://example.com/testing\nCourse Instructor: Ada Lovelace\n\nLesson 1: Why test\nTesting reduces defects.\n\nLesson 2: Test runners\nA runner executes every test.\n",
    )
    .unwrap();
    fs::write(
        docs_dir.join("robots.md"),
        "Course Title: Building Robots with Servo Motors\n\nLesson 1: Servos\nA servo turns to a commanded angle.\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[store]
backend = "sqlite"
path = "{}/data/courserag.sqlite"

[embedding]
provider = "hash"
dims = 256

[generation]
provider = "anthropic"
api_key_env = "COURSERAG_TEST_KEY_THAT_IS_NEVER_SET"
"#,
        root.display()
    );

    let config_path = config_dir.join("courserag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_courserag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = courserag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run courserag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn docs_arg(config_path: &Path) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("docs")
        .display()
        .to_string()
}

#[test]
fn test_ingest_loads_folder() {
    let (_tmp, config_path) = setup_test_env();
    let docs = docs_arg(&config_path);

    let (stdout, stderr, success) = run_courserag(&config_path, &["ingest", &docs]);
    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("Loaded 2 course(s)"), "stdout: {}", stdout);
}

#[test]
fn test_ingest_twice_no_duplicates() {
    let (_tmp, config_path) = setup_test_env();
    let docs = docs_arg(&config_path);

    let (first, _, ok) = run_courserag(&config_path, &["ingest", &docs]);
    assert!(ok);
    let (_, _, ok) = run_courserag(&config_path, &["ingest", &docs]);
    assert!(ok);

    let (courses, _, ok) = run_courserag(&config_path, &["courses"]);
    assert!(ok);
    // Chunk count after two loads equals the count reported by the first.
    let chunks = first
        .split_whitespace()
        .nth(3)
        .unwrap()
        .to_string();
    assert!(
        courses.starts_with(&format!("2 course(s), {} chunk(s):", chunks)),
        "courses: {}",
        courses
    );
}

#[test]
fn test_courses_lists_sorted_titles() {
    let (_tmp, config_path) = setup_test_env();
    let docs = docs_arg(&config_path);
    run_courserag(&config_path, &["ingest", &docs]);

    let (stdout, _, success) = run_courserag(&config_path, &["courses"]);
    assert!(success);
    let robots = stdout.find("Building Robots with Servo Motors").unwrap();
    let testing = stdout.find("Intro to Testing").unwrap();
    assert!(robots < testing);
}

#[test]
fn test_courses_empty_index() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_courserag(&config_path, &["courses"]);
    assert!(success);
    assert!(stdout.contains("No courses loaded."));
}

#[test]
fn test_outline_resolves_partial_name() {
    let (_tmp, config_path) = setup_test_env();
    let docs = docs_arg(&config_path);
    run_courserag(&config_path, &["ingest", &docs]);

    let (stdout, stderr, success) = run_courserag(&config_path, &["outline", "testing"]);
    assert!(success, "outline failed: {}", stderr);
    assert!(stdout.starts_with("Intro to Testing"));
    assert!(stdout.contains("instructor: Ada Lovelace"));
    assert!(stdout.contains("Lesson 1: Why test"));
    assert!(stdout.contains("Lesson 2: Test runners"));
}

#[test]
fn test_outline_unknown_course_fails() {
    let (_tmp, config_path) = setup_test_env();
    let docs = docs_arg(&config_path);
    run_courserag(&config_path, &["ingest", &docs]);

    let (_, stderr, success) = run_courserag(&config_path, &["outline", "Medieval Pottery"]);
    assert!(!success);
    assert!(stderr.contains("Course not found"), "stderr: {}", stderr);
}

#[test]
fn test_ingest_reports_bad_file() {
    let (tmp, config_path) = setup_test_env();
    let docs = docs_arg(&config_path);
    fs::write(tmp.path().join("docs/broken.txt"), "no title line\n").unwrap();

    let (stdout, _, success) = run_courserag(&config_path, &["ingest", &docs]);
    assert!(success);
    assert!(stdout.contains("Loaded 2 course(s)"));
    assert!(stdout.contains("Skipped 1 file(s):"));
    assert!(stdout.contains("broken.txt"));
}

#[test]
fn test_ask_without_api_key_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_courserag(&config_path, &["ask", "What is testing?"]);
    assert!(!success);
    assert!(
        stderr.contains("COURSERAG_TEST_KEY_THAT_IS_NEVER_SET environment variable not set"),
        "stderr: {}",
        stderr
    );
}

#[test]
fn test_ask_has_no_session_flag() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) =
        run_courserag(&config_path, &["ask", "What is testing?", "--session", "abc"]);
    assert!(!success);
    assert!(stderr.contains("--session"), "stderr: {}", stderr);
}

#[test]
fn test_changed_embedding_dims_require_clear() {
    let (tmp, config_path) = setup_test_env();
    let docs = tmp.path().join("docs");
    let (_, _, success) = run_courserag(&config_path, &["ingest", docs.to_str().unwrap()]);
    assert!(success);

    let widened = fs::read_to_string(&config_path)
        .unwrap()
        .replace("dims = 256", "dims = 512");
    fs::write(&config_path, widened).unwrap();

    let (_, stderr, success) = run_courserag(&config_path, &["outline", "testing"]);
    assert!(!success);
    assert!(stderr.contains("re-ingest with --clear"), "stderr: {}", stderr);

    let (_, _, success) =
        run_courserag(&config_path, &["ingest", docs.to_str().unwrap(), "--clear"]);
    assert!(success);
    let (stdout, _, success) = run_courserag(&config_path, &["outline", "testing"]);
    assert!(success);
    assert!(stdout.contains("Intro to Testing"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) =
        run_courserag(&tmp.path().join("nope.toml"), &["courses"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
