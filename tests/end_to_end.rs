//! End-to-end runs through the public API: scripted gateway in, files,
//! archives, branches, and merges out.

use std::fs;
use std::path::{Path, PathBuf};

use autodev::core::types::{BranchOutcome, Operation, TaskStatus};
use autodev::io::git::Git;
use autodev::io::tasks::load_tasks;
use autodev::merge::{MergeOptions, run_merge};
use autodev::run::{ConfigError, RunOptions, run, run_with_gateway};
use autodev::test_support::{ScriptedGateway, TestRepo};

fn options(root: &Path) -> RunOptions {
    RunOptions {
        project_root: root.to_path_buf(),
        tasks_file: PathBuf::from("tasks.json"),
        workers: None,
        use_git: false,
        skip_preflight: true,
    }
}

fn seed_tasks(root: &Path, ids: &[&str]) {
    let tasks: Vec<String> = ids
        .iter()
        .map(|id| format!(r#"{{"id":"{id}","title":"{id} title","description":"{id} work"}}"#))
        .collect();
    fs::write(root.join("tasks.json"), format!("[{}]", tasks.join(","))).expect("seed tasks");
}

#[test]
fn git_run_then_merge_lands_disjoint_tasks_on_base() {
    let repo = TestRepo::new().expect("repo");
    let git = Git::new(repo.root());
    let base = git.current_branch().expect("branch");
    seed_tasks(repo.root(), &["t-1", "t-2", "t-3"]);

    let gateway = ScriptedGateway::new();
    gateway.respond_write("t-1", "src/one.txt", "one\n");
    gateway.respond_write("t-2", "src/two.txt", "two\n");
    // t-3 rewrites a file that already exists on the base branch.
    repo.commit_file("shared.txt", "base version\n").expect("seed shared");
    gateway.respond_write("t-3", "shared.txt", "task version\n");

    let mut opts = options(repo.root());
    opts.use_git = true;
    let report = run_with_gateway(&opts, &gateway).expect("run");
    assert!(report.all_done());
    assert_eq!(git.current_branch().expect("branch"), base);

    // Conflict t-3 with a competing base edit before merging.
    repo.commit_file("shared.txt", "newer base version\n").expect("base edit");

    let summary = run_merge(&MergeOptions {
        project_root: repo.root().to_path_buf(),
        base: None,
        push: false,
    })
    .expect("merge");

    let outcome = |name: &str| {
        summary
            .records
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.outcome)
    };
    assert_eq!(outcome("task/t-1"), Some(BranchOutcome::Merged));
    assert_eq!(outcome("task/t-2"), Some(BranchOutcome::Merged));
    assert_eq!(outcome("task/t-3"), Some(BranchOutcome::ConflictAbort));

    assert!(repo.root().join("src/one.txt").is_file());
    assert!(repo.root().join("src/two.txt").is_file());
    let shared = fs::read_to_string(repo.root().join("shared.txt")).expect("read");
    assert_eq!(shared, "newer base version\n");

    // Task metadata survived the round trip.
    let tasks = load_tasks(&repo.root().join("tasks.json")).expect("reload");
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Done));
    assert_eq!(tasks[0].branch.as_deref(), Some("task/t-1"));
}

#[test]
fn configured_guards_protect_their_subtrees() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("autodev.toml"),
        "[guard]\npaths = [\"autodev.toml\", \"protected\"]\n",
    )
    .expect("config");
    fs::create_dir(temp.path().join("protected")).expect("mkdir");
    fs::write(temp.path().join("protected/core.txt"), "untouchable\n").expect("seed");
    seed_tasks(temp.path(), &["t-1"]);

    let gateway = ScriptedGateway::new();
    gateway.respond(
        "t-1",
        vec![
            Operation::Write {
                path: "protected/core.txt".to_string(),
                content: "overwritten\n".to_string(),
            },
            Operation::Append {
                path: "autodev.toml".to_string(),
                content: "workers = 99\n".to_string(),
            },
        ],
        "",
    );

    let report = run_with_gateway(&options(temp.path()), &gateway).expect("run");
    assert_eq!(report.failed_count(), 1);

    let core = fs::read_to_string(temp.path().join("protected/core.txt")).expect("read");
    assert_eq!(core, "untouchable\n");
    let config = fs::read_to_string(temp.path().join("autodev.toml")).expect("read");
    assert!(!config.contains("workers = 99"));
}

#[test]
fn patch_fallback_is_reported_distinctly() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("main.txt"), "original body\n").expect("seed");
    seed_tasks(temp.path(), &["t-1"]);

    let gateway = ScriptedGateway::new();
    gateway.respond(
        "t-1",
        vec![Operation::Patch {
            path: "main.txt".to_string(),
            content: "@@ -1,1 +1,1 @@\n-something that never existed\n+replacement\n".to_string(),
        }],
        "",
    );

    let report = run_with_gateway(&options(temp.path()), &gateway).expect("run");
    assert!(report.all_done());
    assert!(report.render().contains("applied-via-fallback main.txt"));

    // The fallback wrote the supplied content verbatim.
    let text = fs::read_to_string(temp.path().join("main.txt")).expect("read");
    assert!(text.contains("replacement"));

    let feedback = fs::read_to_string(temp.path().join("logs/feedback/t-1.log")).expect("read");
    assert!(feedback.contains("applied-via-fallback"));
}

#[test]
fn missing_credential_is_a_config_error_with_no_side_effects() {
    // Cannot unset process-global state safely while other tests run.
    if std::env::var("OPENAI_API_KEY").is_ok() {
        return;
    }
    let temp = tempfile::tempdir().expect("tempdir");
    seed_tasks(temp.path(), &["t-1"]);

    let err = run(&options(temp.path())).unwrap_err();
    assert!(err.downcast_ref::<ConfigError>().is_some());
    assert!(!temp.path().join("logs").exists());
    assert!(!temp.path().join("archive").exists());

    let tasks = load_tasks(&temp.path().join("tasks.json")).expect("reload");
    assert_eq!(tasks[0].status, TaskStatus::Pending);
}

#[test]
fn mixed_outcomes_archive_to_separate_files() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed_tasks(temp.path(), &["t-1", "t-2", "t-3"]);

    let gateway = ScriptedGateway::new();
    gateway.respond_write("t-1", "a.txt", "a\n");
    gateway.fail("t-2", "model unavailable");
    gateway.respond_write("t-3", "c.txt", "c\n");

    let report = run_with_gateway(&options(temp.path()), &gateway).expect("run");
    assert_eq!(report.done_count(), 2);
    assert_eq!(report.failed_count(), 1);

    let completed =
        fs::read_to_string(temp.path().join("archive/completed_tasks.json")).expect("read");
    assert!(completed.contains("t-1"));
    assert!(completed.contains("t-3"));
    let failed = fs::read_to_string(temp.path().join("archive/failed_tasks.json")).expect("read");
    assert!(failed.contains("t-2"));
    assert!(failed.contains("model unavailable"));

    // A later run leaves resolved tasks alone.
    let second = run_with_gateway(&options(temp.path()), &ScriptedGateway::new()).expect("rerun");
    assert!(second.tasks.is_empty());
}
