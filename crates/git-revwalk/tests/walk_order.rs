//! Walk order tests.
//!
//! Creates git repositories with known history using C git, then verifies
//! that `RevWalk` produces commit lists matching `git rev-list` output.

use std::path::Path;
use std::process::Command;

use git_hash::ObjectId;
use git_odb::ObjectDatabase;
use git_revwalk::{RevWalk, WalkOptions};

/// Helper: run a git command in the given directory and return stdout.
fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test Author")
        .env("GIT_AUTHOR_EMAIL", "author@test.com")
        .env("GIT_COMMITTER_NAME", "Test Committer")
        .env("GIT_COMMITTER_EMAIL", "committer@test.com")
        .output()
        .expect("failed to run git");
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!("git {:?} failed: {}", args, stderr);
    }
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

/// Helper: run git with custom env vars.
fn git_env(dir: &Path, args: &[&str], env: &[(&str, &str)]) -> String {
    let mut cmd = Command::new("git");
    cmd.args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test Author")
        .env("GIT_AUTHOR_EMAIL", "author@test.com")
        .env("GIT_COMMITTER_NAME", "Test Committer")
        .env("GIT_COMMITTER_EMAIL", "committer@test.com");
    for (k, v) in env {
        cmd.env(k, v);
    }
    let output = cmd.output().expect("failed to run git");
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!("git {:?} failed: {}", args, stderr);
    }
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

fn open_odb(dir: &Path) -> ObjectDatabase {
    ObjectDatabase::open(dir.join(".git").join("objects")).unwrap()
}

fn head_oid(dir: &Path) -> ObjectId {
    ObjectId::from_hex(&git(dir, &["rev-parse", "HEAD"])).unwrap()
}

/// Create a simple linear history: A -> B -> C (C is HEAD). Returns hex ids
/// newest first, matching `git rev-list HEAD` order.
fn create_linear_repo(dir: &Path) -> Vec<String> {
    git(dir, &["init", "-b", "main"]);
    git(dir, &["config", "user.name", "Test"]);
    git(dir, &["config", "user.email", "test@test.com"]);

    std::fs::write(dir.join("a.txt"), "a").unwrap();
    git(dir, &["add", "a.txt"]);
    git_env(
        dir,
        &["commit", "-m", "A"],
        &[
            ("GIT_AUTHOR_DATE", "1700000000 +0000"),
            ("GIT_COMMITTER_DATE", "1700000000 +0000"),
        ],
    );

    std::fs::write(dir.join("b.txt"), "b").unwrap();
    git(dir, &["add", "b.txt"]);
    git_env(
        dir,
        &["commit", "-m", "B"],
        &[
            ("GIT_AUTHOR_DATE", "1700001000 +0000"),
            ("GIT_COMMITTER_DATE", "1700001000 +0000"),
        ],
    );

    std::fs::write(dir.join("c.txt"), "c").unwrap();
    git(dir, &["add", "c.txt"]);
    git_env(
        dir,
        &["commit", "-m", "C"],
        &[
            ("GIT_AUTHOR_DATE", "1700002000 +0000"),
            ("GIT_COMMITTER_DATE", "1700002000 +0000"),
        ],
    );

    git(dir, &["rev-list", "HEAD"])
        .lines()
        .map(String::from)
        .collect()
}

/// Create a repo with a merge:
///   A -> B -> D (merge)
///   A -> C -/
fn create_merge_repo(dir: &Path) -> Vec<String> {
    git(dir, &["init", "-b", "main"]);
    git(dir, &["config", "user.name", "Test"]);
    git(dir, &["config", "user.email", "test@test.com"]);

    std::fs::write(dir.join("a.txt"), "a").unwrap();
    git(dir, &["add", "a.txt"]);
    git_env(
        dir,
        &["commit", "-m", "A"],
        &[
            ("GIT_AUTHOR_DATE", "1700000000 +0000"),
            ("GIT_COMMITTER_DATE", "1700000000 +0000"),
        ],
    );

    git(dir, &["checkout", "-b", "feature"]);

    std::fs::write(dir.join("c.txt"), "c").unwrap();
    git(dir, &["add", "c.txt"]);
    git_env(
        dir,
        &["commit", "-m", "C"],
        &[
            ("GIT_AUTHOR_DATE", "1700001000 +0000"),
            ("GIT_COMMITTER_DATE", "1700001000 +0000"),
        ],
    );

    git(dir, &["checkout", "main"]);

    std::fs::write(dir.join("b.txt"), "b").unwrap();
    git(dir, &["add", "b.txt"]);
    git_env(
        dir,
        &["commit", "-m", "B"],
        &[
            ("GIT_AUTHOR_DATE", "1700002000 +0000"),
            ("GIT_COMMITTER_DATE", "1700002000 +0000"),
        ],
    );

    git_env(
        dir,
        &["merge", "feature", "-m", "D"],
        &[
            ("GIT_AUTHOR_DATE", "1700003000 +0000"),
            ("GIT_COMMITTER_DATE", "1700003000 +0000"),
        ],
    );

    git(dir, &["rev-list", "HEAD"])
        .lines()
        .map(String::from)
        .collect()
}

#[test]
fn linear_history_matches_rev_list() {
    let dir = tempfile::tempdir().unwrap();
    let expected = create_linear_repo(dir.path());

    let odb = open_odb(dir.path());
    let mut walk = RevWalk::new(&odb);
    walk.push(head_oid(dir.path()));

    let result: Vec<String> = walk.map(|r| r.unwrap().to_hex()).collect();

    assert_eq!(result, expected, "walk order should match git rev-list HEAD");
}

#[test]
fn merge_history_respects_parent_after_child() {
    let dir = tempfile::tempdir().unwrap();
    let expected = create_merge_repo(dir.path());

    let odb = open_odb(dir.path());
    let mut walk = RevWalk::new(&odb);
    walk.push(head_oid(dir.path()));

    let result: Vec<String> = walk.map(|r| r.unwrap().to_hex()).collect();

    for (i, oid_hex) in result.iter().enumerate() {
        let oid = ObjectId::from_hex(oid_hex).unwrap();
        let obj = odb.read(&oid).unwrap().unwrap();
        if let git_object::Object::Commit(commit) = obj {
            for parent in &commit.parents {
                let parent_hex = parent.to_hex();
                if let Some(parent_pos) = result.iter().position(|h| *h == parent_hex) {
                    assert!(
                        parent_pos > i,
                        "parent {} at position {} should appear after child {} at position {}",
                        parent_hex,
                        parent_pos,
                        oid_hex,
                        i
                    );
                }
            }
        }
    }

    assert_eq!(result.len(), expected.len(), "should produce same number of commits");
}

#[test]
fn first_parent_only_matches_rev_list_first_parent() {
    let dir = tempfile::tempdir().unwrap();
    create_merge_repo(dir.path());

    let expected: Vec<String> = git(dir.path(), &["rev-list", "--first-parent", "HEAD"])
        .lines()
        .map(String::from)
        .collect();

    let odb = open_odb(dir.path());
    let mut walk = RevWalk::new(&odb);
    walk.set_options(WalkOptions {
        first_parent_only: true,
        ..WalkOptions::default()
    });
    walk.push(head_oid(dir.path()));

    let result: Vec<String> = walk.map(|r| r.unwrap().to_hex()).collect();

    assert_eq!(
        result, expected,
        "first-parent walk should match git rev-list --first-parent"
    );
}

#[test]
fn limit_truncates_output() {
    let dir = tempfile::tempdir().unwrap();
    create_linear_repo(dir.path());

    let odb = open_odb(dir.path());
    let mut walk = RevWalk::new(&odb);
    walk.set_options(WalkOptions {
        limit: Some(2),
        ..WalkOptions::default()
    });
    walk.push(head_oid(dir.path()));

    let result: Vec<String> = walk.map(|r| r.unwrap().to_hex()).collect();

    assert_eq!(result.len(), 2, "limit should cap the number of emitted commits");
}

#[test]
fn empty_repo_produces_no_commits() {
    let dir = tempfile::tempdir().unwrap();
    git(dir.path(), &["init", "-b", "main"]);

    let odb = open_odb(dir.path());
    let walk = RevWalk::new(&odb);

    let result: Vec<_> = walk.collect();
    assert!(result.is_empty(), "walk with no pushed starts should produce no commits");
}

#[test]
fn pushing_a_middle_commit_walks_only_its_ancestry() {
    let dir = tempfile::tempdir().unwrap();
    let all = create_linear_repo(dir.path());

    let odb = open_odb(dir.path());
    let mut walk = RevWalk::new(&odb);

    // all[0] is C (HEAD), all[1] is B, all[2] is A.
    let b_oid = ObjectId::from_hex(&all[1]).unwrap();
    walk.push(b_oid);

    let result: Vec<String> = walk.map(|r| r.unwrap().to_hex()).collect();

    assert_eq!(result, &all[1..], "pushing B should walk B then A, not C");
}
