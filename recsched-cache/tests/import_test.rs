//! Import-loop tests against a real git fixture repository.

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono_tz::America::Toronto;
use recsched_cache::{Cache, Resolved};
use recsched_core::snapshot::{Facility, Snapshot};
use recsched_core::ContentHash;

struct Fixture {
    _dir: tempfile::TempDir,
    repo: PathBuf,
    db: PathBuf,
    commit_epoch: i64,
}

impl Fixture {
    fn new() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("data");
        std::fs::create_dir(&repo).unwrap();
        git(&repo, &["init", "--quiet", "--initial-branch=main"]);
        git(&repo, &["config", "user.name", "fixture"]);
        git(&repo, &["config", "user.email", "fixture@localhost"]);
        Fixture {
            db: dir.path().join("cache.db"),
            _dir: dir,
            repo,
            commit_epoch: 1_750_000_000,
        }
    }

    /// Commit one set of wire files with a strictly increasing commit date.
    fn commit(&mut self, payload: &[u8], companion_seed: &str) {
        std::fs::write(self.repo.join("data.pb"), payload).unwrap();
        std::fs::write(
            self.repo.join("data.textpb"),
            format!("text {companion_seed}"),
        )
        .unwrap();
        std::fs::write(self.repo.join("data.proto"), "syntax file").unwrap();
        std::fs::write(self.repo.join("data.json"), format!("{{\"v\":\"{companion_seed}\"}}"))
            .unwrap();
        git(&self.repo, &["add", "."]);
        self.commit_epoch += 60;
        let date = format!("{} +0000", self.commit_epoch);
        git_env(
            &self.repo,
            &["commit", "--quiet", "--allow-empty", "-m", "snapshot"],
            &[("GIT_AUTHOR_DATE", &date), ("GIT_COMMITTER_DATE", &date)],
        );
    }

    fn open_cache(&self) -> Cache {
        Cache::open(&self.db, false, Toronto).unwrap()
    }

    async fn import(&self, cache: &Cache) {
        cache.import(&self.repo, "main").await.unwrap();
    }
}

fn git(dir: &Path, args: &[&str]) {
    git_env(dir, args, &[]);
}

fn git_env(dir: &Path, args: &[&str], env: &[(&str, &str)]) {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(dir);
    for (k, v) in env {
        cmd.env(k, v);
    }
    let status = cmd.status().expect("git runs");
    assert!(status.success(), "git {args:?} failed");
}

fn snapshot_with_date(name: &str, updated_secs: i64) -> Vec<u8> {
    Snapshot {
        facilities: vec![Facility {
            name: name.into(),
            source_url: format!("https://example.org/{name}"),
            source_date: Some(updated_secs),
            ..Default::default()
        }],
        ..Default::default()
    }
    .encode()
}

const DAY_A: i64 = 1_743_480_000; // 2025-04-01 in Toronto
const DAY_B: i64 = 1_743_566_400; // 2025-04-02

#[tokio::test]
async fn test_import_assigns_revisions_in_commit_order() {
    let mut fx = Fixture::new();
    // two commits whose snapshots share an update date but differ in content
    fx.commit(&snapshot_with_date("one", DAY_A), "c1");
    fx.commit(&snapshot_with_date("two", DAY_A), "c2");
    // and one newer
    fx.commit(&snapshot_with_date("three", DAY_B), "c3");

    let cache = fx.open_cache();
    fx.import(&cache).await;

    let versions = cache.versions().unwrap();
    assert_eq!(versions.len(), 3);
    // newest-first listing
    assert_eq!(versions[0].updated.timestamp(), DAY_B);
    assert_eq!(versions[0].revision, 1);
    // equal update dates disambiguated by revision, in commit order
    assert_eq!(versions[1].updated.timestamp(), DAY_A);
    assert_eq!(versions[1].revision, 2);
    assert_eq!(versions[2].updated.timestamp(), DAY_A);
    assert_eq!(versions[2].revision, 1);
    // distinct payloads get distinct plain content-hash ids
    assert_ne!(versions[1].id, versions[2].id);
    assert!(!versions[1].id.starts_with('9'));

    // revision equals one plus the count of previously inserted rows
    // sharing its updated value
    assert_eq!(
        versions
            .iter()
            .filter(|v| v.updated.timestamp() == DAY_A)
            .map(|v| v.revision)
            .max(),
        Some(2)
    );
}

#[tokio::test]
async fn test_import_is_idempotent() {
    let mut fx = Fixture::new();
    fx.commit(&snapshot_with_date("one", DAY_A), "c1");

    let cache = fx.open_cache();
    fx.import(&cache).await;
    let before = cache.versions().unwrap();
    fx.import(&cache).await;
    assert_eq!(cache.versions().unwrap(), before);
}

#[tokio::test]
async fn test_identical_payload_gets_sentinel_id() {
    let mut fx = Fixture::new();
    let payload = snapshot_with_date("same", DAY_A);
    // identical data.pb, different companion files
    fx.commit(&payload, "c1");
    fx.commit(&payload, "c2");

    let cache = fx.open_cache();
    fx.import(&cache).await;

    let versions = cache.versions().unwrap();
    assert_eq!(versions.len(), 2);
    let plain = ContentHash::of(&payload).to_string();
    // newest-first: the second import carries the collision id
    assert_eq!(versions[0].revision, 2);
    assert!(versions[0].id.starts_with('9'), "id: {}", versions[0].id);
    assert_eq!(versions[0].id.len(), plain.len());
    assert_eq!(versions[1].id, plain);
}

#[tokio::test]
async fn test_fully_identical_commit_is_skipped() {
    let mut fx = Fixture::new();
    let payload = snapshot_with_date("same", DAY_A);
    fx.commit(&payload, "c1");
    fx.commit(&payload, "c1"); // same payload and companions
    fx.commit(&payload, "c1"); // and again

    let cache = fx.open_cache();
    fx.import(&cache).await;

    // first wins, second takes the sentinel id, third is a true duplicate
    assert_eq!(cache.versions().unwrap().len(), 2);
}

#[tokio::test]
async fn test_commit_without_dates_is_skipped() {
    let mut fx = Fixture::new();
    let undated = Snapshot {
        facilities: vec![Facility {
            name: "no date".into(),
            ..Default::default()
        }],
        ..Default::default()
    }
    .encode();
    fx.commit(&undated, "c1");
    fx.commit(&snapshot_with_date("dated", DAY_A), "c2");

    let cache = fx.open_cache();
    fx.import(&cache).await;

    let versions = cache.versions().unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].updated.timestamp(), DAY_A);
}

#[tokio::test]
async fn test_commit_missing_required_file_is_skipped() {
    let mut fx = Fixture::new();
    fx.commit(&snapshot_with_date("one", DAY_A), "c1");
    // drop a required companion file for the next commit
    git(&fx.repo, &["rm", "--quiet", "data.json"]);
    std::fs::write(fx.repo.join("data.pb"), snapshot_with_date("two", DAY_B)).unwrap();
    git(&fx.repo, &["add", "."]);
    fx.commit_epoch += 60;
    let date = format!("{} +0000", fx.commit_epoch);
    git_env(
        &fx.repo,
        &["commit", "--quiet", "-m", "broken"],
        &[("GIT_AUTHOR_DATE", &date), ("GIT_COMMITTER_DATE", &date)],
    );

    let cache = fx.open_cache();
    fx.import(&cache).await;

    assert_eq!(cache.versions().unwrap().len(), 1);
}

#[tokio::test]
async fn test_imported_files_round_trip() {
    let mut fx = Fixture::new();
    let payload = snapshot_with_date("one", DAY_A);
    fx.commit(&payload, "c1");

    let cache = fx.open_cache();
    fx.import(&cache).await;

    let id = cache.versions().unwrap()[0].id.clone();
    let formats = cache.formats(&id).unwrap();
    let mut names: Vec<&str> = formats.iter().map(|(_, f)| f.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["json", "pb", "proto", "textpb"]);

    let pb_hash = cache.format_blob(&id, "pb").unwrap().unwrap();
    let blob = cache.read_blob(&pb_hash, false).unwrap().unwrap();
    assert_eq!(blob.bytes, payload);
    // the canonical id is the digest of the canonical payload
    assert_eq!(id, ContentHash::of(&payload).to_string());

    // resolving the full id round-trips
    match cache.resolve_version(&id).unwrap() {
        Resolved::Found { id: rid, updated } => {
            assert_eq!(rid, id);
            assert_eq!(updated.timestamp(), DAY_A);
        }
        other => panic!("expected Found, got {other:?}"),
    }
}
