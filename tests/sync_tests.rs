// End-to-end tests for the reconciliation engine and supervisor,
// driven over real directory trees in tempdirs.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use replisync::sync::{CancelFlag, Supervisor, SyncCycle, SyncError};
use tempfile::tempdir;

fn run_cycle(source: &Path, replica: &Path) -> replisync::sync::CycleStats {
    SyncCycle::new(source, replica).run().unwrap()
}

#[test]
fn test_new_file_is_copied_with_content_and_permissions() {
    let source = tempdir().unwrap();
    let replica = tempdir().unwrap();
    let src_file = source.path().join("a.txt");
    fs::write(&src_file, b"hi").unwrap();
    fs::set_permissions(&src_file, fs::Permissions::from_mode(0o640)).unwrap();

    let stats = run_cycle(source.path(), replica.path());

    assert_eq!(stats.copied, 1);
    let rep_file = replica.path().join("a.txt");
    assert_eq!(fs::read(&rep_file).unwrap(), b"hi");
    assert_eq!(
        fs::metadata(&rep_file).unwrap().permissions().mode() & 0o7777,
        0o640
    );
}

#[test]
fn test_extra_replica_file_is_deleted() {
    let source = tempdir().unwrap();
    let replica = tempdir().unwrap();
    fs::write(replica.path().join("old.txt"), b"stale").unwrap();

    let stats = run_cycle(source.path(), replica.path());

    assert_eq!(stats.deleted, 1);
    assert!(!replica.path().join("old.txt").exists());
}

#[test]
fn test_identical_trees_produce_zero_actions() {
    let source = tempdir().unwrap();
    let replica = tempdir().unwrap();
    for root in [source.path(), replica.path()] {
        fs::write(root.join("same.txt"), b"unchanged").unwrap();
    }

    let stats = run_cycle(source.path(), replica.path());
    assert_eq!(stats.actions(), 0);
    assert_eq!(stats.item_failures, 0);
}

#[test]
fn test_nested_change_converges_and_is_idempotent() {
    let source = tempdir().unwrap();
    let replica = tempdir().unwrap();
    for root in [source.path(), replica.path()] {
        fs::create_dir(root.join("doc")).unwrap();
    }
    fs::write(source.path().join("doc/nested.txt"), b"new contents").unwrap();
    fs::write(replica.path().join("doc/nested.txt"), b"old").unwrap();

    let first = run_cycle(source.path(), replica.path());
    assert!(first.actions() > 0);
    assert_eq!(
        fs::read(replica.path().join("doc/nested.txt")).unwrap(),
        b"new contents"
    );

    // A second pass with no intervening source changes must be a no-op.
    let second = run_cycle(source.path(), replica.path());
    assert_eq!(second.actions(), 0);
}

#[test]
fn test_deep_tree_converges() {
    let source = tempdir().unwrap();
    let replica = tempdir().unwrap();
    fs::create_dir_all(source.path().join("a/b/c")).unwrap();
    fs::write(source.path().join("a/top.txt"), b"top").unwrap();
    fs::write(source.path().join("a/b/c/deep.txt"), b"deep").unwrap();

    run_cycle(source.path(), replica.path());

    assert_eq!(fs::read(replica.path().join("a/top.txt")).unwrap(), b"top");
    assert_eq!(
        fs::read(replica.path().join("a/b/c/deep.txt")).unwrap(),
        b"deep"
    );
    assert_eq!(run_cycle(source.path(), replica.path()).actions(), 0);
}

#[test]
fn test_permission_drift_forces_replace() {
    let source = tempdir().unwrap();
    let replica = tempdir().unwrap();
    for root in [source.path(), replica.path()] {
        fs::write(root.join("f"), b"same bytes").unwrap();
    }
    fs::set_permissions(source.path().join("f"), fs::Permissions::from_mode(0o600)).unwrap();
    fs::set_permissions(replica.path().join("f"), fs::Permissions::from_mode(0o644)).unwrap();

    let stats = run_cycle(source.path(), replica.path());

    assert_eq!(stats.replaced, 1);
    assert_eq!(
        fs::metadata(replica.path().join("f"))
            .unwrap()
            .permissions()
            .mode()
            & 0o7777,
        0o600
    );
}

#[test]
fn test_type_mismatch_discards_replica_side_then_recopies() {
    let source = tempdir().unwrap();
    let replica = tempdir().unwrap();
    fs::write(source.path().join("x"), b"file contents").unwrap();
    fs::create_dir(replica.path().join("x")).unwrap();
    fs::write(replica.path().join("x/inner"), b"junk").unwrap();

    // First pass: the ambiguous replica entry is discarded, never copied over.
    let first = run_cycle(source.path(), replica.path());
    assert!(first.skipped_funny >= 1);
    assert!(!replica.path().join("x").exists());

    // Second pass: the name is now source-only and copies cleanly.
    let second = run_cycle(source.path(), replica.path());
    assert_eq!(second.copied, 1);
    assert_eq!(fs::read(replica.path().join("x")).unwrap(), b"file contents");
}

#[test]
fn test_replica_symlink_is_unlinked_not_followed() {
    let source = tempdir().unwrap();
    let replica = tempdir().unwrap();
    let outside = tempdir().unwrap();
    let target = outside.path().join("precious");
    fs::write(&target, b"do not delete").unwrap();
    std::os::unix::fs::symlink(&target, replica.path().join("link")).unwrap();

    let stats = run_cycle(source.path(), replica.path());

    assert_eq!(stats.deleted, 1);
    assert!(!replica.path().join("link").exists());
    assert!(target.exists());
}

#[test]
fn test_source_symlink_is_recreated_as_link() {
    let source = tempdir().unwrap();
    let replica = tempdir().unwrap();
    fs::write(source.path().join("data"), b"payload").unwrap();
    std::os::unix::fs::symlink("data", source.path().join("link")).unwrap();

    run_cycle(source.path(), replica.path());

    let rep_link = replica.path().join("link");
    assert!(fs::symlink_metadata(&rep_link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&rep_link).unwrap(), Path::new("data"));
}

#[test]
fn test_symlink_retarget_is_replaced() {
    let source = tempdir().unwrap();
    let replica = tempdir().unwrap();
    for root in [source.path(), replica.path()] {
        fs::write(root.join("a"), b"a").unwrap();
        fs::write(root.join("b"), b"b").unwrap();
    }
    std::os::unix::fs::symlink("a", source.path().join("link")).unwrap();
    std::os::unix::fs::symlink("b", replica.path().join("link")).unwrap();

    let stats = run_cycle(source.path(), replica.path());

    assert_eq!(stats.replaced, 1);
    assert_eq!(
        fs::read_link(replica.path().join("link")).unwrap(),
        Path::new("a")
    );
}

#[test]
fn test_uncopyable_item_does_not_block_siblings() {
    let source = tempdir().unwrap();
    let replica = tempdir().unwrap();
    fs::write(source.path().join("a.txt"), b"fine").unwrap();
    // A fifo has no copy primitive; copying it must fail as a single item.
    let status = std::process::Command::new("mkfifo")
        .arg(source.path().join("pipe"))
        .status()
        .unwrap();
    assert!(status.success());

    let stats = run_cycle(source.path(), replica.path());

    assert!(stats.item_failures >= 1);
    assert_eq!(fs::read(replica.path().join("a.txt")).unwrap(), b"fine");
}

#[test]
fn test_undigestable_common_file_is_discarded() {
    let source = tempdir().unwrap();
    let replica = tempdir().unwrap();
    let src_file = source.path().join("f");
    let rep_file = replica.path().join("f");
    fs::write(&src_file, b"aaaa").unwrap();
    fs::write(&rep_file, b"bbbb").unwrap();

    // Same mode and size force the comparator down to the digest step,
    // where the read then fails.
    for f in [&src_file, &rep_file] {
        fs::set_permissions(f, fs::Permissions::from_mode(0o000)).unwrap();
    }
    if fs::read(&src_file).is_ok() {
        return; // privileged process reads through the permission bits
    }

    let stats = run_cycle(source.path(), replica.path());

    // The entry cannot be proven equal, so the stale replica side must be
    // discarded for a later cycle to recopy, not kept in place.
    assert!(stats.skipped_funny >= 1);
    assert_eq!(stats.deleted, 1);
    assert!(!rep_file.exists());
}

#[test]
fn test_unreadable_source_entry_is_never_copied() {
    let source = tempdir().unwrap();
    let replica = tempdir().unwrap();
    fs::write(source.path().join("secret"), b"hidden").unwrap();

    // Read without execute: the child is listed but its metadata is not
    // readable, so it can never be safely reconciled.
    fs::set_permissions(source.path(), fs::Permissions::from_mode(0o444)).unwrap();
    if fs::symlink_metadata(source.path().join("secret")).is_ok() {
        fs::set_permissions(source.path(), fs::Permissions::from_mode(0o755)).unwrap();
        return; // privileged process stats through missing execute bits
    }

    let stats = run_cycle(source.path(), replica.path());
    fs::set_permissions(source.path(), fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(stats.copied, 0);
    assert_eq!(stats.deleted, 0);
    assert!(stats.skipped_funny >= 1);
    assert!(!replica.path().join("secret").exists());
}

#[tokio::test]
async fn test_supervisor_stops_when_replica_root_vanishes() {
    let source = tempdir().unwrap();
    let replica = tempdir().unwrap();
    let log_dir = tempdir().unwrap();
    let log_path = log_dir.path().join("sync.log");
    fs::write(&log_path, b"").unwrap();

    let replica_root = replica.path().to_path_buf();
    drop(replica); // simulate external deletion mid-run

    let supervisor = Supervisor::new(
        source.path(),
        &replica_root,
        &log_path,
        Duration::from_secs(1),
        CancelFlag::new(),
    );

    let err = supervisor.run().await.unwrap_err();
    assert!(matches!(err, SyncError::RootMissing { .. }));
}

#[tokio::test]
async fn test_supervisor_exits_on_cancellation_without_new_pass() {
    let source = tempdir().unwrap();
    let replica = tempdir().unwrap();
    let log_dir = tempdir().unwrap();
    let log_path = log_dir.path().join("sync.log");
    fs::write(&log_path, b"").unwrap();
    fs::write(source.path().join("a.txt"), b"hi").unwrap();

    let cancel = CancelFlag::new();
    cancel.cancel();

    let supervisor = Supervisor::new(
        source.path(),
        replica.path(),
        &log_path,
        Duration::from_secs(10),
        cancel,
    );

    // With the flag already set the loop must exit promptly, before
    // starting another pass or sleeping out the interval.
    let result = tokio::time::timeout(Duration::from_secs(1), supervisor.run())
        .await
        .expect("supervisor did not observe cancellation");
    assert!(result.is_ok());
    assert!(!replica.path().join("a.txt").exists());
}

#[tokio::test]
async fn test_supervisor_requires_log_target() {
    let source = tempdir().unwrap();
    let replica = tempdir().unwrap();
    let log_dir = tempdir().unwrap();

    let supervisor = Supervisor::new(
        source.path(),
        replica.path(),
        &log_dir.path().join("never-created.log"),
        Duration::from_secs(1),
        CancelFlag::new(),
    );

    let err = supervisor.run().await.unwrap_err();
    assert!(matches!(err, SyncError::RootMissing { .. }));
}
