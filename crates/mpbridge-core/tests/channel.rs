// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Validate remote execution, error classification and stat caching.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use mpbridge_core::catalog::op;
use mpbridge_core::{BoardError, Channel, MockBoard, RemoteErrorKind, Value};

#[test]
fn wrong_arity_sends_nothing() {
    let mut channel = Channel::new(MockBoard::new());
    let err = channel
        .execute(op::SCAN_DIR, &[Value::from("/")], true)
        .expect_err("scanDir needs two arguments");
    assert!(matches!(
        err,
        BoardError::ArityMismatch {
            expected: 2,
            found: 1,
            ..
        }
    ));
    assert!(err.to_string().contains("scanDir(path, recurse)"));
    assert_eq!(channel.repl().exec_count(), 0);
}

#[test]
fn unknown_operation_sends_nothing() {
    let mut channel = Channel::new(MockBoard::new());
    let err = channel.execute("reboot", &[], false).unwrap_err();
    assert!(matches!(err, BoardError::UnknownOperation(_)));
    assert_eq!(channel.repl().exec_count(), 0);
}

#[test]
fn file_info_is_cached_until_forced() {
    let mut channel = Channel::new(MockBoard::demo());
    let first = channel.file_info("/boot.py", false).unwrap();
    let second = channel.file_info("/boot.py", false).unwrap();
    assert_eq!(first, second);
    assert_eq!(channel.repl().exec_count(), 1);
    channel.file_info("/boot.py", true).unwrap();
    assert_eq!(channel.repl().exec_count(), 2);
    assert!(!channel.repl().in_raw_mode());
}

#[test]
fn scan_replaces_stat_cache() {
    let mut channel = Channel::new(MockBoard::demo());
    channel.file_info("/boot.py", false).unwrap();
    let records = channel.scan("/lib", true).unwrap();
    let names: Vec<_> = records.iter().map(|r| r.full_path()).collect();
    assert_eq!(names, ["/lib/app.py", "/lib/net", "/lib/net/wifi.py"]);
    assert!(channel.cached_stat("/boot.py").is_none());
    assert!(channel.cached_stat("/lib/net").unwrap().is_dir());
    let before = channel.repl().exec_count();
    assert!(channel.is_dir("/lib/net").unwrap());
    assert_eq!(channel.repl().exec_count(), before);
}

#[test]
fn missing_path_is_resource_not_found() {
    let mut channel = Channel::new(MockBoard::new());
    let err = channel.file_info("/missing.py", false).unwrap_err();
    assert!(err.is_not_found());
    let BoardError::Remote(remote) = err else {
        panic!("expected a remote error");
    };
    assert_eq!(remote.errno(), 2);
    assert_eq!(remote.operation(), op::GET_FILE_INFO);
    assert_eq!(
        remote.message(),
        "ENOENT: No such file or directory: getFileInfo('/missing.py')"
    );
    assert!(remote.traceback().contains("[Errno 2] ENOENT"));
}

#[test]
fn mkdir_tolerates_existing_directory_when_asked() {
    let mut channel = Channel::new(MockBoard::demo());
    let err = channel.mkdir("/lib", false).unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::DirectoryExists));
    channel.mkdir("/lib", true).unwrap();
    channel.mkdir("/lib/fresh", true).unwrap();
    assert!(channel.repl().contains("/lib/fresh"));
}

#[test]
fn rmdir_requires_force_for_populated_directory() {
    let mut channel = Channel::new(MockBoard::demo());
    let err = channel.rmdir("/lib", false).unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::DirectoryNotEmpty));
    channel.rmdir("/lib", true).unwrap();
    assert!(!channel.repl().contains("/lib/net/wifi.py"));
    assert!(!channel.repl().contains("/lib"));
}

#[test]
fn removing_a_directory_as_file_expects_a_file() {
    let mut channel = Channel::new(MockBoard::demo());
    let err = channel.remove("/lib").unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::FileExpected));
}

#[test]
fn rename_and_chdir_reach_the_board() {
    let mut channel = Channel::new(MockBoard::demo());
    channel.rename("/lib", "/pkg").unwrap();
    assert!(channel.repl().contains("/pkg/net/wifi.py"));
    channel.chdir("/pkg").unwrap();
    assert_eq!(channel.repl().cwd(), "/pkg");
    let info = channel.file_info("app.py", false).unwrap();
    assert!(info.is_file());
}

#[test]
fn id_returns_uname_pairs() {
    let mut channel = Channel::new(MockBoard::new());
    let id = channel.id().unwrap();
    assert_eq!(id[0].0, "machine");
    assert!(id.iter().any(|(key, value)| key == "release" && value == "1.22.0"));
}

#[test]
fn fire_and_forget_returns_none() {
    let mut channel = Channel::new(MockBoard::demo());
    let value = channel
        .execute(op::MK_DIR, &[Value::from("/tmp")], false)
        .unwrap();
    assert!(value.is_none());
    let last = channel.repl().executed().last().unwrap();
    assert!(last.ends_with("\n\nmkDir('/tmp')"));
}
