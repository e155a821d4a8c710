// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Exercise mpsh shell commands against the simulated board.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::fs;
use std::io::Cursor;

use mpbridge_core::{BoardFs, Channel, ChannelHandle, MockBoard};
use mpsh::{passthrough, CommandStatus, Shell};
use tempfile::TempDir;

fn board_fs(board: MockBoard) -> BoardFs<MockBoard> {
    BoardFs::new(ChannelHandle::new(Channel::new(board)))
}

fn shell(board: MockBoard) -> Shell<MockBoard, Vec<u8>> {
    Shell::new(board_fs(board), Vec::new())
}

fn output(shell: Shell<MockBoard, Vec<u8>>) -> String {
    let (_fs, buffer) = shell.into_parts();
    String::from_utf8(buffer).unwrap()
}

#[test]
fn ls_lists_root_entries() {
    let mut shell = shell(MockBoard::demo());
    shell.execute("ls").unwrap();
    let out = output(shell);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 4, "unexpected listing: {out:?}");
    assert!(lines[0].starts_with("boot.py"));
    assert!(lines[2].starts_with("* lib"));
    assert!(lines.iter().all(|line| line.ends_with("[/]")));
}

#[test]
fn ls_recursive_includes_nested_files() {
    let mut shell = shell(MockBoard::demo());
    shell.execute("ls -r /lib").unwrap();
    let out = output(shell);
    assert!(out.contains("wifi.py"), "missing nested file: {out:?}");
    assert!(out.contains("[/lib/net/]"));
}

#[test]
fn tree_reports_directory_totals() {
    let mut shell = shell(MockBoard::demo());
    shell.execute("tree").unwrap();
    let out = output(shell);
    assert!(out.contains("lib/ (46 bytes)"), "tree output: {out:?}");
    assert!(out.contains("    wifi.py (14 bytes, "));
}

#[test]
fn cat_normalises_line_endings() {
    let mut shell = shell(MockBoard::demo());
    shell.execute("cat main.py").unwrap();
    assert_eq!(output(shell), "import app\napp.run()\n");
}

#[test]
fn stat_describes_directories() {
    let mut shell = shell(MockBoard::demo());
    shell.execute("stat /lib").unwrap();
    let out = output(shell);
    assert!(out.starts_with("/lib: directory mode=0o40000"), "stat output: {out:?}");
}

#[test]
fn unknown_command_is_an_error() {
    let mut shell = shell(MockBoard::demo());
    let err = shell.execute("format /").unwrap_err();
    assert_eq!(err.to_string(), "unknown command 'format'");
}

#[test]
fn missing_arguments_are_reported() {
    let mut shell = shell(MockBoard::demo());
    let err = shell.execute("mv /boot.py").unwrap_err();
    assert_eq!(err.to_string(), "mv requires a destination");
    let err = shell.execute("cat").unwrap_err();
    assert_eq!(err.to_string(), "cat requires a path");
}

#[test]
fn missing_file_surfaces_board_error() {
    let mut shell = shell(MockBoard::demo());
    let err = shell.execute("stat /nope.py").unwrap_err();
    assert!(format!("{err:#}").contains("ENOENT"), "{err:#}");
}

#[test]
fn mkdir_cd_and_rm_update_the_board() {
    let mut shell = shell(MockBoard::demo());
    shell.execute("mkdir www").unwrap();
    shell.execute("cd www").unwrap();
    assert_eq!(shell.cwd(), "/www");
    shell.execute("mv ../main.py index.py").unwrap();
    shell.execute("rm /boot.py").unwrap();
    let (fs, _) = shell.into_parts();
    let guard = fs.channel().lock().unwrap();
    let board = guard.repl();
    assert!(board.contains("/www/index.py"));
    assert!(!board.contains("/main.py"));
    assert!(!board.contains("/boot.py"));
}

#[test]
fn rmdir_requires_force_for_populated_directories() {
    let mut shell = shell(MockBoard::demo());
    assert!(shell.execute("rmdir /lib").is_err());
    shell.execute("rmdir -f /lib").unwrap();
    let (fs, _) = shell.into_parts();
    assert!(!fs.channel().lock().unwrap().repl().contains("/lib"));
}

#[test]
fn get_and_put_move_files_through_the_host() {
    let dir = TempDir::new().unwrap();
    let mut shell = shell(MockBoard::demo()).with_local_dir(dir.path());
    shell.execute("get /data.bin").unwrap();
    assert_eq!(
        fs::read(dir.path().join("data.bin")).unwrap(),
        [0x00, 0x04, 0xff, 0x2a]
    );

    let local = dir.path().join("settings.txt");
    fs::write(&local, b"debug=1\n").unwrap();
    shell
        .execute(&format!("put {} /lib/settings.txt", local.display()))
        .unwrap();
    let out = {
        let (fs, buffer) = shell.into_parts();
        assert_eq!(
            fs.channel()
                .lock()
                .unwrap()
                .repl()
                .file("/lib/settings.txt")
                .unwrap(),
            b"debug=1\n"
        );
        String::from_utf8(buffer).unwrap()
    };
    assert!(out.contains("/data.bin: 4 bytes copied"));
    assert!(out.contains("/lib/settings.txt: uploaded"));
}

#[test]
fn bang_forwards_to_the_friendly_repl() {
    let mut shell = shell(MockBoard::demo());
    shell.execute("!print('hi')").unwrap();
    shell.execute("!blink(3)").unwrap();
    let out = output(shell);
    assert!(out.starts_with("hi\n"));
    assert!(out.contains("NameError: name 'blink' isn't defined"));
}

#[test]
fn id_prints_aligned_uname_fields() {
    let mut shell = shell(MockBoard::demo());
    shell.execute("id").unwrap();
    let out = output(shell);
    assert!(out.contains("machine  : Mock board with RP2040"), "{out:?}");
    assert_eq!(out.lines().count(), 5);
}

#[test]
fn script_stops_at_quit() {
    let mut shell = shell(MockBoard::demo());
    let script = "# setup\n\nmkdir /www\nquit\nrm /boot.py\n";
    shell.run_script(Cursor::new(script)).unwrap();
    let (fs, buffer) = shell.into_parts();
    assert!(String::from_utf8(buffer).unwrap().contains("closing session"));
    let guard = fs.channel().lock().unwrap();
    assert!(guard.repl().contains("/www"));
    assert!(guard.repl().contains("/boot.py"));
}

#[test]
fn script_propagates_command_errors() {
    let mut shell = shell(MockBoard::demo());
    assert_eq!(shell.execute("help").unwrap(), CommandStatus::Continue);
    assert!(shell.run_script(Cursor::new("ls /missing\n")).is_err());
}

#[test]
fn passthrough_stops_on_exit() {
    let fs = board_fs(MockBoard::demo());
    let mut out = Vec::new();
    passthrough(&fs, Cursor::new("42\nexit\nprint('late')\n"), &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    assert!(out.starts_with("Enter your commands below.\n"));
    assert!(out.ends_with("42\n"));
    assert!(!out.contains("late"));
}
