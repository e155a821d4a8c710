// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Filesystem adapter exposing the board to file-server style callers.
// Author: Lukas Bower

//! Filesystem view of a board.
//!
//! Callers such as an FTP front end speak in client paths and file handles.
//! [`BoardFs`] normalises paths, routes every request through a shared
//! [`ChannelHandle`] and buffers file content, because the board can only be
//! read or written as a whole.

use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::Path;

use log::{debug, info, warn};

use crate::channel::ChannelHandle;
use crate::error::BoardError;
use crate::path;
use crate::raw::RawRepl;
use crate::stat::StatRecord;
use crate::tree::{self, FileNode};

/// Extensions downloaded in text mode unless configured otherwise.
pub const DEFAULT_TEXT_EXTENSIONS: [&str; 3] = ["py", "txt", "json"];

/// Board filesystem backed by a shared channel.
#[derive(Debug)]
pub struct BoardFs<R: RawRepl> {
    channel: ChannelHandle<R>,
    text_extensions: Vec<String>,
}

impl<R: RawRepl> Clone for BoardFs<R> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            text_extensions: self.text_extensions.clone(),
        }
    }
}

impl<R: RawRepl> BoardFs<R> {
    /// Wrap a shared channel.
    pub fn new(channel: ChannelHandle<R>) -> Self {
        Self {
            channel,
            text_extensions: DEFAULT_TEXT_EXTENSIONS.iter().map(|ext| (*ext).to_owned()).collect(),
        }
    }

    /// Replace the extensions fetched in text mode (without the dot).
    #[must_use]
    pub fn with_text_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.text_extensions = extensions
            .into_iter()
            .map(|ext| ext.into().trim_start_matches('.').to_owned())
            .collect();
        self
    }

    /// The shared channel.
    pub fn channel(&self) -> &ChannelHandle<R> {
        &self.channel
    }

    /// True when `name` is fetched in text mode.
    #[must_use]
    pub fn is_text(&self, name: &str) -> bool {
        let ext = path::extension(name);
        !ext.is_empty() && self.text_extensions.iter().any(|known| known == ext)
    }

    /// Entry names directly below `dir`.
    pub fn list(&self, dir: &str) -> Result<Vec<String>, BoardError> {
        let dir = path::normalize(dir);
        let records = self.channel.lock()?.scan(&dir, false)?;
        Ok(records.into_iter().map(|record| record.name).collect())
    }

    /// Nodes below `dir`, nested when `recursive`.
    pub fn list_tree(&self, dir: &str, recursive: bool) -> Result<Vec<FileNode>, BoardError> {
        let dir = path::normalize(dir);
        let records = self.channel.lock()?.scan(&dir, recursive)?;
        Ok(tree::build_tree(&records, recursive))
    }

    /// Metadata for `target`, possibly cached.
    pub fn stat(&self, target: &str) -> Result<StatRecord, BoardError> {
        self.channel.lock()?.file_info(&path::normalize(target), false)
    }

    /// True when `target` exists; always asks the board.
    pub fn exists(&self, target: &str) -> Result<bool, BoardError> {
        match self.channel.lock()?.file_info(&path::normalize(target), true) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// True when `target` is a directory.
    pub fn is_dir(&self, target: &str) -> Result<bool, BoardError> {
        self.channel.lock()?.is_dir(&path::normalize(target))
    }

    /// True when `target` is not a directory.
    pub fn is_file(&self, target: &str) -> Result<bool, BoardError> {
        self.is_dir(target).map(|dir| !dir)
    }

    /// Size in bytes.
    pub fn size(&self, target: &str) -> Result<u64, BoardError> {
        self.stat(target).map(|stat| stat.size)
    }

    /// Modification time.
    pub fn mtime(&self, target: &str) -> Result<i64, BoardError> {
        self.stat(target).map(|stat| stat.mtime)
    }

    /// Change the board's working directory.
    pub fn chdir(&self, dir: &str) -> Result<(), BoardError> {
        self.channel.lock()?.chdir(&path::normalize(dir))
    }

    /// Create a directory.
    pub fn mkdir(&self, dir: &str) -> Result<(), BoardError> {
        self.channel.lock()?.mkdir(&path::normalize(dir), false)
    }

    /// Remove a directory; `force` removes its contents first.
    pub fn rmdir(&self, dir: &str, force: bool) -> Result<(), BoardError> {
        self.channel.lock()?.rmdir(&path::normalize(dir), force)
    }

    /// Remove a file.
    pub fn remove(&self, file: &str) -> Result<(), BoardError> {
        self.channel.lock()?.remove(&path::normalize(file))
    }

    /// Rename a file or directory.
    pub fn rename(&self, old: &str, new: &str) -> Result<(), BoardError> {
        self.channel
            .lock()?
            .rename(&path::normalize(old), &path::normalize(new))
    }

    /// Fetch a file's content; text files come back with `\n` line endings.
    pub fn read_from_board(&self, file: &str) -> Result<Vec<u8>, BoardError> {
        let file = path::normalize(file);
        let as_text = self.is_text(&file);
        self.channel.lock()?.get(&file, as_text)
    }

    /// Download `file` in binary mode into `destination_dir`; returns the bytes written.
    pub fn copy_from_board(&self, file: &str, destination_dir: &Path) -> Result<u64, BoardError> {
        let file = path::normalize(file);
        let content = self.channel.lock()?.get(&file, false)?;
        let target = destination_dir.join(path::file_name(&file));
        fs::write(&target, &content)?;
        let written = fs::metadata(&target)?.len();
        info!("copied {file} to {} ({written} bytes)", target.display());
        Ok(written)
    }

    /// Recreate the board tree below `destination_dir`.
    ///
    /// Without `nodes` the whole board is scanned first. Returns the number of
    /// files copied.
    pub fn mirror_from_board(
        &self,
        destination_dir: &Path,
        nodes: Option<&[FileNode]>,
    ) -> Result<usize, BoardError> {
        let scanned;
        let nodes = match nodes {
            Some(nodes) => nodes,
            None => {
                scanned = self.list_tree("/", true)?;
                &scanned
            }
        };
        let mut copied = 0;
        for node in nodes {
            if node.is_dir() {
                let local = destination_dir.join(node.name());
                fs::create_dir_all(&local)?;
                debug!("mirror directory {} -> {}", node.full_name(), local.display());
                copied += self.mirror_from_board(&local, Some(node.children()))?;
            } else {
                self.copy_from_board(&node.full_name(), destination_dir)?;
                copied += 1;
            }
        }
        Ok(copied)
    }

    /// Upload a host file to `remote`.
    pub fn copy_to_board(&self, local: &Path, remote: &str) -> Result<(), BoardError> {
        let data = fs::read(local)?;
        self.channel.lock()?.put(&path::normalize(remote), &data)
    }

    /// Open `file` for reading; the whole file is fetched up front.
    pub fn open_for_read(&self, file: &str) -> Result<DownloadFile, BoardError> {
        let content = self.read_from_board(file)?;
        Ok(DownloadFile {
            name: path::normalize(file),
            content: Cursor::new(content),
        })
    }

    /// Open `file` for writing; content reaches the board on [`UploadFile::close`].
    pub fn open_for_write(&self, file: &str) -> UploadFile<R> {
        UploadFile {
            name: path::normalize(file),
            buffer: Vec::new(),
            channel: Some(self.channel.clone()),
        }
    }
}

/// Readable in-memory copy of a board file.
#[derive(Debug, Clone)]
pub struct DownloadFile {
    name: String,
    content: Cursor<Vec<u8>>,
}

impl DownloadFile {
    /// Board path of the file.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total size of the buffered content.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.get_ref().len()
    }

    /// True for an empty file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.get_ref().is_empty()
    }

    /// Buffered content.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.content.into_inner()
    }
}

impl Read for DownloadFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.content.read(buf)
    }
}

/// Write buffer uploaded as a whole when closed.
#[derive(Debug)]
pub struct UploadFile<R: RawRepl> {
    name: String,
    buffer: Vec<u8>,
    channel: Option<ChannelHandle<R>>,
}

impl<R: RawRepl> UploadFile<R> {
    /// Board path of the file.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes buffered so far.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Upload the buffered content.
    pub fn close(mut self) -> Result<(), BoardError> {
        let Some(channel) = self.channel.take() else {
            return Ok(());
        };
        debug!("upload {} ({} bytes)", self.name, self.buffer.len());
        let data = core::mem::take(&mut self.buffer);
        let result = channel.lock()?.put(&self.name, &data);
        result
    }
}

impl<R: RawRepl> Write for UploadFile<R> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<R: RawRepl> Drop for UploadFile<R> {
    fn drop(&mut self) {
        if self.channel.is_some() {
            warn!(
                "upload of {} dropped without close; {} bytes discarded",
                self.name,
                self.buffer.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::mock::MockBoard;

    fn board_fs(board: MockBoard) -> BoardFs<MockBoard> {
        BoardFs::new(ChannelHandle::new(Channel::new(board)))
    }

    #[test]
    fn text_extensions_are_configurable() {
        let fs = board_fs(MockBoard::new());
        assert!(fs.is_text("/main.py"));
        assert!(!fs.is_text("/data.bin"));
        let fs = fs.with_text_extensions([".csv"]);
        assert!(fs.is_text("log.csv"));
        assert!(!fs.is_text("main.py"));
    }

    #[test]
    fn exists_maps_not_found_to_false() {
        let fs = board_fs(MockBoard::demo());
        assert!(fs.exists("/boot.py").unwrap());
        assert!(!fs.exists("C:\\missing.py").unwrap());
    }

    #[test]
    fn upload_commits_on_close_only() {
        let fs = board_fs(MockBoard::new());
        let mut upload = fs.open_for_write("/notes.txt");
        upload.write_all(b"line one\n").unwrap();
        assert!(!fs.exists("/notes.txt").unwrap());
        upload.close().unwrap();
        let mut download = fs.open_for_read("/notes.txt").unwrap();
        let mut text = String::new();
        download.read_to_string(&mut text).unwrap();
        assert_eq!(text, "line one\n");
    }
}
