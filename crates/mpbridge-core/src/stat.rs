// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: POSIX-like stat records reported by the board.
// Author: Lukas Bower

//! `os.stat` results as reported by MicroPython.

use serde::Serialize;

use crate::error::BoardError;
use crate::literal::Value;

/// Directory bit of `st_mode`.
pub const S_IFDIR: u32 = 0x4000;
/// Regular file bit of `st_mode`.
pub const S_IFREG: u32 = 0x8000;

/// Metadata for a single path, in `os.stat` tuple order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatRecord {
    /// `st_mode`; bit 0x4000 marks a directory.
    pub mode: u32,
    /// `st_ino`
    pub ino: u64,
    /// `st_dev`
    pub dev: u64,
    /// `st_nlink`
    pub nlink: u64,
    /// `st_uid`
    pub uid: u32,
    /// `st_gid`
    pub gid: u32,
    /// `st_size` in bytes.
    pub size: u64,
    /// `st_atime`
    pub atime: i64,
    /// `st_mtime`
    pub mtime: i64,
    /// `st_ctime`
    pub ctime: i64,
}

impl StatRecord {
    /// True when the directory bit is set.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFDIR != 0
    }

    /// True when the regular-file bit is set.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.mode & S_IFREG != 0
    }

    /// Convert the 10-tuple printed by `os.stat`.
    pub fn from_value(value: &Value) -> Result<Self, BoardError> {
        let fields = value
            .as_sequence()
            .ok_or_else(|| BoardError::malformed(format!("stat result is not a tuple: {value}")))?;
        if fields.len() < 10 {
            return Err(BoardError::malformed(format!(
                "stat result has {} fields, expected 10",
                fields.len()
            )));
        }
        let int = |idx: usize| -> Result<i64, BoardError> {
            fields[idx].as_int().ok_or_else(|| {
                BoardError::malformed(format!("stat field {idx} is not an integer"))
            })
        };
        Ok(Self {
            mode: narrow(int(0)?, 0)?,
            ino: narrow(int(1)?, 1)?,
            dev: narrow(int(2)?, 2)?,
            nlink: narrow(int(3)?, 3)?,
            uid: narrow(int(4)?, 4)?,
            gid: narrow(int(5)?, 5)?,
            size: narrow(int(6)?, 6)?,
            atime: int(7)?,
            mtime: int(8)?,
            ctime: int(9)?,
        })
    }
}

fn narrow<T: TryFrom<i64>>(value: i64, idx: usize) -> Result<T, BoardError> {
    T::try_from(value)
        .map_err(|_| BoardError::malformed(format!("stat field {idx} out of range: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal;

    #[test]
    fn converts_directory_tuple() {
        let value = literal::parse("(16384, 0, 0, 0, 0, 0, 0, 10, 20, 30)").unwrap();
        let stat = StatRecord::from_value(&value).unwrap();
        assert!(stat.is_dir());
        assert!(!stat.is_file());
        assert_eq!(stat.mtime, 20);
    }

    #[test]
    fn rejects_short_or_negative_tuples() {
        let short = literal::parse("(32768, 0, 0)").unwrap();
        assert!(matches!(
            StatRecord::from_value(&short),
            Err(BoardError::MalformedResponse(_))
        ));
        let negative = literal::parse("(32768, 0, 0, 0, 0, 0, -1, 0, 0, 0)").unwrap();
        assert!(StatRecord::from_value(&negative).is_err());
    }
}
