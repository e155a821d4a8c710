// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Remote operation marshalling and transfer over a MicroPython raw REPL.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Host-side bridge to a MicroPython board reached over its raw REPL.
//!
//! Calls are rendered from a closed catalog of device-side functions, shipped
//! as source text and answered with printed literals, framed binary payloads
//! or tracebacks. Tracebacks are classified by OS errno into typed errors and
//! flat directory scans are reassembled into file trees.

pub mod catalog;
pub mod channel;
pub mod error;
pub mod fs;
pub mod literal;
pub mod mock;
pub mod path;
pub mod raw;
pub mod stat;
pub mod transfer;
pub mod tree;

pub use catalog::{lookup, operations, Operation, RemoteCall, CATALOG};
pub use channel::{Channel, ChannelHandle};
pub use error::{BoardError, RemoteError, RemoteErrorKind};
pub use fs::{BoardFs, DownloadFile, UploadFile};
pub use literal::Value;
pub use mock::MockBoard;
pub use raw::{LineShell, RawRepl, RawReplError};
pub use stat::StatRecord;
pub use transfer::{CHUNK_SIZE, SENTINEL};
pub use tree::{build_tree, FileNode, ScanRecord};
