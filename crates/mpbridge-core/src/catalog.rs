// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Closed catalog of device-side operations and call rendering.
// Author: Lukas Bower

//! Closed catalog of device-side operations.
//!
//! Each entry carries the MicroPython source that defines the function on the
//! board and its parameter list. A call is rendered by appending an invocation
//! to the source, so the board never needs anything preinstalled.

use crate::error::BoardError;
use crate::literal::Value;

/// Operation names understood by the catalog.
pub mod op {
    /// Stream a file as `size(4, BE) | bytes | terminator`.
    pub const GET_FILE: &str = "getFile";
    /// `os.stat` of a single path.
    pub const GET_FILE_INFO: &str = "getFileInfo";
    /// Flat (optionally recursive) directory scan.
    pub const SCAN_DIR: &str = "scanDir";
    /// Change the board's working directory.
    pub const CH_DIR: &str = "chDir";
    /// Create a directory.
    pub const MK_DIR: &str = "mkDir";
    /// Rename a file or directory.
    pub const RENAME: &str = "rename";
    /// Remove a file.
    pub const DELETE_FILE: &str = "deleteFile";
    /// Remove a directory, optionally with its contents.
    pub const DELETE_FOLDER: &str = "deleteFolder";
    /// Collect `os.uname()` fields.
    pub const GET_ID: &str = "getID";
}

/// A device-side function the host may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    /// Unique name, identical to the Python function name.
    pub name: &'static str,
    /// Declared parameter names.
    pub params: &'static [&'static str],
    /// Source text defining the function on the board.
    pub source: &'static str,
}

impl Operation {
    /// Declared number of parameters.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Python-style signature, e.g. `scanDir(path, recurse)`.
    #[must_use]
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, self.params.join(", "))
    }
}

/// Number of operations in the catalog.
pub const OPERATION_COUNT: usize = 9;

/// The fixed operation catalog.
pub static CATALOG: [Operation; OPERATION_COUNT] = [
    Operation {
        name: op::GET_FILE,
        params: &["fileName", "terminator", "chunkSize"],
        source: r#"def getFile(fileName, terminator, chunkSize):
    import sys
    out = getattr(sys.stdout, 'buffer', sys.stdout)
    with open(fileName, 'rb') as f:
        size = f.seek(0, 2)
        out.write(size.to_bytes(4, 'big'))
        f.seek(0, 0)
        while True:
            chunk = f.read(chunkSize)
            if not chunk:
                break
            out.write(chunk)
    out.write(terminator)
"#,
    },
    Operation {
        name: op::GET_FILE_INFO,
        params: &["fileName"],
        source: r#"def getFileInfo(fileName):
    import os
    return os.stat(fileName)
"#,
    },
    Operation {
        name: op::SCAN_DIR,
        params: &["path", "recurse"],
        source: r#"def scanDir(path, recurse):
    import os
    if not path.endswith('/'):
        path += '/'
    result = []
    for name in sorted(os.listdir(path)):
        stats = os.stat(path + name)
        result.append((name, path, stats))
        if recurse and (stats[0] & 0x4000):
            result.extend(scanDir(path + name, recurse))
    return result
"#,
    },
    Operation {
        name: op::CH_DIR,
        params: &["name"],
        source: r#"def chDir(name):
    import os
    os.chdir(name)
"#,
    },
    Operation {
        name: op::MK_DIR,
        params: &["name"],
        source: r#"def mkDir(name):
    import os
    os.mkdir(name)
"#,
    },
    Operation {
        name: op::RENAME,
        params: &["oldName", "newName"],
        source: r#"def rename(oldName, newName):
    import os
    os.rename(oldName, newName)
"#,
    },
    Operation {
        name: op::DELETE_FILE,
        params: &["fileName"],
        source: r#"def deleteFile(fileName):
    import os
    os.remove(fileName)
"#,
    },
    Operation {
        name: op::DELETE_FOLDER,
        params: &["directory", "deleteEvenIfNotEmpty"],
        source: r#"def deleteFolder(directory, deleteEvenIfNotEmpty):
    import os
    def rmtree(path):
        if deleteEvenIfNotEmpty:
            for name in os.listdir(path):
                child = path + '/' + name
                if os.stat(child)[0] & 0x4000:
                    rmtree(child)
                else:
                    os.remove(child)
        os.rmdir(path)
    rmtree(directory.rstrip('/') or '/')
"#,
    },
    Operation {
        name: op::GET_ID,
        params: &[],
        source: r#"def getID():
    import os
    n = os.uname()
    return [(a, getattr(n, a)) for a in dir(n) if not a.startswith('_')]
"#,
    },
];

/// Iterate the catalog in declaration order.
pub fn operations() -> impl Iterator<Item = &'static Operation> {
    CATALOG.iter()
}

/// Find an operation by name.
pub fn lookup(name: &str) -> Result<&'static Operation, BoardError> {
    CATALOG
        .iter()
        .find(|operation| operation.name == name)
        .ok_or_else(|| BoardError::UnknownOperation(name.to_owned()))
}

/// A validated invocation of a catalog operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    operation: &'static Operation,
    args: Vec<Value>,
    want_result: bool,
}

impl RemoteCall {
    /// Validate `args` against the operation's declared arity.
    pub fn new(name: &str, args: &[Value], want_result: bool) -> Result<Self, BoardError> {
        let operation = lookup(name)?;
        if args.len() != operation.arity() {
            return Err(BoardError::ArityMismatch {
                operation: operation.signature(),
                expected: operation.arity(),
                found: args.len(),
            });
        }
        Ok(Self {
            operation,
            args: args.to_vec(),
            want_result,
        })
    }

    /// The catalog entry being invoked.
    #[must_use]
    pub fn operation(&self) -> &'static Operation {
        self.operation
    }

    /// Positional arguments.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Whether the call prints its return value.
    #[must_use]
    pub fn want_result(&self) -> bool {
        self.want_result
    }

    /// Source definition, a blank line, then the invocation.
    #[must_use]
    pub fn render(&self) -> String {
        let args = self
            .args
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let call = format!("{}({args})", self.operation.name);
        let source = self.operation.source.trim_end();
        if self.want_result {
            format!("{source}\n\nprint({call})")
        } else {
            format!("{source}\n\n{call}")
        }
    }
}

/// Render the source shipped to the board for `name(args)`.
pub fn render(name: &str, args: &[Value], want_result: bool) -> Result<String, BoardError> {
    RemoteCall::new(name, args, want_result).map(|call| call.render())
}
