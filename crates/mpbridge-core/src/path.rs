// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: POSIX path helpers for board-side paths.
// Author: Lukas Bower

//! Board paths are always `/`-separated, whatever the host uses.

/// Join a parent directory and a child name with exactly one separator.
#[must_use]
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        return name.to_owned();
    }
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Append a trailing separator unless one is present.
#[must_use]
pub fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_owned()
    } else {
        format!("{path}/")
    }
}

/// Normalise a client-supplied path into an absolute board path.
///
/// Backslashes become `/`, a `drive:` prefix is dropped and `.`/`..`
/// components are resolved lexically. The result never ends with `/` unless
/// it is the root.
#[must_use]
pub fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    let path = match path.rsplit_once(':') {
        Some((_, rest)) => rest.to_owned(),
        None => path,
    };
    let mut components: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            other => components.push(other),
        }
    }
    format!("/{}", components.join("/"))
}

/// Final component of a path.
#[must_use]
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Extension without the dot, empty when there is none.
#[must_use]
pub fn extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => "",
        Some(idx) => &name[idx + 1..],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_with_single_separator() {
        assert_eq!(join("/", "boot.py"), "/boot.py");
        assert_eq!(join("/lib/", "x.py"), "/lib/x.py");
        assert_eq!(join("/lib", "x.py"), "/lib/x.py");
    }

    #[test]
    fn normalizes_client_paths() {
        assert_eq!(normalize("C:\\lib\\x.py"), "/lib/x.py");
        assert_eq!(normalize("/lib/./sub/../x.py"), "/lib/x.py");
        assert_eq!(normalize("/lib/"), "/lib");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/../.."), "/");
    }

    #[test]
    fn splits_names_and_extensions() {
        assert_eq!(file_name("/lib/x.py"), "x.py");
        assert_eq!(file_name("/lib/"), "lib");
        assert_eq!(extension("x.tar.gz"), "gz");
        assert_eq!(extension(".hidden"), "");
        assert_eq!(extension("README"), "");
    }
}
