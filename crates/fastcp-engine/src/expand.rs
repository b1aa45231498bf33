//! Expansion of source patterns into (src, dst) copy requests.
//!
//! Each source may be a file, a directory, or a glob pattern (`*` and `?`
//! per path component). Files pair with the destination directly or with
//! `dst/basename`; directories are walked recursively, landing under the
//! destination itself when it does not exist yet, else under
//! `dst/basename(src)`.

use std::sync::Arc;

use fastcp_rpc::{NamenodeRpc, RemoteErrorKind};
use fastcp_types::{CopyRequest, FileAttrs};

use crate::error::CopyError;

/// Expand all source patterns against `src_namenode` into concrete copy
/// requests targeting `destination` on `dst_namenode`.
///
/// A pattern matching nothing is fatal. More than one expanded source with
/// a file-typed destination is fatal, as is more than one source pattern
/// with a missing destination.
pub async fn expand_requests(
    src_namenode: &Arc<dyn NamenodeRpc>,
    dst_namenode: &Arc<dyn NamenodeRpc>,
    sources: &[String],
    destination: &str,
) -> Result<Vec<CopyRequest>, CopyError> {
    let dst_attrs = dst_namenode.get_file_info(destination).await?;
    if dst_attrs.is_none() && sources.len() > 1 {
        return Err(CopyError::DestinationMissing(destination.to_string()));
    }
    // A missing destination is file-typed: the single source file becomes it.
    let dst_is_dir = dst_attrs.as_ref().map(|a| a.is_dir).unwrap_or(false);

    let mut requests = Vec::new();
    for pattern in sources {
        let matched = glob_status(src_namenode, pattern).await?;
        if matched.is_empty() {
            return Err(CopyError::EmptyGlob(pattern.clone()));
        }

        for attrs in matched {
            if attrs.is_dir {
                let root = if dst_attrs.is_some() {
                    join(destination, basename(&attrs.path))
                } else {
                    destination.to_string()
                };
                walk_dir(src_namenode, &attrs.path, &root, &mut requests).await?;
            } else if dst_is_dir {
                let target = join(destination, basename(&attrs.path));
                requests.push(CopyRequest::new(attrs.path, target));
            } else {
                requests.push(CopyRequest::new(attrs.path, destination.to_string()));
            }
        }
    }

    if requests.len() > 1 {
        if let Some(attrs) = &dst_attrs {
            if !attrs.is_dir {
                return Err(CopyError::DestinationNotDirectory(destination.to_string()));
            }
        }
    }

    Ok(requests)
}

/// Recursively pair every file under `src_root` with its path under
/// `dst_root`.
async fn walk_dir(
    namenode: &Arc<dyn NamenodeRpc>,
    src_root: &str,
    dst_root: &str,
    out: &mut Vec<CopyRequest>,
) -> Result<(), CopyError> {
    let mut stack = vec![(src_root.to_string(), dst_root.to_string())];
    while let Some((src_dir, dst_dir)) = stack.pop() {
        for child in namenode.get_listing(&src_dir).await? {
            let target = join(&dst_dir, basename(&child.path));
            if child.is_dir {
                stack.push((child.path, target));
            } else {
                out.push(CopyRequest::new(child.path, target));
            }
        }
    }
    Ok(())
}

/// Resolve a path or glob pattern into the matching entries.
async fn glob_status(
    namenode: &Arc<dyn NamenodeRpc>,
    pattern: &str,
) -> Result<Vec<FileAttrs>, CopyError> {
    if !pattern.contains(['*', '?']) {
        return Ok(namenode.get_file_info(pattern).await?.into_iter().collect());
    }

    // Expand component by component from the root, listing only where a
    // component actually contains glob characters.
    let mut current: Vec<String> = vec![String::new()];
    for component in pattern.split('/').filter(|c| !c.is_empty()) {
        let mut next = Vec::new();
        if component.contains(['*', '?']) {
            for base in &current {
                let parent = if base.is_empty() { "/" } else { base.as_str() };
                for child in list_or_empty(namenode, parent).await? {
                    if glob_match(component, basename(&child.path)) {
                        next.push(child.path);
                    }
                }
            }
        } else {
            for base in &current {
                next.push(format!("{base}/{component}"));
            }
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }

    let mut matched = Vec::new();
    for path in current {
        if let Some(attrs) = namenode.get_file_info(&path).await? {
            matched.push(attrs);
        }
    }
    matched.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(matched)
}

async fn list_or_empty(
    namenode: &Arc<dyn NamenodeRpc>,
    path: &str,
) -> Result<Vec<FileAttrs>, CopyError> {
    match namenode.get_listing(path).await {
        Ok(children) => Ok(children),
        Err(e) if e.remote_kind() == Some(RemoteErrorKind::FileNotFound) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Match one path component against a pattern with `*` and `?`.
fn glob_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let (mut p, mut n) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            mark = n;
            p += 1;
        } else if let Some(s) = star {
            // Backtrack: let the last `*` swallow one more character.
            p = s + 1;
            mark += 1;
            n = mark;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

fn basename(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

fn join(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}
