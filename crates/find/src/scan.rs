use std::{
    collections::HashMap,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
};

use documents::{Buffer, Region, find_regions};
use regex::Regex;
use walkdir::WalkDir;

use crate::{
    FindError,
    filter::skip_reason,
    request::{FindConfig, FindLoc, FindRequest},
    results::{FileResult, FindResults},
    tree::FileNode,
};

/// Where a find runs and what it can see
#[derive(Debug, Clone, Copy)]
pub struct FindScope<'a> {
    pub root: &'a Path,
    /// File tree, used by `Open` and `NotTop`
    pub tree: Option<&'a FileNode>,
    /// File of the active view, used by `File` and `Dir`
    pub active: Option<&'a Path>,
    /// Open buffers, searched in place of their files
    pub buffers: &'a [Arc<dyn Buffer>],
    pub config: &'a FindConfig,
}

struct Candidate {
    path: PathBuf,
    buffer: Option<Arc<dyn Buffer>>,
}

fn buffer_index(scope: &FindScope<'_>) -> HashMap<PathBuf, Arc<dyn Buffer>> {
    scope
        .buffers
        .iter()
        .map(|b| (b.path(), Arc::clone(b)))
        .collect()
}

fn files_in_dir(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .map(|e| e.path())
        .collect();
    files.sort();
    files
}

fn walk_all(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && e.file_name() == ".git"))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

/// Files the request covers, in discovery order
fn candidates(request: &FindRequest, scope: &FindScope<'_>) -> Result<Vec<Candidate>, FindError> {
    let buffers = buffer_index(scope);
    let with_buffer = |path: PathBuf, buffer: Option<Arc<dyn Buffer>>| Candidate {
        buffer: buffer.or_else(|| buffers.get(&path).cloned()),
        path,
    };

    let found = match request.loc {
        FindLoc::File => {
            let active = scope.active.ok_or(FindError::NoActiveFile)?;
            vec![with_buffer(active.to_path_buf(), None)]
        }
        FindLoc::Dir => {
            let active = scope.active.ok_or(FindError::NoActiveFile)?;
            let dir = active.parent().unwrap_or(scope.root);
            files_in_dir(dir)
                .into_iter()
                .map(|p| with_buffer(p, None))
                .collect()
        }
        FindLoc::Open | FindLoc::NotTop => match scope.tree {
            Some(tree) => tree
                .open_files(request.loc == FindLoc::NotTop)
                .into_iter()
                .map(|n| with_buffer(n.path.clone(), n.buffer.clone()))
                .collect(),
            None => {
                tracing::warn!("no file tree available, nothing to search");
                Vec::new()
            }
        },
        FindLoc::All => walk_all(scope.root)
            .into_iter()
            .map(|p| with_buffer(p, None))
            .collect(),
    };
    Ok(found)
}

fn search_file(
    candidate: &Candidate,
    re: &Regex,
    request: &FindRequest,
    config: &FindConfig,
) -> Option<FileResult> {
    let size = match &candidate.buffer {
        Some(_) => 0,
        None => match std::fs::metadata(&candidate.path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::debug!(path = %candidate.path.display(), error = %e, "skipping unreadable file");
                return None;
            }
        },
    };
    if let Some(reason) = skip_reason(
        &candidate.path,
        size,
        candidate.buffer.is_some(),
        request,
        config,
    ) {
        tracing::trace!(path = %candidate.path.display(), ?reason, "skipping file");
        return None;
    }

    let (text, regions) = match &candidate.buffer {
        Some(buffer) => (buffer.text(), buffer.search_regex(re)),
        None => {
            let bytes = match std::fs::read(&candidate.path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::debug!(path = %candidate.path.display(), error = %e, "skipping unreadable file");
                    return None;
                }
            };
            let text = String::from_utf8_lossy(&bytes).into_owned();
            let regions = find_regions(&text, re);
            (text, regions)
        }
    };
    if regions.is_empty() {
        return None;
    }

    let text_lines: Vec<&str> = text.lines().collect();
    let lines = regions
        .iter()
        .map(|r: &Region| text_lines.get(r.start.line).copied().unwrap_or_default().to_string())
        .collect();
    Some(FileResult {
        path: candidate.path.clone(),
        count: regions.len(),
        regions,
        lines,
        buffer: candidate.buffer.clone(),
    })
}

/// Run `request` over `scope`.
///
/// Files are searched in parallel; `cancel` is checked between files and
/// aborts the find with [`FindError::Cancelled`].
#[tracing::instrument(skip(scope, cancel), fields(pattern = %request.pattern, loc = ?request.loc))]
pub fn find(
    request: &FindRequest,
    scope: &FindScope<'_>,
    cancel: &AtomicBool,
) -> Result<FindResults, FindError> {
    let re = request.compile()?;
    let candidates = candidates(request, scope)?;
    tracing::debug!(files = candidates.len(), "searching files");

    let workers = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .min(candidates.len())
        .max(1);
    let next = AtomicUsize::new(0);
    let found: Mutex<Vec<(usize, FileResult)>> = Mutex::new(Vec::new());

    thread::scope(|s| {
        for _ in 0..workers {
            s.spawn(|| {
                while !cancel.load(Ordering::Relaxed) {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(candidate) = candidates.get(i) else {
                        return;
                    };
                    if let Some(result) = search_file(candidate, &re, request, scope.config) {
                        found
                            .lock()
                            .unwrap_or_else(|p| p.into_inner())
                            .push((i, result));
                    }
                }
            });
        }
    });

    if cancel.load(Ordering::Relaxed) {
        tracing::debug!("find cancelled");
        return Err(FindError::Cancelled);
    }

    let mut found = found.into_inner().unwrap_or_else(|p| p.into_inner());
    found.sort_by_key(|(i, _)| *i);
    let mut files: Vec<FileResult> = found.into_iter().map(|(_, r)| r).collect();
    files.sort_by(|a, b| b.count.cmp(&a.count));

    tracing::debug!(files = files.len(), "find complete");
    Ok(FindResults {
        request: request.clone(),
        files,
    })
}
