use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use documents::Buffer;

/// The file tree as the find engine sees it: which directories are open,
/// and which files have a buffer.
#[derive(Debug, Clone)]
pub struct FileNode {
    pub path: PathBuf,
    pub is_dir: bool,
    pub open: bool,
    pub children: Vec<FileNode>,
    pub buffer: Option<Arc<dyn Buffer>>,
}

impl FileNode {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            open: false,
            children: Vec::new(),
            buffer: None,
        }
    }

    pub fn dir(path: impl Into<PathBuf>, open: bool, children: Vec<FileNode>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            open,
            children,
            buffer: None,
        }
    }

    pub fn with_buffer(mut self, buffer: Arc<dyn Buffer>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Read the tree below `root` from disk.
    ///
    /// Only directories for which `is_open` holds are listed; `.git` is
    /// never entered.
    pub fn scan(root: &Path, is_open: &dyn Fn(&Path) -> bool) -> std::io::Result<Self> {
        let mut node = Self::dir(root, true, Vec::new());
        node.children = Self::list(root, is_open)?;
        Ok(node)
    }

    fn list(dir: &Path, is_open: &dyn Fn(&Path) -> bool) -> std::io::Result<Vec<FileNode>> {
        let mut entries: Vec<_> = std::fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.file_name());

        let mut children = Vec::with_capacity(entries.len());
        for entry in entries {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                if entry.file_name() == ".git" {
                    continue;
                }
                let open = is_open(&path);
                let grandchildren = if open {
                    Self::list(&path, is_open)?
                } else {
                    Vec::new()
                };
                children.push(Self::dir(path, open, grandchildren));
            } else if file_type.is_file() {
                children.push(Self::file(path));
            }
        }
        Ok(children)
    }

    /// Attach buffers to the files they belong to
    pub fn attach_buffers(&mut self, buffers: &[Arc<dyn Buffer>]) {
        if !self.is_dir {
            if let Some(buffer) = buffers.iter().find(|b| b.path() == self.path) {
                self.buffer = Some(Arc::clone(buffer));
            }
            return;
        }
        for child in &mut self.children {
            child.attach_buffers(buffers);
        }
    }

    /// Files visible in open directories, in tree order
    pub(crate) fn open_files(&self, skip_top: bool) -> Vec<&FileNode> {
        let mut out = Vec::new();
        self.collect_open(0, skip_top, &mut out);
        out
    }

    fn collect_open<'a>(&'a self, depth: usize, skip_top: bool, out: &mut Vec<&'a FileNode>) {
        for child in &self.children {
            if child.is_dir {
                if child.open {
                    child.collect_open(depth + 1, skip_top, out);
                }
            } else if !(skip_top && depth == 0) {
                out.push(child);
            }
        }
    }
}
