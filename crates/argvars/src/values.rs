use std::{
    collections::BTreeMap,
    path::{Component, Path, PathBuf},
};

use crate::{
    BindError, PROMPT_SLOTS,
    bind::{bind_with, template_vars},
    vars::{self, prompt_slot},
};

/// Project level values every template can reference
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectVars {
    pub root: PathBuf,
    pub build_dir: PathBuf,
    pub build_target: PathBuf,
    pub run_exec: PathBuf,
}

impl ProjectVars {
    fn absolute(&self, path: &Path) -> PathBuf {
        if path.as_os_str().is_empty() || path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// What the active editor view exposes to templates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorContext {
    /// 0-based cursor line
    pub line: usize,
    /// 0-based cursor column
    pub col: usize,
    pub selection: String,
}

/// Resolved values for the variables of one dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgValues {
    values: BTreeMap<String, String>,
}

impl ArgValues {
    /// Compute every variable for the given file, project and editor.
    ///
    /// Prompt slots start out unset.
    pub fn resolve(
        file: Option<&Path>,
        project: &ProjectVars,
        editor: Option<&EditorContext>,
    ) -> Self {
        let mut values = BTreeMap::new();
        let mut set = |name: &str, value: String| {
            values.insert(name.to_string(), value);
        };

        let file = file.map(|f| project.absolute(f));
        let file_path = file.as_deref().unwrap_or(Path::new(""));
        let dir = file_path.parent().unwrap_or(Path::new(""));

        set("FilePath", file_path.display().to_string());
        set(
            "FileDir",
            dir.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        set(
            "FileDirProjRel",
            match dir.strip_prefix(&project.root) {
                Ok(rel) => rel.display().to_string(),
                // outside the project: the directory without its root
                Err(_) => dir
                    .components()
                    .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
                    .collect::<PathBuf>()
                    .display()
                    .to_string(),
            },
        );
        set(
            "Filename",
            file_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        set(
            "FilenameNoExt",
            file_path
                .file_stem()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        set(
            "FileExt",
            file_path
                .extension()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );

        let (line, col, selection) = match editor {
            Some(editor) => (editor.line + 1, editor.col + 1, editor.selection.clone()),
            None => (0, 0, String::new()),
        };
        set("CursorLine", line.to_string());
        set("CursorCol", col.to_string());
        set("SelectionText", selection);

        set("ProjectRoot", project.root.display().to_string());
        set(
            "BuildDir",
            project.absolute(&project.build_dir).display().to_string(),
        );
        set(
            "BuildTarg",
            project.absolute(&project.build_target).display().to_string(),
        );
        set(
            "RunExec",
            project.absolute(&project.run_exec).display().to_string(),
        );

        tracing::trace!(file = %file_path.display(), "resolved argument values");
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Substitute this value set into `template`
    pub fn bind(&self, template: &str) -> String {
        bind_with(template, |name| self.get(name))
    }

    /// Record the user's answer for a 1-based prompt slot
    pub fn set_prompt(&mut self, slot: usize, value: impl Into<String>) -> Result<(), BindError> {
        if !(1..=PROMPT_SLOTS).contains(&slot) {
            return Err(BindError::InvalidPromptSlot(slot));
        }
        self.set(vars::prompt_var_name(slot), value);
        Ok(())
    }

    /// Forget all prompt answers, so the next dispatch asks again
    pub fn clear_prompts(&mut self) {
        self.values.retain(|name, _| prompt_slot(name).is_none());
    }

    /// Prompt slots referenced by `template` that have no answer yet
    pub fn missing_prompts(&self, template: &str) -> Vec<usize> {
        let mut slots: Vec<usize> = template_vars(template)
            .iter()
            .filter_map(|name| prompt_slot(name))
            .filter(|slot| !self.values.contains_key(&vars::prompt_var_name(*slot)))
            .collect();
        slots.sort_unstable();
        slots.dedup();
        slots
    }

    /// Fail with [`BindError::MissingPrompts`] if any template still needs input
    pub fn check_prompts<'t>(
        &self,
        templates: impl IntoIterator<Item = &'t str>,
    ) -> Result<(), BindError> {
        let mut slots: Vec<usize> = templates
            .into_iter()
            .flat_map(|t| self.missing_prompts(t))
            .collect();
        slots.sort_unstable();
        slots.dedup();
        if slots.is_empty() {
            Ok(())
        } else {
            Err(BindError::MissingPrompts { slots })
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
