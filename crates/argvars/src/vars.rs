/// Classification of an argument variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgVarKind {
    /// A path to a file
    File,
    /// A directory path or directory name
    Dir,
    /// A file extension
    Ext,
    /// A textual position in the current buffer
    Pos,
    /// Text taken from the current buffer
    Text,
    /// Text entered by the user at dispatch time
    Prompt,
    /// A value from the project settings
    Project,
}

impl ArgVarKind {
    /// Variables of these kinds can only be resolved with an active buffer
    pub fn needs_buffer(self) -> bool {
        matches!(
            self,
            ArgVarKind::File | ArgVarKind::Dir | ArgVarKind::Ext | ArgVarKind::Pos | ArgVarKind::Text
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgVar {
    pub name: &'static str,
    pub kind: ArgVarKind,
    pub description: &'static str,
}

/// Number of numbered `PromptString` slots
pub const PROMPT_SLOTS: usize = 3;

/// Every variable a template may reference
pub const ARG_VARS: &[ArgVar] = &[
    ArgVar {
        name: "FilePath",
        kind: ArgVarKind::File,
        description: "Current file name with full path",
    },
    ArgVar {
        name: "FileDir",
        kind: ArgVarKind::Dir,
        description: "Name only of current file's directory",
    },
    ArgVar {
        name: "FileDirProjRel",
        kind: ArgVarKind::Dir,
        description: "Path of current file's directory relative to the project root",
    },
    ArgVar {
        name: "Filename",
        kind: ArgVarKind::File,
        description: "Current file name only, without path",
    },
    ArgVar {
        name: "FilenameNoExt",
        kind: ArgVarKind::File,
        description: "Current file name only, without path or extension",
    },
    ArgVar {
        name: "FileExt",
        kind: ArgVarKind::Ext,
        description: "Extension of current file, without the dot",
    },
    ArgVar {
        name: "CursorLine",
        kind: ArgVarKind::Pos,
        description: "Line number of the cursor, starting at 1",
    },
    ArgVar {
        name: "CursorCol",
        kind: ArgVarKind::Pos,
        description: "Column of the cursor, starting at 1",
    },
    ArgVar {
        name: "SelectionText",
        kind: ArgVarKind::Text,
        description: "Text of the current selection",
    },
    ArgVar {
        name: "ProjectRoot",
        kind: ArgVarKind::Project,
        description: "Root directory of the project",
    },
    ArgVar {
        name: "BuildDir",
        kind: ArgVarKind::Project,
        description: "Build directory from the project settings",
    },
    ArgVar {
        name: "BuildTarg",
        kind: ArgVarKind::Project,
        description: "Build target from the project settings",
    },
    ArgVar {
        name: "RunExec",
        kind: ArgVarKind::Project,
        description: "Executable to run from the project settings",
    },
    ArgVar {
        name: "PromptString1",
        kind: ArgVarKind::Prompt,
        description: "First string entered by the user at dispatch",
    },
    ArgVar {
        name: "PromptString2",
        kind: ArgVarKind::Prompt,
        description: "Second string entered by the user at dispatch",
    },
    ArgVar {
        name: "PromptString3",
        kind: ArgVarKind::Prompt,
        description: "Third string entered by the user at dispatch",
    },
];

/// Find a variable in the catalogue by name
pub fn lookup(name: &str) -> Option<&'static ArgVar> {
    ARG_VARS.iter().find(|v| v.name == name)
}

/// Name of the prompt variable for a 1-based slot
pub fn prompt_var_name(slot: usize) -> String {
    format!("PromptString{slot}")
}

/// Slot number of a prompt variable name, if it is one
pub(crate) fn prompt_slot(name: &str) -> Option<usize> {
    let slot: usize = name.strip_prefix("PromptString")?.parse().ok()?;
    (1..=PROMPT_SLOTS).contains(&slot).then_some(slot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_names_are_unique() {
        for (i, var) in ARG_VARS.iter().enumerate() {
            assert!(
                ARG_VARS[i + 1..].iter().all(|other| other.name != var.name),
                "duplicate variable {}",
                var.name
            );
        }
    }

    #[test]
    fn prompt_slots() {
        assert_eq!(prompt_slot("PromptString1"), Some(1));
        assert_eq!(prompt_slot("PromptString3"), Some(3));
        assert_eq!(prompt_slot("PromptString4"), None);
        assert_eq!(prompt_slot("PromptString"), None);
        assert_eq!(prompt_slot("FilePath"), None);
        assert_eq!(prompt_var_name(2), "PromptString2");
    }

    #[test]
    fn buffer_kinds() {
        assert!(lookup("SelectionText").unwrap().kind.needs_buffer());
        assert!(lookup("FilePath").unwrap().kind.needs_buffer());
        assert!(!lookup("ProjectRoot").unwrap().kind.needs_buffer());
        assert!(!lookup("PromptString1").unwrap().kind.needs_buffer());
    }
}
