use std::collections::BTreeMap;

/// Variables exported to every spawned command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn unset(&mut self, name: &str) -> Option<String> {
        self.vars.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Go module mode follows the project's `GoMod` flag
    pub fn set_go_mod(&mut self, on: bool) {
        self.set("GO111MODULE", if on { "on" } else { "off" });
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_module_flag() {
        let mut env = Environment::default();
        env.set_go_mod(true);
        assert_eq!(env.get("GO111MODULE"), Some("on"));
        env.set_go_mod(false);
        assert_eq!(env.get("GO111MODULE"), Some("off"));
        assert_eq!(env.unset("GO111MODULE").as_deref(), Some("off"));
        assert!(env.vars().is_empty());
    }
}
