use std::collections::BTreeMap;

use documents::Language;
use serde::{Deserialize, Serialize};

/// Options for files of one language
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LangOpts {
    /// Commands run after a file of this language is saved, as
    /// `Category: Name` labels
    pub post_save: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LangOptions {
    pub langs: BTreeMap<Language, LangOpts>,
}

impl LangOptions {
    pub fn post_save(&self, lang: Language) -> &[String] {
        self.langs
            .get(&lang)
            .map(|o| o.post_save.as_slice())
            .unwrap_or_default()
    }

    pub fn set_post_save(&mut self, lang: Language, labels: Vec<String>) {
        self.langs.entry(lang).or_default().post_save = labels;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_save_per_language() {
        let mut opts = LangOptions::default();
        opts.set_post_save(Language::Go, vec!["Go: Imports File".to_string()]);

        assert_eq!(opts.post_save(Language::Go), ["Go: Imports File"]);
        assert!(opts.post_save(Language::Rust).is_empty());

        let json = serde_json::to_string(&opts).unwrap();
        assert!(json.contains("\"Go\""));
        let loaded: LangOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, opts);
    }
}
