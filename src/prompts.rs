//! Prompt template loading and caching (Design Notes §9: "Prompts are
//! read-once from disk; cache them at startup rather than reading per
//! call").

use std::collections::HashMap;
use std::path::Path;

use crate::error::{RagError, Result};

#[derive(Clone)]
pub struct PromptStore {
    templates: HashMap<String, String>,
}

impl PromptStore {
    /// Loads every `*.md` file under `dir` once at startup.
    pub fn load_dir(dir: &str) -> Result<Self> {
        let mut templates = HashMap::new();
        let path = Path::new(dir);
        if path.is_dir() {
            for entry in std::fs::read_dir(path)? {
                let entry = entry?;
                let file_path = entry.path();
                if file_path.extension().and_then(|e| e.to_str()) == Some("md") {
                    if let Some(name) = file_path.file_name().and_then(|n| n.to_str()) {
                        let contents = std::fs::read_to_string(&file_path)?;
                        templates.insert(name.to_string(), contents);
                    }
                }
            }
        }
        Ok(Self { templates })
    }

    pub fn get(&self, name: &str) -> Result<&str> {
        self.templates
            .get(name)
            .map(|s| s.as_str())
            .ok_or_else(|| RagError::Domain(format!("prompt template '{name}' not found")))
    }

    /// Renders `{question}`/`{retrieved_context}` style placeholders.
    pub fn render(&self, name: &str, vars: &[(&str, &str)]) -> Result<String> {
        let mut rendered = self.get(name)?.to_string();
        for (key, value) in vars {
            rendered = rendered.replace(&format!("{{{key}}}"), value);
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn renders_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("greeting.md");
        let mut file = std::fs::File::create(&file_path).unwrap();
        write!(file, "Hello {{name}}!").unwrap();

        let store = PromptStore::load_dir(dir.path().to_str().unwrap()).unwrap();
        let rendered = store.render("greeting.md", &[("name", "World")]).unwrap();
        assert_eq!(rendered, "Hello World!");
    }

    #[test]
    fn missing_template_errors() {
        let store = PromptStore { templates: HashMap::new() };
        assert!(store.get("missing.md").is_err());
    }
}
