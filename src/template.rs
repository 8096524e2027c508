//! Prompt templates and the named template library.
//!
//! Substitution is deliberately dumb: `{{identifier}}` where the identifier
//! is one or more word characters. Caller variables win over template
//! defaults; unknown placeholders are left verbatim so a missing variable is
//! visible in the output instead of silently vanishing.

use std::collections::HashMap;
use std::sync::LazyLock;

use dashmap::DashMap;
use regex::Regex;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("placeholder pattern is valid"));

/// A named prompt pair with default variable values.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub name: String,
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    pub defaults: HashMap<String, String>,
}

/// A rendered template, ready to orchestrate.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub system_prompt: Option<String>,
    pub user_prompt: String,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: None,
            user_prompt: user_prompt.into(),
            defaults: HashMap::new(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_default(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }

    /// Substitute `{{name}}` in both prompts. Caller variables override
    /// defaults; unresolved placeholders stay verbatim.
    pub fn render(&self, variables: &HashMap<String, String>) -> RenderedPrompt {
        let mut merged = self.defaults.clone();
        for (name, value) in variables {
            merged.insert(name.clone(), value.clone());
        }
        RenderedPrompt {
            system_prompt: self
                .system_prompt
                .as_deref()
                .map(|prompt| substitute(prompt, &merged)),
            user_prompt: substitute(&self.user_prompt, &merged),
        }
    }
}

fn substitute(text: &str, variables: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |captures: &regex::Captures<'_>| {
            match variables.get(&captures[1]) {
                Some(value) => value.clone(),
                None => captures[0].to_string(),
            }
        })
        .into_owned()
}

/// Named template registry. Reads are lock-free; registration replaces any
/// template of the same name.
pub struct PromptLibrary {
    templates: DashMap<String, PromptTemplate>,
}

impl PromptLibrary {
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
        }
    }

    /// Library seeded with a handful of generally useful templates.
    pub fn with_builtins() -> Self {
        let library = Self::new();
        library.register(
            PromptTemplate::new("summarize", "Summarize the following text in at most {{sentences}} sentences:\n\n{{text}}")
                .with_system_prompt("You are a precise summarizer. Keep only what matters.")
                .with_default("sentences", "3"),
        );
        library.register(
            PromptTemplate::new("extract-json", "Extract the {{fields}} from the following text and answer with a single JSON object only:\n\n{{text}}")
                .with_system_prompt("You answer with valid JSON and nothing else.")
                .with_default("fields", "key facts"),
        );
        library.register(
            PromptTemplate::new("translate", "Translate the following text into {{language}}:\n\n{{text}}")
                .with_default("language", "English"),
        );
        library
    }

    pub fn register(&self, template: PromptTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn get(&self, name: &str) -> Option<PromptTemplate> {
        self.templates.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Registered names, sorted for stable output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .templates
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::with_builtins()
    }
}
