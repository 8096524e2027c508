//! Reply validators.
//!
//! A validator is a named predicate over reply text. The contract is async
//! so network-backed validators (remote moderation, external schema
//! services) fit the same seam as the pure built-ins here.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;

/// Result of one validator run. Never mutated after construction.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub validator_name: String,
    pub valid: bool,
    pub error_message: Option<String>,
}

impl ValidationOutcome {
    pub fn pass(validator_name: impl Into<String>) -> Self {
        Self {
            validator_name: validator_name.into(),
            valid: true,
            error_message: None,
        }
    }

    pub fn fail(validator_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            validator_name: validator_name.into(),
            valid: false,
            error_message: Some(message.into()),
        }
    }
}

/// Named predicate over reply content.
#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(&self, content: &str) -> ValidationOutcome;
}

/// Passes when the content parses as JSON; optionally requires top-level
/// properties. A leading fenced code block (``` or ```json) is stripped
/// first, since models love wrapping JSON in fences.
pub struct JsonSchemaValidator {
    required: Option<Vec<String>>,
}

impl JsonSchemaValidator {
    pub fn new() -> Self {
        Self { required: None }
    }

    pub fn with_required(required: Vec<String>) -> Self {
        Self {
            required: Some(required),
        }
    }
}

impl Default for JsonSchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Validator for JsonSchemaValidator {
    fn name(&self) -> &str {
        "JsonSchema"
    }

    async fn validate(&self, content: &str) -> ValidationOutcome {
        let stripped = strip_code_fence(content);
        if stripped.trim().is_empty() {
            return ValidationOutcome::fail(self.name(), "content is empty");
        }
        let value: serde_json::Value = match serde_json::from_str(stripped.trim()) {
            Ok(value) => value,
            Err(e) => {
                return ValidationOutcome::fail(self.name(), format!("not valid JSON: {e}"));
            }
        };
        if let Some(required) = &self.required {
            let Some(object) = value.as_object() else {
                return ValidationOutcome::fail(
                    self.name(),
                    "required properties demand a top-level object",
                );
            };
            for property in required {
                if !object.contains_key(property) {
                    return ValidationOutcome::fail(
                        self.name(),
                        format!("missing required property: {property}"),
                    );
                }
            }
        }
        ValidationOutcome::pass(self.name())
    }
}

/// Strip one leading fenced code block (with optional language tag) and its
/// closing fence. Content without fences passes through untouched.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return content;
    };
    // Drop the rest of the fence line (e.g. "json").
    let body = match rest.split_once('\n') {
        Some((_lang, body)) => body,
        None => return content,
    };
    body.strip_suffix("```").map(str::trim_end).unwrap_or(body)
}

/// Passes when every `must_contain` token occurs and no `must_not_contain`
/// token does. Empty content always fails.
pub struct ContentFilterValidator {
    must_contain: Vec<String>,
    must_not_contain: Vec<String>,
    case_sensitive: bool,
}

impl ContentFilterValidator {
    pub fn new(
        must_contain: Vec<String>,
        must_not_contain: Vec<String>,
        case_sensitive: bool,
    ) -> Self {
        Self {
            must_contain,
            must_not_contain,
            case_sensitive,
        }
    }
}

#[async_trait]
impl Validator for ContentFilterValidator {
    fn name(&self) -> &str {
        "ContentFilter"
    }

    async fn validate(&self, content: &str) -> ValidationOutcome {
        if content.trim().is_empty() {
            return ValidationOutcome::fail(self.name(), "content is empty");
        }
        let haystack = if self.case_sensitive {
            content.to_string()
        } else {
            content.to_lowercase()
        };
        let normalize = |token: &String| {
            if self.case_sensitive {
                token.clone()
            } else {
                token.to_lowercase()
            }
        };
        for token in &self.must_contain {
            if !haystack.contains(&normalize(token)) {
                return ValidationOutcome::fail(
                    self.name(),
                    format!("missing required token: {token}"),
                );
            }
        }
        for token in &self.must_not_contain {
            if haystack.contains(&normalize(token)) {
                return ValidationOutcome::fail(
                    self.name(),
                    format!("contains forbidden token: {token}"),
                );
            }
        }
        ValidationOutcome::pass(self.name())
    }
}

/// Character-count bounds; missing bounds are unbounded.
pub struct LengthValidator {
    min: Option<usize>,
    max: Option<usize>,
}

impl LengthValidator {
    pub fn new(min: Option<usize>, max: Option<usize>) -> Self {
        Self { min, max }
    }
}

#[async_trait]
impl Validator for LengthValidator {
    fn name(&self) -> &str {
        "Length"
    }

    async fn validate(&self, content: &str) -> ValidationOutcome {
        let length = content.chars().count();
        if let Some(min) = self.min {
            if length < min {
                return ValidationOutcome::fail(
                    self.name(),
                    format!("content length {length} below minimum {min}"),
                );
            }
        }
        if let Some(max) = self.max {
            if length > max {
                return ValidationOutcome::fail(
                    self.name(),
                    format!("content length {length} above maximum {max}"),
                );
            }
        }
        ValidationOutcome::pass(self.name())
    }
}

/// Passes when the pattern matches anywhere in the content. The pattern is
/// compiled once at construction; the `regex` crate's linear-time engine
/// needs no evaluation timeout.
pub struct RegexValidator {
    pattern: Regex,
}

impl RegexValidator {
    pub fn new(pattern: &str, case_insensitive: bool) -> Result<Self, regex::Error> {
        let pattern = regex::RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()?;
        Ok(Self { pattern })
    }
}

#[async_trait]
impl Validator for RegexValidator {
    fn name(&self) -> &str {
        "Regex"
    }

    async fn validate(&self, content: &str) -> ValidationOutcome {
        if content.trim().is_empty() {
            return ValidationOutcome::fail(self.name(), "content is empty");
        }
        if self.pattern.is_match(content) {
            ValidationOutcome::pass(self.name())
        } else {
            ValidationOutcome::fail(
                self.name(),
                format!("pattern {:?} not found", self.pattern.as_str()),
            )
        }
    }
}

/// User-supplied predicate. A panicking predicate is caught and reported as
/// a failure, with the panic text appended to the configured message.
pub struct CustomValidator {
    name: String,
    predicate: Arc<dyn Fn(&str) -> bool + Send + Sync>,
    message: String,
}

impl CustomValidator {
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Validator for CustomValidator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, content: &str) -> ValidationOutcome {
        let predicate = Arc::clone(&self.predicate);
        match std::panic::catch_unwind(AssertUnwindSafe(|| predicate(content))) {
            Ok(true) => ValidationOutcome::pass(&self.name),
            Ok(false) => ValidationOutcome::fail(&self.name, self.message.clone()),
            Err(payload) => {
                let panic_text = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "predicate panicked".to_string());
                ValidationOutcome::fail(&self.name, format!("{}: {panic_text}", self.message))
            }
        }
    }
}

/// Runs children in order. `validate` short-circuits at the first failure
/// and names the failing child; `validate_all` reports every child.
pub struct CompositeValidator {
    validators: Vec<Arc<dyn Validator>>,
}

impl CompositeValidator {
    pub fn new(validators: Vec<Arc<dyn Validator>>) -> Self {
        Self { validators }
    }

    /// Every child's outcome, in order, without short-circuiting.
    pub async fn validate_all(&self, content: &str) -> Vec<ValidationOutcome> {
        let mut outcomes = Vec::with_capacity(self.validators.len());
        for validator in &self.validators {
            outcomes.push(validator.validate(content).await);
        }
        outcomes
    }
}

#[async_trait]
impl Validator for CompositeValidator {
    fn name(&self) -> &str {
        "Composite"
    }

    async fn validate(&self, content: &str) -> ValidationOutcome {
        for validator in &self.validators {
            let outcome = validator.validate(content).await;
            if !outcome.valid {
                return ValidationOutcome::fail(
                    self.name(),
                    format!(
                        "{} failed: {}",
                        outcome.validator_name,
                        outcome.error_message.as_deref().unwrap_or("invalid")
                    ),
                );
            }
        }
        ValidationOutcome::pass(self.name())
    }
}
