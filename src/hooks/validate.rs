//! Body validation from per-field rules.

use crate::action::Hook;
use crate::context::{value_eq, Context, Record};
use crate::error::{AppError, ConfigError};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: bool,
    /// "email" or "uuid"; other values are ignored.
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

struct CompiledRule {
    rule: ValidationRule,
    pattern: Option<Regex>,
}

/// Before-query hook that rejects bodies breaking any rule with `AppError::Validation`.
pub struct ValidateBody {
    rules: BTreeMap<String, CompiledRule>,
    partial: bool,
}

impl ValidateBody {
    /// Patterns are compiled here, so a bad regex fails at startup.
    pub fn new<I, S>(rules: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (S, ValidationRule)>,
        S: Into<String>,
    {
        let mut compiled = BTreeMap::new();
        for (field, rule) in rules {
            let field = field.into();
            let pattern = match &rule.pattern {
                Some(p) => Some(Regex::new(p).map_err(|e| ConfigError::InvalidPattern {
                    field: field.clone(),
                    reason: e.to_string(),
                })?),
                None => None,
            };
            compiled.insert(field, CompiledRule { rule, pattern });
        }
        Ok(ValidateBody {
            rules: compiled,
            partial: false,
        })
    }

    /// Check only fields present in the body; `required` is not enforced. Suits edit routes.
    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }

    pub fn check(&self, body: &Record) -> Result<(), AppError> {
        for (field, compiled) in &self.rules {
            let value = body.get(field).filter(|v| !v.is_null());
            match value {
                None if compiled.rule.required && !self.partial => {
                    return Err(AppError::Validation(format!("{} is required", field)));
                }
                None => {}
                Some(v) => check_field(field, v, compiled)?,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Hook for ValidateBody {
    async fn call(&self, ctx: &mut Context) -> Result<(), AppError> {
        self.check(&ctx.request.body)
    }
}

fn check_field(field: &str, v: &Value, compiled: &CompiledRule) -> Result<(), AppError> {
    let rule = &compiled.rule;
    if let Some(format) = &rule.format {
        check_format(field, v, format)?;
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max {
                return Err(AppError::Validation(format!("{} must be at most {} characters", field, max)));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min {
                return Err(AppError::Validation(format!("{} must be at least {} characters", field, min)));
            }
        }
        if let Some(re) = &compiled.pattern {
            if !re.is_match(s) {
                return Err(AppError::Validation(format!("{} does not match required pattern", field)));
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(AppError::Validation(format!(
                "{} must be one of: {:?}",
                field,
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                return Err(AppError::Validation(format!("{} must be at least {}", field, min)));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                return Err(AppError::Validation(format!("{} must be at most {}", field, max)));
            }
        }
    }
    Ok(())
}

fn check_format(field: &str, v: &Value, format: &str) -> Result<(), AppError> {
    let Some(s) = v.as_str() else {
        return Ok(());
    };
    match format.to_lowercase().as_str() {
        "email" if !s.contains('@') || s.len() < 3 => {
            Err(AppError::Validation(format!("{} must be a valid email", field)))
        }
        "uuid" if uuid::Uuid::parse_str(s).is_err() => {
            Err(AppError::Validation(format!("{} must be a valid UUID", field)))
        }
        _ => Ok(()),
    }
}
