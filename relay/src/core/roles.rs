//! Role placeholders for step models (`$planner`, `$reviewer`, ...).

use serde::{Deserialize, Serialize};

use crate::core::types::ExecutorKind;

/// Label shown for steps that declare no executor.
pub const NO_EXECUTOR_LABEL: &str = "—";

/// Configured model identifier for each role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolesConfig {
    pub planner: String,
    pub reviewer: String,
    pub editor: String,
    pub auditor: String,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            planner: "anthropic/claude-opus-4-6".to_string(),
            reviewer: "deepseek/deepseek-r1".to_string(),
            editor: "z-ai/glm-5".to_string(),
            auditor: "openai/gpt-5.2-codex".to_string(),
        }
    }
}

/// Fixed set of model roles a step may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Planner,
    Reviewer,
    Editor,
    Auditor,
}

impl Role {
    /// Parse a `$role` placeholder (case-insensitive).
    pub fn from_placeholder(value: &str) -> Option<Self> {
        let name = value.trim().strip_prefix('$')?;
        match name.to_ascii_lowercase().as_str() {
            "planner" => Some(Self::Planner),
            "reviewer" => Some(Self::Reviewer),
            "editor" => Some(Self::Editor),
            "auditor" => Some(Self::Auditor),
            _ => None,
        }
    }

    pub fn model<'a>(&self, roles: &'a RolesConfig) -> &'a str {
        match self {
            Self::Planner => &roles.planner,
            Self::Reviewer => &roles.reviewer,
            Self::Editor => &roles.editor,
            Self::Auditor => &roles.auditor,
        }
    }
}

/// Substitute a role placeholder with its configured model; other values pass through.
pub fn resolve_model(model: &str, roles: &RolesConfig) -> String {
    match Role::from_placeholder(model) {
        Some(role) => role.model(roles).to_string(),
        None => model.to_string(),
    }
}

/// Human-readable label for a step: its resolved model, else its executor name.
pub fn display_label(
    executor: &str,
    kind: Option<ExecutorKind>,
    model: &str,
    roles: &RolesConfig,
) -> String {
    if kind.is_none() && executor.trim().is_empty() {
        return NO_EXECUTOR_LABEL.to_string();
    }
    if !model.trim().is_empty() {
        return resolve_model(model, roles);
    }
    match kind {
        Some(kind) => kind.as_str().to_string(),
        None => executor.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles() -> RolesConfig {
        RolesConfig {
            planner: "anthropic/claude-opus-4-6".to_string(),
            reviewer: "openai/gpt-4o".to_string(),
            editor: "anthropic/claude-sonnet-4-6".to_string(),
            auditor: "openai/gpt-5.2-codex".to_string(),
        }
    }

    #[test]
    fn placeholders_resolve_case_insensitively() {
        let roles = roles();
        assert_eq!(resolve_model("$planner", &roles), "anthropic/claude-opus-4-6");
        assert_eq!(resolve_model("$REVIEWER", &roles), "openai/gpt-4o");
        assert_eq!(resolve_model("$Editor", &roles), "anthropic/claude-sonnet-4-6");
        assert_eq!(resolve_model("$auditor", &roles), "openai/gpt-5.2-codex");
    }

    #[test]
    fn literals_and_unknown_placeholders_pass_through() {
        let roles = roles();
        assert_eq!(resolve_model("openai/gpt-4o", &roles), "openai/gpt-4o");
        assert_eq!(resolve_model("$designer", &roles), "$designer");
        assert_eq!(resolve_model("", &roles), "");
    }

    #[test]
    fn display_label_cases() {
        let roles = roles();
        let api = Some(ExecutorKind::Api);
        assert_eq!(display_label("api", api, "openai/gpt-4o", &roles), "openai/gpt-4o");
        assert_eq!(
            display_label("api", api, "$planner", &roles),
            "anthropic/claude-opus-4-6"
        );
        assert_eq!(display_label("api", api, "", &roles), "api");
        assert_eq!(
            display_label("shell", Some(ExecutorKind::Shell), "", &roles),
            "shell"
        );
        assert_eq!(display_label("", None, "", &roles), NO_EXECUTOR_LABEL);
    }
}
