//! Best-effort side effects.
//!
//! Some writes are accompanied by follow-ups (a notification row, a WhatsApp
//! message) whose failure must not change the outcome of the primary write.
//! [`best_effort`] runs such a follow-up, logs a failure, and reports what
//! happened as a [`SideEffect`] instead of an error.

use std::fmt::Display;
use std::future::Future;

use serde::Serialize;

/// What happened to a best-effort side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum SideEffect {
    Completed,
    Skipped(String),
    Failed(String),
}

impl SideEffect {
    pub fn skipped(reason: impl Into<String>) -> Self {
        SideEffect::Skipped(reason.into())
    }

    /// Short label for log fields.
    pub fn label(&self) -> &'static str {
        match self {
            SideEffect::Completed => "sent",
            SideEffect::Skipped(_) => "skipped",
            SideEffect::Failed(_) => "failed",
        }
    }
}

/// Run `effect`; a failure is logged under `label` and returned as data.
pub async fn best_effort<T, E, Fut>(label: &str, effect: Fut) -> SideEffect
where
    E: Display,
    Fut: Future<Output = Result<T, E>>,
{
    match effect.await {
        Ok(_) => SideEffect::Completed,
        Err(e) => {
            tracing::warn!(effect = label, "Best-effort side effect failed: {}", e);
            SideEffect::Failed(e.to_string())
        }
    }
}
