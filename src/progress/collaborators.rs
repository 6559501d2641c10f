//! Seams to the systems around the engine
//!
//! The engine never authenticates, never interprets quest requirements and
//! never stores badge metadata. Those concerns sit behind these traits.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::events::EngineEvent;

/// Decides whether caller-supplied evidence satisfies a quest's requirements
#[async_trait]
pub trait RequirementEvaluator: Send + Sync {
    async fn is_satisfied(&self, requirements: &Value, evidence: &Value) -> anyhow::Result<bool>;
}

/// Receives "unlock badge X for user Y" notifications
#[async_trait]
pub trait BadgeSink: Send + Sync {
    async fn unlock(&self, user_id: &str, badge_id: &str) -> anyhow::Result<()>;
}

/// Receives engine events for toasts, banners and feeds
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &EngineEvent);
}

/// Matches a requirements object key by key against the evidence
///
/// - number: evidence must hold a number at least that large
/// - bool / string: evidence must hold the same value
/// - nested object: matched recursively
/// - `null` or an empty object: always satisfied
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdEvaluator;

impl ThresholdEvaluator {
    fn matches(requirement: &Value, evidence: Option<&Value>) -> bool {
        match requirement {
            Value::Null => true,
            Value::Number(min) => match (min.as_f64(), evidence.and_then(Value::as_f64)) {
                (Some(min), Some(actual)) => actual >= min,
                _ => false,
            },
            Value::Object(fields) => fields
                .iter()
                .all(|(key, req)| Self::matches(req, evidence.and_then(|e| e.get(key)))),
            other => evidence == Some(other),
        }
    }
}

#[async_trait]
impl RequirementEvaluator for ThresholdEvaluator {
    async fn is_satisfied(&self, requirements: &Value, evidence: &Value) -> anyhow::Result<bool> {
        Ok(Self::matches(requirements, Some(evidence)))
    }
}

/// Logs badge unlocks; stands in when no achievement service is wired up
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingBadgeSink;

#[async_trait]
impl BadgeSink for LoggingBadgeSink {
    async fn unlock(&self, user_id: &str, badge_id: &str) -> anyhow::Result<()> {
        info!("[questlog:badge] Unlocked '{}' for {}", badge_id, user_id);
        Ok(())
    }
}

/// Logs every event through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: &EngineEvent) {
        info!(
            user = event.user_id(),
            event = event.name(),
            "[questlog:event] {:?}",
            event
        );
    }
}
