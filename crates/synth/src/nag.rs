//! Compliance annotations.
//!
//! Documented exceptions to the static security-policy checker, kept in a
//! map keyed by resource handle and written into resource metadata as a
//! post-pass. Builders never touch this; construction logic and policy
//! paperwork stay separate.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::template::{LogicalId, Template};

/// Metadata key the policy checker reads.
const METADATA_KEY: &str = "cdk_nag";

/// One justified exception to a checker rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suppression {
    /// Checker rule identifier, e.g. `AwsSolutions-EC23`.
    pub rule: String,
    /// Human-readable justification.
    pub reason: String,
}

/// Suppressions collected against resource handles.
#[derive(Debug, Default)]
pub struct Suppressions {
    entries: BTreeMap<String, Vec<Suppression>>,
}

impl Suppressions {
    /// An empty suppression set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a suppression for one resource.
    pub fn suppress(&mut self, target: &LogicalId, rule: &str, reason: &str) {
        self.entries
            .entry(target.as_str().to_string())
            .or_default()
            .push(Suppression {
                rule: rule.to_string(),
                reason: reason.to_string(),
            });
    }

    /// Record the same suppression for several resources.
    pub fn suppress_all(&mut self, targets: &[&LogicalId], rule: &str, reason: &str) {
        for target in targets {
            self.suppress(target, rule, reason);
        }
    }

    /// Write every recorded suppression into the template's metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if a suppression targets a logical ID that is not
    /// in the template.
    pub fn apply(&self, template: &mut Template) -> Result<()> {
        for (id, entries) in &self.entries {
            let rules: Vec<_> = entries
                .iter()
                .map(|s| json!({ "id": s.rule, "reason": s.reason }))
                .collect();
            let handle = LogicalId::from_raw(id);
            template.attach_metadata(
                &handle,
                METADATA_KEY,
                json!({ "rules_to_suppress": rules }),
            )?;
            debug!(id, count = entries.len(), "suppressions attached");
        }
        Ok(())
    }

    /// Number of resources carrying at least one suppression.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no suppressions were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
