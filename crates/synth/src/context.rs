//! Synthesis-time context parameters.
//!
//! Every builder receives the resolved context by reference; there is no
//! ambient or global lookup. Missing keys fall back to the documented
//! defaults, which is the only conditional logic this crate performs
//! locally.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Context key enabling the idle scale-down policy.
pub const KEY_AUTO_SCALE_DOWN: &str = "autoScaleDown";

/// Context key selecting a NAT instance over managed NAT gateways.
pub const KEY_CHEAP_VPC: &str = "cheapVpc";

/// Context key reserved for schedule-driven scaling (not yet wired).
pub const KEY_SCHEDULE_AUTO_SCALING: &str = "scheduleAutoScaling";

/// Context key reserved for schedule-driven scaling (not yet wired).
pub const KEY_TIMEZONE: &str = "timezone";

/// Context key reserved for schedule-driven scaling (not yet wired).
pub const KEY_SCHEDULE_SCALE_UP: &str = "scheduleScaleUp";

/// Context key reserved for schedule-driven scaling (not yet wired).
pub const KEY_SCHEDULE_SCALE_DOWN: &str = "scheduleScaleDown";

/// Default cron expression for the reserved scale-up schedule.
pub const DEFAULT_SCHEDULE_SCALE_UP: &str = "0 9 * * 1-5";

/// Default cron expression for the reserved scale-down schedule.
pub const DEFAULT_SCHEDULE_SCALE_DOWN: &str = "0 18 * * *";

/// Resolved context parameters for one synthesis run.
///
/// The schedule-related fields (`schedule_auto_scaling`, `timezone`,
/// `schedule_scale_up`, `schedule_scale_down`) are accepted and validated
/// but not bound to any resource yet. They are the input surface for a
/// future scheduled-scaling builder; see `stack::synthesize` for the
/// extension point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthContext {
    /// Emit the CPU-idle alarm and step-scaling action.
    pub auto_scale_down: bool,
    /// Replace managed NAT gateways with a single `t4g.nano` NAT instance.
    pub cheap_vpc: bool,
    /// Reserved: enable schedule-driven capacity changes.
    pub schedule_auto_scaling: bool,
    /// Reserved: timezone for the scaling schedules.
    pub timezone: String,
    /// Reserved: cron expression for scheduled scale-up.
    pub schedule_scale_up: String,
    /// Reserved: cron expression for scheduled scale-down.
    pub schedule_scale_down: String,
}

impl Default for SynthContext {
    fn default() -> Self {
        Self {
            auto_scale_down: true,
            cheap_vpc: false,
            schedule_auto_scaling: false,
            timezone: "UTC".to_string(),
            schedule_scale_up: DEFAULT_SCHEDULE_SCALE_UP.to_string(),
            schedule_scale_down: DEFAULT_SCHEDULE_SCALE_DOWN.to_string(),
        }
    }
}

impl SynthContext {
    /// Set one context parameter from its external key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownContextKey`] for keys no builder consumes and
    /// [`Error::InvalidContextValue`] when a boolean key receives a value
    /// other than `true`/`false`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            KEY_AUTO_SCALE_DOWN => self.auto_scale_down = parse_bool(key, value)?,
            KEY_CHEAP_VPC => self.cheap_vpc = parse_bool(key, value)?,
            KEY_SCHEDULE_AUTO_SCALING => self.schedule_auto_scaling = parse_bool(key, value)?,
            KEY_TIMEZONE => self.timezone = value.to_string(),
            KEY_SCHEDULE_SCALE_UP => self.schedule_scale_up = value.to_string(),
            KEY_SCHEDULE_SCALE_DOWN => self.schedule_scale_down = value.to_string(),
            other => return Err(Error::UnknownContextKey(other.to_string())),
        }
        debug!(key, value, "context parameter set");
        Ok(())
    }

    /// Build a context from `key=value` pairs, starting from the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error for pairs without a `=`, unknown keys, or
    /// unparsable values.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ctx = Self::default();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair.split_once('=').ok_or_else(|| Error::InvalidContextValue {
                key: pair.to_string(),
                value: String::new(),
            })?;
            ctx.set(key.trim(), value.trim())?;
        }
        Ok(ctx)
    }

    /// Merge a YAML mapping of context keys into this context.
    ///
    /// Boolean and string scalars are accepted; anything else is rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a mapping of known keys to
    /// scalar values.
    pub fn merge_yaml(&mut self, document: &str) -> Result<()> {
        let mapping: std::collections::BTreeMap<String, serde_yaml::Value> =
            serde_yaml::from_str(document)?;
        for (key, value) in &mapping {
            let rendered = match value {
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::String(s) => s.clone(),
                other => {
                    return Err(Error::InvalidContextValue {
                        key: key.clone(),
                        value: format!("{other:?}"),
                    })
                }
            };
            self.set(key, &rendered)?;
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::InvalidContextValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let ctx = SynthContext::default();
        assert!(ctx.auto_scale_down);
        assert!(!ctx.cheap_vpc);
        assert!(!ctx.schedule_auto_scaling);
        assert_eq!(ctx.timezone, "UTC");
        assert_eq!(ctx.schedule_scale_up, "0 9 * * 1-5");
        assert_eq!(ctx.schedule_scale_down, "0 18 * * *");
    }

    #[test]
    fn test_set_booleans() {
        let mut ctx = SynthContext::default();
        ctx.set(KEY_AUTO_SCALE_DOWN, "false").unwrap();
        ctx.set(KEY_CHEAP_VPC, "true").unwrap();
        assert!(!ctx.auto_scale_down);
        assert!(ctx.cheap_vpc);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut ctx = SynthContext::default();
        let err = ctx.set("natGateways", "2").unwrap_err();
        assert!(matches!(err, Error::UnknownContextKey(_)));
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let mut ctx = SynthContext::default();
        let err = ctx.set(KEY_CHEAP_VPC, "yes").unwrap_err();
        assert!(matches!(err, Error::InvalidContextValue { .. }));
    }

    #[test]
    fn test_from_pairs() {
        let ctx =
            SynthContext::from_pairs(["autoScaleDown=false", "timezone=Europe/Berlin"]).unwrap();
        assert!(!ctx.auto_scale_down);
        assert_eq!(ctx.timezone, "Europe/Berlin");
        // Untouched keys keep their defaults.
        assert!(!ctx.cheap_vpc);
    }

    #[test]
    fn test_merge_yaml() {
        let mut ctx = SynthContext::default();
        ctx.merge_yaml("cheapVpc: true\nscheduleScaleUp: \"0 8 * * 1-5\"\n")
            .unwrap();
        assert!(ctx.cheap_vpc);
        assert_eq!(ctx.schedule_scale_up, "0 8 * * 1-5");
    }

    #[test]
    fn test_merge_yaml_rejects_non_scalar() {
        let mut ctx = SynthContext::default();
        assert!(ctx.merge_yaml("timezone: [UTC]\n").is_err());
    }
}
