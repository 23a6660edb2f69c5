//! Deployment artifact model.
//!
//! A [`Template`] is the single output of a synthesis run: an ordered map of
//! logical IDs to resource bodies plus the stack outputs, rendered as a
//! CloudFormation document in JSON or YAML. Builders register resources and
//! receive a [`LogicalId`] back; all cross-references travel through those
//! typed handles and the intrinsic helpers below, never through free-form
//! string lookups.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};

/// Handle to one registered resource.
///
/// Cheap to clone; builders hand these to their dependents so that every
/// reference in the emitted document points at a resource that exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalId(String);

impl LogicalId {
    /// Rebuild a handle from its raw string. Only the suppression post-pass
    /// needs this; builders always receive handles from registration.
    pub(crate) fn from_raw(id: &str) -> Self {
        Self(id.to_string())
    }

    /// The raw logical ID string as it appears in the document.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `{"Ref": ...}` for this resource.
    #[must_use]
    pub fn r#ref(&self) -> Value {
        json!({ "Ref": self.0 })
    }

    /// `{"Fn::GetAtt": [..., attr]}` for this resource.
    #[must_use]
    pub fn get_att(&self, attr: &str) -> Value {
        json!({ "Fn::GetAtt": [self.0, attr] })
    }
}

impl std::fmt::Display for LogicalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the control plane does with a resource when the stack is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionPolicy {
    /// Delete the resource with the stack (the default for this graph).
    Delete,
    /// Keep the resource after the stack is gone.
    Retain,
}

impl DeletionPolicy {
    fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "Delete",
            Self::Retain => "Retain",
        }
    }
}

/// One resource body in the template.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Provider resource type, e.g. `AWS::EC2::VPC`.
    pub kind: String,
    /// Resource properties as a JSON object.
    pub properties: Value,
    /// Explicit creation-order dependencies beyond implicit references.
    pub depends_on: Vec<LogicalId>,
    /// Deletion behavior override, if any.
    pub deletion_policy: Option<DeletionPolicy>,
    /// Out-of-band metadata (compliance annotations land here).
    pub metadata: Option<Value>,
}

impl Resource {
    /// A resource with just a type and properties.
    #[must_use]
    pub fn new(kind: impl Into<String>, properties: Value) -> Self {
        Self {
            kind: kind.into(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            metadata: None,
        }
    }
}

/// One entry in the template's output section.
#[derive(Debug, Clone)]
pub struct Output {
    /// Output value, usually an intrinsic.
    pub value: Value,
    /// Human-readable description.
    pub description: Option<String>,
}

/// The deployment artifact under construction.
#[derive(Debug, Default)]
pub struct Template {
    description: String,
    resources: BTreeMap<String, Resource>,
    outputs: BTreeMap<String, Output>,
}

impl Template {
    /// An empty template with the given stack description.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    /// Register a resource and return its handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateLogicalId`] if the ID is already taken.
    pub fn add_resource(&mut self, id: &str, resource: Resource) -> Result<LogicalId> {
        if self.resources.contains_key(id) {
            return Err(Error::DuplicateLogicalId(id.to_string()));
        }
        debug!(id, kind = %resource.kind, "resource registered");
        self.resources.insert(id.to_string(), resource);
        Ok(LogicalId(id.to_string()))
    }

    /// Shorthand for registering a resource from its type and properties.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateLogicalId`] if the ID is already taken.
    pub fn add(&mut self, id: &str, kind: &str, properties: Value) -> Result<LogicalId> {
        self.add_resource(id, Resource::new(kind, properties))
    }

    /// Set the deletion policy of an already-registered resource.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownLogicalId`] if the handle is stale.
    pub fn set_deletion_policy(&mut self, id: &LogicalId, policy: DeletionPolicy) -> Result<()> {
        let resource = self
            .resources
            .get_mut(id.as_str())
            .ok_or_else(|| Error::UnknownLogicalId(id.to_string()))?;
        resource.deletion_policy = Some(policy);
        Ok(())
    }

    /// Append explicit creation-order dependencies to a resource.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownLogicalId`] if the handle is stale.
    pub fn add_depends_on(&mut self, id: &LogicalId, deps: &[LogicalId]) -> Result<()> {
        let resource = self
            .resources
            .get_mut(id.as_str())
            .ok_or_else(|| Error::UnknownLogicalId(id.to_string()))?;
        resource.depends_on.extend_from_slice(deps);
        Ok(())
    }

    /// Merge a metadata entry into a resource, keyed under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownLogicalId`] if the handle is stale.
    pub fn attach_metadata(&mut self, id: &LogicalId, key: &str, value: Value) -> Result<()> {
        let resource = self
            .resources
            .get_mut(id.as_str())
            .ok_or_else(|| Error::UnknownLogicalId(id.to_string()))?;
        match &mut resource.metadata {
            Some(Value::Object(map)) => {
                map.insert(key.to_string(), value);
            }
            _ => {
                resource.metadata = Some(json!({ key: value }));
            }
        }
        Ok(())
    }

    /// Add a stack output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateLogicalId`] if the output name is taken.
    pub fn add_output(&mut self, name: &str, output: Output) -> Result<()> {
        if self.outputs.contains_key(name) {
            return Err(Error::DuplicateLogicalId(name.to_string()));
        }
        self.outputs.insert(name.to_string(), output);
        Ok(())
    }

    /// Look up a registered resource (used by the suppression post-pass and
    /// by tests).
    #[must_use]
    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Number of registered resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether no resources have been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Render the whole document as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut resources = serde_json::Map::new();
        for (id, resource) in &self.resources {
            let mut body = serde_json::Map::new();
            body.insert("Type".to_string(), json!(resource.kind));
            if let Some(metadata) = &resource.metadata {
                body.insert("Metadata".to_string(), metadata.clone());
            }
            body.insert("Properties".to_string(), resource.properties.clone());
            if !resource.depends_on.is_empty() {
                let deps: Vec<&str> = resource.depends_on.iter().map(LogicalId::as_str).collect();
                body.insert("DependsOn".to_string(), json!(deps));
            }
            if let Some(policy) = resource.deletion_policy {
                body.insert("DeletionPolicy".to_string(), json!(policy.as_str()));
            }
            resources.insert(id.clone(), Value::Object(body));
        }

        let mut document = serde_json::Map::new();
        document.insert(
            "AWSTemplateFormatVersion".to_string(),
            json!("2010-09-09"),
        );
        document.insert("Description".to_string(), json!(self.description));
        document.insert("Resources".to_string(), Value::Object(resources));
        if !self.outputs.is_empty() {
            let mut outputs = serde_json::Map::new();
            for (name, output) in &self.outputs {
                let mut body = serde_json::Map::new();
                if let Some(description) = &output.description {
                    body.insert("Description".to_string(), json!(description));
                }
                body.insert("Value".to_string(), output.value.clone());
                outputs.insert(name.clone(), Value::Object(body));
            }
            document.insert("Outputs".to_string(), Value::Object(outputs));
        }
        Value::Object(document)
    }

    /// Render the document as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_value())?)
    }

    /// Render the document as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_value())?)
    }
}

/// Intrinsic-function helpers shared by the builders.
pub mod intrinsics {
    use serde_json::{json, Value};

    /// `{"Fn::Sub": ...}` — substitute pseudo parameters into a string.
    #[must_use]
    pub fn sub(template: &str) -> Value {
        json!({ "Fn::Sub": template })
    }

    /// `{"Fn::Base64": ...}` — base64-encode a value at deploy time.
    #[must_use]
    pub fn base64(value: Value) -> Value {
        json!({ "Fn::Base64": value })
    }

    /// Select the `index`-th availability zone of the deployment region.
    #[must_use]
    pub fn select_az(index: usize) -> Value {
        json!({ "Fn::Select": [index, { "Fn::GetAZs": "" }] })
    }
}
