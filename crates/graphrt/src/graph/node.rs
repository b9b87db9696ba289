use std::fmt;

use serde::{Deserialize, Serialize};

use super::attribute::{AttributeValue, Attributes, FromAttribute};
use crate::error::{Result, RuntimeError};

/// Stable identifier of a node inside one graph's node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Default opset version assigned to nodes that do not set one.
pub const DEFAULT_OPSET_VERSION: u32 = 1;

/// One operator application.
///
/// Inputs and outputs are argument names; an empty input name marks an omitted optional input.
/// Edges are implied by name equality between one node's output and another's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    id: NodeId,
    name: String,
    op_type: String,
    version: u32,
    inputs: Vec<String>,
    outputs: Vec<String>,
    attributes: Attributes,
    provider: Option<String>,
}

impl Node {
    pub fn new(name: impl Into<String>, op_type: impl Into<String>) -> Self {
        Self {
            id: NodeId(usize::MAX),
            name: name.into(),
            op_type: op_type.into(),
            version: DEFAULT_OPSET_VERSION,
            inputs: Vec::new(),
            outputs: Vec::new(),
            attributes: Attributes::new(),
            provider: None,
        }
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: NodeId) {
        self.id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Iterates the inputs that are actually supplied, with their positional index.
    pub fn present_inputs(&self) -> impl Iterator<Item = (usize, &str)> {
        self.inputs
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.is_empty())
            .map(|(index, name)| (index, name.as_str()))
    }

    pub(crate) fn inputs_mut(&mut self) -> &mut Vec<String> {
        &mut self.inputs
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Reads a typed attribute. A missing attribute is `Ok(None)`; a wrongly typed one is an error.
    pub fn typed_attribute<T: FromAttribute>(&self, name: &str) -> Result<Option<T>> {
        match self.attributes.get(name) {
            None => Ok(None),
            Some(value) => T::from_attribute(value).map(Some).ok_or_else(|| {
                RuntimeError::InvalidAttribute {
                    name: name.to_string(),
                    detail: format!(
                        "node '{}' carries a {} attribute, expected {}",
                        self.name,
                        value.kind(),
                        T::KIND
                    ),
                }
            }),
        }
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Provider type assigned by placement, if any.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub(crate) fn set_provider(&mut self, provider: impl Into<String>) {
        self.provider = Some(provider.into());
    }
}
