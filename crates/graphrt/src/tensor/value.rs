use std::sync::Arc;

use super::Tensor;

/// Tagged container held by execution-frame slots.
///
/// `Empty` marks a slot that has not been bound or produced yet (or has been released).
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Empty,
    Tensor(Arc<Tensor>),
}

impl Value {
    pub fn from_tensor(tensor: Tensor) -> Self {
        Value::Tensor(Arc::new(tensor))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn as_tensor(&self) -> Option<&Arc<Tensor>> {
        match self {
            Value::Tensor(tensor) => Some(tensor),
            Value::Empty => None,
        }
    }

    /// Replaces the value with `Empty`, returning what was held.
    pub fn take(&mut self) -> Value {
        std::mem::take(self)
    }
}

impl From<Tensor> for Value {
    fn from(tensor: Tensor) -> Self {
        Value::from_tensor(tensor)
    }
}

impl From<Arc<Tensor>> for Value {
    fn from(tensor: Arc<Tensor>) -> Self {
        Value::Tensor(tensor)
    }
}
