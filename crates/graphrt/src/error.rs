//! Error types shared by every layer of the engine.
//!
//! Errors fall into five families. IR validation and kernel resolution failures abort session
//! construction; shape/type, device, and allocation failures abort only the run that raised them.

use thiserror::Error;

/// Convenience alias for results returned by engine routines.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Failure family an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed graph: cycles, dangling references, arity mismatches.
    InvalidGraph,
    /// No registered kernel can serve a node, or the registry rejected an entry.
    KernelResolution,
    /// Bound or produced values disagree with declared types/shapes.
    ShapeType,
    /// Copy or synchronization failure reported by a provider.
    Device,
    /// An allocator could not satisfy a request.
    AllocationExhausted,
    /// The API was driven in an unsupported order or with unknown names.
    Usage,
}

impl ErrorCategory {
    /// Returns `true` when the error prevents a session from being built at all.
    pub fn aborts_session_build(self) -> bool {
        matches!(
            self,
            ErrorCategory::InvalidGraph | ErrorCategory::KernelResolution
        )
    }
}

/// Engine error surfaced to callers.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    #[error("no kernel for node '{node}' (op {op_type}, provider {provider}): {detail}")]
    KernelNotFound {
        node: String,
        op_type: String,
        provider: String,
        detail: String,
    },

    #[error("kernel already registered: {0}")]
    DuplicateKernel(String),

    #[error("ambiguous kernel registration: {0}")]
    AmbiguousKernel(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("missing input '{0}'")]
    MissingInput(String),

    #[error("unknown output '{0}'")]
    UnknownOutput(String),

    #[error("device error on provider {provider}: {message}")]
    Device { provider: String, message: String },

    #[error("provider {provider} has {queue_count} execution queue(s); queue {queue_id} is out of range")]
    InvalidQueue {
        provider: String,
        queue_id: usize,
        queue_count: usize,
    },

    #[error("allocator {allocator} exhausted: requested {requested} bytes, {available} available")]
    AllocationExhausted {
        allocator: String,
        requested: usize,
        available: usize,
    },

    #[error("node '{node}' ({op_type}) failed: {source}")]
    Kernel {
        node: String,
        op_type: String,
        #[source]
        source: Box<RuntimeError>,
    },

    #[error("cannot create kernel for node '{node}' ({op_type}): {source}")]
    KernelCreation {
        node: String,
        op_type: String,
        #[source]
        source: Box<RuntimeError>,
    },

    #[error("invalid attribute '{name}': {detail}")]
    InvalidAttribute { name: String, detail: String },

    #[error("{0}")]
    Usage(String),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl RuntimeError {
    pub fn invalid_graph(message: impl Into<String>) -> Self {
        RuntimeError::InvalidGraph(message.into())
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        RuntimeError::TypeMismatch(message.into())
    }

    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        RuntimeError::ShapeMismatch(message.into())
    }

    pub fn device(provider: impl Into<String>, message: impl Into<String>) -> Self {
        RuntimeError::Device {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        RuntimeError::Usage(message.into())
    }

    /// Attaches node identity to an error raised while that node executed.
    pub fn in_node(self, node: &str, op_type: &str) -> Self {
        if let RuntimeError::Kernel { .. } = self {
            return self;
        }
        RuntimeError::Kernel {
            node: node.to_string(),
            op_type: op_type.to_string(),
            source: Box::new(self),
        }
    }

    /// Marks an error raised by a kernel factory while a session was being built.
    pub fn in_kernel_creation(self, node: &str, op_type: &str) -> Self {
        RuntimeError::KernelCreation {
            node: node.to_string(),
            op_type: op_type.to_string(),
            source: Box::new(self),
        }
    }

    /// Classifies the error into its failure family.
    pub fn category(&self) -> ErrorCategory {
        match self {
            RuntimeError::InvalidGraph(_) => ErrorCategory::InvalidGraph,
            RuntimeError::KernelNotFound { .. }
            | RuntimeError::KernelCreation { .. }
            | RuntimeError::DuplicateKernel(_)
            | RuntimeError::AmbiguousKernel(_) => ErrorCategory::KernelResolution,
            RuntimeError::TypeMismatch(_)
            | RuntimeError::ShapeMismatch(_)
            | RuntimeError::MissingInput(_)
            | RuntimeError::InvalidAttribute { .. } => ErrorCategory::ShapeType,
            RuntimeError::Device { .. } | RuntimeError::InvalidQueue { .. } => {
                ErrorCategory::Device
            }
            RuntimeError::AllocationExhausted { .. } => ErrorCategory::AllocationExhausted,
            RuntimeError::Kernel { source, .. } => source.category(),
            RuntimeError::UnknownOutput(_) | RuntimeError::Usage(_) | RuntimeError::Config(_) => {
                ErrorCategory::Usage
            }
        }
    }
}
