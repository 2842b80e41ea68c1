//! Domain errors raised while synthesizing and splicing rules.

/// Category of a splice failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceErrorKind {
    /// An expected anchor, profile or rule list is absent from the document
    StructuralNotFound,
    /// A rule matched more than one category, an anchor matched several
    /// rules, or a marker could not be interpreted
    ClassificationAmbiguous,
    /// The produced rule list breaks the ordering or exclusivity contract
    InvariantViolation,
    /// The layer spec is self-inconsistent
    InvalidSpec,
}

impl std::fmt::Display for SpliceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StructuralNotFound => write!(f, "Structural Not Found"),
            Self::ClassificationAmbiguous => write!(f, "Classification Ambiguous"),
            Self::InvariantViolation => write!(f, "Invariant Violation"),
            Self::InvalidSpec => write!(f, "Invalid Spec"),
        }
    }
}

/// Splice failure with context.
///
/// Every variant is fatal: the in-memory copy is discarded and the document
/// is left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceError {
    /// Type of failure
    pub kind: SpliceErrorKind,
    /// Layer being processed, if any
    pub layer: Option<String>,
    /// Human-readable message
    pub message: String,
    /// Optional hint for fixing the document or spec
    pub suggestion: Option<String>,
}

impl SpliceError {
    /// Creates a new splice error.
    pub fn new(kind: SpliceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            layer: None,
            message: message.into(),
            suggestion: None,
        }
    }

    /// Anchor or structure missing.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(SpliceErrorKind::StructuralNotFound, message)
    }

    /// Classification could not be decided.
    pub fn ambiguous(message: impl Into<String>) -> Self {
        Self::new(SpliceErrorKind::ClassificationAmbiguous, message)
    }

    /// Ordering or exclusivity broken.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::new(SpliceErrorKind::InvariantViolation, message)
    }

    /// Spec rejected.
    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Self::new(SpliceErrorKind::InvalidSpec, message)
    }

    /// Sets the layer context.
    #[must_use]
    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    /// Sets a suggestion for fixing the error.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for SpliceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(layer) = &self.layer {
            write!(f, "[Layer {}] {}: {}", layer, self.kind, self.message)?;
        } else {
            write!(f, "{}: {}", self.kind, self.message)?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n    → {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for SpliceError {}

/// Result alias for splice operations.
pub type SpliceResult<T> = std::result::Result<T, SpliceError>;
