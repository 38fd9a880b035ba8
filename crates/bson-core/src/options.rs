//! Codec configuration.

/// Nesting limit applied when no explicit [`CodecOptions`] are given.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Knobs shared by the native backend and the generic trial decoder.
///
/// ```
/// use bson_core::CodecOptions;
///
/// let opts = CodecOptions::new().max_depth(16);
/// assert_eq!(opts.max_depth, 16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    /// Maximum document/array nesting before failing with `DepthExceeded`.
    pub max_depth: usize,
}

impl CodecOptions {
    /// Options with the default nesting limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum nesting depth.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl Default for CodecOptions {
    fn default() -> Self {
        CodecOptions {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Remaining nesting allowance while walking a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DepthBudget {
    remaining: usize,
    limit: usize,
}

impl DepthBudget {
    pub(crate) fn new(limit: usize) -> Self {
        DepthBudget {
            remaining: limit,
            limit,
        }
    }

    /// Step into one more container.
    pub(crate) fn descend(self) -> crate::Result<Self> {
        match self.remaining.checked_sub(1) {
            Some(remaining) => Ok(DepthBudget {
                remaining,
                limit: self.limit,
            }),
            None => Err(crate::BsonError::DepthExceeded(self.limit)),
        }
    }

    /// Capture allowance for a generic value whose kind is not known yet.
    /// Shape wrappers nest deeper than the value they encode; errors still
    /// report the configured limit.
    pub(crate) fn widened(self) -> Self {
        DepthBudget {
            remaining: self.remaining.saturating_mul(3).saturating_add(2),
            limit: self.limit,
        }
    }
}

impl Default for DepthBudget {
    fn default() -> Self {
        DepthBudget::new(DEFAULT_MAX_DEPTH)
    }
}

impl From<CodecOptions> for DepthBudget {
    fn from(options: CodecOptions) -> Self {
        DepthBudget::new(options.max_depth)
    }
}
