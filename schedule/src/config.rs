//! Build configuration.
//!
//! Typed switches for the GEMM build pipeline with bon builders and
//! environment variable fallbacks.

use bon::bon;

/// Pipeline switches for one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildConfig {
    /// Log the statement tree after every pass.
    pub trace_ir: bool,
    /// Run the constraint-aware simplifier on the built kernel.
    pub simplify: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self { trace_ir: false, simplify: true }
    }
}

#[bon]
impl BuildConfig {
    /// Create a build configuration with builder pattern.
    #[builder]
    pub fn builder(#[builder(default = false)] trace_ir: bool, #[builder(default = true)] simplify: bool) -> Self {
        Self { trace_ir, simplify }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `TESSEL_TRACE_IR` - Log the IR tree after each pass
    /// * `TESSEL_NO_SIMPLIFY` - Skip the simplify pass
    pub fn from_env() -> Self {
        let trace_ir = std::env::var("TESSEL_TRACE_IR").is_ok();
        let simplify = std::env::var("TESSEL_NO_SIMPLIFY").is_err();
        Self { trace_ir, simplify }
    }

    /// Log `stmt` after `pass` when IR tracing is on.
    pub fn trace_pass(&self, pass: &str, stmt: &tessel_ir::Stmt) {
        if self.trace_ir {
            tracing::debug!(pass, tree = %stmt.tree(), "IR after pass");
        }
    }
}
