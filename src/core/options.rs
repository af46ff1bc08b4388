//! Compile options shared by every stage.

/// Register pool used by the allocator unless overridden.
pub const DEFAULT_REGISTER_POOL: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Number of allocatable registers (at most 64).
    pub register_pool: usize,
    /// Report access violations during the enforcing analysis pass.
    pub enforce_access: bool,
    /// Fold pure binary expressions over literals during analysis.
    pub fold_constants: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            register_pool: DEFAULT_REGISTER_POOL,
            enforce_access: true,
            fold_constants: true,
        }
    }
}
