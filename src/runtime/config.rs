/// Execution options for [`Vm`](crate::runtime::vm_bc::Vm).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Emit one `decaf::trace` event per executed instruction.
    pub trace: bool,
    /// Abort with `StepLimitExceeded` after this many instructions.
    pub max_steps: Option<u64>,
    /// Run the stack checker over every function before executing.
    pub verify: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            trace: false,
            max_steps: None,
            verify: false,
        }
    }
}
