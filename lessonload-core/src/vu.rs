use std::sync::Arc;

use crate::context::RunContext;

/// Per-VU state handed to every iteration.
#[derive(Debug, Clone)]
pub struct VuContext {
    /// 1-based.
    pub vu_id: u64,
    /// Iterations this VU has started so far, 0-based for the current one.
    pub iteration: u64,
    pub run: Arc<RunContext>,
}

impl VuContext {
    pub fn new(vu_id: u64, run: Arc<RunContext>) -> Self {
        Self {
            vu_id,
            iteration: 0,
            run,
        }
    }
}
