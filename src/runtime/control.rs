use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 暂停请求 (cooperative pause)
/// Cheap to clone; every clone controls the same executor. The executor only
/// looks at the flag between queue entries, so an in-flight hook always
/// finishes first.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Consumes a pending request.
    pub(crate) fn take(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn clear(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}
