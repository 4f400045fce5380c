use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Last reachability reported by the platform path monitor.
///
/// Starts unreachable; uploads are skipped until the platform reports a
/// usable path.
#[derive(Clone, Default)]
pub struct NetworkMonitor {
    reachable: Arc<AtomicBool>,
}

impl NetworkMonitor {
    pub fn new(reachable: bool) -> Self {
        NetworkMonitor {
            reachable: Arc::new(AtomicBool::new(reachable)),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        let previous = self.reachable.swap(reachable, Ordering::SeqCst);
        if previous != reachable {
            if reachable {
                log::info!("Internet connection is available.");
            } else {
                log::info!("Internet connection is not available.");
            }
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}
