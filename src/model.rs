/// Снимок счетчиков пула. Поля читаются по одному, поэтому под нагрузкой
/// снимок согласован лишь в конечном счете.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    pub current_threads: usize,
    pub active_threads: usize,
    pub pending_work: usize,
    pub total_posted: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_spawned: usize,
}

impl PoolMetrics {
    pub fn idle_threads(&self) -> usize {
        self.current_threads.saturating_sub(self.active_threads)
    }

    pub fn utilization(&self) -> f64 {
        if self.current_threads == 0 {
            return 0.0;
        }
        self.active_threads.min(self.current_threads) as f64 / self.current_threads as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed + self.failed;
        if total == 0 {
            return 1.0;
        }
        self.completed as f64 / total as f64
    }
}

