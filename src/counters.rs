use super::model::PoolMetrics;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Condvar,
        Mutex,
        PoisonError,
    },
    time::{Duration, Instant},
};


/// Общие счетчики пула.
///
/// `current` увеличивает тот, кто запускает воркер (под локом роста),
/// а уменьшает только сам воркер при выходе.
#[derive(Debug, Default)]
pub struct Counters {
    current: AtomicUsize,
    active: AtomicUsize,
    pending: AtomicUsize,
    total_posted: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    total_spawned: AtomicUsize,
    drained_lock: Mutex<()>,
    drained: Condvar,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    #[inline]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) fn worker_started(&self) {
        self.current.fetch_add(1, Ordering::AcqRel);
        self.total_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn next_worker_id(&self) -> usize {
        self.total_spawned.load(Ordering::Relaxed)
    }

    pub(crate) fn worker_exited(&self) {
        let prev = self.current.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            let _guard = self.drained_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.drained.notify_all();
        }
    }

    #[inline]
    pub(crate) fn work_posted(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.total_posted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn post_rejected(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
        self.total_posted.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn work_dequeued(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    /// Работа, оставшаяся в закрытой очереди, уже никогда не выполнится.
    /// Вызывать только когда воркеров нет и новые post невозможны.
    pub(crate) fn discard_pending(&self) -> usize {
        self.pending.swap(0, Ordering::AcqRel)
    }

    #[inline]
    pub(crate) fn handler_started(&self) {
        self.active.fetch_add(1, Ordering::AcqRel);
    }

    /// Только итог; воркер остается в `active` до `handler_released`.
    #[inline]
    pub(crate) fn handler_finished(&self, ok: bool) {
        if ok {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn handler_released(&self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }

    /// Ждет, пока не останется живых воркеров, или до `deadline`.
    ///
    /// Ждем на condvar, но перепроверяем каждые `poll`: сигнал, пришедший
    /// до первой проверки, теряется не дольше чем на один интервал.
    pub fn wait_drained(&self, deadline: Option<Instant>, poll: Duration) -> bool {
        let mut guard = self.drained_lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.current() == 0 {
                return true;
            }

            let step = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    poll.min(deadline - now)
                }
                None => poll,
            };

            guard = match self.drained.wait_timeout(guard, step) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    pub fn snapshot(&self) -> PoolMetrics {
        PoolMetrics {
            current_threads: self.current.load(Ordering::Relaxed),
            active_threads: self.active.load(Ordering::Relaxed),
            pending_work: self.pending.load(Ordering::Relaxed),
            total_posted: self.total_posted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            total_spawned: self.total_spawned.load(Ordering::Relaxed),
        }
    }
}
