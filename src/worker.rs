use super::{
    counters::Counters,
    errors::HandlerError,
    pool::Shared,
    queue::{ConcurrencyPermit, Dequeued, Packet, WaitStatus},
};
use std::{
    cell::Cell,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};


thread_local! {
    /// Id пула, которому принадлежит текущий поток; 0 вне воркеров
    static OWNING_POOL: Cell<usize> = const { Cell::new(0) };
}

pub(crate) fn current_pool_id() -> usize {
    OWNING_POOL.with(Cell::get)
}

/// Снимает поток со счета `current` при любом выходе из `run`, включая unwind
struct ExitGuard<'a> {
    counters: &'a Counters,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        OWNING_POOL.with(|id| id.set(0));
        self.counters.worker_exited();
    }
}

enum State<T> {
    Idle,
    Dispatching(Dequeued<T>),
    Executing(T, Option<ConcurrencyPermit>),
    Terminating,
}

pub(crate) struct Worker<T> {
    name: String,
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Worker<T> {
    pub(crate) fn new(name: String, shared: Arc<Shared<T>>) -> Self {
        Self { name, shared }
    }

    pub(crate) fn run(self) {
        OWNING_POOL.with(|id| id.set(self.shared.id));
        let _exit = ExitGuard {
            counters: &self.shared.counters,
        };
        tracing::debug!(worker = %self.name, "worker started");

        let mut state = State::Idle;
        loop {
            state = match state {
                State::Idle => self.idle(),
                State::Dispatching(dequeued) => self.dispatch(dequeued),
                State::Executing(item, permit) => {
                    self.execute(item);
                    // Слот освобождается только перед следующим ожиданием
                    drop(permit);
                    State::Idle
                }
                State::Terminating => break,
            };
        }

        tracing::debug!(worker = %self.name, "worker terminated");
    }

    fn idle(&self) -> State<T> {
        match self.shared.queue.wait(self.shared.config.wait_timeout) {
            WaitStatus::Ready(dequeued) => State::Dispatching(dequeued),
            WaitStatus::Spurious | WaitStatus::TimedOut => State::Idle,
            WaitStatus::Closed => {
                tracing::warn!(worker = %self.name, "completion queue closed under a live worker");
                State::Terminating
            }
        }
    }

    fn dispatch(&self, dequeued: Dequeued<T>) -> State<T> {
        let Dequeued { record, permit } = dequeued;
        match record.packet {
            Packet::Shutdown => State::Terminating,
            Packet::Wake => State::Idle,
            Packet::Work(item) => {
                self.shared.counters.work_dequeued();
                State::Executing(item, permit)
            }
        }
    }

    /// Handler, отчет об ошибке и проверка роста. Воркер остается в `active`
    /// до конца проверки роста: рост срабатывает, если заняты все, включая его.
    fn execute(&self, item: T) {
        let counters = &self.shared.counters;
        counters.handler_started();

        let handler = &self.shared.handler;
        match panic::catch_unwind(AssertUnwindSafe(|| handler(item))) {
            Ok(()) => counters.handler_finished(true),
            Err(payload) => {
                counters.handler_finished(false);
                let error = HandlerError::from_panic(&self.name, payload);
                self.report(&error);
            }
        }

        self.shared.try_grow();
        counters.handler_released();
    }

    fn report(&self, error: &HandlerError) {
        let sink = &self.shared.sink;
        if panic::catch_unwind(AssertUnwindSafe(|| sink.report(error))).is_err() {
            tracing::error!(worker = %self.name, %error, "error sink panicked while reporting");
        }
    }
}
