use super::{
    counters::Counters,
    errors::{PoolError, PoolResult},
    model::PoolMetrics,
    queue::{ChannelQueue, CompletionQueue, CompletionRecord},
    sink::{ErrorSink, SharedSink, TracingSink},
    worker::{self, Worker},
};
use std::{
    fmt,
    io,
    mem,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;


/// Конфигурация пула
#[derive(Debug, Clone)]
pub struct Config {
    /// Воркеры, запускаемые при создании
    pub min_threads: usize,
    /// Верхняя граница роста
    pub max_threads: usize,
    /// Сколько handlers может работать одновременно; 0 - по одному на CPU
    pub max_concurrency: usize,
    /// Таймаут одного ожидания простаивающего воркера. `None` - без таймаута
    pub wait_timeout: Option<Duration>,
    /// Максимальный интервал между проверками drain при dispose
    pub drain_poll_interval: Duration,
    pub thread_name_prefix: String,
    pub stack_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            min_threads: 1,
            max_threads: num_cpus * 2,
            max_concurrency: 0,
            wait_timeout: None,
            drain_poll_interval: Duration::from_millis(100),
            thread_name_prefix: "iocp-worker".to_string(),
            stack_size: None,
        }
    }
}

impl Config {
    pub fn bounded(min_threads: usize, max_threads: usize, max_concurrency: usize) -> Self {
        Self {
            min_threads,
            max_threads,
            max_concurrency,
            ..Default::default()
        }
    }

    pub fn cpu_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            min_threads: num_cpus,
            max_threads: num_cpus,
            max_concurrency: num_cpus,
            ..Default::default()
        }
    }

    pub fn io_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            min_threads: num_cpus,
            max_threads: num_cpus * 4,
            max_concurrency: num_cpus * 4,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.min_threads > self.max_threads {
            return Err(PoolError::InvalidBounds {
                min: self.min_threads,
                max: self.max_threads,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn effective_concurrency(&self) -> usize {
        if self.max_concurrency == 0 {
            num_cpus::get()
        } else {
            self.max_concurrency
        }
    }
}


static NEXT_POOL_ID: AtomicUsize = AtomicUsize::new(1);

pub(crate) type Handler<T> = Box<dyn Fn(T) + Send + Sync>;

/// Состояние, общее для контроллера и всех воркеров
pub(crate) struct Shared<T> {
    pub(crate) id: usize,
    pub(crate) config: Config,
    pub(crate) queue: Box<dyn CompletionQueue<T>>,
    pub(crate) handler: Handler<T>,
    pub(crate) sink: SharedSink,
    pub(crate) counters: Arc<Counters>,
    /// Защищает решение о росте, фиксацию disposed и отправку работы
    grow_lock: Mutex<()>,
    disposed: AtomicBool,
    closed: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> Shared<T> {
    #[inline]
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn lock_grow(&self) -> MutexGuard<'_, ()> {
        self.grow_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Добавляет воркер, если заняты все живые воркеры и пул еще может расти
    pub(crate) fn try_grow(self: &Arc<Self>) {
        let grow = self.lock_grow();
        self.grow_locked(&grow);
    }

    fn grow_locked(self: &Arc<Self>, grow: &MutexGuard<'_, ()>) {
        if self.is_disposed() {
            return;
        }

        let current = self.counters.current();
        if current >= self.config.max_threads || self.counters.active() != current {
            return;
        }

        if let Err(err) = self.spawn_worker(grow) {
            tracing::warn!(%err, current, "failed to grow worker pool");
        }
    }

    /// Только под локом роста; `current` растет лишь после создания потока
    fn spawn_worker(self: &Arc<Self>, _grow: &MutexGuard<'_, ()>) -> io::Result<()> {
        let name = format!(
            "{}-{}",
            self.config.thread_name_prefix,
            self.counters.next_worker_id()
        );

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(size) = self.config.stack_size {
            builder = builder.stack_size(size);
        }

        let worker = Worker::new(name.clone(), Arc::clone(self));
        let handle = builder.spawn(move || worker.run())?;

        self.counters.worker_started();
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);

        tracing::debug!(worker = %name, current = self.counters.current(), "spawned worker");
        Ok(())
    }

    /// Помечает пул disposed и отправляет по одной shutdown-записи на
    /// каждый живой воркер. Записи отправляет только первый вызов.
    fn begin_shutdown(&self) -> bool {
        let _grow = self.lock_grow();
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }

        let live = self.counters.current();
        tracing::info!(pool = self.id, live, "disposing pool");

        for _ in 0..live {
            if !self.queue.post(CompletionRecord::shutdown()) {
                tracing::warn!(pool = self.id, "completion queue rejected a shutdown record");
            }
        }
        true
    }

    /// Закрывает очередь и собирает потоки воркеров. Выполняется один раз.
    fn finish(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Err(err) = self.queue.close() {
            tracing::error!(pool = self.id, %err, "failed to close completion queue");
        }

        let discarded = self.counters.discard_pending();
        if discarded > 0 {
            tracing::debug!(pool = self.id, discarded, "work left unprocessed at dispose");
        }

        let handles = mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!(pool = self.id, "worker thread exited by panic");
            }
        }

        tracing::info!(pool = self.id, "pool disposed");
    }
}


/// Эластичный пул OS-потоков поверх очереди завершений.
///
/// Запускает `min_threads` воркеров, добавляет по одному, когда post или
/// завершенная задача застает всех живых воркеров занятыми, и никогда не
/// превышает `max_threads`. Drop пула выполняет dispose.
pub struct Pool<T: Send + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Pool<T> {
    pub fn new<F>(
        min_threads: usize,
        max_threads: usize,
        max_concurrency: usize,
        handler: F,
    ) -> PoolResult<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self::with_config(Config::bounded(min_threads, max_threads, max_concurrency), handler)
    }

    pub fn with_config<F>(config: Config, handler: F) -> PoolResult<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self::with_sink(config, handler, TracingSink)
    }

    pub fn with_sink<F, S>(config: Config, handler: F, sink: S) -> PoolResult<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
        S: ErrorSink,
    {
        Self::with_queue(config, ChannelQueue::<T>::create, handler, sink)
    }

    /// Пул поверх своей очереди завершений. `create` получает итоговый
    /// лимит конкурентности.
    pub fn with_queue<Q, C, F, S>(config: Config, create: C, handler: F, sink: S) -> PoolResult<Self>
    where
        Q: CompletionQueue<T> + 'static,
        C: FnOnce(usize) -> PoolResult<Q>,
        F: Fn(T) + Send + Sync + 'static,
        S: ErrorSink,
    {
        config.validate()?;
        if config.max_threads == 0 {
            tracing::warn!("pool created with max_threads = 0; posted work will never run");
        }

        let queue = create(config.effective_concurrency())?;
        let min_threads = config.min_threads;

        let shared = Arc::new(Shared {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            config,
            queue: Box::new(queue),
            handler: Box::new(handler),
            sink: Arc::new(sink),
            counters: Arc::new(Counters::new()),
            grow_lock: Mutex::new(()),
            disposed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            workers: Mutex::new(Vec::with_capacity(min_threads)),
        });

        let grow = shared.lock_grow();
        let started = (0..min_threads).try_for_each(|_| shared.spawn_worker(&grow));
        drop(grow);

        let pool = Pool { shared };
        if let Err(err) = started {
            pool.dispose();
            return Err(PoolError::Spawn(err));
        }

        tracing::debug!(
            pool = pool.shared.id,
            min_threads,
            max_threads = pool.shared.config.max_threads,
            "pool started"
        );
        Ok(pool)
    }

    /// Fire-and-forget. После dispose или при отказе очереди элемент
    /// молча отбрасывается.
    ///
    /// Отправка идет под локом роста: работа либо попадает в очередь раньше
    /// shutdown-записей, либо не попадает вовсе.
    pub fn post(&self, item: T) {
        let shared = &self.shared;
        if shared.is_disposed() {
            return;
        }

        let grow = shared.lock_grow();
        if shared.is_disposed() {
            return;
        }

        shared.counters.work_posted();
        if !shared.queue.post(CompletionRecord::work(item)) {
            shared.counters.post_rejected();
            tracing::trace!(pool = shared.id, "completion queue rejected work item");
            return;
        }

        shared.grow_locked(&grow);
    }

    /// Пустая запись, которая только перезапускает проверку роста
    pub fn wake(&self) {
        let shared = &self.shared;
        if shared.is_disposed() {
            return;
        }

        let grow = shared.lock_grow();
        if !shared.is_disposed() && shared.queue.post(CompletionRecord::wake()) {
            shared.grow_locked(&grow);
        }
    }

    /// Прекращает прием работы, завершает всех воркеров и закрывает очередь.
    /// Блокирует, пока не выйдут все воркеры.
    ///
    /// Из handler этого же пула shutdown-записи отправляются, но вызов
    /// возвращается без ожидания.
    pub fn dispose(&self) {
        self.dispose_until(None);
    }

    /// Как [`dispose`](Self::dispose), но ждет не дольше `timeout`.
    /// `true`, если пул полностью опустошен и закрыт.
    pub fn dispose_timeout(&self, timeout: Duration) -> bool {
        self.dispose_until(Some(Instant::now() + timeout))
    }

    fn dispose_until(&self, deadline: Option<Instant>) -> bool {
        let shared = &self.shared;
        shared.begin_shutdown();

        if worker::current_pool_id() == shared.id {
            tracing::warn!(pool = shared.id, "dispose called from own worker; not waiting for drain");
            return false;
        }

        if !shared.counters.wait_drained(deadline, shared.config.drain_poll_interval) {
            tracing::debug!(
                pool = shared.id,
                live = shared.counters.current(),
                "dispose deadline passed before drain"
            );
            return false;
        }

        shared.finish();
        true
    }

    /// Dispose в blocking-пуле tokio
    pub async fn shutdown(self) -> PoolResult<()> {
        tokio::task::spawn_blocking(move || self.dispose())
            .await
            .map_err(|e| PoolError::Shutdown(e.to_string()))
    }

    #[inline]
    pub fn current_thread_count(&self) -> usize {
        self.shared.counters.current()
    }

    #[inline]
    pub fn active_thread_count(&self) -> usize {
        self.shared.counters.active()
    }

    #[inline]
    pub fn pending_work_count(&self) -> usize {
        self.shared.counters.pending()
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        self.shared.counters.snapshot()
    }

    /// Мониторинг метрик с callback из задачи tokio, раз в `interval`.
    /// Вызывать внутри tokio runtime.
    /// ВАЖНО: отмените токен (или вызовите `stop_monitoring`), чтобы остановить
    pub fn start_monitoring<F>(&self, interval: Duration, callback: F) -> CancellationToken
    where
        F: Fn(PoolMetrics) + Send + 'static,
    {
        let counters = Arc::clone(&self.shared.counters);
        let token = CancellationToken::new();
        let token_clone = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        callback(counters.snapshot());
                    }
                    _ = token_clone.cancelled() => {
                        break;
                    }
                }
            }
        });

        token
    }

    pub fn stop_monitoring(&self, token: CancellationToken) {
        token.cancel();
    }
}

impl<T: Send + 'static> Drop for Pool<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: Send + 'static> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.shared.id)
            .field("config", &self.shared.config)
            .field("disposed", &self.shared.is_disposed())
            .field("metrics", &self.shared.counters.snapshot())
            .finish()
    }
}
