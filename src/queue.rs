//! Очередь завершений и ее реализация внутри процесса.
//!
//! Пулу нужно от completion-механизма четыре операции: создать с лимитом
//! конкурентности, отправить запись, дождаться записи с таймаутом и закрыть.
//! [`CompletionQueue`] описывает этот контракт, [`ChannelQueue`] реализует
//! его на канале crossbeam и гейте конкурентности.

use super::errors::{PoolError, PoolResult};
use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::{
    sync::{PoisonError, RwLock},
    time::Duration,
};


/// Содержимое записи в очереди
#[derive(Debug)]
pub enum Packet<T> {
    Work(T),
    /// Завершает ровно один воркер
    Shutdown,
    /// Будит воркер без полезной нагрузки
    Wake,
}

/// Запись очереди. `size == 0` означает ложное пробуждение,
/// ожидающий пропускает такую запись.
#[derive(Debug)]
pub struct CompletionRecord<T> {
    pub size: usize,
    pub packet: Packet<T>,
}

impl<T> CompletionRecord<T> {
    /// Размер работы никогда не нулевой, даже для zero-sized `T`
    pub fn work(item: T) -> Self {
        Self {
            size: std::mem::size_of::<T>().max(1),
            packet: Packet::Work(item),
        }
    }

    pub fn shutdown() -> Self {
        Self {
            size: 1,
            packet: Packet::Shutdown,
        }
    }

    pub fn wake() -> Self {
        Self {
            size: 0,
            packet: Packet::Wake,
        }
    }

    #[inline]
    pub fn is_spurious(&self) -> bool {
        self.size == 0
    }
}

/// Запись, выданная ожидающему, вместе с занятым слотом конкурентности
#[derive(Debug)]
pub struct Dequeued<T> {
    pub record: CompletionRecord<T>,
    pub permit: Option<ConcurrencyPermit>,
}

#[derive(Debug)]
pub enum WaitStatus<T> {
    Ready(Dequeued<T>),
    /// Получена запись нулевого размера, ждать снова
    Spurious,
    TimedOut,
    Closed,
}

pub trait CompletionQueue<T>: Send + Sync {
    /// Не блокирует. `false`, если очередь закрыта
    fn post(&self, record: CompletionRecord<T>) -> bool;

    /// Блокирует не дольше `timeout` (`None` - без ограничения)
    fn wait(&self, timeout: Option<Duration>) -> WaitStatus<T>;

    fn close(&self) -> PoolResult<()>;
}


/// Ограничивает число одновременно выполняемых записей.
///
/// Семафор на bounded-канале: в канале лежат свободные слоты, `acquire`
/// забирает слот, `ConcurrencyPermit` возвращает его при drop.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    limit: usize,
    slots_tx: Sender<()>,
    slots_rx: Receiver<()>,
}

impl ConcurrencyGate {
    /// `limit == 0` означает один слот на CPU
    pub fn new(limit: usize) -> Self {
        let limit = if limit == 0 { num_cpus::get() } else { limit };
        let (slots_tx, slots_rx) = bounded(limit);
        for _ in 0..limit {
            let _ = slots_tx.try_send(());
        }

        Self {
            limit,
            slots_tx,
            slots_rx,
        }
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn running(&self) -> usize {
        self.limit - self.slots_rx.len()
    }

    pub fn acquire(&self) -> ConcurrencyPermit {
        // Гейт сам держит sender, поэтому канал не может отключиться
        let _ = self.slots_rx.recv();
        ConcurrencyPermit {
            slots: self.slots_tx.clone(),
        }
    }
}

/// Возвращает слот в гейт при drop
#[derive(Debug)]
pub struct ConcurrencyPermit {
    slots: Sender<()>,
}

impl Drop for ConcurrencyPermit {
    fn drop(&mut self) {
        let _ = self.slots.try_send(());
    }
}


/// Очередь завершений на unbounded-канале crossbeam.
///
/// Закрытие дропает sender; записи, оставшиеся в буфере, отбрасываются.
pub struct ChannelQueue<T> {
    sender: RwLock<Option<Sender<CompletionRecord<T>>>>,
    receiver: Receiver<CompletionRecord<T>>,
    gate: ConcurrencyGate,
}

impl<T> ChannelQueue<T> {
    pub fn create(max_concurrency: usize) -> PoolResult<Self> {
        let (sender, receiver) = unbounded();
        Ok(Self {
            sender: RwLock::new(Some(sender)),
            receiver,
            gate: ConcurrencyGate::new(max_concurrency),
        })
    }

    #[inline]
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().unwrap_or_else(PoisonError::into_inner).is_none()
    }
}

impl<T: Send> CompletionQueue<T> for ChannelQueue<T> {
    fn post(&self, record: CompletionRecord<T>) -> bool {
        let sender = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(tx) => tx.send(record).is_ok(),
            None => false,
        }
    }

    fn wait(&self, timeout: Option<Duration>) -> WaitStatus<T> {
        let received = match timeout {
            Some(timeout) => self.receiver.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => WaitStatus::TimedOut,
                RecvTimeoutError::Disconnected => WaitStatus::Closed,
            }),
            None => self.receiver.recv().map_err(|_| WaitStatus::Closed),
        };

        match received {
            Ok(record) if record.is_spurious() => WaitStatus::Spurious,
            Ok(record) => WaitStatus::Ready(Dequeued {
                record,
                permit: Some(self.gate.acquire()),
            }),
            Err(status) => status,
        }
    }

    fn close(&self) -> PoolResult<()> {
        let sender = self
            .sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return Err(PoolError::Resource("completion queue already closed".into()));
        }
        drop(sender);

        let discarded = self.receiver.try_iter().count();
        if discarded > 0 {
            tracing::debug!(discarded, "dropped records left in closed completion queue");
        }
        Ok(())
    }
}
