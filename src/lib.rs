//! Эластичный пул воркеров поверх очереди завершений
//!
//! # Features
//! - OS-потоки, ожидающие на общей очереди завершений
//! - Рост до максимума: +1 воркер, когда заняты все живые воркеры
//! - Гейт конкурентности, ограничивающий число одновременных handlers
//! - Shutdown через sentinel-записи с полным drain перед закрытием очереди
//! - Паники в handler изолированы и уходят в error sink
//! - Снимки метрик и периодический мониторинг из задачи tokio

pub mod counters;
pub mod errors;
pub mod model;
pub mod pool;
pub mod queue;
pub mod sink;
mod worker;

pub use errors::{HandlerError, PoolError};
pub use pool::{Config, Pool};
pub use queue::{ChannelQueue, CompletionQueue, CompletionRecord, Packet, WaitStatus};
pub use sink::{ErrorSink, TracingSink};
