use super::errors::HandlerError;
use std::sync::Arc;


/// Получает ошибки handler, перехваченные воркером
pub trait ErrorSink: Send + Sync + 'static {
    fn report(&self, error: &HandlerError);
}

impl<F> ErrorSink for F
where
    F: Fn(&HandlerError) + Send + Sync + 'static,
{
    #[inline]
    fn report(&self, error: &HandlerError) {
        self(error)
    }
}

pub type SharedSink = Arc<dyn ErrorSink>;

/// Sink по умолчанию: пишет каждую ошибку на уровне `error`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, error: &HandlerError) {
        tracing::error!(%error, "work item handler failed");
    }
}
