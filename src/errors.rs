use thiserror::Error;


#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid thread bounds: min_threads ({min}) > max_threads ({max})")]
    InvalidBounds { min: usize, max: usize },

    /// Очередь завершений не удалось создать или освободить
    #[error("completion queue resource error: {0}")]
    Resource(String),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("shutdown task failed: {0}")]
    Shutdown(String),
}

/// Ошибка одного вызова handler. Уходит в [`ErrorSink`](crate::sink::ErrorSink)
/// пула и никогда не доходит до воркера.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("handler panicked on {worker}: {message}")]
    Panicked { worker: String, message: String },
}

impl HandlerError {
    pub(crate) fn from_panic(worker: &str, payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };

        HandlerError::Panicked {
            worker: worker.to_string(),
            message,
        }
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
