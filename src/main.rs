use iocp_pool::{Config, Pool};
use std::{
    thread,
    time::Instant,
};
use tracing_subscriber::EnvFilter;


#[derive(Debug)]
struct Job {
    value: u32,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    let now = Instant::now();
    let config = Config::bounded(5, 10, 0);

    let pool = match Pool::with_config(config, |job: Job| {
        let name = thread::current().name().unwrap_or("unnamed").to_string();
        tracing::info!(value = job.value, thread = %name, "processing");
    }) {
        Ok(pool) => pool,
        Err(err) => {
            tracing::error!(%err, "failed to start pool");
            std::process::exit(1);
        }
    };

    for value in 0..100 {
        pool.post(Job { value });
    }

    let metrics = pool.metrics();
    tracing::info!(
        current = metrics.current_threads,
        pending = metrics.pending_work,
        "all work posted"
    );

    pool.dispose();
    println!("disposed, elapsed: {:?}", now.elapsed());
}
