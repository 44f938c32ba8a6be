#[cfg(test)]
mod tests {
    use iocp_pool::pool::{Config, Pool};
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::{Duration, Instant},
    };

    fn measure<F, T>(name: &str, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let start = Instant::now();
        let result = f();
        println!("✓ {}: {:?}", name, start.elapsed());
        result
    }

    #[test]
    fn load_test_1_elastic_scenario() {
        println!("\n=== LOAD TEST 1: min=0 max=2, 5 задач по 50ms ===");
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let pool = Pool::new(0, 2, 10, move |_: u32| {
            c.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
        })
        .unwrap();

        for i in 0..5 {
            pool.post(i);
        }

        let mut last_current = pool.current_thread_count();
        let deadline = Instant::now() + Duration::from_secs(10);
        while counter.load(Ordering::SeqCst) < 5 && Instant::now() < deadline {
            let current = pool.current_thread_count();
            assert!(current <= 2, "current_threads {} exceeded max", current);
            assert!(current >= last_current, "current_threads shrank before dispose");
            last_current = current;
            std::thread::sleep(Duration::from_millis(5));
        }

        pool.dispose();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(pool.current_thread_count(), 0);
        assert!(pool.metrics().total_spawned <= 2);
    }

    #[test]
    fn load_test_2_many_small_items() {
        println!("\n=== LOAD TEST 2: 10k быстрых задач ===");
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let pool = Pool::new(1, 8, 0, move |x: usize| {
            c.fetch_add(x % 2 + 1, Ordering::Relaxed);
        })
        .unwrap();

        measure("10k posts + drain", || {
            for i in 0..10_000 {
                pool.post(i);
            }
            pool.dispose();
        });

        let metrics = pool.metrics();
        println!("  spawned: {}, completed: {}", metrics.total_spawned, metrics.completed);
        assert_eq!(counter.load(Ordering::Relaxed), 15_000);
        assert_eq!(metrics.completed, 10_000);
        assert_eq!(metrics.failed, 0);
        assert!(metrics.total_spawned <= 8);
        assert_eq!(metrics.current_threads, 0);
    }

    #[test]
    fn load_test_3_concurrent_posters() {
        println!("\n=== LOAD TEST 3: 4 потока публикуют одновременно ===");
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let pool = Pool::new(0, 4, 4, move |_: u64| {
            c.fetch_add(1, Ordering::Relaxed);
            std::thread::sleep(Duration::from_micros(50));
        })
        .unwrap();

        std::thread::scope(|s| {
            for t in 0..4u64 {
                let pool = &pool;
                s.spawn(move || {
                    for i in 0..1_000u64 {
                        pool.post(t * 1_000 + i);
                        assert!(pool.current_thread_count() <= 4);
                    }
                });
            }
        });

        pool.dispose();
        assert_eq!(counter.load(Ordering::Relaxed), 4_000);
        assert!(pool.metrics().total_spawned <= 4);
        assert_eq!(pool.current_thread_count(), 0);
    }

    #[test]
    fn load_test_4_concurrency_gate() {
        println!("\n=== LOAD TEST 4: max_concurrency ограничивает handlers ===");
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (running.clone(), peak.clone());

        let config = Config::bounded(4, 8, 2);
        let pool = Pool::with_config(config, move |_: u32| {
            let now = r.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            r.fetch_sub(1, Ordering::SeqCst);
        })
        .unwrap();

        for i in 0..20 {
            pool.post(i);
        }
        pool.dispose();

        let peak = peak.load(Ordering::SeqCst);
        println!("  peak concurrency: {}", peak);
        assert!(peak <= 2, "peak {} above gate limit", peak);
        assert_eq!(pool.metrics().completed, 20);
    }

    #[test]
    fn load_test_5_panics_under_load() {
        println!("\n=== LOAD TEST 5: каждая десятая задача паникует ===");
        let ok = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let (o, f) = (ok.clone(), failed.clone());

        let pool = Pool::with_sink(
            Config::bounded(2, 4, 4),
            move |x: u32| {
                if x % 10 == 0 {
                    panic!("item {}", x);
                }
                o.fetch_add(1, Ordering::Relaxed);
            },
            move |_: &iocp_pool::HandlerError| {
                f.fetch_add(1, Ordering::Relaxed);
            },
        )
        .unwrap();

        for i in 0..200 {
            pool.post(i);
        }
        pool.dispose();

        assert_eq!(ok.load(Ordering::Relaxed), 180);
        assert_eq!(failed.load(Ordering::Relaxed), 20);
        let metrics = pool.metrics();
        assert_eq!(metrics.failed, 20);
        assert!((metrics.success_rate() - 0.9).abs() < 1e-9);
    }
}
