#[cfg(test)]
mod tests {
    use iocp_pool::{
        errors::PoolError,
        queue::{
            ChannelQueue,
            CompletionQueue,
            CompletionRecord,
            ConcurrencyGate,
            Packet,
            WaitStatus,
        },
    };
    use crossbeam::channel::bounded;
    use std::time::Duration;

    const SHORT: Option<Duration> = Some(Duration::from_millis(10));

    #[test]
    fn test_work_record_is_delivered() {
        let queue = ChannelQueue::<u64>::create(4).unwrap();
        assert!(queue.post(CompletionRecord::work(7)));
        assert_eq!(queue.len(), 1);

        match queue.wait(SHORT) {
            WaitStatus::Ready(dequeued) => {
                assert!(dequeued.record.size > 0);
                assert!(matches!(dequeued.record.packet, Packet::Work(7)));
                assert!(dequeued.permit.is_some());
                assert_eq!(queue.gate().running(), 1);
            }
            other => panic!("expected a record, got {:?}", other),
        }
        assert_eq!(queue.gate().running(), 0);
    }

    #[test]
    fn test_zero_sized_work_is_not_spurious() {
        let record = CompletionRecord::work(());
        assert_eq!(record.size, 1);
        assert!(!record.is_spurious());
    }

    #[test]
    fn test_wake_record_is_spurious() {
        let queue = ChannelQueue::<u64>::create(1).unwrap();
        assert!(queue.post(CompletionRecord::wake()));
        assert!(matches!(queue.wait(SHORT), WaitStatus::Spurious));
        assert_eq!(queue.gate().running(), 0);
    }

    #[test]
    fn test_shutdown_record_has_no_payload() {
        let queue = ChannelQueue::<String>::create(1).unwrap();
        assert!(queue.post(CompletionRecord::shutdown()));
        match queue.wait(SHORT) {
            WaitStatus::Ready(dequeued) => {
                assert!(matches!(dequeued.record.packet, Packet::Shutdown));
            }
            other => panic!("expected shutdown record, got {:?}", other),
        }
    }

    #[test]
    fn test_wait_times_out_on_empty_queue() {
        let queue = ChannelQueue::<u64>::create(1).unwrap();
        assert!(matches!(queue.wait(SHORT), WaitStatus::TimedOut));
    }

    #[test]
    fn test_close_rejects_posts_and_discards_buffered() {
        let queue = ChannelQueue::<u64>::create(1).unwrap();
        for i in 0..3 {
            assert!(queue.post(CompletionRecord::work(i)));
        }

        queue.close().unwrap();
        assert!(queue.is_closed());
        assert!(queue.is_empty());
        assert!(!queue.post(CompletionRecord::work(9)));
        assert!(matches!(queue.wait(SHORT), WaitStatus::Closed));
        assert!(matches!(queue.wait(None), WaitStatus::Closed));

        assert!(matches!(queue.close(), Err(PoolError::Resource(_))));
    }

    #[test]
    fn test_gate_limits_running_permits() {
        let gate = ConcurrencyGate::new(2);
        assert_eq!(gate.limit(), 2);

        let first = gate.acquire();
        let _second = gate.acquire();
        assert_eq!(gate.running(), 2);

        let (done_tx, done_rx) = bounded::<()>(1);
        let contender = gate.clone();
        let handle = std::thread::spawn(move || {
            let _third = contender.acquire();
            let _ = done_tx.send(());
        });

        assert!(done_rx.recv_timeout(Duration::from_millis(50)).is_err());
        drop(first);
        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
        handle.join().unwrap();

        assert_eq!(gate.running(), 1);
    }

    #[test]
    fn test_gate_zero_means_cpu_count() {
        assert_eq!(ConcurrencyGate::new(0).limit(), num_cpus::get());
    }
}
