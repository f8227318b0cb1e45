#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use promise_flow::{all, any, delay, Dispatcher, Error, Promise, State};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::{Duration, Instant};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn test_exactly_once_under_racing_producers() {
        init_tracing();
        let dispatcher = Dispatcher::new().expect("dispatcher");
        let bg = dispatcher.background();
        for _ in 0..100 {
            let promise = Promise::<usize>::pending();
            let (tx, rx) = channel();
            for _ in 0..4 {
                let tx = tx.clone();
                promise.on_settled(&bg, move |outcome| {
                    tx.send(outcome.map_err(|e| e.to_string())).unwrap();
                });
            }
            drop(tx);

            let barrier = Arc::new(Barrier::new(8));
            let wins = Arc::new(AtomicUsize::new(0));
            let producers: Vec<_> = (0..8)
                .map(|i| {
                    let promise = promise.clone();
                    let barrier = barrier.clone();
                    let wins = wins.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        let won = if i % 2 == 0 {
                            promise.resolve(i)
                        } else {
                            promise.reject(Error::msg(format!("producer {i}")))
                        };
                        if won {
                            wins.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            for producer in producers {
                producer.join().expect("The producer thread has panicked");
            }
            assert_eq!(wins.load(Ordering::SeqCst), 1);

            let seen: Vec<_> = rx.iter().collect();
            assert_eq!(seen.len(), 4);
            assert!(seen.windows(2).all(|w| w[0] == w[1]));
            match promise.state() {
                State::Fulfilled(v) => assert_eq!(seen[0], Ok(v)),
                State::Rejected(e) => assert_eq!(seen[0], Err(e.to_string())),
                State::Pending => panic!("promise never settled"),
            }
        }
    }

    #[test]
    fn test_observer_completeness_under_race() {
        let dispatcher = Dispatcher::new().expect("dispatcher");
        let immediate = dispatcher.immediate();
        for i in 0..1000 {
            let promise = Promise::<usize>::pending();
            let barrier = Arc::new(Barrier::new(2));
            let (tx, rx) = channel();

            let settler = {
                let promise = promise.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    promise.resolve(i);
                })
            };
            let subscriber = {
                let promise = promise.clone();
                let immediate = immediate.clone();
                thread::spawn(move || {
                    barrier.wait();
                    promise.subscribe(&immediate, move |v| tx.send(v).unwrap(), |_| {});
                })
            };
            settler.join().expect("The settler thread has panicked");
            subscriber.join().expect("The subscriber thread has panicked");

            assert_eq!(rx.recv_timeout(Duration::from_secs(1)), Ok(i));
            assert!(rx.recv_timeout(Duration::from_millis(1)).is_err());
        }
    }

    #[test]
    fn test_then_composes() {
        let dispatcher = Dispatcher::new().expect("dispatcher");
        let bg = dispatcher.background();
        let f = |x: i64| x * 3;
        let g = |x: i64| x - 4;
        let p = Promise::fulfilled(7i64);
        let stepwise = p.then(&bg, move |x| Ok(f(x))).then(&bg, move |x| Ok(g(x)));
        let composed = p.then(&bg, move |x| Ok(g(f(x))));
        assert_eq!(stepwise.wait().unwrap(), composed.wait().unwrap());
    }

    #[test]
    fn test_rejection_short_circuits_chain() {
        let dispatcher = Dispatcher::new().expect("dispatcher");
        let bg = dispatcher.background();
        let calls = Arc::new(AtomicUsize::new(0));
        let handled = Arc::new(AtomicUsize::new(0));

        let (c1, c2, h) = (calls.clone(), calls.clone(), handled.clone());
        let result = Promise::<u32>::rejected(Error::msg("root cause"))
            .then(&bg, move |v| {
                c1.fetch_add(1, Ordering::SeqCst);
                Ok(v + 1)
            })
            .then(&bg, move |v| {
                c2.fetch_add(1, Ordering::SeqCst);
                Ok(v + 1)
            })
            .catch(&bg, move |err| {
                h.fetch_add(1, Ordering::SeqCst);
                assert_eq!(err.to_string(), "root cause");
                Ok(0)
            });

        assert_eq!(result.wait().unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(handled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_all_preserves_index_order() {
        let dispatcher = Dispatcher::new().expect("dispatcher");
        let bg = dispatcher.background();
        let after = |ms: u64, v: &'static str| {
            Promise::spawn(&bg, move || {
                thread::sleep(Duration::from_millis(ms));
                Ok(v)
            })
        };
        let p1 = after(40, "v1");
        let p2 = after(10, "v2");
        let p3 = after(70, "v3");
        assert_eq!(all(&bg, vec![p1, p2, p3]).wait().unwrap(), vec!["v1", "v2", "v3"]);
    }

    #[test]
    fn test_all_fails_fast() {
        let dispatcher = Dispatcher::new().expect("dispatcher");
        let never = Promise::<u8>::pending();
        let started = Instant::now();
        let p = all(
            &dispatcher.background(),
            vec![never.clone(), Promise::rejected(Error::msg("p2 failed"))],
        );
        assert_eq!(p.wait().unwrap_err().to_string(), "p2 failed");
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(never.is_pending());
    }

    #[test]
    fn test_any_first_wins() {
        let dispatcher = Dispatcher::new().expect("dispatcher");
        let bg = dispatcher.background();
        let slow = delay(&bg, Duration::from_millis(100)).then(&bg, |()| Ok("slow"));
        let p = any(&bg, vec![slow.clone(), Promise::fulfilled("fast")]);
        assert_eq!(p.wait().unwrap(), "fast");
        assert_eq!(slow.wait().unwrap(), "slow");
        assert!(matches!(p.state(), State::Fulfilled("fast")));
    }

    #[test]
    fn test_timeout_boundary() {
        init_tracing();
        let dispatcher = Dispatcher::new().expect("dispatcher");
        let bg = dispatcher.background();
        let after = |ms: u64| delay(&bg, Duration::from_millis(ms)).then(&bg, move |()| Ok(ms));

        let quick = after(50).timeout(&bg, Duration::from_millis(100));
        assert_eq!(quick.wait().unwrap(), 50);

        let started = Instant::now();
        let late_source = after(150);
        let late = late_source.timeout(&bg, Duration::from_millis(100));
        assert!(late.wait().unwrap_err().is_timeout());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(145), "timed out late: {elapsed:?}");

        assert_eq!(late_source.wait().unwrap(), 150);
        assert!(late.wait().unwrap_err().is_timeout());
    }

    #[test]
    fn test_wait_bridges_outcomes() {
        assert_eq!(Promise::fulfilled(5).wait().unwrap(), 5);
        let err = Promise::<i32>::rejected(Error::msg("err")).wait().unwrap_err();
        assert_eq!(err.to_string(), "err");
    }

    #[test]
    fn test_factories_schedule_exactly_once() {
        let dispatcher = Dispatcher::new().expect("dispatcher");
        let bg = dispatcher.background();
        let caller = thread::current().id();
        let (tx, rx) = channel();

        let ok_tx = tx.clone();
        Promise::fulfilled(1).subscribe(
            &bg,
            move |v| ok_tx.send(("fulfilled", v, thread::current().id())).unwrap(),
            |_| unreachable!("fulfilled factory rejected"),
        );
        Promise::<i32>::rejected(Error::msg("x")).subscribe(
            &bg,
            |_| unreachable!("rejected factory fulfilled"),
            move |_| tx.send(("rejected", 0, thread::current().id())).unwrap(),
        );

        let mut seen: Vec<_> = rx.iter().collect();
        seen.sort_by_key(|(kind, _, _)| *kind);
        assert_eq!(seen.len(), 2);
        assert_eq!((seen[0].0, seen[0].1), ("fulfilled", 1));
        assert_eq!(seen[1].0, "rejected");
        assert!(seen.iter().all(|(_, _, id)| *id != caller));
    }

    #[test]
    fn test_promise_is_a_future() {
        let dispatcher = Dispatcher::new().expect("dispatcher");
        let bg = dispatcher.background();
        let doubled = Promise::spawn(&bg, || {
            thread::sleep(Duration::from_millis(10));
            Ok(21)
        })
        .then(&bg, |v| Ok(v * 2));
        let value = block_on(async { doubled.await }).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_main_queue_chain_runs_serially() {
        let dispatcher = Dispatcher::new().expect("dispatcher");
        let main = dispatcher.main();
        let bg = dispatcher.background();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let o1 = order.clone();
        let o2 = order.clone();
        let done = Promise::spawn(&bg, || Ok("downloaded"))
            .forward(&main, move |v| {
                o1.lock().unwrap().push(format!("render {v}"));
                Ok(())
            })
            .always(&main, move || {
                o2.lock().unwrap().push("hide spinner".to_owned());
                Ok(())
            });
        assert_eq!(done.wait().unwrap(), "downloaded");
        assert_eq!(
            *order.lock().unwrap(),
            vec!["render downloaded".to_owned(), "hide spinner".to_owned()]
        );
    }
}
