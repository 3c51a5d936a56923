mod common;

use common::{backends, event_loop, log, watchdog};
use std::time::{Duration, Instant};

#[test]
fn test_timers_fire_in_deadline_order() {
    for backend in backends() {
        let start = Instant::now();
        let mut event_loop = event_loop(backend);
        let order = log();

        for (delay, name) in [(30, "30ms"), (10, "10ms-a"), (20, "20ms"), (10, "10ms-b")] {
            let order = order.clone();
            event_loop.set_timer(Duration::from_millis(delay), move |_| {
                order.borrow_mut().push(name);
            });
        }
        event_loop.set_timer(Duration::from_millis(50), |event_loop| event_loop.set_break());

        event_loop.dispatch().unwrap();

        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(*order.borrow(), vec!["10ms-a", "10ms-b", "20ms", "30ms"]);
        assert_eq!(event_loop.pending_timers(), 0);
    }
}

#[test]
fn test_cancel_timer() {
    let mut event_loop = event_loop(Default::default());
    let order = log();

    let cancelled = {
        let order = order.clone();
        event_loop.set_timer(Duration::from_millis(10), move |_| {
            order.borrow_mut().push("cancelled");
        })
    };
    let kept = {
        let order = order.clone();
        event_loop.set_timer(Duration::from_millis(20), move |event_loop| {
            order.borrow_mut().push("kept");
            event_loop.set_break();
        })
    };

    assert_eq!(event_loop.pending_timers(), 2);
    assert!(event_loop.cancel_timer(cancelled));
    assert!(!event_loop.cancel_timer(cancelled));
    assert_eq!(event_loop.pending_timers(), 1);

    event_loop.dispatch().unwrap();

    assert_eq!(*order.borrow(), vec!["kept"]);
    assert!(!event_loop.cancel_timer(kept), "a fired timer cannot be cancelled");
}

#[test]
fn test_timer_scheduled_from_timer() {
    let mut event_loop = event_loop(Default::default());
    let timed_out = watchdog(&mut event_loop, Duration::from_secs(2));
    let order = log();

    let outer = order.clone();
    event_loop.set_timer(Duration::ZERO, move |event_loop| {
        outer.borrow_mut().push("outer");

        let inner = outer.clone();
        event_loop.set_timer(Duration::from_millis(5), move |event_loop| {
            inner.borrow_mut().push("inner");
            event_loop.set_break();
        });
    });

    event_loop.dispatch().unwrap();

    assert!(!*timed_out.borrow());
    assert_eq!(*order.borrow(), vec!["outer", "inner"]);
}

#[test]
fn test_timer_can_cancel_a_later_timer() {
    let mut event_loop = event_loop(Default::default());
    let order = log();

    let later = {
        let order = order.clone();
        event_loop.set_timer(Duration::from_millis(15), move |_| {
            order.borrow_mut().push("later");
        })
    };

    let first = order.clone();
    event_loop.set_timer(Duration::from_millis(5), move |event_loop| {
        first.borrow_mut().push("first");
        assert!(event_loop.cancel_timer(later));
    });
    event_loop.set_timer(Duration::from_millis(40), |event_loop| event_loop.set_break());

    event_loop.dispatch().unwrap();

    assert_eq!(*order.borrow(), vec!["first"]);
}
