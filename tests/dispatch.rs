mod common;

use common::{backends, event_loop, log, watchdog};
use std::cell::{Cell, RefCell};
use std::io::Write;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use vigil::{BackendKind, Error, FdTimeout, Flags, LoopBuilder};

#[test]
fn test_due_timer_runs_before_ready_descriptor() {
    for backend in backends() {
        let mut event_loop = event_loop(backend);
        let timed_out = watchdog(&mut event_loop, Duration::from_secs(2));
        let (mut writer, reader) = UnixStream::pair().unwrap();
        let fd = reader.as_raw_fd();
        let order = log();

        let record = order.clone();
        let flags = Flags::RECV | Flags::ONESHOT;
        event_loop
            .set_fd(fd, flags, FdTimeout::Unlimited, move |event_loop, _, _| {
                record.borrow_mut().push("recv");
                event_loop.set_break();
            })
            .unwrap();

        let record = order.clone();
        event_loop.set_timer(Duration::from_millis(5), move |_| {
            record.borrow_mut().push("timer");
        });

        // The first wait queues the descriptor; stalling the second
        // iteration makes the timer due in the same one.
        let iterations = Rc::new(Cell::new(0));
        event_loop.set_callback(move |_| {
            iterations.set(iterations.get() + 1);
            if iterations.get() == 2 {
                thread::sleep(Duration::from_millis(10));
            }
        });

        writer.write_all(b"x").unwrap();
        event_loop.dispatch().unwrap();

        assert!(!*timed_out.borrow(), "{backend:?}: watchdog fired");
        assert_eq!(*order.borrow(), vec!["timer", "recv"], "{backend:?}");
    }
}

#[test]
fn test_break_and_dispatch_again() {
    let mut event_loop = event_loop(Default::default());
    let order = log();

    let record = order.clone();
    event_loop.set_timer(Duration::ZERO, move |event_loop| {
        record.borrow_mut().push("first");
        event_loop.set_break();
    });
    let record = order.clone();
    event_loop.set_timer(Duration::from_millis(20), move |event_loop| {
        record.borrow_mut().push("second");
        event_loop.set_break();
    });

    event_loop.dispatch().unwrap();
    assert_eq!(*order.borrow(), vec!["first"]);
    assert_eq!(event_loop.pending_timers(), 1);

    event_loop.dispatch().unwrap();
    assert_eq!(*order.borrow(), vec!["first", "second"]);
    assert_eq!(event_loop.pending_timers(), 0);
}

#[test]
fn test_break_requeues_unfired_directions() {
    for backend in backends() {
        let mut event_loop = event_loop(backend);
        let (mut writer, reader) = UnixStream::pair().unwrap();
        let fd = reader.as_raw_fd();
        let fired = log();

        writer.write_all(b"x").unwrap();

        let record = fired.clone();
        let flags = Flags::RECV | Flags::SEND | Flags::ONESHOT;
        event_loop
            .set_fd(fd, flags, FdTimeout::Unlimited, move |event_loop, _, direction| {
                if direction == Flags::RECV {
                    record.borrow_mut().push("recv");
                    event_loop.set_break();
                } else {
                    record.borrow_mut().push("send");
                    event_loop.set_break();
                }
            })
            .unwrap();

        // Keeps the waits bounded.
        let _watchdog = watchdog(&mut event_loop, Duration::from_secs(2));

        event_loop.dispatch().unwrap();
        assert_eq!(*fired.borrow(), vec!["recv"], "{backend:?}");

        event_loop.dispatch().unwrap();
        assert_eq!(*fired.borrow(), vec!["recv", "send"], "{backend:?}");
        assert_eq!(event_loop.interest(fd), Some(Flags::empty()));
    }
}

#[test]
fn test_callback_runs_every_iteration() {
    let mut event_loop = event_loop(Default::default());
    let timed_out = watchdog(&mut event_loop, Duration::from_secs(2));
    let iterations = Rc::new(Cell::new(0));

    let counter = iterations.clone();
    event_loop.set_callback(move |event_loop| {
        counter.set(counter.get() + 1);
        if counter.get() == 3 {
            event_loop.set_break();
        }
    });

    event_loop.dispatch().unwrap();
    assert!(!*timed_out.borrow());
    assert_eq!(iterations.get(), 3);

    event_loop.clear_callback();
    event_loop.set_timer(Duration::from_millis(20), |event_loop| event_loop.set_break());
    event_loop.dispatch().unwrap();
    assert_eq!(iterations.get(), 3);
}

#[test]
fn test_dispatch_from_handler_is_rejected() {
    let mut event_loop = event_loop(Default::default());
    let outcome = Rc::new(RefCell::new(None));

    let slot = outcome.clone();
    event_loop.set_timer(Duration::ZERO, move |event_loop| {
        *slot.borrow_mut() = Some(event_loop.dispatch());
        event_loop.set_break();
    });

    event_loop.dispatch().unwrap();

    assert!(matches!(*outcome.borrow(), Some(Err(Error::Reentrant))));
}

#[test]
fn test_builder_selects_backend() {
    let event_loop = LoopBuilder::new()
        .backend(BackendKind::Select)
        .tick(Duration::from_millis(2))
        .event_capacity(8)
        .build()
        .unwrap();

    assert_eq!(event_loop.backend(), BackendKind::Select);
    assert!(!event_loop.is_primary());
    event_loop.destroy();

    let event_loop = LoopBuilder::default().build().unwrap();
    assert_eq!(event_loop.backend(), BackendKind::Auto.resolve());
}

#[test]
fn test_unavailable_backend_is_an_error() {
    let missing = [BackendKind::Epoll, BackendKind::Kqueue]
        .into_iter()
        .find(|kind| !kind.is_available())
        .unwrap();

    let result = LoopBuilder::new().backend(missing).build();

    assert!(matches!(
        result,
        Err(Error::Io(ref err)) if err.kind() == std::io::ErrorKind::Unsupported
    ));
}
