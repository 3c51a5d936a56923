mod common;

use common::{backends, event_loop, log, watchdog};
use std::cell::Cell;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::time::{Duration, Instant};

use vigil::{EventLoop, FdTimeout, Flags};

#[test]
fn test_timeout_fires_without_activity() {
    for backend in backends() {
        let start = Instant::now();
        let mut event_loop = event_loop(backend);
        let timed_out = watchdog(&mut event_loop, Duration::from_secs(2));
        let (_writer, reader) = UnixStream::pair().unwrap();
        let fd = reader.as_raw_fd();
        let fired = log();

        let record = fired.clone();
        event_loop
            .set_fd(fd, Flags::RECV, FdTimeout::millis(20), move |_, _, _| {
                record.borrow_mut().push("recv");
            })
            .unwrap();

        let record = fired.clone();
        event_loop.set_fd_timeout_handler(fd, move |event_loop, timed_fd| {
            assert_eq!(timed_fd, fd);
            record.borrow_mut().push("timeout");
            event_loop.set_break();
        });

        event_loop.dispatch().unwrap();

        assert!(!*timed_out.borrow(), "{backend:?}: watchdog fired");
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(*fired.borrow(), vec!["timeout"]);
        assert_eq!(event_loop.interest(fd), Some(Flags::RECV));
    }
}

#[test]
fn test_activity_disarms_timeout() {
    for backend in backends() {
        let mut event_loop = event_loop(backend);
        let (mut writer, mut reader) = UnixStream::pair().unwrap();
        let fd = reader.as_raw_fd();
        let fired = log();

        writer.write_all(b"x").unwrap();

        let record = fired.clone();
        event_loop
            .set_fd(fd, Flags::RECV, FdTimeout::millis(40), move |_, _, _| {
                let mut buffer = [0u8; 8];
                let _ = reader.read(&mut buffer).unwrap();
                record.borrow_mut().push("recv");
            })
            .unwrap();

        let record = fired.clone();
        event_loop.set_fd_timeout_handler(fd, move |_, _| record.borrow_mut().push("timeout"));
        event_loop.set_timer(Duration::from_millis(100), |event_loop| event_loop.set_break());

        event_loop.dispatch().unwrap();

        assert_eq!(*fired.borrow(), vec!["recv"], "{backend:?}");
    }
}

#[test]
fn test_unmodified_keeps_and_unlimited_removes() {
    let mut event_loop = event_loop(Default::default());
    let (_writer_a, kept) = UnixStream::pair().unwrap();
    let (_writer_b, removed) = UnixStream::pair().unwrap();
    let fired = Rc::new(Cell::new(0));

    for stream in [&kept, &removed] {
        let fd = stream.as_raw_fd();
        event_loop.set_fd(fd, Flags::RECV, FdTimeout::millis(20), |_, _, _| {}).unwrap();

        let fired = fired.clone();
        event_loop.set_fd_timeout_handler(fd, move |_, timed_fd| {
            assert_eq!(timed_fd, fd);
            fired.set(fired.get() + 1);
        });
    }

    event_loop
        .set_fd(kept.as_raw_fd(), Flags::NONBLOCK, FdTimeout::Unmodified, |_, _, _| {})
        .unwrap();
    event_loop
        .set_fd(removed.as_raw_fd(), Flags::empty(), FdTimeout::Unlimited, |_, _, _| {})
        .unwrap();
    event_loop.set_timer(Duration::from_millis(80), |event_loop| event_loop.set_break());

    event_loop.dispatch().unwrap();

    assert_eq!(fired.get(), 1);
}

#[test]
fn test_timeout_rearmed_from_its_handler() {
    let mut event_loop = event_loop(Default::default());
    let timed_out = watchdog(&mut event_loop, Duration::from_secs(2));
    let (_writer, reader) = UnixStream::pair().unwrap();
    let fd = reader.as_raw_fd();
    let count = Rc::new(Cell::new(0));

    event_loop.set_fd(fd, Flags::RECV, FdTimeout::millis(5), |_, _, _| {}).unwrap();

    let counter = count.clone();
    event_loop.set_fd_timeout_handler(fd, move |event_loop, fd| {
        counter.set(counter.get() + 1);
        if counter.get() == 3 {
            event_loop.set_break();
        } else {
            event_loop
                .set_fd(fd, Flags::empty(), FdTimeout::millis(5), |_, _, _| {})
                .unwrap();
        }
    });

    event_loop.dispatch().unwrap();

    assert!(!*timed_out.borrow());
    assert_eq!(count.get(), 3);
}

#[test]
fn test_clearing_descriptor_removes_timeout() {
    let mut event_loop = event_loop(Default::default());
    let (_writer, reader) = UnixStream::pair().unwrap();
    let fd = reader.as_raw_fd();
    let fired = Rc::new(Cell::new(false));

    event_loop.set_fd(fd, Flags::RECV, FdTimeout::millis(10), |_, _, _| {}).unwrap();
    let flag = fired.clone();
    event_loop.set_fd_timeout_handler(fd, move |_, _| flag.set(true));

    event_loop.clear_fd(fd);
    event_loop.set_timer(Duration::from_millis(40), |event_loop| event_loop.set_break());
    event_loop.dispatch().unwrap();

    assert!(!fired.get());
}

/// `a` is readable and its handler arms zero timeouts on both `a` and `b`,
/// so both expire in the same pass and `a`'s is pushed to the next one.
fn arm_both_from_recv(event_loop: &mut EventLoop, a: RawFd, b: RawFd) {
    event_loop
        .set_fd(a, Flags::RECV | Flags::ONESHOT, FdTimeout::Unlimited, move |event_loop, _, _| {
            for fd in [a, b] {
                event_loop
                    .set_fd(fd, Flags::empty(), FdTimeout::After(Duration::ZERO), |_, _, _| {})
                    .unwrap();
            }
        })
        .unwrap();
    event_loop.set_fd(b, Flags::RECV, FdTimeout::Unlimited, |_, _, _| {}).unwrap();
}

#[test]
fn test_deferred_timeout_skips_cleared_descriptor() {
    for backend in backends() {
        let mut event_loop = event_loop(backend);
        let (mut writer, reader_a) = UnixStream::pair().unwrap();
        let (_writer_b, reader_b) = UnixStream::pair().unwrap();
        let (a, b) = (reader_a.as_raw_fd(), reader_b.as_raw_fd());
        let fired = log();

        writer.write_all(b"x").unwrap();
        arm_both_from_recv(&mut event_loop, a, b);

        let record = fired.clone();
        event_loop.set_fd_timeout_handler(a, move |_, _| record.borrow_mut().push("a"));
        let record = fired.clone();
        event_loop.set_fd_timeout_handler(b, move |event_loop, _| {
            record.borrow_mut().push("b");
            event_loop.clear_fd(a);
        });
        event_loop.set_timer(Duration::from_millis(50), |event_loop| event_loop.set_break());

        event_loop.dispatch().unwrap();

        assert_eq!(*fired.borrow(), vec!["b"], "{backend:?}");
        assert_eq!(event_loop.interest(a), None);
    }
}

#[test]
fn test_deferred_timeout_yields_to_rearm() {
    for backend in backends() {
        let mut event_loop = event_loop(backend);
        let (mut writer, reader_a) = UnixStream::pair().unwrap();
        let (_writer_b, reader_b) = UnixStream::pair().unwrap();
        let (a, b) = (reader_a.as_raw_fd(), reader_b.as_raw_fd());
        let fired = log();

        writer.write_all(b"x").unwrap();
        arm_both_from_recv(&mut event_loop, a, b);

        let record = fired.clone();
        event_loop.set_fd_timeout_handler(a, move |event_loop, fd| {
            record.borrow_mut().push("a");
            event_loop.clear_fd(fd);
        });
        let record = fired.clone();
        event_loop.set_fd_timeout_handler(b, move |event_loop, _| {
            record.borrow_mut().push("b");
            event_loop
                .set_fd(a, Flags::empty(), FdTimeout::millis(30), |_, _, _| {})
                .unwrap();
        });
        event_loop.set_timer(Duration::from_millis(120), |event_loop| event_loop.set_break());

        event_loop.dispatch().unwrap();

        assert_eq!(*fired.borrow(), vec!["b", "a"], "{backend:?}");
        assert_eq!(event_loop.interest(a), None);
    }
}
