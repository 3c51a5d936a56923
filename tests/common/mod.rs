#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use vigil::{BackendKind, EventLoop, LoopBuilder};

/// Installs a tracing subscriber when `RUST_LOG` is set.
///
/// A no-op when `RUST_LOG` is not set or a global subscriber already exists.
pub fn init_tracing() {
    use std::env;

    if env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Every backend this target can build, `Auto` first.
pub fn backends() -> Vec<BackendKind> {
    [BackendKind::Auto, BackendKind::Select]
        .into_iter()
        .filter(|kind| kind.is_available())
        .collect()
}

pub fn event_loop(backend: BackendKind) -> EventLoop {
    init_tracing();

    LoopBuilder::new().backend(backend).build().unwrap()
}

/// Breaks the loop after `limit` and records that it had to.
///
/// Keeps a broken test from hanging forever.
pub fn watchdog(event_loop: &mut EventLoop, limit: Duration) -> Rc<RefCell<bool>> {
    let fired = Rc::new(RefCell::new(false));
    let flag = fired.clone();

    event_loop.set_timer(limit, move |event_loop| {
        *flag.borrow_mut() = true;
        event_loop.set_break();
    });

    fired
}

pub type Log = Rc<RefCell<Vec<&'static str>>>;

pub fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}
