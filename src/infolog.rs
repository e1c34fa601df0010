//! Minimal logging: a reference-counted `Write` plus a `log!` macro, in the
//! style of an embedded info log rather than a full structured-logging
//! facade.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

/// A log sink. Cheap to clone -- every clone writes through to the same
/// underlying `Write` -- so one `Logger` can be shared between the table
/// builder and the collaborators it hands work off to (e.g. the filter
/// block builder) without each needing its own handle to the destination.
#[derive(Clone)]
pub struct Logger(pub Rc<RefCell<dyn Write>>);

pub fn stderr() -> Logger {
    Logger(Rc::new(RefCell::new(io::stderr())))
}

pub fn discard() -> Logger {
    Logger(Rc::new(RefCell::new(io::sink())))
}

#[macro_export]
#[allow(clippy::unused_io_amount)]
macro_rules! log {
    ($l:expr) => ($l.0.borrow_mut().write_all("\n".as_bytes()).ok());
    ($l:expr, $fmt:expr) => ($l.0.borrow_mut().write_all(concat!($fmt, "\n").as_bytes()).ok());
    ($l:expr, $fmt:expr, $($arg:tt)*) => (
        $l.0.borrow_mut().write_fmt(format_args!(concat!($fmt, "\n"), $($arg)*)).ok());
}
