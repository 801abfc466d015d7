//! # Asynchronous logger
//!
//! A [`log`] backend that renders records on the calling thread and defers
//! terminal output to a single drain thread, so logging from the receive
//! loop or the router never stalls on stdout.
//!
//! [`init`] installs the logger process-wide and returns a [`LoggerHandle`];
//! dropping the handle flushes the queue and joins the drain thread.

use std::collections::VecDeque;
use std::thread::{self, JoinHandle};

use chrono::Local;
use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

use crate::consts::LOG_QUEUE_CAPACITY;

struct LogQueue {
    records: VecDeque<String>,
    stopped: bool,
}

struct LoggerShared {
    queue: Mutex<LogQueue>,
    available: Condvar,
}

/// Queue-backed [`Log`] implementation.
struct AsyncLogger {
    shared: Arc<LoggerShared>,
}

impl Log for AsyncLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let level = match record.level() {
            Level::Error => "ERROR".red(),
            Level::Warn => "WARN ".yellow(),
            _ => "INFO ".green(),
        };
        let line = format!("[{timestamp}] [{level}] {}", record.args());

        let mut queue = self.shared.queue.lock();
        if queue.stopped {
            return;
        }
        if queue.records.len() == LOG_QUEUE_CAPACITY {
            queue.records.pop_front();
        }
        queue.records.push_back(line);
        drop(queue);

        self.shared.available.notify_one();
    }

    fn flush(&self) {}
}

/// Keeps the drain thread alive.
///
/// Dropping the handle stops the logger: the queue is drained to the last
/// record, then the thread is joined.
pub struct LoggerHandle {
    shared: Arc<LoggerShared>,
    drain: Option<JoinHandle<()>>,
}

impl Drop for LoggerHandle {
    fn drop(&mut self) {
        self.shared.queue.lock().stopped = true;
        self.shared.available.notify_all();

        if let Some(drain) = self.drain.take() {
            let _ = drain.join();
        }
    }
}

/// Installs the process-wide logger and spawns the drain thread.
///
/// Levels above `Info` are compiled away by the max-level filter. Safe to
/// call more than once; only the first call installs the backend.
pub fn init() -> LoggerHandle {
    let shared = Arc::new(LoggerShared {
        queue: Mutex::new(LogQueue {
            records: VecDeque::new(),
            stopped: false,
        }),
        available: Condvar::new(),
    });

    let drain_shared = shared.clone();
    let drain = thread::Builder::new()
        .name("logger".to_string())
        .spawn(move || drain_loop(drain_shared))
        .ok();

    let logger = AsyncLogger {
        shared: shared.clone(),
    };
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }

    LoggerHandle { shared, drain }
}

fn drain_loop(shared: Arc<LoggerShared>) {
    loop {
        let record = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(record) = queue.records.pop_front() {
                    break record;
                }
                if queue.stopped {
                    return;
                }
                shared.available.wait(&mut queue);
            }
        };

        // One record per line, written outside the lock.
        println!("{record}");
    }
}
