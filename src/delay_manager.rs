use log::{debug, info};
use std::cell::RefCell;
use std::thread;
use std::time::Duration;

/// Request pacing. Every wait in the crawl goes through one of these so tests
/// can observe the schedule without sleeping.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        if duration.as_secs() >= 60 {
            info!("Waiting for {} seconds...", duration.as_secs());
        } else {
            debug!("Waiting for {:?}", duration);
        }
        thread::sleep(duration);
    }
}

/// Records requested waits instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    waits: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.waits.borrow_mut().push(duration);
    }
}
