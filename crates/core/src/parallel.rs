use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;

use rayon::prelude::*;

use crate::error::{Error, Result};

const PARALLEL_THRESHOLD: usize = 1024;

pub fn for_each_indexed_mut<T, F>(slice: &mut [T], f: F)
where
    T: Send,
    F: Fn(usize, &mut T) + Sync + Send,
{
    if slice.len() >= PARALLEL_THRESHOLD {
        slice
            .par_iter_mut()
            .enumerate()
            .for_each(|(idx, value)| f(idx, value));
        return;
    }

    for (idx, value) in slice.iter_mut().enumerate() {
        f(idx, value);
    }
}

pub fn count_matching<T, F>(slice: &[T], f: F) -> usize
where
    T: Sync,
    F: Fn(&T) -> bool + Sync + Send,
{
    if slice.len() >= PARALLEL_THRESHOLD {
        return slice.par_iter().filter(|value| f(value)).count();
    }
    slice.iter().filter(|value| f(value)).count()
}

/// Maps coarse work items (slabs, octree children) in parallel. The output
/// keeps index order.
pub fn map_ordered<T, F>(len: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    if len > 1 {
        return (0..len).into_par_iter().map(f).collect();
    }
    (0..len).map(f).collect()
}

/// Handle to a job running on the worker pool.
pub struct Offload<T> {
    receiver: mpsc::Receiver<T>,
    label: &'static str,
}

impl<T> Offload<T> {
    pub fn wait(self) -> Result<T> {
        self.receiver
            .recv()
            .map_err(|_| Error::Worker(self.label.to_string()))
    }
}

pub fn submit<T, F>(label: &'static str, job: F) -> Offload<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (sender, receiver) = mpsc::sync_channel(1);
    rayon::spawn(move || {
        // A panic in a spawned rayon job aborts the process unless caught here.
        if let Ok(value) = panic::catch_unwind(AssertUnwindSafe(job)) {
            let _ = sender.send(value);
        }
    });
    Offload { receiver, label }
}
