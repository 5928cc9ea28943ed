//! Bounded worker pool
//!
//! A stage submits its units to a [`Batch`] and waits for all of them.
//! At most `capacity` units run at once; extra submissions queue. A failing
//! or panicking unit never cancels its siblings.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Errors creating the pool
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("failed to build worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
}

/// Fixed-capacity pool backed by a rayon thread pool
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    capacity: usize,
}

impl WorkerPool {
    /// Create a pool. A non-positive request falls back to the number of
    /// available CPUs.
    pub fn new(requested: i64) -> Result<Self, PoolError> {
        let capacity = if requested <= 0 {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        } else {
            requested as usize
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(capacity)
            .thread_name(|i| format!("relforge-worker-{}", i))
            .build()?;

        Ok(Self { pool, capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Start a batch of units sharing this pool
    pub fn batch<E: Send + 'static>(&self) -> Batch<'_, E> {
        let (tx, rx) = mpsc::channel();
        Batch {
            pool: self,
            tx,
            rx,
            labels: Vec::new(),
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool").field("capacity", &self.capacity).finish()
    }
}

/// Why a unit did not succeed
#[derive(Debug)]
pub enum UnitFailure<E> {
    Error(E),
    Panic(String),
}

impl<E: fmt::Display> fmt::Display for UnitFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitFailure::Error(err) => write!(f, "{}", err),
            UnitFailure::Panic(message) => write!(f, "unit panicked: {}", message),
        }
    }
}

/// Result of one submitted unit
#[derive(Debug)]
pub struct Outcome<E> {
    pub index: usize,
    pub label: String,
    pub duration: Duration,
    pub result: Result<(), UnitFailure<E>>,
}

impl<E> Outcome<E> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcomes of a batch, in submission order
#[derive(Debug)]
pub struct BatchReport<E> {
    pub outcomes: Vec<Outcome<E>>,
}

impl<E> BatchReport<E> {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Outcome<E>> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }
}

type Message<E> = (usize, Duration, Result<(), UnitFailure<E>>);

/// Units submitted together and awaited together
pub struct Batch<'p, E> {
    pool: &'p WorkerPool,
    tx: mpsc::Sender<Message<E>>,
    rx: mpsc::Receiver<Message<E>>,
    labels: Vec<String>,
}

impl<'p, E: Send + 'static> Batch<'p, E> {
    /// Queue a unit. It starts as soon as a worker is free.
    pub fn submit<F>(&mut self, label: impl Into<String>, unit: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
    {
        let index = self.labels.len();
        self.labels.push(label.into());

        let tx = self.tx.clone();
        self.pool.pool.spawn(move || {
            let started = Instant::now();
            let result = match panic::catch_unwind(AssertUnwindSafe(unit)) {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(UnitFailure::Error(err)),
                Err(payload) => Err(UnitFailure::Panic(panic_message(payload.as_ref()))),
            };
            // The receiver only goes away if the batch was dropped unawaited
            let _ = tx.send((index, started.elapsed(), result));
        });
    }

    /// Number of units submitted so far
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Block until every submitted unit has finished
    pub fn wait(self) -> BatchReport<E> {
        let Batch { tx, rx, labels, .. } = self;
        drop(tx);

        let mut slots: Vec<Option<(Duration, Result<(), UnitFailure<E>>)>> =
            labels.iter().map(|_| None).collect();
        for (index, duration, result) in rx.iter() {
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some((duration, result));
            }
        }

        let outcomes = labels
            .into_iter()
            .zip(slots)
            .enumerate()
            .map(|(index, (label, slot))| {
                let (duration, result) = slot.unwrap_or_else(|| {
                    (Duration::ZERO, Err(UnitFailure::Panic("unit never reported".to_string())))
                });
                Outcome {
                    index,
                    label,
                    duration,
                    result,
                }
            })
            .collect();

        BatchReport { outcomes }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
