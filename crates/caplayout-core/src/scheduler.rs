//! Worker pool for scraper jobs.
//!
//! A bounded set of OS threads consumes jobs from a channel; one job is one
//! scraper over one binary. Jobs are internally single-threaded; the shared
//! [`StorageManager`] is the only synchronization point between them.
//!
//! Cancellation is cooperative: [`Scheduler::cancel`] trips a shared token
//! that queued jobs observe before doing any work and running jobs observe
//! at compilation-unit boundaries, so the current unit's transactions are
//! never torn.
//!
//! [`StorageManager`]: crate::storage::StorageManager

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::scraper::{ScraperResult, StructLayoutScraper};

/// Shared cancellation token handed to every job.
#[derive(Debug, Clone, Default)]
pub struct StopToken
{
    flag: Arc<AtomicBool>,
}

impl StopToken
{
    pub fn is_cancelled(&self) -> bool
    {
        self.flag.load(Ordering::Relaxed)
    }

    fn trip(&self)
    {
        self.flag.store(true, Ordering::Relaxed);
    }
}

type Job = Box<dyn FnOnce(&StopToken) + Send + 'static>;

/// Bounded worker pool with graceful shutdown.
pub struct Scheduler
{
    queue: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    stop: StopToken,
}

impl Scheduler
{
    /// Spawn `workers` threads (at least one).
    pub fn new(workers: usize) -> Self
    {
        let (queue, jobs) = unbounded::<Job>();
        let stop = StopToken::default();
        let workers = (0..workers.max(1))
            .map(|index| {
                let jobs: Receiver<Job> = jobs.clone();
                let token = stop.clone();
                std::thread::Builder::new()
                    .name(format!("scraper-{index}"))
                    .spawn(move || {
                        while let Ok(job) = jobs.recv() {
                            job(&token);
                        }
                    })
                    .expect("failed to spawn scraper worker")
            })
            .collect();
        Scheduler {
            queue: Some(queue),
            workers,
            stop,
        }
    }

    /// Enqueue a scraper job and return the single-use receiver its result
    /// arrives on.
    ///
    /// The job initializes the schema, runs the scraper's main loop with
    /// the pool's stop token, and resolves the receiver with the
    /// [`ScraperResult`] — errors included — when it finishes.
    pub fn schedule(&self, mut scraper: StructLayoutScraper) -> Receiver<ScraperResult>
    {
        let (done, result) = bounded(1);
        let job: Job = Box::new(move |token| {
            let source = scraper.source().path().to_path_buf();
            let outcome = if token.is_cancelled() {
                Ok(())
            } else {
                scraper.init_schema().and_then(|()| scraper.run(token))
            };

            let mut errors = Vec::new();
            match outcome {
                Ok(()) => {
                    tracing::info!(source = %source.display(), "scraper completed job");
                }
                Err(err) => {
                    tracing::error!(source = %source.display(), error = %err, "DWARF scraper failed");
                    errors.push(err.to_string());
                }
            }
            let _ = done.send(ScraperResult {
                source,
                errors,
                stats: scraper.stats().clone(),
            });
        });

        if let Some(queue) = &self.queue {
            if queue.send(job).is_err() {
                tracing::error!("scheduler queue is closed, dropping job");
            }
        }
        result
    }

    /// Signal cancellation. Queued jobs complete without doing any work;
    /// running jobs stop at the next compilation-unit boundary.
    pub fn cancel(&self)
    {
        self.stop.trip();
    }

    /// Close the queue and block until every worker has terminated.
    pub fn wait(mut self)
    {
        self.shutdown();
    }

    fn shutdown(&mut self)
    {
        self.queue.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for Scheduler
{
    fn drop(&mut self)
    {
        self.shutdown();
    }
}
