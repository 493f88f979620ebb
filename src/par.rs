// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! This module is for parallel analysis. Only compiled when "par" feature is enabled.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
#[cfg(feature = "log")]
use log::{info, warn};
use num_complex::Complex32;

use super::config;
use super::constant;
use super::constant::envvar_key;
use super::constant::panic_msg;
use super::engine;
use super::engine::Klt;
use super::engine::WindowOutput;
use super::error::AllocError;
use super::error::AnalysisError;
use super::error::SourceError;
use super::mem::FixedBuf;
use super::source::Framer;
use super::source::Source;

/// Sink adapter that restores the stream order of analysis results.
///
/// Results are passed to the inner sink as soon as all the preceding results
/// are received, so only the out-of-order part of the stream is buffered.
struct ParSink<T, F> {
    next: usize,
    pending: BTreeMap<usize, T>,
    sink: F,
}

impl<T, F: FnMut(T)> ParSink<T, F> {
    /// Creates `ParSink` object that forwards results to `sink`.
    pub fn new(sink: F) -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
            sink,
        }
    }

    /// Stores a computation result `element` with a serial id `idx`, and
    /// flushes the results that are now in order.
    pub fn push(&mut self, idx: usize, element: T) {
        self.pending.insert(idx, element);
        while let Some(element) = self.pending.remove(&self.next) {
            (self.sink)(element);
            self.next += 1;
        }
    }

    /// Returns the number of results passed to the inner sink.
    pub const fn flushed(&self) -> usize {
        self.next
    }

    /// Returns the number of results waiting for their predecessors.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Internal struct for tying a window buffer with the current window index.
struct NumberedWindowBuf {
    samples: FixedBuf<Complex32>,
    index: Option<usize>,
}

pub struct FeedStats {
    pub window_count: usize,
    pub worker_starvation_count: usize,
}

/// Window buffers and result queue shared between the feeder and the workers.
struct ParWindowBuf {
    buffers: Vec<Mutex<NumberedWindowBuf>>,
    analyze_queue: (Sender<Option<usize>>, Receiver<Option<usize>>),
    refill_queue: (Sender<usize>, Receiver<usize>),
    result_queue: (Sender<WindowOutput>, Receiver<WindowOutput>),
}

impl ParWindowBuf {
    /// Creates new parallel window buffers.
    pub fn new(replicas: usize, input_len: usize) -> Result<Self, AllocError> {
        let mut buffers = Vec::with_capacity(replicas);
        for _t in 0..replicas {
            let buf = Mutex::new(NumberedWindowBuf {
                samples: FixedBuf::zeroed("par_window", input_len)?,
                index: None,
            });
            buffers.push(buf);
        }
        let (refill_sender, refill_receiver) = crossbeam_channel::bounded(replicas + 1);

        (0..replicas).for_each(|t| {
            refill_sender.send(t).expect(panic_msg::MPMC_SEND_FAILED);
        });
        Ok(Self {
            buffers,
            analyze_queue: crossbeam_channel::bounded(replicas + 1),
            refill_queue: (refill_sender, refill_receiver),
            result_queue: crossbeam_channel::unbounded(),
        })
    }

    /// Gets the id of the window buffer to be analyzed first.
    ///
    /// If this returns None, worker thread must immediately stop.
    #[inline]
    pub fn pop_analyze_queue(&self) -> Option<usize> {
        self.analyze_queue
            .1
            .recv()
            .expect(panic_msg::MPMC_RECV_FAILED)
    }

    /// Locks the window buffer with the specified id and returns `MutexGuard`.
    #[inline]
    pub fn lock_buffer(&self, bufid: usize) -> std::sync::MutexGuard<'_, NumberedWindowBuf> {
        self.buffers[bufid]
            .lock()
            .expect(panic_msg::MUTEX_LOCK_FAILED)
    }

    /// Requests refill for the window buffer with the specified id.
    #[inline]
    pub fn enqueue_refill(&self, bufid: usize) {
        self.refill_queue
            .0
            .send(bufid)
            .expect(panic_msg::MPMC_SEND_FAILED);
    }

    /// Waits for a refill request.
    ///
    /// Results that arrive while waiting are passed to `parsink`.
    pub fn recv_refill_request<F>(&self, parsink: &mut ParSink<WindowOutput, F>) -> usize
    where
        F: FnMut(WindowOutput),
    {
        loop {
            crossbeam_channel::select! {
                recv(self.refill_queue.1) -> bufid => {
                    return bufid.expect(panic_msg::MPMC_RECV_FAILED);
                }
                recv(self.result_queue.1) -> out => {
                    let out = out.expect(panic_msg::MPMC_RECV_FAILED);
                    parsink.push(out.index, out);
                }
            }
        }
    }

    #[inline]
    pub fn enqueue_analyze(&self, bufid: usize) -> bool {
        let starved = self.analyze_queue.0.is_empty();
        self.analyze_queue
            .0
            .send(Some(bufid))
            .expect(panic_msg::MPMC_SEND_FAILED);
        starved
    }

    #[inline]
    pub fn request_stop(&self, workers: usize) {
        for _i in 0..workers {
            self.analyze_queue
                .0
                .send(None)
                .expect(panic_msg::MPMC_SEND_FAILED);
        }
    }

    /// Sends the result of a window to the feeder.
    #[inline]
    pub fn send_result(&self, out: WindowOutput) {
        self.result_queue
            .0
            .send(out)
            .expect(panic_msg::MPMC_SEND_FAILED);
    }

    /// Passes all the results received so far to `parsink`.
    pub fn drain_results<F>(&self, parsink: &mut ParSink<WindowOutput, F>)
    where
        F: FnMut(WindowOutput),
    {
        for out in self.result_queue.1.try_iter() {
            parsink.push(out.index, out);
        }
    }
}

/// Reads windows from source, copies them to buffers, and enqueues.
///
/// This function is intended to be called from the main (single) thread.
/// Finished results are passed to `parsink` while feeding. Stop signals are
/// not sent from this function so that the caller can always stop the
/// workers even when the source failed.
///
/// # Errors
///
/// It propagates errors from `Source::read_samples`.
fn feed_windows<T, F>(
    src: T,
    framer: &mut Framer,
    parbuf: &ParWindowBuf,
    parsink: &mut ParSink<WindowOutput, F>,
) -> Result<FeedStats, SourceError>
where
    T: Source,
    F: FnMut(WindowOutput),
{
    let mut src = src;
    let mut window_count = 0usize;
    let mut worker_starvation_count = 0usize;

    while let Some(window) = framer.next_window(&mut src)? {
        let bufid = parbuf.recv_refill_request(parsink);
        {
            let mut numbuf = parbuf.lock_buffer(bufid);
            numbuf.samples.copy_from_slice(window);
            numbuf.index = Some(window_count);
        }
        window_count += 1;
        if parbuf.enqueue_analyze(bufid) {
            worker_starvation_count += 1;
        }
        parbuf.drain_results(parsink);
    }
    Ok(FeedStats {
        window_count,
        worker_starvation_count,
    })
}

/// Determines worker counts considering various cues.
fn determine_worker_count(config: &config::Analyzer) -> Result<usize, SourceError> {
    let default_parallelism = std::thread::available_parallelism()
        .map_err(SourceError::from_io_error)?
        .get();
    let default_parallelism = std::env::var(envvar_key::DEFAULT_PARALLELISM)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default_parallelism);
    Ok(config
        .workers
        .map_or(default_parallelism, NonZeroUsize::get))
}

/// Parallel version of [`engine::analyze`].
///
/// This function is internally called by [`engine::analyze`] when
/// `config.multithread == true`. Each worker owns its own [`Klt`] engine.
/// The main thread reads the source and passes results to `sink` in the
/// stream order as soon as they are available.
///
/// # Errors
///
/// Same as [`engine::analyze`].
///
/// # Panics
///
/// This function panics when an internal error regarding inter-thread
/// communication.
pub fn analyze<T, F>(config: &config::Analyzer, src: T, sink: F) -> Result<usize, AnalysisError>
where
    T: Source,
    F: FnMut(WindowOutput),
{
    let klt_config = engine::verified_klt_config(config)?;
    let worker_count = determine_worker_count(config)?;
    let engines = (0..worker_count)
        .map(|_n| Klt::new(&klt_config))
        .collect::<Result<Vec<_>, _>>()?;
    let mut framer = Framer::new(config.klt.input_len, config.stride())?;
    let parbuf = Arc::new(ParWindowBuf::new(
        worker_count * constant::par::WINDOWBUF_MULTIPLICITY,
        config.klt.input_len,
    )?);
    let mut parsink = ParSink::new(sink);

    let join_handles: Vec<_> = engines
        .into_iter()
        .map(|engine| {
            let parbuf = Arc::clone(&parbuf);
            thread::spawn(move || {
                let mut engine = engine;
                while let Some(bufid) = parbuf.pop_analyze_queue() {
                    let index = {
                        let numbuf = parbuf.lock_buffer(bufid);
                        engine.load_input(&numbuf.samples);
                        numbuf.index.expect(panic_msg::WINDOWNUM_NOT_SET)
                    };
                    parbuf.enqueue_refill(bufid);
                    let status = engine.transform();
                    #[cfg(feature = "log")]
                    if let Err(e) = &status {
                        warn!("window #{index}: {e}");
                    }
                    parbuf.send_result(engine.output(index, status));
                }
            })
        })
        .collect();

    let feed_result = feed_windows(src, &mut framer, &parbuf, &mut parsink);
    parbuf.request_stop(worker_count);
    for h in join_handles {
        h.join().expect(panic_msg::THREAD_JOIN_FAILED);
    }
    let feed_stats = feed_result?;
    parbuf.drain_results(&mut parsink);
    assert!(
        parsink.flushed() == feed_stats.window_count && parsink.pending() == 0,
        "{}",
        panic_msg::RESULT_MISSING
    );

    #[cfg(feature = "log")]
    info!(
        target: "klt::par::jsonl",
        "{{ worker_count: {}, window_count: {}, worker_starvation_count: {} }}",
        worker_count,
        feed_stats.window_count,
        feed_stats.worker_starvation_count,
    );

    Ok(feed_stats.window_count)
}
