use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Metrics collector, if active, it provides Counters, Timers and a batch-size gauge.
#[derive(Clone)]
pub struct Metrics {
    metrics: Option<Arc<ActiveMetrics>>,
}

/// Metrics that can be collected during execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Counter of committed versions
    Commits,
    /// Counter of nodes written by commits
    NodesWritten,
    /// Counter of nodes marked stale by commits
    NodesMarkedStale,
    /// Counter of value reads
    ValueReads,
    /// Counter of value reads which found nothing
    ValueReadMisses,
    /// Counter of generated inclusion proofs
    InclusionProofs,
    /// Counter of generated non-inclusion proofs
    ExclusionProofs,
    /// Timer used to record average commit time
    CommitTime,
    /// Timer used to record average value read time
    ReadTime,
    /// Timer used to record average proof generation time
    ProofTime,
}

/// A point-in-time copy of the collected counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub commits: u64,
    pub nodes_written: u64,
    pub nodes_marked_stale: u64,
    pub value_reads: u64,
    pub value_read_misses: u64,
    pub inclusion_proofs: u64,
    pub exclusion_proofs: u64,
    /// The number of nodes in the most recent commit batch.
    pub last_batch_size: u64,
}

struct ActiveMetrics {
    commits: AtomicU64,
    nodes_written: AtomicU64,
    nodes_marked_stale: AtomicU64,
    value_reads: AtomicU64,
    value_read_misses: AtomicU64,
    inclusion_proofs: AtomicU64,
    exclusion_proofs: AtomicU64,
    last_batch_size: AtomicU64,
    commit_time: Timer,
    read_time: Timer,
    proof_time: Timer,
}

impl Metrics {
    /// Returns the Metrics object, active or not based on the specified input
    pub fn new(active: bool) -> Self {
        Self {
            metrics: if active {
                Some(Arc::new(ActiveMetrics {
                    commits: AtomicU64::new(0),
                    nodes_written: AtomicU64::new(0),
                    nodes_marked_stale: AtomicU64::new(0),
                    value_reads: AtomicU64::new(0),
                    value_read_misses: AtomicU64::new(0),
                    inclusion_proofs: AtomicU64::new(0),
                    exclusion_proofs: AtomicU64::new(0),
                    last_batch_size: AtomicU64::new(0),
                    commit_time: Timer::new(),
                    read_time: Timer::new(),
                    proof_time: Timer::new(),
                }))
            } else {
                None
            },
        }
    }

    /// Increase the Counter specified by the input
    ///
    /// panics if the specified [`Metric`] is not a Counter
    pub fn count(&self, metric: Metric) {
        self.count_n(metric, 1);
    }

    /// Increase the Counter specified by the input by `n`
    ///
    /// panics if the specified [`Metric`] is not a Counter
    pub fn count_n(&self, metric: Metric, n: u64) {
        if let Some(ref metrics) = self.metrics {
            let counter = match metric {
                Metric::Commits => &metrics.commits,
                Metric::NodesWritten => &metrics.nodes_written,
                Metric::NodesMarkedStale => &metrics.nodes_marked_stale,
                Metric::ValueReads => &metrics.value_reads,
                Metric::ValueReadMisses => &metrics.value_read_misses,
                Metric::InclusionProofs => &metrics.inclusion_proofs,
                Metric::ExclusionProofs => &metrics.exclusion_proofs,
                _ => panic!("Specified metric is not a Counter"),
            };

            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    /// Record the size of the latest commit batch.
    pub fn set_last_batch_size(&self, nodes: u64) {
        if let Some(ref metrics) = self.metrics {
            metrics.last_batch_size.store(nodes, Ordering::Relaxed);
        }
    }

    /// Returns a guard that, when dropped, will record the time passed since creation
    ///
    /// panics if the specified [`Metric`] is not a Timer
    pub fn record<'a>(&'a self, metric: Metric) -> Option<impl Drop + 'a> {
        self.metrics.as_ref().map(|metrics| {
            let timer = match metric {
                Metric::CommitTime => &metrics.commit_time,
                Metric::ReadTime => &metrics.read_time,
                Metric::ProofTime => &metrics.proof_time,
                _ => panic!("Specified metric is not a Timer"),
            };

            timer.record()
        })
    }

    /// Copy the current counter values, if metrics are active.
    pub fn snapshot(&self) -> Option<MetricsSnapshot> {
        self.metrics.as_ref().map(|m| MetricsSnapshot {
            commits: m.commits.load(Ordering::Relaxed),
            nodes_written: m.nodes_written.load(Ordering::Relaxed),
            nodes_marked_stale: m.nodes_marked_stale.load(Ordering::Relaxed),
            value_reads: m.value_reads.load(Ordering::Relaxed),
            value_read_misses: m.value_read_misses.load(Ordering::Relaxed),
            inclusion_proofs: m.inclusion_proofs.load(Ordering::Relaxed),
            exclusion_proofs: m.exclusion_proofs.load(Ordering::Relaxed),
            last_batch_size: m.last_batch_size.load(Ordering::Relaxed),
        })
    }

    /// Print collected metrics to stdout
    pub fn print(&self) {
        let (Some(snapshot), Some(metrics)) = (self.snapshot(), self.metrics.as_ref()) else {
            println!("Metrics collection was not activated");
            return;
        };

        println!("metrics");
        println!("  commits               {}", snapshot.commits);
        println!("  nodes written         {}", snapshot.nodes_written);
        println!("  nodes marked stale    {}", snapshot.nodes_marked_stale);
        println!("  last batch size       {}", snapshot.last_batch_size);
        println!("  value reads           {}", snapshot.value_reads);

        if snapshot.value_reads != 0 {
            let percentage_misses =
                (snapshot.value_read_misses as f64 / snapshot.value_reads as f64) * 100.0;
            println!(
                "  value read misses     {} - {:.2}% of value reads",
                snapshot.value_read_misses, percentage_misses
            );
        }

        println!(
            "  proofs                {} inclusion, {} exclusion",
            snapshot.inclusion_proofs, snapshot.exclusion_proofs
        );

        if let Some(mean) = metrics.commit_time.mean() {
            println!("  commit mean           {}", pretty_display_ns(mean));
        }
        if let Some(mean) = metrics.read_time.mean() {
            println!("  value read mean       {}", pretty_display_ns(mean));
        }
        if let Some(mean) = metrics.proof_time.mean() {
            println!("  proof mean            {}", pretty_display_ns(mean));
        }
    }
}

fn pretty_display_ns(ns: u64) -> String {
    // preserve 3 sig figs at minimum.
    let (val, unit) = if ns > 100 * 1_000_000_000 {
        (ns / 1_000_000_000, "s")
    } else if ns > 100 * 1_000_000 {
        (ns / 1_000_000, "ms")
    } else if ns > 100 * 1_000 {
        (ns / 1_000, "us")
    } else {
        (ns, "ns")
    };

    format!("{val} {unit}")
}

struct Timer {
    number_of_records: AtomicU64,
    sum: AtomicU64,
}

impl Timer {
    fn new() -> Self {
        Timer {
            number_of_records: AtomicU64::new(0),
            sum: AtomicU64::new(0),
        }
    }

    fn mean(&self) -> Option<u64> {
        let n = self.number_of_records.load(Ordering::Relaxed);
        let sum = self.sum.load(Ordering::Relaxed);
        sum.checked_div(n)
    }

    fn record<'a>(&'a self) -> impl Drop + 'a {
        struct TimerGuard<'a> {
            start: std::time::Instant,
            n: &'a AtomicU64,
            sum: &'a AtomicU64,
        }

        impl Drop for TimerGuard<'_> {
            fn drop(&mut self) {
                let elapsed = self.start.elapsed().as_nanos() as u64;
                self.n.fetch_add(1, Ordering::Relaxed);
                self.sum.fetch_add(elapsed, Ordering::Relaxed);
            }
        }

        TimerGuard {
            start: std::time::Instant::now(),
            n: &self.number_of_records,
            sum: &self.sum,
        }
    }
}
