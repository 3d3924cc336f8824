//! Throughput harness for the concurrent containers.
//!
//! Stack runs time a multi-threaded push phase and then drain the container
//! single-threaded as a sanity check. Queue runs time an MPSC
//! produce/consume phase. Each run emits one CSV row on stdout:
//!
//! ```text
//! kind,name,threads,requested_ops,actual_ops,time_ms,ops_per_sec
//! ```
//!
//! ```bash
//! bench --kind stack --algo treiber --threads 8 --ops 200000
//! ```

use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use log::info;

use concurrent_containers::queue::{CoarseQueue, FcQueue, MsQueue, Queue};
use concurrent_containers::stack::{CoarseStack, EliminationStack, FcStack, Stack, TreiberStack};

/// Benchmark one container kind/algorithm combination.
#[derive(Parser, Debug)]
#[command(name = "bench")]
#[command(about = "Throughput benchmark for concurrent stacks and queues")]
struct Cli {
    /// Container kind to run.
    #[arg(long, value_enum)]
    kind: Kind,

    /// Algorithm to run.
    #[arg(long, value_enum)]
    algo: Algo,

    /// Stacks: pushing threads. Queues: producers (plus one consumer).
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Total operations, split evenly across threads.
    #[arg(long, default_value_t = 200_000)]
    ops: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Kind {
    Stack,
    Queue,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Algo {
    /// Single global lock.
    Sgl,
    /// Treiber stack.
    Treiber,
    /// Elimination-backoff stack.
    Elim,
    /// Flat combining.
    Fc,
    /// Michael-Scott queue.
    Ms,
}

struct Run {
    kind: &'static str,
    name: &'static str,
    threads: usize,
    requested_ops: usize,
    actual_ops: usize,
    time_ms: f64,
    ops_per_sec: f64,
}

impl Run {
    fn csv(&self) -> String {
        format!(
            "{},{},{},{},{},{:.3},{:.0}",
            self.kind,
            self.name,
            self.threads,
            self.requested_ops,
            self.actual_ops,
            self.time_ms,
            self.ops_per_sec
        )
    }
}

/// Times `threads` pushers of disjoint value ranges, then drains the stack
/// and checks that nothing was lost.
fn run_stack<S: Stack<usize>>(name: &'static str, threads: usize, ops: usize) -> Run {
    let stack = S::default();
    let per_thread = ops / threads;
    let actual = per_thread * threads;
    info!("stack run: {name}, {threads} threads, {per_thread} pushes each");

    let start = Instant::now();
    thread::scope(|s| {
        for id in 0..threads {
            let stack = &stack;
            s.spawn(move || {
                for i in 0..per_thread {
                    stack.push(id * per_thread + i);
                }
            });
        }
    });
    let elapsed = start.elapsed();

    let mut drained = 0;
    while stack.pop().is_some() {
        drained += 1;
    }
    assert_eq!(drained, actual, "{name}: popped != pushed");

    let time_ms = elapsed.as_secs_f64() * 1e3;
    Run {
        kind: "stack",
        name,
        threads,
        requested_ops: ops,
        actual_ops: actual,
        time_ms,
        ops_per_sec: actual as f64 / elapsed.as_secs_f64(),
    }
}

/// Times `producers` enqueuers against a single consumer; throughput counts
/// enqueues and dequeues.
fn run_queue<Q: Queue<usize>>(name: &'static str, producers: usize, ops: usize) -> Run {
    let queue = Q::default();
    let per_producer = ops / producers;
    let actual = per_producer * producers;
    info!("queue run: {name}, {producers} producers, {per_producer} items each");

    let consumed = AtomicUsize::new(0);

    let start = Instant::now();
    thread::scope(|s| {
        for id in 0..producers {
            let queue = &queue;
            s.spawn(move || {
                for i in 0..per_producer {
                    queue.enqueue(id * per_producer + i);
                }
            });
        }

        let queue = &queue;
        let consumed = &consumed;
        s.spawn(move || {
            while consumed.load(Ordering::Relaxed) < actual {
                if queue.dequeue().is_some() {
                    consumed.fetch_add(1, Ordering::Relaxed);
                } else {
                    thread::yield_now();
                }
            }
        });
    });
    let elapsed = start.elapsed();

    assert_eq!(consumed.load(Ordering::Relaxed), actual, "{name}: consumed != produced");
    assert!(queue.is_empty(), "{name}: queue not drained");

    let logical_ops = 2 * actual;
    let time_ms = elapsed.as_secs_f64() * 1e3;
    Run {
        kind: "queue",
        name,
        threads: producers,
        requested_ops: ops,
        actual_ops: logical_ops,
        time_ms,
        ops_per_sec: logical_ops as f64 / elapsed.as_secs_f64(),
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if cli.threads == 0 || cli.ops == 0 {
        eprintln!("--threads and --ops must be positive");
        process::exit(1);
    }

    let run = match (cli.kind, cli.algo) {
        (Kind::Stack, Algo::Sgl) => run_stack::<CoarseStack<usize>>("coarse", cli.threads, cli.ops),
        (Kind::Stack, Algo::Treiber) => {
            run_stack::<TreiberStack<usize>>("treiber", cli.threads, cli.ops)
        }
        (Kind::Stack, Algo::Elim) => {
            run_stack::<EliminationStack<usize>>("elimination", cli.threads, cli.ops)
        }
        (Kind::Stack, Algo::Fc) => {
            run_stack::<FcStack<usize>>("flat-combining", cli.threads, cli.ops)
        }
        (Kind::Queue, Algo::Sgl) => run_queue::<CoarseQueue<usize>>("coarse", cli.threads, cli.ops),
        (Kind::Queue, Algo::Ms) => run_queue::<MsQueue<usize>>("michael-scott", cli.threads, cli.ops),
        (Kind::Queue, Algo::Fc) => {
            run_queue::<FcQueue<usize>>("flat-combining", cli.threads, cli.ops)
        }
        (kind, algo) => {
            eprintln!("algo {algo:?} does not apply to kind {kind:?}");
            process::exit(1);
        }
    };

    info!(
        "{} {}: {} ops in {:.3} ms",
        run.kind, run.name, run.actual_ops, run.time_ms
    );
    println!("kind,name,threads,requested_ops,actual_ops,time_ms,ops_per_sec");
    println!("{}", run.csv());
}
