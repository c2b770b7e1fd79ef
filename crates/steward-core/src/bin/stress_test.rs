//! Long-running stress test for the Steward engine.
//!
//! Registers managers from several threads while another thread converges in a
//! tight loop, then checks that no registration was lost, that no manager was
//! ever called concurrently with itself, and that shutdown stops every manager
//! exactly once.
//!
//! Usage:
//!   cargo run --bin stress_test -- [--cycles N] [--threads N]

use steward_core::{Engine, Manager, ManagerError, Stopper};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Tally {
    busy: AtomicBool,
    overlaps: AtomicUsize,
    ensures: AtomicUsize,
    stops: AtomicUsize,
}

impl Tally {
    fn guard(&self) {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn release(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

impl Manager for Tally {
    fn prepare(&self) -> Result<(), ManagerError> {
        Ok(())
    }

    fn ensure(&self) -> Result<(), ManagerError> {
        self.guard();
        let n = self.ensures.fetch_add(1, Ordering::SeqCst);
        self.release();
        if n % 97 == 0 {
            return Err(format!("tally ensure #{n} failed on purpose").into());
        }
        Ok(())
    }

    fn stopper(&self) -> Option<&dyn Stopper> {
        Some(self)
    }
}

impl Stopper for Tally {
    fn stop(&self) {
        self.guard();
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.release();
    }
}

struct Report {
    registered: usize,
    expected: usize,
    converge_passes: usize,
    converge_failures: usize,
    overlaps: usize,
    bad_stops: usize,
    elapsed: Duration,
}

fn run(cycles: usize, threads: usize) -> Report {
    let engine: Arc<Engine<()>> = Arc::new(Engine::new(Arc::new(())));
    let seed = Arc::new(Tally::default());
    engine.add_manager(Arc::clone(&seed) as Arc<dyn Manager>);
    if let Err(e) = engine.prepare() {
        eprintln!("  prepare failed: {e}");
    }

    let done = Arc::new(AtomicBool::new(false));
    let barrier = Arc::new(Barrier::new(threads + 1));
    let start = Instant::now();

    let converger = {
        let engine = Arc::clone(&engine);
        let done = Arc::clone(&done);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            let (mut passes, mut failures) = (0usize, 0usize);
            while !done.load(Ordering::SeqCst) {
                passes += 1;
                if engine.converge().is_err() {
                    failures += 1;
                }
            }
            (passes, failures)
        })
    };

    let mut registrars = Vec::new();
    for _ in 0..threads {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        registrars.push(thread::spawn(move || {
            barrier.wait();
            let mut mine = Vec::with_capacity(cycles);
            for _ in 0..cycles {
                let tally = Arc::new(Tally::default());
                engine.add_manager(Arc::clone(&tally) as Arc<dyn Manager>);
                mine.push(tally);
            }
            mine
        }));
    }

    let mut tallies = vec![seed];
    for handle in registrars {
        tallies.extend(handle.join().expect("registrar thread panicked"));
    }
    done.store(true, Ordering::SeqCst);
    let (converge_passes, converge_failures) =
        converger.join().expect("converger thread panicked");

    engine.wait();
    engine.stop();
    engine.stop();

    Report {
        registered: engine.manager_count(),
        expected: 1 + threads * cycles,
        converge_passes,
        converge_failures,
        overlaps: tallies
            .iter()
            .map(|p| p.overlaps.load(Ordering::SeqCst))
            .sum(),
        bad_stops: tallies
            .iter()
            .filter(|p| p.stops.load(Ordering::SeqCst) != 1)
            .count(),
        elapsed: start.elapsed(),
    }
}

fn arg_value(args: &[String], flag: &str, default: usize) -> usize {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let cycles = arg_value(&args, "--cycles", 2000);
    let threads = arg_value(&args, "--threads", 4);

    println!("Steward stress test: {threads} threads x {cycles} registrations");
    println!("============================================");

    let report = run(cycles, threads);

    println!("  managers registered: {}/{}", report.registered, report.expected);
    println!(
        "  converge passes: {} ({} reported failures)",
        report.converge_passes, report.converge_failures
    );
    println!("  concurrent manager calls: {}", report.overlaps);
    println!("  managers not stopped exactly once: {}", report.bad_stops);
    println!("  elapsed: {:.3}s", report.elapsed.as_secs_f64());

    if report.registered != report.expected || report.overlaps > 0 || report.bad_stops > 0 {
        eprintln!("\nSTRESS TEST FAILED");
        std::process::exit(1);
    } else {
        println!("\nSTRESS TEST PASSED");
    }
}
