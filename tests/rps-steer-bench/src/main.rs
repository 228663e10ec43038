//! Steering Benchmark
//!
//! Measures steering decisions per second on N receive threads while a
//! control thread keeps pinning and unpinning local addresses (and optionally
//! registering and unregistering an extra handler).
//!
//! # Usage
//!
//! ```bash
//! # 4 readers for 10 seconds
//! rps-steer-bench --readers 4 --duration-secs 10
//!
//! # Pin readers to CPUs 0..N and churn handlers as well
//! rps-steer-bench --readers 4 --pin --churn-handlers
//!
//! # More debug output
//! RUST_LOG=rps_steer=debug rps-steer-bench --duration-secs 2
//! ```

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use nix::sched::{CpuSet, sched_setaffinity};
use nix::unistd::Pid;
use rps_steer::{BurstDecisions, EthernetRx, Priority, Steering, SteeringConfig, SteeringHandler};
use rps_steer_test::handlers::TestHandler;
use rps_steer_test::packets::{arp_frame, tcp_frame, udp_frame};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const PEER: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

#[derive(Parser, Debug)]
#[command(name = "rps-steer-bench")]
#[command(about = "Steering decision throughput under control-plane churn")]
struct Args {
    /// Number of receive threads
    #[arg(short, long, default_value = "4")]
    readers: usize,

    /// Benchmark duration in seconds
    #[arg(short, long, default_value = "5")]
    duration_secs: u64,

    /// Number of local addresses pinned and unpinned by the control thread
    #[arg(short, long, default_value = "64")]
    addresses: u32,

    /// Affinity table hash bits
    #[arg(long, default_value = "8")]
    hash_bits: u8,

    /// Pin reader i to CPU i
    #[arg(long)]
    pin: bool,

    /// Also register and unregister a preferred TCP handler in the churn loop
    #[arg(long)]
    churn_handlers: bool,
}

fn local_address(i: u32) -> Ipv4Addr {
    Ipv4Addr::from(0x0a00_0000 + i)
}

fn pin_to_cpu(cpu: usize) -> nix::Result<()> {
    let mut set = CpuSet::new();
    set.set(cpu)?;
    sched_setaffinity(Pid::from_raw(0), &set)
}

/// One receive burst: traffic to every churned address plus a few frames
/// steering must ignore.
fn build_burst(addresses: u32) -> Vec<Vec<u8>> {
    let mut frames: Vec<Vec<u8>> = (0..addresses)
        .map(|i| {
            if i % 2 == 0 {
                tcp_frame(PEER, local_address(i))
            } else {
                udp_frame(PEER, local_address(i))
            }
        })
        .collect();
    frames.push(arp_frame());
    frames.push(tcp_frame(PEER, Ipv4Addr::new(172, 16, 0, 1)));
    frames.truncate(rps_steer::RX_BURST_SIZE);
    frames
}

fn run_reader(
    id: usize,
    pin: bool,
    steering: &Steering,
    frames: &[Vec<u8>],
    stop: &AtomicBool,
    decisions: &AtomicU64,
    steered: &AtomicU64,
) {
    if pin {
        if let Err(e) = pin_to_cpu(id) {
            warn!(reader = id, error = %e, "Failed to set CPU affinity, results may be noisy");
        } else {
            debug!(reader = id, cpu = id, "Reader pinned to CPU");
        }
    }

    let packets: Vec<EthernetRx<'_>> = frames.iter().map(|f| EthernetRx::new(f)).collect();
    let mut out = BurstDecisions::new();
    let mut local_decisions = 0u64;
    let mut local_steered = 0u64;

    while !stop.load(Ordering::Relaxed) {
        let n = steering.decide_burst(&packets, &mut out);
        local_decisions += n as u64;
        local_steered += out.iter().filter(|d| d.is_some()).count() as u64;
    }

    decisions.fetch_add(local_decisions, Ordering::Relaxed);
    steered.fetch_add(local_steered, Ordering::Relaxed);
    debug!(reader = id, decisions = local_decisions, "Reader finished");
}

fn run_control(steering: &Steering, args: &Args, stop: &AtomicBool) -> u64 {
    let handler: Arc<dyn SteeringHandler> =
        TestHandler::new("bench-churn", 6, Priority::PreferredFirst)
            .answer(0)
            .build();
    let mut rounds = 0u64;

    while !stop.load(Ordering::Relaxed) {
        for i in 0..args.addresses {
            let cpu = i % args.readers.max(1) as u32;
            if let Err(e) = steering.add_local_address(local_address(i), cpu) {
                warn!(error = %e, "Failed to pin local address");
            }
        }
        if args.churn_handlers {
            if let Err(e) = steering.register(handler.clone()) {
                warn!(error = %e, "Failed to register churn handler");
            } else if let Err(e) = steering.unregister(&handler) {
                warn!(error = %e, "Failed to unregister churn handler");
            }
        }
        for i in 0..args.addresses {
            steering.remove_local_address(local_address(i));
        }
        rounds += 1;
    }
    rounds
}

fn main() {
    // Initialize tracing - respects RUST_LOG, defaults to info if not set
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .init();

    let args = Args::parse();
    info!(
        readers = args.readers,
        duration_secs = args.duration_secs,
        addresses = args.addresses,
        hash_bits = args.hash_bits,
        pin = args.pin,
        churn_handlers = args.churn_handlers,
        "Starting steering benchmark"
    );

    let config = SteeringConfig::builder()
        .enabled(true)
        .affinity_hash_bits(args.hash_bits)
        .build()
        .expect("Invalid steering configuration");
    let steering = Steering::new(config).expect("Failed to create steering instance");

    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = stop.clone();
    ctrlc::set_handler(move || {
        warn!("Received Ctrl+C, stopping benchmark");
        stop_clone.store(true, Ordering::Relaxed);
    })
    .expect("Failed to set Ctrl+C handler");

    let frames = build_burst(args.addresses);
    let decisions = AtomicU64::new(0);
    let steered = AtomicU64::new(0);
    let start = Instant::now();

    let rounds = std::thread::scope(|s| {
        for id in 0..args.readers {
            let (steering, frames, stop) = (&steering, &frames, &*stop);
            let (decisions, steered) = (&decisions, &steered);
            s.spawn(move || run_reader(id, args.pin, steering, frames, stop, decisions, steered));
        }

        let control = s.spawn(|| run_control(&steering, &args, &stop));

        let deadline = start + Duration::from_secs(args.duration_secs);
        while !stop.load(Ordering::Relaxed) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        stop.store(true, Ordering::Relaxed);
        control.join().unwrap_or(0)
    });

    let elapsed = start.elapsed().as_secs_f64();
    let decisions = decisions.load(Ordering::Relaxed);
    let steered = steered.load(Ordering::Relaxed);
    info!(
        decisions,
        steered,
        churn_rounds = rounds,
        elapsed_secs = elapsed,
        decisions_per_sec = (decisions as f64 / elapsed) as u64,
        "Benchmark complete"
    );

    steering.shutdown();
}
