//! Benchmarking command implementation for µDCN CLI.

use anyhow::{Context, Result};
use futures::future::join_all;
use log::info;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::timeout;
use udcn_common::{Encoder, Interest, Name, Packet, TlvEncoder};

/// Runs the benchmark with the specified parameters against `server`.
pub async fn run_benchmark(count: usize, prefix: String, concurrent: usize, server: String) -> Result<()> {
    info!(
        "Running benchmark: count={}, prefix={}, concurrent={}, server={}",
        count, prefix, concurrent, server
    );

    println!("Starting µDCN benchmark");
    println!("======================");
    println!("Parameters:");
    println!("  Interest count: {}", count);
    println!("  Name prefix: {}", prefix);
    println!("  Concurrent requests: {}", concurrent);
    println!("  Server: {}", server);
    println!();

    let start_time = Instant::now();
    let results = Arc::new(Mutex::new(BenchmarkResults {
        total_interests: count,
        successful_requests: 0,
        failed_requests: 0,
        timeouts: 0,
        total_time_ms: 0,
        min_rtt_ms: u64::MAX,
        max_rtt_ms: 0,
        total_rtt_ms: 0,
    }));

    println!("\nRunning benchmark...");

    let batch_size = std::cmp::max(1, count / concurrent);
    let mut tasks = Vec::new();

    for batch_index in 0..concurrent {
        let start_index = batch_index * batch_size;
        let end_index = if batch_index == concurrent - 1 {
            count
        } else {
            start_index + batch_size
        };

        if start_index >= count {
            break;
        }

        let prefix_clone = prefix.clone();
        let server_clone = server.clone();
        let results_clone = Arc::clone(&results);

        let task = tokio::spawn(async move {
            let socket = UdpSocket::bind("0.0.0.0:0").await.context("failed to bind benchmark socket")?;
            socket.connect(&server_clone).await.context("failed to reach server")?;
            let mut buf = vec![0u8; 65_507];

            for i in start_index..end_index {
                let name_str = format!("{}/{}", prefix_clone, i);
                let packet: Packet = Interest::new(Name::from_string(&name_str)).into();
                let wire = TlvEncoder.encode(&packet)?;

                let request_start = Instant::now();
                socket.send(&wire).await?;
                let outcome = timeout(Duration::from_millis(4000), socket.recv(&mut buf)).await;
                let rtt_ms = request_start.elapsed().as_millis() as u64;

                let mut results = results_clone.lock().await;
                match outcome {
                    Ok(Ok(len)) => match TlvEncoder.decode(&buf[..len]) {
                        Ok(Packet::Content(_)) => {
                            results.successful_requests += 1;
                            results.min_rtt_ms = results.min_rtt_ms.min(rtt_ms);
                            results.max_rtt_ms = results.max_rtt_ms.max(rtt_ms);
                            results.total_rtt_ms += rtt_ms;
                        }
                        _ => results.failed_requests += 1,
                    },
                    Ok(Err(_)) => results.failed_requests += 1,
                    Err(_) => results.timeouts += 1,
                }
                drop(results);

                if batch_index == 0 && (i - start_index) % 10 == 0 {
                    let progress = (i - start_index + 1) as f64 / (end_index - start_index) as f64;
                    print!("\rProgress: {:.1}%", progress * 100.0);
                    std::io::Write::flush(&mut std::io::stdout()).ok();
                }
            }
            Ok::<(), anyhow::Error>(())
        });

        tasks.push(task);
    }

    join_all(tasks).await;

    let total_time_ms = start_time.elapsed().as_millis() as u64;
    {
        let mut results = results.lock().await;
        results.total_time_ms = total_time_ms;
    }

    print_benchmark_results(results.lock().await.clone());

    Ok(())
}

/// Benchmark results structure
#[derive(Debug, Clone)]
struct BenchmarkResults {
    total_interests: usize,
    successful_requests: usize,
    failed_requests: usize,
    timeouts: usize,
    total_time_ms: u64,
    min_rtt_ms: u64,
    max_rtt_ms: u64,
    total_rtt_ms: u64,
}

fn print_benchmark_results(results: BenchmarkResults) {
    println!("\n\nBenchmark Results");
    println!("=================");
    println!("Total Interests Sent: {}", results.total_interests);
    println!(
        "Successful Requests: {} ({:.2}%)",
        results.successful_requests,
        (results.successful_requests as f64 / results.total_interests as f64) * 100.0
    );
    println!(
        "Failed Requests: {} ({:.2}%)",
        results.failed_requests,
        (results.failed_requests as f64 / results.total_interests as f64) * 100.0
    );
    println!(
        "Timeouts: {} ({:.2}%)",
        results.timeouts,
        (results.timeouts as f64 / results.total_interests as f64) * 100.0
    );

    println!("\nTiming:");
    println!("Total Time: {:.2} seconds", results.total_time_ms as f64 / 1000.0);

    if results.successful_requests > 0 {
        println!(
            "Throughput: {:.2} interests/second",
            results.total_interests as f64 / (results.total_time_ms as f64 / 1000.0)
        );
        println!("Min RTT: {} ms", results.min_rtt_ms);
        println!("Max RTT: {} ms", results.max_rtt_ms);
        println!(
            "Avg RTT: {:.2} ms",
            results.total_rtt_ms as f64 / results.successful_requests as f64
        );
    }
}
