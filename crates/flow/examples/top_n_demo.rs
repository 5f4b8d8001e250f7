//! Slowest service instances per window
//!
//! Feeds synthetic latency samples through
//! `filter -> map -> window -> top_n` and prints the three slowest instances
//! of every service for each two-second window.
//!
//! ```bash
//! RUST_LOG=flow=debug cargo run --example top_n_demo
//! ```

use flow::operator::{ChannelSource, CollectSink};
use flow::{init_tracing, Flow, FlowConfig, Order, Record, TopNOptions, TumblingTimeWindows};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Sample {
    service: &'static str,
    instance: u32,
    latency_ms: i64,
}

#[derive(Debug, Clone)]
struct Latency {
    service: String,
    instance: String,
    latency_ms: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    let config = FlowConfig::load(None)?.with_window_tick(Duration::from_millis(100));
    let (source, feed) = ChannelSource::new(16);
    let sink = CollectSink::new();
    let results = sink.handle();

    let windows = TumblingTimeWindows::new(Duration::from_secs(2), Duration::from_secs(2))?;
    let options = TopNOptions::new()
        .with_key_extractor(|r: &Record<Latency>| r.data().instance.clone())
        .with_sort_key_extractor(|r: &Record<Latency>| r.data().latency_ms)
        .with_group_key_extractor(|r: &Record<Latency>| r.data().service.clone())
        .order_by(Order::Desc);

    let mut pipeline = Flow::with_config("slowest-instances", source, config)
        .filter(|_, s: &Sample| s.latency_ms > 0)
        .map(|_, s: Sample| Latency {
            service: s.service.to_string(),
            instance: format!("{}-{:03}", s.service, s.instance),
            latency_ms: s.latency_ms,
        })
        .window(windows)
        .top_n(3, options)
        .to(sink);

    let mut errors = pipeline.open().await?;

    for i in 0..60u32 {
        let sample = Sample {
            service: if i % 2 == 0 { "checkout" } else { "search" },
            instance: i % 7,
            latency_ms: ((i * 37) % 250) as i64,
        };
        let now = chrono::Utc::now().timestamp_millis();
        feed.send(Record::new(sample, now)).await?;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    drop(feed);

    // Let the last window pass its end.
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    pipeline.close().await?;

    while let Ok(err) = errors.try_recv() {
        eprintln!("operator fault: {}", err);
    }

    for result in results.value() {
        println!("window ending at {}", result.timestamp().unwrap_or_default() + 1);
        let mut groups: Vec<_> = result.data().iter().collect();
        groups.sort_by(|a, b| a.0.cmp(b.0));
        for (service, entries) in groups {
            let ranked: Vec<String> = entries
                .iter()
                .map(|t| format!("{}={}ms", t.record.data().instance, t.sort_key))
                .collect();
            println!("  {:<10} {}", service, ranked.join(", "));
        }
    }

    println!("{}", serde_json::to_string_pretty(&pipeline.stats())?);
    Ok(())
}
