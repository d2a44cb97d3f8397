//! Basic usage example for the shardrate crate.

use core::time::Duration;
use shardrate::{LimiterConfig, TokenBucketLimiter};
use std::thread;

fn main() {
    println!("=== Basic Sharded Limiter Example ===\n");

    // Example 1: Burst and denial
    burst_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 2: Refill over time
    refill_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 3: Checking without consuming
    check_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 4: Monitoring metrics
    metrics_example();
}

fn burst_example() {
    println!("1. Burst Capacity:");

    // 64 buckets, bursts of 5, one token per second per identifier
    let limiter = TokenBucketLimiter::new(64, 5, 1.0, Duration::from_secs(1)).unwrap();

    println!("   Created limiter: bursts of 5, 1 token/second per identifier");

    for i in 1..=8 {
        if limiter.take_token(b"client-a") {
            println!("   Request {} - ✅ Allowed", i);
        } else {
            println!("   Request {} - ❌ Rate limited", i);
        }
    }

    // A different identifier has its own untouched budget
    if limiter.take_token(b"client-b") {
        println!("   client-b - ✅ Allowed (independent bucket)");
    }
}

fn refill_example() {
    println!("2. Token Refill:");

    // 20 tokens per second: one token every 50ms
    let config = LimiterConfig::new(64, 3, 0.05, Duration::from_secs(1));
    let limiter = TokenBucketLimiter::with_config(config).unwrap();

    println!("   Configuration: bursts of 3, 20 tokens/second");

    let mut burst = 0;
    while limiter.take_token(b"worker") {
        burst += 1;
    }
    println!("   Burst spent: {} requests admitted immediately", burst);

    println!("   Waiting 120ms for refill...");
    thread::sleep(Duration::from_millis(120));

    if limiter.take_token(b"worker") {
        println!("   ✅ Token available again after refill");
    }
}

fn check_example() {
    println!("3. Check Without Consuming:");

    let limiter = TokenBucketLimiter::new(64, 2, 1.0, Duration::from_secs(1)).unwrap();

    // check() peeks; it never takes a token
    for _ in 0..100 {
        assert!(limiter.check(b"peeker"));
    }
    println!("   100 checks later, both tokens are still there:");

    println!("   take 1: {}", limiter.take_token(b"peeker"));
    println!("   take 2: {}", limiter.take_token(b"peeker"));
    println!("   check:  {}", limiter.check(b"peeker"));
}

fn metrics_example() {
    println!("4. Monitoring and Metrics:");

    let limiter = TokenBucketLimiter::new(64, 10, 1.0, Duration::from_secs(1)).unwrap();

    // Generate some traffic against one identifier
    for _ in 0..25 {
        limiter.take_token(b"chatty-client");
    }

    let metrics = limiter.metrics();
    println!("   Admit rate: {:.2}%", metrics.admit_rate() * 100.0);
    println!("   Total requests: {}", metrics.total_requests());
    println!("   CAS retries/request: {:.3}", metrics.contention_ratio());

    let health = metrics.health_status();
    println!("   Health status: {:?}", health);
    println!("   Suggested action: {}", health.suggested_action());

    println!("\n{}", metrics.summary());
}
