//! Per-scope rate limiting through the registry.

use shardrate::{KeyedLimiterRegistry, LimiterConfig};

fn main() {
    // Every scope gets its own sharded limiter built from this template:
    // bursts of 3, one token per second per identifier.
    let config = LimiterConfig::per_second(1).with_burst_capacity(3);
    let registry = KeyedLimiterRegistry::new(config).unwrap();

    let client = b"203.0.113.9";

    // The same client draws from separate budgets per scope
    for scope in ["login", "search", "export"] {
        let mut admitted = 0;
        while registry.take_token(scope, client) {
            admitted += 1;
        }
        println!("scope {scope:>7}: admitted {admitted} before limiting kicked in");
    }

    let stats = registry.stats();
    println!(
        "registry: {} active scopes ({} created, {} removed, bound {})",
        stats.active_scopes, stats.total_created, stats.total_removed, stats.max_scopes
    );
}
