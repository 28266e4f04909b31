//! Minimal chassis application: bootstrap, log, run some pool work, render a
//! small chart, dismiss.
//!
//! Run with an optional project directory:
//!
//! ```text
//! cargo run --example minimal -- /path/to/project -V -E
//! ```

use chassis::prelude::*;

fn main() {
    tracing_subscriber::fmt().init();

    let mut context = Bootstrap::new("Minimal")
        .args(std::env::args().collect::<Vec<_>>())
        .capabilities(CapabilitySet::minimal().with_workers().with_text())
        .on_teardown(|log| {
            log.info("Demo teardown hook ran.");
            Ok(())
        })
        .start();

    if !context.is_log_open() {
        eprintln!("ERROR: The application logger was unable to start, Minimal will not execute.");
        return;
    }
    context.log.info("Minimal demo is starting.");
    if !context.is_valid() {
        context
            .log
            .warn("WARNING: No valid configuration was found, running on defaults.");
    }

    for i in 0..8u64 {
        let log = context.log.clone();
        context.submit(move || {
            log.info(format!("job {i}: {i} squared is {}", i * i));
        });
    }
    context.wait_until_pool_empty();

    if let Some(renderer) = context.renderer() {
        let rows = [("stick", 33.4), ("switch", 66.6)];
        for line in renderer.banner("WIN RATES") {
            context.log.info(line);
        }
        for line in renderer.bar_chart(&rows) {
            context.log.info(line);
        }
    }

    context.show_stats();
    context.dismiss();
}
