use stress_test::{stress_test_convergence, stress_test_scaling};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            std::process::exit(1);
        }
    };
    match rt.block_on(async_main()) {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("\n✗ Replicas diverged");
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("\n✗ Stress test failed: {err}");
            std::process::exit(1);
        }
    }
}

async fn async_main() -> weft_engine::Result<bool> {
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            CONVERGENCE STRESS TESTS                        ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut ok = true;

    // Test 1: a handful of replicas
    let stats = stress_test_convergence(4, 100, 1).await?;
    stats.print();
    ok &= stats.converged;

    // Test 2: more replicas, more edits
    let stats = stress_test_convergence(10, 300, 2).await?;
    stats.print();
    ok &= stats.converged;

    // Test 3: scaling analysis
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║          SCALING ANALYSIS                                  ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    ok &= stress_test_scaling(16, 4).await?;

    if ok {
        println!("\n✓ All stress tests converged!");
    }
    Ok(ok)
}
