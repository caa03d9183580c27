// exercise-tutor/crates/exercise-tutor/src/main.rs

#[cfg(feature = "cli")]
use exercise_tutor::{config::Config, run_server};

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env()?;
    run_server(cfg).await
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
