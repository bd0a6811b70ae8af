//! CelebA to CycleGAN converter CLI
//!
//! Splits CelebA by a single attribute into trainA/trainB/testA/testB.

#[cfg(feature = "cli")]
use celeba_cyclegan::cli;

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::main()
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
