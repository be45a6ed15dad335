//! Background eraser CLI tool
//!
//! Removes image backgrounds with an ONNX segmentation model and exports the
//! cut-outs as PNG and JPEG.

#[cfg(feature = "cli")]
use bg_eraser::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
