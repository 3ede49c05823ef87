// image_brightness - print the brightness score of an image file

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "image_brightness", version, about = "Histogram brightness of an image")]
struct Args {
    /// Image to score
    image: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let brightness = pigeon_cam::brightness_from_path(&args.image)
        .with_context(|| format!("Failed to score {}", args.image.display()))?;
    println!("{}", brightness);

    Ok(())
}
