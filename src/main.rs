use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use argp::{FromArgs, HelpStyle};
use topsee::{
    extract::extract_regions,
    rom::{decode_image, ChecksumCheck, Image},
};
use tracing_subscriber::EnvFilter;

#[derive(FromArgs, Debug)]
/// A tool for inspecting Topsee firmware ROM images.
struct TopLevel {
    #[argp(positional)]
    /// The ROM image to read.
    file: PathBuf,
    #[argp(option, short = 'x')]
    /// Write header.img, kernel.uimage and rootfs into this directory.
    extract: Option<PathBuf>,
}

fn print_mismatch(check: ChecksumCheck) {
    if let Some(mismatch) = check.mismatch() {
        println!("{mismatch}");
    }
}

fn print_report(image: &Image) {
    let header = image.header;
    println!("          Magic: {}", String::from_utf8_lossy(&header.magic));
    println!("Header Checksum: {:#x}", header.crc.get());
    println!("    File Length: {}", header.length.get());
    if !image.length_matches() {
        println!("                 (actual size {})", image.len());
    }
    print_mismatch(image.header_check());
    println!();

    let kernel = image.kernel;
    println!("       Kernel: {}", kernel.name());
    println!("      Unknown: {:#x}", kernel.unknown.get());
    println!("Kernel Offset: {}", kernel.offset.get());
    println!("  Kernel Size: {}", kernel.length.get());
    println!("     Checksum: {:#x}", kernel.crc.get());
    print_mismatch(image.kernel_check());
    println!();

    let rootfs = image.rootfs;
    println!("       Rootfs: {}", rootfs.name());
    println!("Rootfs Offset: {}", rootfs.offset.get());
    println!("  Rootfs Size: {}", rootfs.length.get());
    println!("     Checksum: {:#x}", rootfs.crc.get());
    print_mismatch(image.rootfs_check());
    println!();
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args: TopLevel = argp::parse_args_or_exit(&HelpStyle::default());
    let data = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let image = match decode_image(&data) {
        Ok(image) => image,
        Err(e) => {
            println!("Not a topsee rom: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };
    print_report(&image);

    if let Some(out_dir) = &args.extract {
        for path in extract_regions(&image, out_dir).context("Failed to extract image")? {
            println!("Unpacked {}", path.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}
