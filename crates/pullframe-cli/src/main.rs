//! `pullframe-cli` — opens a media file, prints its probed info, and
//! walks `get_frame` at a fixed step writing PNG snapshots. Thin
//! option-bag wiring around `pullframe-media::MediaProvider`, not a
//! player.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use pullframe_core::{DecodedFrame, FramePayload, PipelineOptions, PixelFormat};
use pullframe_media::MediaProvider;

#[derive(Parser, Debug)]
#[command(name = "pullframe", version)]
struct Args {
    /// Path to the input media file.
    input: PathBuf,

    /// Directory snapshots are written into.
    #[arg(long, default_value = "snapshots")]
    out_dir: PathBuf,

    /// Microseconds between successive snapshots.
    #[arg(long, default_value_t = 1_000_000)]
    step_us: i64,

    /// Number of snapshots to take.
    #[arg(long, default_value_t = 5)]
    count: u32,
}

fn main() -> Result<()> {
    ffmpeg_the_third::init().context("FFmpeg init failed")?;

    let args = Args::parse();
    std::fs::create_dir_all(&args.out_dir)?;

    let mut provider = MediaProvider::open(&args.input, PipelineOptions::default());

    match provider.info() {
        Some(info) => eprintln!(
            "[pullframe] {}x{} duration={}us image={}",
            info.width, info.height, info.duration_us, info.is_image
        ),
        None => eprintln!("[pullframe] warning: could not probe {}", args.input.display()),
    }

    for i in 0..args.count {
        let t = i as i64 * args.step_us;
        let Some(frame) = provider.get_frame(t) else {
            eprintln!("[pullframe] no frame at t={t}us, stopping");
            break;
        };
        let dest = args.out_dir.join(format!("frame_{i:04}_{}us.png", frame.pts));
        save_png(&frame, &dest)?;
        eprintln!("[pullframe] snapshot saved -> {}", dest.display());
    }

    Ok(())
}

fn save_png(frame: &DecodedFrame, dest: &PathBuf) -> Result<()> {
    let FramePayload::Planar { planes, linesizes } = &frame.payload else {
        anyhow::bail!("cannot snapshot a hardware-surface frame without a software readback");
    };
    let rgba = match frame.pixel_format {
        PixelFormat::Rgba => planes[0].clone(),
        PixelFormat::Bgra => bgra_to_rgba(&planes[0]),
        other => anyhow::bail!("snapshot output only supports Rgba/Bgra, got {other:?}"),
    };
    let stride = linesizes[0];
    let row_bytes = frame.width as usize * 4;

    use std::io::BufWriter;
    let file = std::fs::File::create(dest)?;
    let w = &mut BufWriter::new(file);
    let mut encoder = png::Encoder::new(w, frame.width, frame.height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    let rows: Vec<&[u8]> = (0..frame.height as usize)
        .map(|row| &rgba[row * stride..row * stride + row_bytes])
        .collect();
    writer.write_image_data(&rows.concat())?;
    Ok(())
}

fn bgra_to_rgba(src: &[u8]) -> Vec<u8> {
    let mut out = src.to_vec();
    for px in out.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    out
}
