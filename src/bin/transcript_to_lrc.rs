//! Convert a timestamped transcript into LRC without any rewording.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use lyrics_pipeline::artifacts::{read_text, write_text_atomic};
use lyrics_pipeline::lrc::{count_timed_lines, transcript_to_lrc, LrcHeader};
use lyrics_pipeline::transcript::Transcript;

#[derive(Parser)]
#[command(name = "transcript-to-lrc")]
#[command(about = "Mechanically convert a timestamped transcript into LRC")]
struct Args {
    transcript: PathBuf,

    /// Output file; prints to stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    artist: Option<String>,

    #[arg(long)]
    album: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let start = Instant::now();

    let text = read_text(&args.transcript)?;
    let transcript = Transcript::parse(&text);
    if transcript.is_empty() {
        bail!("No segments found in {}", args.transcript.display());
    }

    let header = LrcHeader {
        title: args.title,
        artist: args.artist,
        album: args.album,
    };
    let lrc = header.apply(&transcript_to_lrc(&transcript));

    match &args.output {
        Some(path) => {
            write_text_atomic(path, &lrc)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "Wrote {} lines to {} in {:?}",
                count_timed_lines(&lrc),
                path.display(),
                start.elapsed()
            );
        }
        None => print!("{}", lrc),
    }
    Ok(())
}
