use anyhow::Result;
use clap::Parser;
use framecap::capture::Display;
use framecap::config::DEFAULT_IMAGE;
use framecap::detect::BlobParams;
use framecap::still::{annotate_file, output_path_for};
use framecap_desktop::init_tracing;
use framecap_desktop::window::WindowDisplay;
use std::path::PathBuf;

/// Mark the blobs of a still image and save the annotated copy.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct CmdArgs {
    /// Image to read
    #[arg(value_name = "FILE", default_value = DEFAULT_IMAGE)]
    input: PathBuf,

    /// Where to write the result. Defaults to `<stem>_grayscale.<ext>` next to the input
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Skip the preview window
    #[arg(long)]
    no_preview: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let args = CmdArgs::parse();

    let output = args
        .output
        .unwrap_or_else(|| output_path_for(&args.input));

    let mut window = WindowDisplay::new("grayscale image");
    let preview = match args.no_preview {
        true => None,
        false => Some(&mut window as &mut dyn Display),
    };

    annotate_file(&args.input, &output, BlobParams::default(), preview)?;
    Ok(())
}
