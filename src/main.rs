use clap::Parser;
use std::path::PathBuf;
use sukashi::config::WatermarkOptions;
use sukashi::dom::{Document, IMAGE_TAG};
use sukashi::engine::WatermarkEngine;
use sukashi::glyph::Typeface;

/// Sukashi - overlay a repeating rotated text watermark on image files
#[derive(Parser, Debug)]
#[command(name = "sukashi")]
#[command(version, about, long_about = None)]
struct Args {
    /// Watermark text
    #[arg(short, long)]
    text: String,

    /// Optional YAML file with watermark options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory watermarked copies are written to
    #[arg(short, long, default_value = "watermarked")]
    out_dir: PathBuf,

    /// Optional TTF/OTF font for the overlay text (system fonts are probed
    /// otherwise, with an embedded bitmap font as fallback)
    #[arg(long)]
    font: Option<PathBuf>,

    /// Image files to watermark
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Initialize logging subsystem
    sukashi::logging::init_subscriber().expect("Failed to initialize logging subsystem");

    let args = Args::parse();

    let options: Option<WatermarkOptions> = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("Failed to read options file {}: {}", path.display(), e);
                std::process::exit(1);
            });
            let parsed = serde_yaml::from_str(&raw).unwrap_or_else(|e| {
                eprintln!("Failed to parse options file {}: {}", path.display(), e);
                std::process::exit(1);
            });
            Some(parsed)
        }
        None => None,
    };

    let typeface = match &args.font {
        Some(path) => Typeface::from_file(path).unwrap_or_else(|e| {
            eprintln!("Failed to load font: {}", e);
            std::process::exit(1);
        }),
        None => Typeface::system(),
    };

    let engine = WatermarkEngine::builder()
        .typeface(typeface)
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize engine: {}", e);
            std::process::exit(1);
        });

    std::fs::create_dir_all(&args.out_dir).unwrap_or_else(|e| {
        eprintln!(
            "Failed to create output directory {}: {}",
            args.out_dir.display(),
            e
        );
        std::process::exit(1);
    });

    tracing::info!(
        text = %args.text,
        images = args.images.len(),
        out_dir = %args.out_dir.display(),
        "starting watermark pass"
    );

    // Stage every input file as an image element of one document
    let document = Document::new();
    let mut staged = Vec::new();
    for path in &args.images {
        let image = document.create_element(IMAGE_TAG);
        image.set_src(path.display().to_string());
        document.root().append_child(&image);
        staged.push((path.clone(), image));
    }

    let handle = engine.add_watermark(&document, &args.text, options).await;

    let mut written = 0usize;
    for (path, element) in &staged {
        let source = element.src().unwrap_or_default();
        match engine.resource_store().get(&source) {
            Some(bytes) => {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("image");
                let output = args.out_dir.join(format!("{stem}.watermarked.png"));
                match std::fs::write(&output, &bytes) {
                    Ok(()) => {
                        tracing::info!(
                            input = %path.display(),
                            output = %output.display(),
                            "image watermarked"
                        );
                        written += 1;
                    }
                    Err(e) => {
                        tracing::error!(
                            output = %output.display(),
                            error = %e,
                            "failed to write output"
                        );
                    }
                }
            }
            None => {
                tracing::warn!(input = %path.display(), "image left untouched");
            }
        }
    }

    handle.stop();
    tracing::info!(total = staged.len(), written, "watermark pass finished");

    if written == 0 {
        std::process::exit(1);
    }
}
