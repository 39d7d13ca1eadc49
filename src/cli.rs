// ============================================================================
// IntraPaint CLI - headless layer compositing via command-line arguments
// ============================================================================
//
// Usage examples:
//   intrapaint -i photo.png -o out.png
//   intrapaint -i base.png "overlays/*.png" -o merged.png --canvas 1024x768+32+0
//   intrapaint -i photo.png --scale 256x256 --generation-area 0,0,128,128 \
//              --crop-generation-area -o patch.png
//   intrapaint -i a.png b.png -o flat.png --flatten --layers-dir layers/
//
// The first input becomes the image (and fixes its size); every further input is
// stacked above it as a new layer. All edits go through the same undoable stack the
// editor uses.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::config::EditorConfig;
use crate::error::Result;
use crate::geometry::{IntPoint, IntRect, IntSize};
use crate::image_stack::ImageStack;
use crate::io::{load_image, save_image_with_quality};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// IntraPaint headless layer compositor.
#[derive(Parser, Debug)]
#[command(
    name = "intrapaint",
    about = "IntraPaint headless layer compositor",
    long_about = "Stack image files as layers, resize or scale the canvas, and write the\n\
                  merged result or the generation area without opening the editor.\n\n\
                  Example:\n  \
                  intrapaint -i base.png overlay.png -o merged.png\n  \
                  intrapaint -i photo.png --generation-area 64,64,256,256 --crop-generation-area -o patch.png"
)]
pub struct CliArgs {
    /// Input file(s), bottom layer first. Glob patterns accepted (e.g. "layers/*.png").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output image path. The format is inferred from the extension, defaulting to PNG.
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Resize the canvas without scaling content: WIDTHxHEIGHT[+X+Y].
    #[arg(long, value_name = "WxH+X+Y", value_parser = parse_canvas)]
    pub canvas: Option<(IntSize, IntPoint)>,

    /// Scale the whole image, layers and selection included: WIDTHxHEIGHT.
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    pub scale: Option<IntSize>,

    /// Generation area as X,Y,WIDTH,HEIGHT. Clamped to the image and the configured limits.
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_rect)]
    pub generation_area: Option<IntRect>,

    /// Merge every layer down into the bottom one before writing.
    #[arg(long)]
    pub flatten: bool,

    /// Write only the generation area instead of the full image.
    #[arg(long)]
    pub crop_generation_area: bool,

    /// Also write every image layer, cropped to the image bounds, into this directory.
    #[arg(long, value_name = "DIR")]
    pub layers_dir: Option<PathBuf>,

    /// JPEG quality (1-100, default 90).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// Editor configuration file. Defaults to the per-user configuration when present.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Mirror log output to stderr and print the edit history.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process arguments.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the compositing job and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    let config = load_config(args.config.as_deref());
    let start = Instant::now();

    match run_job(&args, &inputs, config) {
        Ok(stack) => {
            if args.verbose {
                for (i, description) in stack.history().undo_history().iter().enumerate() {
                    println!("  [{}] {}", i + 1, description);
                }
                println!(
                    "  → {} ({:.0}ms)",
                    args.output.display(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(%e, "compositing failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> EditorConfig {
    match path {
        Some(path) => EditorConfig::load_or_default(path),
        None => EditorConfig::config_path()
            .map(|path| EditorConfig::load_or_default(&path))
            .unwrap_or_default(),
    }
}

// ============================================================================
// Compositing pipeline
// ============================================================================

fn run_job(args: &CliArgs, inputs: &[PathBuf], config: EditorConfig) -> Result<ImageStack> {
    let mut stack = ImageStack::new(config);

    // -- Step 1: Load ----------------------------------------------------
    for (i, path) in inputs.iter().enumerate() {
        let raster = load_image(path)?;
        if i == 0 {
            stack.set_image(raster)?;
        } else {
            let name = path.file_stem().map(|s| s.to_string_lossy().into_owned());
            stack.create_layer(name.as_deref(), Some(raster), None, None, None)?;
        }
    }

    if args.flatten {
        while stack.layer_count() > 1 {
            let top = stack.layer_tree().get_layer_by_index(stack.root_id(), 0);
            if !stack.merge_layer_down(top)? {
                break;
            }
        }
    }

    // -- Step 2: Canvas edits --------------------------------------------
    if let Some((size, offset)) = args.canvas {
        stack.resize_canvas(size, offset.x, offset.y)?;
    }
    if let Some(size) = args.scale {
        stack.scale(size)?;
    }
    if let Some(rect) = args.generation_area {
        stack.set_generation_area(rect);
        tracing::info!(requested = ?rect, applied = ?stack.generation_area(), "generation area set");
    }

    // -- Step 3: Save ----------------------------------------------------
    let output = if args.crop_generation_area {
        stack.generation_area_content()?
    } else {
        stack.merged_image(true)?.into_owned()
    };
    save_image_with_quality(&output, &args.output, args.quality)?;

    if let Some(dir) = &args.layers_dir {
        write_layers(&stack, dir, args.quality)?;
    }
    Ok(stack)
}

/// Write each image layer, in root space and cropped to the image, as `NN_name.png`.
fn write_layers(stack: &ImageStack, dir: &Path, quality: u8) -> Result<()> {
    let tree = stack.layer_tree();
    for (i, id) in tree.image_layers().into_iter().enumerate() {
        let name = sanitize_file_name(&tree.layer(id)?.name);
        let content = stack.cropped_layer_content(id, stack.bounds())?;
        save_image_with_quality(&content, &dir.join(format!("{:02}_{}.png", i, name)), quality)?;
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    tracing::warn!(pattern = %pattern, "pattern matched no files");
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn parse_i32(part: &str, what: &str) -> std::result::Result<i32, String> {
    part.trim()
        .parse::<i32>()
        .map_err(|_| format!("invalid {what} '{part}'"))
}

/// `WIDTHxHEIGHT`, both positive.
fn parse_size(s: &str) -> std::result::Result<IntSize, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let size = IntSize::new(parse_i32(w, "width")?, parse_i32(h, "height")?);
    if size.is_empty() {
        return Err(format!("size must be positive, got '{s}'"));
    }
    Ok(size)
}

/// `WIDTHxHEIGHT` with an optional `+X+Y` or `-X-Y` content offset.
fn parse_canvas(s: &str) -> std::result::Result<(IntSize, IntPoint), String> {
    let Some(sign_pos) = s.find(['+', '-']) else {
        return Ok((parse_size(s)?, IntPoint::default()));
    };
    let size = parse_size(&s[..sign_pos])?;
    let offsets = &s[sign_pos..];
    let Some(split) = offsets[1..].find(['+', '-']).map(|i| i + 1) else {
        return Err(format!("expected WIDTHxHEIGHT+X+Y, got '{s}'"));
    };
    let x = parse_i32(&offsets[..split], "x offset")?;
    let y = parse_i32(&offsets[split..], "y offset")?;
    Ok((size, IntPoint::new(x, y)))
}

/// `X,Y,WIDTH,HEIGHT`.
fn parse_rect(s: &str) -> std::result::Result<IntRect, String> {
    let parts: Vec<&str> = s.split(',').collect();
    let [x, y, w, h] = parts.as_slice() else {
        return Err(format!("expected X,Y,WIDTH,HEIGHT, got '{s}'"));
    };
    Ok(IntRect::new(
        parse_i32(x, "x")?,
        parse_i32(y, "y")?,
        parse_i32(w, "width")?,
        parse_i32(h, "height")?,
    ))
}
