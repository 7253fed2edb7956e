use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use billvision::dataset::{self, roboflow};
use billvision::detection::render::Renderer;
use billvision::{
    BundleMetadata, ClassLabels, Classifier, Config, Detector, LabelMap, ModelBundle, TensorLayout,
    labels, partition, preprocess, record,
};

#[derive(Parser)]
#[command(name = "billvision")]
#[command(about = "Inspect bill datasets, package models and run bill recognition")]
struct Cli {
    /// TOML configuration file (defaults to $BILLVISION_CONFIG)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify a single image and print the predicted bill
    Classify {
        /// Path to input image file
        #[arg(value_name = "IMAGE")]
        image: Option<PathBuf>,

        /// ONNX classifier model (overrides the config)
        #[arg(long, value_name = "FILE")]
        model: Option<PathBuf>,

        /// labels.txt with one class per line
        #[arg(long, value_name = "FILE")]
        labels: Option<PathBuf>,

        /// Model bundle carrying its own labels (instead of --model)
        #[arg(long, value_name = "FILE", conflicts_with = "model")]
        bundle: Option<PathBuf>,
    },

    /// Detect bills, print them and save an annotated copy of the image
    Detect {
        /// Path to input image file
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// ONNX YOLOv8 model (overrides the config)
        #[arg(long, value_name = "FILE")]
        model: Option<PathBuf>,

        /// labels.txt with one class per line
        #[arg(long, value_name = "FILE")]
        labels: Option<PathBuf>,

        /// Minimum confidence to keep a detection
        #[arg(long)]
        threshold: Option<f32>,

        /// Directory for the annotated image
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Font used to write labels on the image
        #[arg(long, value_name = "FILE")]
        font: Option<PathBuf>,
    },

    /// Print the entries of a label map
    Labels {
        #[arg(value_name = "LABEL_MAP")]
        label_map: PathBuf,
    },

    /// Check a label map and TFRecord class labels against each other
    CheckDataset {
        #[arg(value_name = "LABEL_MAP")]
        label_map: PathBuf,

        /// TFRecord files whose class labels should be checked
        #[arg(long = "records", value_name = "FILE")]
        records: Vec<PathBuf>,

        /// Smallest valid class id
        #[arg(long, default_value_t = 1)]
        min_id: i64,

        /// Largest valid class id (defaults to the number of entries)
        #[arg(long)]
        max_id: Option<i64>,
    },

    /// Count the records in a TFRecord file
    CountRecords {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the first examples of a TFRecord file
    InspectRecords {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Package a model with its labels, or show a packaged model
    Bundle {
        #[command(subcommand)]
        action: BundleCommand,
    },

    /// Download the training dataset export if it is not present
    FetchDataset,
}

#[derive(Subcommand)]
enum BundleCommand {
    /// Write a bundle from a model and a label list
    Pack {
        #[arg(value_name = "MODEL")]
        model: PathBuf,

        /// Output bundle path
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// labels.txt with one class per line
        #[arg(long, value_name = "FILE")]
        labels: Option<PathBuf>,

        /// Take labels from a label map instead
        #[arg(long, value_name = "FILE", conflicts_with = "labels")]
        label_map: Option<PathBuf>,

        #[arg(long, default_value = "bill_classifier")]
        name: String,

        #[arg(long, default_value_t = 224)]
        input_size: u32,

        #[arg(long, value_enum, default_value_t = LayoutArg::Nhwc)]
        layout: LayoutArg,

        #[arg(long, default_value_t = 0.0)]
        norm_mean: f32,

        #[arg(long, default_value_t = 1.0)]
        norm_std: f32,
    },

    /// Print a bundle's metadata and labels
    Show {
        #[arg(value_name = "BUNDLE")]
        bundle: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    Nhwc,
    Nchw,
}

impl From<LayoutArg> for TensorLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Nhwc => TensorLayout::Nhwc,
            LayoutArg::Nchw => TensorLayout::Nchw,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;

    match args.command {
        Command::Classify {
            image,
            model,
            labels,
            bundle,
        } => {
            let Some(image) = image else {
                eprintln!("Usage: billvision classify <IMAGE>");
                std::process::exit(1);
            };
            classify(&config, &image, model, labels, bundle)
        }
        Command::Detect {
            image,
            model,
            labels,
            threshold,
            output_dir,
            font,
        } => detect(&config, &image, model, labels, threshold, output_dir, font),
        Command::Labels { label_map } => {
            let map = LabelMap::load(&label_map)
                .with_context(|| format!("failed to load label map {:?}", label_map))?;
            println!("Loaded {} labels from {}", map.len(), label_map.display());
            for entry in &map {
                println!("{}", entry);
            }
            Ok(())
        }
        Command::CheckDataset {
            label_map,
            records,
            min_id,
            max_id,
        } => check_dataset(&label_map, &records, min_id, max_id),
        Command::CountRecords { file } => {
            let count = record::count(&file)
                .with_context(|| format!("failed to read TFRecord file {:?}", file))?;
            println!("Total number of items in the TFRecord file: {}", count);
            Ok(())
        }
        Command::InspectRecords { file, limit } => {
            let examples = dataset::read_examples(&file, limit)
                .with_context(|| format!("failed to read TFRecord file {:?}", file))?;
            for (offset, example) in examples {
                println!("# record at byte {}", offset);
                println!("{}", example);
            }
            Ok(())
        }
        Command::Bundle { action } => run_bundle(action),
        Command::FetchDataset => {
            match roboflow::ensure_dataset(&config.dataset)? {
                roboflow::DatasetStatus::Present(dir) => {
                    println!("Dataset directory '{}' found locally. Skipping download.", dir.display())
                }
                roboflow::DatasetStatus::Downloaded(archive) => {
                    println!("Dataset export downloaded to: {}", archive.display())
                }
            }
            Ok(())
        }
    }
}

fn classify(
    config: &Config,
    image: &Path,
    model: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    bundle: Option<PathBuf>,
) -> anyhow::Result<()> {
    let classifier = match bundle {
        Some(bundle_path) => {
            let bundle = ModelBundle::open(&bundle_path)
                .with_context(|| format!("failed to open bundle {:?}", bundle_path))?;
            Classifier::from_bundle(&bundle)?
        }
        None => {
            let settings = &config.classifier;
            let model = model
                .or_else(|| settings.model_path.clone())
                .ok_or_else(|| anyhow!("no classifier model given (use --model or the config file)"))?;
            let labels_path = labels_path.or_else(|| settings.labels_path.clone());
            let labels = labels::load_or_default(labels_path.as_deref())?;
            Classifier::open(&model, labels, settings)?
        }
    };

    let img = preprocess::open_image(image)?;
    let prediction = classifier.classify(&img)?;
    println!("{}", prediction);
    classifier.close();
    Ok(())
}

fn detect(
    config: &Config,
    image: &Path,
    model: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    threshold: Option<f32>,
    output_dir: Option<PathBuf>,
    font: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut settings = config.detector.clone();
    if let Some(t) = threshold {
        if !(0.0..=1.0).contains(&t) {
            bail!("threshold {} is outside [0, 1]", t);
        }
        settings.confidence_threshold = t;
    }
    let model = model
        .or_else(|| settings.model_path.clone())
        .ok_or_else(|| anyhow!("no detector model given (use --model or the config file)"))?;
    let labels_path = labels_path.or_else(|| settings.labels_path.clone());
    let labels = labels::load_or_default(labels_path.as_deref())?;

    let font = font.or_else(|| settings.font_path.clone());
    let renderer = Renderer::for_font(font.as_deref())?;

    let detector = Detector::open(&model, labels, &settings)?;
    let img = preprocess::open_image(image)?;
    let detections = detector.detect(&img)?;
    detector.close();

    println!("Found {} potential detections.", detections.len());
    let threshold = settings.confidence_threshold;
    let split = partition(detections, threshold);
    for d in &split.accepted {
        println!(
            "  Detected: {} (Confidence: {:.2}) at [{}, {}, {}, {}]",
            d.class_name, d.confidence, d.bbox.x1, d.bbox.y1, d.bbox.x2, d.bbox.y2
        );
    }
    for d in &split.rejected {
        println!(
            "  Skipped: {} (Confidence: {:.2}) - Below threshold {}",
            d.class_name, d.confidence, threshold
        );
    }

    let mut canvas = img.to_rgb8();
    renderer.draw(&mut canvas, &split.annotations());

    let output_dir = output_dir.unwrap_or(settings.output_dir);
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create output directory {:?}", output_dir))?;
    let file_name = image
        .file_name()
        .ok_or_else(|| anyhow!("image path {:?} has no file name", image))?;
    let output_path = output_dir.join(format!("predicted_{}", file_name.to_string_lossy()));
    canvas
        .save(&output_path)
        .map_err(|e| anyhow!("Failed to save annotated image: {}", e))?;
    println!("Saved annotated image to {}", output_path.display());
    Ok(())
}

fn check_dataset(
    label_map: &Path,
    records: &[PathBuf],
    min_id: i64,
    max_id: Option<i64>,
) -> anyhow::Result<()> {
    let map = LabelMap::load(label_map)
        .with_context(|| format!("failed to load label map {:?}", label_map))?;
    let max_id = max_id.unwrap_or(map.len() as i64);

    let report = dataset::check_label_map(&map, min_id..=max_id);
    println!("{}", report);
    let mut clean = report.is_clean();

    for path in records {
        println!("\n=== {} ===", path.display());
        let report = dataset::check_records(path, &map)
            .with_context(|| format!("failed to scan {:?}", path))?;
        println!("{}", report);
        clean &= report.is_clean();
    }

    if !clean {
        bail!("dataset check found problems");
    }
    Ok(())
}

fn run_bundle(action: BundleCommand) -> anyhow::Result<()> {
    match action {
        BundleCommand::Pack {
            model,
            output,
            labels,
            label_map,
            name,
            input_size,
            layout,
            norm_mean,
            norm_std,
        } => {
            let labels = match (labels, label_map) {
                (Some(path), _) => Some(ClassLabels::load(&path)?),
                (None, Some(path)) => Some(ClassLabels::from_label_map(&LabelMap::load(&path)?)),
                (None, None) => None,
            };
            let metadata = BundleMetadata {
                name,
                input_size,
                layout: layout.into(),
                norm_mean,
                norm_std,
                labels_file: None,
            };
            let bundle = ModelBundle::pack(&model, labels, metadata, &output)?;
            println!("{}", bundle.metadata_json()?);
            Ok(())
        }
        BundleCommand::Show { bundle } => {
            let bundle = ModelBundle::open(&bundle)
                .with_context(|| format!("failed to open bundle {:?}", bundle))?;
            println!("{}", bundle.metadata_json()?);
            match bundle.labels() {
                Some(labels) => {
                    println!("Class labels from the model bundle:");
                    for name in labels.names() {
                        println!("{}", name);
                    }
                }
                None => println!("No labels found in the model metadata."),
            }
            Ok(())
        }
    }
}
