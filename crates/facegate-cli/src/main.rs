use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use facegate_core::dataset::{prepare_dataset, PrepareOptions};
use facegate_core::diagnostics::{diagnose, DEFAULT_SAMPLES_PER_CLASS};
use facegate_core::score::{format_percentage, DECISION_TABLE_THRESHOLDS};
use facegate_core::{
    resolve_orientation, ClassNames, ClassOrdering, OnnxClassifier, Orientation, Prediction,
    Predictor, PreprocessStrategy,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// Custom thresholds accepted in interactive mode.
const INTERACTIVE_THRESHOLD_RANGE: std::ops::RangeInclusive<f32> = 0.1..=0.9;

#[derive(Parser)]
#[command(name = "facegate", about = "Binary face classifier toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ClassArgs {
    /// Directory name of the positive (enrolled user) class
    #[arg(long, default_value = "user")]
    positive: String,
    /// Directory name of the negative class
    #[arg(long, default_value = "others")]
    negative: String,
}

impl ClassArgs {
    fn names(&self) -> ClassNames {
        ClassNames::new(&self.positive, &self.negative)
    }
}

#[derive(Args)]
struct ModelArgs {
    /// Path to the ONNX classifier
    #[arg(short, long, default_value = "models/classifier.onnx")]
    model: PathBuf,
    /// Preprocessing the model was trained with: rgb or grayscale
    #[arg(long, default_value = "rgb")]
    preprocess: String,
    /// Square input size (defaults: 128 for rgb, 100 for grayscale)
    #[arg(long)]
    size: Option<u32>,
    /// Decision threshold on the corrected score
    #[arg(short, long, default_value_t = facegate_core::DEFAULT_THRESHOLD)]
    threshold: f32,
    #[command(flatten)]
    classes: ClassArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Report how a dataset's class labels are oriented
    Orientation {
        /// Dataset root containing the two class directories
        dataset: PathBuf,
        #[command(flatten)]
        classes: ClassArgs,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Classify a single image
    Predict {
        image: PathBuf,
        #[command(flatten)]
        model: ModelArgs,
        /// Training dataset, used to detect label orientation
        #[arg(short, long)]
        dataset: Option<PathBuf>,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Score sample images from each class and report model health
    Diagnose {
        dataset: PathBuf,
        #[command(flatten)]
        model: ModelArgs,
        /// Images to score per class
        #[arg(long, default_value_t = DEFAULT_SAMPLES_PER_CLASS)]
        samples: usize,
    },
    /// Resize raw captures and split them into train/test sets
    Prepare {
        /// Folder of <person>_<condition> subdirectories
        source: PathBuf,
        output: PathBuf,
        #[arg(long, default_value_t = 128)]
        size: u32,
        #[arg(long, default_value_t = 0.8)]
        train_ratio: f64,
        /// Shuffle seed for a reproducible split
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Classify images typed at a prompt
    Interactive {
        #[command(flatten)]
        model: ModelArgs,
        #[arg(short, long)]
        dataset: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Orientation { dataset, classes, json } => {
            let names = classes.names();
            let ordering = ClassOrdering::scan(&dataset)?;
            let orientation = ordering.orientation(&names);
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "dataset": dataset,
                        "classes": ordering.classes(),
                        "orientation": orientation,
                    })
                );
            } else {
                println!("Classes (label order): {:?}", ordering.classes());
                match orientation {
                    Orientation::Normal => println!(
                        "Orientation: normal ({}=0, {}=1)",
                        names.negative, names.positive
                    ),
                    Orientation::Inverted => println!(
                        "Orientation: inverted ({}=0, {}=1), scores will be reflected",
                        names.positive, names.negative
                    ),
                    Orientation::Unknown => {
                        println!("Orientation: unknown, scores will be used as-is")
                    }
                }
            }
        }
        Commands::Predict { image, model, dataset, json } => {
            let mut predictor = build_predictor(&model, dataset.as_deref())?;
            let prediction = predictor
                .predict_path(&image)
                .with_context(|| format!("failed to classify {}", image.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&prediction)?);
            } else {
                print_prediction(&image, &prediction);
            }
        }
        Commands::Diagnose { dataset, model, samples } => {
            let mut predictor = build_predictor(&model, None)?;
            let report = diagnose(&mut predictor, &dataset, &model.classes.names(), samples)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Prepare {
            source,
            output,
            size,
            train_ratio,
            seed,
        } => {
            let options = PrepareOptions { size, train_ratio, seed };
            let summary = prepare_dataset(&source, &output, &options)?;
            for split in &summary {
                println!("{}: {} train, {} test", split.person, split.train, split.test);
            }
            if summary.is_empty() {
                println!("No <person>_<condition> folders found in {}", source.display());
            }
        }
        Commands::Interactive { model, dataset } => {
            let mut predictor = build_predictor(&model, dataset.as_deref())?;
            run_interactive(&mut predictor)?;
        }
    }

    Ok(())
}

fn build_predictor(args: &ModelArgs, dataset: Option<&Path>) -> Result<Predictor<OnnxClassifier>> {
    let mut strategy: PreprocessStrategy = args.preprocess.parse()?;
    if let Some(size) = args.size {
        strategy = strategy.with_size(size)?;
    }

    let orientation = match dataset {
        Some(root) => match resolve_orientation(root, &args.classes.names()) {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(error = %e, "orientation detection failed, assuming normal");
                Orientation::Normal
            }
        },
        None => Orientation::Normal,
    };

    let classifier = OnnxClassifier::load(&args.model.to_string_lossy())?;
    Ok(Predictor::new(classifier, strategy, orientation).with_threshold(args.threshold))
}

fn print_prediction(image: &Path, p: &Prediction) {
    println!("Image: {}", image.display());
    println!(
        "Result: {}",
        if p.verdict.is_positive { "MATCH" } else { "NO MATCH" }
    );
    println!("Raw score: {:.4}", p.raw);
    if p.orientation == Orientation::Inverted {
        println!("Corrected score: {:.4} (labels inverted)", p.corrected);
    }
    println!("Probability: {:.4}", p.verdict.probability);
    println!("Confidence: {}", format_percentage(p.verdict.confidence));
    println!("Threshold: {}", p.threshold);
    println!("At other thresholds:");
    for (t, positive) in p.decisions_at(&DECISION_TABLE_THRESHOLDS) {
        let agrees = if positive == p.verdict.is_positive { " " } else { "!" };
        println!(
            "  {agrees} {t:.1}: {}",
            if positive { "MATCH" } else { "NO MATCH" }
        );
    }
}

/// Strip surrounding whitespace and the quotes a shell drag-and-drop adds.
fn clean_path_input(line: &str) -> String {
    line.trim().replace('"', "")
}

fn is_quit(input: &str) -> bool {
    matches!(input.to_ascii_lowercase().as_str(), "quit" | "exit" | "q")
}

fn parse_custom_threshold(input: &str) -> Result<Option<f32>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    let t: f32 = input.parse().map_err(|_| format!("invalid threshold: {input}"))?;
    if INTERACTIVE_THRESHOLD_RANGE.contains(&t) {
        Ok(Some(t))
    } else {
        Err(format!(
            "threshold must be between {} and {}",
            INTERACTIVE_THRESHOLD_RANGE.start(),
            INTERACTIVE_THRESHOLD_RANGE.end()
        ))
    }
}

fn prompt(stdin: &mut impl BufRead, message: &str) -> Result<Option<String>> {
    print!("{message}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    if stdin.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

fn run_interactive(predictor: &mut Predictor<OnnxClassifier>) -> Result<()> {
    let stdin = std::io::stdin();
    let mut stdin = stdin.lock();

    loop {
        let Some(line) = prompt(&mut stdin, "\nImage path (or 'quit'): ")? else {
            break;
        };
        let input = clean_path_input(&line);
        if is_quit(&input) {
            break;
        }
        if input.is_empty() {
            println!("Please enter a path");
            continue;
        }

        let path = PathBuf::from(&input);
        if !path.exists() {
            println!("Image not found: {}", path.display());
            continue;
        }

        match predictor.predict_path(&path) {
            Ok(p) => print_prediction(&path, &p),
            Err(e) => {
                println!("Error: {e}");
                continue;
            }
        }

        let Some(line) = prompt(&mut stdin, "Custom threshold (0.1-0.9, Enter to skip): ")? else {
            break;
        };
        match parse_custom_threshold(&line) {
            Ok(Some(t)) => match predictor.predict_path_at(&path, t) {
                Ok(p) => print_prediction(&path, &p),
                Err(e) => println!("Error: {e}"),
            },
            Ok(None) => {}
            Err(msg) => println!("{msg}"),
        }
    }

    Ok(())
}
