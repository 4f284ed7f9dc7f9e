//! Dataset listing and preparation.
//!
//! Raw captures live in `<source>/<person>_<condition>/` folders (e.g.
//! `damien_glasses/`). Preparation resizes every image to a fixed square and
//! splits each person's images into `<output>/<person>/{train,test}/`, with
//! the condition prefixed onto the file name so it survives the merge.

use image::imageops::FilterType;
use image::DynamicImage;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extensions accepted as dataset images.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Extensions accepted by the upload endpoint.
pub const UPLOAD_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "bmp"];

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("train ratio must be within [0, 1], got {0}")]
    InvalidRatio(f64),
    #[error("image size must be non-zero")]
    ZeroSize,
}

fn extension_in(name: &str, allowed: &[&str]) -> bool {
    match name.rsplit_once('.') {
        Some((_, ext)) => allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// True if the file name carries one of [`IMAGE_EXTENSIONS`].
pub fn is_image_file(name: &str) -> bool {
    extension_in(name, &IMAGE_EXTENSIONS)
}

/// True if an uploaded file name carries one of [`UPLOAD_EXTENSIONS`].
pub fn is_upload_allowed(name: &str) -> bool {
    extension_in(name, &UPLOAD_EXTENSIONS)
}

/// Image files directly inside `dir`, sorted by path.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let read_err = |source| DatasetError::Read {
        path: dir.to_path_buf(),
        source,
    };

    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if is_image_file(name) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

#[derive(Debug, Clone)]
pub struct PrepareOptions {
    /// Output images are `size × size`.
    pub size: u32,
    /// Fraction of each person's images that go to `train/`.
    pub train_ratio: f64,
    /// Shuffle seed; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            size: 128,
            train_ratio: 0.8,
            seed: None,
        }
    }
}

/// Per-person outcome of [`prepare_dataset`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonSplit {
    pub person: String,
    pub train: usize,
    pub test: usize,
}

struct PreparedImage {
    image: DynamicImage,
    condition: String,
    file_name: String,
}

/// Split a `<person>_<condition>` folder name at the first `_`.
///
/// The condition keeps any further underscores so that `ana_dark_room` and
/// `ana_dark_hall` stay distinct in output file names.
fn parse_folder_name(name: &str) -> Option<(&str, &str)> {
    let (person, condition) = name.split_once('_')?;
    if person.is_empty() || condition.is_empty() {
        return None;
    }
    Some((person, condition))
}

/// Index at which a shuffled list of `n` items is cut into train/test.
fn train_count(n: usize, ratio: f64) -> usize {
    ((n as f64) * ratio).floor() as usize
}

/// Resize and split raw captures into per-person train/test directories.
pub fn prepare_dataset(
    source: &Path,
    output: &Path,
    options: &PrepareOptions,
) -> Result<Vec<PersonSplit>, DatasetError> {
    if !(0.0..=1.0).contains(&options.train_ratio) {
        return Err(DatasetError::InvalidRatio(options.train_ratio));
    }
    if options.size == 0 {
        return Err(DatasetError::ZeroSize);
    }

    let mut folders: Vec<PathBuf> = std::fs::read_dir(source)
        .map_err(|e| DatasetError::Read {
            path: source.to_path_buf(),
            source: e,
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    folders.sort();

    let mut by_person: BTreeMap<String, Vec<PreparedImage>> = BTreeMap::new();

    for folder in &folders {
        let Some(folder_name) = folder.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((person, condition)) = parse_folder_name(folder_name) else {
            tracing::warn!(folder = folder_name, "expected <person>_<condition>, skipping");
            continue;
        };

        for path in list_images(folder)? {
            let file_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            let img = match image::open(&path) {
                Ok(img) => img,
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "unreadable image, skipping");
                    continue;
                }
            };
            let resized = img.resize_exact(options.size, options.size, FilterType::Triangle);
            by_person.entry(person.to_string()).or_default().push(PreparedImage {
                image: DynamicImage::ImageRgb8(resized.to_rgb8()),
                condition: condition.to_string(),
                file_name,
            });
        }
    }

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut summary = Vec::with_capacity(by_person.len());
    for (person, mut images) in by_person {
        images.shuffle(&mut rng);
        let cut = train_count(images.len(), options.train_ratio);
        let (train, test) = images.split_at(cut);

        let person_dir = output.join(&person);
        write_split(&person_dir.join("train"), train)?;
        write_split(&person_dir.join("test"), test)?;

        tracing::info!(person = %person, train = train.len(), test = test.len(), "split written");
        summary.push(PersonSplit {
            person,
            train: train.len(),
            test: test.len(),
        });
    }

    Ok(summary)
}

fn write_split(dir: &Path, images: &[PreparedImage]) -> Result<(), DatasetError> {
    std::fs::create_dir_all(dir).map_err(|source| DatasetError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    for item in images {
        let path = dir.join(format!("{}_{}", item.condition, item.file_name));
        item.image
            .save(&path)
            .map_err(|source| DatasetError::Write { path, source })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(path: &Path, w: u32, h: u32) {
        image::RgbImage::from_pixel(w, h, image::Rgb([200, 100, 50]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file("a.jpg"));
        assert!(is_image_file("a.JPEG"));
        assert!(is_image_file("photo.v2.png"));
        assert!(is_image_file("scan.bmp"));
        assert!(!is_image_file("anim.gif"));
        assert!(!is_image_file("notes.txt"));
        assert!(!is_image_file("jpg"));
    }

    #[test]
    fn test_is_upload_allowed() {
        assert!(is_upload_allowed("face.gif"));
        assert!(is_upload_allowed("face.PNG"));
        assert!(!is_upload_allowed("face.webp"));
        assert!(!is_upload_allowed("face"));
    }

    #[test]
    fn test_list_images_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("b.png"), 2, 2);
        write_png(&dir.path().join("a.png"), 2, 2);
        std::fs::write(dir.path().join("c.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("d.png")).unwrap();

        let images = list_images(dir.path()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.png", "b.png"]);
    }

    #[test]
    fn test_list_images_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            list_images(&dir.path().join("missing")),
            Err(DatasetError::Read { .. })
        ));
    }

    #[test]
    fn test_parse_folder_name() {
        assert_eq!(parse_folder_name("damien_glasses"), Some(("damien", "glasses")));
        assert_eq!(parse_folder_name("oliwer_dark_room"), Some(("oliwer", "dark_room")));
        assert_eq!(parse_folder_name("misc"), None);
        assert_eq!(parse_folder_name("_x"), None);
        assert_eq!(parse_folder_name("ana_"), None);
    }

    #[test]
    fn test_train_count() {
        assert_eq!(train_count(10, 0.8), 8);
        assert_eq!(train_count(5, 0.8), 4);
        assert_eq!(train_count(1, 0.8), 0);
        assert_eq!(train_count(0, 0.8), 0);
    }

    #[test]
    fn test_prepare_dataset_splits_and_resizes() {
        let source = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        let glasses = source.path().join("damien_glasses");
        let plain = source.path().join("damien_plain");
        let other = source.path().join("oliwer_plain");
        for dir in [&glasses, &plain, &other] {
            std::fs::create_dir(dir).unwrap();
        }
        for i in 0..6 {
            write_png(&glasses.join(format!("g{i}.png")), 300, 200);
        }
        for i in 0..4 {
            write_png(&plain.join(format!("p{i}.png")), 64, 64);
        }
        write_png(&other.join("o0.png"), 10, 10);
        std::fs::create_dir(source.path().join("unlabelled")).unwrap();

        let options = PrepareOptions {
            seed: Some(7),
            ..PrepareOptions::default()
        };
        let summary = prepare_dataset(source.path(), output.path(), &options).unwrap();

        assert_eq!(
            summary,
            vec![
                PersonSplit { person: "damien".into(), train: 8, test: 2 },
                PersonSplit { person: "oliwer".into(), train: 0, test: 1 },
            ]
        );

        let train = list_images(&output.path().join("damien").join("train")).unwrap();
        let test = list_images(&output.path().join("damien").join("test")).unwrap();
        assert_eq!(train.len() + test.len(), 10);

        let sample = image::open(&train[0]).unwrap();
        assert_eq!((sample.width(), sample.height()), (128, 128));

        let name = train[0].file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("glasses_") || name.starts_with("plain_"), "{name}");
        assert!(!output.path().join("unlabelled").exists());
    }

    #[test]
    fn test_prepare_dataset_is_reproducible_with_seed() {
        let source = tempfile::tempdir().unwrap();
        let dir = source.path().join("ana_day");
        std::fs::create_dir(&dir).unwrap();
        for i in 0..10 {
            write_png(&dir.join(format!("{i}.png")), 4, 4);
        }

        let options = PrepareOptions { size: 8, train_ratio: 0.5, seed: Some(42) };
        let out_a = tempfile::tempdir().unwrap();
        let out_b = tempfile::tempdir().unwrap();
        prepare_dataset(source.path(), out_a.path(), &options).unwrap();
        prepare_dataset(source.path(), out_b.path(), &options).unwrap();

        let names = |root: &Path| -> Vec<String> {
            list_images(&root.join("ana").join("test"))
                .unwrap()
                .iter()
                .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
                .collect()
        };
        assert_eq!(names(out_a.path()), names(out_b.path()));
    }

    #[test]
    fn test_prepare_dataset_keeps_multi_word_conditions_apart() {
        let source = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        for folder in ["ana_dark_room", "ana_dark_hall"] {
            let dir = source.path().join(folder);
            std::fs::create_dir(&dir).unwrap();
            write_png(&dir.join("0.png"), 4, 4);
            write_png(&dir.join("1.png"), 4, 4);
        }

        let options = PrepareOptions { size: 8, train_ratio: 1.0, seed: Some(1) };
        let summary = prepare_dataset(source.path(), output.path(), &options).unwrap();
        assert_eq!(summary, vec![PersonSplit { person: "ana".into(), train: 4, test: 0 }]);

        let names: Vec<String> = list_images(&output.path().join("ana").join("train"))
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["dark_hall_0.png", "dark_hall_1.png", "dark_room_0.png", "dark_room_1.png"]
        );
    }

    #[test]
    fn test_prepare_dataset_rejects_bad_ratio() {
        let source = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let options = PrepareOptions { train_ratio: 1.5, ..PrepareOptions::default() };
        assert!(matches!(
            prepare_dataset(source.path(), output.path(), &options),
            Err(DatasetError::InvalidRatio(_))
        ));
    }
}
