//! Zero-shot benchmark datasets.
//!
//! A dataset is a CSV manifest, `{data_dir}/{name}-meta.csv`, with an
//! `imgpath` column and one one-hot label column per class. Images are
//! decoded lazily, one batch at a time.

use std::path::{Path, PathBuf};

use ndarray::{Array4, Axis};

use crate::error::DataError;
use crate::model::preprocess::preprocess;

/// Column holding image paths.
const IMAGE_COLUMN: &str = "imgpath";

/// CheXpert competition classes, shared by the chexpert, mimic, and iuxray splits.
pub const CHEXPERT_COMPETITION_TASKS: &[&str] = &[
    "Atelectasis",
    "Cardiomegaly",
    "Consolidation",
    "Edema",
    "Pleural Effusion",
];

/// COVID-19 test split classes.
pub const COVID_TASKS: &[&str] = &["Normal", "COVID"];

/// A named benchmark split and the classes it is labeled with.
#[derive(Debug, Clone, Copy)]
pub struct DatasetSpec {
    pub name: &'static str,
    pub class_names: &'static [&'static str],
}

/// Known benchmark splits.
pub const DATASETS: &[DatasetSpec] = &[
    DatasetSpec {
        name: "chexpert-5x200",
        class_names: CHEXPERT_COMPETITION_TASKS,
    },
    DatasetSpec {
        name: "mimic-5x200",
        class_names: CHEXPERT_COMPETITION_TASKS,
    },
    DatasetSpec {
        name: "iuxray-5x200",
        class_names: CHEXPERT_COMPETITION_TASKS,
    },
    DatasetSpec {
        name: "covid19-test",
        class_names: COVID_TASKS,
    },
];

impl DatasetSpec {
    /// Look up a split by name.
    pub fn find(name: &str) -> Result<&'static DatasetSpec, DataError> {
        DATASETS
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| DataError::UnknownDataset {
                name: name.to_string(),
                available: DATASETS.iter().map(|d| d.name.to_string()).collect(),
            })
    }
}

/// One labeled image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub path: PathBuf,
    /// Index into the dataset's class names
    pub label: usize,
}

/// A preprocessed image batch with its labels.
#[derive(Debug, Clone)]
pub struct ImageBatch {
    /// `[n, 3, image_size, image_size]`
    pub pixels: Array4<f32>,
    pub labels: Vec<usize>,
}

/// Labeled images for zero-shot evaluation.
#[derive(Debug, Clone)]
pub struct ZeroShotDataset {
    name: String,
    class_names: Vec<String>,
    samples: Vec<Sample>,
    image_size: u32,
}

impl ZeroShotDataset {
    /// Load a known split from the data directory.
    pub fn load(data_dir: &Path, name: &str, image_size: u32) -> Result<Self, DataError> {
        let spec = DatasetSpec::find(name)?;
        let manifest = data_dir.join(format!("{name}-meta.csv"));
        let class_names = spec.class_names.iter().map(|c| c.to_string()).collect();
        let mut dataset = Self::from_manifest(&manifest, class_names, image_size)?;
        dataset.name = name.to_string();
        Ok(dataset)
    }

    /// Load a manifest labeled with the given classes.
    ///
    /// Each row's label is its first maximal class column. Relative image
    /// paths resolve against the manifest's directory.
    pub fn from_manifest(
        manifest: &Path,
        class_names: Vec<String>,
        image_size: u32,
    ) -> Result<Self, DataError> {
        if !manifest.exists() {
            return Err(DataError::NotFound(manifest.to_path_buf()));
        }
        let csv_err = |source| DataError::Csv {
            path: manifest.to_path_buf(),
            source,
        };
        let mut reader = csv::Reader::from_path(manifest).map_err(csv_err)?;
        let headers = reader.headers().map_err(csv_err)?.clone();

        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| DataError::MissingColumn {
                    path: manifest.to_path_buf(),
                    column: name.to_string(),
                })
        };
        let image_idx = column(IMAGE_COLUMN)?;
        let class_idx = class_names
            .iter()
            .map(|c| column(c.as_str()))
            .collect::<Result<Vec<usize>, DataError>>()?;

        let base = manifest.parent().unwrap_or(Path::new("."));
        let mut samples = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(csv_err)?;
            let malformed = |message: String| DataError::MalformedRow {
                path: manifest.to_path_buf(),
                row: i + 1,
                message,
            };

            let raw_path = record
                .get(image_idx)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| malformed("empty imgpath".to_string()))?;
            let path = Path::new(raw_path);
            let path = if path.is_absolute() {
                path.to_path_buf()
            } else {
                base.join(path)
            };

            let mut best: Option<(usize, f32)> = None;
            for (c, &idx) in class_idx.iter().enumerate() {
                let cell = record.get(idx).unwrap_or("").trim();
                let value = if cell.is_empty() {
                    0.0
                } else {
                    cell.parse::<f32>()
                        .map_err(|_| malformed(format!("label {cell:?} is not numeric")))?
                };
                if best.map_or(true, |(_, b)| value > b) {
                    best = Some((c, value));
                }
            }
            let label = best.map(|(c, _)| c).unwrap_or(0);
            samples.push(Sample { path, label });
        }

        tracing::info!(
            "Loaded {} images over {} classes from {:?}",
            samples.len(),
            class_names.len(),
            manifest
        );

        Ok(Self {
            name: manifest
                .file_stem()
                .map(|s| s.to_string_lossy().trim_end_matches("-meta").to_string())
                .unwrap_or_default(),
            class_names,
            samples,
            image_size,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Ground-truth labels in sample order.
    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Decode and preprocess images in order, `batch_size` at a time.
    pub fn batches(
        &self,
        batch_size: usize,
    ) -> impl Iterator<Item = Result<ImageBatch, DataError>> + '_ {
        self.samples
            .chunks(batch_size.max(1))
            .map(move |chunk| self.load_batch(chunk))
    }

    fn load_batch(&self, chunk: &[Sample]) -> Result<ImageBatch, DataError> {
        let size = self.image_size as usize;
        let mut pixels = Array4::<f32>::zeros((chunk.len(), 3, size, size));
        for (i, sample) in chunk.iter().enumerate() {
            let image = image::open(&sample.path).map_err(|e| DataError::Image {
                path: sample.path.clone(),
                message: e.to_string(),
            })?;
            let tensor = preprocess(&image, self.image_size);
            pixels
                .index_axis_mut(Axis(0), i)
                .assign(&tensor.index_axis(Axis(0), 0));
        }
        tracing::debug!("Loaded batch of {} images", chunk.len());
        Ok(ImageBatch {
            pixels,
            labels: chunk.iter().map(|s| s.label).collect(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! On-disk fixture datasets.

    use std::io::Write;
    use std::path::Path;

    use image::{GrayImage, Luma};

    /// Write `{dir}/{name}-meta.csv` with one solid grayscale PNG per row.
    ///
    /// `rows` holds `(gray level, one-hot labels)`.
    pub fn write_dataset(dir: &Path, name: &str, classes: &[&str], rows: &[(u8, Vec<u8>)]) {
        let images = dir.join("images");
        std::fs::create_dir_all(&images).unwrap();

        let mut f = std::fs::File::create(dir.join(format!("{name}-meta.csv"))).unwrap();
        writeln!(f, "imgpath,{}", classes.join(",")).unwrap();
        for (i, (level, labels)) in rows.iter().enumerate() {
            let rel = format!("images/{i}.png");
            GrayImage::from_pixel(6, 6, Luma([*level]))
                .save(dir.join(&rel))
                .unwrap();
            let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
            writeln!(f, "{rel},{}", labels.join(",")).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::write_dataset;
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_find_known_dataset() {
        let spec = DatasetSpec::find("covid19-test").unwrap();
        assert_eq!(spec.class_names, COVID_TASKS);
        let err = DatasetSpec::find("rsna").unwrap_err();
        assert!(err.to_string().contains("mimic-5x200"));
    }

    #[test]
    fn test_load_manifest_labels_and_paths() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(
            dir.path(),
            "covid19-test",
            &["Normal", "COVID"],
            &[(10, vec![1, 0]), (200, vec![0, 1]), (90, vec![0, 1])],
        );

        let dataset = ZeroShotDataset::load(dir.path(), "covid19-test", 8).unwrap();
        assert_eq!(dataset.name(), "covid19-test");
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.labels(), vec![0, 1, 1]);
        assert_eq!(dataset.samples()[1].path, dir.path().join("images/1.png"));
    }

    #[test]
    fn test_label_is_first_maximal_column() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("x-meta.csv");
        std::fs::write(&manifest, "imgpath,A,B,C\na.png,0,1,1\nb.png,,,\n").unwrap();

        let dataset =
            ZeroShotDataset::from_manifest(&manifest, strings(&["A", "B", "C"]), 8).unwrap();
        assert_eq!(dataset.labels(), vec![1, 0]);
    }

    #[test]
    fn test_missing_class_column() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("x-meta.csv");
        std::fs::write(&manifest, "imgpath,Normal\na.png,1\n").unwrap();

        let err = ZeroShotDataset::from_manifest(&manifest, strings(&["Normal", "COVID"]), 8)
            .unwrap_err();
        assert!(matches!(err, DataError::MissingColumn { ref column, .. } if column == "COVID"));
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = ZeroShotDataset::load(dir.path(), "mimic-5x200", 8).unwrap_err();
        assert!(matches!(err, DataError::NotFound(_)));
    }

    #[test]
    fn test_batches_shapes_and_labels() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(
            dir.path(),
            "covid19-test",
            &["Normal", "COVID"],
            &[(0, vec![1, 0]), (255, vec![0, 1]), (128, vec![1, 0])],
        );
        let dataset = ZeroShotDataset::load(dir.path(), "covid19-test", 4).unwrap();

        let batches: Vec<ImageBatch> = dataset.batches(2).collect::<Result<_, _>>().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].pixels.shape(), &[2, 3, 4, 4]);
        assert_eq!(batches[1].pixels.shape(), &[1, 3, 4, 4]);
        assert_eq!(batches[0].labels, vec![0, 1]);
        assert!(batches[0].pixels[[0, 0, 0, 0]] < batches[0].pixels[[1, 0, 0, 0]]);
    }

    #[test]
    fn test_batches_report_unreadable_image() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("x-meta.csv");
        std::fs::write(&manifest, "imgpath,A\nmissing.png,1\n").unwrap();
        let dataset = ZeroShotDataset::from_manifest(&manifest, strings(&["A"]), 8).unwrap();

        let err = dataset.batches(4).next().unwrap().unwrap_err();
        assert!(matches!(err, DataError::Image { .. }));
    }
}
