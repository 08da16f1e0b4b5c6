//! Shadow-detection dataset.
//!
//! Pairs images and shadow masks of the ISTD/SRD benchmark sub-sets, applies the
//! training augmentation (rescale, random crop, horizontal flip) and builds the label
//! pyramid that supervises every decoder scale.
//!
//! Expected layout under `data_root`:
//!
//! ```text
//! <source>/train_A/<stem>.<image_ext>   training images
//! <source>/train_B/<stem>.<label_ext>   shadow masks
//! test_new/test_DC/<stem>.png           test images
//! ```

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use burn::{
    config::Config,
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{backend::Backend, Tensor, TensorData},
};
use image::{imageops::FilterType, DynamicImage};
use rand::{rngs::StdRng, Rng, SeedableRng};
use walkdir::WalkDir;

use crate::error::{MffNetError, MffNetResult};

/// One benchmark sub-set and the file extensions of its images and labels.
#[derive(Config, Debug, PartialEq, Eq)]
pub struct ShadowSource {
    /// Directory name under the data root.
    pub name: String,
    /// Extension of the files in `train_A`, without the dot.
    pub image_ext: String,
    /// Extension of the files in `train_B`, without the dot.
    pub label_ext: String,
}

/// The nine training sub-sets of the shadow benchmarks.
pub fn default_train_sources() -> Vec<ShadowSource> {
    [
        ("ISTD_SP", "png", "png"),
        ("ISTD_DSC", "png", "png"),
        ("ISTD_DC", "png", "png"),
        ("ISTD_BM", "png", "png"),
        ("ISTD_TG", "png", "png"),
        ("SRD_BM", "jpg", "jpg"),
        ("SRD_DC", "png", "jpg"),
        ("SRD_DSC", "jpg", "jpg"),
        ("SRD_TG", "jpg", "jpg"),
    ]
    .into_iter()
    .map(|(name, image_ext, label_ext)| {
        ShadowSource::new(name.to_string(), image_ext.to_string(), label_ext.to_string())
    })
    .collect()
}

/// Configuration of the shadow datasets.
#[derive(Config, Debug)]
pub struct ShadowDatasetConfig {
    /// Root directory containing the benchmark sub-sets.
    pub data_root: String,
    /// Side of the network input.
    #[config(default = "224")]
    pub img_size: u32,
    /// Side training samples are rescaled to before cropping.
    #[config(default = "256")]
    pub scale_size: u32,
    #[config(default = "default_train_sources()")]
    pub train_sources: Vec<ShadowSource>,
    /// Test image directory, relative to `data_root`.
    #[config(default = "String::from(\"test_new/test_DC\")")]
    pub test_dir: String,
    #[config(default = "0.5")]
    pub flip_probability: f64,
    /// Seed for the augmentation; drawn at random when unset.
    #[config(default = "None")]
    pub seed: Option<u64>,
    #[config(default = "[0.485, 0.456, 0.406]")]
    pub norm_mean: [f32; 3],
    #[config(default = "[0.229, 0.224, 0.225]")]
    pub norm_std: [f32; 3],
}

impl ShadowDatasetConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err(MffNetError::InvalidConfiguration)` if the sizes cannot produce a
    /// label pyramid or the flip probability is not a probability.
    pub fn validate(&self) -> MffNetResult<()> {
        if self.img_size == 0 || self.img_size % 16 != 0 {
            return Err(MffNetError::invalid_config(format!(
                "dataset img_size must be a positive multiple of 16, got {}",
                self.img_size
            )));
        }
        if self.scale_size < self.img_size {
            return Err(MffNetError::invalid_config(format!(
                "scale_size {} is smaller than img_size {}",
                self.scale_size, self.img_size
            )));
        }
        if !(0.0..=1.0).contains(&self.flip_probability) {
            return Err(MffNetError::invalid_config(format!(
                "flip_probability must be in [0, 1], got {}",
                self.flip_probability
            )));
        }
        if self.norm_std.iter().any(|std| *std <= 0.0) {
            return Err(MffNetError::invalid_config("norm_std must be positive"));
        }
        Ok(())
    }
}

/// A training sample.
#[derive(Debug, Clone)]
pub struct ShadowItem<B: Backend> {
    /// Normalized RGB image `[3, img_size, img_size]`.
    pub image: Tensor<B, 3>,
    /// Shadow mask pyramid.
    pub labels: LabelPyramid<B>,
}

/// Shadow masks `[1, s, s]` in `[0, 1]` at full, 1/2, 1/4, 1/8 and 1/16 resolution.
#[derive(Debug, Clone)]
pub struct LabelPyramid<B: Backend> {
    pub label: Tensor<B, 3>,
    pub label_1_2: Tensor<B, 3>,
    pub label_1_4: Tensor<B, 3>,
    pub label_1_8: Tensor<B, 3>,
    pub label_1_16: Tensor<B, 3>,
}

/// A test sample.
#[derive(Debug, Clone)]
pub struct ShadowTestItem<B: Backend> {
    /// Normalized RGB image `[3, img_size, img_size]`.
    pub image: Tensor<B, 3>,
    /// Width of the image on disk.
    pub width: u32,
    /// Height of the image on disk.
    pub height: u32,
    pub path: PathBuf,
}

/// Batched training samples.
#[derive(Debug, Clone)]
pub struct ShadowBatch<B: Backend> {
    /// `[batch, 3, H, W]`
    pub images: Tensor<B, 4>,
    /// `[batch, 1, H, W]`
    pub label: Tensor<B, 4>,
    pub label_1_2: Tensor<B, 4>,
    pub label_1_4: Tensor<B, 4>,
    pub label_1_8: Tensor<B, 4>,
    pub label_1_16: Tensor<B, 4>,
}

/// Batched test samples.
#[derive(Debug, Clone)]
pub struct ShadowTestBatch<B: Backend> {
    /// `[batch, 3, H, W]`
    pub images: Tensor<B, 4>,
    /// Original `(width, height)` of every image.
    pub sizes: Vec<(u32, u32)>,
    pub paths: Vec<PathBuf>,
}

/// Stacks [`ShadowItem`]s into a [`ShadowBatch`].
#[derive(Clone, Default)]
pub struct ShadowBatcher<B: Backend> {
    _phantom: std::marker::PhantomData<B>,
}

impl<B: Backend> ShadowBatcher<B> {
    pub const fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, ShadowItem<B>, ShadowBatch<B>> for ShadowBatcher<B> {
    fn batch(&self, items: Vec<ShadowItem<B>>, device: &B::Device) -> ShadowBatch<B> {
        let batch_size = items.len();
        let mut images = Vec::with_capacity(batch_size);
        let mut levels: [Vec<Tensor<B, 3>>; 5] = Default::default();

        for item in items {
            images.push(item.image);
            let LabelPyramid {
                label,
                label_1_2,
                label_1_4,
                label_1_8,
                label_1_16,
            } = item.labels;
            for (level, tensor) in levels
                .iter_mut()
                .zip([label, label_1_2, label_1_4, label_1_8, label_1_16])
            {
                level.push(tensor);
            }
        }

        let [label, label_1_2, label_1_4, label_1_8, label_1_16] =
            levels.map(|level| Tensor::stack::<4>(level, 0).to_device(device));

        ShadowBatch {
            images: Tensor::stack::<4>(images, 0).to_device(device),
            label,
            label_1_2,
            label_1_4,
            label_1_8,
            label_1_16,
        }
    }
}

/// Stacks [`ShadowTestItem`]s into a [`ShadowTestBatch`].
#[derive(Clone, Default)]
pub struct ShadowTestBatcher<B: Backend> {
    _phantom: std::marker::PhantomData<B>,
}

impl<B: Backend> ShadowTestBatcher<B> {
    pub const fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, ShadowTestItem<B>, ShadowTestBatch<B>> for ShadowTestBatcher<B> {
    fn batch(&self, items: Vec<ShadowTestItem<B>>, device: &B::Device) -> ShadowTestBatch<B> {
        let mut images = Vec::with_capacity(items.len());
        let mut sizes = Vec::with_capacity(items.len());
        let mut paths = Vec::with_capacity(items.len());

        for item in items {
            images.push(item.image);
            sizes.push((item.width, item.height));
            paths.push(item.path);
        }

        ShadowTestBatch {
            images: Tensor::stack::<4>(images, 0).to_device(device),
            sizes,
            paths,
        }
    }
}

/// Training split: every image of every configured source paired with its mask.
pub struct ShadowDataset<B: Backend> {
    items: Vec<(PathBuf, PathBuf)>,
    device: B::Device,
    img_size: u32,
    scale_size: u32,
    flip_probability: f64,
    norm_mean: [f32; 3],
    norm_std: [f32; 3],
    seed: u64,
    draws: AtomicU64,
}

impl<B: Backend> ShadowDataset<B> {
    /// Lists the training pairs.
    ///
    /// # Errors
    ///
    /// Returns `Err(MffNetError::InvalidConfiguration)` for an invalid configuration and
    /// `Err(MffNetError::DatasetError)` if a source directory is missing or no pair
    /// is found.
    pub fn new(config: &ShadowDatasetConfig, device: &B::Device) -> MffNetResult<Self> {
        config.validate()?;
        let items = list_train_pairs(Path::new(&config.data_root), &config.train_sources)?;

        Ok(Self {
            items,
            device: device.clone(),
            img_size: config.img_size,
            scale_size: config.scale_size,
            flip_probability: config.flip_probability,
            norm_mean: config.norm_mean,
            norm_std: config.norm_std,
            seed: config.seed.unwrap_or_else(rand::random),
            draws: AtomicU64::new(0),
        })
    }

    /// Image and label paths, in listing order.
    pub fn pairs(&self) -> &[(PathBuf, PathBuf)] {
        &self.items
    }

    fn create_rng(&self) -> StdRng {
        let draw = self.draws.fetch_add(1, Ordering::Relaxed);
        StdRng::seed_from_u64(self.seed.wrapping_add(draw))
    }

    /// Rescale, random crop and random horizontal flip.
    fn augment(&self, image: DynamicImage, label: DynamicImage) -> (DynamicImage, DynamicImage) {
        let mut rng = self.create_rng();
        let scale = self.scale_size;
        let image = image.resize_exact(scale, scale, FilterType::Triangle);
        let label = label.resize_exact(scale, scale, FilterType::Nearest);

        let (image, label) = if scale > self.img_size {
            let x = rng.random_range(0..=scale - self.img_size);
            let y = rng.random_range(0..=scale - self.img_size);
            (
                image.crop_imm(x, y, self.img_size, self.img_size),
                label.crop_imm(x, y, self.img_size, self.img_size),
            )
        } else {
            (image, label)
        };

        if rng.random_bool(self.flip_probability) {
            (image.fliph(), label.fliph())
        } else {
            (image, label)
        }
    }

    fn label_pyramid(&self, label: &DynamicImage) -> LabelPyramid<B> {
        let level = |divisor: u32| {
            let side = self.img_size / divisor;
            let resized = label.resize_exact(side, side, FilterType::Nearest);
            label_to_tensor(&resized, &self.device)
        };

        LabelPyramid {
            label: label_to_tensor(label, &self.device),
            label_1_2: level(2),
            label_1_4: level(4),
            label_1_8: level(8),
            label_1_16: level(16),
        }
    }
}

impl<B: Backend> Dataset<ShadowItem<B>> for ShadowDataset<B> {
    fn get(&self, index: usize) -> Option<ShadowItem<B>> {
        let (image_path, label_path) = self.items.get(index)?;

        let (image, label) = match (image::open(image_path), image::open(label_path)) {
            (Ok(image), Ok(label)) => (image, label),
            (Err(e), _) | (_, Err(e)) => {
                log::warn!("Skipping unreadable sample {}: {e}", image_path.display());
                return None;
            }
        };

        let (image, label) = self.augment(image, label);
        let image = normalize(
            image_to_tensor(&image, &self.device),
            self.norm_mean,
            self.norm_std,
        );

        Some(ShadowItem {
            image,
            labels: self.label_pyramid(&label),
        })
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Test split: every `.png` image of the test directory.
pub struct ShadowTestDataset<B: Backend> {
    items: Vec<PathBuf>,
    device: B::Device,
    img_size: u32,
    norm_mean: [f32; 3],
    norm_std: [f32; 3],
}

impl<B: Backend> ShadowTestDataset<B> {
    /// Lists the test images.
    ///
    /// # Errors
    ///
    /// Returns `Err(MffNetError::DatasetError)` if the test directory is missing or
    /// contains no image.
    pub fn new(config: &ShadowDatasetConfig, device: &B::Device) -> MffNetResult<Self> {
        config.validate()?;
        let test_root = Path::new(&config.data_root).join(&config.test_dir);
        let items = list_files(&test_root, "png")?;

        if items.is_empty() {
            return Err(MffNetError::DatasetError {
                message: format!("No test images found in {}", test_root.display()),
            });
        }
        log::info!("Found {} test images in {}", items.len(), test_root.display());

        Ok(Self {
            items,
            device: device.clone(),
            img_size: config.img_size,
            norm_mean: config.norm_mean,
            norm_std: config.norm_std,
        })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.items
    }
}

impl<B: Backend> Dataset<ShadowTestItem<B>> for ShadowTestDataset<B> {
    fn get(&self, index: usize) -> Option<ShadowTestItem<B>> {
        let path = self.items.get(index)?;
        let image = match image::open(path) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Skipping unreadable image {}: {e}", path.display());
                return None;
            }
        };

        let (width, height) = (image.width(), image.height());
        let image = image.resize_exact(self.img_size, self.img_size, FilterType::Triangle);

        Some(ShadowTestItem {
            image: normalize(
                image_to_tensor(&image, &self.device),
                self.norm_mean,
                self.norm_std,
            ),
            width,
            height,
            path: path.clone(),
        })
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Pairs `<source>/train_A/<stem>.<image_ext>` with `<source>/train_B/<stem>.<label_ext>`
/// for every source. Images without a label are skipped.
///
/// # Errors
///
/// Returns `Err(MffNetError::DatasetError)` if a source directory is missing or no pair
/// is found at all.
pub fn list_train_pairs(
    data_root: &Path,
    sources: &[ShadowSource],
) -> MffNetResult<Vec<(PathBuf, PathBuf)>> {
    let mut items = Vec::new();

    for source in sources {
        let image_root = data_root.join(&source.name).join("train_A");
        let label_root = data_root.join(&source.name).join("train_B");
        if !label_root.is_dir() {
            return Err(MffNetError::DatasetError {
                message: format!("Label directory does not exist: {}", label_root.display()),
            });
        }

        for image_path in list_files(&image_root, &source.image_ext)? {
            let Some(stem) = image_path.file_stem() else {
                continue;
            };
            let mut label_path = label_root.join(stem);
            label_path.set_extension(&source.label_ext);

            if label_path.is_file() {
                items.push((image_path, label_path));
            } else {
                log::warn!("No label found for image: {}", image_path.display());
            }
        }
    }

    if items.is_empty() {
        return Err(MffNetError::DatasetError {
            message: format!(
                "No valid image/label pairs found under {}",
                data_root.display()
            ),
        });
    }

    log::info!(
        "Found {} image/label pairs in {} sources under {}",
        items.len(),
        sources.len(),
        data_root.display()
    );
    Ok(items)
}

/// Files directly inside `dir` with the given extension (case-insensitive), sorted by
/// name.
fn list_files(dir: &Path, extension: &str) -> MffNetResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(MffNetError::DatasetError {
            message: format!("Image directory does not exist: {}", dir.display()),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| MffNetError::DatasetError {
            message: format!("Failed to read directory entry: {e}"),
        })?;
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if entry.file_type().is_file() && matches {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// RGB image to `[3, H, W]` in `[0, 1]`.
fn image_to_tensor<B: Backend>(image: &DynamicImage, device: &B::Device) -> Tensor<B, 3> {
    let image = image.to_rgb32f();
    let (width, height) = image.dimensions();
    let data = TensorData::new(image.into_raw(), [height as usize, width as usize, 3]);
    Tensor::<B, 3>::from_data(data.convert::<B::FloatElem>(), device).permute([2, 0, 1])
}

/// Grey-scale mask to `[1, H, W]` in `[0, 1]`.
fn label_to_tensor<B: Backend>(label: &DynamicImage, device: &B::Device) -> Tensor<B, 3> {
    let label = label.to_luma32f();
    let (width, height) = label.dimensions();
    let data = TensorData::new(label.into_raw(), [1, height as usize, width as usize]);
    Tensor::<B, 3>::from_data(data.convert::<B::FloatElem>(), device)
}

fn normalize<B: Backend>(tensor: Tensor<B, 3>, mean: [f32; 3], std: [f32; 3]) -> Tensor<B, 3> {
    let device = tensor.device();
    let channel_stat = |values: [f32; 3]| {
        let data = TensorData::new(values.to_vec(), [3, 1, 1]).convert::<B::FloatElem>();
        Tensor::<B, 3>::from_data(data, &device)
    };
    let (mean, std) = (channel_stat(mean), channel_stat(std));

    (tensor - mean) / std
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, data::dataloader::batcher::Batcher};
    use image::{GrayImage, Luma, Rgb, RgbImage};

    type TestBackend = NdArray<f32>;

    fn write_image(path: &Path, width: u32, height: u32) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(width, height, Rgb([200, 100, 50]))
            .save(path)
            .unwrap();
    }

    fn write_label(path: &Path, width: u32, height: u32) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        // Left half shadow, right half background.
        GrayImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Luma([255])
            } else {
                Luma([0])
            }
        })
        .save(path)
        .unwrap();
    }

    fn sources() -> Vec<ShadowSource> {
        vec![
            ShadowSource::new("ISTD_SP".into(), "png".into(), "png".into()),
            ShadowSource::new("SRD_DC".into(), "png".into(), "jpg".into()),
        ]
    }

    fn build_tree(root: &Path) {
        for stem in ["a", "b"] {
            write_image(&root.join(format!("ISTD_SP/train_A/{stem}.png")), 40, 30);
            write_label(&root.join(format!("ISTD_SP/train_B/{stem}.png")), 40, 30);
        }
        write_image(&root.join("SRD_DC/train_A/c.png"), 40, 30);
        write_label(&root.join("SRD_DC/train_B/c.jpg"), 40, 30);
        // Unpaired image and a file of another type.
        write_image(&root.join("SRD_DC/train_A/d.png"), 40, 30);
        write_image(&root.join("SRD_DC/train_A/e.jpg"), 40, 30);

        write_image(&root.join("test_new/test_DC/t1.png"), 50, 20);
        write_image(&root.join("test_new/test_DC/t2.png"), 20, 50);
    }

    fn config(root: &Path) -> ShadowDatasetConfig {
        ShadowDatasetConfig::new(root.to_string_lossy().into_owned())
            .with_img_size(32)
            .with_scale_size(48)
            .with_train_sources(sources())
            .with_seed(Some(7))
    }

    #[test]
    fn test_default_sources() {
        let sources = default_train_sources();
        assert_eq!(sources.len(), 9);

        let srd_dc = sources.iter().find(|s| s.name == "SRD_DC").unwrap();
        assert_eq!(srd_dc.image_ext, "png");
        assert_eq!(srd_dc.label_ext, "jpg");
        assert!(sources
            .iter()
            .filter(|s| s.name.starts_with("ISTD"))
            .all(|s| s.image_ext == "png" && s.label_ext == "png"));
    }

    #[test]
    fn test_list_train_pairs() {
        let dir = tempfile::tempdir().unwrap();
        build_tree(dir.path());

        let pairs = list_train_pairs(dir.path(), &sources()).unwrap();
        let names: Vec<(String, String)> = pairs
            .iter()
            .map(|(image, label)| {
                (
                    image.file_name().unwrap().to_string_lossy().into_owned(),
                    label.file_name().unwrap().to_string_lossy().into_owned(),
                )
            })
            .collect();

        assert_eq!(
            names,
            vec![
                ("a.png".to_string(), "a.png".to_string()),
                ("b.png".to_string(), "b.png".to_string()),
                ("c.png".to_string(), "c.jpg".to_string()),
            ]
        );
        assert!(pairs[2].1.parent().unwrap().ends_with("SRD_DC/train_B"));
    }

    #[test]
    fn test_missing_source_directory() {
        let dir = tempfile::tempdir().unwrap();
        build_tree(dir.path());

        let mut sources = sources();
        sources.push(ShadowSource::new("SRD_TG".into(), "jpg".into(), "jpg".into()));

        assert!(matches!(
            list_train_pairs(dir.path(), &sources),
            Err(MffNetError::DatasetError { .. })
        ));
    }

    #[test]
    fn test_empty_dataset_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("ISTD_SP/train_A")).unwrap();
        std::fs::create_dir_all(dir.path().join("ISTD_SP/train_B")).unwrap();

        let sources = vec![ShadowSource::new("ISTD_SP".into(), "png".into(), "png".into())];
        assert!(matches!(
            list_train_pairs(dir.path(), &sources),
            Err(MffNetError::DatasetError { .. })
        ));
    }

    #[test]
    fn test_train_item_pyramid() {
        let dir = tempfile::tempdir().unwrap();
        build_tree(dir.path());
        let device = Default::default();

        let dataset = ShadowDataset::<TestBackend>::new(&config(dir.path()), &device).unwrap();
        assert_eq!(dataset.len(), 3);

        let item = dataset.get(0).unwrap();
        assert_eq!(item.image.dims(), [3, 32, 32]);
        assert_eq!(item.labels.label.dims(), [1, 32, 32]);
        assert_eq!(item.labels.label_1_2.dims(), [1, 16, 16]);
        assert_eq!(item.labels.label_1_4.dims(), [1, 8, 8]);
        assert_eq!(item.labels.label_1_8.dims(), [1, 4, 4]);
        assert_eq!(item.labels.label_1_16.dims(), [1, 2, 2]);

        let min = item.labels.label.clone().min().into_scalar();
        let max = item.labels.label.max().into_scalar();
        assert!((0.0..=1.0).contains(&min) && (0.0..=1.0).contains(&max));

        assert!(dataset.get(3).is_none());
    }

    #[test]
    fn test_image_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        build_tree(dir.path());
        let device = Default::default();

        let dataset = ShadowDataset::<TestBackend>::new(&config(dir.path()), &device).unwrap();
        let item = dataset.get(1).unwrap();

        // Uniform colour survives resampling, cropping and flipping.
        let red = item.image.clone().slice([0..1, 0..32, 0..32]).mean().into_scalar();
        let expected = (200.0 / 255.0 - 0.485) / 0.229;
        assert!((red - expected).abs() < 1e-3, "red channel {red}, expected {expected}");
    }

    #[test]
    fn test_flip_is_applied_to_image_and_label() {
        let dir = tempfile::tempdir().unwrap();
        build_tree(dir.path());
        let device = Default::default();

        let config = config(dir.path())
            .with_scale_size(32)
            .with_flip_probability(1.0);
        let dataset = ShadowDataset::<TestBackend>::new(&config, &device).unwrap();
        let label = dataset.get(0).unwrap().labels.label;

        // The shadow half moves to the right.
        let left = label.clone().slice([0..1, 0..32, 0..16]).mean().into_scalar();
        let right = label.slice([0..1, 0..32, 16..32]).mean().into_scalar();
        assert!(left < 0.01 && right > 0.99, "left {left}, right {right}");
    }

    #[test]
    fn test_test_dataset_keeps_original_size() {
        let dir = tempfile::tempdir().unwrap();
        build_tree(dir.path());
        let device = Default::default();

        let dataset = ShadowTestDataset::<TestBackend>::new(&config(dir.path()), &device).unwrap();
        assert_eq!(dataset.len(), 2);

        let item = dataset.get(0).unwrap();
        assert_eq!(item.image.dims(), [3, 32, 32]);
        assert_eq!((item.width, item.height), (50, 20));
        assert!(item.path.ends_with("t1.png"));
    }

    #[test]
    fn test_batchers_stack_items() {
        let dir = tempfile::tempdir().unwrap();
        build_tree(dir.path());
        let device = Default::default();

        let dataset = ShadowDataset::<TestBackend>::new(&config(dir.path()), &device).unwrap();
        let items = (0..dataset.len()).filter_map(|i| dataset.get(i)).collect();
        let batch = ShadowBatcher::<TestBackend>::new().batch(items, &device);

        assert_eq!(batch.images.dims(), [3, 3, 32, 32]);
        assert_eq!(batch.label.dims(), [3, 1, 32, 32]);
        assert_eq!(batch.label_1_2.dims(), [3, 1, 16, 16]);
        assert_eq!(batch.label_1_4.dims(), [3, 1, 8, 8]);
        assert_eq!(batch.label_1_8.dims(), [3, 1, 4, 4]);
        assert_eq!(batch.label_1_16.dims(), [3, 1, 2, 2]);

        let test_dataset =
            ShadowTestDataset::<TestBackend>::new(&config(dir.path()), &device).unwrap();
        let items = (0..test_dataset.len())
            .filter_map(|i| test_dataset.get(i))
            .collect();
        let batch = ShadowTestBatcher::<TestBackend>::new().batch(items, &device);

        assert_eq!(batch.images.dims(), [2, 3, 32, 32]);
        assert_eq!(batch.sizes, vec![(50, 20), (20, 50)]);
        assert_eq!(batch.paths.len(), 2);
    }

    #[test]
    fn test_config_validation() {
        let config = ShadowDatasetConfig::new("data".into()).with_img_size(100);
        assert!(config.validate().is_err());

        let config = ShadowDatasetConfig::new("data".into()).with_scale_size(128);
        assert!(config.validate().is_err());

        let config = ShadowDatasetConfig::new("data".into()).with_flip_probability(1.5);
        assert!(config.validate().is_err());

        assert!(ShadowDatasetConfig::new("data".into()).validate().is_ok());
    }
}
