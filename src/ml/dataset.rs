//! 学習データセット
//!
//! `dataset/<クラス名>/<画像>` 形式のディレクトリを読み込みます。
//! クラスのインデックスはサブフォルダ名の辞書順で決まります。

use anyhow::{Context, Result};
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{backend::Backend, Int, Tensor},
};
use log::info;
use std::path::{Path, PathBuf};

use crate::ml::load_and_normalize_image_with_size;

/// 学習に使う画像の拡張子
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// データセットディレクトリ直下のサブフォルダ名を辞書順で取得
pub fn list_class_names(data_dir: &Path) -> Result<Vec<String>> {
    let mut class_names = Vec::new();

    let entries = std::fs::read_dir(data_dir)
        .with_context(|| format!("データセットディレクトリを開けません: {}", data_dir.display()))?;

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry
            .file_name()
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid directory name: {:?}", entry.file_name()))?
            .to_string();
        class_names.push(name);
    }

    class_names.sort();
    Ok(class_names)
}

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                IMAGE_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false)
}

/// 学習データセット（パスのリストのみ保持）
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    samples: Vec<(PathBuf, usize)>, // (画像パス, クラスID)
    class_names: Vec<String>,
}

impl ImageFolderDataset {
    /// 指定された順序でディレクトリから学習データを読み込む
    ///
    /// クラスが2つ未満、または画像が1枚もないクラスがある場合はエラー
    pub fn from_directory(data_dir: &Path, class_order: &[String]) -> Result<Self> {
        if class_order.len() < 2 {
            anyhow::bail!(
                "クラスフォルダが2つ以上必要です ({}: {}個)",
                data_dir.display(),
                class_order.len()
            );
        }

        let mut samples = Vec::new();
        let mut empty_classes = Vec::new();

        for (class_id, class_name) in class_order.iter().enumerate() {
            let class_dir = data_dir.join(class_name);

            let mut images: Vec<PathBuf> = std::fs::read_dir(&class_dir)
                .with_context(|| format!("クラスディレクトリを開けません: {}", class_dir.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| is_image_file(path))
                .collect();
            images.sort();

            if images.is_empty() {
                empty_classes.push(class_name.clone());
            }

            info!("  クラス {}: '{}' ({} 枚)", class_id, class_name, images.len());
            samples.extend(images.into_iter().map(|path| (path, class_id)));
        }

        if !empty_classes.is_empty() {
            anyhow::bail!(
                "以下のクラスディレクトリに画像が1枚もありません: {}",
                empty_classes.join(", ")
            );
        }

        Ok(Self {
            samples,
            class_names: class_order.to_vec(),
        })
    }

    /// サブフォルダ名からクラス順を決めて読み込む
    pub fn from_dataset_dir(data_dir: &Path) -> Result<Self> {
        let class_names = list_class_names(data_dir)?;
        Self::from_directory(data_dir, &class_names)
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn samples(&self) -> &[(PathBuf, usize)] {
        &self.samples
    }

    /// すべての画像がデコードできるか確認
    ///
    /// 読めない画像が1枚でもあれば、そのパスを含むエラーで学習を中断します。
    pub fn validate(&self) -> Result<()> {
        for (path, _) in &self.samples {
            image::open(path)
                .with_context(|| format!("画像を読み込めません: {}", path.display()))?;
        }
        Ok(())
    }

    /// データセットを学習用と検証用に分割
    ///
    /// シード固定でシャッフルしてから `train_ratio` の位置で切り分けます。
    pub fn split(self, train_ratio: f32, seed: u64) -> (Self, Self) {
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let mut shuffled_samples = self.samples;
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        shuffled_samples.shuffle(&mut rng);

        let total_len = shuffled_samples.len();
        let train_len = ((total_len as f32 * train_ratio) as usize).min(total_len);
        let val_samples = shuffled_samples.split_off(train_len);

        let train_dataset = Self {
            samples: shuffled_samples,
            class_names: self.class_names.clone(),
        };
        let val_dataset = Self {
            samples: val_samples,
            class_names: self.class_names,
        };

        (train_dataset, val_dataset)
    }
}

/// データセットアイテム（画像パスのみ保持）
#[derive(Clone, Debug)]
pub struct ImageItem {
    pub path: PathBuf,
    pub label: usize,
}

impl Dataset<ImageItem> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let (path, label) = self.samples.get(index)?;
        Some(ImageItem {
            path: path.clone(),
            label: *label,
        })
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// バッチャー
#[derive(Clone)]
pub struct ImageBatcher<B: Backend> {
    device: B::Device,
    image_size: usize,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device, image_size: usize) -> Self {
        Self { device, image_size }
    }
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
    /// 読み込めなかった画像（空でなければ学習を中断する）
    pub failed: Vec<(PathBuf, String)>,
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>, _device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;
        let mut all_pixels = Vec::with_capacity(batch_size * 3 * size * size);
        let mut targets_vec = Vec::with_capacity(batch_size);
        let mut failed = Vec::new();

        for item in items {
            match load_and_normalize_image_with_size(&item.path, size) {
                Ok(image_data) => all_pixels.extend_from_slice(&image_data),
                Err(e) => {
                    // validate() 後に差し替えられたファイル。テンソルの形を保つため0で埋め、呼び出し側で中断する
                    all_pixels.extend(std::iter::repeat(0.0f32).take(3 * size * size));
                    failed.push((item.path.clone(), e.to_string()));
                }
            }
            targets_vec.push(item.label as i64);
        }

        // 1回の転送でバッチ全体をデバイスへ
        let images = Tensor::<B, 1>::from_floats(all_pixels.as_slice(), &self.device)
            .reshape([batch_size, 3, size, size]);
        let targets = Tensor::<B, 1, Int>::from_ints(targets_vec.as_slice(), &self.device);

        ImageBatch {
            images,
            targets,
            failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use image::{Rgb, RgbImage};

    fn write_image(path: &Path, color: [u8; 3], size: u32) {
        RgbImage::from_pixel(size, size, Rgb(color)).save(path).unwrap();
    }

    fn make_dataset(root: &Path, classes: &[(&str, usize)]) {
        for (class, count) in classes {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..*count {
                write_image(&dir.join(format!("{}_{}.png", class, i)), [i as u8 * 10, 0, 0], 12);
            }
        }
    }

    #[test]
    fn test_list_class_names_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["dog", "cat", "Zebra", "bird"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let names = list_class_names(dir.path()).unwrap();
        assert_eq!(names, vec!["Zebra", "bird", "cat", "dog"]);
    }

    #[test]
    fn test_list_class_names_missing_dir() {
        assert!(list_class_names(Path::new("no/such/dataset")).is_err());
    }

    #[test]
    fn test_from_dataset_dir_collects_samples() {
        let dir = tempfile::tempdir().unwrap();
        make_dataset(dir.path(), &[("dog", 3), ("cat", 2)]);
        std::fs::write(dir.path().join("cat").join("readme.txt"), "skip").unwrap();

        let dataset = ImageFolderDataset::from_dataset_dir(dir.path()).unwrap();
        assert_eq!(dataset.class_names(), &["cat".to_string(), "dog".to_string()]);
        assert_eq!(dataset.len(), 5);
        assert_eq!(dataset.samples().iter().filter(|(_, id)| *id == 0).count(), 2);
        assert_eq!(dataset.samples().iter().filter(|(_, id)| *id == 1).count(), 3);
        assert!(dataset.validate().is_ok());
    }

    #[test]
    fn test_requires_two_classes() {
        let dir = tempfile::tempdir().unwrap();
        make_dataset(dir.path(), &[("only", 3)]);
        let err = ImageFolderDataset::from_dataset_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("2つ以上"));
    }

    #[test]
    fn test_empty_class_is_error() {
        let dir = tempfile::tempdir().unwrap();
        make_dataset(dir.path(), &[("cat", 2), ("dog", 0)]);
        let err = ImageFolderDataset::from_dataset_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("dog"));
    }

    #[test]
    fn test_validate_reports_broken_image() {
        let dir = tempfile::tempdir().unwrap();
        make_dataset(dir.path(), &[("cat", 1), ("dog", 1)]);
        std::fs::write(dir.path().join("dog").join("broken.jpg"), b"garbage").unwrap();

        let dataset = ImageFolderDataset::from_dataset_dir(dir.path()).unwrap();
        let err = dataset.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("broken.jpg"));
    }

    #[test]
    fn test_split_is_seeded_and_complete() {
        let dir = tempfile::tempdir().unwrap();
        make_dataset(dir.path(), &[("cat", 5), ("dog", 5)]);

        let dataset = ImageFolderDataset::from_dataset_dir(dir.path()).unwrap();
        let (train_a, val_a) = dataset.clone().split(0.8, 7);
        let (train_b, val_b) = dataset.split(0.8, 7);

        assert_eq!(train_a.len(), 8);
        assert_eq!(val_a.len(), 2);
        assert_eq!(train_a.samples(), train_b.samples());
        assert_eq!(val_a.samples(), val_b.samples());
        assert_eq!(val_a.class_names(), train_a.class_names());
    }

    #[test]
    fn test_batcher_shapes() {
        let dir = tempfile::tempdir().unwrap();
        make_dataset(dir.path(), &[("cat", 2), ("dog", 1)]);
        let dataset = ImageFolderDataset::from_dataset_dir(dir.path()).unwrap();

        let batcher = ImageBatcher::<NdArray>::new(NdArrayDevice::Cpu, 16);
        let items: Vec<ImageItem> = (0..dataset.len()).filter_map(|i| dataset.get(i)).collect();
        let batch = batcher.batch(items, &NdArrayDevice::Cpu);

        assert_eq!(batch.images.dims(), [3, 3, 16, 16]);
        assert_eq!(batch.targets.dims(), [3]);
        let targets = batch.targets.into_data().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![0, 0, 1]);
        assert!(batch.failed.is_empty());
    }

    #[test]
    fn test_batcher_reports_file_broken_after_validation() {
        let dir = tempfile::tempdir().unwrap();
        make_dataset(dir.path(), &[("cat", 1), ("dog", 1)]);
        let dataset = ImageFolderDataset::from_dataset_dir(dir.path()).unwrap();
        dataset.validate().unwrap();

        let broken = dir.path().join("dog").join("dog_0.png");
        std::fs::write(&broken, b"garbage").unwrap();

        let batcher = ImageBatcher::<NdArray>::new(NdArrayDevice::Cpu, 16);
        let items: Vec<ImageItem> = (0..dataset.len()).filter_map(|i| dataset.get(i)).collect();
        let batch = batcher.batch(items, &NdArrayDevice::Cpu);

        assert_eq!(batch.images.dims(), [2, 3, 16, 16]);
        assert_eq!(batch.failed.len(), 1);
        assert_eq!(batch.failed[0].0, broken);
    }
}
