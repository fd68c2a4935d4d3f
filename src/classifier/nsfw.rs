use anyhow::{Result, anyhow};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::vit;
use futures::FutureExt;
use futures::future::BoxFuture;
use hf_hub::{Repo, RepoType, api::sync::Api};
use image::{ImageBuffer, Rgba};
use std::sync::{Arc, Mutex};

use super::{ClassificationResult, Classifier, ModelSource, Prediction};
use crate::decoder::DecodedImage;

const IMAGE_SIZE: usize = 224;

// Class indices from model config:
// 0: drawings, 1: hentai, 2: neutral, 3: porn, 4: sexy
const LABELS: [&str; 5] = ["Drawing", "Hentai", "Neutral", "Porn", "Sexy"];

/// NSFW classifier using the LukeJacob2023/nsfw-image-detector ViT model
pub struct NsfwClassifier {
    model: Arc<Mutex<vit::Model>>,
    device: Device,
}

impl NsfwClassifier {
    /// Downloads (or reuses the hub cache for) the model and loads it. Blocking.
    pub fn new(repo_id: &str) -> Result<Self> {
        #[cfg(feature = "metal")]
        let device = Device::new_metal(0).unwrap_or(Device::Cpu);
        #[cfg(not(feature = "metal"))]
        let device = Device::Cpu;

        log::info!("Loading NSFW detection model {} on {:?}", repo_id, device);

        let api = Api::new()?;
        let repo = api.repo(Repo::new(repo_id.to_string(), RepoType::Model));

        let model_path = repo.get("model.safetensors")?;
        let config_path = repo.get("config.json")?;

        let config: vit::Config = serde_json::from_str(&std::fs::read_to_string(config_path)?)?;
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[model_path], DType::F32, &device)? };
        let model = vit::Model::new(&config, LABELS.len(), vb)?;

        log::info!("NSFW model loaded successfully");

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            device,
        })
    }
}

impl Classifier for NsfwClassifier {
    fn classify<'a>(&'a self, image: &'a DecodedImage) -> BoxFuture<'a, Result<ClassificationResult>> {
        let model = Arc::clone(&self.model);
        let device = self.device.clone();
        let scaled = scale(image);

        async move {
            let scaled = scaled?;
            let probs = tokio::task::spawn_blocking(move || forward(&model, &device, &scaled))
                .await
                .map_err(|e| anyhow!("inference task failed: {}", e))??;
            let result = to_result(&probs)?;
            if let Some(top) = result.top() {
                log::info!("[NSFW] top label {} at {:.1}%", top.label, top.probability * 100.0);
            }
            Ok(result)
        }
        .boxed()
    }
}

/// Loads [`NsfwClassifier`] on the blocking pool.
pub struct NsfwSource {
    repo_id: String,
}

impl NsfwSource {
    pub fn new(repo_id: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
        }
    }
}

impl ModelSource for NsfwSource {
    fn load(&self) -> BoxFuture<'_, Result<Arc<dyn Classifier>>> {
        let repo_id = self.repo_id.clone();
        async move {
            let classifier = tokio::task::spawn_blocking(move || NsfwClassifier::new(&repo_id))
                .await
                .map_err(|e| anyhow!("model load task failed: {}", e))??;
            Ok(Arc::new(classifier) as Arc<dyn Classifier>)
        }
        .boxed()
    }
}

/// Scale image to model input size (224x224 RGB)
fn scale(image: &DecodedImage) -> Result<Vec<u8>> {
    let img: ImageBuffer<Rgba<u8>, _> =
        ImageBuffer::from_raw(image.width, image.height, image.rgba.clone())
            .ok_or_else(|| anyhow!("Invalid image dimensions"))?;

    let resized = image::imageops::resize(
        &img,
        IMAGE_SIZE as u32,
        IMAGE_SIZE as u32,
        image::imageops::FilterType::Triangle,
    );

    let mut rgb = Vec::with_capacity(IMAGE_SIZE * IMAGE_SIZE * 3);
    for pixel in resized.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
    }
    Ok(rgb)
}

fn preprocess(scaled_rgb: &[u8], device: &Device) -> Result<Tensor> {
    if scaled_rgb.len() != IMAGE_SIZE * IMAGE_SIZE * 3 {
        return Err(anyhow!(
            "expected {}x{}x3 RGB, got {} bytes",
            IMAGE_SIZE,
            IMAGE_SIZE,
            scaled_rgb.len()
        ));
    }

    // mean=0.5, std=0.5 for all channels
    let mean = 0.5;
    let std = 0.5;
    let plane = IMAGE_SIZE * IMAGE_SIZE;
    let mut data = vec![0f32; 3 * plane];

    for i in 0..plane {
        for c in 0..3 {
            let v = scaled_rgb[i * 3 + c] as f32 / 255.0;
            // CHW layout
            data[c * plane + i] = (v - mean) / std;
        }
    }

    Ok(Tensor::from_vec(data, (1, 3, IMAGE_SIZE, IMAGE_SIZE), device)?)
}

fn forward(model: &Mutex<vit::Model>, device: &Device, scaled_rgb: &[u8]) -> Result<Vec<f32>> {
    let input = preprocess(scaled_rgb, device)?;
    let model = model.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
    let logits = model.forward(&input)?;
    let probs = candle_nn::ops::softmax(&logits, 1)?;
    Ok(probs.flatten_all()?.to_vec1()?)
}

fn to_result(probs: &[f32]) -> Result<ClassificationResult> {
    if probs.len() != LABELS.len() {
        return Err(anyhow!(
            "expected {} class probabilities, got {}",
            LABELS.len(),
            probs.len()
        ));
    }
    Ok(ClassificationResult::new(
        LABELS
            .iter()
            .zip(probs)
            .map(|(label, p)| Prediction::new(*label, *p))
            .collect(),
    ))
}
