//! Captioning every image of an upload independently.
//!
//! Images are fanned out to tasks on a [`JoinSet`], with a [`Semaphore`] capping how many talk to
//! the external services at once. Each task is tagged with its input position and results are
//! written back by position, so the output order never depends on completion order. Dropping the
//! future returned by [`BatchProcessor::process`] aborts every task still in flight.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::captions::{Caption, CaptionError, CaptionSynthesizer};
use crate::types::UploadedImage;

pub struct BatchProcessor {
    synthesizer: Arc<CaptionSynthesizer>,
    max_concurrency: usize,
}

impl BatchProcessor {
    pub fn new(synthesizer: Arc<CaptionSynthesizer>, max_concurrency: usize) -> Self {
        Self {
            synthesizer,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// One result per input image, in input order. A failing or panicking image only affects its
    /// own slot.
    pub async fn process(&self, images: &[UploadedImage]) -> Vec<Result<Caption, CaptionError>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut positions = HashMap::with_capacity(images.len());

        for (index, image) in images.iter().enumerate() {
            let synthesizer = self.synthesizer.clone();
            let semaphore = semaphore.clone();
            let image = image.clone();

            let handle = tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                synthesizer.synthesize(&image).await
            });
            positions.insert(handle.id(), index);
        }

        let mut slots: Vec<Option<Result<Caption, CaptionError>>> = images.iter().map(|_| None).collect();

        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(join_error) => (join_error.id(), Err(CaptionError::Task(join_error.to_string()))),
            };
            if let Some(&index) = positions.get(&id) {
                slots[index] = Some(outcome);
            }
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(CaptionError::Task("task finished without a result".to_string()))))
            .collect()
    }

    /// Like [`process`](Self::process), but failures are logged and reported as `None`.
    pub async fn captions(&self, images: &[UploadedImage]) -> Vec<Option<Caption>> {
        let results = self.process(images).await;

        let captions: Vec<Option<Caption>> = results
            .into_iter()
            .zip(images)
            .enumerate()
            .map(|(index, (result, image))| match result {
                Ok(caption) => Some(caption),
                Err(error) => {
                    warn!(index, file_name = %image.name, error = %error, "Failed to caption image");
                    None
                }
            })
            .collect();

        info!(
            total = images.len(),
            captioned = captions.iter().filter(|c| c.is_some()).count(),
            "Batch captioning finished"
        );
        captions
    }
}
