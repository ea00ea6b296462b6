use crate::detection::domain::detection::Detection;
use crate::detection::domain::stage_evaluator::{EvaluatorError, WindowEvaluator};
use crate::shared::image_tensor::ImageTensor;
use crate::shared::region::Region;
use crate::shared::worker_pool::parallel_map;

/// Crops wider or taller than this multiple of the image's longer side are
/// never evaluated.
pub const MAX_CROP_TO_IMAGE_RATIO: i64 = 4;

/// Crops each candidate out of `image`, resizes it to the evaluator's input
/// size and keeps the candidates scoring at least `threshold`, re-scored.
///
/// Input order is preserved. Candidates whose pixel region is empty, lies
/// wholly outside the image or exceeds [`MAX_CROP_TO_IMAGE_RATIO`] are
/// dropped without being evaluated. Per-window shape failures drop only
/// that candidate, while systemic evaluator failures abort the stage.
pub fn score_candidates(
    stage: &str,
    image: &ImageTensor,
    candidates: &[Detection],
    evaluator: &dyn WindowEvaluator,
    threshold: f32,
    workers: usize,
) -> Result<Vec<Detection>, EvaluatorError> {
    let size = evaluator.input_size();
    let results = parallel_map(candidates, workers, |candidate| {
        let region = candidate.bbox.to_region();
        if !is_croppable(&region, image) {
            return Ok(None);
        }
        let window = image.crop_padded(&region).resize(size, size);
        evaluator
            .evaluate_window(&window)
            .map(|score| Some(score.sanitized()))
    });

    let mut kept = Vec::new();
    let mut skipped = 0usize;
    for (candidate, result) in candidates.iter().zip(results) {
        match result {
            Ok(Some(window)) if window.score >= threshold => {
                kept.push(candidate.with_window_score(&window));
            }
            Ok(Some(_)) => {}
            Ok(None) => skipped += 1,
            Err(e) if e.is_systemic() => return Err(e),
            Err(e) => log::warn!("{stage}: dropping candidate {:?}: {e}", candidate.bbox),
        }
    }

    if skipped > 0 {
        log::debug!(
            "{stage}: skipped {skipped} candidates with an empty, off-image or oversized region"
        );
    }
    log::debug!("{stage}: {} of {} candidates passed", kept.len(), candidates.len());
    Ok(kept)
}

fn is_croppable(region: &Region, image: &ImageTensor) -> bool {
    let limit = MAX_CROP_TO_IMAGE_RATIO * image.width().max(image.height()) as i64;
    !region.is_empty()
        && i64::from(region.width) <= limit
        && i64::from(region.height) <= limit
        && region
            .clamp_to(image.width() as u32, image.height() as u32)
            .is_some()
}
