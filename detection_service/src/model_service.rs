use detect_proto::{DetectionBatch, ImageFrame};
use tonic::{async_trait, Status};

/// Runs a detector over one encoded image.
///
/// Boxes in the returned batch are in pixels of the decoded image, whose size
/// is reported alongside them, and confidences are in `0..=1`.
#[async_trait]
pub trait ModelService: Send + Sync + Clone + 'static {
    async fn predict(&self, frame: ImageFrame) -> Result<DetectionBatch, Status>;
}
