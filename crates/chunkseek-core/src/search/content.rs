use tracing::{debug, warn};

use super::require_non_empty;
use crate::accessor::ChunkStoreAccessor;
use crate::cancel::CancellationToken;
use crate::error::{Result, RetrievalError};
use crate::format::ContentResponse;
use crate::reconstruct::{reconstruct, ReconstructConfig};
use crate::store::ChunkStore;

/// Parameters for [`get_content`].
#[derive(Debug, Clone)]
pub struct ContentParams {
    pub file_name: String,
    /// Attach the metadata of the file's first chunk.
    pub include_metadata: bool,
}

impl ContentParams {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            include_metadata: false,
        }
    }
}

/// Fetch every chunk of one file and reconstruct its full text.
///
/// Fails with [`RetrievalError::NotFound`] if the file has no chunks. Joins
/// made without a detected overlap are reported in the response and logged
/// at warn level.
pub async fn get_content<S: ChunkStore + ?Sized>(
    accessor: &ChunkStoreAccessor<'_, S>,
    params: &ContentParams,
    config: &ReconstructConfig,
    cancel: &CancellationToken,
) -> Result<ContentResponse> {
    require_non_empty("file_name", &params.file_name)?;
    config.validate()?;

    let chunks = accessor
        .find_all_chunks_for_file(&params.file_name, cancel)
        .await?;
    if chunks.is_empty() {
        return Err(RetrievalError::NotFound(params.file_name.clone()));
    }

    let metadata = if params.include_metadata {
        chunks
            .iter()
            .min_by_key(|c| c.chunk_id)
            .map(|c| c.metadata.clone())
    } else {
        None
    };

    let doc = reconstruct(&chunks, config);
    if doc.is_ambiguous() {
        warn!(
            file_name = %params.file_name,
            boundaries = doc.ambiguous_boundaries.len(),
            "reconstruction joined chunks without detected overlap; content may repeat"
        );
    }
    debug!(
        file_name = %params.file_name,
        chunks = doc.chunk_count,
        method = ?doc.method,
        "file reconstructed"
    );

    Ok(ContentResponse::new(&params.file_name, doc, metadata))
}
