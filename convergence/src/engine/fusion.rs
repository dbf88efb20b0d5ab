//! Fusion — combine a dirty processor's gist with its linked neighbors'.
//!
//! Pure content combination: the result becomes the processor's prior
//! context for the next Asking phase. Scores are never touched here — they
//! are recomputed fresh next iteration.

use async_trait::async_trait;

/// Error type for fusing backends.
#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    #[error("fusion failed: {0}")]
    FusionFailed(String),
}

/// Combines gists into a single merged context.
///
/// The default is plain concatenation; a summarizing backend (e.g. an LLM
/// condensing the merged text) plugs in through this trait.
#[async_trait]
pub trait Fuser: Send + Sync {
    async fn fuse(&self, own_gist: &str, neighbor_gists: &[String]) -> Result<String, FusionError>;
}

/// Concatenating fuser: own gist first, then each neighbor gist on its own
/// line. Deterministic given the (already sorted) neighbor order.
pub struct ConcatFuser;

#[async_trait]
impl Fuser for ConcatFuser {
    async fn fuse(&self, own_gist: &str, neighbor_gists: &[String]) -> Result<String, FusionError> {
        if neighbor_gists.is_empty() {
            return Ok(own_gist.to_string());
        }
        let mut merged = String::from(own_gist);
        for gist in neighbor_gists {
            merged.push('\n');
            merged.push_str(gist);
        }
        Ok(merged)
    }
}
