use std::path::PathBuf;

use async_trait::async_trait;

use crate::{album::AlbumId, Result};

#[derive(Clone, Debug)]
pub struct FetchRequest {
    pub album_id: AlbumId,
    /// Directory the album folders must be created in. Exclusive to this request.
    pub dest_dir: PathBuf,
}

#[derive(Clone, Debug, Default)]
pub struct FetchOutput {
    /// Album folders produced by this fetch, one image per page inside each.
    pub folders: Vec<PathBuf>,
}

/// Port for the album downloader.
///
/// Implementations report the folders they produced explicitly; callers never
/// scan shared directories to find them.
#[async_trait]
pub trait AlbumFetcher: Send + Sync {
    async fn fetch(&self, req: FetchRequest) -> Result<FetchOutput>;
}
