//! Opens the release archive and works out how it is encoded.

use std::fmt;

use tracing::{debug, info};
use zup_schema::{ArchiveCodec, ResourceDescriptor, codec};

use crate::error::Result;
use crate::http::{ByteStream, HttpClient};

/// An archive body positioned at its first byte, tagged with its codec.
pub struct ArtifactStream {
    pub codec: ArchiveCodec,
    pub body: ByteStream,
}

impl fmt::Debug for ArtifactStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactStream")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

/// GET the archive and classify it from the response headers, falling back
/// to the request path.
///
/// The body is handed back unread. When no codec can be determined the
/// response is dropped, closing the connection.
pub async fn open_artifact_stream(
    client: &dyn HttpClient,
    resource: &ResourceDescriptor,
) -> Result<ArtifactStream> {
    let url = resource.archive_url();
    info!("Downloading {url}");
    let response = client.get(url).await?;

    let codec = codec::detect(
        response.content_type.as_deref(),
        response.content_disposition.as_deref(),
        url.path(),
    )?;
    debug!(
        "Codec {codec} (content-type: {:?}, disposition: {:?})",
        response.content_type, response.content_disposition
    );

    Ok(ArtifactStream {
        codec,
        body: response.body,
    })
}
