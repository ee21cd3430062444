//! Discord attachment conversion and download.

use parley_core::types::Attachment;

use crate::error::DiscordError;

/// Convert a serenity attachment into the pipeline's representation.
pub fn to_attachment(att: &serenity::model::channel::Attachment) -> Attachment {
    Attachment {
        name: att.filename.clone(),
        url: att.url.clone(),
        content_type: att.content_type.clone(),
        size: u64::from(att.size),
    }
}

pub(crate) async fn download_text(
    client: &reqwest::Client,
    url: &str,
) -> Result<String, DiscordError> {
    let text = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(text)
}
