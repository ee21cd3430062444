use parley_core::types::Attachment;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    /// Forwarded to multimodal models as an image reference.
    Image,
    /// Plain text or markdown, fetched and inlined.
    Text,
    Other,
}

/// Classify by content type, falling back to the file extension.
pub fn classify(attachment: &Attachment) -> AttachmentKind {
    if let Some(ct) = attachment.content_type.as_deref() {
        let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            return AttachmentKind::Image;
        }
        if mime == "text/plain" || mime == "text/markdown" || mime == "text/x-markdown" {
            return AttachmentKind::Text;
        }
    }

    let ext = attachment
        .name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        AttachmentKind::Image
    } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        AttachmentKind::Text
    } else {
        AttachmentKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn att(name: &str, ct: Option<&str>) -> Attachment {
        Attachment {
            name: name.into(),
            url: format!("https://cdn.example/{name}"),
            content_type: ct.map(String::from),
            size: 10,
        }
    }

    #[test]
    fn content_type_wins() {
        assert_eq!(classify(&att("blob", Some("image/png"))), AttachmentKind::Image);
        assert_eq!(
            classify(&att("notes", Some("text/plain; charset=utf-8"))),
            AttachmentKind::Text
        );
    }

    #[test]
    fn extension_fallback() {
        assert_eq!(classify(&att("cat.JPG", None)), AttachmentKind::Image);
        assert_eq!(classify(&att("README.md", None)), AttachmentKind::Text);
        assert_eq!(classify(&att("song.mp3", None)), AttachmentKind::Other);
        assert_eq!(
            classify(&att("data.bin", Some("application/octet-stream"))),
            AttachmentKind::Other
        );
    }
}
