//! Error attachments
//!
//! Binary or text payloads sent alongside a managed error log, either
//! supplied by the application listener or synthesized from a minidump.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::newtypes::{AttachmentId, ReportId};

/// Content type of plain text attachments
pub const CONTENT_TYPE_TEXT_PLAIN: &str = "text/plain";

/// Content type of binary attachments, including minidumps
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// One attachment of an error report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorAttachmentLog {
    pub id: AttachmentId,
    /// Report this attachment belongs to; set when the report is approved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_id: Option<ReportId>,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(serialize_with = "encode_data", deserialize_with = "decode_data")]
    pub data: Vec<u8>,
}

impl ErrorAttachmentLog {
    /// Builds a UTF-8 text attachment
    pub fn attachment_with_text(text: &str, file_name: impl Into<String>) -> Self {
        Self::attachment_with_binary(text.as_bytes().to_vec(), file_name, CONTENT_TYPE_TEXT_PLAIN)
    }

    /// Builds a binary attachment with an explicit content type
    pub fn attachment_with_binary(
        data: Vec<u8>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            id: AttachmentId::new(),
            error_id: None,
            content_type: content_type.into(),
            file_name: Some(file_name.into()),
            data,
        }
    }

    /// Associates the attachment with a report
    pub fn with_error_id(mut self, error_id: ReportId) -> Self {
        self.error_id = Some(error_id);
        self
    }

    /// An attachment is sendable once it has data, a content type and a report
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty() && !self.content_type.trim().is_empty() && self.error_id.is_some()
    }
}

fn encode_data<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(data))
}

fn decode_data<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD.decode(encoded).map_err(serde::de::Error::custom)
}
