//! Execution requests for the invoice pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineResult;

/// Subject marker for account-assignment updates.
pub const ACCOUNT_ASSIGNMENT_SUBJECT: &str = "UPDATED ACCOUNT ASSIGNMENTS";

/// True when a subject line marks an account-assignment update.
pub fn subject_flag(subject: &str) -> bool {
    subject.contains(ACCOUNT_ASSIGNMENT_SUBJECT)
}

/// Attachment kind, as dispatched by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    Pdf,
    Excel,
    Doc,
    #[serde(other)]
    Other,
}

impl AttachmentType {
    /// Classify by file extension, ignoring case.
    pub fn from_filename(filename: &str) -> Self {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Self::Pdf,
            "xlsx" | "xls" => Self::Excel,
            "docx" | "doc" => Self::Doc,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Excel => "excel",
            Self::Doc => "doc",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for AttachmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attachment of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentType,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,
}

impl Attachment {
    /// Attachment classified from its filename.
    pub fn from_filename(filename: impl Into<String>) -> Self {
        let filename = filename.into();
        Self {
            kind: AttachmentType::from_filename(&filename),
            filename,
            message_id: None,
            bucket_name: None,
        }
    }
}

/// An inbound message ready to enter the invoice pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub message_id: String,
    pub bucket_name: String,
    #[serde(default)]
    pub subject_flag: bool,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl ExecutionRequest {
    pub fn new(message_id: impl Into<String>, bucket_name: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            bucket_name: bucket_name.into(),
            subject_flag: false,
            attachments: Vec::new(),
        }
    }

    /// Set the flag from a subject line.
    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject_flag = subject_flag(subject);
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Initial execution context.
    ///
    /// Attachments inherit the message id and bucket when they carry none.
    pub fn into_context(self) -> EngineResult<Value> {
        let Self {
            message_id,
            bucket_name,
            subject_flag,
            attachments,
        } = self;

        let attachments: Vec<Attachment> = attachments
            .into_iter()
            .map(|mut attachment| {
                attachment.message_id.get_or_insert_with(|| message_id.clone());
                attachment.bucket_name.get_or_insert_with(|| bucket_name.clone());
                attachment
            })
            .collect();

        Ok(serde_json::to_value(ExecutionRequest {
            message_id,
            bucket_name,
            subject_flag,
            attachments,
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subject_flag() {
        assert!(subject_flag("FW: UPDATED ACCOUNT ASSIGNMENTS for Q3"));
        assert!(!subject_flag("Invoice #4411"));
        assert!(!subject_flag("updated account assignments"));
    }

    #[test]
    fn test_attachment_type_from_filename() {
        assert_eq!(AttachmentType::from_filename("scan.PDF"), AttachmentType::Pdf);
        assert_eq!(AttachmentType::from_filename("q3.xlsx"), AttachmentType::Excel);
        assert_eq!(AttachmentType::from_filename("old.xls"), AttachmentType::Excel);
        assert_eq!(AttachmentType::from_filename("memo.docx"), AttachmentType::Doc);
        assert_eq!(AttachmentType::from_filename("memo.Doc"), AttachmentType::Doc);
        assert_eq!(AttachmentType::from_filename("logo.png"), AttachmentType::Other);
        assert_eq!(AttachmentType::from_filename("README"), AttachmentType::Other);
    }

    #[test]
    fn test_unknown_type_deserializes_as_other() {
        let attachment: Attachment =
            serde_json::from_value(json!({"type": "zip", "filename": "a.zip"})).unwrap();
        assert_eq!(attachment.kind, AttachmentType::Other);
    }

    #[test]
    fn test_into_context() {
        let ctx = ExecutionRequest::new("m-1", "inbox")
            .with_subject("Invoice attached")
            .with_attachment(Attachment::from_filename("a.pdf"))
            .into_context()
            .unwrap();

        assert_eq!(
            ctx,
            json!({
                "messageId": "m-1",
                "bucketName": "inbox",
                "subjectFlag": false,
                "attachments": [
                    {"type": "pdf", "filename": "a.pdf", "messageId": "m-1", "bucketName": "inbox"}
                ]
            })
        );
    }

    #[test]
    fn test_request_defaults() {
        let request: ExecutionRequest =
            serde_json::from_value(json!({"messageId": "m-2", "bucketName": "inbox"})).unwrap();
        assert!(!request.subject_flag);
        assert!(request.attachments.is_empty());
    }
}
