//! MIME classification for Drive files.

use mime::Mime;

/// Prefix shared by all provider-native document types.
pub const GOOGLE_APPS_PREFIX: &str = "application/vnd.google-apps.";

/// Google Docs document.
pub const GOOGLE_DOCUMENT: &str = "application/vnd.google-apps.document";

/// Google Sheets spreadsheet.
pub const GOOGLE_SPREADSHEET: &str = "application/vnd.google-apps.spreadsheet";

/// Google Slides presentation.
pub const GOOGLE_PRESENTATION: &str = "application/vnd.google-apps.presentation";

/// Apps Script project.
pub const GOOGLE_SCRIPT: &str = "application/vnd.google-apps.script";

/// Export type for Apps Script projects.
pub const SCRIPT_JSON: &str = "application/vnd.google-apps.script+json";

/// Fallback for content whose type cannot be inferred.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// True for provider-native documents, which must be exported.
pub fn is_native(mime_type: &str) -> bool {
    mime_type.starts_with(GOOGLE_APPS_PREFIX)
}

/// Export format for a native document type.
pub fn export_mime_for(mime_type: &str) -> &'static str {
    match mime_type {
        GOOGLE_SPREADSHEET => "text/csv",
        GOOGLE_SCRIPT => SCRIPT_JSON,
        GOOGLE_DOCUMENT | GOOGLE_PRESENTATION => "text/plain",
        _ => "text/plain",
    }
}

/// Infers a MIME type from a file name extension.
pub fn infer_from_file_name(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

/// How the content of a newly created file is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentHandling {
    /// Export the native document as text.
    Export,
    /// Download the content and report it as text.
    InlineText,
    /// Report the file name instead of binary content.
    Placeholder,
}

/// Chooses the content handling for a MIME type.
pub fn content_handling(mime_type: &str) -> ContentHandling {
    if is_native(mime_type) {
        return ContentHandling::Export;
    }

    let Ok(parsed) = mime_type.parse::<Mime>() else {
        return ContentHandling::Placeholder;
    };

    if parsed.type_() == mime::TEXT
        || (parsed.type_() == mime::APPLICATION && parsed.subtype() == mime::JSON)
    {
        ContentHandling::InlineText
    } else {
        ContentHandling::Placeholder
    }
}
