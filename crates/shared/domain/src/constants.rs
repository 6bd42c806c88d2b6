//! Names shared between slices, tables and API documentation.

// Feature slices
pub const DOCUMENTS: &str = "documents";
pub const PARTS: &str = "parts";
pub const CHANGE: &str = "change";
pub const AUDIT: &str = "audit";

// Tables and sequences
pub const DOCUMENTS_TABLE: &str = "documents";
pub const PARTS_TABLE: &str = "parts";
pub const ISSUES_TABLE: &str = "change_issues";
pub const REQUESTS_TABLE: &str = "change_requests";
pub const SUBSCRIPTIONS_TABLE: &str = "notification_subscriptions";
pub const ISSUE_SEQUENCE: &str = "change_issue";
pub const REQUEST_SEQUENCE: &str = "change_request";

// OpenAPI tags
pub const SYSTEM_TAG: &str = "System";
pub const DOCUMENTS_TAG: &str = "Documents";
pub const PARTS_TAG: &str = "Parts";
pub const ISSUES_TAG: &str = "Change issues";
pub const REQUESTS_TAG: &str = "Change requests";
pub const AUDIT_TAG: &str = "Audit";

/// Upper bound of `/issues/link` search results.
pub const LINK_SEARCH_LIMIT: usize = 8;

/// Storage namespace holding every attachment, keyed by `BinaryResource::full_name`.
pub const FILES_NAMESPACE: &str = "files";
