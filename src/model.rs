//! Result record types for every tool. Field names serialize to the wire
//! shapes the original catalog views expose (upper-case catalog column names
//! where the view is the source of truth, lower-case where the tool composes
//! its own payload).

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct LibraryInfo {
    #[serde(rename = "LIBRARY_NAME")]
    pub name: String,
    #[serde(rename = "LIBRARY_TEXT")]
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    #[serde(rename = "TABLE_NAME")]
    pub name: String,
    #[serde(rename = "TABLE_TEXT")]
    pub text: String,
    /// P = physical, L = logical, V = view.
    #[serde(rename = "TABLE_TYPE")]
    pub table_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    #[serde(rename = "COLUMN_NAME")]
    pub name: String,
    /// Descriptive label; frequently non-Latin text used as a screen caption.
    #[serde(rename = "COLUMN_TEXT")]
    pub label: String,
    #[serde(rename = "DATA_TYPE")]
    pub data_type: String,
    #[serde(rename = "LENGTH")]
    pub length: i64,
    #[serde(rename = "DECIMAL_PLACES")]
    pub scale: i64,
    #[serde(rename = "IS_NULLABLE")]
    pub nullable: String,
    #[serde(rename = "ORDINAL_POSITION")]
    pub ordinal: i64,
    #[serde(rename = "DEFAULT_VALUE")]
    pub default: String,
    #[serde(rename = "CCSID")]
    pub ccsid: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceFileInfo {
    #[serde(rename = "SOURCE_FILE")]
    pub name: String,
    #[serde(rename = "DESCRIPTION")]
    pub description: String,
    #[serde(rename = "MEMBER_COUNT")]
    pub member_count: i64,
    /// Encoding of the SRCDTA payload column; decides the upload path.
    #[serde(rename = "CCSID")]
    pub ccsid: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberInfo {
    #[serde(rename = "MEMBER_NAME")]
    pub name: String,
    #[serde(rename = "SOURCE_TYPE")]
    pub source_type: String,
    #[serde(rename = "MEMBER_TEXT")]
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceLine {
    /// Sequence numbers are fractional in the wider system; uploads here
    /// always assign consecutive integers.
    pub seq: f64,
    /// Last-update date in the system's 6-digit YYMMDD form.
    pub date: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceMember {
    pub metadata: MemberInfo,
    pub source_lines: Vec<SourceLine>,
    pub source_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexInfo {
    #[serde(rename = "INDEX_NAME")]
    pub name: String,
    #[serde(rename = "INDEX_TEXT")]
    pub text: String,
    #[serde(rename = "IS_UNIQUE")]
    pub unique: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableDetail {
    pub table: TableInfo,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
    pub indexes: Vec<IndexInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgramInfo {
    #[serde(rename = "PROGRAM_NAME")]
    pub name: String,
    #[serde(rename = "ATTRIBUTE")]
    pub attribute: String,
    #[serde(rename = "PROGRAM_TEXT")]
    pub text: String,
    #[serde(rename = "CREATED")]
    pub created: String,
    #[serde(rename = "CHANGED")]
    pub changed: String,
    #[serde(rename = "PROGRAM_SIZE")]
    pub size: Option<i64>,
    #[serde(rename = "SOURCE_FILE")]
    pub source_file: String,
    #[serde(rename = "SOURCE_LIBRARY")]
    pub source_library: String,
    #[serde(rename = "SOURCE_MEMBER")]
    pub source_member: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataAreaInfo {
    pub name: String,
    /// *CHAR or *DEC.
    #[serde(rename = "type")]
    pub area_type: String,
    pub length: Option<i64>,
    pub decimal_positions: i64,
    pub value: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReference {
    pub file: String,
    pub library: String,
    pub usage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramCall {
    pub program: String,
    pub library: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceAnalysisNote {
    pub method: String,
    pub source_file: String,
    pub source_type: String,
    pub note: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoundModule {
    pub module: String,
    pub library: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgramReferences {
    pub program: String,
    pub referenced_files: Vec<FileReference>,
    pub called_programs: Vec<ProgramCall>,
    /// Modules bound into an ILE program; empty for OPM programs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bound_modules: Vec<BoundModule>,
    /// Present when the result was derived by source analysis rather than the
    /// catalog's dependency views; consumers must not treat it as authoritative.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceAnalysisNote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub success: bool,
    pub message: String,
    pub line_count: usize,
    pub source_type: String,
    /// Target file encoding and write method used (`sql_insert` or
    /// `iconv+ftp`); callers need both to diagnose encoding mismatches.
    pub ccsid: Option<i64>,
    pub method: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabeledColumn {
    pub name: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataPage {
    pub columns: Vec<LabeledColumn>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub row_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SqlResult {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub row_count: usize,
}
