use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(DocumentId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub label: String,
    pub value: String,
}

impl Tag {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    /// Format tag, the uppercased file extension.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable size such as `9kb`.
    pub size: String,
    pub last_modified: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub is_expandable: bool,
}

/// Input for a freshly uploaded document; the repository derives the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocumentInput {
    pub file_name: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default = "default_expandable")]
    pub is_expandable: bool,
}

fn default_expandable() -> bool {
    true
}

impl NewDocumentInput {
    pub fn new(file_name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            file_name: file_name.into(),
            size_bytes,
            tags: Vec::new(),
            is_expandable: true,
        }
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }
}

/// Partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPatch {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub size: Option<String>,
    pub tags: Option<Vec<Tag>>,
    pub is_expandable: Option<bool>,
}


/// Tag constraints a document must satisfy to be visible. Empty fields impose nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub brand: String,
    #[serde(default)]
    pub category: Option<String>,
}

impl FilterOptions {
    pub fn new(brand: impl Into<String>, category: Option<String>) -> Self {
        Self {
            brand: brand.into(),
            category,
        }
    }

    /// Non-empty `(field name, expected value)` pairs.
    pub fn constraints(&self) -> Vec<(&'static str, &str)> {
        let mut out = Vec::with_capacity(2);
        if !self.brand.is_empty() {
            out.push(("brand", self.brand.as_str()));
        }
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            out.push(("category", category));
        }
        out
    }

    pub fn is_unconstrained(&self) -> bool {
        self.constraints().is_empty()
    }
}

pub const ACCEPTED_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "csv", "tsv", "txt", "json",
];

pub const SOFT_SIZE_LIMIT_BYTES: u64 = 10 * 1024 * 1024;

/// File chosen in the uploader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSelection {
    pub file_name: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub mime_or_extension: String,
}

impl FileSelection {
    pub fn new(file_name: impl Into<String>, size_bytes: u64) -> Self {
        let file_name = file_name.into();
        let mime_or_extension = file_extension(&file_name).unwrap_or_default().to_string();
        Self {
            file_name,
            size_bytes,
            mime_or_extension,
        }
    }

    /// Lowercased extension, preferring the file name over the declared type.
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.file_name)
            .or_else(|| {
                let declared = self.mime_or_extension.trim().trim_start_matches('.');
                let declared = declared.rsplit('/').next().unwrap_or(declared);
                (!declared.is_empty()).then_some(declared)
            })
            .map(|ext| ext.to_ascii_lowercase())
    }

    pub fn is_accepted(&self, accepted: &[String]) -> bool {
        self.extension()
            .map(|ext| accepted.iter().any(|a| a.eq_ignore_ascii_case(&ext)))
            .unwrap_or(false)
    }

    pub fn exceeds_soft_limit(&self, limit_bytes: u64) -> bool {
        self.size_bytes > limit_bytes
    }
}

/// Text after the last `.` of a file name, if any.
pub fn file_extension(file_name: &str) -> Option<&str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    (!ext.is_empty()).then_some(ext)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStatus {
    None,
    Some,
    All,
}
