use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// Language value that marks a library as plain text rather than code.
pub const TEXT_LANGUAGE: &str = "text";

/// Default version written into library files that omit one.
pub const DEFAULT_LIBRARY_VERSION: &str = "1.0";

/// A named, tagged block of reusable text.
///
/// `library_name` and `language` are copied from the owning library at load
/// time so that filtering never has to walk back to the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub id: String,
    pub name: String,
    pub content: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub library_name: String,
    pub language: String,
}

impl Snippet {
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content: content.into(),
            description: String::new(),
            category: String::new(),
            tags: Vec::new(),
            library_name: String::new(),
            language: String::new(),
        }
    }

    /// Case-insensitive substring match against name, description or any tag.
    /// An empty query matches everything.
    pub fn matches_filter(&self, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }

        let query = query.to_lowercase();
        self.name.to_lowercase().contains(&query)
            || self.description.to_lowercase().contains(&query)
            || self.tags.iter().any(|tag| tag.to_lowercase().contains(&query))
    }

    /// First line of the content, cut to `max_chars` characters.
    pub fn preview(&self, max_chars: usize) -> String {
        let first_line = self.content.lines().next().unwrap_or_default();
        let mut preview: String = first_line.chars().take(max_chars).collect();
        if first_line.chars().count() > max_chars || self.content.lines().nth(1).is_some() {
            preview.push('…');
        }
        preview
    }

    pub(crate) fn to_record(&self) -> SnippetRecord {
        SnippetRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            content: self.content.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// One loaded definition file.
///
/// Libraries are values: a reload builds new ones and replaces the old set
/// wholesale, nothing edits a published library in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    pub name: String,
    pub description: String,
    pub language: String,
    pub file_extensions: Vec<String>,
    pub version: String,
    pub author: String,
    pub source_path: Option<PathBuf>,
    pub snippets: Vec<Snippet>,
}

impl Library {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            language: String::new(),
            file_extensions: Vec::new(),
            version: DEFAULT_LIBRARY_VERSION.to_string(),
            author: String::new(),
            source_path: None,
            snippets: Vec::new(),
        }
    }

    /// Whether this library holds code rather than prose.
    pub fn is_code(&self) -> bool {
        !self.language.is_empty() && !self.language.eq_ignore_ascii_case(TEXT_LANGUAGE)
    }

    /// Sorted, distinct, non-empty categories.
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .snippets
            .iter()
            .filter(|s| !s.category.is_empty())
            .map(|s| s.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }

    pub fn snippets_in_category(&self, category: &str) -> Vec<&Snippet> {
        self.snippets
            .iter()
            .filter(|s| s.category == category)
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Snippet> {
        self.snippets.iter().find(|s| s.id == id)
    }

    /// Stamp owner fields onto a snippet before it joins this library.
    pub fn adopt(&self, mut snippet: Snippet) -> Snippet {
        snippet.library_name = self.name.clone();
        snippet.language = self.language.clone();
        snippet
    }

    /// Serialize to the on-disk record shape, omitting empty optional fields.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        let record = LibraryRecord {
            name: self.name.clone(),
            description: self.description.clone(),
            language: self.language.clone(),
            file_extensions: self.file_extensions.clone(),
            version: self.version.clone(),
            author: self.author.clone(),
            snippets: self.snippets.iter().map(Snippet::to_record).collect(),
        };
        serde_json::to_string_pretty(&record)
    }
}

/// On-disk shape of a library file. Only structure is checked here; the
/// loader validates ids, blank names and empty lists.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LibraryRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_extensions: Vec<String>,
    #[serde(
        default = "default_version",
        deserialize_with = "version_text",
        skip_serializing_if = "String::is_empty"
    )]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    pub snippets: Vec<SnippetRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SnippetRecord {
    pub id: String,
    pub name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

fn default_version() -> String {
    DEFAULT_LIBRARY_VERSION.to_string()
}

/// Hand-written files often say `"version": 1.0`, so numbers are accepted too.
fn version_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Version {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Option::<Version>::deserialize(deserializer)? {
        Some(Version::Text(text)) => text,
        Some(Version::Number(number)) => number.to_string(),
        None => default_version(),
    })
}

/// Snippet ids are a lowercase letter followed by lowercase letters, digits
/// or underscores.
pub fn is_valid_id(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// File-name friendly form of a library name: "My Snippets" -> "my-snippets".
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}
