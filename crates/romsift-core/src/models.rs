use serde::{Deserialize, Serialize};

/// Label shown for an empty rank or genre value in menus. The SQL side
/// always matches the literal empty string, never this label.
pub const BLANK_LABEL: &str = "Blank";

/// A catalog entry. Read-only: the catalog database is supplied
/// pre-built and never written by this application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub name: String,
    pub description: String,
    pub developer: String,
    pub series: String,
    pub category: String,
    pub genre: String,
    pub rank: String,
    pub screenless: bool,
    /// Companion CHD disk name; `None` means the game has no disk.
    pub disk: Option<String>,
}

/// A named game set plus its source/target locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    /// Download files when true; copy from the source dirs when false.
    pub online: bool,
    pub rom_source: String,
    pub chd_source: String,
    pub rom_target: String,
    pub chd_target: String,
}

/// One unit of work for the acquisition pipeline: a game and, when
/// present, its companion disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionItem {
    pub name: String,
    pub disk: Option<String>,
}

/// Which catalog column a free-text search matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchField {
    Name,
    Description,
    Developer,
    Series,
}

impl SearchField {
    /// Column name as it appears in the catalog schema.
    pub fn as_column(&self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Description => "Description",
            Self::Developer => "Developer",
            Self::Series => "Series",
        }
    }

    pub const ALL: &'static [SearchField] = &[
        Self::Name,
        Self::Description,
        Self::Developer,
        Self::Series,
    ];
}

impl std::fmt::Display for SearchField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_column())
    }
}

/// Grid columns. `Selected` is synthetic (the checkbox column) and is
/// never a sort target; clicking its header means select/deselect all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridColumn {
    Selected,
    Name,
    Description,
    Developer,
    Series,
    Category,
    Genre,
    Rank,
}

impl GridColumn {
    /// Catalog column used in ORDER BY, or `None` for the checkbox column.
    pub fn sort_column(&self) -> Option<&'static str> {
        match self {
            Self::Selected => None,
            Self::Name => Some("Name"),
            Self::Description => Some("Description"),
            Self::Developer => Some("Developer"),
            Self::Series => Some("Series"),
            Self::Category => Some("Cat"),
            Self::Genre => Some("Genre"),
            Self::Rank => Some("Rank"),
        }
    }

    pub const ALL: &'static [GridColumn] = &[
        Self::Selected,
        Self::Name,
        Self::Description,
        Self::Developer,
        Self::Series,
        Self::Category,
        Self::Genre,
        Self::Rank,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }

    pub fn flipped(&self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

/// Results-per-page choices offered by the UI.
pub const PAGE_SIZES: &[u32] = &[50, 100, 500, 1000];

/// Display a rank/genre value, substituting the blank sentinel.
pub fn display_value(v: &str) -> &str {
    if v.is_empty() {
        BLANK_LABEL
    } else {
        v
    }
}
