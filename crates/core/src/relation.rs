use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Table,
    View,
}

impl RelationKind {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("table") {
            Some(Self::Table)
        } else if raw.eq_ignore_ascii_case("view") {
            Some(Self::View)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
        }
    }

    #[must_use]
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Table => "tables",
            Self::View => "views",
        }
    }

    #[must_use]
    pub fn noun(self) -> &'static str {
        match self {
            Self::Table => "Table",
            Self::View => "View",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub id: String,
    pub kind: RelationKind,
    pub columns: Vec<String>,
}

impl RelationDescriptor {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: RelationKind, columns: Vec<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            columns,
        }
    }

    #[must_use]
    pub fn table(id: impl Into<String>) -> Self {
        Self::new(id, RelationKind::Table, Vec::new())
    }

    #[must_use]
    pub fn view(id: impl Into<String>) -> Self {
        Self::new(id, RelationKind::View, Vec::new())
    }

    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.kind == other.kind && self.id == other.id
    }

    #[must_use]
    pub fn refers_to(&self, target: &RelationRef) -> bool {
        self.kind == target.kind && self.id == target.name
    }

    #[must_use]
    pub fn reference(&self) -> RelationRef {
        RelationRef::new(self.kind, self.id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationRef {
    pub kind: RelationKind,
    pub name: String,
}

impl RelationRef {
    #[must_use]
    pub fn new(kind: RelationKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for RelationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\"", self.kind.noun(), self.name)
    }
}
