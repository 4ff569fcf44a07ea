//! Column configuration for the document table.
//!
//! Every column id maps to a header label, a relative width class and the
//! views it applies to. Aggregate columns (`agg_` prefix) are presented as a
//! single column but need several underlying fields to be fetched.

use std::fmt;
use std::str::FromStr;

/// Relative width requirement of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidthClass {
    XL,
    L,
    M,
    S,
}

impl WidthClass {
    /// Grid span the width class occupies.
    pub fn span(self) -> u8 {
        match self {
            WidthClass::XL => 6,
            WidthClass::L => 4,
            WidthClass::M => 2,
            WidthClass::S => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WidthClass::XL => "XL",
            WidthClass::L => "L",
            WidthClass::M => "M",
            WidthClass::S => "S",
        }
    }
}

impl FromStr for WidthClass {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "XL" => Ok(WidthClass::XL),
            "L" => Ok(WidthClass::L),
            "M" => Ok(WidthClass::M),
            "S" => Ok(WidthClass::S),
            _ => Err(()),
        }
    }
}

/// Which listing views a column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnScope {
    General,
    SharedWithMe,
}

/// Active document listing view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentView {
    MyDocuments,
    SharedWithMe,
}

impl FromStr for DocumentView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "MY_DOCUMENTS" => Ok(DocumentView::MyDocuments),
            "SHARED_WITH_ME" => Ok(DocumentView::SharedWithMe),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for DocumentView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentView::MyDocuments => f.write_str("MY_DOCUMENTS"),
            DocumentView::SharedWithMe => f.write_str("SHARED_WITH_ME"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub id: &'static str,
    pub label: &'static str,
    pub width: WidthClass,
    pub scope: ColumnScope,
}

const fn general(id: &'static str, label: &'static str, width: WidthClass) -> ColumnDescriptor {
    ColumnDescriptor {
        id,
        label,
        width,
        scope: ColumnScope::General,
    }
}

const fn shared(id: &'static str, label: &'static str, width: WidthClass) -> ColumnDescriptor {
    ColumnDescriptor {
        id,
        label,
        width,
        scope: ColumnScope::SharedWithMe,
    }
}

/// All selectable columns in display order: general columns first, then
/// the ones specific to the shared-with-me view.
pub const COLUMNS: &[ColumnDescriptor] = &[
    general("author", "Author", WidthClass::M),
    general("title", "Title", WidthClass::L),
    general("language", "Language", WidthClass::M),
    general("date_freeform", "Date", WidthClass::M),
    general("uploaded_at", "Uploaded at", WidthClass::M),
    general("last_edit_at", "Last edit", WidthClass::M),
    general("last_edit_by", "Last edit by", WidthClass::M),
    general("my_last_edit_at", "My last edit", WidthClass::M),
    general("annotations", "Annotations", WidthClass::M),
    general("my_annotations", "My annotations", WidthClass::M),
    general("public_visibility", "Visibility", WidthClass::M),
    general("status_ratio", "Verification ratio", WidthClass::M),
    general("cloned_from", "Cloned from", WidthClass::M),
    general("has_clones", "Has clones", WidthClass::S),
    shared("owner", "Document owner", WidthClass::M),
    shared("shared_by", "Shared by", WidthClass::M),
    shared("access_level", "Access", WidthClass::M),
];

/// Aggregate columns, not offered in `COLUMNS` but valid in a column list.
pub const AGGREGATE_COLUMNS: &[(ColumnDescriptor, &[&str])] = &[(
    general("agg_document", "Document", WidthClass::XL),
    &["author", "document"],
)];

const AGGREGATE_PREFIX: &str = "agg_";

pub fn descriptor(column: &str) -> Option<&'static ColumnDescriptor> {
    COLUMNS
        .iter()
        .chain(AGGREGATE_COLUMNS.iter().map(|(d, _)| d))
        .find(|d| d.id == column)
}

pub fn header_name(column: &str) -> Option<&'static str> {
    descriptor(column).map(|d| d.label)
}

pub fn column_width(column: &str) -> Option<WidthClass> {
    descriptor(column).map(|d| d.width)
}

/// Grid span for a width class name; `None` for unknown classes.
pub fn get_span(width: &str) -> Option<u8> {
    width.parse::<WidthClass>().ok().map(WidthClass::span)
}

/// Grid span for a column id; `None` for unknown columns.
pub fn column_span(column: &str) -> Option<u8> {
    column_width(column).map(WidthClass::span)
}

pub fn is_aggregate(column: &str) -> bool {
    column.starts_with(AGGREGATE_PREFIX)
}

fn aggregate_members(column: &str) -> &'static [&'static str] {
    AGGREGATE_COLUMNS
        .iter()
        .find(|(d, _)| d.id == column)
        .map(|(_, members)| *members)
        .unwrap_or(&[])
}

/// Replaces aggregate columns with the columns needed to build them.
pub fn expand_aggregated_columns<S: AsRef<str>>(columns: &[S]) -> Vec<String> {
    columns
        .iter()
        .flat_map(|column| {
            let column = column.as_ref();
            if is_aggregate(column) {
                aggregate_members(column)
                    .iter()
                    .map(|c| c.to_string())
                    .collect()
            } else {
                vec![column.to_string()]
            }
        })
        .collect()
}

/// Removes the columns that do not apply in `view`.
pub fn filter_by_view<S: AsRef<str>>(columns: &[S], view: DocumentView) -> Vec<String> {
    columns
        .iter()
        .map(|column| column.as_ref())
        .filter(|column| match view {
            DocumentView::MyDocuments => descriptor(column)
                .map_or(true, |d| d.scope != ColumnScope::SharedWithMe),
            DocumentView::SharedWithMe => true,
        })
        .map(str::to_string)
        .collect()
}
