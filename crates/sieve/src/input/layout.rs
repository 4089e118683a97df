//! Row and field selection, and header location.
//!
//! A layout only maps raw positions to retained positions. It never looks
//! inside a cell except to test the `"<blank>"` selector and row prefixes.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SieveError};
use crate::report::{ErrorCode, ReportError};

/// Matches blank rows (every cell empty) or blank labels.
pub const BLANK: &str = "<blank>";

/// A row or field selector: a 1-based position or a text pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selector {
    Position(usize),
    Text(String),
}

impl From<usize> for Selector {
    fn from(position: usize) -> Self {
        Selector::Position(position)
    }
}

impl From<&str> for Selector {
    fn from(text: &str) -> Self {
        Selector::Text(text.to_string())
    }
}

fn default_true() -> bool {
    true
}

fn default_header_rows() -> Vec<usize> {
    vec![1]
}

fn default_header_join() -> String {
    " ".to_string()
}

/// Row and field selection policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    #[serde(default = "default_true")]
    pub header: bool,
    /// 1-based positions, counted among rows that pass row selection.
    #[serde(default = "default_header_rows")]
    pub header_rows: Vec<usize>,
    #[serde(default = "default_header_join")]
    pub header_join: String,
    /// Compare labels to field names case-sensitively.
    #[serde(default = "default_true")]
    pub header_case: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pick_fields: Vec<Selector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_fields: Vec<Selector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_fields: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_fields: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pick_rows: Vec<Selector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_rows: Vec<Selector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_rows: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_rows: Option<usize>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            header: true,
            header_rows: default_header_rows(),
            header_join: default_header_join(),
            header_case: true,
            pick_fields: Vec::new(),
            skip_fields: Vec::new(),
            limit_fields: None,
            offset_fields: None,
            pick_rows: Vec::new(),
            skip_rows: Vec::new(),
            limit_rows: None,
            offset_rows: None,
        }
    }
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    pub fn with_header_rows(mut self, rows: Vec<usize>) -> Self {
        self.header_rows = rows;
        self
    }

    pub fn with_header_case(mut self, case: bool) -> Self {
        self.header_case = case;
        self
    }

    pub fn with_pick_fields(mut self, selectors: Vec<Selector>) -> Self {
        self.pick_fields = selectors;
        self
    }

    pub fn with_skip_fields(mut self, selectors: Vec<Selector>) -> Self {
        self.skip_fields = selectors;
        self
    }

    pub fn with_limit_fields(mut self, limit: usize) -> Self {
        self.limit_fields = Some(limit);
        self
    }

    pub fn with_offset_fields(mut self, offset: usize) -> Self {
        self.offset_fields = Some(offset);
        self
    }

    pub fn with_pick_rows(mut self, selectors: Vec<Selector>) -> Self {
        self.pick_rows = selectors;
        self
    }

    pub fn with_skip_rows(mut self, selectors: Vec<Selector>) -> Self {
        self.skip_rows = selectors;
        self
    }

    pub fn with_limit_rows(mut self, limit: usize) -> Self {
        self.limit_rows = Some(limit);
        self
    }

    pub fn with_offset_rows(mut self, offset: usize) -> Self {
        self.offset_rows = Some(offset);
        self
    }

    /// Problems with the layout descriptor.
    pub fn metadata_errors(&self) -> Vec<ReportError> {
        let mut errors = Vec::new();
        if self.header && self.header_rows.is_empty() {
            errors.push(ReportError::general(
                ErrorCode::LayoutError,
                "\"headerRows\" must not be empty when the header is enabled",
            ));
        }
        if self.header_rows.contains(&0) {
            errors.push(ReportError::general(
                ErrorCode::LayoutError,
                "\"headerRows\" positions are 1-based",
            ));
        }
        let positions = self
            .pick_fields
            .iter()
            .chain(&self.skip_fields)
            .chain(&self.pick_rows)
            .chain(&self.skip_rows);
        if positions.into_iter().any(|s| *s == Selector::Position(0)) {
            errors.push(ReportError::general(
                ErrorCode::LayoutError,
                "row and field positions are 1-based",
            ));
        }
        errors
    }

    /// Fail with the first layout problem, if any.
    pub fn validate(&self) -> Result<()> {
        match self.metadata_errors().into_iter().next() {
            Some(error) => Err(SieveError::from(error)),
            None => Ok(()),
        }
    }

    pub fn is_field_filtering(&self) -> bool {
        !self.pick_fields.is_empty()
            || !self.skip_fields.is_empty()
            || self.limit_fields.is_some()
            || self.offset_fields.is_some()
    }

    pub fn is_row_filtering(&self) -> bool {
        !self.pick_rows.is_empty() || !self.skip_rows.is_empty()
    }

    /// Physical header row count consumed before data rows begin.
    pub fn header_span(&self) -> usize {
        if self.header {
            self.header_rows.iter().copied().max().unwrap_or(0)
        } else {
            0
        }
    }

    /// Whether a raw row at `position` survives pick/skip row selection.
    pub fn keeps_row(&self, position: usize, cells: &[String]) -> bool {
        if !self.pick_rows.is_empty()
            && !self.pick_rows.iter().any(|s| row_matches(s, position, cells))
        {
            return false;
        }
        !self.skip_rows.iter().any(|s| row_matches(s, position, cells))
    }

    /// Join header rows (indexed by 1-based position among kept rows) into labels.
    pub fn join_header(&self, rows: &[Vec<String>]) -> Vec<String> {
        let picked: Vec<&Vec<String>> = self
            .header_rows
            .iter()
            .filter_map(|n| n.checked_sub(1).and_then(|i| rows.get(i)))
            .collect();
        let width = picked.iter().map(|r| r.len()).max().unwrap_or(0);
        (0..width)
            .map(|index| {
                let parts: Vec<&str> = picked
                    .iter()
                    .filter_map(|row| row.get(index))
                    .map(|cell| cell.as_str())
                    .filter(|cell| !cell.is_empty())
                    .collect();
                parts.join(&self.header_join)
            })
            .collect()
    }

    /// 1-based raw positions retained by field selection.
    ///
    /// `labels` lets name selectors match; `width` is the widest known row.
    pub fn field_positions(&self, labels: &[String], width: usize) -> Vec<usize> {
        let mut positions: Vec<usize> = (1..=width)
            .filter(|&position| {
                let label = labels.get(position - 1).map(String::as_str);
                let picked = self.pick_fields.is_empty()
                    || self.pick_fields.iter().any(|s| field_matches(s, position, label));
                picked && !self.skip_fields.iter().any(|s| field_matches(s, position, label))
            })
            .collect();
        if let Some(offset) = self.offset_fields {
            positions = positions.into_iter().skip(offset).collect();
        }
        if let Some(limit) = self.limit_fields {
            positions.truncate(limit);
        }
        positions
    }

    /// Keep only the cells at `positions`; no-op without field selection.
    pub fn project(&self, cells: Vec<String>, positions: &[usize]) -> Vec<String> {
        if !self.is_field_filtering() {
            return cells;
        }
        positions
            .iter()
            .filter_map(|&position| cells.get(position - 1).cloned())
            .collect()
    }
}

fn is_blank(cells: &[String]) -> bool {
    cells.iter().all(|cell| cell.is_empty())
}

fn row_matches(selector: &Selector, position: usize, cells: &[String]) -> bool {
    match selector {
        Selector::Position(p) => *p == position,
        Selector::Text(text) if text == BLANK => is_blank(cells),
        Selector::Text(prefix) => cells.first().is_some_and(|cell| cell.starts_with(prefix.as_str())),
    }
}

fn field_matches(selector: &Selector, position: usize, label: Option<&str>) -> bool {
    match selector {
        Selector::Position(p) => *p == position,
        Selector::Text(text) if text == BLANK => label.is_some_and(str::is_empty),
        Selector::Text(name) => label == Some(name.as_str()),
    }
}
