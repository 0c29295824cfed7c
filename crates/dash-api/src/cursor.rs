//! Cursor-based list requests and their JSON body shape.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::types::{ListKind, Paginated, SortKey};

/// Boundary marker for the page adjacent to a known item.
///
/// Descending cursors ask for items strictly older than the boundary,
/// ascending cursors for items strictly newer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaginationCursor {
    pub prev_timestamp: DateTime<Utc>,
    pub prev_id: String,
    pub ascending: bool,
}

impl PaginationCursor {
    /// Cursor for the page after `item` in display (descending) order.
    pub fn after<T: Paginated>(item: &T) -> Self {
        Self::from_key(item.sort_key(), false)
    }

    /// Cursor for the page before `item` in display order.
    pub fn before<T: Paginated>(item: &T) -> Self {
        Self::from_key(item.sort_key(), true)
    }

    pub fn from_key(key: SortKey, ascending: bool) -> Self {
        Self {
            prev_timestamp: key.timestamp,
            prev_id: key.id,
            ascending,
        }
    }

    pub fn key(&self) -> SortKey {
        SortKey::new(self.prev_timestamp, self.prev_id.clone())
    }

    /// Wire form of the boundary timestamp.
    pub fn timestamp_param(&self) -> String {
        self.prev_timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

/// Base filter parameters of one list view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ListFilter {
    pub project_name: Option<String>,
    pub only_active: Option<bool>,
}

impl ListFilter {
    pub fn project(name: impl Into<String>) -> Self {
        Self {
            project_name: Some(name.into()),
            only_active: None,
        }
    }

    pub fn only_active(mut self, only_active: bool) -> Self {
        self.only_active = Some(only_active);
        self
    }
}

/// One list call: filter, optional boundary, page size.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListRequest {
    pub filter: ListFilter,
    pub cursor: Option<PaginationCursor>,
    pub limit: usize,
    /// Must reach the server even if a response cache holds an answer.
    /// Not part of the wire body.
    pub refetch: bool,
}

impl ListRequest {
    /// First page of a list.
    pub fn first(filter: ListFilter, limit: usize) -> Self {
        Self {
            filter,
            cursor: None,
            limit,
            refetch: false,
        }
    }

    pub fn with_cursor(&self, cursor: PaginationCursor) -> Self {
        Self {
            filter: self.filter.clone(),
            cursor: Some(cursor),
            limit: self.limit,
            refetch: false,
        }
    }

    /// The same request, marked to bypass response caches.
    pub fn refetched(&self) -> Self {
        Self {
            refetch: true,
            ..self.clone()
        }
    }

    pub fn is_ascending(&self) -> bool {
        self.cursor.as_ref().is_some_and(|c| c.ascending)
    }

    /// JSON body for the list endpoint of `kind`.
    ///
    /// The boundary timestamp goes under `prev_<timestamp field>`; unset
    /// optional parameters are omitted rather than sent as null.
    pub fn to_body(&self, kind: ListKind) -> Value {
        let mut body = Map::new();

        if let Some(project) = &self.filter.project_name {
            if kind.takes_project_list() {
                body.insert(
                    "project_names".into(),
                    Value::Array(vec![Value::String(project.clone())]),
                );
            } else {
                body.insert("project_name".into(), Value::String(project.clone()));
            }
        }
        if kind.supports_only_active() {
            if let Some(only_active) = self.filter.only_active {
                body.insert("only_active".into(), Value::Bool(only_active));
            }
        }
        if let Some(cursor) = &self.cursor {
            body.insert(
                format!("prev_{}", kind.timestamp_field()),
                Value::String(cursor.timestamp_param()),
            );
            body.insert("prev_id".into(), Value::String(cursor.prev_id.clone()));
            if cursor.ascending {
                body.insert("ascending".into(), Value::Bool(true));
            }
        }
        body.insert("limit".into(), Value::from(self.limit));

        Value::Object(body)
    }
}

/// Apply the server's list contract to an in-memory dataset.
///
/// Filters by project and activity, keeps only items past the cursor, and
/// returns at most `limit` items ordered descending, or ascending when the
/// cursor asks for it.
pub fn apply_list_request<T: Paginated + Clone>(items: &[T], req: &ListRequest) -> Vec<T> {
    let mut selected: Vec<T> = items
        .iter()
        .filter(|item| match &req.filter.project_name {
            Some(project) => item.project_name() == Some(project.as_str()),
            None => true,
        })
        .filter(|item| !req.filter.only_active.unwrap_or(false) || item.is_active())
        .filter(|item| match &req.cursor {
            Some(cursor) if cursor.ascending => item.sort_key() > cursor.key(),
            Some(cursor) => item.sort_key() < cursor.key(),
            None => true,
        })
        .cloned()
        .collect();

    if req.is_ascending() {
        selected.sort_by_key(|item| item.sort_key());
    } else {
        selected.sort_by_key(|item| std::cmp::Reverse(item.sort_key()));
    }
    selected.truncate(req.limit);
    selected
}
