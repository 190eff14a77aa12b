use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// The three list shapes the backend is known to answer with. Most
/// endpoints use the paginated envelope, a few return bare arrays, and
/// notices wrap the rows in a `data` key.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum ListEnvelope<T> {
    Paginated {
        count: i64,
        next: Option<String>,
        previous: Option<String>,
        results: Vec<T>,
    },
    Wrapped {
        data: Vec<T>,
    },
    Bare(Vec<T>),
}

/// Uniform list result every screen consumes, whatever shape the
/// backend produced.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
}

impl<T> Default for ListPage<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            next: None,
            previous: None,
        }
    }
}

impl<T> ListPage<T> {
    pub fn from_items(items: Vec<T>) -> Self {
        let count = items.len() as i64;
        Self {
            items,
            count,
            next: None,
            previous: None,
        }
    }
}

impl<T> From<ListEnvelope<T>> for ListPage<T> {
    fn from(envelope: ListEnvelope<T>) -> Self {
        match envelope {
            ListEnvelope::Paginated {
                count,
                next,
                previous,
                results,
            } => Self {
                items: results,
                count,
                next,
                previous,
            },
            ListEnvelope::Wrapped { data } => Self::from_items(data),
            ListEnvelope::Bare(items) => Self::from_items(items),
        }
    }
}

/// Total normalizer over list responses: never fails. An unrecognized
/// shape degrades to an empty page and logs, so a screen shows "no data"
/// instead of breaking.
pub fn unwrap_list<T: DeserializeOwned>(value: Value) -> ListPage<T> {
    match serde_json::from_value::<ListEnvelope<T>>(value) {
        Ok(envelope) => envelope.into(),
        Err(e) => {
            log::error!("Unrecognized list response shape, defaulting to empty: {}", e);
            ListPage::default()
        }
    }
}
