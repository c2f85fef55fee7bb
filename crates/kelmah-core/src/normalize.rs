// ── Response normalization ──
//
// The backend is not consistent about list envelopes. Every shape below
// is reduced to one `Page<T>`:
//
//   { data: { items, pagination } }
//   { data: [...], meta: { pagination, aggregates } }
//   { items, pagination }
//   [ ... ]
//   { <collection>: [...], pagination }  /  { data: { <collection>: [...] } }
//   { data: { ...single object... } }    → one-item page

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// The page a consumer asked for. Used to fill in missing pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub limit: u32,
}

impl Pagination {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// One normalized response: items plus pagination and optional aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
    /// Free-form summary block from `meta.aggregates`, when the backend sends one.
    pub aggregates: Option<Value>,
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// First item; the natural accessor for single-object resources.
    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }
}

/// Reduce any supported list envelope to a `Page<T>`.
///
/// `collection` is the resource-named field some endpoints use instead of
/// `items` (e.g. `"proposals"`, `"workers"`).
pub fn normalize_page<T: DeserializeOwned>(
    body: &Value,
    collection: &str,
    request: PageRequest,
) -> Result<Page<T>, CoreError> {
    let root = body.as_object();
    let data = root.and_then(|o| o.get("data")).unwrap_or(body);

    let items_value = extract_items(data, collection)
        .or_else(|| root.and_then(|o| list_field(o, collection)));

    let items: Vec<T> = match items_value {
        Some(list) => decode(list)?,
        None => match data {
            Value::Null => Vec::new(),
            Value::Object(_) => vec![decode(data)?],
            other => {
                return Err(CoreError::Decode {
                    message: format!("expected a list or object, got {}", kind_of(other)),
                });
            }
        },
    };

    let raw_pagination = data
        .get("pagination")
        .or_else(|| root.and_then(|o| o.get("pagination")))
        .or_else(|| body.pointer("/meta/pagination"));

    let aggregates = body
        .pointer("/meta/aggregates")
        .or_else(|| data.get("aggregates"))
        .or_else(|| root.and_then(|o| o.get("aggregates")))
        .filter(|v| !v.is_null())
        .cloned();

    let pagination = resolve_pagination(raw_pagination, request, items.len());

    Ok(Page {
        items,
        pagination,
        aggregates,
    })
}

/// Extract a single object from `{ data: {...} }` or a bare object.
pub fn normalize_one<T: DeserializeOwned>(body: &Value, field: &str) -> Result<T, CoreError> {
    let data = body.get("data").unwrap_or(body);
    let target = data.get(field).filter(|v| v.is_object()).unwrap_or(data);
    decode(target)
}

fn extract_items<'a>(data: &'a Value, collection: &str) -> Option<&'a Value> {
    match data {
        Value::Array(_) => Some(data),
        Value::Object(map) => list_field(map, "items").or_else(|| list_field(map, collection)),
        _ => None,
    }
}

fn list_field<'a>(map: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    map.get(field).filter(|v| v.is_array())
}

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, CoreError> {
    T::deserialize(value).map_err(|e| CoreError::Decode {
        message: e.to_string(),
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn resolve_pagination(raw: Option<&Value>, request: PageRequest, item_count: usize) -> Pagination {
    let field = |names: &[&str]| -> Option<u64> {
        let obj = raw?.as_object()?;
        names.iter().find_map(|n| obj.get(*n).and_then(as_u64))
    };
    let narrow = |v: u64| u32::try_from(v).unwrap_or(u32::MAX);

    Pagination {
        page: field(&["page", "currentPage"]).map_or(request.page, narrow),
        total_pages: field(&["totalPages", "pages"]).map_or(1, narrow),
        total_items: field(&["totalItems", "total"])
            .unwrap_or_else(|| u64::try_from(item_count).unwrap_or(u64::MAX)),
        limit: field(&["limit", "pageSize"]).map_or(request.limit, narrow),
    }
}

/// Accept numbers and numeric strings; the gateway stringifies some counters.
fn as_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    const REQ: PageRequest = PageRequest { page: 2, limit: 5 };

    fn ids(page: &Page<Item>) -> Vec<u32> {
        page.items.iter().map(|i| i.id).collect()
    }

    #[test]
    fn nested_items_with_pagination() {
        let body = json!({
            "data": {
                "items": [{ "id": 1 }, { "id": 2 }],
                "pagination": { "page": 1, "totalPages": 4, "totalItems": 8, "limit": 2 }
            }
        });
        let page: Page<Item> = normalize_page(&body, "proposals", REQ).unwrap();
        assert_eq!(ids(&page), vec![1, 2]);
        assert_eq!(
            page.pagination,
            Pagination {
                page: 1,
                total_pages: 4,
                total_items: 8,
                limit: 2
            }
        );
        assert!(page.pagination.has_next());
    }

    #[test]
    fn data_array_with_meta() {
        let body = json!({
            "success": true,
            "data": [{ "id": 7 }],
            "meta": {
                "pagination": { "page": 2, "totalPages": 2, "totalItems": 6, "limit": 5 },
                "aggregates": { "total": 6 }
            }
        });
        let page: Page<Item> = normalize_page(&body, "proposals", REQ).unwrap();
        assert_eq!(ids(&page), vec![7]);
        assert_eq!(page.pagination.total_items, 6);
        assert_eq!(page.aggregates, Some(json!({ "total": 6 })));
    }

    #[test]
    fn flat_items_envelope() {
        let body = json!({ "items": [{ "id": 3 }], "pagination": { "total": "12", "pages": 3 } });
        let page: Page<Item> = normalize_page(&body, "workers", REQ).unwrap();
        assert_eq!(ids(&page), vec![3]);
        assert_eq!(page.pagination.total_items, 12);
        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(page.pagination.page, 2);
    }

    #[test]
    fn bare_array_defaults_pagination() {
        let body = json!([{ "id": 1 }, { "id": 2 }, { "id": 3 }]);
        let page: Page<Item> = normalize_page(&body, "workers", REQ).unwrap();
        assert_eq!(
            page.pagination,
            Pagination {
                page: 2,
                total_pages: 1,
                total_items: 3,
                limit: 5
            }
        );
        assert!(page.aggregates.is_none());
    }

    #[test]
    fn resource_named_field() {
        let top = json!({ "workers": [{ "id": 9 }] });
        let nested = json!({ "data": { "workers": [{ "id": 9 }] } });
        for body in [top, nested] {
            let page: Page<Item> = normalize_page(&body, "workers", REQ).unwrap();
            assert_eq!(ids(&page), vec![9]);
        }
    }

    #[test]
    fn single_object_becomes_one_item_page() {
        let body = json!({ "success": true, "data": { "id": 42 } });
        let page: Page<Item> = normalize_page(&body, "quickJobs", REQ).unwrap();
        assert_eq!(ids(&page), vec![42]);
        assert_eq!(page.pagination.total_items, 1);
    }

    #[test]
    fn null_data_is_empty() {
        let page: Page<Item> = normalize_page(&json!({ "data": null }), "x", REQ).unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn wrong_item_shape_is_decode_error() {
        let body = json!({ "data": [{ "id": "not-a-number" }] });
        let err = normalize_page::<Item>(&body, "x", REQ).unwrap_err();
        assert!(matches!(err, CoreError::Decode { .. }));
    }

    #[test]
    fn scalar_body_is_decode_error() {
        let err = normalize_page::<Item>(&json!("oops"), "x", REQ).unwrap_err();
        assert!(err.to_string().contains("a string"));
    }

    #[test]
    fn one_object_from_envelope_or_named_field() {
        let item: Item = normalize_one(&json!({ "data": { "bid": { "id": 5 } } }), "bid").unwrap();
        assert_eq!(item, Item { id: 5 });
        let item: Item = normalize_one(&json!({ "id": 6 }), "bid").unwrap();
        assert_eq!(item, Item { id: 6 });
    }
}
