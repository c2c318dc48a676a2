use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Paging options; `sort_by` accepts dotted paths such as `profile.age`
pub struct PageOptions<'a, T> {
    pub page: i64,
    pub limit: i64,
    pub sort_by: Option<String>,
    pub order: SortOrder,
    pub filter: Option<Box<dyn Fn(&T) -> bool + 'a>>,
}

impl<T> Default for PageOptions<'_, T> {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            sort_by: None,
            order: SortOrder::Asc,
            filter: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: i64,
    pub limit: i64,
    pub total_items: usize,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_page: Option<i64>,
    pub previous_page: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<T>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination_meta: Option<PaginationMeta>,
}

/// Filter, sort and slice an in-memory list
pub fn paginate<T: Serialize>(data: Vec<T>, options: PageOptions<'_, T>) -> Page<T> {
    let PageOptions {
        page,
        limit,
        sort_by,
        order,
        filter,
    } = options;

    let mut items: Vec<T> = match &filter {
        Some(keep) => data.into_iter().filter(|item| keep(item)).collect(),
        None => data,
    };
    let total_items = items.len();

    if limit <= 0 {
        return Page {
            error: Some("Limit must be greater than 0.".to_string()),
            data: None,
            pagination_meta: None,
        };
    }

    let total_pages = (total_items as u64).div_ceil(limit as u64) as i64;

    if page <= 0 || page > total_pages {
        return Page {
            error: Some("Page not found.".to_string()),
            data: Some(Vec::new()),
            pagination_meta: Some(PaginationMeta {
                page,
                limit,
                total_items,
                total_pages,
                has_next: false,
                has_previous: false,
                next_page: None,
                previous_page: None,
            }),
        };
    }

    if let Some(path) = sort_by.as_deref() {
        let mut keyed: Vec<(Value, T)> = items
            .into_iter()
            .map(|item| (sort_key(&item, path), item))
            .collect();
        keyed.sort_by(|(a, _), (b, _)| compare_values(a, b, order));
        items = keyed.into_iter().map(|(_, item)| item).collect();
    }

    let start = ((page - 1) * limit) as usize;
    let data: Vec<T> = items.into_iter().skip(start).take(usize::try_from(limit).unwrap_or(usize::MAX)).collect();

    Page {
        error: None,
        data: Some(data),
        pagination_meta: Some(PaginationMeta {
            page,
            limit,
            total_items,
            total_pages,
            has_next: page < total_pages,
            has_previous: page > 1,
            next_page: (page < total_pages).then_some(page + 1),
            previous_page: (page > 1).then_some(page - 1),
        }),
    }
}

fn sort_key<T: Serialize>(item: &T, path: &str) -> Value {
    let root = match serde_json::to_value(item) {
        Ok(v) => v,
        Err(_) => return Value::Null,
    };
    path.split('.')
        .try_fold(root, |acc, key| match acc {
            Value::Object(mut map) => map.remove(key),
            _ => None,
        })
        .unwrap_or(Value::Null)
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

// Nulls sort last in either direction; values that cannot be compared keep their order.
fn compare_values(a: &Value, b: &Value, order: SortOrder) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    match (a, b) {
        (Value::Null, _) => return Ordering::Greater,
        (_, Value::Null) => return Ordering::Less,
        _ => {}
    }

    let ascending = match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    };

    match order {
        SortOrder::Asc => ascending,
        SortOrder::Desc => ascending.reverse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn third_page_of_twenty_five() {
        let page = paginate(
            (1..=25).collect::<Vec<i32>>(),
            PageOptions { page: 3, limit: 10, ..Default::default() },
        );

        assert_eq!(page.data, Some(vec![21, 22, 23, 24, 25]));
        let meta = page.pagination_meta.unwrap();
        assert_eq!(meta.total_pages, 3);
        assert!(!meta.has_next);
        assert!(meta.has_previous);
        assert_eq!(meta.next_page, None);
        assert_eq!(meta.previous_page, Some(2));
    }

    #[test]
    fn non_positive_limit_only_reports_error() {
        let page = paginate(vec![1, 2, 3], PageOptions { limit: 0, ..Default::default() });
        assert_eq!(page.error.as_deref(), Some("Limit must be greater than 0."));
        assert!(page.data.is_none());
        assert!(page.pagination_meta.is_none());
    }

    #[test]
    fn out_of_range_page_is_empty_with_flags_cleared() {
        for p in [0, 4] {
            let page = paginate(
                (1..=25).collect::<Vec<i32>>(),
                PageOptions { page: p, limit: 10, ..Default::default() },
            );
            assert_eq!(page.error.as_deref(), Some("Page not found."));
            assert_eq!(page.data, Some(vec![]));
            let meta = page.pagination_meta.unwrap();
            assert!(!meta.has_next && !meta.has_previous);
        }
    }

    #[test]
    fn sorts_by_nested_key_with_nulls_last() {
        let rows = vec![
            json!({"name": "c", "profile": {"age": 30}}),
            json!({"name": "a", "profile": {}}),
            json!({"name": "b", "profile": {"age": 20}}),
            json!({"name": "d", "profile": {"age": 40}}),
        ];

        let asc = paginate(
            rows.clone(),
            PageOptions { sort_by: Some("profile.age".into()), ..Default::default() },
        );
        let names: Vec<_> = asc.data.unwrap().iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("b"), json!("c"), json!("d"), json!("a")]);

        let desc = paginate(
            rows,
            PageOptions {
                sort_by: Some("profile.age".into()),
                order: SortOrder::Desc,
                ..Default::default()
            },
        );
        let names: Vec<_> = desc.data.unwrap().iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("d"), json!("c"), json!("b"), json!("a")]);
    }

    #[test]
    fn huge_limit_fits_everything_on_one_page() {
        let page = paginate(
            vec![1, 2, 3],
            PageOptions {
                page: 1,
                limit: i64::MAX,
                ..Default::default()
            },
        );
        assert!(page.error.is_none());
        assert_eq!(page.data, Some(vec![1, 2, 3]));
        let meta = page.pagination_meta.unwrap();
        assert_eq!(meta.total_pages, 1);
        assert!(!meta.has_next);
    }

    #[test]
    fn filter_runs_before_counting() {
        let page = paginate(
            (1..=10).collect::<Vec<i32>>(),
            PageOptions {
                limit: 3,
                filter: Some(Box::new(|n: &i32| n % 2 == 0)),
                ..Default::default()
            },
        );
        assert_eq!(page.data, Some(vec![2, 4, 6]));
        assert_eq!(page.pagination_meta.unwrap().total_items, 5);
    }

    #[test]
    fn meta_serializes_camel_case() {
        let page = paginate(vec![1], PageOptions::default());
        let json = serde_json::to_value(page).unwrap();
        assert_eq!(json["paginationMeta"]["totalItems"], 1);
        assert_eq!(json["paginationMeta"]["hasNext"], false);
        assert!(json.get("error").is_none());
    }
}
