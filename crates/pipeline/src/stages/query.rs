use async_trait::async_trait;
use docgate_core_types::{DocIdType, QueryParams};
use serde_json::{Map, Value};

use crate::errors::PipelineError;
use crate::exchange::{Exchange, ParsedQuery};
use crate::stages::Stage;

/// Validates `filter`, `sort`, `keys`, `page`, `pagesize`, `id_type` and
/// `checkEtag`.
pub struct QueryParamsStage {
    pub default_pagesize: usize,
    pub max_pagesize: usize,
    pub default_id_type: DocIdType,
}

#[async_trait]
impl Stage for QueryParamsStage {
    fn name(&self) -> &'static str {
        "query-params"
    }

    async fn handle(&self, ex: &mut Exchange) -> Result<(), PipelineError> {
        match self.parse(&ex.query) {
            Ok(parsed) => ex.parsed = parsed,
            Err(err) => ex.set_error(err),
        }
        Ok(())
    }
}

impl QueryParamsStage {
    pub fn parse(&self, query: &QueryParams) -> Result<ParsedQuery, PipelineError> {
        let filter = parse_filters(query.all("filter"))?;
        let sort = query.first("sort").map(parse_sort).transpose()?;
        let keys = parse_keys(query.all("keys"))?;

        let page = match query.first("page") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(page) if page >= 1 => page,
                _ => {
                    return Err(PipelineError::malformed_query(
                        "illegal page parameter, it must be a number greater than 0",
                    ))
                }
            },
            None => 1,
        };
        let pagesize = match query.first("pagesize") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(size) if size <= self.max_pagesize => size,
                _ => {
                    return Err(PipelineError::malformed_query(format!(
                        "illegal pagesize parameter, it must be a number between 0 and {}",
                        self.max_pagesize
                    )))
                }
            },
            None => self.default_pagesize,
        };
        let id_type = match query.first("id_type") {
            Some(raw) => raw.parse::<DocIdType>()?,
            None => self.default_id_type,
        };
        let check_etag = query.contains("checkEtag")
            && !query
                .first("checkEtag")
                .is_some_and(|v| v.eq_ignore_ascii_case("false"));

        Ok(ParsedQuery {
            filter,
            sort,
            keys,
            page,
            pagesize,
            id_type,
            check_etag,
        })
    }
}

fn parse_object(raw: &str, param: &str) -> Result<Value, PipelineError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(PipelineError::malformed_query(format!(
            "illegal {param} parameter, it must be a json object"
        ))),
        Err(e) => Err(PipelineError::malformed_query(format!(
            "illegal {param} parameter: {e}"
        ))),
    }
}

/// Several `filter` parameters are ANDed.
fn parse_filters(raw: &[String]) -> Result<Option<Value>, PipelineError> {
    let mut filters = raw
        .iter()
        .map(|f| parse_object(f, "filter"))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(match filters.len() {
        0 => None,
        1 => filters.pop(),
        _ => Some(serde_json::json!({ "$and": filters })),
    })
}

/// Either a json object or a comma separated `[-]field` list.
fn parse_sort(raw: &str) -> Result<Value, PipelineError> {
    let raw = raw.trim();
    if raw.starts_with('{') {
        return parse_object(raw, "sort");
    }
    let mut spec = Map::new();
    for field in raw.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        let (name, direction) = match field.strip_prefix('-') {
            Some(name) => (name, -1),
            None => (field.strip_prefix('+').unwrap_or(field), 1),
        };
        if name.is_empty() {
            return Err(PipelineError::malformed_query("illegal sort parameter"));
        }
        spec.insert(name.to_string(), Value::from(direction));
    }
    Ok(Value::Object(spec))
}

fn parse_keys(raw: &[String]) -> Result<Option<Value>, PipelineError> {
    if raw.is_empty() {
        return Ok(None);
    }
    let mut merged = Map::new();
    for keys in raw {
        if let Value::Object(map) = parse_object(keys, "keys")? {
            merged.extend(map);
        }
    }
    Ok(Some(Value::Object(merged)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stage() -> QueryParamsStage {
        QueryParamsStage {
            default_pagesize: 100,
            max_pagesize: 1000,
            default_id_type: DocIdType::StringOid,
        }
    }

    #[test]
    fn defaults_without_parameters() {
        let parsed = stage().parse(&QueryParams::default()).unwrap();
        assert_eq!(parsed.page, 1);
        assert_eq!(parsed.pagesize, 100);
        assert!(parsed.filter.is_none());
        assert!(!parsed.check_etag);
    }

    #[test]
    fn parses_every_parameter() {
        let q = QueryParams::parse(
            "filter=%7B%22a%22%3A1%7D&sort=-date,title&keys=%7B%22a%22%3A1%7D&page=2&pagesize=0&id_type=number&checkEtag",
        );
        let parsed = stage().parse(&q).unwrap();
        assert_eq!(parsed.filter, Some(json!({"a": 1})));
        assert_eq!(parsed.sort, Some(json!({"date": -1, "title": 1})));
        assert_eq!(parsed.keys, Some(json!({"a": 1})));
        assert_eq!((parsed.page, parsed.pagesize), (2, 0));
        assert_eq!(parsed.id_type, DocIdType::Number);
        assert!(parsed.check_etag);
    }

    #[test]
    fn multiple_filters_are_anded() {
        let q = QueryParams::parse("filter=%7B%22a%22%3A1%7D&filter=%7B%22b%22%3A2%7D");
        assert_eq!(
            stage().parse(&q).unwrap().filter,
            Some(json!({"$and": [{"a": 1}, {"b": 2}]}))
        );
    }

    #[test]
    fn rejects_bad_values() {
        for raw in [
            "filter=nope",
            "filter=%5B1%5D",
            "page=0",
            "page=x",
            "pagesize=1001",
            "id_type=uuid",
            "sort=-",
        ] {
            let err = stage().parse(&QueryParams::parse(raw)).unwrap_err();
            assert_eq!(err.0.http_status, 400, "{raw}");
        }
    }
}
