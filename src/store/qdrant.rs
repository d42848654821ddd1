//! Qdrant gateway
//!
//! Indexes map to Qdrant collections with cosine distance. Metadata is
//! stored as the point payload (nested objects and lists preserved) and
//! filter predicates are translated into Qdrant `Filter` conditions.

#![allow(deprecated)]

use async_trait::async_trait;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{
        condition::ConditionOneOf, point_id::PointIdOptions, r#match::MatchValue, value::Kind,
        vectors_config::Config, with_payload_selector::SelectorOptions, Condition, CreateCollection,
        Distance, FieldCondition, Filter, ListValue, Match, PointId, PointStruct, Range,
        RepeatedIntegers, RepeatedStrings, SearchPoints, Struct, Value as QdrantValue, VectorParams,
        VectorsConfig, WithPayloadSelector,
    },
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tracing::debug;

use crate::errors::{RagError, Result};
use crate::filter::{CompareOp, FilterPredicate};
use crate::store::{into_query_result, IndexStatus, UpsertBatch, VectorStoreGateway};
use crate::types::{Metadata, PipelineStep, QueryResult};

/// Default Qdrant gRPC endpoint
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

const SERVICE: &str = "qdrant";

fn qdrant_error(context: &str, e: impl std::fmt::Display) -> RagError {
    RagError::external(SERVICE, format!("{}: {}", context, e))
}

/// Vector store gateway backed by a Qdrant server
pub struct QdrantGateway {
    client: QdrantClient,
    url: String,
}

impl QdrantGateway {
    /// Connect to a Qdrant server
    pub fn connect(url: &str) -> Result<Self> {
        let client = QdrantClient::from_url(url)
            .build()
            .map_err(|e| qdrant_error("Failed to create Qdrant client", e))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Check if the server answers
    pub async fn health_check(&self) -> bool {
        self.client.health_check().await.is_ok()
    }

    /// Vector size of an existing collection, `None` if it does not exist
    async fn index_dimension(&self, name: &str, step: PipelineStep) -> Result<Option<usize>> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| qdrant_error("Failed to list collections", e))?;

        if !collections.collections.iter().any(|c| c.name == name) {
            return Ok(None);
        }

        let info = self
            .client
            .collection_info(name)
            .await
            .map_err(|e| qdrant_error("Failed to get collection info", e))?;

        let config = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config);

        single_vector_size(name, config, step).map(Some)
    }
}

#[async_trait]
impl VectorStoreGateway for QdrantGateway {
    fn backend(&self) -> &'static str {
        "qdrant"
    }

    async fn create_index(&self, name: &str, dimension: usize) -> Result<IndexStatus> {
        if dimension == 0 {
            return Err(RagError::Config("index dimension must be greater than 0".to_string()));
        }

        match self.index_dimension(name, PipelineStep::CreateIndex).await? {
            Some(existing) if existing == dimension => return Ok(IndexStatus::AlreadyExists),
            Some(existing) => {
                return Err(RagError::IndexDimensionConflict {
                    index: name.to_string(),
                    existing,
                    requested: dimension,
                })
            }
            None => {}
        }

        self.client
            .create_collection(&CreateCollection {
                collection_name: name.to_string(),
                vectors_config: Some(VectorsConfig {
                    config: Some(Config::Params(VectorParams {
                        size: dimension as u64,
                        distance: Distance::Cosine.into(),
                        ..Default::default()
                    })),
                }),
                ..Default::default()
            })
            .await
            .map_err(|e| qdrant_error(&format!("Failed to create collection {}", name), e))?;

        debug!(index = name, dimension, "created qdrant collection");
        Ok(IndexStatus::Created)
    }

    async fn upsert(&self, index: &str, batch: UpsertBatch) -> Result<()> {
        let expected = self
            .index_dimension(index, PipelineStep::Upsert)
            .await?
            .ok_or_else(|| RagError::IndexNotFound(index.to_string()))?;

        if let Some(bad) = batch.vectors().iter().find(|v| v.len() != expected) {
            return Err(RagError::DimensionMismatch {
                index: index.to_string(),
                expected,
                actual: bad.len(),
            });
        }
        if batch.is_empty() {
            return Ok(());
        }

        let count = batch.len();
        let (ids, vectors, metadata) = batch.into_parts();
        let points: Vec<PointStruct> = ids
            .into_iter()
            .zip(vectors)
            .zip(metadata)
            .map(|((id, vector), metadata)| PointStruct::new(id, vector, to_payload(metadata)))
            .collect();

        self.client
            .upsert_points_blocking(index, None, points, None)
            .await
            .map_err(|e| qdrant_error("Failed to upsert points", e))?;

        debug!(index, count, "upserted qdrant points");
        Ok(())
    }

    async fn query(
        &self,
        index: &str,
        vector: &[f32],
        filter: Option<&FilterPredicate>,
        top_k: usize,
    ) -> Result<Vec<QueryResult>> {
        let filter = filter.map(to_filter).transpose()?;

        let search_result = self
            .client
            .search_points(&SearchPoints {
                collection_name: index.to_string(),
                vector: vector.to_vec(),
                limit: top_k as u64,
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                filter,
                ..Default::default()
            })
            .await
            .map_err(|e| qdrant_error("Failed to search points", e))?;

        let results: Vec<QueryResult> = search_result
            .result
            .into_iter()
            .map(|point| {
                let metadata: Metadata = point
                    .payload
                    .into_iter()
                    .filter_map(|(key, value)| qdrant_to_json_value(&value).map(|v| (key, v)))
                    .collect();
                into_query_result(point_id_to_string(&point.id), point.score, metadata)
            })
            .collect();

        debug!(index, hits = results.len(), "qdrant query");
        Ok(results)
    }

    async fn count(&self, index: &str) -> Result<usize> {
        let info = self
            .client
            .collection_info(index)
            .await
            .map_err(|e| qdrant_error("Failed to get collection info", e))?;

        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0) as usize)
    }
}

fn field_condition(key: &str, match_value: Option<MatchValue>, range: Option<Range>) -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
            key: key.to_string(),
            r#match: match_value.map(|m| Match { match_value: Some(m) }),
            range,
            ..Default::default()
        })),
    }
}

fn nested_condition(filter: Filter) -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::Filter(filter)),
    }
}

fn exact_match(field: &str, value: &JsonValue) -> Result<Condition> {
    let condition = match value {
        JsonValue::String(s) => field_condition(field, Some(MatchValue::Keyword(s.clone())), None),
        JsonValue::Bool(b) => field_condition(field, Some(MatchValue::Boolean(*b)), None),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => field_condition(field, Some(MatchValue::Integer(i)), None),
            None => {
                let f = n.as_f64().unwrap_or(f64::NAN);
                field_condition(
                    field,
                    None,
                    Some(Range {
                        gte: Some(f),
                        lte: Some(f),
                        ..Default::default()
                    }),
                )
            }
        },
        other => {
            return Err(RagError::InvalidFilter(format!(
                "cannot match '{}' against {}",
                field, other
            )))
        }
    };
    Ok(condition)
}

/// Recover the literal text of a pattern containing no regex syntax
fn literal_pattern(pattern: &str) -> Option<String> {
    let mut literal = String::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            literal.push(chars.next()?);
        } else {
            literal.push(c);
        }
    }
    (regex::escape(&literal) == pattern).then_some(literal)
}

fn to_condition(predicate: &FilterPredicate) -> Result<Condition> {
    match predicate {
        FilterPredicate::Compare { field, op, value } => match op {
            CompareOp::Eq => exact_match(field, value),
            CompareOp::Ne => Ok(nested_condition(Filter {
                must_not: vec![exact_match(field, value)?],
                ..Default::default()
            })),
            ordering => {
                let bound = value.as_f64().ok_or_else(|| {
                    RagError::InvalidFilter(format!(
                        "qdrant supports {} only on numbers, got {} for '{}'",
                        ordering, value, field
                    ))
                })?;
                let mut range = Range::default();
                match ordering {
                    CompareOp::Gt => range.gt = Some(bound),
                    CompareOp::Gte => range.gte = Some(bound),
                    CompareOp::Lt => range.lt = Some(bound),
                    _ => range.lte = Some(bound),
                }
                Ok(field_condition(field, None, Some(range)))
            }
        },
        FilterPredicate::Regex { field, pattern } => {
            let literal = literal_pattern(pattern).ok_or_else(|| {
                RagError::InvalidFilter(format!(
                    "qdrant cannot evaluate regex '{}' on '{}'; only literal text is supported",
                    pattern, field
                ))
            })?;
            Ok(field_condition(field, Some(MatchValue::Text(literal)), None))
        }
        FilterPredicate::Range { field, min, max } => Ok(field_condition(
            field,
            None,
            Some(Range {
                gte: *min,
                lte: *max,
                ..Default::default()
            }),
        )),
        FilterPredicate::In { field, values } => {
            if let Some(strings) = values.iter().map(|v| v.as_str().map(str::to_string)).collect::<Option<Vec<_>>>() {
                return Ok(field_condition(field, Some(MatchValue::Keywords(RepeatedStrings { strings })), None));
            }
            if let Some(integers) = values.iter().map(JsonValue::as_i64).collect::<Option<Vec<_>>>() {
                return Ok(field_condition(field, Some(MatchValue::Integers(RepeatedIntegers { integers })), None));
            }
            Ok(nested_condition(Filter {
                should: values.iter().map(|v| exact_match(field, v)).collect::<Result<_>>()?,
                ..Default::default()
            }))
        }
        FilterPredicate::And { predicates } => Ok(nested_condition(Filter {
            must: predicates.iter().map(to_condition).collect::<Result<_>>()?,
            ..Default::default()
        })),
        FilterPredicate::Or { predicates } => Ok(nested_condition(Filter {
            should: predicates.iter().map(to_condition).collect::<Result<_>>()?,
            ..Default::default()
        })),
        FilterPredicate::Not { predicate } => Ok(nested_condition(Filter {
            must_not: vec![to_condition(predicate)?],
            ..Default::default()
        })),
    }
}

/// Translate a predicate into a Qdrant filter
pub fn to_filter(predicate: &FilterPredicate) -> Result<Filter> {
    Ok(Filter {
        must: vec![to_condition(predicate)?],
        ..Default::default()
    })
}

fn json_to_qdrant_value(json: JsonValue) -> QdrantValue {
    let kind = match json {
        JsonValue::Null => Kind::NullValue(0),
        JsonValue::String(s) => Kind::StringValue(s),
        JsonValue::Bool(b) => Kind::BoolValue(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        JsonValue::Array(items) => Kind::ListValue(ListValue {
            values: items.into_iter().map(json_to_qdrant_value).collect(),
        }),
        JsonValue::Object(map) => Kind::StructValue(Struct {
            fields: map.into_iter().map(|(k, v)| (k, json_to_qdrant_value(v))).collect(),
        }),
    };
    QdrantValue { kind: Some(kind) }
}

fn to_payload(metadata: Metadata) -> HashMap<String, QdrantValue> {
    metadata
        .into_iter()
        .map(|(key, value)| (key, json_to_qdrant_value(value)))
        .collect()
}

fn qdrant_to_json_value(value: &QdrantValue) -> Option<JsonValue> {
    value.kind.as_ref().and_then(|kind| match kind {
        Kind::NullValue(_) => Some(JsonValue::Null),
        Kind::StringValue(s) => Some(JsonValue::String(s.clone())),
        Kind::IntegerValue(i) => Some(JsonValue::Number((*i).into())),
        Kind::DoubleValue(f) => serde_json::Number::from_f64(*f).map(JsonValue::Number),
        Kind::BoolValue(b) => Some(JsonValue::Bool(*b)),
        Kind::ListValue(list) => Some(JsonValue::Array(
            list.values.iter().filter_map(qdrant_to_json_value).collect(),
        )),
        Kind::StructValue(s) => Some(JsonValue::Object(
            s.fields
                .iter()
                .filter_map(|(k, v)| qdrant_to_json_value(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
    })
}

fn point_id_to_string(point_id: &Option<PointId>) -> String {
    match point_id.as_ref().and_then(|id| id.point_id_options.as_ref()) {
        Some(PointIdOptions::Num(n)) => n.to_string(),
        Some(PointIdOptions::Uuid(u)) => u.clone(),
        None => "unknown".to_string(),
    }
}

/// Collections with named or missing vector configs are not usable as an index
fn single_vector_size(name: &str, config: Option<Config>, step: PipelineStep) -> Result<usize> {
    match config {
        Some(Config::Params(params)) => Ok(params.size as usize),
        _ => Err(RagError::integration(
            step,
            None,
            format!("collection '{}' has no single vector config", name),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_single_vector_size() {
        let params = Config::Params(VectorParams {
            size: 384,
            ..Default::default()
        });
        assert_eq!(single_vector_size("docs", Some(params), PipelineStep::CreateIndex).unwrap(), 384);

        let err = single_vector_size("docs", None, PipelineStep::CreateIndex).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integration);
        assert!(matches!(err, RagError::Integration { step: PipelineStep::CreateIndex, .. }));
    }

    fn field_of(condition: &Condition) -> &FieldCondition {
        match condition.condition_one_of.as_ref() {
            Some(ConditionOneOf::Field(field)) => field,
            other => panic!("expected field condition, got {:?}", other),
        }
    }

    fn filter_of(condition: &Condition) -> &Filter {
        match condition.condition_one_of.as_ref() {
            Some(ConditionOneOf::Filter(filter)) => filter,
            other => panic!("expected nested filter, got {:?}", other),
        }
    }

    #[test]
    fn test_greater_than_becomes_range() {
        let filter = to_filter(&FilterPredicate::compare("nested.id", CompareOp::Gt, 2)).unwrap();
        let field = field_of(&filter.must[0]);
        assert_eq!(field.key, "nested.id");
        let range = field.range.as_ref().unwrap();
        assert_eq!(range.gt, Some(2.0));
        assert_eq!(range.gte, None);
    }

    #[test]
    fn test_equality_matches() {
        let keyword = to_condition(&FilterPredicate::eq("lang", "en")).unwrap();
        assert_eq!(
            field_of(&keyword).r#match.as_ref().unwrap().match_value,
            Some(MatchValue::Keyword("en".to_string()))
        );

        let integer = to_condition(&FilterPredicate::eq("id", 3)).unwrap();
        assert_eq!(
            field_of(&integer).r#match.as_ref().unwrap().match_value,
            Some(MatchValue::Integer(3))
        );
    }

    #[test]
    fn test_not_equal_wraps_must_not() {
        let condition =
            to_condition(&FilterPredicate::compare("lang", CompareOp::Ne, "en")).unwrap();
        assert_eq!(filter_of(&condition).must_not.len(), 1);
    }

    #[test]
    fn test_in_lists() {
        let strings = to_condition(&FilterPredicate::one_of("tag", vec![json!("a"), json!("b")])).unwrap();
        assert_eq!(
            field_of(&strings).r#match.as_ref().unwrap().match_value,
            Some(MatchValue::Keywords(RepeatedStrings {
                strings: vec!["a".to_string(), "b".to_string()]
            }))
        );

        let mixed = to_condition(&FilterPredicate::one_of("tag", vec![json!("a"), json!(1)])).unwrap();
        assert_eq!(filter_of(&mixed).should.len(), 2);
    }

    #[test]
    fn test_logical_nesting() {
        let predicate = FilterPredicate::or(vec![
            FilterPredicate::eq("a", 1),
            FilterPredicate::negate(FilterPredicate::eq("b", 2)),
        ]);
        let condition = to_condition(&predicate).unwrap();
        let or = filter_of(&condition);
        assert_eq!(or.should.len(), 2);
        assert_eq!(filter_of(&or.should[1]).must_not.len(), 1);
    }

    #[test]
    fn test_regex_literal_only() {
        let literal = to_condition(&FilterPredicate::regex("text", "temperature")).unwrap();
        assert_eq!(
            field_of(&literal).r#match.as_ref().unwrap().match_value,
            Some(MatchValue::Text("temperature".to_string()))
        );

        let escaped = to_condition(&FilterPredicate::regex("text", r"1\+1")).unwrap();
        assert_eq!(
            field_of(&escaped).r#match.as_ref().unwrap().match_value,
            Some(MatchValue::Text("1+1".to_string()))
        );

        assert!(to_condition(&FilterPredicate::regex("text", "temp.*")).is_err());
    }

    #[test]
    fn test_string_ordering_rejected() {
        assert!(to_filter(&FilterPredicate::compare("name", CompareOp::Gt, "m")).is_err());
    }

    #[test]
    fn test_payload_round_trip_keeps_nesting() {
        let original = json!({"nested": {"id": 3, "tags": ["x", "y"]}, "score": 0.5, "flag": true});
        let payload = to_payload(original.as_object().cloned().unwrap());
        let restored: Metadata = payload
            .iter()
            .filter_map(|(k, v)| qdrant_to_json_value(v).map(|v| (k.clone(), v)))
            .collect();
        assert_eq!(JsonValue::Object(restored), original);
    }

    #[test]
    fn test_point_id_to_string() {
        let id = Some(PointId::from("550e8400-e29b-41d4-a716-446655440000".to_string()));
        assert_eq!(point_id_to_string(&id), "550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(point_id_to_string(&None), "unknown");
    }

    #[tokio::test]
    #[ignore] // Integration test - requires Qdrant
    async fn test_create_upsert_query() {
        let gateway = QdrantGateway::connect(DEFAULT_QDRANT_URL).unwrap();
        let index = format!("metarag-test-{}", uuid::Uuid::new_v4());
        assert_eq!(gateway.create_index(&index, 2).await.unwrap(), IndexStatus::Created);
        assert_eq!(gateway.create_index(&index, 2).await.unwrap(), IndexStatus::AlreadyExists);
        assert!(gateway.create_index(&index, 3).await.is_err());

        let mut metadata = Metadata::new();
        metadata.insert("text".into(), json!("hello"));
        metadata.insert("nested".into(), json!({"id": 3}));
        let batch = UpsertBatch::new(
            vec![crate::store::entry_id("doc", 0)],
            vec![vec![1.0, 0.0]],
            vec![metadata],
        )
        .unwrap();
        gateway.upsert(&index, batch).await.unwrap();

        let filter = FilterPredicate::compare("nested.id", CompareOp::Gt, 2);
        let results = gateway.query(&index, &[1.0, 0.0], Some(&filter), 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "hello");
    }
}
