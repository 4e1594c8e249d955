//! pipeline/convert.rs — C5 Record Converter & Mutation Builder
//!
//! Translates one `StreamRecord` into a typed Spanner `Mutation` and invokes
//! C6, folding every outcome into `SharedStreamState` rather than returning
//! a `Result` — per-record failures never propagate (spec.md §7). Grounded
//! on the teacher's `db/rows.rs` `From<TradeRow> for TradeDBRow` column-by-
//! column conversion, accumulating a bad-column list instead of failing the
//! whole row.

use crate::appconfig::RetryConfig;
use crate::dynamo::shard::{AttributeMap, EventKind, StreamRecord};
use crate::pipeline::state::{BadRecordSample, BadWriteSample, SharedStreamState};
use crate::pipeline::TableContext;
use crate::schema::{SourceSchema, SpannerType, TargetSchema};
use crate::spanner::mutation::{is_parent_row_missing, ConvertedRow, Mutation, SpannerValue};
use aws_sdk_dynamodbstreams::types::AttributeValue;
use std::time::Duration;

/// §4.5 steps 1-5: resolve schema, select image, convert, build + write.
pub async fn process_record(
    state: &SharedStreamState,
    record: StreamRecord,
    table: &TableContext,
    retry: &RetryConfig,
) {
    let Some(image) = record.image_to_convert() else {
        state.unexpected(format!(
            "{}: {} record carries no image to convert",
            table.source_table(),
            record.event_kind
        ));
        state.stats_add_record_processed();
        return;
    };

    let (values, bad_cols, raw) =
        convert_image(image, &table.schemas.source, &table.schemas.target);

    if bad_cols.is_empty() {
        match build_mutation(record.event_kind, &table.schemas, values) {
            Ok(mutation) => {
                apply_with_retry(
                    state,
                    mutation,
                    retry,
                    table.source_table(),
                    record.event_kind,
                )
                .await
            }
            Err(details) => {
                state.stats_add_bad_record(table.source_table(), record.event_kind);
                state.collect_bad_record(BadRecordSample {
                    table: table.source_table().to_string(),
                    event_kind: record.event_kind,
                    bad_cols: vec![details],
                    raw,
                });
            }
        }
    } else {
        state.stats_add_bad_record(table.source_table(), record.event_kind);
        state.collect_bad_record(BadRecordSample {
            table: table.source_table().to_string(),
            event_kind: record.event_kind,
            bad_cols,
            raw,
        });
    }

    state.stats_add_record_processed();
}

/// Converts one DynamoDB image into a Spanner-aligned value vector.
/// Returns the converted row, the names of columns that failed to convert,
/// and a raw debug rendering of the image for diagnostic sampling.
fn convert_image(
    image: &AttributeMap,
    source: &SourceSchema,
    target: &TargetSchema,
) -> (ConvertedRow, Vec<String>, String) {
    let mut values = Vec::with_capacity(target.columns.len());
    let mut bad_cols = Vec::new();

    for column in &target.columns {
        let source_col = source_column_for(target, &column.name);
        let attr = source_col.and_then(|name| image.get(name));

        match attr {
            None => {
                if column.is_primary_key {
                    bad_cols.push(column.name.clone());
                }
                values.push(None);
            }
            Some(value) => match convert_attribute(value, column.spanner_type) {
                Some(converted) => values.push(Some(converted)),
                None => bad_cols.push(column.name.clone()),
            },
        }
    }

    let _ = source; // retained for signature symmetry with build_mutation's key-reorder use
    (values, bad_cols, format!("{image:?}"))
}

/// Reverse lookup: `source_to_target_column` maps source -> target, so
/// finding the source name for a target column is a linear scan over a
/// small (single-table-sized) map.
fn source_column_for<'a>(target: &'a TargetSchema, target_column: &str) -> Option<&'a str> {
    target
        .source_to_target_column
        .iter()
        .find(|(_, v)| v.as_str() == target_column)
        .map(|(k, _)| k.as_str())
}

fn convert_attribute(attr: &AttributeValue, spanner_type: SpannerType) -> Option<SpannerValue> {
    match (spanner_type, attr) {
        (SpannerType::Bool, AttributeValue::Bool(b)) => Some(SpannerValue::Bool(*b)),
        (SpannerType::String, AttributeValue::S(s)) => Some(SpannerValue::String(s.clone())),
        (SpannerType::Bytes, AttributeValue::B(b)) => Some(SpannerValue::Bytes(b.clone().into_inner())),
        (SpannerType::Int64, AttributeValue::N(n)) => n.parse::<i64>().ok().map(SpannerValue::Int64),
        (SpannerType::Float64, AttributeValue::N(n)) => n.parse::<f64>().ok().map(SpannerValue::Float64),
        (SpannerType::Numeric, AttributeValue::N(n)) => Some(SpannerValue::Numeric(n.clone())),
        (SpannerType::Timestamp, AttributeValue::S(s)) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| SpannerValue::Timestamp(dt.with_timezone(&chrono::Utc))),
        _ => None,
    }
}

/// §4.5 mutation construction, including the REMOVE key-tuple reorder rule.
fn build_mutation(
    kind: EventKind,
    schemas: &crate::schema::TableSchemas,
    values: ConvertedRow,
) -> Result<Mutation, String> {
    let table = schemas.target.table.clone();
    let columns = schemas.target.column_names();

    match kind {
        EventKind::Insert => Ok(Mutation::Insert {
            table,
            columns,
            values,
        }),
        EventKind::Modify => Ok(Mutation::InsertOrUpdate {
            table,
            columns,
            values,
        }),
        EventKind::Remove => {
            let key = remove_key_tuple(&values, &schemas.target, &schemas.source);
            Ok(Mutation::Delete { table, key })
        }
    }
}

/// Walks the value vector, discards nil (non-key) slots, and reorders so
/// position 0 is the declared first primary-key column (HASH, then RANGE).
/// spec.md §9: sound only because DynamoDB primary keys are at most two
/// attributes — asserted, not generalized, per the design note.
fn remove_key_tuple(
    values: &ConvertedRow,
    target: &TargetSchema,
    source: &SourceSchema,
) -> Vec<SpannerValue> {
    let mut entries: Vec<(String, SpannerValue)> = Vec::new();
    for (value, column) in values.iter().zip(target.columns.iter()) {
        if let Some(v) = value {
            if let Some(source_col) = source_column_for(target, &column.name) {
                entries.push((source_col.to_string(), v.clone()));
            }
        }
    }

    debug_assert!(
        entries.len() <= 2,
        "DynamoDB primary keys have at most two attributes (hash + optional range)"
    );

    if let Some(first_key) = source.first_key_column() {
        if entries.len() == 2 && entries[0].0 != first_key {
            entries.swap(0, 1);
        }
    }

    entries.into_iter().map(|(_, v)| v).collect()
}

/// Bounded retry on "parent row missing", per spec.md §4.6/§7 — owned by C5,
/// wrapping C6's `write` call rather than living inside the writer itself.
async fn apply_with_retry(
    state: &SharedStreamState,
    mutation: Mutation,
    retry: &RetryConfig,
    table: &str,
    kind: EventKind,
) {
    let Some(writer) = state.writer() else {
        state.unexpected("writer not configured");
        state.stats_add_bad_record(table, kind);
        return;
    };

    let mut attempt = 0u32;
    loop {
        match writer.write(mutation.clone()).await {
            Ok(()) => {
                state.stats_add_record(table, kind);
                return;
            }
            Err(e) if is_parent_row_missing(&e.to_string()) && attempt < retry.parent_missing_retry_max => {
                attempt += 1;
                state.metrics.inc_parent_missing_retry();
                tokio::time::sleep(Duration::from_secs(retry.parent_missing_retry_spacing_secs)).await;
            }
            Err(e) => {
                state.stats_add_dropped_record(table, kind);
                state.collect_dropped_record(BadWriteSample {
                    table: table.to_string(),
                    mutation_summary: format!("{mutation:?}"),
                    error: e.to_string(),
                });
                return;
            }
        }
    }
}
