//! CSV ↔ column bridge.
//!
//! Parsing and numeric coercion of text fields happens here; the core only
//! ever sees typed [`Value`]s.

use std::collections::HashMap;
use std::io::{Read, Write};

use anyhow::Context;
use ccol_core::{CcolError, ColumnData, ColumnMap, ColumnType, Schema, Value};

/// Parse CSV with a header row into one value sequence per schema column.
///
/// Every schema name must appear in the header; extra CSV columns are
/// ignored. Rows in errors count data records from 0, the same index the
/// encoder reports. `int32` fields are parsed as `i64` so the encoder can report
/// out-of-range values itself.
pub fn read_csv<R: Read>(input: R, schema: &Schema) -> anyhow::Result<ColumnMap> {
    let mut reader = csv::Reader::from_reader(input);
    let headers = reader.headers().context("reading CSV header row")?.clone();

    let positions: Vec<usize> = schema
        .fields()
        .iter()
        .map(|f| {
            headers.iter().position(|h| h == f.name).ok_or_else(|| {
                CcolError::SchemaMismatch(format!("CSV header has no column '{}'", f.name))
            })
        })
        .collect::<Result<_, _>>()?;

    let mut columns: ColumnMap = schema
        .fields()
        .iter()
        .map(|f| (f.name.clone(), Vec::new()))
        .collect();

    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading CSV data row {}", row))?;
        for (field, &pos) in schema.fields().iter().zip(&positions) {
            let raw = record.get(pos).ok_or_else(|| {
                CcolError::SchemaMismatch(format!(
                    "CSV data row {} has no field for column '{}'",
                    row,
                    field.name
                ))
            })?;
            let value = coerce(raw, field.column_type).map_err(|message| CcolError::TypeCoercion {
                column: field.name.clone(),
                row,
                message,
            })?;
            if let Some(values) = columns.get_mut(&field.name) {
                values.push(value);
            }
        }
    }
    Ok(columns)
}

fn coerce(raw: &str, column_type: ColumnType) -> Result<Value, String> {
    match column_type {
        ColumnType::Int32 => raw
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| format!("'{}' is not an integer: {}", raw, e)),
        ColumnType::Float64 => raw
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| format!("'{}' is not a number: {}", raw, e)),
        ColumnType::Utf8 => Ok(Value::Str(raw.to_string())),
    }
}

/// Render a float so integral values keep a decimal point (`20.0`, not `20`).
pub fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

fn render(column: &ColumnData, row: usize) -> String {
    match column {
        ColumnData::Int32(v) => v[row].to_string(),
        ColumnData::Float64(v) => format_float(v[row]),
        ColumnData::Utf8(v) => v[row].clone(),
    }
}

/// Write a header row and then one record per row, columns in `order`.
pub fn write_csv<W: Write>(
    output: W,
    order: &[&str],
    columns: &HashMap<String, ColumnData>,
    rows: usize,
) -> anyhow::Result<()> {
    let ordered: Vec<&ColumnData> = order
        .iter()
        .map(|name| {
            columns
                .get(*name)
                .ok_or_else(|| CcolError::UnknownColumn(name.to_string()))
        })
        .collect::<Result<_, _>>()?;
    if let Some(short) = ordered.iter().zip(order).find(|(c, _)| c.len() != rows) {
        return Err(CcolError::SchemaMismatch(format!(
            "column '{}' has {} rows, expected {}",
            short.1,
            short.0.len(),
            rows
        ))
        .into());
    }

    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(order)?;
    for row in 0..rows {
        writer.write_record(ordered.iter().map(|c| render(c, row)))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::parse("id:int32,price:float64,name:string").unwrap()
    }

    #[test]
    fn reads_typed_columns() {
        let csv = "id,price,name\n1,10.5,apple\n2,20.0,banana\n";
        let columns = read_csv(csv.as_bytes(), &schema()).unwrap();
        assert_eq!(columns["id"], vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(columns["price"], vec![Value::Float(10.5), Value::Float(20.0)]);
        assert_eq!(columns["name"], vec![Value::from("apple"), Value::from("banana")]);
    }

    #[test]
    fn header_order_may_differ_and_extras_are_ignored() {
        let csv = "name,extra,price,id\n\"a, b\",x,1,7\n";
        let columns = read_csv(csv.as_bytes(), &schema()).unwrap();
        assert_eq!(columns["id"], vec![Value::Int(7)]);
        assert_eq!(columns["name"], vec![Value::from("a, b")]);
        assert!(!columns.contains_key("extra"));
    }

    #[test]
    fn bad_number_is_a_coercion_error() {
        let csv = "id,price,name\n1,1.0,a\nx,2.0,b\n";
        let err = read_csv(csv.as_bytes(), &schema()).unwrap_err();
        match err.downcast_ref::<CcolError>() {
            Some(CcolError::TypeCoercion { column, row, .. }) => {
                assert_eq!(column, "id");
                assert_eq!(*row, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ragged_record_names_the_same_row_as_coercion_errors() {
        let csv = "id,price,name\n1,1.0,a\n2,2.0\n";
        let err = read_csv(csv.as_bytes(), &schema()).unwrap_err();
        assert!(err.to_string().contains("data row 1"), "{err:#}");
    }

    #[test]
    fn oversized_integer_parses_for_the_encoder_to_reject() {
        let csv = "id,price,name\n4294967296,1.0,a\n";
        let columns = read_csv(csv.as_bytes(), &schema()).unwrap();
        assert_eq!(columns["id"], vec![Value::Int(4_294_967_296)]);
    }

    #[test]
    fn missing_header_column_is_schema_mismatch() {
        let err = read_csv("id,name\n1,a\n".as_bytes(), &schema()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CcolError>(),
            Some(CcolError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn writes_rows_in_requested_order() {
        let mut columns = HashMap::new();
        columns.insert("id".to_string(), ColumnData::Int32(vec![1, 2]));
        columns.insert("price".to_string(), ColumnData::Float64(vec![10.5, 20.0]));
        columns.insert(
            "name".to_string(),
            ColumnData::Utf8(vec!["apple".into(), "banana, ripe".into()]),
        );
        let mut out = Vec::new();
        write_csv(&mut out, &["id", "price", "name"], &columns, 2).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "id,price,name\n1,10.5,apple\n2,20.0,\"banana, ripe\"\n"
        );
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(20.0), "20.0");
        assert_eq!(format_float(10.5), "10.5");
        assert_eq!(format_float(-0.25), "-0.25");
        assert_eq!(format_float(f64::INFINITY), "inf");
    }
}
