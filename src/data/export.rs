use anyhow::Result;
use serde_json::Value;

use crate::data::cursor::Cursor;
use crate::data::datatable::DataValue;

/// Drain a cursor into CSV text: a header line followed by every remaining row.
/// NULL cells are written as empty fields.
pub async fn rows_to_csv(cursor: &mut Cursor) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(cursor.column_names())?;

    while let Some(row) = cursor.next().await? {
        writer.write_record(row.raw_values().iter().map(|cell| cell.as_deref().unwrap_or("")))?;
    }

    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!("csv flush failed: {}", e))?;
    Ok(String::from_utf8(bytes)?)
}

/// Drain a cursor into a JSON array of objects keyed by column name
pub async fn rows_to_json(cursor: &mut Cursor) -> Result<Value> {
    let headers = cursor.column_names();
    let mut json_array = Vec::new();

    while let Some(row) = cursor.next().await? {
        let mut json_obj = serde_json::Map::new();
        for (name, value) in headers.iter().zip(&row.values) {
            json_obj.insert(name.clone(), to_json(value));
        }
        json_array.push(Value::Object(json_obj));
    }

    Ok(Value::Array(json_array))
}

fn to_json(value: &DataValue) -> Value {
    match value {
        DataValue::String(s) | DataValue::DateTime(s) => Value::String(s.clone()),
        DataValue::Integer(i) => Value::from(*i),
        DataValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        DataValue::Boolean(b) => Value::Bool(*b),
        DataValue::Null => Value::Null,
    }
}
