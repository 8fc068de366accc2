// src/io/table.rs
//! Labelled tables in the pandas JSON layouts
//!
//! The persisted format stores every table as a JSON string. The current
//! layout is `split` (`{"columns":[..],"index":[..],"data":[[..]]}`), the
//! legacy one is `columns` (`{"col":{"row":value}}`). Missing cells are
//! `null` and decode to NaN.

use crate::error::{EmgErrorBuilder, EmgResult};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A table with column labels, `rows x columns`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LabeledTable {
    pub columns: Vec<String>,
    pub values: Array2<f64>,
}

impl LabeledTable {
    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }
}

#[derive(Serialize, Deserialize)]
struct SplitLayout<T> {
    columns: Vec<Value>,
    index: Vec<Value>,
    data: Vec<Vec<T>>,
}

/// Integer labels `0..n`
pub fn int_labels(n: usize) -> Vec<Value> {
    (0..n).map(Value::from).collect()
}

/// String labels
pub fn str_labels(names: &[String]) -> Vec<Value> {
    names.iter().map(|n| Value::from(n.as_str())).collect()
}

fn label_text(label: &Value) -> String {
    match label {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Encode a table in the `split` layout
///
/// A table without columns is written without rows.
pub fn to_split_json<T: Serialize + Copy>(columns: Vec<Value>, values: ArrayView2<T>) -> EmgResult<String> {
    let rows = if values.ncols() == 0 { 0 } else { values.nrows() };
    let layout = SplitLayout {
        columns,
        index: int_labels(rows),
        data: values.rows().into_iter().take(rows).map(|r| r.to_vec()).collect(),
    };
    Ok(serde_json::to_string(&layout)?)
}

/// Decode a `split` table
///
/// Rows are ordered by their index when every index label is an integer.
pub fn from_split_json(text: &str) -> EmgResult<LabeledTable> {
    let err = || EmgErrorBuilder::new("io::table", "from_split_json");
    let layout: SplitLayout<Option<f64>> = serde_json::from_str(text)?;
    let n_cols = layout.columns.len();
    if layout.index.len() != layout.data.len() {
        return Err(err().format("json", None, "split table index and data lengths differ"));
    }
    if let Some(row) = layout.data.iter().find(|r| r.len() != n_cols) {
        return Err(err().format(
            "json",
            None,
            &format!("split table row of {} cells under {} columns", row.len(), n_cols),
        ));
    }

    let mut order: Vec<usize> = (0..layout.data.len()).collect();
    let numeric: Option<Vec<i64>> = layout.index.iter().map(Value::as_i64).collect();
    if let Some(keys) = numeric {
        order.sort_by_key(|&i| keys[i]);
    }

    let values = Array2::from_shape_fn((order.len(), n_cols), |(r, c)| {
        layout.data[order[r]][c].unwrap_or(f64::NAN)
    });
    Ok(LabeledTable {
        columns: layout.columns.iter().map(label_text).collect(),
        values,
    })
}

/// Sort keys numerically when they all parse as integers, else keep their order
fn ordered_keys(map: &Map<String, Value>) -> Vec<&String> {
    let mut keys: Vec<&String> = map.keys().collect();
    let numeric: Option<Vec<i64>> = keys.iter().map(|k| k.parse::<i64>().ok()).collect();
    if let Some(nums) = numeric {
        let mut paired: Vec<(i64, &String)> = nums.into_iter().zip(keys).collect();
        paired.sort_by_key(|(n, _)| *n);
        keys = paired.into_iter().map(|(_, k)| k).collect();
    }
    keys
}

/// Decode a legacy `columns` table
pub fn from_columns_json(text: &str) -> EmgResult<LabeledTable> {
    let err = || EmgErrorBuilder::new("io::table", "from_columns_json");
    let root: Map<String, Value> = serde_json::from_str(text)?;

    let columns = ordered_keys(&root);
    let mut cells: Vec<&Map<String, Value>> = Vec::with_capacity(columns.len());
    for name in &columns {
        match &root[name.as_str()] {
            Value::Object(col) => cells.push(col),
            _ => return Err(err().format("json", None, &format!("column '{}' is not an object", name))),
        }
    }

    // Rows are the union of the row labels of every column
    let mut row_labels: Map<String, Value> = Map::new();
    for col in &cells {
        for key in col.keys() {
            row_labels.insert(key.clone(), Value::Null);
        }
    }
    let rows = ordered_keys(&row_labels);

    let mut values = Array2::from_elem((rows.len(), columns.len()), f64::NAN);
    for (c, col) in cells.iter().enumerate() {
        for (r, row) in rows.iter().enumerate() {
            match col.get(row.as_str()) {
                Some(Value::Null) | None => {}
                Some(v) => {
                    values[[r, c]] = v
                        .as_f64()
                        .ok_or_else(|| err().format("json", None, &format!("cell '{}' is not a number", v)))?;
                }
            }
        }
    }
    Ok(LabeledTable {
        columns: columns.into_iter().cloned().collect(),
        values,
    })
}
