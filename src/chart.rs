//! Bar chart data for the first two numeric columns of a table.
use crate::table::Table;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ChartError {
    #[error("Need at least two numeric columns to visualize, found {found}")]
    NotEnoughNumericColumns { found: usize },
}

/// One bar series: a column name and one value per row, `None` where missing.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Grouped bars keyed by row position.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BarChart {
    pub labels: Vec<usize>,
    pub series: Vec<Series>,
}

/// Charts the first two numeric columns in column order.
pub fn bar_chart(table: &Table) -> Result<BarChart, ChartError> {
    let numeric = table.numeric_columns();
    if numeric.len() < 2 {
        return Err(ChartError::NotEnoughNumericColumns { found: numeric.len() });
    }
    let series = numeric
        .into_iter()
        .take(2)
        .map(|index| Series {
            name: table.columns()[index].name.to_owned(),
            values: table
                .column_values(index)
                .map(|value| value.as_f64().filter(|number| number.is_finite()))
                .collect(),
        })
        .collect();
    Ok(BarChart {
        labels: (0..table.height()).collect(),
        series,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use crate::table::ColumnType;
    use crate::table::Value;

    #[test]
    fn charts_first_two_numeric_columns() {
        let table = Table::new(
            vec![
                Column::new("name", ColumnType::Varchar),
                Column::new("a", ColumnType::BigInt),
                Column::new("b", ColumnType::Double),
                Column::new("c", ColumnType::Double),
            ],
            vec![
                vec![Value::Text("x".to_owned()), Value::Int(1), Value::Float(0.5), Value::Float(9.0)],
                vec![Value::Text("y".to_owned()), Value::Null, Value::Float(f64::NAN), Value::Float(8.0)],
            ],
        )
        .unwrap();
        let chart = bar_chart(&table).unwrap();
        assert_eq!(chart.labels, vec![0, 1]);
        assert_eq!(
            chart.series,
            vec![
                Series { name: "a".to_owned(), values: vec![Some(1.0), None] },
                Series { name: "b".to_owned(), values: vec![Some(0.5), None] },
            ]
        );
    }

    #[test]
    fn needs_two_numeric_columns() {
        let table = Table::new(
            vec![Column::new("a", ColumnType::BigInt), Column::new("b", ColumnType::Varchar)],
            vec![vec![Value::Int(1), Value::Text("x".to_owned())]],
        )
        .unwrap();
        assert_eq!(bar_chart(&table), Err(ChartError::NotEnoughNumericColumns { found: 1 }));
        assert_eq!(
            ChartError::NotEnoughNumericColumns { found: 1 }.to_string(),
            "Need at least two numeric columns to visualize, found 1"
        );
    }
}
