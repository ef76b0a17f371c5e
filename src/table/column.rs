use crate::table::value::Value;
use serde::Serialize;

/// Tokens read as missing values in comma-separated input.
pub const MISSING_TOKENS: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Supported column data types.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Boolean values (true/false)
    Boolean,
    /// 64-bit signed integers
    BigInt,
    /// Double-precision floating point numbers
    Double,
    /// Variable-length strings
    Varchar,
    /// Date and time
    Timestamp,
    /// Date without time component
    Date,
    /// Time without date component
    Time,
}

/// A named, typed column of a table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Column { name: name.into(), kind }
    }
}

impl ColumnType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "boolean",
            ColumnType::BigInt => "bigint",
            ColumnType::Double => "double",
            ColumnType::Varchar => "varchar",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
        }
    }

    /// Returns true for one of the missing-value tokens.
    pub fn is_missing_text(value: &str) -> bool {
        MISSING_TOKENS.contains(&value)
    }

    /// Candidate type of a single text field, `None` when the field is missing.
    pub fn from_text(value: &str) -> Option<Self> {
        if Self::is_missing_text(value) {
            None
        } else if parse_boolean(value).is_some() {
            Some(ColumnType::Boolean)
        } else if Self::is_integer(value) && value.trim().parse::<i64>().is_ok() {
            Some(ColumnType::BigInt)
        } else if value.trim().parse::<f64>().is_ok() {
            Some(ColumnType::Double)
        } else {
            Some(ColumnType::Varchar)
        }
    }

    /// Checks if a numeric literal carries no fraction and no exponent.
    pub(crate) fn is_integer(value: &str) -> bool {
        !value.contains(['.', 'e', 'E'])
    }

    /// Detects the most specific common type from a collection of candidate types.
    /// A column with no values at all is Double, the type a missing-only column reads as.
    pub fn detect(types: impl IntoIterator<Item = Option<ColumnType>>) -> ColumnType {
        let types: Vec<ColumnType> = types.into_iter().flatten().collect();
        if types.is_empty() {
            ColumnType::Double
        } else if types.iter().all(|kind| kind.is_boolean()) {
            ColumnType::Boolean
        } else if types.iter().all(|kind| kind.is_int()) {
            ColumnType::BigInt
        } else if types.iter().all(|kind| kind.is_numeric()) {
            ColumnType::Double
        } else if types.iter().all(|kind| kind.is_date()) {
            ColumnType::Date
        } else if types.iter().all(|kind| kind.is_time()) {
            ColumnType::Time
        } else if types.iter().all(|kind| kind.is_datetime()) {
            ColumnType::Timestamp
        } else {
            ColumnType::Varchar
        }
    }

    /// Converts a text field to a value of this column type.
    /// Fields that do not parse as the column type keep their text.
    pub fn parse_text(&self, value: &str) -> Value {
        if Self::is_missing_text(value) {
            return Value::Null;
        }
        let parsed = match self {
            ColumnType::Boolean => parse_boolean(value).map(Value::Boolean),
            ColumnType::BigInt => value.trim().parse::<i64>().ok().map(Value::Int),
            ColumnType::Double => value.trim().parse::<f64>().ok().map(Value::Float),
            _ => None,
        };
        parsed.unwrap_or_else(|| Value::Text(value.to_owned()))
    }

    #[inline]
    pub fn is_boolean(&self) -> bool {
        matches!(self, ColumnType::Boolean)
    }

    #[inline]
    pub fn is_int(&self) -> bool {
        matches!(self, ColumnType::BigInt)
    }

    /// Returns true if this column type represents numeric values (integer or floating point).
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::BigInt | ColumnType::Double)
    }

    #[inline]
    pub fn is_date(&self) -> bool {
        matches!(self, ColumnType::Date)
    }

    #[inline]
    pub fn is_time(&self) -> bool {
        matches!(self, ColumnType::Time)
    }

    /// Returns true if this column type represents date/time related values.
    #[inline]
    pub fn is_datetime(&self) -> bool {
        matches!(self, ColumnType::Timestamp | ColumnType::Date | ColumnType::Time)
    }
}

fn parse_boolean(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
