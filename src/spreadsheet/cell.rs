use crate::table::ColumnType;
use crate::table::Value;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use chrono::Timelike;
use std::fmt::Display;

const MICROS_PER_DAY: f64 = 86_400_000_000f64;

/// Types of cell data in a worksheet.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean values (0/1)
    Boolean,
    /// Numeric values
    Number,
    /// Date/time values stored as numbers from 1900 epoch
    NumberDateTime1900,
    /// Date values stored as numbers from 1900 epoch
    NumberDate1900,
    /// Time values stored as numbers from 1900 epoch
    NumberTime1900,
    /// Date/time values stored as numbers from 1904 epoch
    NumberDateTime1904,
    /// Date values stored as numbers from 1904 epoch
    NumberDate1904,
    /// Time values stored as numbers from 1904 epoch
    NumberTime1904,
    /// ISO 8601 date/time strings
    IsoDateTime,
    /// Inline or shared string values, already resolved
    Text,
    /// Error values such as `#DIV/0!`
    Error,
}

impl CellType {
    /// Parses built-in Excel number format IDs to determine cell type.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }),
            "14" | "15" | "16" | "17" => Some(if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }),
            _ => None,
        }
    }

    /// Parses custom number format strings to determine cell type.
    /// Analyzes format codes for date/time patterns outside literals and brackets.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_date = false;
        let mut is_time = false;
        let mut is_bracket = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' if !is_literal => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_bracket => is_literal = true,

                ']' if is_bracket => is_bracket = false,
                '[' if !is_literal => is_bracket = true,
                _ if is_literal || is_bracket => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }

    fn is_1904(&self) -> bool {
        matches!(self, Self::NumberDateTime1904 | Self::NumberDate1904 | Self::NumberTime1904)
    }
}

/// A single non-empty cell of a worksheet with position, type, and raw value.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Cell {
    /// Row index (0-based)
    pub(crate) row: usize,
    /// Column index (0-based)
    pub(crate) col: usize,
    pub(crate) kind: CellType,
    /// Raw cell value as stored in the worksheet
    pub(crate) value: String,
}

impl Cell {
    /// Type this cell suggests for its column, `None` for cells that carry no value.
    pub(crate) fn candidate_type(&self) -> Option<ColumnType> {
        match self.kind {
            CellType::Empty | CellType::Error => None,
            CellType::Boolean => Some(ColumnType::Boolean),
            CellType::Number if ColumnType::is_integer(&self.value) && self.value.parse::<i64>().is_ok() => Some(ColumnType::BigInt),
            CellType::Number => Some(ColumnType::Double),
            CellType::NumberDateTime1900 | CellType::NumberDateTime1904 => Some(ColumnType::Timestamp),
            CellType::NumberDate1900 | CellType::NumberDate1904 => Some(ColumnType::Date),
            CellType::NumberTime1900 | CellType::NumberTime1904 => Some(ColumnType::Time),
            CellType::IsoDateTime if self.value.contains('T') => Some(ColumnType::Timestamp),
            CellType::IsoDateTime => Some(ColumnType::Date),
            CellType::Text => Some(ColumnType::Varchar),
        }
    }

    /// Converts the cell to a value of the given column type.
    /// Cells that cannot be read as that type keep their text rendering.
    pub(crate) fn to_value(&self, kind: ColumnType) -> Value {
        if self.candidate_type().is_none() {
            return Value::Null;
        }
        let value = match kind {
            ColumnType::Boolean => Some(Value::Boolean(self.value == "1" || self.value.eq_ignore_ascii_case("true"))),
            ColumnType::BigInt => self.value.parse::<i64>().ok().map(Value::Int),
            ColumnType::Double => self.value.parse::<f64>().ok().map(Value::Float),
            ColumnType::Timestamp => self.to_datetime().map(Value::Timestamp),
            ColumnType::Date => self.to_datetime().map(|datetime| Value::Date(datetime.date())),
            ColumnType::Time => self.to_datetime().map(|datetime| Value::Time(datetime.time())),
            ColumnType::Varchar => None,
        };
        value.unwrap_or_else(|| Value::Text(self.to_string()))
    }

    fn to_datetime(&self) -> Option<NaiveDateTime> {
        match self.kind {
            CellType::IsoDateTime if self.value.contains('T') => {
                NaiveDateTime::parse_from_str(&self.value, "%Y-%m-%dT%H:%M:%S%.f").ok()
            }
            CellType::IsoDateTime => NaiveDate::parse_from_str(&self.value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0)),
            CellType::Number | CellType::Boolean | CellType::Text | CellType::Empty | CellType::Error => None,
            _ => from_serial(self.value.parse::<f64>().ok()?, self.kind.is_1904()),
        }
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let datetime = self.to_datetime();
        match (self.candidate_type(), datetime) {
            (Some(ColumnType::Boolean), _) => write!(f, "{}", Value::Boolean(self.value == "1" || self.value.eq_ignore_ascii_case("true"))),
            (Some(ColumnType::Timestamp), Some(datetime)) => write!(f, "{}", Value::Timestamp(datetime)),
            (Some(ColumnType::Date), Some(datetime)) => write!(f, "{}", Value::Date(datetime.date())),
            (Some(ColumnType::Time), Some(datetime)) => write!(f, "{}", Value::Time(datetime.time())),
            _ => write!(f, "{}", self.value),
        }
    }
}

fn epoch(is_1904: bool) -> NaiveDateTime {
    let date = if is_1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)
    };
    date.and_then(|date| date.and_hms_opt(0, 0, 0)).expect("NaiveDate Literal")
}

/// Converts an Excel serial date number to a date-time.
/// Serial numbers before 1900-03-01 are shifted by the Lotus 1-2-3 leap year bug.
pub(crate) fn from_serial(serial: f64, is_1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let mut days = serial.trunc() as i64;
    if !is_1904 && days < 60 {
        days += 1;
    }
    let micros = (serial.fract() * MICROS_PER_DAY).round() as i64;
    epoch(is_1904)
        .checked_add_signed(Duration::days(days))?
        .checked_add_signed(Duration::microseconds(micros))
}

/// Converts a date-time to an Excel serial date number in the 1900 date system.
pub(crate) fn to_serial(datetime: NaiveDateTime) -> f64 {
    let elapsed = datetime - epoch(false);
    let mut days = elapsed.num_days();
    if days < 61 {
        days -= 1;
    }
    let micros = (elapsed - Duration::days(elapsed.num_days()))
        .num_microseconds()
        .unwrap_or(0);
    days as f64 + micros as f64 / MICROS_PER_DAY
}

/// Converts a time of day to the fraction of a day Excel stores.
pub(crate) fn time_to_serial(time: NaiveTime) -> f64 {
    let micros = time.num_seconds_from_midnight() as f64 * 1_000_000f64 + (time.nanosecond() / 1_000) as f64;
    micros / MICROS_PER_DAY
}
