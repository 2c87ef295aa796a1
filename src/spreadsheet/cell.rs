use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;

/// How a raw cell value must be rendered as text.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    Boolean,
    Number,
    /// Serial date numbers, 1900 or 1904 epoch
    Date1900,
    Date1904,
    DateTime1900,
    DateTime1904,
    /// Fraction of a day
    Time,
    /// ISO 8601 text (`t="d"` cells)
    IsoDateTime,
    InlineString,
    /// Index into the shared string table
    SharedString,
    Error,
}

impl CellType {
    fn date(is_1904: bool) -> Self {
        if is_1904 {
            Self::Date1904
        } else {
            Self::Date1900
        }
    }

    fn datetime(is_1904: bool) -> Self {
        if is_1904 {
            Self::DateTime1904
        } else {
            Self::DateTime1900
        }
    }

    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(Self::datetime(is_1904)),
            "14" | "15" | "16" | "17" => Some(Self::date(is_1904)),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(Self::Time),
            _ => None,
        }
    }

    /// Classifies a custom format code by the date and time tokens it contains,
    /// ignoring quoted literals, escaped characters and bracketed sections.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_bracket = false;
        let mut is_date = false;
        let mut is_time = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' => is_escaped = true,

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

        match (is_date, is_time) {
            (true, true) => Self::datetime(is_1904),
            (true, false) => Self::date(is_1904),
            (false, true) => Self::Time,
            (false, false) => Self::Number,
        }
    }
}

pub(crate) fn to_error_value(value: u8) -> &'static str {
    match value {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// Renders a raw value as the text stored in the grid.
/// Values that do not parse as their declared type are kept verbatim.
pub(crate) fn render(kind: CellType, value: &str) -> String {
    let rendered = match kind {
        CellType::Empty => Some(String::new()),
        CellType::Boolean => Some(if value == "1" { "True" } else { "False" }.to_owned()),
        CellType::Number => to_number_string(value),
        CellType::Date1900 => to_datetime(value, false).map(|datetime| format_datetime(&datetime)),
        CellType::Date1904 => to_datetime(value, true).map(|datetime| format_datetime(&datetime)),
        CellType::DateTime1900 => to_datetime(value, false).map(|datetime| format_datetime(&datetime)),
        CellType::DateTime1904 => to_datetime(value, true).map(|datetime| format_datetime(&datetime)),
        CellType::Time => to_time_string(value),
        CellType::IsoDateTime => Some(value.replacen('T', " ", 1)),
        CellType::InlineString | CellType::SharedString | CellType::Error => None,
    };
    rendered.unwrap_or_else(|| value.to_owned())
}

/// Integral values lose their fractional part: `"3.0"` and `"3"` both become `"3"`.
fn to_number_string(value: &str) -> Option<String> {
    let number = value.trim().parse::<f64>().ok()?;
    if number.is_finite() && number.fract() == 0.0 && number.abs() < 1e15 {
        Some(format!("{}", number as i64))
    } else {
        None
    }
}

fn format_datetime(datetime: &NaiveDateTime) -> String {
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Serial day number to date and time. The 1900 system counts the phantom
/// 1900-02-29, so serials before 60 are shifted by one day.
pub(crate) fn to_datetime(value: &str, is_1904: bool) -> Option<NaiveDateTime> {
    let serial = value.trim().parse::<f64>().ok()?;
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let mut days = serial.trunc() as i64;
    if is_1904 {
        days += 1462;
    } else if days < 60 {
        days += 1;
    }
    let seconds = (serial.fract() * 86_400f64).round() as i64;
    NaiveDate::from_ymd_opt(1899, 12, 30)?
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::try_days(days)?)?
        .checked_add_signed(Duration::try_seconds(seconds)?)
}

fn to_time_string(value: &str) -> Option<String> {
    let fraction = value.trim().parse::<f64>().ok()?;
    if !fraction.is_finite() || fraction < 0.0 {
        return None;
    }
    let mut seconds = (fraction * 86_400f64).round() as i64;
    let hours = seconds / 3600;
    seconds %= 3600;
    let minutes = seconds / 60;
    seconds %= 60;
    Some(format!("{hours:02}:{minutes:02}:{seconds:02}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("yyyy-mm-dd", CellType::Date1900)]
    #[case("dd/mm/yyyy hh:mm", CellType::DateTime1900)]
    #[case("hh:mm:ss", CellType::Time)]
    #[case("0.00", CellType::Number)]
    #[case("#,##0\" days\"", CellType::Number)]
    #[case("[Red]0.00", CellType::Number)]
    #[case("\\d0", CellType::Number)]
    fn test_custom_number_format(#[case] format: &str, #[case] expected: CellType) {
        assert_eq!(CellType::parse_custom_number_format(format, false), expected);
    }

    #[rstest]
    #[case(CellType::Number, "42", "42")]
    #[case(CellType::Number, "3.0", "3")]
    #[case(CellType::Number, "2.5", "2.5")]
    #[case(CellType::Number, "1.5E+20", "1.5E+20")]
    #[case(CellType::Boolean, "1", "True")]
    #[case(CellType::Boolean, "0", "False")]
    #[case(CellType::Date1900, "44197", "2021-01-01 00:00:00")]
    #[case(CellType::Date1900, "1", "1900-01-01 00:00:00")]
    #[case(CellType::Date1904, "0", "1904-01-01 00:00:00")]
    #[case(CellType::DateTime1900, "44197.5", "2021-01-01 12:00:00")]
    #[case(CellType::Time, "0.75", "18:00:00")]
    #[case(CellType::IsoDateTime, "2021-01-01T08:30:00", "2021-01-01 08:30:00")]
    #[case(CellType::InlineString, "nan", "nan")]
    #[case(CellType::Error, "#N/A", "#N/A")]
    #[case(CellType::Date1900, "not a date", "not a date")]
    fn test_render(#[case] kind: CellType, #[case] value: &str, #[case] expected: &str) {
        assert_eq!(render(kind, value), expected);
    }
}
