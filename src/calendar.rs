use chrono::Month;

/// Calendar months in processing order.
pub fn months() -> impl Iterator<Item = u32> {
    1..=12
}

/// English month name used for labels, directory names and the `Month` field.
pub fn month_name(month: u32) -> Option<&'static str> {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name())
}
