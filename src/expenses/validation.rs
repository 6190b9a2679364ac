//! Pure input checks for expense payloads and query strings. Nothing here
//! touches the store; every violated rule is collected into one
//! [`AppError::Validation`].

use rust_decimal::Decimal;
use serde_json::Value;
use time::{
    format_description::well_known::Rfc3339,
    macros::{format_description, time},
    Date, OffsetDateTime, PrimitiveDateTime, UtcOffset,
};

use super::{
    dto::{CreateExpenseRequest, ListQuery, SummaryQuery, UpdateExpenseRequest},
    repo_types::{DateRange, ExpenseChanges, ExpenseFilter, ExpenseInput, ListParams},
};
use crate::error::{AppError, FieldError};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// Upper bound for one amount, mirrored by the table CHECK. Keeps sums far inside `Decimal`.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);

#[derive(Default)]
struct Violations(Vec<FieldError>);

impl Violations {
    fn push(&mut self, field: &str, message: &str) {
        self.0.push(FieldError::new(field, message));
    }

    fn finish<T>(self, value: T) -> Result<T, AppError> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(AppError::Validation(self.0))
        }
    }
}

/// Accepts `YYYY-MM-DD`, RFC 3339, or `YYYY-MM-DDTHH:MM:SS` (read as UTC).
/// The result is always in UTC.
pub fn parse_iso_datetime(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        // Offsets can push the instant past the representable range.
        return dt.checked_to_offset(UtcOffset::UTC);
    }
    if let Ok(date) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        return Some(date.midnight().assume_utc());
    }
    PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )
    .ok()
    .map(PrimitiveDateTime::assume_utc)
}

/// 00:00:00.000 UTC of the day `at` falls on. `at` must already be UTC.
pub fn start_of_day(at: OffsetDateTime) -> OffsetDateTime {
    at.date().midnight().assume_utc()
}

/// 23:59:59.999 UTC of the day `at` falls on. `at` must already be UTC.
pub fn end_of_day(at: OffsetDateTime) -> OffsetDateTime {
    PrimitiveDateTime::new(at.date(), time!(23:59:59.999)).assume_utc()
}

fn parse_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let raw = n.to_string();
            raw.parse::<Decimal>()
                .ok()
                .or_else(|| Decimal::from_scientific(&raw).ok())
        }
        Value::String(s) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    }
}

fn check_amount(value: &Value, v: &mut Violations) -> Option<Decimal> {
    match parse_amount(value) {
        None => {
            v.push("amount", "Amount must be a number");
            None
        }
        Some(amount) if amount <= Decimal::ZERO => {
            v.push("amount", "Amount must be greater than 0");
            None
        }
        Some(amount) if amount > MAX_AMOUNT => {
            v.push("amount", "Amount is too large");
            None
        }
        Some(amount) => Some(amount),
    }
}

fn check_category(value: &Value, v: &mut Violations) -> Option<String> {
    match value.as_str().map(str::trim) {
        Some(c) if !c.is_empty() => Some(c.to_string()),
        Some(_) => {
            v.push("category", "Category is required");
            None
        }
        None => {
            v.push("category", "Category must be a string");
            None
        }
    }
}

/// Trimmed note; an empty note becomes `None`.
fn check_note(value: &Value, v: &mut Violations) -> Option<Option<String>> {
    match value.as_str().map(str::trim) {
        Some("") => Some(None),
        Some(n) => Some(Some(n.to_string())),
        None => {
            v.push("note", "Note must be a string");
            None
        }
    }
}

fn check_date(value: &Value, v: &mut Violations) -> Option<OffsetDateTime> {
    let parsed = value.as_str().and_then(parse_iso_datetime);
    if parsed.is_none() {
        v.push("date", "Date must be a valid ISO 8601 date");
    }
    parsed
}

pub fn validate_create(req: CreateExpenseRequest) -> Result<ExpenseInput, AppError> {
    let mut v = Violations::default();

    let amount = match &req.amount {
        Some(value) => check_amount(value, &mut v),
        None => {
            v.push("amount", "Amount is required");
            None
        }
    };
    let category = match &req.category {
        Some(value) => check_category(value, &mut v),
        None => {
            v.push("category", "Category is required");
            None
        }
    };
    let note = req.note.as_ref().and_then(|n| check_note(n, &mut v)).flatten();
    let date = req.date.as_ref().and_then(|d| check_date(d, &mut v));

    match (amount, category) {
        (Some(amount), Some(category)) => v.finish(ExpenseInput {
            amount,
            category,
            note,
            date,
        }),
        // At least one violation was recorded on the way here.
        _ => Err(AppError::Validation(v.0)),
    }
}

pub fn validate_update(req: UpdateExpenseRequest) -> Result<ExpenseChanges, AppError> {
    let mut v = Violations::default();
    let changes = ExpenseChanges {
        amount: req.amount.as_ref().and_then(|a| check_amount(a, &mut v)),
        category: req.category.as_ref().and_then(|c| check_category(c, &mut v)),
        note: req.note.as_ref().and_then(|n| check_note(n, &mut v)),
        date: req.date.as_ref().and_then(|d| check_date(d, &mut v)),
    };
    v.finish(changes)
}

fn date_range(
    start: Option<&str>,
    end: Option<&str>,
    v: &mut Violations,
) -> DateRange {
    let mut bound = |field: &str, raw: Option<&str>| match raw.map(str::trim) {
        None | Some("") => None,
        Some(raw) => {
            let parsed = parse_iso_datetime(raw);
            if parsed.is_none() {
                v.push(field, "Must be a valid ISO 8601 date");
            }
            parsed
        }
    };
    DateRange {
        start: bound("startDate", start).map(start_of_day),
        end: bound("endDate", end).map(end_of_day),
    }
}

/// Positive integer or `default`; anything unparsable falls back silently.
fn positive_or(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|r| r.trim().parse::<i64>().ok())
        .filter(|n| *n >= 1)
        .unwrap_or(default)
}

pub fn validate_list_query(q: &ListQuery) -> Result<ListParams, AppError> {
    let mut v = Violations::default();
    let range = date_range(q.start_date.as_deref(), q.end_date.as_deref(), &mut v);
    let category = q
        .category
        .as_deref()
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    v.finish(ListParams {
        filter: ExpenseFilter { category, range },
        page: positive_or(q.page.as_deref(), DEFAULT_PAGE),
        limit: positive_or(q.limit.as_deref(), DEFAULT_LIMIT).min(MAX_LIMIT),
    })
}

pub fn validate_summary_query(q: &SummaryQuery) -> Result<DateRange, AppError> {
    let mut v = Violations::default();
    let range = date_range(q.start_date.as_deref(), q.end_date.as_deref(), &mut v);
    v.finish(range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::range_contains;
    use serde_json::json;
    use time::macros::datetime;

    fn create(body: Value) -> Result<ExpenseInput, AppError> {
        validate_create(serde_json::from_value(body).unwrap())
    }

    fn update(body: Value) -> Result<ExpenseChanges, AppError> {
        validate_update(serde_json::from_value(body).unwrap())
    }

    fn fields(err: AppError) -> Vec<String> {
        match err {
            AppError::Validation(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn create_accepts_minimal_payload() {
        let input = create(json!({ "amount": 12.5, "category": "  Food " })).unwrap();
        assert_eq!(input.amount, Decimal::new(125, 1));
        assert_eq!(input.category, "Food");
        assert_eq!(input.note, None);
        assert_eq!(input.date, None);
    }

    #[test]
    fn create_accepts_numeric_strings_and_dates() {
        let input = create(json!({
            "amount": "40.10",
            "category": "Transport",
            "note": "  taxi  ",
            "date": "2024-03-05"
        }))
        .unwrap();
        assert_eq!(input.amount, Decimal::new(4010, 2));
        assert_eq!(input.note.as_deref(), Some("taxi"));
        assert_eq!(input.date, Some(datetime!(2024-03-05 0:00 UTC)));
    }

    #[test]
    fn create_reports_every_violation() {
        let err = create(json!({ "amount": -3, "category": "   ", "date": "yesterday" })).unwrap_err();
        assert_eq!(fields(err), vec!["amount", "category", "date"]);
    }

    #[test]
    fn create_requires_amount_and_category() {
        let err = create(json!({})).unwrap_err();
        assert_eq!(fields(err), vec!["amount", "category"]);
    }

    #[test]
    fn zero_and_non_numeric_amounts_are_rejected() {
        assert_eq!(fields(create(json!({ "amount": 0, "category": "x" })).unwrap_err()), vec!["amount"]);
        assert_eq!(fields(create(json!({ "amount": "ten", "category": "x" })).unwrap_err()), vec!["amount"]);
        assert_eq!(fields(create(json!({ "amount": true, "category": "x" })).unwrap_err()), vec!["amount"]);
    }

    #[test]
    fn amount_is_capped() {
        assert_eq!(MAX_AMOUNT.to_string(), "999999999999.99");
        let input = create(json!({ "amount": "999999999999.99", "category": "x" })).unwrap();
        assert_eq!(input.amount, MAX_AMOUNT);
        assert_eq!(
            fields(create(json!({ "amount": "1000000000000", "category": "x" })).unwrap_err()),
            vec!["amount"]
        );
        assert_eq!(
            fields(update(json!({ "amount": "79228162514264337593543950335" })).unwrap_err()),
            vec!["amount"]
        );
    }

    #[test]
    fn update_only_touches_present_fields() {
        let changes = update(json!({ "category": "Rent" })).unwrap();
        assert_eq!(
            changes,
            ExpenseChanges {
                category: Some("Rent".into()),
                ..Default::default()
            }
        );
        assert_eq!(update(json!({})).unwrap(), ExpenseChanges::default());
    }

    #[test]
    fn update_empty_note_clears_it() {
        let changes = update(json!({ "note": "   " })).unwrap();
        assert_eq!(changes.note, Some(None));
    }

    #[test]
    fn update_validates_supplied_fields() {
        let err = update(json!({ "amount": 0, "category": "" })).unwrap_err();
        assert_eq!(fields(err), vec!["amount", "category"]);
    }

    #[test]
    fn rfc3339_offsets_are_converted_to_utc() {
        let parsed = parse_iso_datetime("2024-01-01T23:30:00-02:00").unwrap();
        assert_eq!(parsed, datetime!(2024-01-02 1:30 UTC));
        assert_eq!(parsed.offset(), UtcOffset::UTC);
        assert_eq!(
            parse_iso_datetime("2024-01-01T10:15:00"),
            Some(datetime!(2024-01-01 10:15 UTC))
        );
        assert_eq!(parse_iso_datetime("01/02/2024"), None);
    }

    #[test]
    fn range_bounds_cover_whole_days() {
        let q = ListQuery {
            start_date: Some("2024-01-01T15:00:00Z".into()),
            end_date: Some("2024-01-01".into()),
            ..Default::default()
        };
        let params = validate_list_query(&q).unwrap();
        let range = params.filter.range;
        assert_eq!(range.start, Some(datetime!(2024-01-01 0:00 UTC)));
        assert_eq!(range.end, Some(datetime!(2024-01-01 23:59:59.999 UTC)));
        assert!(range_contains(&range, datetime!(2024-01-01 23:00 UTC)));
        assert!(!range_contains(&range, datetime!(2024-01-02 0:00:01 UTC)));
    }

    #[test]
    fn last_representable_day_is_a_valid_bound() {
        let q = SummaryQuery {
            start_date: Some("9999-12-31".into()),
            end_date: Some("9999-12-31".into()),
        };
        let range = validate_summary_query(&q).unwrap();
        assert_eq!(range.start, Some(datetime!(9999-12-31 0:00 UTC)));
        assert_eq!(range.end, Some(datetime!(9999-12-31 23:59:59.999 UTC)));
    }

    #[test]
    fn offsets_past_the_calendar_are_rejected() {
        assert_eq!(parse_iso_datetime("9999-12-31T23:00:00-02:00"), None);
        let q = ListQuery {
            end_date: Some("9999-12-31T23:00:00-02:00".into()),
            ..Default::default()
        };
        assert_eq!(fields(validate_list_query(&q).unwrap_err()), vec!["endDate"]);
    }

    #[test]
    fn huge_page_saturates_offset() {
        let q = ListQuery {
            page: Some(i64::MAX.to_string()),
            limit: Some("100".into()),
            ..Default::default()
        };
        let params = validate_list_query(&q).unwrap();
        assert_eq!(params.page, i64::MAX);
        assert_eq!(params.offset(), i64::MAX);
    }

    #[test]
    fn paging_falls_back_to_defaults() {
        let q = ListQuery {
            page: Some("abc".into()),
            limit: Some("-5".into()),
            ..Default::default()
        };
        let params = validate_list_query(&q).unwrap();
        assert_eq!(params.page, DEFAULT_PAGE);
        assert_eq!(params.limit, DEFAULT_LIMIT);

        let params = validate_list_query(&ListQuery::default()).unwrap();
        assert_eq!((params.page, params.limit), (1, 10));
        assert_eq!(params.filter, ExpenseFilter::default());

        let q = ListQuery {
            page: Some("2".into()),
            limit: Some("1000".into()),
            ..Default::default()
        };
        let params = validate_list_query(&q).unwrap();
        assert_eq!((params.page, params.limit), (2, MAX_LIMIT));
        assert_eq!(params.offset(), MAX_LIMIT);
    }

    #[test]
    fn bad_filter_dates_are_rejected() {
        let q = SummaryQuery {
            start_date: Some("soon".into()),
            end_date: Some("later".into()),
        };
        assert_eq!(
            fields(validate_summary_query(&q).unwrap_err()),
            vec!["startDate", "endDate"]
        );
    }
}
