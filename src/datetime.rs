use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};

#[cfg(not(test))]
/// 現在のUTC時間を取得する。
pub fn now() -> DateTime<Utc> {
    Utc::now()
}


#[cfg(test)]
pub use mock_datetime::now;

/// `start`から`end`までの経過時間をミリ秒で返す。
///
/// 時計のずれで`end`が`start`より前になった場合は0とする。
pub fn millis_between(start: &DateTime<Utc>, end: &DateTime<Utc>) -> i64 {
    (*end - *start).num_milliseconds().max(0)
}

/// `YYYY-MM-DD`形式の日付をパースする。
///
/// Localタイムゾーンでのその日の00:00:00をUTCに変換して返す。
pub fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let naive_date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Failed to parse date: {}", s))?;
    let naive_datetime = naive_date
        .and_hms_opt(0, 0, 0)
        .context("Failed to set hour, minute, and second")?;
    let datetime = Local
        .from_local_datetime(&naive_datetime)
        .single()
        .context("Failed to convert to DateTime<Local>")?
        .to_utc();

    Ok(datetime)
}

/// ISO-8601形式の日時をパースする。
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>> {
    let datetime = DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Failed to parse instant: {}", s))?
        .to_utc();

    Ok(datetime)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Local, SecondsFormat, TimeZone, Utc};
    use rstest::rstest;

    use super::{millis_between, mock_datetime, parse_date, parse_instant};

    /// 何も設定しない場合は、現在時間が取得できることを確認する。
    ///
    ///  - 現在時刻での比較を行なっているため、ミリ秒単位まで比較するとテストが失敗する可能性があり、秒単位で比較している。
    #[test]
    fn test_now() {
        assert_eq!(
            mock_datetime::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }

    /// モック時間を設定した時に、その時間が取得できることを確認する。
    #[test]
    fn test_now_specific_datetime() {
        let datetime = String::from("2024-01-01T00:00:00+00:00");
        mock_datetime::set_mock_time(
            DateTime::parse_from_rfc3339(datetime.as_str())
                .unwrap()
                .to_utc(),
        );

        assert_eq!(mock_datetime::now().to_rfc3339(), datetime);
    }

    #[test]
    fn test_now_specific_millis() {
        mock_datetime::set_mock_millis(61_000);

        assert_eq!(mock_datetime::now().timestamp_millis(), 61_000);
    }

    /// モック時間をリセットした時に、現在時間が取得できることを確認する。
    #[test]
    fn test_now_after_clear_mock_time() {
        mock_datetime::set_mock_millis(1_000);
        mock_datetime::clear_mock_time();

        assert_eq!(
            mock_datetime::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }

    #[rstest]
    #[case::one_minute(1_000, 61_000, 60_000)]
    #[case::same_instant(5_000, 5_000, 0)]
    #[case::clock_skew(61_000, 1_000, 0)]
    fn test_millis_between(#[case] start: i64, #[case] end: i64, #[case] expected: i64) {
        let start = DateTime::from_timestamp_millis(start).unwrap();
        let end = DateTime::from_timestamp_millis(end).unwrap();

        assert_eq!(millis_between(&start, &end), expected);
    }

    #[test]
    fn test_parse_date() {
        let expected = Local.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap().to_utc();

        assert_eq!(parse_date("2024-03-15").unwrap(), expected);
    }

    #[rstest]
    #[case::empty("")]
    #[case::month_only("2024-03")]
    #[case::invalid_day("2024-02-30")]
    fn test_parse_date_invalid(#[case] input: &str) {
        assert!(parse_date(input).is_err());
    }

    #[rstest]
    #[case::utc("2024-01-01T00:01:00Z", 1_704_067_260_000)]
    #[case::offset("2024-01-01T09:01:00+09:00", 1_704_067_260_000)]
    #[case::millis("2024-01-01T00:01:00.500Z", 1_704_067_260_500)]
    fn test_parse_instant(#[case] input: &str, #[case] expected_millis: i64) {
        assert_eq!(parse_instant(input).unwrap().timestamp_millis(), expected_millis);
    }
}
