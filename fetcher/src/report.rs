use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use reqwest::Client as HTTPClient;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, COOKIE, REFERER, USER_AGENT};
use scraper::{Html, Selector};
use std::sync::LazyLock;

use crate::extract::{css, readings_table};

pub const DEFAULT_REPORT_URL: &str = "https://wateroffice.ec.gc.ca/report/real_time_e.html";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const BROWSER_ACCEPT_LANGUAGE: &str = "en-CA,en;q=0.9,fr-CA;q=0.8";
const DISCLAIMER_COOKIE: &str = "disclaimer=agree";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Form field present on the disclaimer interstitial.
static DISCLAIMER_FIELD: LazyLock<Selector> = LazyLock::new(|| css(r#"[name="disclaimer_action"]"#));

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    Status { status: StatusCode, url: String },
    #[error("disclaimer page returned instead of data from {url}")]
    Disclaimer { url: String },
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err)
        } else {
            FetchError::Transport(err)
        }
    }
}

/// Inclusive calendar range requested from the report page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// `end` is today at the site, `start` is `days` earlier.
    pub fn lookback(now: DateTime<Utc>, site_timezone: Tz, days: i64) -> Self {
        let end = now.with_timezone(&site_timezone);
        let start = end - Duration::days(days);
        Self {
            start: start.date_naive(),
            end: end.date_naive(),
        }
    }
}

/// Anything able to produce the raw report HTML for one station.
pub trait ReportSource {
    async fn fetch(&self, station_id: &str, range: DateRange) -> Result<String, FetchError>;
}

pub struct HttpReportFetcher {
    client: HTTPClient,
    base_url: String,
    session_cookie: String,
}

impl HttpReportFetcher {
    pub fn new(
        client: HTTPClient,
        base_url: impl Into<String>,
        session_cookie: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            session_cookie: session_cookie.into(),
        }
    }

    pub fn report_url(&self, station_id: &str, range: DateRange) -> String {
        format!(
            "{}?stn={}&mode=Table&startDate={}&endDate={}",
            self.base_url,
            station_id,
            range.start.format(DATE_FORMAT),
            range.end.format(DATE_FORMAT)
        )
    }

    fn cookie_header(&self) -> String {
        format!("PHPSESSID={}; {DISCLAIMER_COOKIE}", self.session_cookie)
    }
}

impl ReportSource for HttpReportFetcher {
    async fn fetch(&self, station_id: &str, range: DateRange) -> Result<String, FetchError> {
        let url = self.report_url(station_id, range);
        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, BROWSER_ACCEPT)
            .header(ACCEPT_LANGUAGE, BROWSER_ACCEPT_LANGUAGE)
            .header(REFERER, self.base_url.as_str())
            .header(COOKIE, self.cookie_header())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status, url });
        }

        let body = response.text().await?;
        if is_disclaimer_page(&body) {
            return Err(FetchError::Disclaimer { url });
        }
        Ok(body)
    }
}

/// The agreement form without the readings table. Some data pages embed the
/// form too, so the form alone is not enough.
fn is_disclaimer_page(body: &str) -> bool {
    let document = Html::parse_document(body);
    document.select(&DISCLAIMER_FIELD).next().is_some() && readings_table(&document).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn report_url_carries_station_and_iso_dates() {
        let fetcher = HttpReportFetcher::new(HTTPClient::new(), DEFAULT_REPORT_URL, "abc");
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 2)).unwrap();
        assert_eq!(
            fetcher.report_url("05BH004", range),
            "https://wateroffice.ec.gc.ca/report/real_time_e.html?stn=05BH004&mode=Table&startDate=2024-01-01&endDate=2024-01-02"
        );
        assert_eq!(fetcher.cookie_header(), "PHPSESSID=abc; disclaimer=agree");
    }

    #[test]
    fn lookback_uses_site_local_calendar() {
        // 03:00 UTC is still the previous evening in Toronto.
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 3, 0, 0).unwrap();
        let range = DateRange::lookback(now, chrono_tz::America::Toronto, 1);
        assert_eq!(range.end, date(2024, 3, 9));
        assert_eq!(range.start, date(2024, 3, 8));
    }

    #[test]
    fn date_range_rejects_inverted_bounds() {
        assert!(DateRange::new(date(2024, 2, 2), date(2024, 2, 1)).is_none());
        assert!(DateRange::new(date(2024, 2, 1), date(2024, 2, 1)).is_some());
    }

    #[test]
    fn disclaimer_page_is_detected() {
        let disclaimer = r#"<form method="post"><input type="submit" name="disclaimer_action" value="I Agree"></form>"#;
        assert!(is_disclaimer_page(disclaimer));
        let data = r#"<table><caption>Real-time data in tabular format</caption></table><input name="disclaimer_action">"#;
        assert!(!is_disclaimer_page(data));
        assert!(!is_disclaimer_page("<html><body>No data available</body></html>"));
    }

    #[test]
    fn unrelated_caption_does_not_hide_the_disclaimer() {
        let body = r#"<html><body>
            <table><caption>Station summary</caption><tr><td>05BH004</td></tr></table>
            <form method="post"><button type="submit" name="disclaimer_action" value="agree">I Agree</button></form>
            </body></html>"#;
        assert!(is_disclaimer_page(body));
        let with_data = body.replace(
            "</body>",
            "<table><caption>Real-Time Data in Tabular Format</caption></table></body>",
        );
        assert!(!is_disclaimer_page(&with_data));
    }
}
