use hydrometric_core::{RawReading, parse_measurement};
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

/// Caption of the report table holding the readings, compared case-insensitively.
pub const TABLE_CAPTION_MARKER: &str = "real-time data in tabular format";

const MIN_CELLS: usize = 6;
const TIMESTAMP_CELL: usize = 0;
const WATER_LEVEL_CELL: usize = 1;
const DISCHARGE_CELL: usize = 5;
/// Machine-readable cell values used by the site's table sorting, preferred
/// over the rendered text.
const SORT_ATTRIBUTES: &[&str] = &["data-order", "data-sort"];

static TABLE: LazyLock<Selector> = LazyLock::new(|| css("table"));

pub(crate) fn css(selector: &str) -> Selector {
    Selector::parse(selector).unwrap_or_else(|err| panic!("invalid selector {selector:?}: {err}"))
}

/// Extracts the readings of the first real-time table in `html`. A page
/// without that table yields no readings; rows that do not look like data
/// rows are skipped.
pub fn extract_readings(html: &str, station_id: &str) -> Vec<RawReading> {
    let document = Html::parse_document(html);
    let Some(table) = readings_table(&document) else {
        return Vec::new();
    };

    body_rows(table)
        .filter_map(|row| reading_from_row(row, station_id))
        .collect()
}

/// First table captioned as the real-time readings table.
pub(crate) fn readings_table(document: &Html) -> Option<ElementRef<'_>> {
    document.select(&TABLE).find(has_marker_caption)
}

fn has_marker_caption(table: &ElementRef<'_>) -> bool {
    child_elements(*table)
        .filter(|child| child.value().name() == "caption")
        .any(|caption| normalized_text(caption).contains(TABLE_CAPTION_MARKER))
}

fn normalized_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn child_elements(element: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    element.children().filter_map(ElementRef::wrap)
}

/// Rows of the table's own `tbody` sections, ignoring nested tables.
fn body_rows(table: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    child_elements(table)
        .filter(|section| section.value().name() == "tbody")
        .flat_map(|section| child_elements(section))
        .filter(|row| row.value().name() == "tr")
}

fn reading_from_row(row: ElementRef<'_>, station_id: &str) -> Option<RawReading> {
    let cells: Vec<ElementRef<'_>> = child_elements(row)
        .filter(|cell| matches!(cell.value().name(), "td" | "th"))
        .collect();
    if cells.len() < MIN_CELLS || cells.iter().all(|cell| cell.value().name() == "th") {
        return None;
    }

    let timestamp = cell_text(cells[TIMESTAMP_CELL]);
    if timestamp.is_empty() {
        return None;
    }

    Some(RawReading {
        station_id: station_id.to_string(),
        timestamp,
        water_level: cell_value(cells[WATER_LEVEL_CELL]),
        discharge: cell_value(cells[DISCHARGE_CELL]),
    })
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// The sort attribute, when present, is authoritative; the text is only read
/// for cells without one.
fn cell_value(cell: ElementRef<'_>) -> Option<f64> {
    match SORT_ATTRIBUTES
        .iter()
        .find_map(|name| cell.value().attr(name))
    {
        Some(value) => parse_measurement(value),
        None => parse_measurement(&cell_text(cell)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(rows: &str) -> String {
        format!(
            r#"<html><body>
            <table id="summary"><caption>Station summary</caption>
              <tbody><tr><td>2020-01-01 00:00</td><td>9</td><td></td><td></td><td></td><td>9</td></tr></tbody>
            </table>
            <table class="table">
              <caption>
                Real-Time Data in Tabular Format
              </caption>
              <thead><tr><th>Date/Time (MST)</th><th>Water Level (m)</th><th>Grade</th><th>Symbol</th><th>Approval</th><th>Discharge (m³/s)</th></tr></thead>
              <tbody>{rows}</tbody>
            </table>
            </body></html>"#
        )
    }

    #[test]
    fn placeholders_become_nulls() {
        let html = page("<tr><td>2024-01-01 00:00</td><td>-</td><td>x</td><td>x</td><td>x</td><td>-</td></tr>");
        let readings = extract_readings(&html, "05BH004");
        assert_eq!(
            readings,
            vec![RawReading {
                station_id: "05BH004".to_string(),
                timestamp: "2024-01-01 00:00".to_string(),
                water_level: None,
                discharge: None,
            }]
        );
    }

    #[test]
    fn sort_attribute_wins_over_text() {
        let html = page(
            r#"<tr><td> 2024-01-01 00:05 </td><td data-order="12.34">12.3 m</td><td></td><td></td><td></td><td data-order="-">310</td></tr>"#,
        );
        let readings = extract_readings(&html, "05BH004");
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].timestamp, "2024-01-01 00:05");
        assert_eq!(readings[0].water_level, Some(12.34));
        assert_eq!(readings[0].discharge, None);
    }

    #[test]
    fn placeholder_attribute_is_null_despite_text() {
        let html = page(
            r#"<tr><td>2024-01-01 00:30</td><td data-order="-">1.2</td><td></td><td></td><td></td><td data-sort="">310</td></tr>"#,
        );
        let readings = extract_readings(&html, "05BH004");
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].water_level, None);
        assert_eq!(readings[0].discharge, None);
    }

    #[test]
    fn text_is_used_without_attribute() {
        let html = page("<tr><td>2024-01-01 00:10</td><td>1.25</td><td></td><td></td><td></td><td>n/a</td></tr>");
        let readings = extract_readings(&html, "05BH004");
        assert_eq!(readings[0].water_level, Some(1.25));
        assert_eq!(readings[0].discharge, None);
    }

    #[test]
    fn missing_table_yields_nothing() {
        let html = r#"<html><body><table><caption>Daily means</caption>
            <tbody><tr><td>2024-01-01</td><td>1</td><td></td><td></td><td></td><td>2</td></tr></tbody>
            </table><p>No data available for this station.</p></body></html>"#;
        assert!(extract_readings(html, "05BH004").is_empty());
        assert!(extract_readings("", "05BH004").is_empty());
    }

    #[test]
    fn rows_without_timestamp_or_enough_cells_are_skipped() {
        let html = page(concat!(
            "<tr><td>   </td><td>1</td><td></td><td></td><td></td><td>2</td></tr>",
            "<tr><td>2024-01-01 00:15</td><td>1</td><td>2</td></tr>",
            "<tr><th>Date</th><th>a</th><th>b</th><th>c</th><th>d</th><th>e</th></tr>",
            "<tr><td>2024-01-01 00:20</td><td>1.5</td><td></td><td></td><td></td><td>20</td></tr>",
        ));
        let readings = extract_readings(&html, "05BH004");
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].timestamp, "2024-01-01 00:20");
        assert_eq!(readings[0].discharge, Some(20.0));
    }

    #[test]
    fn only_the_first_matching_table_is_read() {
        let second = r#"<table><caption>Real-time data in tabular format</caption><tbody>
            <tr><td>2024-02-01 00:00</td><td>5</td><td></td><td></td><td></td><td>5</td></tr>
            </tbody></table>"#;
        let html = page("<tr><td>2024-01-01 00:00</td><td>1</td><td></td><td></td><td></td><td>1</td></tr>")
            .replace("</body>", &format!("{second}</body>"));
        let readings = extract_readings(&html, "05BH004");
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].timestamp, "2024-01-01 00:00");
    }

    #[test]
    fn rows_outside_tbody_sections_are_found() {
        let html = r#"<table><caption>Real-time data in tabular format</caption>
            <tr><td>2024-01-01 01:00</td><td>2</td><td></td><td></td><td></td><td>3</td></tr>
            </table>"#;
        let readings = extract_readings(html, "02HA003");
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].station_id, "02HA003");
    }
}
