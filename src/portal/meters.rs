//! Generation meter readings ("medidores de generación")
//!
//! The portal stages the export server side: list the generating
//! companies, ask for an export covering all of them, then download the
//! staged CSV.

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use scraper::{Html, Selector};

use super::errors::raise_for_status;
use super::{
    format_request_date, Portal, METERS_COMPANIES_PATH, METERS_DOWNLOAD_PATH, METERS_EXPORT_PATH,
};
use crate::config::METERS_TIMEOUT;
use crate::table::{coerce_numeric, TimeSeriesTable};

/// Timestamp column of the staged CSV
pub const TIMESTAMP_COLUMN: &str = "fechahora";

/// Format of the timestamp column, e.g. "15/01/2024 00:30"
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Company type of generators
const GENERATOR_COMPANY_TYPE: &str = "3";

/// Meter readings of every generating company between `start` and `end`
pub async fn fetch_generation_meters(
    portal: &Portal<'_>,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<TimeSeriesTable<NaiveDateTime>> {
    let session = portal.session();
    let client = session.client();

    tracing::info!("Requesting generation meters from {} to {}", start, end);

    let request = client
        .post(portal.endpoint(METERS_COMPANIES_PATH)?)
        .query(&[("tiposEmpresa", GENERATOR_COMPANY_TYPE)])
        .timeout(METERS_TIMEOUT);
    let response = session
        .send(request)
        .await
        .context("Failed to request generator companies")?;
    raise_for_status(&response)?;
    let html = response
        .text()
        .await
        .context("Failed to read generator companies")?;

    let companies = parse_company_ids(&html)?;
    tracing::debug!("Found {} generator companies", companies.len());

    let start_str = format_request_date(start);
    let end_str = format_request_date(end);
    let joined = companies.join(",");
    let request = client
        .post(portal.endpoint(METERS_EXPORT_PATH)?)
        .query(&[
            ("fechaInicial", start_str.as_str()),
            ("fechaFinal", end_str.as_str()),
            ("empresas", joined.as_str()),
            ("central", "1"),
            ("parametros", "1"),
            ("tipo", GENERATOR_COMPANY_TYPE),
        ])
        .timeout(METERS_TIMEOUT);
    let response = session
        .send(request)
        .await
        .context("Failed to stage generation meters export")?;
    raise_for_status(&response)?;

    let request = client
        .get(portal.endpoint(METERS_DOWNLOAD_PATH)?)
        .query(&[("tipo", GENERATOR_COMPANY_TYPE)])
        .timeout(METERS_TIMEOUT);
    let response = session
        .send(request)
        .await
        .context("Failed to download generation meters export")?;
    raise_for_status(&response)?;
    let csv_text = response
        .text()
        .await
        .context("Failed to read generation meters export")?;

    normalize_generation_meters(&csv_text)
}

/// Option values of the `cbEmpresas` select
pub fn parse_company_ids(html: &str) -> Result<Vec<String>> {
    let fragment = Html::parse_document(html);
    let selector_select = Selector::parse("select#cbEmpresas")
        .map_err(|e| anyhow!("Invalid company selector: {}", e))?;
    let selector_option =
        Selector::parse("option").map_err(|e| anyhow!("Invalid option selector: {}", e))?;

    let select = fragment
        .select(&selector_select)
        .next()
        .ok_or_else(|| anyhow!("Company list not found in response"))?;

    select
        .select(&selector_option)
        .map(|option| {
            option
                .value()
                .attr("value")
                .map(str::to_string)
                .ok_or_else(|| anyhow!("Company option without value: {}", option.html()))
        })
        .collect()
}

/// Parse the staged CSV into a numeric table keyed by `fechahora`.
///
/// Non-numeric cells become `NaN` and rows with no numeric value at all
/// are dropped.
pub fn normalize_generation_meters(csv_text: &str) -> Result<TimeSeriesTable<NaiveDateTime>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let ts_index = headers
        .iter()
        .position(|h| h == TIMESTAMP_COLUMN)
        .ok_or_else(|| anyhow!("CSV has no '{}' column: {:?}", TIMESTAMP_COLUMN, headers))?;

    let value_indices: Vec<usize> = (0..headers.len()).filter(|&i| i != ts_index).collect();
    let mut table = TimeSeriesTable::new(
        TIMESTAMP_COLUMN,
        value_indices.iter().map(|&i| headers[i].as_str()),
    );

    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read CSV row {}", line + 1))?;
        let raw_ts = record.get(ts_index).unwrap_or_default().trim();
        let values: Vec<f64> = value_indices
            .iter()
            .map(|&i| record.get(i).map(coerce_numeric).unwrap_or(f64::NAN))
            .collect();

        // Blank filler rows (e.g. a trailing ",,") carry nothing to keep
        if raw_ts.is_empty() && values.iter().all(|value| value.is_nan()) {
            continue;
        }

        let timestamp = NaiveDateTime::parse_from_str(raw_ts, TIMESTAMP_FORMAT).with_context(|| {
            format!("Row {}: '{}' does not match {}", line + 1, raw_ts, TIMESTAMP_FORMAT)
        })?;
        table.push_row(timestamp, values)?;
    }

    table.drop_empty_rows();
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortalConfig;
    use crate::portal::errors::HttpError;
    use crate::portal::session::get_session;
    use crate::portal::test_server::{Routes, TestServer};

    const COMPANIES: &str = r#"<select id="cbEmpresas"><option value="10">A</option><option value="12">B</option></select>"#;
    const EXPORT_CSV: &str = "fechahora,CENTRAL A\n15/01/2024 00:15,12.5\n15/01/2024 00:30,\n";

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_company_ids() {
        let html = r#"
            <select id="cbTipo"><option value="9">x</option></select>
            <select id="cbEmpresas" multiple>
              <option value="10">EGASA</option>
              <option value="12">ENGIE</option>
              <option value="1005">KALLPA</option>
            </select>
        "#;
        assert_eq!(parse_company_ids(html).unwrap(), vec!["10", "12", "1005"]);
    }

    #[test]
    fn test_missing_company_list() {
        assert!(parse_company_ids("<html><body>Sesión expirada</body></html>").is_err());
    }

    #[test]
    fn test_normalize_generation_meters() {
        let csv_text = "\
 fechahora ,CENTRAL A , CENTRAL B
15/01/2024 00:15,12.5,3
15/01/2024 00:30,,abc
15/01/2024 00:45,abc,
15/01/2024 01:00, 7 ,
";
        let table = normalize_generation_meters(csv_text).unwrap();

        assert_eq!(table.header(), vec!["fechahora", "CENTRAL A", "CENTRAL B"]);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.timestamps().copied().collect::<Vec<_>>(),
            vec![at(15, 0, 15), at(15, 1, 0)]
        );

        let a = table.column("CENTRAL A").unwrap();
        assert_eq!(a, vec![12.5, 7.0]);
        let b = table.column("CENTRAL B").unwrap();
        assert_eq!(b[0], 3.0);
        assert!(b[1].is_nan());
    }

    #[test]
    fn test_timestamp_column_may_be_anywhere() {
        let csv_text = "A,fechahora\n1,31/12/2023 23:30\n";
        let table = normalize_generation_meters(csv_text).unwrap();
        assert_eq!(table.columns(), &["A".to_string()]);
        let expected = NaiveDate::from_ymd_opt(2023, 12, 31)
            .unwrap()
            .and_hms_opt(23, 30, 0)
            .unwrap();
        assert_eq!(table.rows()[0].timestamp, expected);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let csv_text = "fechahora,A,B\n15/01/2024 00:15,4\n";
        let table = normalize_generation_meters(csv_text).unwrap();
        let row = &table.rows()[0];
        assert_eq!(row.values[0], 4.0);
        assert!(row.values[1].is_nan());
    }

    #[test]
    fn test_wrong_timestamp_format_is_an_error() {
        let csv_text = "fechahora,A\n2024/01/15 00:15,1\n";
        let err = normalize_generation_meters(csv_text).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_blank_rows_are_skipped() {
        let csv_text = "fechahora,A,B\n15/01/2024 00:15,1,2\n,,\n";
        let table = normalize_generation_meters(csv_text).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].timestamp, at(15, 0, 15));
        assert_eq!(table.rows()[0].values, vec![1.0, 2.0]);
    }

    #[test]
    fn test_blank_timestamp_with_values_is_an_error() {
        let csv_text = "fechahora,A\n15/01/2024 00:15,1\n,5\n";
        assert!(normalize_generation_meters(csv_text).is_err());
    }

    #[test]
    fn test_missing_timestamp_column() {
        assert!(normalize_generation_meters("fecha,A\n15/01/2024 00:15,1\n").is_err());
    }

    #[tokio::test]
    async fn test_fetch_generation_meters_protocol() {
        let server = TestServer::start(
            Routes::default()
                .reply(METERS_COMPANIES_PATH, 200, COMPANIES)
                .reply(METERS_EXPORT_PATH, 200, "")
                .reply(METERS_DOWNLOAD_PATH, 200, EXPORT_CSV),
        )
        .await;
        let config = PortalConfig {
            base_url: server.base_url.clone(),
            ..PortalConfig::default()
        };
        let session = get_session(&config).unwrap();
        let portal = Portal::new(&session, &config).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();

        let table = fetch_generation_meters(&portal, start, end).await.unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.column("CENTRAL A").unwrap(), vec![12.5]);

        let requests = server.requests();
        assert_eq!(requests.len(), 3);

        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, METERS_COMPANIES_PATH);
        assert_eq!(requests[0].query["tiposEmpresa"], "3");

        assert_eq!(requests[1].method, "POST");
        assert_eq!(requests[1].path, METERS_EXPORT_PATH);
        let export = &requests[1].query;
        assert_eq!(export["fechaInicial"], "15/01/2024");
        assert_eq!(export["fechaFinal"], "16/01/2024");
        assert_eq!(export["empresas"], "10,12");
        assert_eq!(export["central"], "1");
        assert_eq!(export["parametros"], "1");
        assert_eq!(export["tipo"], "3");

        assert_eq!(requests[2].method, "GET");
        assert_eq!(requests[2].path, METERS_DOWNLOAD_PATH);
        assert_eq!(requests[2].query["tipo"], "3");
    }

    #[tokio::test]
    async fn test_fetch_generation_meters_server_error() {
        let server = TestServer::start(
            Routes::default()
                .reply(METERS_COMPANIES_PATH, 200, COMPANIES)
                .reply(METERS_EXPORT_PATH, 500, "boom"),
        )
        .await;
        let config = PortalConfig {
            base_url: server.base_url.clone(),
            ..PortalConfig::default()
        };
        let session = get_session(&config).unwrap();
        let portal = Portal::new(&session, &config).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();

        let err = fetch_generation_meters(&portal, day, day).await.unwrap_err();
        let http = err.downcast_ref::<HttpError>().unwrap();
        assert!(http.is_server());
        assert_eq!(http.status(), 500);

        let paths: Vec<String> = server.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec![METERS_COMPANIES_PATH, METERS_EXPORT_PATH]);
    }
}
