//! Fetchers against a mock server

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use test_log::test;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::fixtures::*;
use crate::common::{count, TestStore};
use rapina::codec::{Clock, FixedClock};
use rapina::parsers::sectors;
use rapina::Orchestrator;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn orchestrator(ts: &TestStore, server: &MockServer, today: NaiveDate) -> Orchestrator {
    let config = test_config(&server.uri(), &ts.data_dir());
    Orchestrator::new(ts.store.clone(), config, Arc::new(FixedClock(today))).unwrap()
}

fn zip_response(body: Vec<u8>) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "application/zip")
        .set_body_bytes(body)
}

#[test(tokio::test)]
async fn test_year_loop_stops_after_two_misses() {
    let server = MockServer::start().await;
    let ts = TestStore::new().await;

    for year in [2020, 2019] {
        Mock::given(method("GET"))
            .and(path(format!("/DFP/DADOS/dfp_cia_aberta_{}.zip", year)))
            .respond_with(zip_response(dfp_archive(year)))
            .mount(&server)
            .await;
    }
    // 2018 and 2017 are missing (404); 2016 must never be asked for
    Mock::given(method("GET"))
        .and(path("/DFP/DADOS/dfp_cia_aberta_2016.zip"))
        .respond_with(zip_response(dfp_archive(2016)))
        .expect(0)
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&ts, &server, day(2021, 6, 1));
    let summary = orchestrator.update_annual().await.unwrap();

    assert_eq!(summary.ingested, vec![2020, 2019]);
    assert_eq!(summary.missed, vec![2018, 2017]);
    assert_eq!(summary.stats.inserted, 10);
    assert_eq!(count(&ts.store, "dfp").await, 10);

    // Same archives again: digests are known, nothing new is stored
    let again = orchestrator.update_annual().await.unwrap();
    assert_eq!(again.ingested, vec![2020, 2019]);
    assert_eq!(again.stats.rows, 0);
    assert_eq!(count(&ts.store, "dfp").await, 10);
}

#[test(tokio::test)]
async fn test_catalog_token_handshake() {
    let server = MockServer::start().await;
    let ts = TestStore::new().await;

    Mock::given(method("GET"))
        .and(path("/api/download/requestname"))
        .and(query_param("fileName", "InstrumentsConsolidatedFile"))
        .and(query_param("date", "2021-01-04"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"redirectUrl":"x","token":"abc123"}"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/download/"))
        .and(query_param("token", "abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(catalog_file(&[
            catalog_row("ALMI11", "CASH", "FUNDS", "CI", "FDO INV IMOB - FII TORRE ALMIRANTE"),
            catalog_row("ALMI11", "ODD LOT", "FUNDS", "CI", "FDO INV IMOB - FII TORRE ALMIRANTE"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&ts, &server, day(2021, 1, 4));
    let stats = orchestrator.update_catalog(day(2021, 1, 4)).await.unwrap();

    assert_eq!(stats.inserted, 1);
    assert_eq!(ts.store.code("ALMIRANTE", "CI").await.unwrap(), "ALMI11");
}

#[test(tokio::test)]
async fn test_fii_dividends_scraped_once() {
    let server = MockServer::start().await;
    let ts = TestStore::new().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/fundsProxy/fundsCall/GetDetailFundSIG/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"detailFund":{"acronym":"ALMI","tradingName":"FII ALMIRANT","tradingCode":"ALMI11",
                "cnpj":"14410722000129","companyName":"FDO INV IMOB - FII TORRE ALMIRANTE"}}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fnet/publico/pesquisarGerenciadorDocumentosDados"))
        .and(query_param("cnpjFundo", "14410722000129"))
        .and(query_param("idTipoDocumento", "41"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"draw":1,"recordsTotal":2,"data":[
                {"id":101,"descricaoFundo":"FII ALMIRANTE","tipoDocumento":"Rendimentos e Amortizações","situacaoDocumento":"A"},
                {"id":100,"descricaoFundo":"FII ALMIRANTE","tipoDocumento":"Rendimentos e Amortizações","situacaoDocumento":"C"}
            ]}"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fnet/publico/exibirDocumento"))
        .and(query_param("id", "101"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DIVIDEND_REPORT))
        .expect(1)
        .mount(&server)
        .await;

    let clock = FixedClock(day(2021, 2, 10));
    let orchestrator = orchestrator(&ts, &server, clock.today());
    let fii = orchestrator.fii();

    let first = fii.dividends("ALMI11", 3).await.unwrap();
    assert_eq!(first.inserted, 1);

    // Known document and stored descriptor: no further gateway calls
    let second = fii.dividends("almi11", 3).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates, 1);

    let dividends = ts.store.fii_dividends(&clock, "ALMI11", 3).await.unwrap();
    assert_eq!(dividends.len(), 1);
    assert_eq!(dividends[0].value, 1.0823299);
    assert_eq!(dividends[0].ex_date, day(2021, 2, 1));
    assert_eq!(ts.store.list_fii_codes().await.unwrap(), vec!["ALMI11".to_string()]);
}

#[test(tokio::test)]
async fn test_quote_from_daily_archive() {
    let server = MockServer::start().await;
    let ts = TestStore::new().await;
    let date = day(2021, 1, 4);

    let cotahist = cotahist_file(date, &[S1_LINE.to_string()]);
    Mock::given(method("GET"))
        .and(path("/InstDados/SerHist/COTAHIST_D04012021.ZIP"))
        .respond_with(zip_response(zip_bytes(&[("COTAHIST_D04012021.TXT", cotahist)])))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&ts, &server, date);
    let quotes = orchestrator.quotes();

    assert_eq!(quotes.quote("nslu11", date).await.unwrap(), 281.9);
    // Served locally the second time
    assert_eq!(quotes.quote("NSLU11", date).await.unwrap(), 281.9);
}

#[test(tokio::test)]
async fn test_quote_falls_back_to_provider() {
    let server = MockServer::start().await;
    let ts = TestStore::new().await;
    let date = day(2021, 1, 4);

    Mock::given(method("GET"))
        .and(path("/v7/finance/download/PETR4.SA"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "Date,Open,High,Low,Close,Adj Close,Volume\n2021-01-04,28.65,29.18,28.53,28.91,25.10,95257400\n",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&ts, &server, date);
    let quotes = orchestrator.quotes();

    assert_eq!(quotes.quote("PETR4", date).await.unwrap(), 28.91);
    assert_eq!(quotes.quote("PETR4", date).await.unwrap(), 28.91);
    assert!(quotes.quote("XXXX3", date).await.is_err());
}

#[test(tokio::test)]
async fn test_unreadable_report_is_fetched_again() {
    let server = MockServer::start().await;
    let ts = TestStore::new().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/fundsProxy/fundsCall/GetDetailFundSIG/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"detailFund":{"acronym":"ALMI","tradingName":"FII ALMIRANT","tradingCode":"ALMI11",
                "cnpj":"14410722000129","companyName":"FDO INV IMOB - FII TORRE ALMIRANTE"}}"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fnet/publico/pesquisarGerenciadorDocumentosDados"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"draw":1,"recordsTotal":1,"data":[
                {"id":101,"descricaoFundo":"FII ALMIRANTE","tipoDocumento":"Rendimentos e Amortizações","situacaoDocumento":"A"}
            ]}"#,
        ))
        .mount(&server)
        .await;
    // First answer is a truncated page without the value row
    let truncated = DIVIDEND_REPORT.replace(
        "<tr><td>Valor do provento por cota (R$)</td><td>1,0823299</td></tr>",
        "",
    );
    Mock::given(method("GET"))
        .and(path("/fnet/publico/exibirDocumento"))
        .and(query_param("id", "101"))
        .respond_with(ResponseTemplate::new(200).set_body_string(truncated))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fnet/publico/exibirDocumento"))
        .and(query_param("id", "101"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DIVIDEND_REPORT))
        .expect(1)
        .mount(&server)
        .await;

    let clock = FixedClock(day(2021, 2, 10));
    let orchestrator = orchestrator(&ts, &server, clock.today());
    let fii = orchestrator.fii();

    let first = fii.dividends("ALMI11", 3).await.unwrap();
    assert_eq!(first.inserted, 0);
    assert_eq!(first.skipped, 1);
    assert_eq!(count(&ts.store, "fii_dividends").await, 0);

    let second = fii.dividends("ALMI11", 3).await.unwrap();
    assert_eq!(second.inserted, 1);
    assert_eq!(second.duplicates, 0);

    let dividends = ts.store.fii_dividends(&clock, "ALMI11", 3).await.unwrap();
    assert_eq!(dividends.len(), 1);
    assert_eq!(dividends[0].value, 1.0823299);
}

#[test(tokio::test)]
async fn test_sector_classification_to_yaml() {
    let server = MockServer::start().await;
    let ts = TestStore::new().await;

    Mock::given(method("GET"))
        .and(path("/setorial/ClassifSetorial.zip"))
        .respond_with(zip_response(zip_bytes(&[
            ("leia-me.txt", b"planilha anexa".to_vec()),
            ("ClassifSetorial.xlsx", xlsx_bytes(SECTOR_ROWS)),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&ts, &server, day(2021, 1, 4));
    let target = orchestrator.update_sectors().await.unwrap();

    assert_eq!(target, ts.data_dir().join("setores.yml"));
    assert!(!ts.data_dir().join("ClassifSetorial.zip").exists());
    let text = std::fs::read_to_string(&target).unwrap();
    assert!(text.starts_with("Setores:"));

    let doc = sectors::read_yaml(&target).unwrap();
    assert_eq!(doc.sectors[1].name, "Consumo não Cíclico");
    assert_eq!(doc.sectors[1].subsectors[0].name, "Bebidas");
    assert_eq!(doc.company_count(), 3);
}
