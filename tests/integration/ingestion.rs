//! Archive ingestion: idempotence, resume and zip-slip

use assert_matches::assert_matches;
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use test_log::test;

use crate::common::fixtures::*;
use crate::common::{count, TestStore};
use rapina::archive::digest_file;
use rapina::codec::FixedClock;
use rapina::fetch::ArchiveKind;
use rapina::models::Period;
use rapina::{Error, Orchestrator};

fn orchestrator(ts: &TestStore) -> Orchestrator {
    let config = test_config("http://127.0.0.1:9", &ts.data_dir());
    let clock = FixedClock(NaiveDate::from_ymd_opt(2021, 6, 1).unwrap());
    Orchestrator::new(ts.store.clone(), config, Arc::new(clock)).unwrap()
}

#[test(tokio::test)]
async fn test_same_archive_twice_is_a_noop() {
    let ts = TestStore::new().await;
    let orchestrator = orchestrator(&ts);
    let annual = ArchiveKind::Statements(Period::Annual);
    let zip_path = ts.data_dir().join("dfp_cia_aberta_2020.zip");
    let archive = dfp_archive(2020);

    std::fs::write(&zip_path, &archive).unwrap();
    let digest = digest_file(&zip_path).unwrap();
    let mut companies = ts.store.load_companies().await.unwrap();
    let first = orchestrator
        .ingest_archive(&zip_path, annual, &mut companies)
        .await
        .unwrap();

    assert_eq!(first.inserted, 5);
    assert!(!zip_path.exists(), "zip removed after ingest");
    assert!(ts.store.seen(&digest).await.unwrap());
    let counts = ts.store.counts().await.unwrap();

    std::fs::write(&zip_path, &archive).unwrap();
    let second = orchestrator
        .ingest_archive(&zip_path, annual, &mut companies)
        .await
        .unwrap();

    assert_eq!(second.rows, 0);
    assert_eq!(ts.store.counts().await.unwrap(), counts);
    assert_eq!(counts["companies"], 2);
    // Individual-company member never extracted
    let total_assets: f64 = sqlx::query_scalar(
        "SELECT value FROM dfp WHERE raw_code = '1' AND company_id = (SELECT id FROM companies WHERE cnpj = '00000000000191')",
    )
    .fetch_one(ts.store.pool())
    .await
    .unwrap();
    assert_eq!(total_assets, 1162167882.0);
}

#[test(tokio::test)]
async fn test_failed_member_resumes_on_next_run() {
    let ts = TestStore::new().await;
    let orchestrator = orchestrator(&ts);
    let annual = ArchiveKind::Statements(Period::Annual);
    let zip_path = ts.data_dir().join("dfp_cia_aberta_2019.zip");

    let bpa = csv_file(
        BPA_HEADER,
        &[bpa_row("00.000.000/0001-91", "BANCO DO BRASIL S.A.", "2019-12-31", "1", "Ativo Total", "10")],
    );
    let broken_dre = latin1("CNPJ_CIA;DENOM_CIA\n00.000.000/0001-91;BB\n");
    write_zip(
        &zip_path,
        &[
            ("dfp_cia_aberta_BPA_con_2019.csv", bpa.clone()),
            ("dfp_cia_aberta_DRE_con_2019.csv", broken_dre),
        ],
    );
    let broken_digest = digest_file(&zip_path).unwrap();

    let mut companies = ts.store.load_companies().await.unwrap();
    let result = orchestrator.ingest_archive(&zip_path, annual, &mut companies).await;

    assert_matches!(result, Err(Error::UnknownFormat(_)));
    assert!(zip_path.exists(), "zip kept for the next run");
    assert!(!ts.store.seen(&broken_digest).await.unwrap());
    assert_eq!(count(&ts.store, "dfp").await, 1);

    let dre = csv_file(
        DRE_HEADER,
        &[dre_row("00.000.000/0001-91", "BANCO DO BRASIL S.A.", "2019-01-01", "2019-12-31", "3.01", "Receitas", "5")],
    );
    write_zip(
        &zip_path,
        &[
            ("dfp_cia_aberta_BPA_con_2019.csv", bpa),
            ("dfp_cia_aberta_DRE_con_2019.csv", dre),
        ],
    );
    let stats = orchestrator
        .ingest_archive(&zip_path, annual, &mut companies)
        .await
        .unwrap();

    // Only the repaired member is parsed again
    assert_eq!(stats.rows, 1);
    assert_eq!(count(&ts.store, "dfp").await, 2);
    assert_eq!(count(&ts.store, "companies").await, 1);
}

#[test(tokio::test)]
async fn test_zip_slip_archive_is_rejected_and_not_marked() {
    let ts = TestStore::new().await;
    let orchestrator = orchestrator(&ts);
    let zip_path = ts.data_dir().join("evil.zip");
    write_zip(
        &zip_path,
        &[("../../escaped_bpa_.csv", latin1("pwned"))],
    );
    let digest = digest_file(&zip_path).unwrap();

    let mut companies = ts.store.load_companies().await.unwrap();
    let result = orchestrator
        .ingest_archive(&zip_path, ArchiveKind::Statements(Period::Annual), &mut companies)
        .await;

    assert_matches!(result, Err(Error::CorruptArchive(_)));
    assert!(!ts.store.seen(&digest).await.unwrap());
    let outside = ts.data_dir().parent().unwrap().join("escaped_bpa_.csv");
    assert!(!outside.exists());
}

#[test(tokio::test)]
async fn test_reference_form_after_statements() {
    let ts = TestStore::new().await;
    let orchestrator = orchestrator(&ts);

    let dfp_path = ts.data_dir().join("dfp_cia_aberta_2020.zip");
    std::fs::write(&dfp_path, dfp_archive(2020)).unwrap();
    let mut companies = ts.store.load_companies().await.unwrap();
    orchestrator
        .ingest_archive(&dfp_path, ArchiveKind::Statements(Period::Annual), &mut companies)
        .await
        .unwrap();

    let fre_path = ts.data_dir().join("fre_cia_aberta_2020.zip");
    let capital = latin1(
        "CNPJ_Companhia;Data_Referencia;Versao;ID_Documento;Quantidade_Total_Acoes_Circulacao;Percentual_Total_Acoes_Circulacao\n\
         00.000.000/0001-91;2020-12-31;3;1;1400000000;50.000000\n\
         99.999.999/0001-99;2020-12-31;1;2;10;10\n",
    );
    write_zip(
        &fre_path,
        &[
            ("fre_cia_aberta_distribuicao_capital_2020.csv", capital),
            ("fre_cia_aberta_2020.csv", latin1("CNPJ_CIA;DENOM_CIA\n")),
        ],
    );

    let stats = orchestrator
        .ingest_archive(&fre_path, ArchiveKind::ReferenceForm, &mut companies)
        .await
        .unwrap();

    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.skipped, 1);
    let free_float = ts.store.free_float("BANCO DO BRASIL", 2020).await.unwrap();
    assert_eq!(free_float.ratio, 0.5);
    assert_eq!(free_float.total_shares, 2_800_000_000.0);
}

#[test(tokio::test)]
async fn test_recreated_table_is_filled_again() {
    let ts = TestStore::new().await;
    let annual = ArchiveKind::Statements(Period::Annual);
    let zip_path = ts.data_dir().join("dfp_cia_aberta_2020.zip");
    let archive = dfp_archive(2020);

    std::fs::write(&zip_path, &archive).unwrap();
    let mut companies = ts.store.load_companies().await.unwrap();
    orchestrator(&ts)
        .ingest_archive(&zip_path, annual, &mut companies)
        .await
        .unwrap();
    assert_eq!(count(&ts.store, "dfp").await, 5);

    // A new build with another dfp layout recreates the table on open
    sqlx::query("UPDATE schema_versions SET version = 0 WHERE table_name = 'dfp'")
        .execute(ts.store.pool())
        .await
        .unwrap();
    let store = ts.reopen().await;
    assert_eq!(count(&store, "dfp").await, 0);

    std::fs::write(&zip_path, &archive).unwrap();
    let config = test_config("http://127.0.0.1:9", &ts.data_dir());
    let clock = FixedClock(NaiveDate::from_ymd_opt(2021, 6, 1).unwrap());
    let orchestrator = Orchestrator::new(store.clone(), config, Arc::new(clock)).unwrap();
    let mut companies = store.load_companies().await.unwrap();
    let stats = orchestrator
        .ingest_archive(&zip_path, annual, &mut companies)
        .await
        .unwrap();

    assert_eq!(stats.inserted, 5);
    assert_eq!(count(&store, "dfp").await, 5);
    assert_eq!(count(&store, "companies").await, 2);
}
