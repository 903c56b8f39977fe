//! Source files synthesized in the formats the fetchers download

use chrono::NaiveDate;
use rapina::Config;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;

pub const BPA_HEADER: &str = "CNPJ_CIA;DT_REFER;VERSAO;DENOM_CIA;CD_CVM;GRUPO_DFP;MOEDA;ESCALA_MOEDA;ORDEM_EXERC;DT_FIM_EXERC;CD_CONTA;DS_CONTA;VL_CONTA;ST_CONTA_FIXA";
pub const DRE_HEADER: &str = "CNPJ_CIA;DT_REFER;VERSAO;DENOM_CIA;CD_CVM;GRUPO_DFP;MOEDA;ESCALA_MOEDA;ORDEM_EXERC;DT_INI_EXERC;DT_FIM_EXERC;CD_CONTA;DS_CONTA;VL_CONTA;ST_CONTA_FIXA";

pub const CATALOG_HEADER: &str = "RptDt;TckrSymb;Asst;AsstDesc;SgmtNm;MktNm;SctyCtgyNm;XprtnDt;XprtnCd;TradgStartDt;TradgEndDt;BaseCd;ConvsCritNm;MtrtyDtTrgtPt;ReqrdConvsInd;ISIN;CFICd;DlvryNtceStartDt;DlvryNtceEndDt;OptnTp;CtrctMltplr;AsstQtnQty;AllcnRndLot;TradgCcy;DlvryTpNm;WdrwlDays;WrkgDays;ClnrDays;RlvrBasePricNm;OpngFutrPosDay;SdTpCd1;UndrlygTckrSymb1;SdTpCd2;UndrlygTckrSymb2;PureGoldWght;ExrcPric;OptnStyle;ValTpNm;PrmUpfrntInd;OpngPosLmtDt;DstrbtnId;PricFctr;DaysToSttlm;SrsTpNm;PrtcnFlg;AutomtcExrcInd;SpcfctnCd;CrpnNm;CorpActnStartDt;CtdyTrtmntTpNm;MktCptlstn;CorpGovnLvlNm";

/// Quote line S1 from the B3 layout documentation sample
pub const S1_LINE: &str = "012021010412NSLU11      010FII LOURDES CI  ER       R$  000000002840000000000284000000000027700000000002809000000000281900000000028029000000002819000168000000000000001381000000000038793560000000000000009999123100000010000000000000BRNSLUCTF008272";

pub const DIVIDEND_REPORT: &str = r#"
    <html><body>
    <table>
      <tr><td>Nome do Fundo:</td><td>FDO INV IMOB - FII TORRE ALMIRANTE</td>
          <td>CNPJ do Fundo:</td><td>14.410.722/0001-29</td></tr>
      <tr><td>Data da Informação</td><td>29/01/2021</td></tr>
      <tr><td>Código de negociação da cota</td><td>ALMI11</td></tr>
    </table>
    <table>
      <tr><td>Data-base (último dia de negociação “com” direito ao provento)</td><td>29/01/2021</td></tr>
      <tr><td>Data do pagamento</td><td>05/02/2021</td></tr>
      <tr><td>Valor do provento por cota (R$)</td><td>1,0823299</td></tr>
      <tr><td>Período de referência</td><td>Dezembro</td></tr>
      <tr><td>Ano</td><td>2020</td></tr>
    </table>
    </body></html>"#;

/// CVM files are Latin-1 on disk
pub fn latin1(text: &str) -> Vec<u8> {
    text.chars().map(|c| c as u32 as u8).collect()
}

/// Balance-sheet row (no period start)
pub fn bpa_row(cnpj: &str, name: &str, end: &str, code: &str, description: &str, value: &str) -> String {
    format!(
        "{cnpj};{end};1;{name};1023;DF Consolidado - Balanço Patrimonial Ativo;REAL;MIL;ÚLTIMO;{end};{code};{description};{value};S"
    )
}

pub fn dre_row(
    cnpj: &str,
    name: &str,
    start: &str,
    end: &str,
    code: &str,
    description: &str,
    value: &str,
) -> String {
    format!(
        "{cnpj};{end};1;{name};1023;DF Consolidado - Demonstração do Resultado;REAL;MIL;ÚLTIMO;{start};{end};{code};{description};{value};S"
    )
}

/// Header plus rows, Latin-1 encoded
pub fn csv_file(header: &str, rows: &[String]) -> Vec<u8> {
    let mut text = format!("{}\n", header);
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    latin1(&text)
}

/// Zip archive with the given members, in memory
pub fn zip_bytes(members: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in members {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(body).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn write_zip(path: &Path, members: &[(&str, Vec<u8>)]) {
    std::fs::write(path, zip_bytes(members)).unwrap();
}

/// DFP archive for `year` with two companies, plus an individual-company
/// member that must be ignored
pub fn dfp_archive(year: i32) -> Vec<u8> {
    let end = format!("{}-12-31", year);
    let start = format!("{}-01-01", year);
    let bpa = csv_file(
        BPA_HEADER,
        &[
            bpa_row("00.000.000/0001-91", "BANCO DO BRASIL S.A.", &end, "1", "Ativo Total", "1162167882.00"),
            bpa_row("00.000.000/0001-91", "BANCO DO BRASIL S.A.", &end, "1.01", "Ativo Circulante", "500000.00"),
            bpa_row("33.000.167/0001-01", "PETRÓLEO BRASILEIRO S.A.", &end, "1", "Ativo Total", "900000.00"),
        ],
    );
    let dre = csv_file(
        DRE_HEADER,
        &[
            dre_row("00.000.000/0001-91", "BANCO DO BRASIL S.A.", &start, &end, "3.01", "Receitas da Intermediação Financeira", "120000.00"),
            dre_row("33.000.167/0001-01", "PETRÓLEO BRASILEIRO S.A.", &start, &end, "3.01", "Receita de Venda de Bens e/ou Serviços", "450000.00"),
        ],
    );
    let individual = csv_file(
        BPA_HEADER,
        &[bpa_row("00.000.000/0001-91", "BANCO DO BRASIL S.A.", &end, "1", "Ativo Total", "1.00")],
    );

    let bpa_name = format!("dfp_cia_aberta_BPA_con_{}.csv", year);
    let dre_name = format!("dfp_cia_aberta_DRE_con_{}.csv", year);
    let individual_name = format!("dfp_cia_aberta_BPA_ind_{}.csv", year);
    zip_bytes(&[
        (bpa_name.as_str(), bpa),
        (dre_name.as_str(), dre),
        (individual_name.as_str(), individual),
    ])
}

fn splice(line: &mut [u8], range: std::ops::Range<usize>, text: &str) {
    assert_eq!(text.len(), range.len(), "field {:?}", range);
    line[range].copy_from_slice(text.as_bytes());
}

fn cents(value: f64, width: usize) -> String {
    format!("{:0width$}", (value * 100.0).round() as i64, width = width)
}

/// COTAHIST quote record built on the S1 layout
pub fn cotahist_line(ticker: &str, date: NaiveDate, ohlc: [f64; 4], volume: f64) -> String {
    let mut line = S1_LINE.as_bytes().to_vec();
    splice(&mut line, 2..10, &date.format("%Y%m%d").to_string());
    splice(&mut line, 12..24, &format!("{:<12}", ticker));
    splice(&mut line, 56..69, &cents(ohlc[0], 13));
    splice(&mut line, 69..82, &cents(ohlc[1], 13));
    splice(&mut line, 82..95, &cents(ohlc[2], 13));
    splice(&mut line, 108..121, &cents(ohlc[3], 13));
    splice(&mut line, 170..188, &cents(volume, 18));
    String::from_utf8(line).unwrap()
}

/// Whole COTAHIST file: header, records, trailer
pub fn cotahist_file(date: NaiveDate, lines: &[String]) -> Vec<u8> {
    let header = format!("{:<245}", format!("00COTAHIST.{}BOVESPA {}", date.format("%Y"), date.format("%Y%m%d")));
    let trailer = format!("{:<245}", format!("99COTAHIST.{}BOVESPA {}{:011}", date.format("%Y"), date.format("%Y%m%d"), lines.len() + 2));
    let mut text = format!("{}\r\n", header);
    for line in lines {
        text.push_str(line);
        text.push_str("\r\n");
    }
    text.push_str(&trailer);
    text.push_str("\r\n");
    latin1(&text)
}

/// One catalog row; unspecified columns are empty
pub fn catalog_row(ticker: &str, segment: &str, category: &str, spec_code: &str, company: &str) -> String {
    CATALOG_HEADER
        .split(';')
        .map(|column| match column {
            "RptDt" => "2021-01-04",
            "TckrSymb" => ticker,
            "SgmtNm" => segment,
            "SctyCtgyNm" => category,
            "SpcfctnCd" => spec_code,
            "CrpnNm" => company,
            "TradgCcy" => "BRL",
            _ => "",
        })
        .collect::<Vec<_>>()
        .join(";")
}

pub fn catalog_file(rows: &[String]) -> Vec<u8> {
    csv_file(CATALOG_HEADER, rows)
}

/// Configuration pointing every source at `base_url`
pub fn test_config(base_url: &str, data_dir: &Path) -> Config {
    Config {
        data_dir: data_dir.to_path_buf(),
        cvm_base_url: base_url.to_string(),
        b3_base_url: base_url.to_string(),
        b3_files_url: base_url.to_string(),
        fnet_url: base_url.to_string(),
        b3_funds_url: base_url.to_string(),
        sectors_url: format!("{}/setorial/ClassifSetorial.zip", base_url),
        alpha_vantage_url: base_url.to_string(),
        yahoo_url: base_url.to_string(),
        api_key: None,
        min_year: 2015,
        max_misses: 2,
        http_timeout_secs: 5,
        ..Config::default()
    }
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Single-sheet `.xlsx` with inline strings; empty cells are left out
pub fn xlsx_bytes(rows: &[&[&str]]) -> Vec<u8> {
    let mut sheet = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, cells) in rows.iter().enumerate() {
        sheet.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, text) in cells.iter().enumerate().filter(|(_, t)| !t.is_empty()) {
            let column = (b'A' + c as u8) as char;
            sheet.push_str(&format!(
                r#"<c r="{}{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                column,
                r + 1,
                xml_escape(text)
            ));
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    let content_types = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;
    let root_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;
    let workbook = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Plan1" sheetId="1" r:id="rId1"/></sheets></workbook>"#;
    let workbook_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

    zip_bytes(&[
        ("[Content_Types].xml", content_types.as_bytes().to_vec()),
        ("_rels/.rels", root_rels.as_bytes().to_vec()),
        ("xl/workbook.xml", workbook.as_bytes().to_vec()),
        ("xl/_rels/workbook.xml.rels", workbook_rels.as_bytes().to_vec()),
        ("xl/worksheets/sheet1.xml", sheet.into_bytes()),
    ])
}

/// Classification rows: banner, titles, two sectors
pub const SECTOR_ROWS: &[&[&str]] = &[
    &["CLASSIFICAÇÃO SETORIAL DAS EMPRESAS E FUNDOS NEGOCIADOS NA B3"],
    &["SETOR ECONÔMICO", "SUBSETOR", "SEGMENTO", "LISTAGEM"],
    &["", "", "", "CÓDIGO", "SEGMENTO"],
    &["Bens Industriais", "Comércio", "Material de Transporte"],
    &["", "", "MINASMAQUINAS", "MMAQ"],
    &["", "", "WLM IND COM", "WLMM"],
    &["Consumo não Cíclico", "Bebidas", "Cervejas e Refrigerantes"],
    &["", "", "AMBEV S/A", "ABEV", "NM"],
];
