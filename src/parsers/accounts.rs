//! Canonical account codes.
//!
//! CVM account codes drift between companies and years, and descriptions are
//! free text. Rules are tried in order; the first whose code pattern and
//! description predicate both match decides the account.

use crate::codec::{fold, Fnv1a32, KeyHasher};

/// Semantic line items shared across companies
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Account {
    AtivoTotal = 1,
    AtivoCirc,
    Caixa,
    AplicFinanceiras,
    ContasReceber,
    Estoque,
    AtivoNaoCirc,
    RealizavelLP,
    Imobilizado,
    Intangivel,
    PassivoTotal,
    PassivoCirc,
    Fornecedores,
    DividaCirc,
    PassivoNaoCirc,
    DividaNaoCirc,
    PatrimonioLiquido,
    Vendas,
    CustoVendas,
    ResultadoBruto,
    DespesasOp,
    Ebit,
    ResultadoFin,
    Lair,
    Impostos,
    ResultadoOpContinuadas,
    LucLiq,
    Fco,
    Fci,
    Fcf,
    VarCaixa,
    Depreciacao,
    DividendosPagos,
    Jcp,
    Dividendos,
}

impl Account {
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Set on every code that did not match a rule
pub const UNMAPPED_FLAG: u32 = 0x8000_0000;

struct Rule {
    code: &'static str,
    /// Any of these folded tokens must appear in the description
    desc: Option<&'static [&'static str]>,
    account: Account,
}

const fn rule(code: &'static str, account: Account) -> Rule {
    Rule {
        code,
        desc: None,
        account,
    }
}

const fn rule_desc(code: &'static str, desc: &'static [&'static str], account: Account) -> Rule {
    Rule {
        code,
        desc: Some(desc),
        account,
    }
}

static RULES: &[Rule] = &[
    // Balance sheet, assets
    rule("1", Account::AtivoTotal),
    rule("1.01", Account::AtivoCirc),
    rule("1.01.01", Account::Caixa),
    rule("1.01.02", Account::AplicFinanceiras),
    rule("1.01.03", Account::ContasReceber),
    rule("1.01.04", Account::Estoque),
    rule("1.02", Account::AtivoNaoCirc),
    rule("1.02.01", Account::RealizavelLP),
    rule_desc("1.02.0*", &["imobilizado"], Account::Imobilizado),
    rule_desc("1.02.0*", &["intangive"], Account::Intangivel),
    // Balance sheet, liabilities and equity
    rule("2", Account::PassivoTotal),
    rule("2.01", Account::PassivoCirc),
    rule_desc("2.01.0*", &["fornecedores"], Account::Fornecedores),
    rule_desc("2.01.0*", &["emprestimos", "financiamentos"], Account::DividaCirc),
    rule("2.02", Account::PassivoNaoCirc),
    rule_desc("2.02.0*", &["emprestimos", "financiamentos"], Account::DividaNaoCirc),
    rule_desc("2.03", &["patrimonio liquido"], Account::PatrimonioLiquido),
    rule_desc("2.07", &["patrimonio liquido"], Account::PatrimonioLiquido),
    rule_desc("2.08", &["patrimonio liquido"], Account::PatrimonioLiquido),
    // Income statement
    rule("3.01", Account::Vendas),
    rule("3.02", Account::CustoVendas),
    rule("3.03", Account::ResultadoBruto),
    rule("3.04", Account::DespesasOp),
    rule_desc("3.05", &["antes do resultado financeiro"], Account::Ebit),
    rule_desc("3.06", &["resultado financeiro"], Account::ResultadoFin),
    rule_desc("3.0*", &["antes dos tributos", "antes do imposto"], Account::Lair),
    rule_desc("3.0*", &["imposto de renda e contribuicao social"], Account::Impostos),
    rule_desc("3.0*", &["operacoes continuadas"], Account::ResultadoOpContinuadas),
    rule_desc(
        "3.*",
        &[
            "lucro/prejuizo consolidado do periodo",
            "lucro ou prejuizo liquido consolidado do periodo",
            "lucro/prejuizo do periodo",
            "lucro ou prejuizo do periodo",
        ],
        Account::LucLiq,
    ),
    // Cash flow
    rule("6.01", Account::Fco),
    rule("6.02", Account::Fci),
    rule("6.03", Account::Fcf),
    rule_desc("6.0*", &["aumento (reducao) de caixa", "aumento/reducao de caixa"], Account::VarCaixa),
    rule_desc("6.01.*", &["deprecia", "amortiza"], Account::Depreciacao),
    rule_desc("6.03.*", &["dividendo", "juros sobre capital", "jscp"], Account::DividendosPagos),
    // Value added distribution
    rule_desc("7.*", &["juros sobre o capital proprio", "juros sobre capital proprio"], Account::Jcp),
    rule_desc("7.*", &["dividendos"], Account::Dividendos),
];

impl Rule {
    fn matches(&self, code: &str, folded_desc: &str) -> bool {
        let code_ok = match self.code.strip_suffix('*') {
            Some(prefix) => code.starts_with(prefix),
            None => code == self.code,
        };
        code_ok
            && self
                .desc
                .map_or(true, |tokens| tokens.iter().any(|t| folded_desc.contains(t)))
    }
}

/// Semantic account of a raw line item, if any rule covers it
pub fn classify(raw_code: &str, raw_description: &str) -> Option<Account> {
    let code = raw_code.trim();
    let desc = fold(raw_description.trim());
    RULES
        .iter()
        .find(|rule| rule.matches(code, &desc))
        .map(|rule| rule.account)
}

/// Stable non-zero account code: the semantic account when a rule covers
/// the line, else a flagged hash of `code ∥ description`
pub fn account_code(hasher: &mut impl KeyHasher, raw_code: &str, raw_description: &str) -> u32 {
    match classify(raw_code, raw_description) {
        Some(account) => account.code(),
        None => hasher.key(&[raw_code.trim(), raw_description.trim()]) | UNMAPPED_FLAG,
    }
}

/// [`account_code`] with a fresh FNV-1a hasher
pub fn canonical_code(raw_code: &str, raw_description: &str) -> u32 {
    account_code(&mut Fnv1a32::new(), raw_code, raw_description)
}
